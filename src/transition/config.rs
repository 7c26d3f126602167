use std::time::Duration;

use crate::config::Settings;

/// Параметры протокола переключения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionConfig {
    /// База, в которой живёт служебный ключ
    pub sync_db: u32,
    pub sync_key: String,
    /// Период записи метки времени
    pub heartbeat_interval: Duration,
    /// Сколько ждать остановки чтения потока после `Finished`
    pub unblock_timeout: Duration,
    /// Метка моложе этого порога означает, что репликация догнала источник
    pub lag_threshold: Duration,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            sync_db: 0,
            sync_key: "sync_key".to_string(),
            heartbeat_interval: Duration::from_secs(1),
            unblock_timeout: Duration::from_secs(3),
            lag_threshold: Duration::from_secs(1),
        }
    }
}

impl From<&Settings> for TransitionConfig {
    fn from(s: &Settings) -> Self {
        Self {
            sync_db: s.sync_db,
            sync_key: s.sync_key.clone(),
            heartbeat_interval: Duration::from_millis(s.heartbeat_interval_ms),
            unblock_timeout: Duration::from_millis(s.unblock_timeout_ms),
            lag_threshold: Duration::from_millis(s.lag_threshold_ms),
        }
    }
}
