use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment, File};

/// Имя файла настроек, который подхватывается из рабочего каталога.
pub const DEFAULT_CONFIG_FILE: &str = "cutover";

/// Настройки переключения.
///
/// Источники в порядке приоритета: переменные окружения `CUTOVER_*`,
/// файл `cutover.toml`, значения по умолчанию.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Адрес сервера-источника
    pub source_addr: String,
    /// База для служебного ключа
    pub sync_db: u32,
    /// Служебный (sentinel) ключ
    pub sync_key: String,
    pub heartbeat_interval_ms: u64,
    pub unblock_timeout_ms: u64,
    /// Порог отставания метки, при котором репликация считается догнавшей
    pub lag_threshold_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Settings {
    /// Загружает настройки из `cutover.toml` (если есть) и окружения.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Как [`Settings::load`], но с явным путём к файлу. Указанный файл
    /// обязан существовать.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("source_addr", "127.0.0.1:6379")?
            .set_default("sync_db", 0)?
            .set_default("sync_key", "sync_key")?
            .set_default("heartbeat_interval_ms", 1000)?
            .set_default("unblock_timeout_ms", 3000)?
            .set_default("lag_threshold_ms", 1000)?
            .set_default("connect_timeout_ms", 5000)?
            .add_source(file)
            // Добавляем переменные окружения с префиксом CUTOVER_
            .add_source(Environment::with_prefix("CUTOVER").try_parsing(true))
            .build()?;

        // Десериализуем конфигурацию в нашу структуру
        cfg.try_deserialize()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
