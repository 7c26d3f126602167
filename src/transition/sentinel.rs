//! Перехват записей в служебный ключ внутри потока репликации.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use cutover_error::{ensure, CutoverResult, TransitionError};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::oneshot,
};
use tracing::{debug, info};

use super::state::{StateCell, TransitionState};
use crate::{
    client::Client,
    resp::{Cmd, CommandHandler},
};

/// Значение служебного ключа, завершающее переключение.
pub const FINAL_MARKER: &str = "final";

/// Текущее время в наносекундах Unix.
pub(crate) fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Что означает команда для протокола переключения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelWrite {
    /// Метка времени из heartbeat
    Watermark(i64),
    /// Финальная запись
    Final,
}

/// Обработчик потока: разбирает записи в служебный ключ, остальное
/// передаёт `inner`.
pub struct SentinelInterceptor<H, R, W> {
    key: Bytes,
    lag_threshold: Duration,
    control: Arc<Client<R, W>>,
    state: Arc<StateCell>,
    heartbeat_stop: Option<oneshot::Sender<()>>,
    inner: H,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<H, R, W> SentinelInterceptor<H, R, W>
where
    H: CommandHandler,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        key: impl Into<Bytes>,
        lag_threshold: Duration,
        control: Arc<Client<R, W>>,
        state: Arc<StateCell>,
        heartbeat_stop: oneshot::Sender<()>,
        inner: H,
    ) -> Self {
        Self {
            key: key.into(),
            lag_threshold,
            control,
            state,
            heartbeat_stop: Some(heartbeat_stop),
            inner,
        }
    }

    /// Возвращает запись в служебный ключ или `None` для прочих команд.
    pub fn classify(
        &self,
        cmd: &Cmd,
    ) -> CutoverResult<Option<SentinelWrite>> {
        let args = cmd.args();
        if cmd.len() != 3 || !cmd.is("set") || args[0] != self.key {
            return Ok(None);
        }

        let value = &args[1];
        if value.as_ref() == FINAL_MARKER.as_bytes() {
            return Ok(Some(SentinelWrite::Final));
        }

        std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(|ts| Some(SentinelWrite::Watermark(ts)))
            .ok_or_else(|| {
                TransitionError::InvalidWatermark {
                    value: String::from_utf8_lossy(value).into_owned(),
                }
                .into()
            })
    }

    pub fn into_inner(self) -> H {
        self.inner
    }

    fn is_caught_up(
        &self,
        watermark: i64,
    ) -> bool {
        let age = i128::from(now_nanos()) - i128::from(watermark);
        let threshold = i128::try_from(self.lag_threshold.as_nanos()).unwrap_or(i128::MAX);
        age < threshold
    }

    async fn on_watermark(
        &mut self,
        watermark: i64,
    ) -> CutoverResult<()> {
        if self.state.get() != TransitionState::Awaiting {
            return Ok(());
        }
        if !self.is_caught_up(watermark) {
            debug!(watermark, "Watermark is stale, replication still behind");
            return Ok(());
        }

        // Ошибка отправки означает, что heartbeat уже завершился
        if let Some(stop) = self.heartbeat_stop.take() {
            let _ = stop.send(());
        }
        self.state.advance(TransitionState::Started);
        info!(watermark, "Replication caught up, writing final marker");

        let reply = self.control.set(self.key.clone(), FINAL_MARKER).await?;
        ensure!(
            reply.is_ok(),
            TransitionError::violation("finalize", "+OK", reply.to_string())
        );
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl<H, R, W> CommandHandler for SentinelInterceptor<H, R, W>
where
    H: CommandHandler,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn handle_cmd(
        &mut self,
        cmd: Cmd,
    ) -> CutoverResult<()> {
        match self.classify(&cmd)? {
            Some(SentinelWrite::Final) => {
                if self.state.advance(TransitionState::Finished) {
                    info!("Final marker replicated, transition finished");
                }
                Ok(())
            }
            Some(SentinelWrite::Watermark(ts)) => self.on_watermark(ts).await,
            None => self.inner.handle_cmd(cmd).await,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
