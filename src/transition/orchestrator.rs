//! Оркестратор переключения: снимок, затем хвост репликации вместе с
//! heartbeat до появления финальной записи.

use std::sync::Arc;

use cutover_error::{ensure, CutoverResult, LogLevel, ResultExt, StackError, TransitionError};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot, watch},
    task::{JoinError, JoinHandle},
    time,
};
use tracing::{debug, error, info, warn};

use super::{
    config::TransitionConfig,
    sentinel::{now_nanos, SentinelInterceptor},
    state::{StateCell, TransitionState},
};
use crate::{
    client::Client,
    rdb::{SnapshotDecoder, SnapshotHandler},
    resp::{CommandHandler, StreamDecoder},
};

/// Переключение поверх двух соединений к источнику: управляющего
/// (`select`, heartbeat, финальная запись) и потокового (`sync`).
pub struct GracefulTransition<R, W> {
    config: TransitionConfig,
    control: Arc<Client<R, W>>,
    stream: Client<R, W>,
    state: Arc<StateCell>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<R, W> GracefulTransition<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        config: TransitionConfig,
        control: Client<R, W>,
        stream: Client<R, W>,
    ) -> Self {
        Self {
            config,
            control: Arc::new(control),
            stream,
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    pub fn state(&self) -> TransitionState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransitionState> {
        self.state.subscribe()
    }

    /// Ждёт `Finished`, если переключение уже началось.
    ///
    /// Если состояние ещё `Awaiting`, ждать нечего и функция возвращается
    /// сразу.
    pub async fn wait_finished(&self) {
        let mut rx = self.state.subscribe();
        if *rx.borrow() == TransitionState::Awaiting {
            return;
        }
        let _ = rx.wait_for(|s| *s == TransitionState::Finished).await;
    }

    /// Выполняет переключение целиком.
    ///
    /// Снимок передаётся `snapshot_handler`, команды из хвоста, кроме
    /// записей в служебный ключ, передаются `command_handler`. Первая
    /// ошибка любой из задач прерывает весь прогон.
    pub async fn run<S, H>(
        &self,
        snapshot_handler: &mut S,
        command_handler: H,
    ) -> CutoverResult<()>
    where
        S: SnapshotHandler + ?Sized,
        H: CommandHandler + 'static,
    {
        let db = self.config.sync_db;
        let reply = self
            .control
            .select(db)
            .await
            .with_context(|| format!("Selecting database {db}"))?;
        ensure!(
            reply.is_ok(),
            TransitionError::violation("select", "+OK", reply.to_string())
        );

        let (reader, reply) = self
            .stream
            .begin_streaming()
            .await
            .context("Requesting snapshot")?;
        ensure!(
            reply.is_bulk_string(),
            TransitionError::violation("sync", "bulk string", reply.to_string())
        );
        info!(announced_len = reply.bulk_len(), "Snapshot transfer started");

        let mut decoder = SnapshotDecoder::new(reader);
        decoder
            .decode(snapshot_handler)
            .await
            .context("Decoding snapshot")?;
        let stats = decoder.stats().clone();
        info!(
            rows = stats.rows,
            databases = stats.databases,
            bytes = stats.bytes_read,
            "Snapshot decoded, tailing replication stream"
        );
        let reader = decoder.into_inner();

        let (err_tx, mut err_rx) = mpsc::channel::<StackError>(1);
        let (heartbeat_stop_tx, heartbeat_stop_rx) = oneshot::channel();
        let (tail_stop_tx, tail_stop_rx) = oneshot::channel();

        let mut heartbeat = self.spawn_heartbeat(heartbeat_stop_rx, err_tx.clone());

        let interceptor = SentinelInterceptor::new(
            self.config.sync_key.clone(),
            self.config.lag_threshold,
            Arc::clone(&self.control),
            Arc::clone(&self.state),
            heartbeat_stop_tx,
            command_handler,
        );
        let mut tail = spawn_tail(reader, interceptor, tail_stop_rx, err_tx);

        let mut state_rx = self.state.subscribe();
        let mut heartbeat_running = true;
        let outcome = loop {
            tokio::select! {
                Some(err) = err_rx.recv() => break Err(err),
                _ = reached_finished(&mut state_rx) => break Ok(()),
                res = &mut tail => {
                    // Хвост сам завершается только по сигналу остановки,
                    // который отправляется после Finished
                    break Err(match (res, err_rx.try_recv()) {
                        (Ok(()), Ok(err)) => err,
                        (res, _) => task_failure("tail", res),
                    });
                }
                res = &mut heartbeat, if heartbeat_running => {
                    heartbeat_running = false;
                    if let Err(join) = res {
                        break Err(task_failure("heartbeat", Err(join)));
                    }
                    // Штатная остановка или ошибка, уже лежащая в канале
                }
            }
        };

        match outcome {
            Err(err) => {
                log_abort(&err);
                heartbeat.abort();
                tail.abort();
                Err(err)
            }
            Ok(()) => {
                heartbeat.abort();
                let _ = tail_stop_tx.send(());
                // Чтение уже начатой команды завершится только с приходом
                // следующих байт, поэтому ожидание ограничено
                if time::timeout(self.config.unblock_timeout, &mut tail)
                    .await
                    .is_err()
                {
                    warn!(
                        timeout_ms = self.config.unblock_timeout.as_millis() as u64,
                        "Tail reader did not stop in time, detaching"
                    );
                    tail.abort();
                }
                info!("Transition finished");
                Ok(())
            }
        }
    }

    fn spawn_heartbeat(
        &self,
        mut stop: oneshot::Receiver<()>,
        errors: mpsc::Sender<StackError>,
    ) -> JoinHandle<()> {
        let control = Arc::clone(&self.control);
        let key = self.config.sync_key.clone();
        let interval = self.config.heartbeat_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop => {
                        debug!("Heartbeat stopped");
                        return;
                    }
                    _ = time::sleep(interval) => {}
                }

                match write_heartbeat(&control, &key).await {
                    Ok(watermark) => debug!(watermark, "Heartbeat written"),
                    Err(e) => {
                        let _ = errors.try_send(e);
                        return;
                    }
                }
            }
        })
    }
}

/// Пишет текущее время в служебный ключ и возвращает записанную метку.
async fn write_heartbeat<R, W>(
    control: &Client<R, W>,
    key: &str,
) -> CutoverResult<i64>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let watermark = now_nanos();
    let reply = control.set(key.to_string(), watermark.to_string()).await?;
    ensure!(
        reply.is_ok(),
        TransitionError::violation("heartbeat", "+OK", reply.to_string())
    );
    Ok(watermark)
}

fn task_failure(
    task: &str,
    res: Result<(), JoinError>,
) -> StackError {
    let reason = match res {
        Ok(()) => "exited before the transition finished".to_string(),
        Err(e) if e.is_panic() => "panicked".to_string(),
        Err(e) => e.to_string(),
    };
    TransitionError::TaskFailed {
        task: task.to_string(),
        reason,
    }
    .into()
}

fn log_abort(err: &StackError) {
    let code = err.status_code();
    let tags = err.metrics_tags();
    let details = err.root().log_message();
    let retryable = code.is_retryable();
    match err.log_level() {
        LogLevel::Error => error!(
            error = %err,
            summary = %err.client_message(),
            critical = err.is_critical(),
            protocol = code.is_protocol_error(),
            retryable,
            ?tags,
            %details,
            "Transition aborted"
        ),
        LogLevel::Warn => warn!(error = %err, retryable, ?tags, "Transition aborted"),
        _ => info!(error = %err, retryable, ?tags, "Transition aborted"),
    }
}

async fn reached_finished(rx: &mut watch::Receiver<TransitionState>) {
    let _ = rx.wait_for(|s| *s == TransitionState::Finished).await;
}

fn spawn_tail<B, H>(
    reader: B,
    mut handler: H,
    mut stop: oneshot::Receiver<()>,
    errors: mpsc::Sender<StackError>,
) -> JoinHandle<()>
where
    B: tokio::io::AsyncBufRead + Unpin + Send + 'static,
    H: CommandHandler + 'static,
{
    tokio::spawn(async move {
        let mut decoder = StreamDecoder::new(reader);
        match decoder.decode_stream(&mut handler, &mut stop).await {
            Ok(exit) => debug!(?exit, commands = decoder.commands(), "Tail finished"),
            Err(e) => {
                let _ = errors.try_send(e.context("Tailing replication stream"));
            }
        }
    })
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<R, W> std::fmt::Debug for GracefulTransition<R, W> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("GracefulTransition")
            .field("config", &self.config)
            .field("state", &self.state.get())
            .finish()
    }
}
