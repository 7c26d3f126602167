//! Декодер бесконечного потока команд репликации.
//!
//! Каждая команда приходит массивом bulk-строк. Аргументы читаются по
//! объявленной длине `$<len>`, поэтому полезная нагрузка может содержать
//! `\r\n`.

use async_trait::async_trait;
use bytes::Bytes;
use cutover_error::{CutoverResult, RdbError, RespError, StackError, TransitionError};
use tokio::{
    io::AsyncBufRead,
    sync::{mpsc, oneshot},
};
use tracing::{debug, trace};

use super::{
    reply::{parse_int, read_line},
    Cmd,
};
use crate::rdb::reader::{read_array, read_bytes, MAX_FIELD_LEN};

/// Потребитель команд из потока.
#[async_trait]
pub trait CommandHandler: Send {
    async fn handle_cmd(
        &mut self,
        cmd: Cmd,
    ) -> CutoverResult<()>;
}

/// Обработчик по умолчанию: пишет каждую команду в лог.
#[derive(Debug, Default)]
pub struct LogCommandHandler {
    commands: u64,
}

/// Пересылает команды в канал.
#[derive(Debug, Clone)]
pub struct ChannelCommandHandler {
    tx: mpsc::Sender<Cmd>,
}

/// Почему завершился цикл чтения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// Получен сигнал остановки
    Stopped,
}

/// Декодер потока команд, владеющий источником байт.
#[derive(Debug)]
pub struct StreamDecoder<R> {
    reader: R,
    commands: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LogCommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> u64 {
        self.commands
    }
}

impl ChannelCommandHandler {
    pub fn new(tx: mpsc::Sender<Cmd>) -> Self {
        Self { tx }
    }

    /// Создаёт обработчик и приёмный конец канала.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Cmd>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl<R> StreamDecoder<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            commands: 0,
        }
    }

    /// Читает одну команду.
    pub async fn decode_cmd(&mut self) -> CutoverResult<Cmd> {
        let header = read_line(&mut self.reader, "command header").await?;
        let count = match header.split_first() {
            Some((b'*', rest)) => parse_int(rest)?,
            _ => {
                return Err(RespError::MalformedFraming {
                    expected: "array header".to_string(),
                    got: String::from_utf8_lossy(&header).into_owned(),
                }
                .into())
            }
        };
        if count < 0 {
            return Err(RespError::MalformedFraming {
                expected: "non-negative argument count".to_string(),
                got: count.to_string(),
            }
            .into());
        }

        let mut parts = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            parts.push(self.decode_arg().await?);
        }
        self.commands += 1;
        Ok(Cmd::from(parts))
    }

    /// Читает команды и передаёт их `handler`, пока не придёт сигнал `stop`.
    ///
    /// Сигнал проверяется перед каждой командой: уже начатое чтение
    /// завершается до того, как остановка будет замечена.
    pub async fn decode_stream<H>(
        &mut self,
        handler: &mut H,
        stop: &mut oneshot::Receiver<()>,
    ) -> CutoverResult<StreamExit>
    where
        H: CommandHandler + ?Sized,
    {
        loop {
            match stop.try_recv() {
                Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                    debug!(commands = self.commands, "Command stream stopped");
                    return Ok(StreamExit::Stopped);
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }

            let cmd = self.decode_cmd().await?;
            trace!(%cmd, "Command decoded");
            handler.handle_cmd(cmd).await?;
        }
    }

    pub fn commands(&self) -> u64 {
        self.commands
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    async fn decode_arg(&mut self) -> CutoverResult<Bytes> {
        let header = read_line(&mut self.reader, "argument header").await?;
        let len = match header.split_first() {
            Some((b'$', rest)) => parse_int(rest)?,
            _ => {
                return Err(RespError::MalformedFraming {
                    expected: "bulk string header".to_string(),
                    got: String::from_utf8_lossy(&header).into_owned(),
                }
                .into())
            }
        };
        let len = usize::try_from(len).map_err(|_| RespError::MalformedFraming {
            expected: "non-negative bulk length".to_string(),
            got: len.to_string(),
        })?;

        if len > MAX_FIELD_LEN {
            return Err(RespError::MalformedFraming {
                expected: format!("bulk length up to {MAX_FIELD_LEN}"),
                got: len.to_string(),
            }
            .into());
        }

        let payload = read_bytes(&mut self.reader, len, "argument payload")
            .await
            .map_err(|e| truncated_to_resp(e, "argument payload"))?;
        let crlf = read_array::<_, 2>(&mut self.reader, "argument terminator")
            .await
            .map_err(|e| truncated_to_resp(e, "argument terminator"))?;
        if &crlf != b"\r\n" {
            return Err(RespError::MalformedFraming {
                expected: "CRLF after bulk payload".to_string(),
                got: String::from_utf8_lossy(&crlf).into_owned(),
            }
            .into());
        }
        Ok(payload)
    }
}

/// Обрыв внутри аргумента: команда уже начата, поэтому любой недочёт байт
/// означает неожиданный конец потока.
fn truncated_to_resp(
    err: StackError,
    context: &str,
) -> StackError {
    let truncated = err
        .downcast_ref::<RdbError>()
        .is_some_and(RdbError::is_truncated);
    if truncated {
        RespError::UnexpectedEof {
            context: context.to_string(),
        }
        .into()
    } else {
        err
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl CommandHandler for LogCommandHandler {
    async fn handle_cmd(
        &mut self,
        cmd: Cmd,
    ) -> CutoverResult<()> {
        self.commands += 1;
        debug!(%cmd, seq = self.commands, "Replicated command");
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for ChannelCommandHandler {
    async fn handle_cmd(
        &mut self,
        cmd: Cmd,
    ) -> CutoverResult<()> {
        self.tx.send(cmd).await.map_err(|_| {
            TransitionError::TaskFailed {
                task: "command consumer".to_string(),
                reason: "receiver dropped".to_string(),
            }
            .into()
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
