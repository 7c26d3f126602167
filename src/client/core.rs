use std::{fmt, net::SocketAddr, time::Duration};

use bytes::Bytes;
use cutover_error::{ClientError, CutoverResult};
use tokio::{
    io::{AsyncRead, AsyncWrite, BufReader, BufWriter},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::Mutex,
};
use tracing::{debug, info};

use super::Connection;
use crate::resp::{Cmd, Reply};

/// Клиент поверх TCP.
pub type TcpClient = Client<OwnedReadHalf, OwnedWriteHalf>;

/// Параметр для `config set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    HashMaxZiplistValue,
    HashMaxZiplistEntries,
}

/// Состояние соединения клиента.
///
/// Переход `Ready → Streaming` односторонний.
enum ClientState<R, W> {
    Ready(Connection<R, W>),
    /// После `sync`: чтение отдано вызывающему, запись держим открытой,
    /// иначе сервер увидит закрытие и оборвёт репликацию.
    Streaming { _writer: Option<BufWriter<W>> },
}

/// Клиент, сериализующий команды по одному соединению.
///
/// Все команды выполняются под одной блокировкой: протокол строго «запрос →
/// ответ», любое чередование испортило бы обрамление.
pub struct Client<R, W> {
    state: Mutex<ClientState<R, W>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HashMaxZiplistValue => "hash-max-ziplist-value",
            Self::HashMaxZiplistEntries => "hash-max-ziplist-entries",
        }
    }
}

impl Client<OwnedReadHalf, OwnedWriteHalf> {
    /// Подключается к серверу.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
    ) -> CutoverResult<Self> {
        info!("Connecting to source server {addr}");
        let connection = Connection::connect(addr, connect_timeout).await?;
        Ok(Self::new(connection))
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(connection: Connection<R, W>) -> Self {
        Self {
            state: Mutex::new(ClientState::Ready(connection)),
        }
    }

    pub async fn del<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> CutoverResult<Reply>
    where
        K: Into<Bytes>,
    {
        let cmd = keys.into_iter().fold(Cmd::new("del"), |cmd, k| cmd.arg(k));
        debug!("DEL {} keys", cmd.args().len());
        self.execute(cmd).await
    }

    pub async fn flush_db(&self) -> CutoverResult<Reply> {
        debug!("FLUSHDB");
        self.execute(Cmd::new("flushdb")).await
    }

    /// `lpush key value [value ...]`.
    pub async fn lpush<V>(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        more: impl IntoIterator<Item = V>,
    ) -> CutoverResult<Reply>
    where
        V: Into<Bytes>,
    {
        let cmd = Cmd::new("lpush").arg(key).arg(value);
        let cmd = more.into_iter().fold(cmd, |cmd, v| cmd.arg(v));
        debug!("LPUSH {}", cmd.args().len() - 1);
        self.execute(cmd).await
    }

    pub async fn select(
        &self,
        db: u32,
    ) -> CutoverResult<Reply> {
        debug!("SELECT {db}");
        self.execute(Cmd::new("select").arg(db.to_string())).await
    }

    pub async fn set(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> CutoverResult<Reply> {
        let key = key.into();
        debug!("SET {}", String::from_utf8_lossy(&key));
        self.execute(Cmd::new("set").arg(key).arg(value)).await
    }

    pub async fn setex(
        &self,
        key: impl Into<Bytes>,
        seconds: u64,
        value: impl Into<Bytes>,
    ) -> CutoverResult<Reply> {
        let key = key.into();
        debug!("SETEX {} {seconds}", String::from_utf8_lossy(&key));
        let cmd = Cmd::new("setex")
            .arg(key)
            .arg(seconds.to_string())
            .arg(value);
        self.execute(cmd).await
    }

    pub async fn hset(
        &self,
        key: impl Into<Bytes>,
        field: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> CutoverResult<Reply> {
        let key = key.into();
        debug!("HSET {}", String::from_utf8_lossy(&key));
        self.execute(Cmd::new("hset").arg(key).arg(field).arg(value))
            .await
    }

    pub async fn config_set(
        &self,
        key: ConfigKey,
        value: impl Into<Bytes>,
    ) -> CutoverResult<Reply> {
        debug!("CONFIG SET {}", key.as_str());
        let cmd = Cmd::new("config")
            .arg("set")
            .arg(key.as_str())
            .arg(value);
        self.execute(cmd).await
    }

    /// Отправляет `sync` и ждёт единственный ответ перед снимком.
    ///
    /// Возвращает источник байт, позиционированный на начале снимка. После
    /// вызова клиент больше не принимает команд: любой вызов, включая
    /// повторный `begin_streaming`, завершится [`ClientError::AlreadyStreaming`].
    pub async fn begin_streaming(&self) -> CutoverResult<(BufReader<R>, Reply)> {
        let mut state = self.state.lock().await;

        // Переход фиксируется до первой записи: после `sync` соединение
        // уже нельзя вернуть в режим команд.
        let taken = std::mem::replace(&mut *state, ClientState::Streaming { _writer: None });
        let mut conn = match taken {
            ClientState::Ready(conn) => conn,
            streaming => {
                *state = streaming;
                return Err(ClientError::AlreadyStreaming.into());
            }
        };

        info!("Requesting snapshot (SYNC)");
        let reply = conn.execute_waiting(&Cmd::new("sync")).await;
        let (reader, writer) = conn.into_parts();
        *state = ClientState::Streaming {
            _writer: Some(writer),
        };

        let reply = reply?;
        debug!(%reply, "SYNC reply received");
        Ok((reader, reply))
    }

    /// Клиент уже переведён в режим потока.
    pub async fn is_streaming(&self) -> bool {
        matches!(&*self.state.lock().await, ClientState::Streaming { .. })
    }

    async fn execute(
        &self,
        cmd: Cmd,
    ) -> CutoverResult<Reply> {
        let mut state = self.state.lock().await;
        match &mut *state {
            ClientState::Ready(conn) => conn.execute(&cmd).await,
            ClientState::Streaming { .. } => Err(ClientError::AlreadyStreaming.into()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<R, W> fmt::Debug for Client<R, W> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = match self.state.try_lock() {
            Ok(guard) => match &*guard {
                ClientState::Ready(_) => "ready",
                ClientState::Streaming { .. } => "streaming",
            },
            Err(_) => "busy",
        };
        f.debug_struct("Client").field("state", &state).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
