use std::{net::SocketAddr, time::Duration};

use cutover_error::{ClientError, CutoverResult, ResultExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tracing::{debug, trace};

use crate::resp::{decode_reply, wait_reply, write_cmd, Cmd, Reply};

/// Соединение поверх TCP.
pub type TcpConnection = Connection<OwnedReadHalf, OwnedWriteHalf>;

/// Соединение с сервером: буферизованные половины для чтения и записи.
///
/// Протокол строго «запрос → ответ», поэтому соединение не разделяется
/// между задачами; сериализацию обеспечивает [`crate::client::Client`].
#[derive(Debug)]
pub struct Connection<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Connection<OwnedReadHalf, OwnedWriteHalf> {
    /// Подключается к серверу с таймаутом.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
    ) -> CutoverResult<Self> {
        debug!("Connecting to {addr}");

        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectionTimeout {
                address: addr.to_string(),
            })?
            .map_err(|e| ClientError::ConnectionFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        debug!("Connection established with {addr}");

        let (read_half, write_half) = stream.into_split();
        Ok(Self::new(read_half, write_half))
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        reader: R,
        writer: W,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    /// Отправляет команду, не дожидаясь ответа.
    pub async fn send(
        &mut self,
        cmd: &Cmd,
    ) -> CutoverResult<()> {
        write_cmd(&mut self.writer, cmd).await
    }

    /// Отправляет команду и читает ровно один ответ.
    pub async fn execute(
        &mut self,
        cmd: &Cmd,
    ) -> CutoverResult<Reply> {
        self.send(cmd)
            .await
            .with_context(|| format!("Sending {}", cmd_name(cmd)))?;
        let reply = decode_reply(&mut self.reader)
            .await
            .with_context(|| format!("Reading reply to {}", cmd_name(cmd)))?;
        trace!(%reply, "Command executed");
        Ok(reply)
    }

    /// Отправляет команду и ждёт ответ, пропуская keep-alive строки.
    pub async fn execute_waiting(
        &mut self,
        cmd: &Cmd,
    ) -> CutoverResult<Reply> {
        self.send(cmd)
            .await
            .with_context(|| format!("Sending {}", cmd_name(cmd)))?;
        wait_reply(&mut self.reader)
            .await
            .with_context(|| format!("Waiting for reply to {}", cmd_name(cmd)))
    }

    /// Разбирает соединение на половины. Буферизованные, но ещё не
    /// прочитанные байты остаются в `BufReader`.
    pub fn into_parts(self) -> (BufReader<R>, BufWriter<W>) {
        (self.reader, self.writer)
    }

    /// Закрывает сторону записи.
    pub async fn close(mut self) -> CutoverResult<()> {
        self.writer
            .shutdown()
            .await
            .context("Failed to shutdown connection")
    }
}

fn cmd_name(cmd: &Cmd) -> String {
    cmd.name()
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_default()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use tokio::{
        io::{duplex, AsyncReadExt},
        net::TcpListener,
    };

    use super::*;

    #[tokio::test]
    async fn test_execute_roundtrip() {
        let (client_side, server_side) = duplex(1024);
        let (cr, cw) = tokio::io::split(client_side);
        let mut conn = Connection::new(cr, cw);

        let server = tokio::spawn(async move {
            let (mut sr, mut sw) = tokio::io::split(server_side);
            let mut buf = vec![0u8; 64];
            let n = sr.read(&mut buf).await.unwrap();
            sw.write_all(b"+OK\r\n").await.unwrap();
            buf.truncate(n);
            buf
        });

        let reply = conn.execute(&Cmd::new("select").arg("1")).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(server.await.unwrap(), b"*2\r\n$6\r\nselect\r\n$1\r\n1\r\n");
    }

    #[tokio::test]
    async fn test_execute_on_closed_peer() {
        let (client_side, server_side) = duplex(1024);
        drop(server_side);
        let (cr, cw) = tokio::io::split(client_side);
        let mut conn = Connection::new(cr, cw);
        let err = conn.execute(&Cmd::new("flushdb")).await.unwrap_err();
        assert_eq!(err.contexts().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Connection::connect(addr, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let conn = Connection::connect(addr, Duration::from_secs(1)).await.unwrap();
        accept.await.unwrap();
        conn.close().await.unwrap();
    }
}
