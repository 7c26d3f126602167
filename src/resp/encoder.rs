//! Кодирование исходящих команд.
//!
//! Клиент отправляет только массивы bulk-строк:
//!
//! ```text
//! *<argc>\r\n ($<len>\r\n<bytes>\r\n){argc}
//! ```

use bytes::{BufMut, BytesMut};
use cutover_error::{ClientError, CutoverResult};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::Cmd;

/// Кодирует команду в буфер.
pub fn encode_cmd_into(
    cmd: &Cmd,
    out: &mut BytesMut,
) {
    let parts = cmd.parts();
    out.put_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        out.put_slice(format!("${}\r\n", part.len()).as_bytes());
        out.put_slice(part);
        out.put_slice(b"\r\n");
    }
}

/// Кодирует команду в новый буфер.
pub fn encode_cmd(cmd: &Cmd) -> BytesMut {
    let size: usize = cmd.parts().iter().map(|p| p.len() + 16).sum();
    let mut out = BytesMut::with_capacity(size + 16);
    encode_cmd_into(cmd, &mut out);
    out
}

/// Кодирует и отправляет команду, сбрасывая буфер записи.
pub async fn write_cmd<W>(
    w: &mut W,
    cmd: &Cmd,
) -> CutoverResult<()>
where
    W: AsyncWrite + Unpin,
{
    trace!(%cmd, "Sending command");
    let buf = encode_cmd(cmd);
    w.write_all(&buf)
        .await
        .map_err(|e| ClientError::WriteFailed {
            reason: e.to_string(),
        })?;
    w.flush().await.map_err(|e| ClientError::WriteFailed {
        reason: e.to_string(),
    })?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
