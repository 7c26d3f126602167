//! Декодирование одиночных ответов сервера.
//!
//! Для bulk-строки декодер читает только заголовок `$<len>`: сами байты
//! принадлежат следующему декодеру (например, снимку после `sync`).

use std::fmt;

use cutover_error::{bail, CutoverResult, RespError, StatusCode};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

/// Тип ответа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    SimpleString,
    Error,
    Integer,
    BulkString,
}

/// Одиночный ответ сервера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`
    Simple(String),
    /// `-ERR ...`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$<len>`: объявленная длина, полезная нагрузка ещё не прочитана
    Bulk(i64),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Reply {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Self::Simple(_) => ReplyKind::SimpleString,
            Self::Error(_) => ReplyKind::Error,
            Self::Integer(_) => ReplyKind::Integer,
            Self::Bulk(_) => ReplyKind::BulkString,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Simple(s) if s == "OK")
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_bulk_string(&self) -> bool {
        matches!(self, Self::Bulk(_))
    }

    pub fn bulk_len(&self) -> Option<i64> {
        match self {
            Self::Bulk(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Текст простой строки или ошибки.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Simple(s) | Self::Error(s) => Some(s),
            _ => None,
        }
    }

    /// Проверяет ответ на команду, создающую объект: `1` — создан, `0` —
    /// уже существует.
    pub fn check_created(&self) -> CutoverResult<()> {
        match self {
            Self::Integer(1) => Ok(()),
            Self::Integer(0) => bail!(StatusCode::AlreadyExists, "Object already exists"),
            other => bail!(StatusCode::Unexpected, "Unexpected reply: {}", other),
        }
    }
}

/// Читает одну строку до `\n` и отрезает терминатор (`\r\n` или `\n`).
pub(crate) async fn read_line<R>(
    r: &mut R,
    context: &str,
) -> CutoverResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = r.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(RespError::EndOfInput.into());
    }
    if line.pop() != Some(b'\n') {
        return Err(RespError::UnexpectedEof {
            context: context.to_string(),
        }
        .into());
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

pub(crate) fn parse_int(text: &[u8]) -> CutoverResult<i64> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            RespError::InvalidInteger {
                value: String::from_utf8_lossy(text).into_owned(),
            }
            .into()
        })
}

fn parse_reply(line: &[u8]) -> CutoverResult<Reply> {
    let Some((&marker, rest)) = line.split_first() else {
        return Err(RespError::MalformedFraming {
            expected: "reply marker".to_string(),
            got: String::new(),
        }
        .into());
    };
    let text = || String::from_utf8_lossy(rest).trim().to_string();

    let reply = match marker {
        b'+' => Reply::Simple(text()),
        b'-' => Reply::Error(text()),
        b':' => Reply::Integer(parse_int(rest)?),
        b'$' => Reply::Bulk(parse_int(rest)?),
        other => return Err(RespError::UnknownReplyType { marker: other }.into()),
    };
    Ok(reply)
}

/// Декодирует один ответ.
pub async fn decode_reply<R>(r: &mut R) -> CutoverResult<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(r, "reply").await?;
    let reply = parse_reply(&line)?;
    trace!(%reply, "Reply received");
    Ok(reply)
}

/// Как [`decode_reply`], но пропускает пустые keep-alive строки, которые
/// сервер шлёт, пока готовит снимок.
pub async fn wait_reply<R>(r: &mut R) -> CutoverResult<Reply>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = read_line(r, "reply").await?;
        if line.iter().all(u8::is_ascii_whitespace) {
            trace!("Keep-alive line skipped");
            continue;
        }
        let reply = parse_reply(&line)?;
        trace!(%reply, "Reply received");
        return Ok(reply);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for Reply {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Simple(s) => write!(f, "+{s}"),
            Self::Error(s) => write!(f, "-{s}"),
            Self::Integer(n) => write!(f, ":{n}"),
            Self::Bulk(n) => write!(f, "${n}"),
        }
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::SimpleString => "simple string",
            Self::Error => "error",
            Self::Integer => "integer",
            Self::BulkString => "bulk string",
        };
        f.write_str(name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(b"+OK\r\n", Reply::Simple("OK".to_string()))]
    #[case(b"-ERR unknown command\r\n", Reply::Error("ERR unknown command".to_string()))]
    #[case(b":1\r\n", Reply::Integer(1))]
    #[case(b":-42\r\n", Reply::Integer(-42))]
    #[case(b"$1024\r\n", Reply::Bulk(1024))]
    #[case(b"$-1\r\n", Reply::Bulk(-1))]
    #[tokio::test]
    async fn test_decode_reply(
        #[case] input: &[u8],
        #[case] expected: Reply,
    ) {
        let mut src = input;
        assert_eq!(decode_reply(&mut src).await.unwrap(), expected);
        assert!(src.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_payload_left_unread() {
        let mut src: &[u8] = b"$9\r\nREDIS0009";
        let reply = decode_reply(&mut src).await.unwrap();
        assert!(reply.is_bulk_string());
        assert_eq!(reply.bulk_len(), Some(9));
        assert_eq!(src, b"REDIS0009");
    }

    #[tokio::test]
    async fn test_reply_predicates() {
        let ok = Reply::Simple("OK".to_string());
        assert!(ok.is_ok());
        assert_eq!(ok.kind(), ReplyKind::SimpleString);
        assert!(!Reply::Simple("PONG".to_string()).is_ok());
        assert!(Reply::Error("ERR".to_string()).is_err());
        assert_eq!(Reply::Integer(3).as_int(), Some(3));
        assert_eq!(Reply::Error("ERR x".to_string()).text(), Some("ERR x"));
    }

    #[test]
    fn test_check_created() {
        assert!(Reply::Integer(1).check_created().is_ok());
        assert_eq!(
            Reply::Integer(0).check_created().unwrap_err().status_code(),
            StatusCode::AlreadyExists
        );
        assert_eq!(
            Reply::Simple("OK".to_string())
                .check_created()
                .unwrap_err()
                .status_code(),
            StatusCode::Unexpected
        );
    }

    #[tokio::test]
    async fn test_wait_reply_skips_keep_alives() {
        let mut src: &[u8] = b"\n\n\r\n$5\r\nREDIS";
        let reply = wait_reply(&mut src).await.unwrap();
        assert_eq!(reply, Reply::Bulk(5));
        assert_eq!(src, b"REDIS");
    }

    #[tokio::test]
    async fn test_invalid_integer() {
        let mut src: &[u8] = b":abc\r\n";
        let err = decode_reply(&mut src).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RespError>(),
            Some(RespError::InvalidInteger { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_marker() {
        let mut src: &[u8] = b"*2\r\n";
        let err = decode_reply(&mut src).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RespError>(),
            Some(&RespError::UnknownReplyType { marker: b'*' })
        );
    }

    #[tokio::test]
    async fn test_truncation_kinds() {
        let mut empty: &[u8] = b"";
        let err = decode_reply(&mut empty).await.unwrap_err();
        assert_eq!(err.downcast_ref::<RespError>(), Some(&RespError::EndOfInput));

        let mut partial: &[u8] = b"+O";
        let err = decode_reply(&mut partial).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RespError>(),
            Some(RespError::UnexpectedEof { .. })
        ));
    }
}
