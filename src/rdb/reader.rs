//! Низкоуровневое чтение из асинхронного источника байт.
//!
//! Каждое поле читается целиком. Если источник пуст до первого байта поля,
//! возвращается [`RdbError::EndOfInput`], если поле оборвалось посередине —
//! [`RdbError::UnexpectedEof`].

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use cutover_error::{ensure, CutoverResult, RdbError};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, ReadBuf};

/// Заполняет `buf` целиком.
pub async fn read_exact_field<R>(
    r: &mut R,
    buf: &mut [u8],
    context: &str,
) -> CutoverResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(RdbError::EndOfInput {
                    context: context.to_string(),
                }
                .into());
            }
            return Err(RdbError::UnexpectedEof {
                context: context.to_string(),
                expected_bytes: Some(buf.len() as u64),
                got_bytes: Some(filled as u64),
            }
            .into());
        }
        filled += n;
    }
    Ok(())
}

pub async fn read_u8<R>(
    r: &mut R,
    context: &str,
) -> CutoverResult<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1];
    read_exact_field(r, &mut buf, context).await?;
    Ok(buf[0])
}

pub async fn read_array<R, const N: usize>(
    r: &mut R,
    context: &str,
) -> CutoverResult<[u8; N]>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; N];
    read_exact_field(r, &mut buf, context).await?;
    Ok(buf)
}

/// Читает продолжение уже начатого поля. Пустой источник здесь означает
/// обрыв посередине поля, а не конец данных.
pub async fn read_continuation<R, const N: usize>(
    r: &mut R,
    context: &str,
) -> CutoverResult<[u8; N]>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; N];
    let res = read_exact_field(r, &mut buf, context).await;
    match res {
        Err(e) if matches!(e.downcast_ref::<RdbError>(), Some(RdbError::EndOfInput { .. })) => {
            Err(RdbError::UnexpectedEof {
                context: context.to_string(),
                expected_bytes: Some(N as u64),
                got_bytes: Some(0),
            }
            .into())
        }
        other => other.map(|()| buf),
    }
}

/// Верхняя граница длины одного поля (строки снимка или аргумента команды).
pub const MAX_FIELD_LEN: usize = 512 * 1024 * 1024;

/// Начальный размер буфера, когда длина поля пришла из заголовка.
const INITIAL_FIELD_CAPACITY: usize = 64 * 1024;

/// Проверяет объявленную длину поля до чтения.
pub fn check_field_len(
    len: usize,
    context: &str,
) -> CutoverResult<()> {
    ensure!(
        len <= MAX_FIELD_LEN,
        RdbError::MalformedLength {
            reason: format!("{context} of {len} bytes exceeds the {MAX_FIELD_LEN} byte limit"),
            byte: None,
        }
    );
    Ok(())
}

/// Читает поле длиной `len`.
///
/// Буфер растёт по мере поступления данных, так что заголовок с огромной
/// длиной не приводит к выделению памяти под неё заранее.
pub async fn read_bytes<R>(
    r: &mut R,
    len: usize,
    context: &str,
) -> CutoverResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    check_field_len(len, context)?;
    let mut buf = Vec::with_capacity(len.min(INITIAL_FIELD_CAPACITY));
    AsyncReadExt::take(&mut *r, len as u64)
        .read_to_end(&mut buf)
        .await?;

    if buf.len() < len {
        if buf.is_empty() {
            return Err(RdbError::EndOfInput {
                context: context.to_string(),
            }
            .into());
        }
        return Err(RdbError::UnexpectedEof {
            context: context.to_string(),
            expected_bytes: Some(len as u64),
            got_bytes: Some(buf.len() as u64),
        }
        .into());
    }
    Ok(Bytes::from(buf))
}

/// Обёртка, считающая прочитанные байты.
///
/// Используется декодером снимка для указания смещения в ошибках и
/// прозрачно пропускает буферизацию нижележащего reader'а.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    /// Кол-во байт, прочитанных через обёртку.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &res {
            self.count += (buf.filled().len() - before) as u64;
        }
        res
    }
}

impl<R: AsyncBufRead + Unpin> AsyncBufRead for CountingReader<R> {
    fn poll_fill_buf(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(
        mut self: Pin<&mut Self>,
        amt: usize,
    ) {
        self.count += amt as u64;
        Pin::new(&mut self.inner).consume(amt);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_exact_field_empty_is_end_of_input() {
        let mut src: &[u8] = &[];
        let err = read_u8(&mut src, "opcode").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::EndOfInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_exact_field_partial_is_unexpected_eof() {
        let mut src: &[u8] = &[1, 2];
        let err = read_array::<_, 4>(&mut src, "length").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::UnexpectedEof {
                expected_bytes: Some(4),
                got_bytes: Some(2),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_continuation_of_empty_source_is_unexpected_eof() {
        let mut src: &[u8] = &[];
        let err = read_continuation::<_, 1>(&mut src, "14-bit length")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::UnexpectedEof { got_bytes: Some(0), .. })
        ));
    }

    #[tokio::test]
    async fn test_read_bytes_zero_len() {
        let mut src: &[u8] = &[];
        let b = read_bytes(&mut src, 0, "empty string").await.unwrap();
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn test_read_bytes_rejects_oversized_length() {
        let mut src: &[u8] = b"abc";
        let err = read_bytes(&mut src, u32::MAX as usize, "string payload")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::MalformedLength { byte: None, .. })
        ));
        // Источник не тронут
        assert_eq!(src, b"abc");
    }

    #[tokio::test]
    async fn test_read_bytes_large_declared_len_short_source() {
        let mut src: &[u8] = b"abc";
        let err = read_bytes(&mut src, 1 << 20, "string payload")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::UnexpectedEof {
                expected_bytes: Some(1_048_576),
                got_bytes: Some(3),
                ..
            })
        ));

        let mut empty: &[u8] = &[];
        let err = read_bytes(&mut empty, 8, "string payload")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::EndOfInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_counting_reader_counts() {
        let data: &[u8] = b"REDIS0006\xff";
        let mut r = CountingReader::new(data);
        let magic = read_array::<_, 9>(&mut r, "magic").await.unwrap();
        assert_eq!(&magic, b"REDIS0006");
        assert_eq!(r.count(), 9);
        read_u8(&mut r, "opcode").await.unwrap();
        assert_eq!(r.count(), 10);
    }
}
