//! Строки снимка: обычные, целочисленные и LZF-сжатые.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use cutover_error::{CutoverResult, RdbError, ResultExt};
use tokio::io::AsyncRead;

use super::{
    length::{decode_length, Length},
    lzf,
    reader::{check_field_len, read_bytes},
};

/// Читает ровно `length` байт строки.
pub async fn decode_length_prefixed_string<R>(
    r: &mut R,
    length: u32,
) -> CutoverResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    read_bytes(r, length as usize, "string payload").await
}

/// Читает `width` байт, дополняет слева нулями до 4 и интерпретирует как
/// big-endian `u32`.
pub async fn decode_encoded_int<R>(
    r: &mut R,
    width: u32,
) -> CutoverResult<u32>
where
    R: AsyncRead + Unpin,
{
    if width > 4 {
        return Err(RdbError::MalformedLength {
            reason: format!("encoded integer width {width} exceeds 4 bytes"),
            byte: None,
        }
        .into());
    }
    let raw = read_bytes(r, width as usize, "encoded integer").await?;
    let mut padded = [0u8; 4];
    padded[4 - raw.len()..].copy_from_slice(&raw);
    Ok(BigEndian::read_u32(&padded))
}

/// Читает `compressed_len` байт и распаковывает их в `decompressed_len`.
pub async fn decode_compressed<R>(
    r: &mut R,
    compressed_len: u32,
    decompressed_len: u32,
) -> CutoverResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    check_field_len(decompressed_len as usize, "decompressed string")?;
    let data = read_bytes(r, compressed_len as usize, "compressed string").await?;
    let out = lzf::decompress(&data, decompressed_len as usize)
        .with_context(|| format!("Decompressing {compressed_len} bytes"))?;
    Ok(Bytes::from(out))
}

/// Значение строки по уже прочитанной длине.
///
/// Целочисленная строка отдаётся десятичным текстом.
pub async fn decode_string_with<R>(
    r: &mut R,
    length: Length,
) -> CutoverResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    match length {
        Length::EncodedInt(width) => {
            let n = decode_encoded_int(r, width).await?;
            Ok(Bytes::from(n.to_string()))
        }
        Length::Compressed {
            length,
            verify_length,
        } => decode_compressed(r, length, verify_length).await,
        plain => decode_length_prefixed_string(r, plain.value()).await,
    }
}

/// Строка целиком: длина и значение.
pub async fn decode_string<R>(r: &mut R) -> CutoverResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    let length = decode_length(r).await?;
    decode_string_with(r, length).await
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
