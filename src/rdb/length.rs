//! Кодирование длин в снимке.
//!
//! Первые два бита первого байта выбирают раскладку:
//! - `00` — 6-битная длина в том же байте,
//! - `01` — 14-битная длина (6 бит + следующий байт),
//! - `10` — 32-битная big-endian длина в следующих 4 байтах,
//! - `11` — специальное кодирование (целое число или LZF-строка).

use cutover_error::{CutoverResult, RdbError};
use tokio::io::AsyncRead;

use super::reader::{read_continuation, read_u8};

/// Декодированная длина.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    SixBit(u32),
    FourteenBit(u32),
    FourByte(u32),
    /// Строка хранится как целое число шириной `n` байт.
    EncodedInt(u32),
    /// LZF-строка: `length` байт сжатых данных, `verify_length` после
    /// распаковки.
    Compressed { length: u32, verify_length: u32 },
}

impl Length {
    /// Числовое значение длины (для сжатых строк — размер сжатых данных).
    pub fn value(&self) -> u32 {
        match *self {
            Self::SixBit(n) | Self::FourteenBit(n) | Self::FourByte(n) | Self::EncodedInt(n) => n,
            Self::Compressed { length, .. } => length,
        }
    }

    /// Специальное кодирование (целое число или сжатая строка).
    pub fn is_encoded(&self) -> bool {
        matches!(self, Self::EncodedInt(_) | Self::Compressed { .. })
    }
}

pub async fn decode_length<R>(r: &mut R) -> CutoverResult<Length>
where
    R: AsyncRead + Unpin,
{
    let first = read_u8(r, "length").await?;
    if first >> 6 == 0b11 {
        decode_special(r, first).await
    } else {
        decode_plain(r, first).await
    }
}

async fn decode_plain<R>(
    r: &mut R,
    first: u8,
) -> CutoverResult<Length>
where
    R: AsyncRead + Unpin,
{
    match first >> 6 {
        0b00 => Ok(Length::SixBit(u32::from(first & 0x3F))),
        0b01 => {
            let [next] = read_continuation::<_, 1>(r, "14-bit length").await?;
            Ok(Length::FourteenBit(
                (u32::from(first & 0x3F) << 8) | u32::from(next),
            ))
        }
        0b10 => {
            let buf = read_continuation::<_, 4>(r, "32-bit length").await?;
            Ok(Length::FourByte(u32::from_be_bytes(buf)))
        }
        _ => Err(RdbError::MalformedLength {
            reason: "special encoding where a plain length is required".to_string(),
            byte: Some(first),
        }
        .into()),
    }
}

async fn decode_special<R>(
    r: &mut R,
    first: u8,
) -> CutoverResult<Length>
where
    R: AsyncRead + Unpin,
{
    match first & 0x3F {
        format @ (0 | 1) => Ok(Length::EncodedInt(u32::from(format) + 1)),
        2 => Ok(Length::EncodedInt(4)),
        3 => {
            let length = decode_nested(r).await?;
            let verify_length = decode_nested(r).await?;
            Ok(Length::Compressed {
                length,
                verify_length,
            })
        }
        other => Err(RdbError::MalformedLength {
            reason: format!("unknown special format {other}"),
            byte: Some(first),
        }
        .into()),
    }
}

/// Длина внутри сжатой строки: повторное специальное кодирование запрещено.
async fn decode_nested<R>(r: &mut R) -> CutoverResult<u32>
where
    R: AsyncRead + Unpin,
{
    let [first] = read_continuation::<_, 1>(r, "compressed length").await?;
    if first >> 6 == 0b11 {
        return Err(RdbError::MalformedLength {
            reason: "nested special encoding".to_string(),
            byte: Some(first),
        }
        .into());
    }
    Ok(decode_plain(r, first).await?.value())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
