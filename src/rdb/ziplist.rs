//! Декодер компактного контейнера ziplist.
//!
//! Раскладка блоба:
//!
//! ```text
//! <zlbytes:u32 LE> <zltail:u32 LE> <zllen:u16 LE> <entry>* <0xFF>
//! entry = <prevlen> <flag+payload>
//! ```
//!
//! Блоб уже целиком прочитан из снимка (как строка), поэтому разбор идёт
//! синхронно поверх [`Bytes`].

use std::fmt;

use bytes::{Buf, Bytes};
use cutover_error::{CutoverResult, RdbError};

use super::tags::{ZIP_BIG_PREVLEN, ZIP_END};

const HEADER_LEN: usize = 10;

/// Значение элемента ziplist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipValue {
    Str(Bytes),
    Int(i64),
}

/// Элемент ziplist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Длина предыдущего элемента (для обхода с конца, при разборе не нужна).
    pub prev_len: u32,
    pub value: ZipValue,
}

/// Разобранный заголовок и непрочитанная часть блоба.
#[derive(Debug, Clone)]
pub struct Ziplist {
    buf: Bytes,
    total_bytes: u32,
    tail_offset: u32,
    count: u16,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ZipValue {
    /// Строковое представление: целые числа превращаются в десятичный текст.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Str(b) => b.clone(),
            Self::Int(n) => Bytes::from(n.to_string()),
        }
    }
}

impl Ziplist {
    /// Читает 10-байтовый заголовок.
    pub fn parse(blob: Bytes) -> CutoverResult<Self> {
        let mut zl = Self {
            buf: blob,
            total_bytes: 0,
            tail_offset: 0,
            count: 0,
        };
        let mut header = zl.take(HEADER_LEN, "ziplist header")?;
        zl.total_bytes = header.get_u32_le();
        zl.tail_offset = header.get_u32_le();
        zl.count = header.get_u16_le();
        Ok(zl)
    }

    /// Объявленное кол-во элементов.
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn tail_offset(&self) -> u32 {
        self.tail_offset
    }

    /// Декодирует ровно `count` элементов, не проверяя маркер конца.
    pub fn decode_entries(&mut self) -> CutoverResult<Vec<Entry>> {
        let mut entries = Vec::with_capacity(usize::from(self.count));
        for _ in 0..self.count {
            entries.push(self.decode_entry()?);
        }
        Ok(entries)
    }

    /// Проверяет маркер `0xFF` после последнего элемента.
    pub fn expect_end(&mut self) -> CutoverResult<()> {
        if !self.buf.has_remaining() {
            return Err(RdbError::MissingEndMarker { got: None }.into());
        }
        match self.buf.get_u8() {
            ZIP_END => Ok(()),
            other => Err(RdbError::MissingEndMarker { got: Some(other) }.into()),
        }
    }

    /// Строгий разбор: элементы и обязательный маркер конца.
    pub fn decode(mut self) -> CutoverResult<Vec<Entry>> {
        let entries = self.decode_entries()?;
        self.expect_end()?;
        Ok(entries)
    }

    fn decode_entry(&mut self) -> CutoverResult<Entry> {
        let prev_len = self.decode_prev_len()?;
        let value = self.decode_value()?;
        Ok(Entry { prev_len, value })
    }

    fn decode_prev_len(&mut self) -> CutoverResult<u32> {
        match self.take_u8("ziplist previous entry length")? {
            ZIP_BIG_PREVLEN => Ok(self
                .take(4, "ziplist previous entry length")?
                .get_u32_le()),
            ZIP_END => Err(RdbError::MalformedLength {
                reason: "illegal ziplist previous entry length".to_string(),
                byte: Some(ZIP_END),
            }
            .into()),
            small => Ok(u32::from(small)),
        }
    }

    fn decode_value(&mut self) -> CutoverResult<ZipValue> {
        let flag = self.take_u8("ziplist entry flag")?;

        let str_len = match flag >> 6 {
            0b00 => Some(usize::from(flag & 0x3F)),
            0b01 => {
                let next = self.take_u8("ziplist 14-bit length")?;
                Some((usize::from(flag & 0x3F) << 8) | usize::from(next))
            }
            0b10 => Some(self.take(4, "ziplist 32-bit length")?.get_u32() as usize),
            _ => None,
        };
        if let Some(len) = str_len {
            return Ok(ZipValue::Str(self.take(len, "ziplist string")?));
        }

        let n = match flag >> 4 {
            0xC => i64::from(self.take(2, "ziplist int16")?.get_i16_le()),
            0xD => i64::from(self.take(4, "ziplist int32")?.get_i32_le()),
            0xE => self.take(8, "ziplist int64")?.get_i64_le(),
            _ => match flag {
                0xF0 => {
                    let b = self.take(3, "ziplist int24")?;
                    i64::from(i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8)
                }
                0xFE => i64::from(self.take(1, "ziplist int8")?.get_i8()),
                0xF1..=0xFD => i64::from(flag & 0x0F) - 1,
                other => return Err(RdbError::UnknownEntryFlag { flag: other }.into()),
            },
        };
        Ok(ZipValue::Int(n))
    }

    fn take_u8(
        &mut self,
        context: &str,
    ) -> CutoverResult<u8> {
        Ok(self.take(1, context)?[0])
    }

    fn take(
        &mut self,
        len: usize,
        context: &str,
    ) -> CutoverResult<Bytes> {
        let available = self.buf.remaining();
        if available < len {
            let err = if available == 0 {
                RdbError::EndOfInput {
                    context: context.to_string(),
                }
            } else {
                RdbError::UnexpectedEof {
                    context: context.to_string(),
                    expected_bytes: Some(len as u64),
                    got_bytes: Some(available as u64),
                }
            };
            return Err(err.into());
        }
        Ok(self.buf.split_to(len))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for ZipValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Str(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
