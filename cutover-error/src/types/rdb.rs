use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки разбора бинарного снимка (RDB) с контекстом для диагностики.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdbError {
    /// Источник исчерпан до начала очередного поля
    EndOfInput { context: String },

    /// Источник закончился посреди поля
    UnexpectedEof {
        context: String,
        expected_bytes: Option<u64>,
        got_bytes: Option<u64>,
    },

    /// Заголовок не начинается с `REDIS` или версия не из четырёх цифр
    InvalidMagic { got: Vec<u8> },

    /// Неизвестный формат длины или недопустимая вложенность
    MalformedLength { reason: String, byte: Option<u8> },

    /// Неизвестный флаг значения внутри ziplist
    UnknownEntryFlag { flag: u8 },

    /// После объявленного числа элементов ziplist нет байта `0xFF`
    MissingEndMarker { got: Option<u8> },

    /// Неизвестный тег типа значения
    UnknownValueType { tag: u8, key: Option<String> },

    /// Тег распознан, но разбор такого типа не реализован
    UnsupportedValueType { tag: u8, key: Option<String> },

    /// Секция базы закончилась раньше объявленного в RESIZEDB числа записей
    ShortSection {
        declared: u32,
        decoded: u32,
        opcode: u8,
    },

    /// Неизвестный опкод верхнего уровня
    UnknownOpcode { opcode: u8, offset: Option<u64> },

    /// Опкод распознан, но не поддерживается на верхнем уровне
    UnsupportedOpcode { opcode: u8, offset: Option<u64> },

    /// Размер после распаковки не совпал с заявленным
    ChecksumOrLengthMismatch { expected: u64, got: u64 },

    /// Повреждённый LZF-поток
    CompressionError { reason: String },
}

impl RdbError {
    /// Добавляет контекст ключа к ошибке типа значения.
    pub fn with_key(
        mut self,
        key: impl Into<String>,
    ) -> Self {
        if let Self::UnknownValueType { key: k, .. } | Self::UnsupportedValueType { key: k, .. } =
            &mut self
        {
            *k = Some(key.into());
        }
        self
    }

    /// Добавляет смещение к ошибке опкода.
    pub fn with_offset(
        mut self,
        offset: u64,
    ) -> Self {
        if let Self::UnknownOpcode { offset: o, .. } | Self::UnsupportedOpcode { offset: o, .. } =
            &mut self
        {
            *o = Some(offset);
        }
        self
    }

    /// Источник оборвался: полностью (`EndOfInput`) или посреди поля.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::EndOfInput { .. } | Self::UnexpectedEof { .. })
    }
}

impl std::fmt::Display for RdbError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::EndOfInput { context } => write!(f, "End of input while reading {context}"),
            Self::UnexpectedEof {
                context,
                expected_bytes,
                got_bytes,
            } => {
                write!(f, "Unexpected EOF: {context}")?;
                if let (Some(exp), Some(got)) = (expected_bytes, got_bytes) {
                    write!(f, " (expected {exp} bytes, got {got})")?;
                }
                Ok(())
            }
            Self::InvalidMagic { got } => {
                write!(
                    f,
                    "Invalid magic header: {}",
                    String::from_utf8_lossy(got).escape_debug()
                )
            }
            Self::MalformedLength { reason, byte } => {
                write!(f, "Malformed length: {reason}")?;
                if let Some(b) = byte {
                    write!(f, " (byte 0x{b:02X})")?;
                }
                Ok(())
            }
            Self::UnknownEntryFlag { flag } => write!(f, "Unknown ziplist entry flag 0x{flag:02X}"),
            Self::MissingEndMarker { got } => match got {
                Some(b) => write!(f, "Missing ziplist end marker: got 0x{b:02X}"),
                None => write!(f, "Missing ziplist end marker: blob exhausted"),
            },
            Self::UnknownValueType { tag, key } => {
                write!(f, "Unknown value type {tag}")?;
                write_key(f, key.as_deref())
            }
            Self::UnsupportedValueType { tag, key } => {
                write!(f, "Unsupported value type {tag}")?;
                write_key(f, key.as_deref())
            }
            Self::ShortSection {
                declared,
                decoded,
                opcode,
            } => write!(
                f,
                "Database section ended after {decoded} of {declared} rows at opcode 0x{opcode:02X}"
            ),
            Self::UnknownOpcode { opcode, offset } => {
                write!(f, "Unknown opcode 0x{opcode:02X}")?;
                write_offset(f, *offset)
            }
            Self::UnsupportedOpcode { opcode, offset } => {
                write!(f, "Unsupported top-level opcode 0x{opcode:02X}")?;
                write_offset(f, *offset)
            }
            Self::ChecksumOrLengthMismatch { expected, got } => {
                write!(
                    f,
                    "Decompressed length mismatch: expected {expected} bytes, got {got}"
                )
            }
            Self::CompressionError { reason } => write!(f, "Decompression error: {reason}"),
        }
    }
}

fn write_key(
    f: &mut std::fmt::Formatter<'_>,
    key: Option<&str>,
) -> std::fmt::Result {
    if let Some(k) = key {
        write!(f, " [key: {k}]")?;
    }
    Ok(())
}

fn write_offset(
    f: &mut std::fmt::Formatter<'_>,
    offset: Option<u64>,
) -> std::fmt::Result {
    if let Some(o) = offset {
        write!(f, " [offset: 0x{o:X}]")?;
    }
    Ok(())
}

impl std::error::Error for RdbError {}

impl ErrorExt for RdbError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::EndOfInput { .. } => StatusCode::EndOfInput,
            Self::UnexpectedEof { .. } => StatusCode::UnexpectedEof,
            Self::InvalidMagic { .. } => StatusCode::UnsupportedVersion,
            Self::MalformedLength { .. } => StatusCode::MalformedLength,
            Self::UnknownEntryFlag { .. }
            | Self::MissingEndMarker { .. }
            | Self::ShortSection { .. } => StatusCode::CorruptedData,
            Self::UnknownValueType { .. } => StatusCode::UnknownType,
            Self::UnsupportedValueType { .. } | Self::UnsupportedOpcode { .. } => {
                StatusCode::Unsupported
            }
            Self::UnknownOpcode { .. } => StatusCode::UnknownOpcode,
            Self::ChecksumOrLengthMismatch { .. } => StatusCode::CorruptedData,
            Self::CompressionError { .. } => StatusCode::DecompressionFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::EndOfInput { .. } | Self::UnexpectedEof { .. } => {
                "Snapshot stream is truncated".to_string()
            }
            Self::InvalidMagic { .. } => "Not a valid snapshot".to_string(),
            Self::UnsupportedValueType { tag, .. } => {
                format!("Value type {tag} is not supported")
            }
            Self::UnsupportedOpcode { opcode, .. } => {
                format!("Opcode 0x{opcode:02X} is not supported")
            }
            _ => "Snapshot is corrupted".to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
            ("truncated", self.is_truncated().to_string()),
        ];

        match self {
            Self::UnknownValueType { tag, .. } | Self::UnsupportedValueType { tag, .. } => {
                tags.push(("value_type", tag.to_string()));
            }
            Self::UnknownOpcode { opcode, .. }
            | Self::UnsupportedOpcode { opcode, .. }
            | Self::ShortSection { opcode, .. } => {
                tags.push(("opcode", format!("0x{opcode:02X}")));
            }
            _ => {}
        }

        tags
    }
}
