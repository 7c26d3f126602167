use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки кодека команд и ответов.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespError {
    /// Соединение закрыто до начала очередного кадра
    EndOfInput,
    /// Соединение закрыто посреди кадра
    UnexpectedEof { context: String },
    /// Нарушено обрамление кадра
    MalformedFraming { expected: String, got: String },
    /// Не удалось разобрать целое число
    InvalidInteger { value: String },
    /// Неизвестный маркер типа ответа
    UnknownReplyType { marker: u8 },
}

impl std::fmt::Display for RespError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::EndOfInput => write!(f, "Connection closed"),
            Self::UnexpectedEof { context } => write!(f, "Unexpected EOF while reading {context}"),
            Self::MalformedFraming { expected, got } => {
                write!(f, "Malformed framing: expected {expected}, got {got:?}")
            }
            Self::InvalidInteger { value } => write!(f, "Invalid integer: {value:?}"),
            Self::UnknownReplyType { marker } => {
                write!(f, "Unknown reply type marker 0x{marker:02X}")
            }
        }
    }
}

impl std::error::Error for RespError {}

impl ErrorExt for RespError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::EndOfInput => StatusCode::EndOfInput,
            Self::UnexpectedEof { .. } => StatusCode::UnexpectedEof,
            Self::MalformedFraming { .. } => StatusCode::InvalidFrame,
            Self::InvalidInteger { .. } => StatusCode::InvalidInteger,
            Self::UnknownReplyType { .. } => StatusCode::ParseError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::EndOfInput | Self::UnexpectedEof { .. } => "Connection closed".to_string(),
            _ => "Protocol error".to_string(),
        }
    }
}
