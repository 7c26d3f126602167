use crate::{ErrorExt, StatusCode};

/// Ошибки клиента.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Соединение уже переведено в режим потоковой репликации
    AlreadyStreaming,
    /// Ошибка подключения к серверу
    ConnectionFailed { address: String, reason: String },
    /// Таймаут подключения
    ConnectionTimeout { address: String },
    /// Соединение закрыто сервером
    ConnectionClosed,
    /// Не удалось отправить команду
    WriteFailed { reason: String },
}

impl std::fmt::Display for ClientError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::AlreadyStreaming => write!(f, "Client is already streaming"),
            Self::ConnectionFailed { address, reason } => {
                write!(f, "Failed to connect to {address}: {reason}")
            }
            Self::ConnectionTimeout { address } => write!(f, "Connection to {address} timed out"),
            Self::ConnectionClosed => write!(f, "Connection closed by server"),
            Self::WriteFailed { reason } => write!(f, "Failed to write command: {reason}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl ErrorExt for ClientError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyStreaming => StatusCode::AlreadyStreaming,
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectionTimeout { .. } => StatusCode::Timeout,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::WriteFailed { .. } => StatusCode::WriteFailed,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::ConnectionFailed { address, .. } => {
                format!("Failed to connect to {address}")
            }
            Self::WriteFailed { .. } => "Network error occurred".to_string(),
            other => other.to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "client".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        if let Self::ConnectionFailed { address, .. } | Self::ConnectionTimeout { address } = self {
            tags.push(("address", address.clone()));
        }

        tags
    }
}
