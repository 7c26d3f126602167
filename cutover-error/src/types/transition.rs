use crate::{ErrorExt, StatusCode};

/// Ошибки протокола переключения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Сервер ответил не тем, чего требует текущий шаг протокола
    ProtocolViolation {
        stage: String,
        expected: String,
        got: String,
    },
    /// Значение sentinel-ключа не является меткой времени
    InvalidWatermark { value: String },
    /// Фоновая задача завершилась аварийно
    TaskFailed { task: String, reason: String },
}

impl TransitionError {
    pub fn violation(
        stage: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::ProtocolViolation {
            stage: stage.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }
}

impl std::fmt::Display for TransitionError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::ProtocolViolation {
                stage,
                expected,
                got,
            } => write!(f, "Protocol violation at {stage}: expected {expected}, got {got}"),
            Self::InvalidWatermark { value } => write!(f, "Invalid watermark value: {value:?}"),
            Self::TaskFailed { task, reason } => write!(f, "Task {task} failed: {reason}"),
        }
    }
}

impl std::error::Error for TransitionError {}

impl ErrorExt for TransitionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ProtocolViolation { .. } => StatusCode::ProtocolViolation,
            Self::InvalidWatermark { .. } => StatusCode::InvalidWatermark,
            Self::TaskFailed { .. } => StatusCode::TaskFailed,
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "transition".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::ProtocolViolation { stage, .. } => tags.push(("stage", stage.clone())),
            Self::TaskFailed { task, .. } => tags.push(("task", task.clone())),
            Self::InvalidWatermark { .. } => {}
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let err = TransitionError::violation("sync", "bulk string", "+OK");
        assert_eq!(err.status_code(), StatusCode::ProtocolViolation);
        assert_eq!(
            err.to_string(),
            "Protocol violation at sync: expected bulk string, got +OK"
        );
        assert!(err
            .metrics_tags()
            .iter()
            .any(|(k, v)| *k == "stage" && v == "sync"));
    }

    #[test]
    fn test_critical_codes() {
        let err = TransitionError::TaskFailed {
            task: "heartbeat".to_string(),
            reason: "panicked".to_string(),
        };
        assert!(err.status_code().is_critical());
        assert!(!TransitionError::InvalidWatermark {
            value: "abc".to_string()
        }
        .status_code()
        .is_critical());
    }
}
