/// Возвращает `Err(StackError)` из текущей функции.
///
/// - `bail!(err)` — любая ошибка, приводимая к [`StackError`](crate::StackError);
/// - `bail!(code, "msg")` и `bail!(code, "fmt {}", arg)` — `GenericError` с
///   кодом статуса.
///
/// ```ignore
/// use cutover_error::{bail, RdbError};
///
/// fn check_magic(header: &[u8]) -> cutover_error::CutoverResult<()> {
///     if !header.starts_with(b"REDIS") {
///         bail!(RdbError::InvalidMagic { got: header.to_vec() });
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// `bail!`, если условие ложно. Ошибка строится только в этом случае.
///
/// ```ignore
/// use cutover_error::{ensure, TransitionError};
///
/// ensure!(
///     reply.is_ok(),
///     TransitionError::violation("select", "+OK", reply.to_string())
/// );
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Контекст для `Result` с любой ошибкой, приводимой к [`StackError`].
///
/// [`StackError`]: crate::StackError
pub trait ResultExt<T> {
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Строка контекста строится только при ошибке.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientError, CutoverResult, GenericError, RdbError, StatusCode};

    #[test]
    fn test_bail_domain_error() {
        fn begin() -> CutoverResult<()> {
            bail!(ClientError::AlreadyStreaming);
        }

        let err = begin().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyStreaming);
    }

    #[test]
    fn test_bail_with_code() {
        fn created(n: i64) -> CutoverResult<()> {
            match n {
                1 => Ok(()),
                0 => bail!(StatusCode::AlreadyExists, "Object already exists"),
                other => bail!(StatusCode::Unexpected, "Unexpected reply: {}", other),
            }
        }

        assert!(created(1).is_ok());
        assert_eq!(created(0).unwrap_err().status_code(), StatusCode::AlreadyExists);
        let err = created(7).unwrap_err();
        assert!(err.to_string().contains("Unexpected reply: 7"));
    }

    #[test]
    fn test_ensure_builds_error_lazily() {
        fn check_len(len: usize) -> CutoverResult<usize> {
            ensure!(
                len <= 4,
                RdbError::MalformedLength {
                    reason: format!("width {len}"),
                    byte: None,
                }
            );
            Ok(len)
        }

        assert_eq!(check_len(4).unwrap(), 4);
        let err = check_len(8).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RdbError>(),
            Some(RdbError::MalformedLength { .. })
        ));
    }

    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::Internal, "inner error"))
        }

        fn outer() -> CutoverResult<()> {
            inner().context("Heartbeat")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "Heartbeat");
    }

    #[test]
    fn test_with_context_lazy() {
        fn row(fail: bool) -> CutoverResult<()> {
            let result: Result<(), RdbError> = if fail {
                Err(RdbError::EndOfInput {
                    context: "row type".to_string(),
                })
            } else {
                Ok(())
            };
            result.with_context(|| format!("Row #{}", 7))
        }

        assert!(row(false).is_ok());
        let err = row(true).unwrap_err();
        assert_eq!(err.contexts()[0].message, "Row #7");
        assert!(err.downcast_ref::<RdbError>().is_some());
    }
}
