use std::fmt;

use bytes::Bytes;

/// Команда: имя и аргументы.
///
/// Элемент 0 — имя команды, остальные — аргументы.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cmd(Vec<Bytes>);

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Cmd {
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self(vec![name.into()])
    }

    /// Добавляет аргумент (builder).
    pub fn arg(
        mut self,
        arg: impl Into<Bytes>,
    ) -> Self {
        self.0.push(arg.into());
        self
    }

    pub fn name(&self) -> Option<&Bytes> {
        self.0.first()
    }

    /// Имя команды без учёта регистра.
    pub fn is(
        &self,
        name: &str,
    ) -> bool {
        self.name()
            .is_some_and(|n| n.eq_ignore_ascii_case(name.as_bytes()))
    }

    pub fn args(&self) -> &[Bytes] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_parts(self) -> Vec<Bytes> {
        self.0
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl From<Vec<Bytes>> for Cmd {
    fn from(parts: Vec<Bytes>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for Cmd {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", String::from_utf8_lossy(part))?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let cmd = Cmd::new("SET").arg("key").arg(Bytes::from_static(b"value"));
        assert_eq!(cmd.len(), 3);
        assert!(cmd.is("set"));
        assert!(!cmd.is("get"));
        assert_eq!(cmd.args(), &[Bytes::from("key"), Bytes::from("value")]);
        assert_eq!(cmd.to_string(), "SET key value");
    }

    #[test]
    fn test_empty_cmd() {
        let cmd = Cmd::default();
        assert!(cmd.is_empty());
        assert!(cmd.name().is_none());
        assert!(cmd.args().is_empty());
        assert!(!cmd.is("set"));
    }
}
