use std::fmt;

use tokio::sync::watch;

/// Стадия переключения. Меняется только вперёд.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TransitionState {
    /// Репликация ещё не догнала источник
    #[default]
    Awaiting,
    /// Метка догнала, финальная запись отправлена
    Started,
    /// Финальная запись пришла обратно через поток
    Finished,
}

/// Единственный писатель состояния; читатели подписываются через
/// [`StateCell::subscribe`].
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<TransitionState>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TransitionState::Awaiting);
        Self { tx }
    }

    pub fn get(&self) -> TransitionState {
        *self.tx.borrow()
    }

    /// Переводит состояние вперёд. Возвращает `false`, если `next` не
    /// новее текущего.
    pub fn advance(
        &self,
        next: TransitionState,
    ) -> bool {
        self.tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<TransitionState> {
        self.tx.subscribe()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransitionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Awaiting => "awaiting",
            Self::Started => "started",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
