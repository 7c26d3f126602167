//! Текстовый протокол команд и ответов: кодирование команд, одиночные
//! ответы и поток команд репликации.

pub mod cmd;
pub mod encoder;
pub mod reply;
pub mod stream;

pub use cmd::Cmd;
pub use encoder::*;
pub use reply::{decode_reply, wait_reply, Reply, ReplyKind};
pub use stream::*;
