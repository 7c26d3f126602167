pub mod connection;
pub mod core;

// Публичный экспорт всех типов ошибок и функций из вложенных
// модулей, чтобы упростить доступ к ним из внешнего кода.
pub use core::*;

pub use connection::*;
