//! Бинарный формат снимка: примитивы длин и строк, записи, ziplist и
//! потоковый декодер верхнего уровня.

pub mod decoder;
pub mod length;
pub mod lzf;
pub mod reader;
pub mod row;
pub mod string;
pub mod tags;
pub mod ziplist;

pub use decoder::*;
pub use length::*;
pub use reader::CountingReader;
pub use row::*;
pub use string::*;
pub use ziplist::{Entry, ZipValue, Ziplist};
