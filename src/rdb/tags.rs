//! Опкоды и теги типов бинарного формата снимка.

/// Магическая строка в начале снимка
pub const MAGIC: &[u8; 5] = b"REDIS";
/// Длина заголовка: `REDIS` + четыре цифры версии
pub const HEADER_LEN: usize = 9;
/// Версия, начиная с которой снимок завершается 8-байтовой контрольной суммой
pub const CHECKSUM_SINCE_VERSION: u32 = 5;

/// Вспомогательное поле `ключ = значение`
pub const OPCODE_AUX: u8 = 0xFA;
/// Подсказки размеров хеш-таблиц текущей базы
pub const OPCODE_RESIZEDB: u8 = 0xFB;
/// Время жизни ключа в миллисекундах (8 байт LE)
pub const OPCODE_EXPIRETIME_MS: u8 = 0xFC;
/// Время жизни ключа в секундах (4 байта LE)
pub const OPCODE_EXPIRETIME: u8 = 0xFD;
/// Выбор базы данных
pub const OPCODE_SELECTDB: u8 = 0xFE;
/// Конец снимка
pub const OPCODE_EOF: u8 = 0xFF;

pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_ZSET: u8 = 3;
pub const TYPE_HASH: u8 = 4;
pub const TYPE_ZIPMAP: u8 = 9;
pub const TYPE_ZIPLIST: u8 = 10;
pub const TYPE_INTSET: u8 = 11;
pub const TYPE_ZSET_ZIPLIST: u8 = 12;
pub const TYPE_HASH_ZIPLIST: u8 = 13;
pub const TYPE_LIST_QUICKLIST: u8 = 14;

/// Маркер конца ziplist
pub const ZIP_END: u8 = 0xFF;
/// Длина предыдущего элемента хранится в следующих 4 байтах
pub const ZIP_BIG_PREVLEN: u8 = 0xFE;
