//! Потоковый декодер снимка.
//!
//! Декодер читает заголовок, затем опкоды верхнего уровня и отдаёт каждое
//! событие обработчику, не накапливая содержимое снимка в памяти.
//!
//! # Владение источником
//!
//! Декодер забирает источник байт целиком и возвращает его через
//! [`SnapshotDecoder::into_inner`] ровно в той позиции, где закончился
//! снимок. Следом по тем же байтам запускается декодер потока команд.

use std::fmt;

use bytes::Bytes;
use cutover_error::{bail, ensure, CutoverResult, RdbError, ResultExt};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use super::{
    length::{decode_length, Length},
    reader::{read_array, read_u8, CountingReader},
    row::{decode_row, Row, RowItem},
    string::{decode_compressed, decode_encoded_int, decode_length_prefixed_string, decode_string},
    tags::*,
};

/// Значение вспомогательного поля.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxValue {
    String(Bytes),
    Int(u32),
}

/// Вспомогательное поле `ключ = значение` перед секциями баз.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxField {
    pub key: Bytes,
    pub value: AuxValue,
}

/// События, генерируемые декодером.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotEvent {
    /// Четыре цифры версии из заголовка
    Version(String),
    Aux(AuxField),
    /// Подсказки размеров хеш-таблиц текущей базы
    ResizeDb { db_size: u32, expires_size: u32 },
    SelectDb(u32),
    Row(Row),
    /// Конец снимка; контрольной суммы нет у версий ниже 5
    End { checksum: Option<[u8; 8]> },
}

/// Трейт для обработки событий снимка.
pub trait SnapshotHandler {
    fn handle_event(
        &mut self,
        event: SnapshotEvent,
    ) -> CutoverResult<()>;

    /// Вызывается после события `End`.
    fn finalize(&mut self) -> CutoverResult<()> {
        Ok(())
    }
}

/// Статистика декодирования.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub version: Option<u32>,
    pub rows: u64,
    pub aux_fields: u64,
    pub databases: u64,
    pub bytes_read: u64,
}

/// Обработчик по умолчанию: пишет события в лог и считает записи.
#[derive(Debug)]
pub struct LogSnapshotHandler {
    rows: u64,
    progress_every: u64,
}

/// Обработчик, собирающий все события.
#[derive(Debug, Default)]
pub struct CollectSnapshotHandler {
    events: Vec<SnapshotEvent>,
}

/// Декодер снимка поверх асинхронного источника.
pub struct SnapshotDecoder<R> {
    reader: CountingReader<R>,
    stats: DecodeStats,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AuxValue {
    pub fn as_bytes(&self) -> Bytes {
        match self {
            Self::String(s) => s.clone(),
            Self::Int(n) => Bytes::from(n.to_string()),
        }
    }
}

impl LogSnapshotHandler {
    pub fn new() -> Self {
        Self::with_progress_every(100_000)
    }

    pub fn with_progress_every(progress_every: u64) -> Self {
        Self {
            rows: 0,
            progress_every: progress_every.max(1),
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl CollectSnapshotHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SnapshotEvent] {
        &self.events
    }

    /// Только записи, в порядке следования.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.events.iter().filter_map(|e| match e {
            SnapshotEvent::Row(row) => Some(row),
            _ => None,
        })
    }

    pub fn into_events(self) -> Vec<SnapshotEvent> {
        self.events
    }
}

impl<R> SnapshotDecoder<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: CountingReader::new(reader),
            stats: DecodeStats::default(),
        }
    }

    /// Декодирует снимок целиком, вызывая handler для каждого события.
    pub async fn decode<H>(
        &mut self,
        handler: &mut H,
    ) -> CutoverResult<()>
    where
        H: SnapshotHandler + ?Sized,
    {
        let version = self.read_header().await?;
        handler.handle_event(SnapshotEvent::Version(version.clone()))?;

        let version_num: u32 = version.parse().unwrap_or_default();
        self.stats.version = Some(version_num);

        loop {
            let offset = self.reader.count();
            let opcode = read_u8(&mut self.reader, "opcode").await?;

            match opcode {
                OPCODE_AUX => {
                    let field = self.read_aux().await.context("Decoding aux field")?;
                    self.stats.aux_fields += 1;
                    handler.handle_event(SnapshotEvent::Aux(field))?;
                }
                OPCODE_RESIZEDB => {
                    let db_size = self.read_plain_length("db size").await?;
                    let expires_size = self.read_plain_length("expires size").await?;
                    handler.handle_event(SnapshotEvent::ResizeDb {
                        db_size,
                        expires_size,
                    })?;
                    self.read_rows(db_size, handler).await?;
                }
                OPCODE_SELECTDB => {
                    let db = self.read_plain_length("db index").await?;
                    self.stats.databases += 1;
                    debug!(db, "Snapshot database section");
                    handler.handle_event(SnapshotEvent::SelectDb(db))?;
                }
                OPCODE_EOF => {
                    let checksum = if version_num >= CHECKSUM_SINCE_VERSION {
                        Some(read_array::<_, 8>(&mut self.reader, "checksum").await?)
                    } else {
                        None
                    };
                    handler.handle_event(SnapshotEvent::End { checksum })?;
                    break;
                }
                OPCODE_EXPIRETIME | OPCODE_EXPIRETIME_MS => {
                    return Err(RdbError::UnsupportedOpcode {
                        opcode,
                        offset: None,
                    }
                    .with_offset(offset)
                    .into());
                }
                other => {
                    return Err(RdbError::UnknownOpcode {
                        opcode: other,
                        offset: None,
                    }
                    .with_offset(offset)
                    .into());
                }
            }
        }

        self.stats.bytes_read = self.reader.count();
        handler.finalize()
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Возвращает источник, позиционированный сразу за снимком.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    async fn read_header(&mut self) -> CutoverResult<String> {
        let header = read_array::<_, HEADER_LEN>(&mut self.reader, "magic header").await?;
        let (magic, version) = header.split_at(MAGIC.len());
        ensure!(
            magic == MAGIC && version.iter().all(u8::is_ascii_digit),
            RdbError::InvalidMagic {
                got: header.to_vec(),
            }
        );
        // четыре ASCII-цифры, валидный UTF-8
        Ok(String::from_utf8_lossy(version).into_owned())
    }

    async fn read_aux(&mut self) -> CutoverResult<AuxField> {
        let key = decode_string(&mut self.reader).await?;
        let value = match decode_length(&mut self.reader).await? {
            Length::EncodedInt(width) => {
                AuxValue::Int(decode_encoded_int(&mut self.reader, width).await?)
            }
            Length::Compressed {
                length,
                verify_length,
            } => AuxValue::String(decode_compressed(&mut self.reader, length, verify_length).await?),
            plain => {
                AuxValue::String(decode_length_prefixed_string(&mut self.reader, plain.value()).await?)
            }
        };
        Ok(AuxField { key, value })
    }

    async fn read_plain_length(
        &mut self,
        what: &str,
    ) -> CutoverResult<u32> {
        let length = decode_length(&mut self.reader).await?;
        ensure!(
            !length.is_encoded(),
            RdbError::MalformedLength {
                reason: format!("encoded {what}"),
                byte: None,
            }
        );
        Ok(length.value())
    }

    /// Читает ровно `count` записей секции.
    async fn read_rows<H>(
        &mut self,
        count: u32,
        handler: &mut H,
    ) -> CutoverResult<()>
    where
        H: SnapshotHandler + ?Sized,
    {
        for index in 0..count {
            let offset = self.reader.count();
            let item = decode_row(&mut self.reader)
                .await
                .with_context(|| format!("Decoding row #{index} at offset {offset}"))?;
            match item {
                RowItem::Row(row) => {
                    self.stats.rows += 1;
                    handler.handle_event(SnapshotEvent::Row(row))?;
                }
                RowItem::EndOfSection(opcode) => {
                    bail!(RdbError::ShortSection {
                        declared: count,
                        decoded: index,
                        opcode,
                    });
                }
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for LogSnapshotHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHandler for LogSnapshotHandler {
    fn handle_event(
        &mut self,
        event: SnapshotEvent,
    ) -> CutoverResult<()> {
        match event {
            SnapshotEvent::Version(version) => info!(%version, "Snapshot started"),
            SnapshotEvent::Aux(field) => info!(
                key = %String::from_utf8_lossy(&field.key),
                value = %field.value,
                "Snapshot aux field"
            ),
            SnapshotEvent::ResizeDb {
                db_size,
                expires_size,
            } => info!(db_size, expires_size, "Snapshot resize hint"),
            SnapshotEvent::SelectDb(db) => info!(db, "Snapshot select db"),
            SnapshotEvent::Row(_) => {
                self.rows += 1;
                if self.rows % self.progress_every == 0 {
                    info!(rows = self.rows, "Snapshot progress");
                }
            }
            SnapshotEvent::End { checksum } => info!(
                rows = self.rows,
                checksum = ?checksum,
                "Snapshot finished"
            ),
        }
        Ok(())
    }
}

impl SnapshotHandler for CollectSnapshotHandler {
    fn handle_event(
        &mut self,
        event: SnapshotEvent,
    ) -> CutoverResult<()> {
        self.events.push(event);
        Ok(())
    }
}

impl fmt::Display for AuxValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

impl<R> fmt::Debug for SnapshotDecoder<R> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SnapshotDecoder")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
