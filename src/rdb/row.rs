//! Декодер одной записи снимка: срок жизни, ключ, тип и значение.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use cutover_error::{CutoverResult, RdbError};
use num_enum::TryFromPrimitive;
use tokio::io::AsyncRead;
use tracing::warn;

use super::{
    length::{decode_length, Length},
    reader::{read_continuation, read_u8},
    string::{decode_string, decode_string_with},
    tags::*,
    ziplist::{Entry, Ziplist},
};

/// Тег типа значения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum ValueType {
    String = TYPE_STRING,
    List = TYPE_LIST,
    Set = TYPE_SET,
    SortedSet = TYPE_ZSET,
    Hash = TYPE_HASH,
    Zipmap = TYPE_ZIPMAP,
    Ziplist = TYPE_ZIPLIST,
    Intset = TYPE_INTSET,
    SortedSetZiplist = TYPE_ZSET_ZIPLIST,
    HashZiplist = TYPE_HASH_ZIPLIST,
    ListQuicklist = TYPE_LIST_QUICKLIST,
}

/// Значение записи.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowValue {
    String(Bytes),
    /// Упорядоченная последовательность строк (list, ziplist)
    List(Vec<Bytes>),
    /// Отображение строка → строка (hash, zip-hash, zip-zset: member → score)
    Hash(HashMap<Bytes, Bytes>),
}

/// Одна запись снимка.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub expiry: Option<DateTime<Utc>>,
    pub key: Bytes,
    pub value_type: ValueType,
    pub value: RowValue,
}

/// Результат чтения очередной записи секции.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowItem {
    Row(Row),
    /// Вместо записи встретился опкод верхнего уровня
    EndOfSection(u8),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Row {
    pub fn key_lossy(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match &self.value {
            RowValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Bytes]> {
        match &self.value {
            RowValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match &self.value {
            RowValue::Hash(h) => Some(h),
            _ => None,
        }
    }
}

impl ValueType {
    /// Тип распознан, но его разбор не реализован.
    pub fn is_supported(&self) -> bool {
        !matches!(
            self,
            Self::Set | Self::SortedSet | Self::Zipmap | Self::Intset | Self::ListQuicklist
        )
    }
}

/// Декодирует одну запись.
pub async fn decode_row<R>(r: &mut R) -> CutoverResult<RowItem>
where
    R: AsyncRead + Unpin,
{
    let lead = read_u8(r, "row type").await?;

    let (expiry, tag) = match lead {
        OPCODE_EXPIRETIME => {
            let secs = u32::from_le_bytes(read_continuation::<_, 4>(r, "expiry seconds").await?);
            let expiry = DateTime::from_timestamp(i64::from(secs), 0);
            let [tag] = read_continuation::<_, 1>(r, "row type").await?;
            (expiry, tag)
        }
        OPCODE_EXPIRETIME_MS => {
            let ms = u64::from_le_bytes(read_continuation::<_, 8>(r, "expiry milliseconds").await?);
            let expiry = i64::try_from(ms)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .or(Some(DateTime::<Utc>::MAX_UTC));
            let [tag] = read_continuation::<_, 1>(r, "row type").await?;
            (expiry, tag)
        }
        OPCODE_AUX | OPCODE_RESIZEDB | OPCODE_SELECTDB | OPCODE_EOF => {
            return Ok(RowItem::EndOfSection(lead));
        }
        tag => (None, tag),
    };

    let key = decode_string(r).await?;
    let key_text = || String::from_utf8_lossy(&key).into_owned();

    let value_type = ValueType::try_from(tag)
        .map_err(|_| RdbError::UnknownValueType { tag, key: None }.with_key(key_text()))?;

    let value = match value_type {
        ValueType::String => RowValue::String(decode_string(r).await?),
        ValueType::List => RowValue::List(decode_legacy_list(r).await?),
        ValueType::Hash => RowValue::Hash(decode_legacy_hash(r).await?),
        ValueType::HashZiplist | ValueType::SortedSetZiplist => {
            let entries = decode_zip_entries(r, &key).await?;
            RowValue::Hash(pair_entries(entries, &key))
        }
        ValueType::Ziplist => {
            let entries = decode_zip_entries(r, &key).await?;
            RowValue::List(entries.into_iter().map(|e| e.value.to_bytes()).collect())
        }
        unsupported => {
            return Err(RdbError::UnsupportedValueType {
                tag: unsupported as u8,
                key: None,
            }
            .with_key(key_text())
            .into());
        }
    };

    Ok(RowItem::Row(Row {
        expiry,
        key,
        value_type,
        value,
    }))
}

async fn decode_legacy_list<R>(r: &mut R) -> CutoverResult<Vec<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let len = plain_length(r, "list length").await?;
    let mut items = Vec::with_capacity(len.min(1024) as usize);
    for _ in 0..len {
        let length = decode_length(r).await?;
        if let Length::Compressed { .. } = length {
            return Err(RdbError::MalformedLength {
                reason: "compressed list element".to_string(),
                byte: None,
            }
            .into());
        }
        items.push(decode_string_with(r, length).await?);
    }
    Ok(items)
}

async fn decode_legacy_hash<R>(r: &mut R) -> CutoverResult<HashMap<Bytes, Bytes>>
where
    R: AsyncRead + Unpin,
{
    let len = plain_length(r, "hash length").await?;
    let mut map = HashMap::with_capacity(len.min(1024) as usize);
    for _ in 0..len {
        let field = decode_string(r).await?;
        let value = decode_string(r).await?;
        map.insert(field, value);
    }
    Ok(map)
}

async fn plain_length<R>(
    r: &mut R,
    what: &str,
) -> CutoverResult<u32>
where
    R: AsyncRead + Unpin,
{
    let length = decode_length(r).await?;
    if length.is_encoded() {
        return Err(RdbError::MalformedLength {
            reason: format!("encoded {what}"),
            byte: None,
        }
        .into());
    }
    Ok(length.value())
}

/// Читает блоб ziplist и его элементы.
///
/// Отсутствующий маркер конца допускается: некоторые снимки обрезаны ровно
/// на последнем байте.
async fn decode_zip_entries<R>(
    r: &mut R,
    key: &Bytes,
) -> CutoverResult<Vec<Entry>>
where
    R: AsyncRead + Unpin,
{
    let blob = decode_string(r).await?;
    let blob_len = blob.len();
    let mut zl = Ziplist::parse(blob)?;
    let entries = zl.decode_entries()?;

    if let Err(e) = zl.expect_end() {
        match e.downcast_ref::<RdbError>() {
            Some(RdbError::MissingEndMarker { .. }) => {
                warn!(
                    key = %String::from_utf8_lossy(key),
                    blob_len,
                    entries = entries.len(),
                    error = %e,
                    "Ziplist end marker missing, keeping decoded entries"
                );
            }
            _ => return Err(e),
        }
    }

    Ok(entries)
}

/// Собирает пары `(entry[2i], entry[2i+1])` в отображение.
fn pair_entries(
    entries: Vec<Entry>,
    key: &Bytes,
) -> HashMap<Bytes, Bytes> {
    let pairs = entries.chunks_exact(2);
    if let [dangling] = pairs.remainder() {
        warn!(
            key = %String::from_utf8_lossy(key),
            entry = %dangling.value,
            "Odd ziplist entry count, dropping the last entry"
        );
    }
    pairs
        .map(|pair| (pair[0].value.to_bytes(), pair[1].value.to_bytes()))
        .collect()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
