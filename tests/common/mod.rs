//! Встроенный фейковый сервер-источник для интеграционных тестов.
//!
//! Хранит данные в памяти, отвечает на команды клиента, на `sync` отдаёт
//! снимок в формате RDB и затем ретранслирует все записи в поток.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use cutover::{
    resp::{encode_cmd, StreamDecoder},
    Client, Cmd, Connection,
};
use tokio::{
    io::{duplex, split, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf},
    sync::mpsc,
};

pub type TestClient = Client<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_HASH: u8 = 4;
const TYPE_HASH_ZIPLIST: u8 = 13;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

////////////////////////////////////////////////////////////////////////////////
// Сборщик снимка
////////////////////////////////////////////////////////////////////////////////

/// Пишет снимок RDB побайтно.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new(version: &str) -> Self {
        let mut w = Self::default();
        w.buf.extend_from_slice(b"REDIS");
        w.buf.extend_from_slice(version.as_bytes());
        w
    }

    pub fn length(
        &mut self,
        len: usize,
    ) -> &mut Self {
        if len < 64 {
            self.buf.push(len as u8);
        } else if len < 16384 {
            self.buf.push(0x40 | (len >> 8) as u8);
            self.buf.push(len as u8);
        } else {
            self.buf.push(0x80);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self
    }

    pub fn string(
        &mut self,
        s: &[u8],
    ) -> &mut Self {
        self.length(s.len());
        self.buf.extend_from_slice(s);
        self
    }

    pub fn aux(
        &mut self,
        key: &str,
        value: &str,
    ) -> &mut Self {
        self.buf.push(0xFA);
        self.string(key.as_bytes()).string(value.as_bytes())
    }

    pub fn select_db(
        &mut self,
        db: u32,
    ) -> &mut Self {
        self.buf.push(0xFE);
        self.length(db as usize)
    }

    pub fn resize_db(
        &mut self,
        size: usize,
        expires: usize,
    ) -> &mut Self {
        self.buf.push(0xFB);
        self.length(size).length(expires)
    }

    fn expiry(
        &mut self,
        expire_at_ms: Option<i64>,
    ) {
        if let Some(ms) = expire_at_ms {
            self.buf.push(0xFC);
            self.buf.extend_from_slice(&(ms as u64).to_le_bytes());
        }
    }

    pub fn string_row(
        &mut self,
        key: &[u8],
        value: &[u8],
        expire_at_ms: Option<i64>,
    ) -> &mut Self {
        self.expiry(expire_at_ms);
        self.buf.push(TYPE_STRING);
        self.string(key).string(value)
    }

    pub fn list_row(
        &mut self,
        key: &[u8],
        items: &[Bytes],
    ) -> &mut Self {
        self.buf.push(TYPE_LIST);
        self.string(key).length(items.len());
        for item in items {
            self.string(item);
        }
        self
    }

    pub fn hash_row(
        &mut self,
        key: &[u8],
        pairs: &[(Bytes, Bytes)],
    ) -> &mut Self {
        self.buf.push(TYPE_HASH);
        self.string(key).length(pairs.len());
        for (field, value) in pairs {
            self.string(field).string(value);
        }
        self
    }

    pub fn hash_ziplist_row(
        &mut self,
        key: &[u8],
        pairs: &[(Bytes, Bytes)],
    ) -> &mut Self {
        self.buf.push(TYPE_HASH_ZIPLIST);
        let flat: Vec<&[u8]> = pairs
            .iter()
            .flat_map(|(f, v)| [f.as_ref(), v.as_ref()])
            .collect();
        let blob = ziplist(&flat);
        self.string(key).string(&blob)
    }

    pub fn eof(&mut self) -> Vec<u8> {
        self.buf.push(0xFF);
        self.buf.extend_from_slice(&[0u8; 8]);
        std::mem::take(&mut self.buf)
    }
}

/// Ziplist из строковых элементов (до 16383 байт каждый).
pub fn ziplist(items: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut prev_len = 0usize;
    for item in items {
        let mut entry = Vec::new();
        if prev_len < 254 {
            entry.push(prev_len as u8);
        } else {
            entry.push(0xFE);
            entry.extend_from_slice(&(prev_len as u32).to_le_bytes());
        }
        if item.len() < 64 {
            entry.push(item.len() as u8);
        } else {
            entry.push(0x40 | (item.len() >> 8) as u8);
            entry.push(item.len() as u8);
        }
        entry.extend_from_slice(item);
        prev_len = entry.len();
        body.extend_from_slice(&entry);
    }

    let header = 10usize;
    let total = header + body.len() + 1;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&((header + body.len() - prev_len) as u32).to_le_bytes());
    out.extend_from_slice(&(items.len() as u16).to_le_bytes());
    out.extend_from_slice(&body);
    out.push(0xFF);
    out
}

////////////////////////////////////////////////////////////////////////////////
// Хранилище
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
enum Value {
    Str(Bytes),
    List(Vec<Bytes>),
    Hash(Vec<(Bytes, Bytes)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expire_at_ms: Option<i64>,
}

struct Replica {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    last_db: Option<u32>,
}

struct Store {
    dbs: BTreeMap<u32, BTreeMap<Bytes, Entry>>,
    hash_max_entries: usize,
    hash_max_value: usize,
    replicas: Vec<Replica>,
}

impl Store {
    fn new() -> Self {
        Self {
            dbs: BTreeMap::new(),
            hash_max_entries: 128,
            hash_max_value: 64,
            replicas: Vec::new(),
        }
    }

    fn apply(
        &mut self,
        db: &mut u32,
        cmd: &Cmd,
    ) -> Vec<u8> {
        let args = cmd.args();
        let int = |b: &Bytes| std::str::from_utf8(b).ok().and_then(|s| s.parse::<i64>().ok());

        let (reply, is_write) = if cmd.is("select") && args.len() == 1 {
            match args.first().and_then(int) {
                Some(n) if n >= 0 => {
                    *db = n as u32;
                    (b"+OK\r\n".to_vec(), false)
                }
                _ => (b"-ERR invalid DB index\r\n".to_vec(), false),
            }
        } else if cmd.is("set") && args.len() == 2 {
            self.insert(*db, &args[0], Value::Str(args[1].clone()), None);
            (b"+OK\r\n".to_vec(), true)
        } else if cmd.is("setex") && args.len() == 3 {
            match int(&args[1]) {
                Some(secs) if secs > 0 => {
                    let at = now_ms() + secs * 1000;
                    self.insert(*db, &args[0], Value::Str(args[2].clone()), Some(at));
                    (b"+OK\r\n".to_vec(), true)
                }
                _ => (b"-ERR invalid expire time\r\n".to_vec(), false),
            }
        } else if cmd.is("hset") && args.len() == 3 {
            let keys = self.dbs.entry(*db).or_default();
            let entry = keys.entry(args[0].clone()).or_insert(Entry {
                value: Value::Hash(Vec::new()),
                expire_at_ms: None,
            });
            match &mut entry.value {
                Value::Hash(pairs) => {
                    let created = match pairs.iter_mut().find(|(f, _)| *f == args[1]) {
                        Some((_, v)) => {
                            *v = args[2].clone();
                            0
                        }
                        None => {
                            pairs.push((args[1].clone(), args[2].clone()));
                            1
                        }
                    };
                    (format!(":{created}\r\n").into_bytes(), true)
                }
                _ => (b"-WRONGTYPE\r\n".to_vec(), false),
            }
        } else if cmd.is("lpush") && args.len() >= 2 {
            let keys = self.dbs.entry(*db).or_default();
            let entry = keys.entry(args[0].clone()).or_insert(Entry {
                value: Value::List(Vec::new()),
                expire_at_ms: None,
            });
            match &mut entry.value {
                Value::List(items) => {
                    for v in &args[1..] {
                        items.insert(0, v.clone());
                    }
                    (format!(":{}\r\n", items.len()).into_bytes(), true)
                }
                _ => (b"-WRONGTYPE\r\n".to_vec(), false),
            }
        } else if cmd.is("del") && !args.is_empty() {
            let keys = self.dbs.entry(*db).or_default();
            let removed = args.iter().filter(|k| keys.remove(*k).is_some()).count();
            (format!(":{removed}\r\n").into_bytes(), true)
        } else if cmd.is("flushdb") && args.is_empty() {
            self.dbs.remove(&*db);
            (b"+OK\r\n".to_vec(), true)
        } else if cmd.is("config") && args.len() == 3 && args[0].eq_ignore_ascii_case(b"set") {
            let value = int(&args[2]).unwrap_or_default().max(0) as usize;
            match args[1].as_ref() {
                b"hash-max-ziplist-entries" => self.hash_max_entries = value,
                b"hash-max-ziplist-value" => self.hash_max_value = value,
                _ => return b"-ERR unsupported parameter\r\n".to_vec(),
            }
            (b"+OK\r\n".to_vec(), false)
        } else {
            (format!("-ERR unknown command '{cmd}'\r\n").into_bytes(), false)
        };

        if is_write {
            self.replicate(*db, cmd);
        }
        reply
    }

    fn insert(
        &mut self,
        db: u32,
        key: &Bytes,
        value: Value,
        expire_at_ms: Option<i64>,
    ) {
        self.dbs.entry(db).or_default().insert(
            key.clone(),
            Entry {
                value,
                expire_at_ms,
            },
        );
    }

    fn replicate(
        &mut self,
        db: u32,
        cmd: &Cmd,
    ) {
        self.replicas.retain_mut(|replica| {
            let mut bytes = Vec::new();
            if replica.last_db != Some(db) {
                bytes.extend_from_slice(&encode_cmd(&Cmd::new("select").arg(db.to_string())));
                replica.last_db = Some(db);
            }
            bytes.extend_from_slice(&encode_cmd(cmd));
            replica.tx.send(bytes).is_ok()
        });
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new("0009");
        w.aux("redis-ver", "6.0.16");
        for (db, keys) in &self.dbs {
            if keys.is_empty() {
                continue;
            }
            let expires = keys.values().filter(|e| e.expire_at_ms.is_some()).count();
            w.select_db(*db).resize_db(keys.len(), expires);
            for (key, entry) in keys {
                match &entry.value {
                    Value::Str(v) => {
                        w.string_row(key, v, entry.expire_at_ms);
                    }
                    Value::List(items) => {
                        w.list_row(key, items);
                    }
                    Value::Hash(pairs) => {
                        let compact = pairs.len() <= self.hash_max_entries
                            && pairs.iter().all(|(f, v)| {
                                f.len() <= self.hash_max_value && v.len() <= self.hash_max_value
                            });
                        if compact {
                            w.hash_ziplist_row(key, pairs);
                        } else {
                            w.hash_row(key, pairs);
                        }
                    }
                }
            }
        }
        w.eof()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Сервер
////////////////////////////////////////////////////////////////////////////////

/// Фейковый источник: каждое [`FakeSource::connect`] открывает новое
/// соединение к общему хранилищу.
#[derive(Clone)]
pub struct FakeSource {
    store: Arc<Mutex<Store>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::new())),
        }
    }

    pub fn connect(&self) -> TestClient {
        let (client_side, server_side) = duplex(64 * 1024);
        tokio::spawn(serve(Arc::clone(&self.store), server_side));
        let (r, w) = split(client_side);
        Client::new(Connection::new(r, w))
    }

    /// Число соединений, получающих поток репликации.
    pub fn replica_count(&self) -> usize {
        self.store.lock().unwrap().replicas.len()
    }

    /// Ждёт подключения реплики.
    pub async fn wait_replicas(
        &self,
        n: usize,
    ) {
        while self.replica_count() < n {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

async fn serve(
    store: Arc<Mutex<Store>>,
    conn: DuplexStream,
) {
    let (r, mut w) = split(conn);
    let mut dec = StreamDecoder::new(BufReader::new(r));
    let mut db = 0u32;

    while let Ok(cmd) = dec.decode_cmd().await {
        if cmd.is("sync") {
            let (snapshot, mut rx) = {
                let mut store = store.lock().unwrap();
                let (tx, rx) = mpsc::unbounded_channel();
                store.replicas.push(Replica { tx, last_db: None });
                (store.snapshot(), rx)
            };

            let mut head = b"\n\n".to_vec();
            head.extend_from_slice(format!("${}\r\n", snapshot.len()).as_bytes());
            if w.write_all(&head).await.is_err() || w.write_all(&snapshot).await.is_err() {
                return;
            }
            while let Some(bytes) = rx.recv().await {
                if w.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            return;
        }

        let reply = store.lock().unwrap().apply(&mut db, &cmd);
        if w.write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// Источник, который на `sync` отдаёт пустой снимок, следом байты `tail` и
/// закрывает соединение.
pub fn sync_then(tail: &'static [u8]) -> TestClient {
    let (client_side, server_side) = duplex(64 * 1024);
    tokio::spawn(async move {
        let (r, mut w) = split(server_side);
        let mut dec = StreamDecoder::new(BufReader::new(r));
        while let Ok(cmd) = dec.decode_cmd().await {
            if !cmd.is("sync") {
                if w.write_all(b"+OK\r\n").await.is_err() {
                    return;
                }
                continue;
            }
            let snapshot = SnapshotWriter::new("0009").eof();
            let mut out = format!("${}\r\n", snapshot.len()).into_bytes();
            out.extend_from_slice(&snapshot);
            out.extend_from_slice(tail);
            let _ = w.write_all(&out).await;
            return;
        }
    });
    let (r, w) = split(client_side);
    Client::new(Connection::new(r, w))
}
