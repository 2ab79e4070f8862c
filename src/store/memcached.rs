use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::CounterStore;
use crate::error::StoreError;

// memcached refuses longer keys
const MAX_KEY_LEN: usize = 250;

type Connection = BufStream<TcpStream>;
type OpFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'c>>;

/// Client for a memcached-compatible counter service (ASCII protocol).
///
/// Holds a fixed pool of connections handed out round-robin. A connection
/// that fails mid-exchange is dropped and reopened on its next use, so a
/// store outage surfaces as errors on the affected requests only.
pub struct MemcachedStore {
    addr: String,
    pool: Vec<Mutex<Option<Connection>>>,
    next: AtomicUsize,
    io_timeout: Duration,
}

impl MemcachedStore {
    /// Build the pool and check the store answers. Fails when it does not.
    pub async fn connect(
        addr: &str,
        pool_size: usize,
        io_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = (0..pool_size.max(1)).map(|_| Mutex::new(None)).collect();
        let store = Self {
            addr: addr.to_string(),
            pool,
            next: AtomicUsize::new(0),
            io_timeout,
        };
        let version = store.version().await?;
        info!(addr, version = %version, pool_size = store.pool.len(), "counter store reachable");
        Ok(store)
    }

    pub async fn version(&self) -> Result<String, StoreError> {
        self.run(|conn| {
            Box::pin(async move {
                send(conn, b"version\r\n").await?;
                let line = read_line(conn).await?;
                match line.strip_prefix("VERSION ") {
                    Some(version) => Ok(version.to_string()),
                    None => Err(reply_error(&line)),
                }
            })
        })
        .await
    }

    async fn open(&self) -> Result<Connection, StoreError> {
        let stream = timeout(self.io_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| StoreError::Timeout)??;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "opened counter store connection");
        Ok(BufStream::new(stream))
    }

    // Run one request/reply exchange on the next pooled connection
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> OpFuture<'c, T>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let mut slot = self.pool[idx].lock().await;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.open().await?,
        };

        let result = match timeout(self.io_timeout, op(&mut conn)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        };

        match &result {
            Err(e) if breaks_connection(e) => {
                warn!(addr = %self.addr, error = %e, "dropping counter store connection");
            }
            _ => *slot = Some(conn),
        }
        result
    }
}

impl CounterStore for MemcachedStore {
    async fn add(&self, key: &str, initial: u64, ttl: Duration) -> Result<bool, StoreError> {
        check_key(key)?;
        let value = initial.to_string();
        let command = format!(
            "add {key} 0 {} {}\r\n{value}\r\n",
            ttl.as_secs(),
            value.len()
        );
        self.run(move |conn| {
            Box::pin(async move {
                send(conn, command.as_bytes()).await?;
                parse_store_reply(&read_line(conn).await?)
            })
        })
        .await
    }

    async fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, StoreError> {
        check_key(key)?;
        let command = format!("incr {key} {delta}\r\n");
        self.run(move |conn| {
            Box::pin(async move {
                send(conn, command.as_bytes()).await?;
                parse_incr_reply(&read_line(conn).await?)
            })
        })
        .await
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, u64>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        for key in keys {
            check_key(key)?;
        }
        let command = format!("get {}\r\n", keys.join(" "));
        self.run(move |conn| {
            Box::pin(async move {
                send(conn, command.as_bytes()).await?;
                read_values(conn).await
            })
        })
        .await
    }
}

fn breaks_connection(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Io(_) | StoreError::Timeout | StoreError::Protocol(_)
    )
}

pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|b| b.is_ascii_graphic());
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

async fn send(conn: &mut Connection, bytes: &[u8]) -> Result<(), StoreError> {
    conn.write_all(bytes).await?;
    conn.flush().await?;
    Ok(())
}

// One reply line without its CRLF
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, StoreError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

fn reply_error(line: &str) -> StoreError {
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        StoreError::ServerError(line.to_string())
    } else {
        StoreError::Protocol(line.to_string())
    }
}

pub(crate) fn parse_store_reply(line: &str) -> Result<bool, StoreError> {
    match line {
        "STORED" => Ok(true),
        "NOT_STORED" | "EXISTS" => Ok(false),
        other => Err(reply_error(other)),
    }
}

pub(crate) fn parse_incr_reply(line: &str) -> Result<Option<u64>, StoreError> {
    if line == "NOT_FOUND" {
        return Ok(None);
    }
    match line.trim().parse::<u64>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(reply_error(line)),
    }
}

// Read `VALUE <key> <flags> <bytes>` blocks up to `END`
pub(crate) async fn read_values<R>(reader: &mut R) -> Result<HashMap<String, u64>, StoreError>
where
    R: AsyncBufRead + Unpin,
{
    let mut values = HashMap::new();
    loop {
        let line = read_line(reader).await?;
        if line == "END" {
            return Ok(values);
        }

        let mut parts = line.split_whitespace();
        let (Some("VALUE"), Some(key), Some(_flags), Some(len)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(reply_error(&line));
        };
        let len: usize = len
            .parse()
            .map_err(|_| StoreError::Protocol(line.clone()))?;

        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await?;
        if !data.ends_with(b"\r\n") {
            return Err(StoreError::Protocol(format!("unterminated value for {key}")));
        }
        data.truncate(len);

        // incr may leave space padding behind a shrunk number
        let count = std::str::from_utf8(&data)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .ok_or_else(|| StoreError::Protocol(format!("non-numeric counter for {key}")))?;
        values.insert(key.to_string(), count);
    }
}
