//! Shared helpers for gate integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bearer_gate::{
    AppState, Classifier, CounterStore, GateServer, MemoryStore, RateLimiter, ServerOptions,
    Store, TokenAuthority,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub(crate) struct TestGate {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: tokio::task::JoinHandle<bearer_gate::error::Result<()>>,
}

pub(crate) fn app_state(store: Store, limit: u64, io_timeout: Duration) -> Arc<AppState> {
    Arc::new(AppState {
        classifier: Classifier::new(
            TokenAuthority::from_lines(["abc123"]),
            RateLimiter::new(store, limit, Duration::from_secs(60)),
        ),
        io_timeout,
    })
}

/// Spawn a gate on an ephemeral loopback port.
pub(crate) async fn spawn_gate(store: Store, limit: u64, io_timeout: Duration) -> TestGate {
    let options = ServerOptions {
        accept_poll: Duration::from_millis(100),
        shutdown_grace: Duration::from_millis(500),
    };
    let server = GateServer::bind("127.0.0.1:0", app_state(store, limit, io_timeout), options)
        .await
        .expect("failed to bind test gate");
    let addr = server.local_addr().expect("failed to get local addr");
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    TestGate {
        addr,
        shutdown,
        handle,
    }
}

pub(crate) async fn spawn_memory_gate(limit: u64) -> TestGate {
    spawn_gate(Store::Memory(MemoryStore::new()), limit, Duration::from_secs(2)).await
}

/// Send `request`, half-close, and return everything the gate wrote back.
pub(crate) async fn send(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    if !request.is_empty() {
        stream.write_all(request).await.expect("write request");
    }
    stream.shutdown().await.expect("half-close");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.expect("read response");
    String::from_utf8(response).expect("utf-8 response")
}

pub(crate) fn bearer_request(token: &str) -> Vec<u8> {
    format!("GET / HTTP/1.1\r\nHost: gate\r\nAuthorization: Bearer {token}\r\n\r\n").into_bytes()
}

pub(crate) const TOKENLESS_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: gate\r\n\r\n";

/// Minimal memcached speaker backed by a [`MemoryStore`]: `version`, `add`,
/// `incr` and `get`, one connection per task.
pub(crate) async fn spawn_fake_memcached() -> (SocketAddr, MemoryStore) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake store");
    let addr = listener.local_addr().expect("fake store addr");
    let store = MemoryStore::new();
    let backing = store.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let store = backing.clone();
            tokio::spawn(fake_memcached_session(stream, store));
        }
    });
    (addr, store)
}

async fn fake_memcached_session(stream: TcpStream, store: MemoryStore) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read);
    loop {
        let mut line = String::new();
        match lines.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let reply = match parts.as_slice() {
            ["version"] => "VERSION 1.6.0-fake\r\n".to_string(),
            ["add", key, _flags, ttl, _len] => {
                let mut data = String::new();
                if lines.read_line(&mut data).await.is_err() {
                    return;
                }
                let initial = data.trim().parse().unwrap_or(0);
                let ttl = Duration::from_secs(ttl.parse().unwrap_or(0));
                match store.add(key, initial, ttl).await {
                    Ok(true) => "STORED\r\n".to_string(),
                    _ => "NOT_STORED\r\n".to_string(),
                }
            }
            ["incr", key, delta] => match store.incr(key, delta.parse().unwrap_or(0)).await {
                Ok(Some(value)) => format!("{value}\r\n"),
                _ => "NOT_FOUND\r\n".to_string(),
            },
            ["get", keys @ ..] => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                let found = store.get_multi(&keys).await.unwrap_or_default();
                let mut reply = String::new();
                for key in &keys {
                    if let Some(value) = found.get(key) {
                        let value = value.to_string();
                        reply.push_str(&format!("VALUE {key} 0 {}\r\n{value}\r\n", value.len()));
                    }
                }
                reply.push_str("END\r\n");
                reply
            }
            _ => "ERROR\r\n".to_string(),
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Store that answers `version` and then hangs up on every other command.
pub(crate) async fn spawn_broken_memcached() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind broken store");
    let addr = listener.local_addr().expect("broken store addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read);
                let mut line = String::new();
                while let Ok(n) = lines.read_line(&mut line).await {
                    if n == 0 || line.trim() != "version" {
                        return;
                    }
                    if write.write_all(b"VERSION 1.6.0-broken\r\n").await.is_err() {
                        return;
                    }
                    line.clear();
                }
            });
        }
    });
    addr
}
