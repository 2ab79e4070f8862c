mod common;

use std::time::Duration;

use bearer_gate::{MemcachedStore, Outcome, Store};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use common::{
    TOKENLESS_REQUEST, bearer_request, send, spawn_broken_memcached, spawn_fake_memcached,
    spawn_gate, spawn_memory_gate,
};

fn expected(outcome: Outcome) -> String {
    String::from_utf8(outcome.encode()).unwrap()
}

#[tokio::test]
async fn valid_token_is_ok() {
    let gate = spawn_memory_gate(60).await;
    let response = send(gate.addr, &bearer_request("abc123")).await;
    assert_eq!(response, "HTTP/1.1 200 OK\n\nIt's OK!");
}

#[tokio::test]
async fn wrong_token_is_forbidden() {
    let gate = spawn_memory_gate(60).await;
    let response = send(gate.addr, &bearer_request("wrong")).await;
    assert!(response.starts_with("HTTP/1.1 403 FORBIDDEN"));
    assert_eq!(response, expected(Outcome::Forbidden));
}

#[tokio::test]
async fn sixty_first_tokenless_request_is_rate_limited() {
    let gate = spawn_memory_gate(60).await;
    for i in 0..60 {
        let response = send(gate.addr, TOKENLESS_REQUEST).await;
        assert_eq!(response, expected(Outcome::NotAuthorized), "request {}", i + 1);
    }
    let response = send(gate.addr, TOKENLESS_REQUEST).await;
    assert_eq!(response, "HTTP/1.1 429 TO MANY REQUESTS\n\n429 TO MANY REQUESTS");

    // tokens bypass the limiter entirely
    assert_eq!(send(gate.addr, &bearer_request("abc123")).await, expected(Outcome::Ok));
    assert_eq!(send(gate.addr, &bearer_request("nope")).await, expected(Outcome::Forbidden));
}

#[tokio::test]
async fn empty_connection_is_answered_as_tokenless() {
    let gate = spawn_memory_gate(60).await;
    let response = send(gate.addr, b"").await;
    assert_eq!(response, expected(Outcome::NotAuthorized));
}

#[tokio::test]
async fn undecodable_marker_line_is_answered_as_tokenless() {
    let gate = spawn_memory_gate(60).await;
    let mut request = b"GET / HTTP/1.1\r\nAuthorization: Bearer abc".to_vec();
    request.extend_from_slice(&[0xc3, 0x28]);
    request.extend_from_slice(b"\r\n\r\n");
    let response = send(gate.addr, &request).await;
    assert_eq!(response, expected(Outcome::NotAuthorized));
}

#[tokio::test]
async fn undecodable_bytes_in_other_headers_keep_the_token() {
    let gate = spawn_memory_gate(60).await;
    let mut request = bearer_request("abc123");
    request.extend_from_slice(&[0xc3, 0x28]);
    let response = send(gate.addr, &request).await;
    assert_eq!(response, expected(Outcome::Ok));
}

#[tokio::test]
async fn silent_client_does_not_stall_others() {
    let gate = spawn_gate(
        Store::Memory(bearer_gate::MemoryStore::new()),
        60,
        Duration::from_secs(30),
    )
    .await;

    // connects and never sends
    let _silent = TcpStream::connect(gate.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = timeout(Duration::from_secs(2), send(gate.addr, &bearer_request("abc123")))
        .await
        .expect("second client was starved by the silent one");
    assert_eq!(response, expected(Outcome::Ok));
}

#[tokio::test]
async fn silent_client_is_dropped_after_io_timeout() {
    let gate = spawn_gate(
        Store::Memory(bearer_gate::MemoryStore::new()),
        60,
        Duration::from_millis(200),
    )
    .await;

    let mut silent = TcpStream::connect(gate.addr).await.unwrap();
    let mut buf = Vec::new();
    let read = timeout(Duration::from_secs(2), silent.read_to_end(&mut buf))
        .await
        .expect("gate kept the silent connection open");
    // closed without a response (EOF or reset)
    assert!(read.map(|n| n == 0).unwrap_or(true));
}

#[tokio::test]
async fn concurrent_clients_are_all_answered() {
    let gate = spawn_memory_gate(1_000).await;
    let mut handles = Vec::new();
    for i in 0..50 {
        let addr = gate.addr;
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                send(addr, &bearer_request("abc123")).await
            } else {
                send(addr, TOKENLESS_REQUEST).await
            }
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap();
        let want = if i % 2 == 0 { Outcome::Ok } else { Outcome::NotAuthorized };
        assert_eq!(response, expected(want));
    }
}

#[tokio::test]
async fn stop_signal_ends_the_accept_loop() {
    let gate = spawn_memory_gate(60).await;
    assert_eq!(send(gate.addr, &bearer_request("abc123")).await, expected(Outcome::Ok));

    gate.shutdown.cancel();
    let result = timeout(Duration::from_secs(2), gate.handle)
        .await
        .expect("gate did not stop within the bound")
        .expect("gate task panicked");
    assert!(result.is_ok());

    assert!(TcpStream::connect(gate.addr).await.is_err());
}

#[tokio::test]
async fn gate_with_memcached_store_limits_tokenless_requests() {
    let (store_addr, backing) = spawn_fake_memcached().await;
    let store = MemcachedStore::connect(&store_addr.to_string(), 2, Duration::from_secs(2))
        .await
        .unwrap();
    let gate = spawn_gate(Store::Memcached(store), 3, Duration::from_secs(2)).await;

    for _ in 0..3 {
        assert_eq!(send(gate.addr, TOKENLESS_REQUEST).await, expected(Outcome::NotAuthorized));
    }
    assert_eq!(send(gate.addr, TOKENLESS_REQUEST).await, expected(Outcome::TooManyRequests));
    assert!(!backing.is_empty());
}

#[tokio::test]
async fn store_failure_drops_only_the_affected_connection() {
    let store_addr = spawn_broken_memcached().await;
    let store = MemcachedStore::connect(&store_addr.to_string(), 1, Duration::from_millis(300))
        .await
        .unwrap();
    let gate = spawn_gate(Store::Memcached(store), 60, Duration::from_secs(2)).await;

    // rate check fails, so the client sees the connection close with no response
    assert_eq!(send(gate.addr, TOKENLESS_REQUEST).await, "");

    // the listener keeps running and token requests never touch the store
    assert_eq!(send(gate.addr, &bearer_request("abc123")).await, expected(Outcome::Ok));
    assert_eq!(send(gate.addr, &bearer_request("bad")).await, expected(Outcome::Forbidden));
}

#[tokio::test]
async fn response_arrives_without_client_half_close() {
    let gate = spawn_memory_gate(60).await;
    let mut stream = TcpStream::connect(gate.addr).await.unwrap();
    stream.write_all(&bearer_request("abc123")).await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(2), stream.read_to_end(&mut response))
        .await
        .expect("gate did not close the connection")
        .unwrap();
    assert_eq!(response, Outcome::Ok.encode());
}
