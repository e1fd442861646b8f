// End-to-end wire tests: a real listener, NDJSON framing, and a client
// speaking the same protocol the agent and web tier use.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sentra_core::CollectionManager;
use sentra_server::Server;
use serde_json::{json, Value};
use tempfile::TempDir;

struct TestServer {
    addr: std::net::SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
    _dir: TempDir,
}

impl TestServer {
    fn start() -> TestServer {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(CollectionManager::new(dir.path()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));

        let server_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            Server::new(manager)
                .serve(listener, server_shutdown)
                .unwrap();
        });

        TestServer {
            addr,
            shutdown,
            handle: Some(handle),
            _dir: dir,
        }
    }

    fn connect(&self) -> (BufReader<TcpStream>, TcpStream) {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        (BufReader::new(stream.try_clone().unwrap()), stream)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn roundtrip(reader: &mut BufReader<TcpStream>, writer: &mut TcpStream, request: Value) -> Value {
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    writer.write_all(line.as_bytes()).unwrap();

    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    serde_json::from_str(&response).unwrap()
}

#[test]
fn insert_find_update_delete_over_the_wire() {
    let server = TestServer::start();
    let (mut reader, mut writer) = server.connect();

    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({
            "database": "security_events",
            "operation": "insert",
            "data": [
                {"_id": "1", "severity": "high", "message": "Failed password for root"},
                {"_id": "2", "severity": "low", "message": "session opened"}
            ]
        }),
    );
    assert_eq!(response["status"], json!("ok"));
    assert_eq!(response["count"], json!(2));

    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({
            "database": "security_events",
            "operation": "find",
            "query": {"severity": "high"}
        }),
    );
    assert_eq!(response["status"], json!("ok"));
    assert_eq!(response["count"], json!(1));
    assert_eq!(response["data"][0]["_id"], json!("1"));

    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({
            "database": "security_events",
            "operation": "update",
            "query": {"_id": "2"},
            "data": [{"severity": "medium"}]
        }),
    );
    assert_eq!(response["count"], json!(1));

    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({
            "database": "security_events",
            "operation": "delete",
            "query": {"severity": "medium"}
        }),
    );
    assert_eq!(response["count"], json!(1));

    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({"database": "security_events", "operation": "find", "query": {}}),
    );
    assert_eq!(response["count"], json!(1));
}

#[test]
fn malformed_line_keeps_connection_alive() {
    let server = TestServer::start();
    let (mut reader, mut writer) = server.connect();

    writer.write_all(b"this is not json\n").unwrap();
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["status"], json!("error"));

    // same connection still serves valid requests
    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({"database": "security_events", "operation": "find", "query": {}}),
    );
    assert_eq!(response["status"], json!("ok"));
}

#[test]
fn final_request_without_newline_is_served() {
    let server = TestServer::start();
    let (mut reader, mut writer) = server.connect();

    // single request, no trailing newline, then half-close: the stream
    // decoder style of the original clients
    let request = serde_json::to_string(&json!({
        "database": "security_events", "operation": "find", "query": {}
    }))
    .unwrap();
    writer.write_all(request.as_bytes()).unwrap();
    writer.shutdown(std::net::Shutdown::Write).unwrap();

    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["status"], json!("ok"));
}

#[test]
fn parallel_connections_are_independent() {
    let server = TestServer::start();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let addr = server.addr;
        handles.push(std::thread::spawn(move || {
            let stream = TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;

            for i in 0..10 {
                let response = roundtrip(
                    &mut reader,
                    &mut writer,
                    json!({
                        "database": "security_events",
                        "operation": "insert",
                        "data": [{"_id": format!("w{}-{}", worker, i), "n": i}]
                    }),
                );
                assert_eq!(response["status"], json!("ok"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let (mut reader, mut writer) = server.connect();
    let response = roundtrip(
        &mut reader,
        &mut writer,
        json!({"database": "security_events", "operation": "find", "query": {}}),
    );
    assert_eq!(response["count"], json!(40));
}
