// sentra-agent/src/sender.rs
// Batch transport to the store: one NDJSON insert request per batch, one
// response line back. The connection is kept open between batches and
// rebuilt after any failure.

use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

use crate::event::Event;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store rejected batch: {0}")]
    Rejected(String),
}

/// Anything able to deliver a batch of events. The pipeline owns exactly
/// one sender, so calls are naturally serialized.
pub trait BatchSender: Send {
    fn send(&mut self, events: &[Event]) -> Result<(), SendError>;
}

pub struct TcpSender {
    addr: String,
    collection: String,
    conn: Option<BufReader<TcpStream>>,
}

impl TcpSender {
    pub fn new(host: &str, port: u16, collection: impl Into<String>) -> TcpSender {
        TcpSender {
            addr: format!("{}:{}", host, port),
            collection: collection.into(),
            conn: None,
        }
    }

    fn connect(&mut self) -> std::io::Result<&mut BufReader<TcpStream>> {
        if self.conn.is_none() {
            let addr = self
                .addr
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        format!("cannot resolve {}", self.addr),
                    )
                })?;
            let stream = TcpStream::connect_timeout(&addr, DIAL_TIMEOUT)?;
            stream.set_read_timeout(Some(IO_TIMEOUT))?;
            stream.set_write_timeout(Some(IO_TIMEOUT))?;
            self.conn = Some(BufReader::new(stream));
        }
        Ok(self.conn.as_mut().expect("connection just established"))
    }

    fn roundtrip(&mut self, request: &Value) -> Result<(), SendError> {
        let conn = self.connect()?;

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        conn.get_mut().write_all(line.as_bytes())?;

        let mut response = String::new();
        if conn.read_line(&mut response)? == 0 {
            return Err(SendError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "store closed the connection",
            )));
        }

        let parsed: Value = serde_json::from_str(response.trim())?;
        if parsed["status"] == "ok" {
            Ok(())
        } else {
            let message = parsed["message"].as_str().unwrap_or("unknown error");
            Err(SendError::Rejected(message.to_string()))
        }
    }
}

impl BatchSender for TcpSender {
    fn send(&mut self, events: &[Event]) -> Result<(), SendError> {
        let request = serde_json::json!({
            "database": self.collection,
            "operation": "insert",
            "data": events.iter().map(Event::to_value).collect::<Vec<_>>(),
        });

        let result = self.roundtrip(&request);
        if result.is_err() {
            // reconnect on the next attempt
            self.conn = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Write};
    use std::net::TcpListener;

    fn event(tag: &str) -> Event {
        Event::from_line(tag)
    }

    /// Minimal line-oriented stand-in for the store.
    fn fake_store(listener: TcpListener, responses: Vec<String>) -> std::thread::JoinHandle<Vec<String>> {
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut stream = stream;
            let mut seen = Vec::new();
            for response in responses {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                seen.push(line.trim().to_string());
                stream.write_all(response.as_bytes()).unwrap();
                stream.write_all(b"\n").unwrap();
            }
            seen
        })
    }

    #[test]
    fn test_send_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = fake_store(listener, vec![r#"{"status":"ok","count":2}"#.to_string()]);

        let mut sender = TcpSender::new("127.0.0.1", port, "security_events");
        sender.send(&[event("a"), event("b")]).unwrap();

        let seen = store.join().unwrap();
        let request: Value = serde_json::from_str(&seen[0]).unwrap();
        assert_eq!(request["operation"], "insert");
        assert_eq!(request["database"], "security_events");
        assert_eq!(request["data"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_rejected_batch_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let _store = fake_store(
            listener,
            vec![r#"{"status":"error","message":"document too large"}"#.to_string()],
        );

        let mut sender = TcpSender::new("127.0.0.1", port, "security_events");
        let err = sender.send(&[event("a")]).unwrap_err();
        assert!(matches!(err, SendError::Rejected(_)));
        assert!(err.to_string().contains("document too large"));
    }

    #[test]
    fn test_unreachable_store_is_io_error() {
        // bind then drop: nothing listens on that port anymore
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut sender = TcpSender::new("127.0.0.1", port, "security_events");
        assert!(matches!(
            sender.send(&[event("a")]),
            Err(SendError::Io(_))
        ));
    }
}
