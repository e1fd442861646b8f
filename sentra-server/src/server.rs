// sentra-server/src/server.rs
// Accept loop and connection handling.
//
// Framing is newline-delimited JSON: one request per line, one response
// line each. The accept loop polls a shutdown flag; on shutdown the read
// half of every live connection is shut down, which unblocks handlers.

use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sentra_core::{log_debug, log_error, log_info, CollectionManager};

use crate::protocol::{Request, Response};
use crate::session::Session;

const IO_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT_POLL: Duration = Duration::from_millis(10);

pub struct Server {
    manager: Arc<CollectionManager>,
}

impl Server {
    pub fn new(manager: Arc<CollectionManager>) -> Self {
        Server { manager }
    }

    /// Serve until `shutdown` flips. One thread per accepted connection.
    pub fn serve(&self, listener: TcpListener, shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
        log_info!("listening on {}", listener.local_addr()?);

        // Poll-based accept: non-blocking listener with short sleeps so the
        // shutdown flag gets checked.
        listener.set_nonblocking(true)?;

        let connections: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();

        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    log_debug!("connection from {}", peer);
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(IO_TIMEOUT))?;
                    stream.set_write_timeout(Some(IO_TIMEOUT))?;

                    let read_half = stream.try_clone()?;
                    connections.lock().unwrap().push(read_half);

                    let session = Session::new(Arc::clone(&self.manager));
                    handles.push(thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &session) {
                            log_error!("connection error: {}", e);
                        }
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log_error!("accept error: {}", e);
                }
            }
        }

        log_info!("shutdown signal received, draining connections");

        // Unblock handlers stuck in read_line.
        for stream in connections.lock().unwrap().iter() {
            let _ = stream.shutdown(Shutdown::Read);
        }
        for handle in handles {
            let _ = handle.join();
        }

        log_info!("shutdown complete");
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, session: &Session) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()), // client disconnected or shutdown
            Ok(_) => {}
            // Idle past the request timeout: close quietly.
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // A parse failure is a per-request error; the connection survives.
        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => session.handle(request),
            Err(e) => Response::error(format!("invalid request: {}", e)),
        };

        let rendered = serde_json::to_string(&response)?;
        writer.write_all(rendered.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
}
