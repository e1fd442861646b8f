// sentra-agent/src/reader.rs
// File tailer: open, seek to end, emit complete lines as they appear.
//
// Rotation is detected at EOF by inode change (unix) or file shrink; the
// reader then reopens from position 0. Lines flow over a bounded channel,
// so a slow consumer back-pressures the tail loop. Soft I/O errors go to a
// parallel errors channel and the loop keeps trying.

use crossbeam::channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CHANNEL_CAPACITY: usize = 256;

pub struct Reader {
    path: PathBuf,
    lines: Receiver<String>,
    errors: Receiver<String>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reader {
    /// Open `path` and start tailing from its current end.
    /// Fails if the file cannot be opened right now.
    pub fn spawn(path: impl Into<PathBuf>) -> std::io::Result<Reader> {
        let path = path.into();
        let file = File::open(&path)?;

        let (line_tx, line_rx) = bounded(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_path = path.clone();
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            tail_loop(&thread_path, file, line_tx, error_tx, &thread_stop);
        });

        Ok(Reader {
            path,
            lines: line_rx,
            errors: error_rx,
            stop,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> Receiver<String> {
        self.lines.clone()
    }

    pub fn errors(&self) -> Receiver<String> {
        self.errors.clone()
    }

    /// Signal the tail loop and wait for it to exit. Dropping the reader
    /// afterwards closes the channels, which shuts the router down in turn.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tail_loop(
    path: &Path,
    file: File,
    lines: Sender<String>,
    errors: Sender<String>,
    stop: &AtomicBool,
) {
    let mut reader = BufReader::new(file);
    let mut offset = reader.seek(SeekFrom::End(0)).unwrap_or(0);
    let mut inode = inode_of(path);
    let mut buf = String::new();

    while !stop.load(Ordering::Relaxed) {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => {
                // EOF: rotation check, then wait for more data.
                match std::fs::metadata(path) {
                    Ok(meta) => {
                        let rotated = meta.len() < offset || inode_of(path) != inode;
                        if rotated {
                            match File::open(path) {
                                Ok(reopened) => {
                                    reader = BufReader::new(reopened);
                                    offset = 0;
                                    inode = inode_of(path);
                                    continue;
                                }
                                Err(e) => {
                                    let _ = errors
                                        .try_send(format!("reopen {}: {}", path.display(), e));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // rotated away and not recreated yet
                        let _ = errors.try_send(format!("stat {}: {}", path.display(), e));
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(n) if buf.ends_with('\n') => {
                offset += n as u64;
                let line = buf.trim_end_matches(['\n', '\r']).to_string();
                if !line.is_empty() && lines.send(line).is_err() {
                    return; // consumer gone
                }
            }
            Ok(n) => {
                // Partial line at EOF: rewind and wait for the rest.
                if reader.seek_relative(-(n as i64)).is_err() {
                    let _ = errors.try_send(format!("seek {}: lost partial line", path.display()));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = errors.try_send(format!("read {}: {}", path.display(), e));
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(unix)]
fn inode_of(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).map(|m| m.ino()).unwrap_or(0)
}

#[cfg(not(unix))]
fn inode_of(_path: &Path) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn wait_for_line(rx: &Receiver<String>) -> String {
        rx.recv_timeout(Duration::from_secs(5)).expect("line")
    }

    #[test]
    fn test_tails_only_new_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old line\n").unwrap();

        let reader = Reader::spawn(&path).unwrap();
        let lines = reader.lines();

        // give the tail loop a moment to reach EOF before appending
        std::thread::sleep(Duration::from_millis(300));
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "new line").unwrap();
        file.flush().unwrap();

        assert_eq!(wait_for_line(&lines), "new line");
        assert!(lines.try_recv().is_err(), "old content must not be replayed");
        reader.stop();
    }

    #[test]
    fn test_detects_truncation_and_rereads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "aaaaaaaaaaaaaaaaaaaa\n").unwrap();

        let reader = Reader::spawn(&path).unwrap();
        let lines = reader.lines();
        std::thread::sleep(Duration::from_millis(300));

        // truncate-in-place rotation: shrink, then write fresh content
        std::fs::write(&path, "fresh\n").unwrap();

        assert_eq!(wait_for_line(&lines), "fresh");
        reader.stop();
    }

    #[test]
    fn test_detects_rename_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "before\n").unwrap();

        let reader = Reader::spawn(&path).unwrap();
        let lines = reader.lines();
        std::thread::sleep(Duration::from_millis(300));

        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&path, "after rotation\n").unwrap();

        assert_eq!(wait_for_line(&lines), "after rotation");
        reader.stop();
    }

    #[test]
    fn test_missing_file_fails_construction() {
        assert!(Reader::spawn("/nonexistent/file.log").is_err());
    }

    #[test]
    fn test_stop_joins_quickly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let reader = Reader::spawn(&path).unwrap();
        let started = std::time::Instant::now();
        reader.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
