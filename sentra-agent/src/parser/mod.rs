// sentra-agent/src/parser/mod.rs
//! Line parsers and the per-source router.
//!
//! Each reader gets one router thread. The router picks the sub-parser
//! from the source name, lets it fill in what it understands, then stamps
//! identity fields and defaults before pushing the event downstream.

pub mod auditd;
pub mod bash;
pub mod syslog;

use crossbeam::channel::{never, select, Receiver, Sender};
use std::thread::JoinHandle;

use crate::event::Event;
use sentra_core::log_warn;

pub use auditd::AuditdParser;
pub use bash::BashParser;
pub use syslog::SyslogParser;

/// A sub-parser for one log dialect. Parsers may keep state across lines
/// (bash_history timestamps); a `None` means the line carried no event.
pub trait LineParser {
    fn parse(&mut self, line: &str) -> Option<Event>;
}

enum SourceKind {
    Auditd,
    Syslog,
    Bash,
}

fn kind_for(source: &str) -> SourceKind {
    if source == "auditd" || source.contains("audit") {
        SourceKind::Auditd
    } else if source == "bash_history" || source.ends_with(".bash_history") {
        SourceKind::Bash
    } else {
        SourceKind::Syslog
    }
}

pub struct Router {
    agent_id: String,
}

impl Router {
    pub fn new(agent_id: impl Into<String>) -> Router {
        Router {
            agent_id: agent_id.into(),
        }
    }

    /// Parse one line for `source`, filling defaults.
    pub fn route(&self, parser: &mut dyn LineParser, source: &str, line: &str) -> Option<Event> {
        let mut event = parser.parse(line)?;
        event.agent_id = self.agent_id.clone();
        event.source = source.to_string();
        event.raw_log = line.to_string();
        if event.severity.is_empty() {
            event.severity = "info".to_string();
        }
        Some(event)
    }

    /// Consume a reader's line and error channels until they close.
    pub fn spawn(
        &self,
        source: String,
        lines: Receiver<String>,
        errors: Receiver<String>,
        out: Sender<Event>,
    ) -> JoinHandle<()> {
        let router = Router {
            agent_id: self.agent_id.clone(),
        };
        std::thread::spawn(move || {
            let mut parser: Box<dyn LineParser> = match kind_for(&source) {
                SourceKind::Auditd => Box::new(AuditdParser::new()),
                SourceKind::Bash => Box::new(BashParser::new()),
                SourceKind::Syslog => Box::new(SyslogParser::new()),
            };
            let mut errors = errors;

            loop {
                select! {
                    recv(lines) -> msg => match msg {
                        Ok(line) => {
                            if let Some(event) = router.route(parser.as_mut(), &source, &line) {
                                if out.send(event).is_err() {
                                    return; // pipeline gone
                                }
                            }
                        }
                        Err(_) => return, // reader stopped
                    },
                    recv(errors) -> msg => match msg {
                        Ok(e) => log_warn!("reader {}: {}", source, e),
                        // errors channel closed; stop selecting on it
                        Err(_) => errors = never(),
                    },
                }
            }
        })
    }
}
