// sentra-agent/src/parser/bash.rs
// bash_history with HISTTIMEFORMAT: a `#<epoch>` comment line precedes each
// command. The parser is stateful; the pending timestamp applies to the
// next command line.

use chrono::{DateTime, Utc};

use super::LineParser;
use crate::event::Event;

#[derive(Default)]
pub struct BashParser {
    pending_timestamp: Option<DateTime<Utc>>,
}

impl BashParser {
    pub fn new() -> BashParser {
        BashParser::default()
    }
}

impl LineParser for BashParser {
    fn parse(&mut self, line: &str) -> Option<Event> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        // timestamp comment: remember it for the following command
        if let Some(epoch) = trimmed.strip_prefix('#') {
            if let Ok(secs) = epoch.trim().parse::<i64>() {
                self.pending_timestamp = DateTime::<Utc>::from_timestamp(secs, 0);
                return None;
            }
        }

        let mut event = Event::from_line(trimmed);
        if let Some(ts) = self.pending_timestamp.take() {
            event.timestamp = ts;
        }
        event.event_type = "command".to_string();
        event.process = "bash".to_string();
        event.message = trimmed.to_string();
        event.severity = if is_privileged(trimmed) {
            "medium".to_string()
        } else {
            "info".to_string()
        };
        Some(event)
    }
}

fn is_privileged(command: &str) -> bool {
    command.starts_with("sudo ")
        || command.starts_with("su ")
        || command == "su"
        || command.starts_with("doas ")
}
