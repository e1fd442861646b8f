// sentra-agent/src/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A parsed security event, the document shape shipped to the store.
///
/// `timestamp` serializes as RFC3339 UTC. `extra` carries parser-specific
/// fields (audit record pairs, syslog pid, ...) flattened into the object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub source: String,
    pub event_type: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub process: String,
    pub message: String,
    pub raw_log: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Event {
    /// A blank event carrying only the raw line; parsers fill in what they
    /// recognize and the router supplies identity fields.
    pub fn from_line(line: &str) -> Event {
        Event {
            timestamp: Utc::now(),
            agent_id: String::new(),
            source: String::new(),
            event_type: "log".to_string(),
            severity: String::new(),
            user: String::new(),
            process: String::new(),
            message: line.to_string(),
            raw_log: line.to_string(),
            extra: HashMap::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Rank a severity label for threshold comparison.
/// Unknown labels rank 0, below every threshold.
pub fn severity_rank(severity: &str) -> u8 {
    match severity {
        "info" | "low" => 1,
        "medium" | "warning" => 2,
        "high" | "error" | "critical" => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ranks() {
        let cases = [
            ("low", 1),
            ("info", 1),
            ("medium", 2),
            ("warning", 2),
            ("high", 3),
            ("error", 3),
            ("critical", 3),
            ("unknown", 0),
            ("", 0),
        ];
        for (label, expected) in cases {
            assert_eq!(severity_rank(label), expected, "severity {}", label);
        }
    }

    #[test]
    fn test_event_serializes_rfc3339_and_flattens_extra() {
        let mut event = Event::from_line("raw");
        event.agent_id = "agent-1".to_string();
        event.source = "syslog".to_string();
        event.severity = "info".to_string();
        event
            .extra
            .insert("pid".to_string(), serde_json::json!("4242"));

        let value = event.to_value();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(ts.contains('T'), "RFC3339 timestamp, got {}", ts);
        assert_eq!(value["pid"], serde_json::json!("4242"));
        assert!(value.get("extra").is_none());
        // empty user/process stay off the wire
        assert!(value.get("user").is_none());
    }

    #[test]
    fn test_event_roundtrip() {
        let mut event = Event::from_line("sshd[1]: Failed password");
        event.agent_id = "a".to_string();
        event.source = "syslog".to_string();
        event.severity = "high".to_string();
        event.user = "root".to_string();

        let back: Event =
            serde_json::from_value(event.to_value()).unwrap();
        assert_eq!(back, event);
    }
}
