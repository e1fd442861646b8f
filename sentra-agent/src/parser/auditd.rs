// sentra-agent/src/parser/auditd.rs
// Linux audit log lines: `type=XYZ msg=audit(epoch.millis:serial): k=v ...`
// with an optional nested msg='...' payload of further k=v pairs.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use super::LineParser;
use crate::event::Event;

lazy_static! {
    static ref AUDIT_TS: Regex =
        Regex::new(r"audit\((\d+)\.(\d{1,3}):(\d+)\)").expect("audit timestamp regex");
}

#[derive(Default)]
pub struct AuditdParser;

impl AuditdParser {
    pub fn new() -> AuditdParser {
        AuditdParser
    }
}

impl LineParser for AuditdParser {
    fn parse(&mut self, line: &str) -> Option<Event> {
        let mut event = Event::from_line(line);

        let mut pairs = split_pairs(line);
        // pairs nested inside msg='...' override the outer record
        if let Some(inner) = pairs.get("msg").filter(|v| v.contains('=')).cloned() {
            pairs.remove("msg");
            pairs.extend(split_pairs(&inner));
            event.message = inner;
        }

        let record_type = pairs.remove("type").unwrap_or_else(|| "AUDIT".to_string());

        if let Some(caps) = AUDIT_TS.captures(line) {
            let secs: i64 = caps[1].parse().ok()?;
            let millis: u32 = caps[2].parse().unwrap_or(0);
            if let Some(ts) = DateTime::<Utc>::from_timestamp(secs, millis * 1_000_000) {
                event.timestamp = ts;
            }
            event
                .extra
                .insert("audit_serial".to_string(), Value::String(caps[3].to_string()));
        }

        let result = pairs.get("res").or_else(|| pairs.get("success")).cloned();
        event.severity = match result.as_deref() {
            Some("failed") | Some("no") => "high".to_string(),
            _ if record_type.starts_with("ANOM_") => "high".to_string(),
            _ => "info".to_string(),
        };

        if let Some(user) = pairs
            .get("acct")
            .or_else(|| pairs.get("auid"))
            .or_else(|| pairs.get("uid"))
        {
            event.user = user.clone();
        }
        if let Some(process) = pairs.get("exe").or_else(|| pairs.get("comm")) {
            event.process = process.clone();
        }

        event.event_type = record_type.to_lowercase();
        if event.message == line {
            // no nested payload; keep everything after the header
            if let Some(rest) = line.split("): ").nth(1) {
                event.message = rest.to_string();
            }
        }

        for (key, value) in pairs {
            if matches!(key.as_str(), "msg" | "acct" | "exe" | "comm" | "res" | "success") {
                continue;
            }
            event.extra.insert(key, Value::String(value));
        }

        Some(event)
    }
}

/// Split `k=v` pairs, honoring single and double quotes so values with
/// spaces stay intact.
fn split_pairs(text: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut chars = text.chars().peekable();
    let mut token = String::new();

    let mut flush = |token: &mut String, pairs: &mut HashMap<String, String>| {
        if let Some((key, value)) = token.split_once('=') {
            if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                let value = value
                    .trim_matches(|c| c == '\'' || c == '"')
                    .to_string();
                pairs.insert(key.to_string(), value);
            }
        }
        token.clear();
    };

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' => {
                token.push(ch);
                for inner in chars.by_ref() {
                    token.push(inner);
                    if inner == ch {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => flush(&mut token, &mut pairs),
            c => token.push(c),
        }
    }
    flush(&mut token, &mut pairs);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_FAILED: &str = "type=USER_LOGIN msg=audit(1684170237.123:456): pid=2837 uid=0 \
        auid=4294967295 ses=4294967295 msg='op=login acct=\"root\" exe=\"/usr/sbin/sshd\" \
        hostname=? addr=10.0.0.5 terminal=ssh res=failed'";

    #[test]
    fn test_failed_login_line() {
        let mut parser = AuditdParser::new();
        let event = parser.parse(LOGIN_FAILED).unwrap();

        assert_eq!(event.event_type, "user_login");
        assert_eq!(event.severity, "high");
        assert_eq!(event.user, "root");
        assert_eq!(event.process, "/usr/sbin/sshd");
        assert_eq!(event.extra["addr"], serde_json::json!("10.0.0.5"));
        assert_eq!(event.extra["audit_serial"], serde_json::json!("456"));
        // epoch 1684170237 = 2023-05-15T16:23:57Z
        assert_eq!(event.timestamp.timestamp(), 1684170237);
    }

    #[test]
    fn test_successful_record_is_info() {
        let mut parser = AuditdParser::new();
        let line = "type=USER_AUTH msg=audit(1684170000.000:1): pid=10 uid=1000 \
            msg='op=PAM:authentication acct=\"alice\" exe=\"/usr/bin/sudo\" res=success'";
        let event = parser.parse(line).unwrap();
        assert_eq!(event.severity, "info");
        assert_eq!(event.user, "alice");
        assert_eq!(event.event_type, "user_auth");
    }

    #[test]
    fn test_anomaly_record_is_high() {
        let mut parser = AuditdParser::new();
        let line = "type=ANOM_PROMISCUOUS msg=audit(1684170001.500:2): dev=eth0 prom=256";
        let event = parser.parse(line).unwrap();
        assert_eq!(event.severity, "high");
        assert_eq!(event.event_type, "anom_promiscuous");
        assert_eq!(event.extra["dev"], serde_json::json!("eth0"));
    }

    #[test]
    fn test_line_without_timestamp_still_parses() {
        let mut parser = AuditdParser::new();
        let event = parser.parse("type=SERVICE_START unit=sshd").unwrap();
        assert_eq!(event.event_type, "service_start");
        assert_eq!(event.extra["unit"], serde_json::json!("sshd"));
    }

    #[test]
    fn test_split_pairs_quoting() {
        let pairs = split_pairs("a=1 b=\"two words\" c='three more words' d=?");
        assert_eq!(pairs["a"], "1");
        assert_eq!(pairs["b"], "two words");
        assert_eq!(pairs["c"], "three more words");
        assert_eq!(pairs["d"], "?");
    }
}
