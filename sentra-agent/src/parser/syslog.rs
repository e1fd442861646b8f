// sentra-agent/src/parser/syslog.rs
// RFC3164 lines: `Mmm dd hh:mm:ss host tag[pid]: message`.
// Severity comes from message keywords; the header year is the current one
// (classic syslog omits it).

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::LineParser;
use crate::event::Event;

lazy_static! {
    static ref HEADER: Regex = Regex::new(
        r"^([A-Z][a-z]{2})\s+(\d{1,2})\s+(\d{2}):(\d{2}):(\d{2})\s+(\S+)\s+([^:\[\s]+)(?:\[(\d+)\])?:\s*(.*)$"
    )
    .expect("syslog header regex");
    static ref AUTH_USER: Regex =
        Regex::new(r"(?:Failed password|Accepted \w+|Invalid user|session opened)\s+(?:for\s+)?(?:invalid user\s+)?(?:user\s+)?(\w+)")
            .expect("auth user regex");
    static ref SUDO_USER: Regex = Regex::new(r"^\s*(\w+)\s*:").expect("sudo user regex");
}

const HIGH_MARKERS: [&str; 5] = [
    "failed password",
    "authentication failure",
    "invalid user",
    "possible break-in",
    "permission denied",
];
const ERROR_MARKERS: [&str; 3] = ["error", "fatal", "segfault"];

#[derive(Default)]
pub struct SyslogParser;

impl SyslogParser {
    pub fn new() -> SyslogParser {
        SyslogParser
    }
}

impl LineParser for SyslogParser {
    fn parse(&mut self, line: &str) -> Option<Event> {
        let mut event = Event::from_line(line);

        let Some(caps) = HEADER.captures(line) else {
            // not RFC3164; ship as a generic syslog event
            event.event_type = "syslog".to_string();
            return Some(event);
        };

        if let Some(ts) = header_timestamp(&caps) {
            event.timestamp = ts;
        }

        let host = &caps[6];
        let tag = &caps[7];
        let message = caps[9].to_string();

        event.process = tag.to_string();
        event.event_type = event_type_for(tag);
        event.severity = severity_for(&message);
        event.message = message;

        if let Some(user) = extract_user(tag, &event.message) {
            event.user = user;
        }

        event
            .extra
            .insert("host".to_string(), Value::String(host.to_string()));
        if let Some(pid) = caps.get(8) {
            event
                .extra
                .insert("pid".to_string(), Value::String(pid.as_str().to_string()));
        }

        Some(event)
    }
}

fn header_timestamp(caps: &regex::Captures<'_>) -> Option<chrono::DateTime<Utc>> {
    let month = match &caps[1] {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let day: u32 = caps[2].parse().ok()?;
    let (hour, minute, second): (u32, u32, u32) = (
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
    );
    let date = NaiveDate::from_ymd_opt(Utc::now().year(), month, day)?;
    let naive = date.and_hms_opt(hour, minute, second)?;
    Utc.from_utc_datetime(&naive).into()
}

fn event_type_for(tag: &str) -> String {
    match tag {
        "sshd" | "login" | "su" | "sudo" => "auth".to_string(),
        "CRON" | "cron" => "cron".to_string(),
        "kernel" => "kernel".to_string(),
        "systemd" => "systemd".to_string(),
        _ => "syslog".to_string(),
    }
}

fn severity_for(message: &str) -> String {
    let lowered = message.to_lowercase();
    if HIGH_MARKERS.iter().any(|m| lowered.contains(m)) {
        "high".to_string()
    } else if ERROR_MARKERS.iter().any(|m| lowered.contains(m)) {
        "error".to_string()
    } else if lowered.contains("warning") {
        "warning".to_string()
    } else {
        "info".to_string()
    }
}

fn extract_user(tag: &str, message: &str) -> Option<String> {
    if tag == "sudo" {
        return SUDO_USER
            .captures(message)
            .map(|caps| caps[1].to_string());
    }
    AUTH_USER.captures(message).map(|caps| caps[1].to_string())
}
