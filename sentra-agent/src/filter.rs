// sentra-agent/src/filter.rs
// Pure predicate over parsed events: severity threshold, source exclusion,
// and regex include/exclude over the raw line.

use regex::Regex;
use thiserror::Error;

use crate::config::FilterSection;
use crate::event::{severity_rank, Event};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub struct EventFilter {
    threshold: u8,
    exclude_sources: Vec<String>,
    exclude_patterns: Vec<Regex>,
    include_patterns: Vec<Regex>,
}

impl EventFilter {
    /// Compile the configured patterns. An invalid regex fails construction.
    pub fn new(config: &FilterSection) -> Result<EventFilter, FilterError> {
        Ok(EventFilter {
            threshold: severity_rank(&config.severity_threshold),
            exclude_sources: config.exclude_sources.clone(),
            exclude_patterns: compile(&config.exclude_patterns)?,
            include_patterns: compile(&config.include_patterns)?,
        })
    }

    /// Filter that passes everything.
    pub fn allow_all() -> EventFilter {
        EventFilter {
            threshold: 0,
            exclude_sources: Vec::new(),
            exclude_patterns: Vec::new(),
            include_patterns: Vec::new(),
        }
    }

    /// True when the event should be shipped.
    pub fn matches(&self, event: &Event) -> bool {
        if self.threshold > 0 && severity_rank(&event.severity) < self.threshold {
            return false;
        }
        if self.exclude_sources.iter().any(|s| *s == event.source) {
            return false;
        }
        if self
            .exclude_patterns
            .iter()
            .any(|re| re.is_match(&event.raw_log))
        {
            return false;
        }
        if !self.include_patterns.is_empty()
            && !self
                .include_patterns
                .iter()
                .any(|re| re.is_match(&event.raw_log))
        {
            return false;
        }
        true
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, FilterError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(severity: &str, source: &str, raw_log: &str) -> Event {
        let mut event = Event::from_line(raw_log);
        event.severity = severity.to_string();
        event.source = source.to_string();
        event
    }

    fn filter(config: FilterSection) -> EventFilter {
        EventFilter::new(&config).unwrap()
    }

    #[test]
    fn test_severity_threshold() {
        let f = filter(FilterSection {
            severity_threshold: "medium".to_string(),
            ..Default::default()
        });

        let cases = [
            ("low", false),
            ("info", false),
            ("medium", true),
            ("high", true),
            ("critical", true),
            ("bogus", false),
        ];
        for (severity, expected) in cases {
            assert_eq!(
                f.matches(&event(severity, "test", "line")),
                expected,
                "severity {}",
                severity
            );
        }
    }

    #[test]
    fn test_exclude_sources() {
        let f = filter(FilterSection {
            exclude_sources: vec!["noisy_source".to_string(), "spam".to_string()],
            ..Default::default()
        });

        assert!(!f.matches(&event("high", "noisy_source", "x")));
        assert!(!f.matches(&event("high", "spam", "x")));
        assert!(f.matches(&event("high", "important", "x")));
        assert!(f.matches(&event("high", "auth", "x")));
    }

    #[test]
    fn test_exclude_patterns() {
        let f = filter(FilterSection {
            exclude_patterns: vec!["CRON.*session".to_string(), "systemd.*Started".to_string()],
            ..Default::default()
        });

        assert!(!f.matches(&event(
            "info",
            "test",
            "CRON[123]: pam_unix(cron:session): session opened"
        )));
        assert!(!f.matches(&event(
            "info",
            "test",
            "systemd[1]: Started Daily apt download"
        )));
        assert!(f.matches(&event("info", "test", "sshd[456]: Failed password for root")));
        assert!(f.matches(&event("info", "test", "sshd[789]: Accepted publickey for user")));
    }

    #[test]
    fn test_include_patterns() {
        let f = filter(FilterSection {
            include_patterns: vec![
                "ssh".to_string(),
                "sudo".to_string(),
                "authentication".to_string(),
            ],
            ..Default::default()
        });

        assert!(f.matches(&event("info", "test", "sshd[123]: connection from 192.168.1.1")));
        assert!(f.matches(&event("info", "test", "sudo: user : command=/bin/ls")));
        assert!(f.matches(&event("info", "test", "pam: authentication failure")));
        assert!(!f.matches(&event("info", "test", "kernel: CPU temperature 45C")));
    }

    #[test]
    fn test_combined_rules() {
        let f = filter(FilterSection {
            severity_threshold: "medium".to_string(),
            exclude_sources: vec!["cron".to_string()],
            exclude_patterns: vec!["session (opened|closed)".to_string()],
            include_patterns: vec!["ssh|sudo|auth".to_string()],
        });

        let mut e = event("high", "auth", "sshd: Failed password for root");
        assert!(f.matches(&e));

        e.severity = "low".to_string();
        assert!(!f.matches(&e));

        e.severity = "high".to_string();
        e.source = "cron".to_string();
        assert!(!f.matches(&e));
    }

    #[test]
    fn test_invalid_pattern_fails_construction() {
        let result = EventFilter::new(&FilterSection {
            exclude_patterns: vec!["[invalid regex".to_string()],
            ..Default::default()
        });
        assert!(matches!(result, Err(FilterError::InvalidPattern { .. })));
    }

    #[test]
    fn test_allow_all() {
        let f = EventFilter::allow_all();
        assert!(f.matches(&event("low", "any", "anything")));
        assert!(f.matches(&event("", "any", "anything")));
    }
}
