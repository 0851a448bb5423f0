//! Structured audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Longest subject or detail kept on an event, in characters.
const MAX_FIELD_CHARS: usize = 256;

/// What part of the system an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    XmlSecurity,
    RateLimit,
    FieldValidation,
    InputSanitization,
    FileProcessing,
    Credential,
    Configuration,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::XmlSecurity => "xml_security",
            AuditCategory::RateLimit => "rate_limit",
            AuditCategory::FieldValidation => "field_validation",
            AuditCategory::InputSanitization => "input_sanitization",
            AuditCategory::FileProcessing => "file_processing",
            AuditCategory::Credential => "credential",
            AuditCategory::Configuration => "configuration",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [AuditCategory; 7] = [
            AuditCategory::XmlSecurity,
            AuditCategory::RateLimit,
            AuditCategory::FieldValidation,
            AuditCategory::InputSanitization,
            AuditCategory::FileProcessing,
            AuditCategory::Credential,
            AuditCategory::Configuration,
        ];
        ALL.into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown audit category: {s}"))
    }
}

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

/// A single security audit event.
///
/// Built with [`AuditEvent::new`] and the `with_*` methods, then handed to
/// [`SecurityAuditor::log_event`](super::SecurityAuditor::log_event), which
/// stamps `event_id` and `sequence` and redacts the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub severity: Severity,
    pub subject: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub sequence: u64,
}

impl AuditEvent {
    /// Create an event timestamped now.
    pub fn new(category: AuditCategory, severity: Severity, subject: impl AsRef<str>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            severity,
            subject: scrub(subject.as_ref()),
            detail: String::new(),
            context: BTreeMap::new(),
            event_id: String::new(),
            sequence: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl AsRef<str>) -> Self {
        self.detail = scrub(detail.as_ref());
        self
    }

    /// Attach a context entry. Values are redacted when the event is logged.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Strip control characters and bound length so untrusted text cannot forge
/// extra log lines or flood the trail.
pub fn scrub(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(MAX_FIELD_CHARS)
        .collect();
    if value.chars().count() > MAX_FIELD_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_removes_newlines() {
        let s = scrub("line1\nFAKE EVENT\r\x1b[31m");
        assert!(!s.contains('\n'));
        assert!(!s.contains('\r'));
        assert!(!s.contains('\x1b'));
    }

    #[test]
    fn test_scrub_truncates() {
        let long = "a".repeat(1000);
        let s = scrub(&long);
        assert_eq!(s.chars().count(), MAX_FIELD_CHARS + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let event = AuditEvent::new(AuditCategory::XmlSecurity, Severity::Warning, "doc.xml")
            .with_detail("xxe attempt");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"category\":\"xml_security\""));
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(!json.contains("context"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("rate_limit".parse::<AuditCategory>(), Ok(AuditCategory::RateLimit));
        assert!("ratelimit".parse::<AuditCategory>().is_err());
    }
}
