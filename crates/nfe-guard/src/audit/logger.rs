//! Append-only security audit trail with pluggable sinks.

use crate::audit::event::{AuditCategory, AuditEvent, Severity};
use crate::config::GuardConfig;
use crate::trust::mask;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Failure to persist or read audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit event could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("audit sink lock poisoned")]
    Poisoned,
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        (**self).append(event)
    }
}

/// JSONL file sink. One event per line, opened in append mode.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Open or create the audit log file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(event)?;
        let mut file = self.file.lock().map_err(|_| AuditError::Poisoned)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }
}

/// In-process sink, used by tests and embedded dashboards.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of every event appended so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, category: AuditCategory) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| e.category == category).count())
            .unwrap_or(0)
    }
}

impl AuditSink for MemorySink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError::Poisoned)?
            .push(event.clone());
        Ok(())
    }
}

/// Sink used when `ENABLE_AUDIT_LOG` is off. Events still reach `tracing`.
pub struct DisabledSink;

impl AuditSink for DisabledSink {
    fn append(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Security auditor: the single entry point for recording security events.
///
/// `log_event` never fails. A sink error is reported on the process error
/// stream and swallowed so the business path carries on.
pub struct SecurityAuditor {
    sink: Box<dyn AuditSink>,
    sequence: AtomicU64,
}

impl SecurityAuditor {
    pub fn new(sink: impl AuditSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(DisabledSink)
    }

    /// Sink chosen by `ENABLE_AUDIT_LOG` and `AUDIT_LOG_PATH`.
    pub fn from_config(config: &GuardConfig) -> Result<Self, AuditError> {
        if config.enable_audit_log {
            Ok(Self::new(JsonlSink::open(&config.audit_log_path)?))
        } else {
            Ok(Self::disabled())
        }
    }

    /// Auditor backed by a fresh [`MemorySink`], returned alongside it.
    pub fn in_memory() -> (Self, Arc<MemorySink>) {
        let sink = MemorySink::new();
        (Self::new(sink.clone()), sink)
    }

    /// Record an event. Context values are redacted before they leave here.
    pub fn log_event(&self, mut event: AuditEvent) {
        event.context = event
            .context
            .into_iter()
            .map(|(key, value)| {
                let redacted = mask::redact(&key, &value);
                (key, redacted)
            })
            .collect();
        event.event_id = uuid::Uuid::new_v4().simple().to_string();
        event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        mirror_to_tracing(&event);

        if let Err(e) = self.sink.append(&event) {
            tracing::error!(
                category = %event.category,
                event_id = %event.event_id,
                "failed to persist audit event: {e}"
            );
            eprintln!(
                "nfe-guard: audit sink failure ({e}); event {} [{}] dropped",
                event.event_id, event.category
            );
        }
    }

    /// Shorthand for an event with only subject and detail.
    pub fn record(
        &self,
        category: AuditCategory,
        severity: Severity,
        subject: &str,
        detail: &str,
    ) {
        self.log_event(AuditEvent::new(category, severity, subject).with_detail(detail));
    }

    /// Number of events recorded by this auditor.
    pub fn events_logged(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

fn mirror_to_tracing(event: &AuditEvent) {
    match event.severity {
        Severity::Info => tracing::info!(
            target: "nfe_guard::audit",
            category = %event.category,
            subject = %event.subject,
            "{}", event.detail
        ),
        Severity::Warning => tracing::warn!(
            target: "nfe_guard::audit",
            category = %event.category,
            subject = %event.subject,
            "{}", event.detail
        ),
        Severity::Error | Severity::Critical => tracing::error!(
            target: "nfe_guard::audit",
            category = %event.category,
            severity = %event.severity,
            subject = %event.subject,
            "{}", event.detail
        ),
    }
}

/// Read back the most recent `limit` events from a JSONL audit file.
///
/// Lines that do not parse are skipped; a partially written last line is
/// normal after a crash.
pub fn read_events(path: impl AsRef<Path>, limit: usize) -> Result<Vec<AuditEvent>, AuditError> {
    let file = File::open(path.as_ref())?;
    let mut recent = VecDeque::with_capacity(limit.min(1024));

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEvent>(&line) {
            Ok(event) => {
                if recent.len() == limit {
                    recent.pop_front();
                }
                if limit > 0 {
                    recent.push_back(event);
                }
            }
            Err(e) => tracing::debug!("skipping unreadable audit line: {e}"),
        }
    }

    Ok(recent.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Poisoned)
        }
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let (auditor, sink) = SecurityAuditor::in_memory();
        auditor.record(AuditCategory::RateLimit, Severity::Warning, "a", "first");
        auditor.record(AuditCategory::XmlSecurity, Severity::Error, "b", "second");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 1);
        assert_eq!(events[0].detail, "first");
        assert_eq!(sink.count(AuditCategory::XmlSecurity), 1);
    }

    #[test]
    fn test_context_is_redacted() {
        let (auditor, sink) = SecurityAuditor::in_memory();
        auditor.log_event(
            AuditEvent::new(AuditCategory::Credential, Severity::Info, "config")
                .with_context("EMAIL_PASSWORD", "hunter2-super-secret")
                .with_context("DATABASE_URL", "postgresql://app:s3cr3t@db:5432/nfe")
                .with_context("filename", "nota.xml"),
        );

        let event = &sink.events()[0];
        assert!(!event.context["EMAIL_PASSWORD"].contains("hunter2"));
        assert!(!event.context["DATABASE_URL"].contains("s3cr3t"));
        assert_eq!(event.context["filename"], "nota.xml");
    }

    #[test]
    fn test_sink_failure_does_not_propagate() {
        let auditor = SecurityAuditor::new(FailingSink);
        auditor.record(AuditCategory::XmlSecurity, Severity::Error, "doc", "boom");
        assert_eq!(auditor.events_logged(), 1);
    }

    #[test]
    fn test_jsonl_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let auditor = SecurityAuditor::new(JsonlSink::open(&path).unwrap());

        for i in 0..5 {
            auditor.record(
                AuditCategory::FileProcessing,
                Severity::Info,
                &format!("nota-{i}.xml"),
                "accepted",
            );
        }

        let events = read_events(&path, 3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].subject, "nota-2.xml");
        assert_eq!(events[2].subject, "nota-4.xml");
    }

    #[test]
    fn test_read_events_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let auditor = SecurityAuditor::new(JsonlSink::open(&path).unwrap());
            auditor.record(AuditCategory::RateLimit, Severity::Warning, "k", "denied");
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        let events = read_events(&path, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::RateLimit);
    }

    #[test]
    fn test_concurrent_writers() {
        let (auditor, sink) = SecurityAuditor::in_memory();
        let auditor = Arc::new(auditor);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let auditor = auditor.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        auditor.record(
                            AuditCategory::RateLimit,
                            Severity::Info,
                            &format!("t{t}"),
                            &format!("{i}"),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut seqs: Vec<u64> = sink.events().iter().map(|e| e.sequence).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..400).collect::<Vec<_>>());
    }
}
