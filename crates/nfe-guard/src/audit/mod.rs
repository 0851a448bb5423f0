//! Security audit trail. Append-only, and logging never fails the caller.

pub mod event;
pub mod logger;

pub use event::{AuditCategory, AuditEvent, Severity};
pub use logger::{
    read_events, AuditError, AuditSink, DisabledSink, JsonlSink, MemorySink, SecurityAuditor,
};
