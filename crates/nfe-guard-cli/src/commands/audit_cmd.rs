//! Inspect the JSONL audit trail.

use crate::output::{self, Styled};
use anyhow::{Context, Result};
use nfe_guard::audit::read_events;
use nfe_guard::{AuditCategory, AuditEvent, Severity};
use std::path::Path;

/// Most recent `limit` events, optionally restricted to one category.
pub fn tail(path: &Path, limit: usize, category: Option<AuditCategory>) -> Result<Vec<AuditEvent>> {
    let scan = if category.is_some() { usize::MAX } else { limit };
    let events = read_events(path, scan)
        .with_context(|| format!("failed to read audit log {}", path.display()))?;

    let mut matching: Vec<AuditEvent> = events
        .into_iter()
        .filter(|e| category.map_or(true, |c| e.category == c))
        .collect();
    let skip = matching.len().saturating_sub(limit);
    matching.drain(..skip);
    Ok(matching)
}

pub fn print(events: &[AuditEvent]) {
    if output::is_json() {
        output::print_json(&events);
        return;
    }

    let s = Styled::new();
    output::print_header(&s, "audit");
    if events.is_empty() {
        output::print_detail(&s.dim("no events"));
        return;
    }
    for event in events {
        let symbol = match event.severity {
            Severity::Info => s.ok_sym(),
            Severity::Warning => s.warn_sym(),
            Severity::Error | Severity::Critical => s.fail_sym(),
        };
        let label = format!(
            "{} {:<20}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.category.as_str()
        );
        output::print_check(symbol, &label, &format!("{}  {}", event.subject, event.detail));
        for (key, value) in &event.context {
            output::print_detail(&s.dim(&format!("{key}={value}")));
        }
    }
}
