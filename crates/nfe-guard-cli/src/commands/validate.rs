//! Validate NF-e files through the full ingestion pipeline.

use crate::output::{self, Styled};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use nfe_guard::invoice::ExtractOptions;
use nfe_guard::pipeline::RejectionReport;
use nfe_guard::{GuardConfig, InvoiceGuard, InvoiceRecord, Submission, ValidationResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Rejection code for a file whose validation outlived the per-file timeout.
pub const TIMEOUT_CODE: &str = "timeout";

/// Arguments of `nfe-guard validate`.
#[derive(Debug, Clone)]
pub struct ValidateArgs {
    pub files: Vec<PathBuf>,
    /// Rate-limit key for these files.
    pub source: String,
    pub timeout: Duration,
    /// Reference date for the issue-date window.
    pub today: Option<NaiveDate>,
}

/// Per-file outcome as printed in `--json` mode.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub file: String,
    pub size: u64,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionReport>,
}

/// Validate every file. Returns the reports; the caller decides the exit code.
pub async fn run(config: &GuardConfig, args: ValidateArgs) -> Result<Vec<FileReport>> {
    let mut guard = InvoiceGuard::from_config(config).with_context(|| {
        format!("failed to open audit log {}", config.audit_log_path.display())
    })?;
    if let Some(today) = args.today {
        guard = guard.with_extract_options(ExtractOptions::from_config(config).with_today(today));
    }
    let guard = Arc::new(guard);
    let max_bytes = config.max_document_bytes();

    let mut reports = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let name = path.display().to_string();
        let bytes = read_bounded(path, max_bytes)
            .await
            .with_context(|| format!("failed to read {name}"))?;
        let size = bytes.len() as u64;

        let submission = Submission::new(args.source.clone(), bytes).with_filename(name.clone());
        let worker = guard.clone();
        let task = tokio::task::spawn_blocking(move || worker.ingest(submission));

        let result = match tokio::time::timeout(args.timeout, task).await {
            Ok(joined) => joined.context("validation task failed")?,
            Err(_) => {
                warn!(file = %name, "validation timed out after {:?}", args.timeout);
                reports.push(FileReport {
                    file: name,
                    size,
                    accepted: false,
                    invoice: None,
                    rejection: Some(RejectionReport {
                        code: TIMEOUT_CODE,
                        message: "validation timed out".to_string(),
                        fields: Vec::new(),
                    }),
                });
                continue;
            }
        };

        reports.push(match result {
            ValidationResult::Accepted(record) => FileReport {
                file: name,
                size,
                accepted: true,
                invoice: Some(record),
                rejection: None,
            },
            ValidationResult::Rejected(rejection) => FileReport {
                file: name,
                size,
                accepted: false,
                invoice: None,
                rejection: Some(RejectionReport::from(&rejection)),
            },
        });
    }

    Ok(reports)
}

/// Read at most `max_bytes + 1` bytes so the parser can report the overflow
/// without the whole file in memory.
async fn read_bounded(path: &Path, max_bytes: usize) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let cap = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut bytes = Vec::new();
    file.take(cap).read_to_end(&mut bytes).await?;
    Ok(bytes)
}

/// Human-readable report on stderr, or JSON on stdout.
pub fn print(reports: &[FileReport]) {
    if output::is_json() {
        output::print_json(&reports);
        return;
    }

    let s = Styled::new();
    output::print_header(&s, "validate");
    for report in reports {
        match (&report.invoice, &report.rejection) {
            (Some(invoice), _) => {
                output::print_check(s.ok_sym(), &report.file, &s.green("accepted"));
                output::print_detail(&format!(
                    "NF-e {} série {}  emitente {}  total {}  itens {}",
                    invoice.number,
                    invoice.series,
                    invoice.issuer.tax_id,
                    invoice.totals.invoice,
                    invoice.items.len()
                ));
            }
            (None, Some(rejection)) => {
                let (symbol, code) = rejection_mark(&s, rejection.code);
                output::print_check(symbol, &report.file, &code);
                output::print_detail(&rejection.message);
                for field in &rejection.fields {
                    output::print_detail(&format!("  {field}"));
                }
            }
            (None, None) => {}
        }
        output::print_detail(&s.dim(&output::format_size(report.size)));
    }

    let accepted = reports.iter().filter(|r| r.accepted).count();
    eprintln!();
    eprintln!(
        "  {}: {accepted} accepted, {} rejected",
        s.bold("Summary"),
        reports.len() - accepted
    );
}

/// Timeouts print as warnings, every other rejection as a failure.
fn rejection_mark<'a>(s: &'a Styled, code: &str) -> (&'a str, String) {
    if code == TIMEOUT_CODE {
        (s.warn_sym(), s.yellow(code))
    } else {
        (s.fail_sym(), s.red(code))
    }
}
