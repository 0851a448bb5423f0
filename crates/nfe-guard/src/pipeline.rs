//! Ingestion boundary: rate limit, parse, extract, audit.
//!
//! ```text
//! Submission ─→ RateLimiter (per source) ─→ SafeXmlParser ─→ InvoiceExtractor
//!                     │                          │                  │
//!                     └──────────── SecurityAuditor ◀───────────────┘
//! ```

use crate::audit::{AuditCategory, AuditError, AuditEvent, SecurityAuditor, Severity};
use crate::config::GuardConfig;
use crate::invoice::{ExtractOptions, InvoiceExtractor, InvoiceRecord};
use crate::sanitize::FieldError;
use crate::throttle::{Clock, RateLimiter, SystemClock};
use crate::xml::{Document, ParserLimits, SafeXmlParser, XmlError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Rate-limit key used for files beyond the per-request batch limit.
pub const BATCH_KEY: &str = "batch";

/// Outcome of validating one document. Never partially valid.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult<T> {
    Accepted(T),
    Rejected(Rejection),
}

impl<T> ValidationResult<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted(_))
    }

    pub fn accepted(self) -> Option<T> {
        match self {
            ValidationResult::Accepted(value) => Some(value),
            ValidationResult::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ValidationResult::Accepted(_) => None,
            ValidationResult::Rejected(rejection) => Some(rejection),
        }
    }

    pub fn into_result(self) -> Result<T, Rejection> {
        match self {
            ValidationResult::Accepted(value) => Ok(value),
            ValidationResult::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Why a document was not accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("structural: {0}")]
    Structural(XmlError),
    #[error("{} field(s) invalid", .0.len())]
    Fields(Vec<FieldError>),
    #[error("rate limited ({key})")]
    RateLimited { key: String },
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Structural(e) => e.code(),
            Rejection::Fields(_) => "field_invalid",
            Rejection::RateLimited { .. } => "rate_limited",
        }
    }

    /// Field failures, empty for non-field rejections.
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Rejection::Fields(errors) => errors,
            _ => &[],
        }
    }
}

/// Serializable report of a rejection, for operators and API responses.
#[derive(Debug, Clone, Serialize)]
pub struct RejectionReport {
    pub code: &'static str,
    pub message: String,
    pub fields: Vec<FieldError>,
}

impl From<&Rejection> for RejectionReport {
    fn from(rejection: &Rejection) -> Self {
        Self {
            code: rejection.code(),
            message: rejection.to_string(),
            fields: rejection.fields().to_vec(),
        }
    }
}

/// One inbound document from an email or upload collaborator.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Rate-limit key: sender address, client IP, or user id.
    pub source: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Submission {
    pub fn new(source: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            filename: None,
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Label used in audit events.
    pub fn subject(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.source)
    }
}

/// The wired validation pipeline. Share it behind an `Arc` across workers.
pub struct InvoiceGuard {
    auditor: Arc<SecurityAuditor>,
    limiter: RateLimiter,
    parser: SafeXmlParser,
    extractor: InvoiceExtractor,
    max_files_per_request: usize,
}

impl InvoiceGuard {
    pub fn new(config: &GuardConfig, auditor: Arc<SecurityAuditor>) -> Self {
        Self::with_clock(config, auditor, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &GuardConfig, auditor: Arc<SecurityAuditor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter: RateLimiter::with_clock(config.email_rate_limit(), clock, auditor.clone()),
            parser: SafeXmlParser::new(ParserLimits::from_config(config), auditor.clone()),
            extractor: InvoiceExtractor::new(ExtractOptions::from_config(config), auditor.clone()),
            max_files_per_request: config.max_files_per_request as usize,
            auditor,
        }
    }

    /// Build the auditor from `ENABLE_AUDIT_LOG` / `AUDIT_LOG_PATH`, then the guard.
    pub fn from_config(config: &GuardConfig) -> Result<Self, AuditError> {
        let auditor = SecurityAuditor::from_config(config)?;
        Ok(Self::new(config, Arc::new(auditor)))
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extractor = InvoiceExtractor::new(options, self.auditor.clone());
        self
    }

    pub fn auditor(&self) -> &Arc<SecurityAuditor> {
        &self.auditor
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn parser(&self) -> &SafeXmlParser {
        &self.parser
    }

    /// Validate one submission. Every rejection has already been audited
    /// when this returns.
    pub fn ingest(&self, submission: Submission) -> ValidationResult<InvoiceRecord> {
        if !self.limiter.check(&submission.source) {
            return ValidationResult::Rejected(Rejection::RateLimited {
                key: submission.source,
            });
        }

        let subject = submission.subject().to_string();
        let mut document = Document::new(submission.bytes).with_name(&subject);
        if let Some(content_type) = submission.content_type {
            document = document.with_content_type(content_type);
        }

        let parsed = match self.parser.parse(&document) {
            Ok(parsed) => parsed,
            Err(e) => return ValidationResult::Rejected(Rejection::Structural(e)),
        };

        match self.extractor.extract(&parsed, &subject) {
            Ok(record) => {
                debug!(
                    subject = %subject,
                    items = record.items.len(),
                    "invoice accepted"
                );
                self.auditor.log_event(
                    AuditEvent::new(AuditCategory::FileProcessing, Severity::Info, &subject)
                        .with_detail("invoice accepted")
                        .with_context("access_key", record.access_key.as_str())
                        .with_context("items", record.items.len().to_string())
                        .with_context("size", document.size().to_string()),
                );
                ValidationResult::Accepted(record)
            }
            Err(errors) => {
                let summary: Vec<String> = errors.iter().map(ToString::to_string).collect();
                self.auditor.log_event(
                    AuditEvent::new(AuditCategory::FieldValidation, Severity::Warning, &subject)
                        .with_detail(format!("{} field(s) rejected", errors.len()))
                        .with_context("fields", summary.join("; ")),
                );
                ValidationResult::Rejected(Rejection::Fields(errors))
            }
        }
    }

    /// Validate an upload batch. Files past `MAX_FILES_PER_REQUEST` are
    /// rejected as rate limited without being parsed.
    pub fn ingest_batch(&self, submissions: Vec<Submission>) -> Vec<ValidationResult<InvoiceRecord>> {
        let limit = self.max_files_per_request;
        if submissions.len() > limit {
            self.auditor.log_event(
                AuditEvent::new(AuditCategory::RateLimit, Severity::Warning, BATCH_KEY)
                    .with_detail("batch exceeds the per-request file limit")
                    .with_context("submitted", submissions.len().to_string())
                    .with_context("max_files_per_request", limit.to_string()),
            );
        }

        submissions
            .into_iter()
            .enumerate()
            .map(|(index, submission)| {
                if index < limit {
                    self.ingest(submission)
                } else {
                    ValidationResult::Rejected(Rejection::RateLimited {
                        key: BATCH_KEY.to_string(),
                    })
                }
            })
            .collect()
    }
}
