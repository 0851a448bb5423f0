//! NFe Guard: security core for ingesting NF-e fiscal invoices from
//! untrusted sources.
//!
//! The crate parses XML defensively, sanitizes every business field, rate
//! limits inbound operations, records an append-only audit trail, and keeps
//! credentials encrypted at rest and masked in logs.
//!
//! ```no_run
//! use nfe_guard::{GuardConfig, InvoiceGuard, Submission};
//!
//! let config = GuardConfig::default();
//! let guard = InvoiceGuard::from_config(&config).expect("audit log");
//! let bytes = std::fs::read("nota.xml").expect("read");
//! let result = guard.ingest(Submission::new("fornecedor@example.com", bytes));
//! println!("accepted: {}", result.is_accepted());
//! ```

pub mod audit;
pub mod config;
pub mod invoice;
pub mod pipeline;
pub mod sanitize;
pub mod throttle;
pub mod trust;
pub mod xml;

pub use audit::{AuditCategory, AuditEvent, SecurityAuditor, Severity};
pub use config::{ConfigError, ConfigSource, GuardConfig};
pub use invoice::{InvoiceExtractor, InvoiceRecord};
pub use pipeline::{InvoiceGuard, Rejection, Submission, ValidationResult};
pub use sanitize::{FieldError, FieldReason, FieldSanitizer};
pub use throttle::{RateLimitConfig, RateLimiter};
pub use trust::{CredentialVault, VaultError, VaultKey};
pub use xml::{Document, ParsedRecord, SafeXmlParser, XmlError};
