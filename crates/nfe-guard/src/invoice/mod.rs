//! NF-e invoice model and extraction.

pub mod extract;
pub mod record;

pub use extract::{ExtractOptions, InvoiceExtractor};
pub use record::{InvoiceItem, InvoiceRecord, Issuer, Recipient, Totals};
