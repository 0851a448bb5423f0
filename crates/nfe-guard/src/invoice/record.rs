//! Typed invoice produced from an accepted NF-e document.

use crate::sanitize::{AccessKey, MonetaryValue, TaxId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Issuing company (`emit`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issuer {
    pub tax_id: TaxId,
    pub name: String,
}

/// Recipient (`dest`). Either part may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub tax_id: Option<TaxId>,
    pub name: Option<String>,
}

/// Totals block (`total/ICMSTot`). Absent taxes are zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Totals {
    pub invoice: MonetaryValue,
    pub icms: MonetaryValue,
    pub ipi: MonetaryValue,
    pub pis: MonetaryValue,
    pub cofins: MonetaryValue,
}

impl Totals {
    /// Sum of the four tax totals. `None` on overflow.
    pub fn taxes(&self) -> Option<Decimal> {
        [self.ipi, self.pis, self.cofins]
            .iter()
            .try_fold(self.icms.amount(), |sum, tax| sum.checked_add(tax.amount()))
    }
}

/// One `det/prod` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceItem {
    pub code: String,
    pub description: String,
    pub ncm: Option<String>,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub total: MonetaryValue,
}

/// A fully sanitized invoice. Only ever built when every field passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRecord {
    pub access_key: AccessKey,
    pub number: String,
    pub series: String,
    pub issue_date: NaiveDate,
    pub operation_nature: String,
    pub issuer: Issuer,
    pub recipient: Option<Recipient>,
    pub totals: Totals,
    pub items: Vec<InvoiceItem>,
}

impl InvoiceRecord {
    /// Sum of item totals, for reconciliation against `totals.invoice`. `None` on overflow.
    pub fn items_total(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.total.amount()))
    }
}
