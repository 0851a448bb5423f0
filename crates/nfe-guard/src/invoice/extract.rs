//! Map a parsed NF-e tree onto an [`InvoiceRecord`], collecting every field failure.

use crate::audit::{AuditCategory, AuditEvent, SecurityAuditor, Severity};
use crate::config::GuardConfig;
use crate::invoice::record::{InvoiceItem, InvoiceRecord, Issuer, Recipient, Totals};
use crate::sanitize::{
    inspect, AccessKey, FieldError, FieldReason, FieldSanitizer, MonetaryValue, TaxId,
};
use crate::xml::{ParsedRecord, XmlNode};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

const DATE_WINDOW_PAST_DAYS: u64 = 3650;
const DATE_WINDOW_FUTURE_DAYS: u64 = 1;

/// Tunables for extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Reference date for the issue-date window. `None` uses the current UTC date.
    pub today: Option<NaiveDate>,
    pub max_items: usize,
    pub sanitizer: FieldSanitizer,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            today: None,
            max_items: 1000,
            sanitizer: FieldSanitizer::default(),
        }
    }
}

impl ExtractOptions {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            today: None,
            max_items: config.max_items_per_invoice,
            sanitizer: FieldSanitizer {
                max_string_length: config.max_string_length,
                ..FieldSanitizer::default()
            },
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

/// Builds invoice records from parsed documents.
pub struct InvoiceExtractor {
    options: ExtractOptions,
    auditor: Arc<SecurityAuditor>,
}

impl InvoiceExtractor {
    pub fn new(options: ExtractOptions, auditor: Arc<SecurityAuditor>) -> Self {
        Self { options, auditor }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extract and sanitize every field. Either all fields pass or every
    /// failure is returned.
    ///
    /// Suspicious text is audited under `input_sanitization` with `subject`
    /// but does not fail the record on its own.
    pub fn extract(&self, parsed: &ParsedRecord, subject: &str) -> Result<InvoiceRecord, Vec<FieldError>> {
        let root = parsed.root();
        let inf = if root.name == "infNFe" {
            Some(root)
        } else {
            root.find("infNFe")
        };
        let Some(inf) = inf else {
            return Err(vec![FieldError::new("infNFe", FieldReason::Missing)]);
        };

        let mut fields = Fields {
            sanitizer: &self.options.sanitizer,
            auditor: &self.auditor,
            subject,
            errors: Vec::new(),
        };
        let today = self.options.today.unwrap_or_else(|| Utc::now().date_naive());

        let ide = inf.child("ide");
        let number = fields.digits(ide, "nNF", "ide/nNF", 9);
        let series = fields.digits(ide, "serie", "ide/serie", 3);
        let operation_nature = fields.required_text(ide, "natOp", "ide/natOp");
        let issue_date = fields.issue_date(ide, today);

        let emit = inf.child("emit");
        let issuer_tax_id = fields.required_tax_id(emit, "emit/CNPJ");
        let issuer_name = fields.required_text(emit, "xNome", "emit/xNome");

        let recipient = inf.child("dest").map(|dest| Recipient {
            tax_id: fields.optional_tax_id(dest, "dest/CNPJ"),
            name: fields.optional_text(Some(dest), "xNome", "dest/xNome"),
        });

        let access_key = fields.access_key(inf.attr("Id"), "infNFe/@Id");

        let icms_tot = inf.path(&["total", "ICMSTot"]);
        let invoice_total = fields.invoice_total(icms_tot);
        let icms = fields.optional_money(icms_tot, "vICMS", "total/ICMSTot/vICMS");
        let ipi = fields.optional_money(icms_tot, "vIPI", "total/ICMSTot/vIPI");
        let pis = fields.optional_money(icms_tot, "vPIS", "total/ICMSTot/vPIS");
        let cofins = fields.optional_money(icms_tot, "vCOFINS", "total/ICMSTot/vCOFINS");

        let items = fields.items(inf, self.options.max_items);

        if !fields.errors.is_empty() {
            return Err(fields.errors);
        }

        let (
            Some(number),
            Some(series),
            Some(operation_nature),
            Some(issue_date),
            Some(issuer_tax_id),
            Some(issuer_name),
            Some(access_key),
            Some(invoice),
        ) = (
            number,
            series,
            operation_nature,
            issue_date,
            issuer_tax_id,
            issuer_name,
            access_key,
            invoice_total,
        )
        else {
            return Err(vec![FieldError::new("infNFe", FieldReason::Missing)]);
        };

        Ok(InvoiceRecord {
            access_key,
            number,
            series,
            issue_date,
            operation_nature,
            issuer: Issuer {
                tax_id: issuer_tax_id,
                name: issuer_name,
            },
            recipient,
            totals: Totals {
                invoice,
                icms,
                ipi,
                pis,
                cofins,
            },
            items,
        })
    }
}

/// Per-record accumulator. Every `None` returned by a method has a matching
/// entry in `errors`.
struct Fields<'a> {
    sanitizer: &'a FieldSanitizer,
    auditor: &'a SecurityAuditor,
    subject: &'a str,
    errors: Vec<FieldError>,
}

impl Fields<'_> {
    fn fail(&mut self, field: impl Into<String>, reason: FieldReason) {
        self.errors.push(FieldError::new(field, reason));
    }

    fn clean(&self, field: &str, raw: &str) -> String {
        let threats = inspect(raw);
        if !threats.is_empty() {
            let names: Vec<&str> = threats.iter().map(|t| t.as_str()).collect();
            self.auditor.log_event(
                AuditEvent::new(AuditCategory::InputSanitization, Severity::Warning, self.subject)
                    .with_detail("suspicious content removed from text field")
                    .with_context("field", field)
                    .with_context("threats", names.join(",")),
            );
        }
        self.sanitizer.text(raw)
    }

    fn required_text(&mut self, parent: Option<&XmlNode>, name: &str, field: &str) -> Option<String> {
        let cleaned = self.optional_text(parent, name, field);
        if cleaned.is_none() {
            self.fail(field, FieldReason::Missing);
        }
        cleaned
    }

    fn optional_text(&mut self, parent: Option<&XmlNode>, name: &str, field: &str) -> Option<String> {
        let raw = child_text(parent, name)?;
        Some(self.clean(field, raw)).filter(|s| !s.is_empty())
    }

    fn digits(&mut self, parent: Option<&XmlNode>, name: &str, field: &str, max_len: usize) -> Option<String> {
        let Some(raw) = child_text(parent, name) else {
            self.fail(field, FieldReason::Missing);
            return None;
        };
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            self.fail(field, FieldReason::InvalidCharacter);
            return None;
        }
        if raw.len() > max_len {
            self.fail(field, FieldReason::Length);
            return None;
        }
        Some(raw.to_string())
    }

    fn issue_date(&mut self, ide: Option<&XmlNode>, today: NaiveDate) -> Option<NaiveDate> {
        let field = "ide/dhEmi";
        let Some(raw) = child_text(ide, "dhEmi").or_else(|| child_text(ide, "dEmi")) else {
            self.fail(field, FieldReason::Missing);
            return None;
        };
        let Some(date) = parse_issue_date(raw) else {
            self.fail(field, FieldReason::InvalidDate);
            return None;
        };

        let earliest = today
            .checked_sub_days(Days::new(DATE_WINDOW_PAST_DAYS))
            .unwrap_or(NaiveDate::MIN);
        let latest = today
            .checked_add_days(Days::new(DATE_WINDOW_FUTURE_DAYS))
            .unwrap_or(NaiveDate::MAX);
        if date < earliest || date > latest {
            self.fail(field, FieldReason::OutOfRange);
            return None;
        }
        Some(date)
    }

    fn required_tax_id(&mut self, parent: Option<&XmlNode>, field: &str) -> Option<TaxId> {
        let Some(raw) = child_text(parent, "CNPJ") else {
            self.fail(field, FieldReason::Missing);
            return None;
        };
        self.sanitizer
            .tax_id(raw)
            .map_err(|reason| self.fail(field, reason))
            .ok()
    }

    fn optional_tax_id(&mut self, parent: &XmlNode, field: &str) -> Option<TaxId> {
        let raw = child_text(Some(parent), "CNPJ")?;
        self.sanitizer
            .tax_id(raw)
            .map_err(|reason| self.fail(field, reason))
            .ok()
    }

    fn access_key(&mut self, id: Option<&str>, field: &str) -> Option<AccessKey> {
        let Some(raw) = id.filter(|v| !v.trim().is_empty()) else {
            self.fail(field, FieldReason::Missing);
            return None;
        };
        self.sanitizer
            .access_key(raw)
            .map_err(|reason| self.fail(field, reason))
            .ok()
    }

    fn invoice_total(&mut self, icms_tot: Option<&XmlNode>) -> Option<MonetaryValue> {
        let field = "total/ICMSTot/vNF";
        let Some(raw) = child_text(icms_tot, "vNF") else {
            self.fail(field, FieldReason::Missing);
            return None;
        };
        let total = match self.sanitizer.money(raw) {
            Ok(total) => total,
            Err(reason) => {
                self.fail(field, reason);
                return None;
            }
        };
        if total.amount().is_zero() {
            self.fail(field, FieldReason::NotPositive);
            return None;
        }
        Some(total)
    }

    /// Absent means zero; present must be valid money.
    fn optional_money(&mut self, parent: Option<&XmlNode>, name: &str, field: &str) -> MonetaryValue {
        match child_text(parent, name) {
            None => MonetaryValue::zero(),
            Some(raw) => self.sanitizer.money(raw).unwrap_or_else(|reason| {
                self.fail(field, reason);
                MonetaryValue::zero()
            }),
        }
    }

    fn optional_decimal(&mut self, parent: &XmlNode, name: &str, field: &str, scale: u32) -> Decimal {
        match child_text(Some(parent), name) {
            None => Decimal::ZERO,
            Some(raw) => self.sanitizer.decimal(raw, scale).unwrap_or_else(|reason| {
                self.fail(field, reason);
                Decimal::ZERO
            }),
        }
    }

    fn items(&mut self, inf: &XmlNode, max_items: usize) -> Vec<InvoiceItem> {
        let details: Vec<&XmlNode> = inf.children_named("det").collect();
        if details.len() > max_items {
            self.fail("det", FieldReason::TooMany);
            return Vec::new();
        }

        details
            .into_iter()
            .enumerate()
            .filter_map(|(index, det)| self.item(index + 1, det))
            .collect()
    }

    fn item(&mut self, position: usize, det: &XmlNode) -> Option<InvoiceItem> {
        let prefix = format!("det[{position}]/prod");
        let Some(prod) = det.child("prod") else {
            self.fail(prefix, FieldReason::Missing);
            return None;
        };

        let code = self.required_text(Some(prod), "cProd", &format!("{prefix}/cProd"));
        let description = self.required_text(Some(prod), "xProd", &format!("{prefix}/xProd"));
        let ncm = child_text(Some(prod), "NCM").map(|raw| self.clean(&format!("{prefix}/NCM"), raw));
        let quantity = self.optional_decimal(prod, "qCom", &format!("{prefix}/qCom"), 4);
        let unit_value = self.optional_decimal(prod, "vUnCom", &format!("{prefix}/vUnCom"), 10);
        let total = self.optional_money(Some(prod), "vProd", &format!("{prefix}/vProd"));

        Some(InvoiceItem {
            code: code?,
            description: description?,
            ncm: ncm.filter(|n| !n.is_empty()),
            quantity,
            unit_value,
            total,
        })
    }
}

fn child_text<'a>(parent: Option<&'a XmlNode>, name: &str) -> Option<&'a str> {
    parent?
        .child(name)
        .map(|node| node.text.trim())
        .filter(|text| !text.is_empty())
}

/// `dhEmi` is RFC 3339 in layout 4.00; older layouts carry a plain `dEmi` date.
fn parse_issue_date(raw: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}
