//! Provider-shaped import DTOs
//!
//! Transient records produced by the transform phase of an import pipeline
//! and consumed once by the reconcile/persist phase. Each constructor
//! validates required fields against the opaque provider record and fails
//! with a `Validation` error naming the offending field; callers skip such
//! records without aborting the batch.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SyncError};
use crate::types::entities::InvoiceStatus;

/// Page request against the provider's paginated query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    /// Incremental-sync lower bound for the provider's modified filter.
    pub modified_since: Option<DateTime<Utc>>,
}

impl PageQuery {
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size, modified_since: None }
    }
}

/// Stable fingerprint of a provider record, used for change detection in the
/// diff phase.
#[must_use]
pub fn payload_fingerprint(record: &Value) -> String {
    blake3::hash(record.to_string().as_bytes()).to_hex().to_string()
}

/// Bank transaction as fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTransaction {
    pub provider_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub reference: Option<String>,
    pub account_provider_id: Option<String>,
    pub account_code: Option<String>,
    pub contact_provider_id: Option<String>,
    pub contact_name: Option<String>,
    pub payload_hash: String,
}

impl ProviderTransaction {
    /// Validate and transform one opaque provider record.
    pub fn from_record(record: &Value) -> Result<Self> {
        Ok(Self {
            provider_id: required_str(record, "transaction_id")?,
            date: required_date(record, "date")?,
            amount: required_f64(record, "amount")?,
            reference: optional_str(record, "reference"),
            account_provider_id: optional_str(record, "account_id"),
            account_code: optional_str(record, "account_code"),
            contact_provider_id: optional_str(record, "contact_id"),
            contact_name: optional_str(record, "contact_name"),
            payload_hash: payload_fingerprint(record),
        })
    }
}

/// Supplier as fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSupplier {
    pub provider_id: String,
    pub name: String,
    pub email: Option<String>,
    pub payload_hash: String,
}

impl ProviderSupplier {
    pub fn from_record(record: &Value) -> Result<Self> {
        Ok(Self {
            provider_id: required_str(record, "contact_id")?,
            name: required_str(record, "name")?,
            email: optional_str(record, "email"),
            payload_hash: payload_fingerprint(record),
        })
    }
}

/// Invoice as fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInvoice {
    pub provider_id: String,
    pub number: Option<String>,
    pub contact_provider_id: Option<String>,
    pub contact_name: Option<String>,
    pub total: f64,
    pub date: NaiveDate,
    pub status: InvoiceStatus,
    pub payload_hash: String,
}

impl ProviderInvoice {
    pub fn from_record(record: &Value) -> Result<Self> {
        Ok(Self {
            provider_id: required_str(record, "invoice_id")?,
            number: optional_str(record, "invoice_number"),
            contact_provider_id: optional_str(record, "contact_id"),
            contact_name: optional_str(record, "contact_name"),
            total: required_f64(record, "total")?,
            date: required_date(record, "date")?,
            status: parse_status(record)?,
            payload_hash: payload_fingerprint(record),
        })
    }
}

/// One line of a provider manual journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderJournalLine {
    pub account_code: String,
    pub debit: f64,
    pub credit: f64,
    pub description: Option<String>,
}

/// Manual journal as fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderJournal {
    pub provider_id: String,
    pub narration: String,
    pub date: NaiveDate,
    pub lines: Vec<ProviderJournalLine>,
    pub payload_hash: String,
}

impl ProviderJournal {
    pub fn from_record(record: &Value) -> Result<Self> {
        let raw_lines = record
            .get("journal_lines")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("journal_lines"))?;

        let mut lines = Vec::with_capacity(raw_lines.len());
        for raw in raw_lines {
            lines.push(ProviderJournalLine {
                account_code: required_str(raw, "account_code")?,
                debit: raw.get("debit").and_then(Value::as_f64).unwrap_or(0.0),
                credit: raw.get("credit").and_then(Value::as_f64).unwrap_or(0.0),
                description: optional_str(raw, "description"),
            });
        }

        Ok(Self {
            provider_id: required_str(record, "journal_id")?,
            narration: required_str(record, "narration")?,
            date: required_date(record, "date")?,
            lines,
            payload_hash: payload_fingerprint(record),
        })
    }

    pub fn total_debits(&self) -> f64 {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> f64 {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

fn missing(field: &str) -> SyncError {
    SyncError::Validation(format!("missing required field: {field}"))
}

fn required_str(record: &Value, field: &str) -> Result<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing(field))
}

fn optional_str(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

fn required_f64(record: &Value, field: &str) -> Result<f64> {
    record.get(field).and_then(Value::as_f64).ok_or_else(|| missing(field))
}

fn required_date(record: &Value, field: &str) -> Result<NaiveDate> {
    let raw = record.get(field).and_then(Value::as_str).ok_or_else(|| missing(field))?;
    // Providers return either a bare date or a full RFC 3339 timestamp.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| SyncError::Validation(format!("invalid date in field {field}: {raw}")))
}

fn parse_status(record: &Value) -> Result<InvoiceStatus> {
    let raw = record.get("status").and_then(Value::as_str).ok_or_else(|| missing("status"))?;
    match raw.to_ascii_uppercase().as_str() {
        "DRAFT" => Ok(InvoiceStatus::Draft),
        "SUBMITTED" => Ok(InvoiceStatus::Submitted),
        "AUTHORISED" | "AUTHORIZED" => Ok(InvoiceStatus::Authorised),
        "PAID" => Ok(InvoiceStatus::Paid),
        "VOIDED" | "DELETED" => Ok(InvoiceStatus::Voided),
        other => Err(SyncError::Validation(format!("unknown invoice status: {other}"))),
    }
}
