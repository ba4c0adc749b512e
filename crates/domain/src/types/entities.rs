//! Internal ledger entities
//!
//! The tenant-owned records that provider data is reconciled against and
//! persisted into. Identity inside the store is a UUID; `provider_id` carries
//! the upstream identifier used for reconciliation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chart-of-accounts entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub provider_id: String,
    pub code: Option<String>,
    pub name: String,
    pub account_type: Option<String>,
}

/// Supplier/vendor record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub provider_id: String,
    pub name: String,
    pub email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Invoice lifecycle status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Submitted,
    Authorised,
    Paid,
    Voided,
}

impl InvoiceStatus {
    /// Statuses eligible for transaction-to-invoice matching.
    pub fn is_matchable(&self) -> bool {
        matches!(self, Self::Authorised | Self::Paid)
    }
}

/// Supplier invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub provider_id: String,
    pub number: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub total_amount: f64,
    pub invoice_date: NaiveDate,
    pub status: InvoiceStatus,
    pub updated_at: DateTime<Utc>,
}

/// Bank transaction imported from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub provider_id: String,
    pub account_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    /// Invoice linked by the duplicate-window heuristic, when unambiguous.
    pub invoice_id: Option<Uuid>,
    pub amount: f64,
    pub date: NaiveDate,
    pub reference: Option<String>,
    /// Hash of the serialized provider payload, used for change detection.
    pub payload_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// One debit/credit line of a manual journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_code: String,
    pub debit: f64,
    pub credit: f64,
    pub description: Option<String>,
}

/// Manual journal entry with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualJournal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub provider_id: String,
    pub narration: String,
    pub journal_date: NaiveDate,
    pub lines: Vec<JournalLine>,
    pub payload_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl ManualJournal {
    pub fn total_debits(&self) -> f64 {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> f64 {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Journals whose debits and credits diverge by more than one cent are
    /// rejected as record errors, never persisted.
    pub fn is_balanced(&self) -> bool {
        (self.total_debits() - self.total_credits()).abs() <= 0.01
    }
}
