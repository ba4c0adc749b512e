//! Entity reconciliation
//!
//! Links provider records to internal entities through in-memory lookup maps
//! built per `(tenant, provider)` pair. Lookups fall back through identifier
//! families in a fixed order and stop at the first hit; fuzzy heuristics
//! (normalized names, the invoice match window) only run when nothing
//! stronger resolved.

pub mod cache;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ledgersync_domain::{InvoiceStatus, Provider, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::ports::{
    AccountRepository, InvoiceRepository, SupplierRepository, TransactionRepository,
};
use cache::{CacheKey, InvalidationScope, LookupCache};

/// Days on either side of a transaction date an invoice may fall in and
/// still be considered a match candidate.
const INVOICE_MATCH_WINDOW_DAYS: i64 = 3;

/// Amounts closer than half a cent are equal.
const AMOUNT_EPSILON: f64 = 0.005;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[^a-z0-9\s]").unwrap()
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+").unwrap()
});

/// Lowercase, strip punctuation, collapse runs of whitespace.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = NON_ALNUM.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Invoice fields needed by the duplicate-window matcher.
#[derive(Debug, Clone)]
struct InvoiceCandidate {
    id: Uuid,
    total_amount: f64,
    invoice_date: NaiveDate,
    status: InvoiceStatus,
}

/// Fields of an incoming transaction relevant to invoice matching.
#[derive(Debug, Clone, Copy)]
pub struct TransactionProbe {
    pub supplier_id: Option<Uuid>,
    pub amount: f64,
    pub date: NaiveDate,
}

/// Index families for one tenant/provider pair.
#[derive(Debug, Default)]
pub struct EntityLookupMaps {
    accounts_by_provider_id: HashMap<String, Uuid>,
    accounts_by_code: HashMap<String, Uuid>,
    accounts_by_lower_name: HashMap<String, Uuid>,
    suppliers_by_provider_id: HashMap<String, Uuid>,
    suppliers_by_lower_name: HashMap<String, Uuid>,
    suppliers_by_normalized_name: HashMap<String, Uuid>,
    invoices_by_provider_id: HashMap<String, Uuid>,
    invoices_by_number: HashMap<String, Uuid>,
    invoices_by_supplier: HashMap<Uuid, Vec<InvoiceCandidate>>,
    transactions_by_provider_id: HashMap<String, Uuid>,
}

impl EntityLookupMaps {
    /// Resolve an account: provider id, then code, then lowercased name.
    #[must_use]
    pub fn find_account_id(
        &self,
        provider_id: Option<&str>,
        code: Option<&str>,
        name: Option<&str>,
    ) -> Option<Uuid> {
        if let Some(id) = provider_id.and_then(|k| self.accounts_by_provider_id.get(k)) {
            return Some(*id);
        }
        if let Some(id) = code.and_then(|k| self.accounts_by_code.get(k)) {
            return Some(*id);
        }
        name.and_then(|k| self.accounts_by_lower_name.get(&k.to_lowercase())).copied()
    }

    /// Resolve a supplier: provider id, then exact lowercased name, then
    /// normalized name.
    #[must_use]
    pub fn find_supplier_id(&self, provider_id: Option<&str>, name: Option<&str>) -> Option<Uuid> {
        if let Some(id) = provider_id.and_then(|k| self.suppliers_by_provider_id.get(k)) {
            return Some(*id);
        }
        if let Some(id) = name.and_then(|k| self.suppliers_by_lower_name.get(&k.to_lowercase())) {
            return Some(*id);
        }
        name.and_then(|k| self.suppliers_by_normalized_name.get(&normalize_name(k))).copied()
    }

    /// Resolve an invoice: provider id, then invoice number.
    #[must_use]
    pub fn find_invoice_id(&self, provider_id: Option<&str>, number: Option<&str>) -> Option<Uuid> {
        if let Some(id) = provider_id.and_then(|k| self.invoices_by_provider_id.get(k)) {
            return Some(*id);
        }
        number.and_then(|k| self.invoices_by_number.get(k)).copied()
    }

    #[must_use]
    pub fn find_transaction_id(&self, provider_id: Option<&str>) -> Option<Uuid> {
        provider_id.and_then(|k| self.transactions_by_provider_id.get(k)).copied()
    }

    /// Match a transaction to exactly one authorised or paid invoice of the
    /// same supplier, with an equal amount, dated within the match window.
    /// Zero candidates or more than one both yield `None`; an ambiguous
    /// match is never guessed at.
    #[must_use]
    pub fn match_transaction_to_invoice(&self, probe: &TransactionProbe) -> Option<Uuid> {
        let supplier_id = probe.supplier_id?;
        let candidates = self.invoices_by_supplier.get(&supplier_id)?;
        let amount = probe.amount.abs();

        let mut matches = candidates.iter().filter(|invoice| {
            invoice.status.is_matchable()
                && (invoice.total_amount - amount).abs() < AMOUNT_EPSILON
                && (invoice.invoice_date - probe.date).num_days().abs()
                    <= INVOICE_MATCH_WINDOW_DAYS
        });

        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only.id),
            (Some(_), Some(_)) => {
                debug!(supplier_id = %supplier_id, amount, "ambiguous invoice match skipped");
                None
            }
            _ => None,
        }
    }
}

/// Builds and caches lookup maps, reading entity stores concurrently.
pub struct ReconciliationService {
    accounts: Arc<dyn AccountRepository>,
    suppliers: Arc<dyn SupplierRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    transactions: Arc<dyn TransactionRepository>,
    cache: LookupCache,
}

impl ReconciliationService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        suppliers: Arc<dyn SupplierRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        transactions: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self { accounts, suppliers, invoices, transactions, cache: LookupCache::new() }
    }

    /// Lookup maps for the pair, built on first use and cached until
    /// invalidated.
    pub async fn lookup_maps(
        &self,
        tenant_id: Uuid,
        provider: Provider,
    ) -> Result<Arc<EntityLookupMaps>> {
        let key = CacheKey { tenant_id, provider };
        if let Some(maps) = self.cache.get(&key) {
            return Ok(maps);
        }
        let maps = Arc::new(self.build_lookup_maps(tenant_id).await?);
        self.cache.put(key, Arc::clone(&maps));
        Ok(maps)
    }

    /// Drop cached maps; the next lookup rebuilds from the stores.
    pub fn invalidate(&self, scope: InvalidationScope) {
        self.cache.invalidate(scope);
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn build_lookup_maps(&self, tenant_id: Uuid) -> Result<EntityLookupMaps> {
        let (accounts, suppliers, invoices, transactions) = tokio::join!(
            self.accounts.accounts_for_tenant(tenant_id),
            self.suppliers.suppliers_for_tenant(tenant_id),
            self.invoices.invoices_for_tenant(tenant_id),
            self.transactions.transactions_for_tenant(tenant_id),
        );
        let (accounts, suppliers, invoices, transactions) =
            (accounts?, suppliers?, invoices?, transactions?);

        let mut maps = EntityLookupMaps::default();

        for account in accounts {
            maps.accounts_by_provider_id.insert(account.provider_id.clone(), account.id);
            if let Some(code) = &account.code {
                maps.accounts_by_code.insert(code.clone(), account.id);
            }
            maps.accounts_by_lower_name.insert(account.name.to_lowercase(), account.id);
        }

        for supplier in suppliers {
            maps.suppliers_by_provider_id.insert(supplier.provider_id.clone(), supplier.id);
            maps.suppliers_by_lower_name.insert(supplier.name.to_lowercase(), supplier.id);
            maps.suppliers_by_normalized_name.insert(normalize_name(&supplier.name), supplier.id);
        }

        for invoice in invoices {
            maps.invoices_by_provider_id.insert(invoice.provider_id.clone(), invoice.id);
            if let Some(number) = &invoice.number {
                maps.invoices_by_number.insert(number.clone(), invoice.id);
            }
            if let Some(supplier_id) = invoice.supplier_id {
                maps.invoices_by_supplier.entry(supplier_id).or_default().push(
                    InvoiceCandidate {
                        id: invoice.id,
                        total_amount: invoice.total_amount,
                        invoice_date: invoice.invoice_date,
                        status: invoice.status,
                    },
                );
            }
        }

        for transaction in transactions {
            maps.transactions_by_provider_id.insert(transaction.provider_id.clone(), transaction.id);
        }

        debug!(
            accounts = maps.accounts_by_provider_id.len(),
            suppliers = maps.suppliers_by_provider_id.len(),
            invoices = maps.invoices_by_provider_id.len(),
            transactions = maps.transactions_by_provider_id.len(),
            "lookup maps built"
        );
        Ok(maps)
    }
}
