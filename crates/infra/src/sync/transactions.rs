//! Bank transaction import
//!
//! New transactions get their account and supplier foreign keys resolved
//! through the lookup maps and, when unambiguous, a linked invoice. Existing
//! rows are diffed on the payload fingerprint so unchanged provider records
//! cost one lookup and nothing else.

use chrono::Utc;
use ledgersync_core::{EntityLookupMaps, TransactionProbe};
use ledgersync_domain::{BankTransaction, Integration, ProviderTransaction, SyncOutcome};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::sync::pipeline::PipelineDeps;

pub(crate) async fn import_batch(
    deps: &PipelineDeps,
    integration: &Integration,
    maps: &EntityLookupMaps,
    batch: &[Value],
    outcome: &mut SyncOutcome,
) {
    for record in batch {
        let dto = match ProviderTransaction::from_record(record) {
            Ok(dto) => dto,
            Err(error) => {
                outcome.errors.push(format!("transaction skipped: {error}"));
                continue;
            }
        };

        let existing = match deps
            .transactions
            .find_by_provider_id(integration.tenant_id, integration.id, &dto.provider_id)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                outcome.errors.push(format!("transaction {}: {error}", dto.provider_id));
                continue;
            }
        };

        let result = match existing {
            Some(current) if current.payload_hash == dto.payload_hash => {
                outcome.skipped += 1;
                continue;
            }
            Some(mut current) => {
                current.amount = dto.amount;
                current.date = dto.date;
                current.reference = dto.reference.clone();
                current.payload_hash = dto.payload_hash.clone();
                current.updated_at = Utc::now();
                deps.transactions.save(&current).await.map(|()| &mut outcome.updated)
            }
            None => {
                let transaction = build_transaction(integration, maps, &dto);
                deps.transactions.save(&transaction).await.map(|()| &mut outcome.imported)
            }
        };

        match result {
            Ok(counter) => *counter += 1,
            Err(error) => {
                outcome.errors.push(format!("transaction {}: {error}", dto.provider_id));
            }
        }
    }
}

fn build_transaction(
    integration: &Integration,
    maps: &EntityLookupMaps,
    dto: &ProviderTransaction,
) -> BankTransaction {
    let account_id = maps.find_account_id(
        dto.account_provider_id.as_deref(),
        dto.account_code.as_deref(),
        None,
    );
    let supplier_id =
        maps.find_supplier_id(dto.contact_provider_id.as_deref(), dto.contact_name.as_deref());
    let invoice_id = maps.match_transaction_to_invoice(&TransactionProbe {
        supplier_id,
        amount: dto.amount,
        date: dto.date,
    });
    if invoice_id.is_some() {
        debug!(provider_id = %dto.provider_id, "transaction linked to invoice");
    }

    BankTransaction {
        id: Uuid::new_v4(),
        tenant_id: integration.tenant_id,
        integration_id: integration.id,
        provider_id: dto.provider_id.clone(),
        account_id,
        supplier_id,
        invoice_id,
        amount: dto.amount,
        date: dto.date,
        reference: dto.reference.clone(),
        payload_hash: dto.payload_hash.clone(),
        updated_at: Utc::now(),
    }
}
