//! Invoice import
//!
//! Supplier links are resolved on insert through the lookup maps; on update
//! only the mutable invoice fields move, existing links stay.

use chrono::Utc;
use ledgersync_core::EntityLookupMaps;
use ledgersync_domain::{Integration, Invoice, ProviderInvoice, SyncOutcome};
use serde_json::Value;
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
        let dto = match ProviderInvoice::from_record(record) {
            Ok(dto) => dto,
            Err(error) => {
                outcome.errors.push(format!("invoice skipped: {error}"));
                continue;
            }
        };

        let existing = match deps
            .invoices
            .find_by_provider_id(integration.tenant_id, integration.id, &dto.provider_id)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                outcome.errors.push(format!("invoice {}: {error}", dto.provider_id));
                continue;
            }
        };

        let result = match existing {
            Some(current) if unchanged(&current, &dto) => {
                outcome.skipped += 1;
                continue;
            }
            Some(mut current) => {
                current.number = dto.number.clone();
                current.total_amount = dto.total;
                current.invoice_date = dto.date;
                current.status = dto.status;
                current.updated_at = Utc::now();
                deps.invoices.save(&current).await.map(|()| &mut outcome.updated)
            }
            None => {
                let supplier_id = maps
                    .find_supplier_id(dto.contact_provider_id.as_deref(), dto.contact_name.as_deref());
                let invoice = Invoice {
                    id: Uuid::new_v4(),
                    tenant_id: integration.tenant_id,
                    integration_id: integration.id,
                    provider_id: dto.provider_id.clone(),
                    number: dto.number.clone(),
                    supplier_id,
                    total_amount: dto.total,
                    invoice_date: dto.date,
                    status: dto.status,
                    updated_at: Utc::now(),
                };
                deps.invoices.save(&invoice).await.map(|()| &mut outcome.imported)
            }
        };

        match result {
            Ok(counter) => *counter += 1,
            Err(error) => outcome.errors.push(format!("invoice {}: {error}", dto.provider_id)),
        }
    }
}

fn unchanged(current: &Invoice, dto: &ProviderInvoice) -> bool {
    current.number == dto.number
        && (current.total_amount - dto.total).abs() < f64::EPSILON
        && current.invoice_date == dto.date
        && current.status == dto.status
}
