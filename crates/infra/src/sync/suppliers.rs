//! Supplier import
//!
//! Suppliers carry no opaque payload beyond name and email, so the diff is a
//! direct field comparison instead of a fingerprint check.

use chrono::Utc;
use ledgersync_domain::{Integration, ProviderSupplier, Supplier, SyncOutcome};
use serde_json::Value;
use uuid::Uuid;

use crate::sync::pipeline::PipelineDeps;

pub(crate) async fn import_batch(
    deps: &PipelineDeps,
    integration: &Integration,
    batch: &[Value],
    outcome: &mut SyncOutcome,
) {
    for record in batch {
        let dto = match ProviderSupplier::from_record(record) {
            Ok(dto) => dto,
            Err(error) => {
                outcome.errors.push(format!("supplier skipped: {error}"));
                continue;
            }
        };

        let existing = match deps
            .suppliers
            .find_by_provider_id(integration.tenant_id, integration.id, &dto.provider_id)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                outcome.errors.push(format!("supplier {}: {error}", dto.provider_id));
                continue;
            }
        };

        let result = match existing {
            Some(current) if current.name == dto.name && current.email == dto.email => {
                outcome.skipped += 1;
                continue;
            }
            Some(mut current) => {
                current.name = dto.name.clone();
                current.email = dto.email.clone();
                current.updated_at = Utc::now();
                deps.suppliers.save(&current).await.map(|()| &mut outcome.updated)
            }
            None => {
                let supplier = Supplier {
                    id: Uuid::new_v4(),
                    tenant_id: integration.tenant_id,
                    integration_id: integration.id,
                    provider_id: dto.provider_id.clone(),
                    name: dto.name.clone(),
                    email: dto.email.clone(),
                    updated_at: Utc::now(),
                };
                deps.suppliers.save(&supplier).await.map(|()| &mut outcome.imported)
            }
        };

        match result {
            Ok(counter) => *counter += 1,
            Err(error) => outcome.errors.push(format!("supplier {}: {error}", dto.provider_id)),
        }
    }
}
