//! Manual journal import
//!
//! Journals whose debits and credits diverge by more than one cent are
//! recorded as per-record errors and never persisted.

use chrono::Utc;
use ledgersync_domain::{
    Integration, JournalLine, ManualJournal, ProviderJournal, SyncOutcome,
};
use serde_json::Value;
use uuid::Uuid;

use crate::sync::pipeline::PipelineDeps;

/// Maximum tolerated debit/credit divergence.
const BALANCE_TOLERANCE: f64 = 0.01;

pub(crate) async fn import_batch(
    deps: &PipelineDeps,
    integration: &Integration,
    batch: &[Value],
    outcome: &mut SyncOutcome,
) {
    for record in batch {
        let dto = match ProviderJournal::from_record(record) {
            Ok(dto) => dto,
            Err(error) => {
                outcome.errors.push(format!("journal skipped: {error}"));
                continue;
            }
        };

        let imbalance = (dto.total_debits() - dto.total_credits()).abs();
        if imbalance > BALANCE_TOLERANCE {
            outcome.errors.push(format!(
                "journal {} unbalanced: debits {:.2} vs credits {:.2}",
                dto.provider_id,
                dto.total_debits(),
                dto.total_credits()
            ));
            continue;
        }

        let existing = match deps
            .journals
            .find_by_provider_id(integration.tenant_id, integration.id, &dto.provider_id)
            .await
        {
            Ok(existing) => existing,
            Err(error) => {
                outcome.errors.push(format!("journal {}: {error}", dto.provider_id));
                continue;
            }
        };

        let result = match existing {
            Some(current) if current.payload_hash == dto.payload_hash => {
                outcome.skipped += 1;
                continue;
            }
            Some(mut current) => {
                current.narration = dto.narration.clone();
                current.journal_date = dto.date;
                current.lines = lines_from(&dto);
                current.payload_hash = dto.payload_hash.clone();
                current.updated_at = Utc::now();
                deps.journals.save(&current).await.map(|()| &mut outcome.updated)
            }
            None => {
                let journal = ManualJournal {
                    id: Uuid::new_v4(),
                    tenant_id: integration.tenant_id,
                    integration_id: integration.id,
                    provider_id: dto.provider_id.clone(),
                    narration: dto.narration.clone(),
                    journal_date: dto.date,
                    lines: lines_from(&dto),
                    payload_hash: dto.payload_hash.clone(),
                    updated_at: Utc::now(),
                };
                deps.journals.save(&journal).await.map(|()| &mut outcome.imported)
            }
        };

        match result {
            Ok(counter) => *counter += 1,
            Err(error) => outcome.errors.push(format!("journal {}: {error}", dto.provider_id)),
        }
    }
}

fn lines_from(dto: &ProviderJournal) -> Vec<JournalLine> {
    dto.lines
        .iter()
        .map(|line| JournalLine {
            account_code: line.account_code.clone(),
            debit: line.debit,
            credit: line.credit,
            description: line.description.clone(),
        })
        .collect()
}
