//! Credential isolation between concurrently running sync tasks.
//!
//! Each provider call reads its token from the task-local execution
//! context; two interleaved tenants must only ever observe their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ledgersync_core::{context, require_current, ExecutionContext, ProviderClient};
use ledgersync_domain::{Integration, PageQuery, Provider, Result};
use serde_json::{json, Value};
use uuid::Uuid;

/// Echoes the access token of the calling context back as a record.
struct EchoClient;

#[async_trait]
impl ProviderClient for EchoClient {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    async fn fetch_transactions(&self, _query: &PageQuery) -> Result<Vec<Value>> {
        let token = require_current()?.credentials()?.access_token.clone();
        // Hold the token across an await point to give the scheduler a
        // chance to interleave the other task.
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(vec![json!({ "seen_token": token })])
    }

    async fn fetch_suppliers(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.fetch_transactions(query).await
    }

    async fn fetch_invoices(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.fetch_transactions(query).await
    }

    async fn fetch_journals(&self, query: &PageQuery) -> Result<Vec<Value>> {
        self.fetch_transactions(query).await
    }
}

fn context_for_token(token: &str) -> Arc<ExecutionContext> {
    let integration = Integration::new(
        Uuid::new_v4(),
        Provider::Xero,
        json!({
            "access_token": token,
            "refresh_token": "rt",
            "provider_tenant_id": "tenant",
            "expires_at": Utc::now() + chrono::Duration::hours(1),
        }),
    );
    Arc::new(ExecutionContext::for_integration(&integration).unwrap())
}

#[tokio::test]
async fn interleaved_tenants_only_observe_their_own_token() {
    let client = Arc::new(EchoClient);

    let spawn_tenant = |token: &'static str| {
        let client = Arc::clone(&client);
        tokio::spawn(context::run(context_for_token(token), async move {
            for _ in 0..25 {
                let records = client.fetch_transactions(&PageQuery::new(1, 100)).await.unwrap();
                assert_eq!(records[0]["seen_token"], token);
            }
        }))
    };

    let a = spawn_tenant("token-tenant-a");
    let b = spawn_tenant("token-tenant-b");
    a.await.unwrap();
    b.await.unwrap();
}

#[tokio::test]
async fn calls_outside_a_context_are_rejected() {
    let client = EchoClient;
    let error = client.fetch_transactions(&PageQuery::new(1, 100)).await.unwrap_err();
    assert!(matches!(error, ledgersync_domain::SyncError::Internal(_)));
}
