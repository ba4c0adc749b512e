//! Request-scoped execution context
//!
//! An immutable bundle of tenant, integration, and credential scope that is
//! propagated through every downstream call of one sync run. Propagation uses
//! tokio's task-local storage, so two concurrently running contexts can never
//! observe each other's credentials, across any await point. Contexts are
//! never mutated in place; a credential refresh produces a new context that
//! callers switch to explicitly.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgersync_domain::{AuthData, Integration, Result, SyncError};
use uuid::Uuid;

tokio::task_local! {
    static CURRENT: Arc<ExecutionContext>;
}

/// Provider credentials extracted from an integration's auth data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Provider-side tenant/realm identifier sent with every API call.
    pub provider_tenant_id: String,
}

/// Immutable per-call-chain execution scope.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub integration_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    credentials: Option<ProviderCredentials>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Create a context without provider credentials (queries, admin calls).
    #[must_use]
    pub fn new(tenant_id: Uuid, integration_id: Option<Uuid>, user_id: Option<Uuid>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant_id,
            integration_id,
            user_id,
            credentials: None,
            started_at: Utc::now(),
        }
    }

    /// Build a provider-scoped context from an integration, extracting and
    /// validating its credentials.
    ///
    /// # Errors
    /// Fails with `AuthenticationRequired` naming exactly which credential
    /// fields are absent from the auth data blob.
    pub fn for_integration(integration: &Integration) -> Result<Self> {
        let auth = AuthData::parse(&integration.auth_data)?;

        let mut missing = Vec::new();
        if auth.access_token.as_deref().map_or(true, str::is_empty) {
            missing.push("access_token");
        }
        if auth.refresh_token.as_deref().map_or(true, str::is_empty) {
            missing.push("refresh_token");
        }
        if auth.provider_tenant_id.as_deref().map_or(true, str::is_empty) {
            missing.push("provider_tenant_id");
        }
        if !missing.is_empty() {
            return Err(SyncError::AuthenticationRequired(format!(
                "missing credential fields: {}",
                missing.join(", ")
            )));
        }

        // Fields verified present above.
        let credentials = ProviderCredentials {
            access_token: auth.access_token.unwrap_or_default(),
            refresh_token: auth.refresh_token.unwrap_or_default(),
            provider_tenant_id: auth.provider_tenant_id.unwrap_or_default(),
        };

        Ok(Self {
            request_id: Uuid::new_v4(),
            tenant_id: integration.tenant_id,
            integration_id: Some(integration.id),
            user_id: None,
            credentials: Some(credentials),
            started_at: Utc::now(),
        })
    }

    /// Derive a new context carrying refreshed credentials. The original
    /// context (and anything that captured it) is left untouched.
    #[must_use]
    pub fn with_credentials(&self, credentials: ProviderCredentials) -> Self {
        Self { credentials: Some(credentials), ..self.clone() }
    }

    /// Credentials of this context, or a 401-class error when absent.
    pub fn credentials(&self) -> Result<&ProviderCredentials> {
        self.credentials.as_ref().ok_or_else(|| {
            SyncError::AuthenticationRequired(
                "execution context carries no provider credentials".to_string(),
            )
        })
    }
}

/// Execute `fut` with `context` as the ambient current context for the
/// duration of the call, restored afterward even on panic.
pub async fn run<F>(context: Arc<ExecutionContext>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(context, fut).await
}

/// The current context, if one is in scope for this task.
#[must_use]
pub fn current() -> Option<Arc<ExecutionContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// The current context, or an error when called outside [`run`].
pub fn require_current() -> Result<Arc<ExecutionContext>> {
    current().ok_or_else(|| {
        SyncError::Internal("no execution context bound to the current task".to_string())
    })
}
