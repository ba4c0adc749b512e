//! OAuth token lifecycle management
//!
//! Health assessment, proactive refresh, and escalation to interactive
//! re-authentication. The service owns no HTTP: actual token exchanges go
//! through the per-provider [`TokenRefresher`] port.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use ledgersync_domain::{AuthData, Integration, Provider, Result, SyncError, TokenSet};
use tracing::{info, instrument, warn};

use crate::context::ProviderCredentials;
use crate::ports::TokenRefresher;

/// Refresh proactively when the access token expires within this window.
pub const REFRESH_THRESHOLD_SECS: i64 = 300;

/// Consecutive refresh failures after which we stop retrying and require the
/// user to re-authenticate.
pub const MAX_REFRESH_FAILURES: u32 = 10;

/// Refresh error fragments that mean the refresh token itself is dead, so
/// retrying is pointless.
const REAUTH_SIGNALS: [&str; 6] = [
    "invalid_grant",
    "refresh_token",
    "expired",
    "revoked",
    "invalid token",
    "authentication required",
];

/// Snapshot of an integration's token state.
#[derive(Debug, Clone)]
pub struct TokenHealth {
    pub is_valid: bool,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    pub seconds_until_expiry: Option<i64>,
    pub needs_refresh: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Outcome of a refresh attempt.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    pub success: bool,
    pub tokens: Option<TokenSet>,
    pub error: Option<String>,
    /// The refresh token is unusable; interactive re-auth is the only way
    /// forward.
    pub needs_reauth: bool,
}

impl RefreshResult {
    fn succeeded(tokens: Option<TokenSet>) -> Self {
        Self { success: true, tokens, error: None, needs_reauth: false }
    }

    fn failed(error: String, needs_reauth: bool) -> Self {
        Self { success: false, tokens: None, error: Some(error), needs_reauth }
    }
}

/// Token health checks, refresh, and reauth escalation.
pub struct TokenLifecycleService {
    refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
}

impl TokenLifecycleService {
    #[must_use]
    pub fn new(refreshers: Vec<Arc<dyn TokenRefresher>>) -> Self {
        let refreshers = refreshers.into_iter().map(|r| (r.provider(), r)).collect();
        Self { refreshers }
    }

    /// Assess the integration's token state. Never fails: an unreadable
    /// credential blob is reported as an invalid token needing refresh.
    #[must_use]
    pub fn check_health(&self, integration: &Integration) -> TokenHealth {
        let consecutive_failures = integration.consecutive_refresh_failures();
        let last_error = integration.last_error_message.clone();

        let Ok(auth) = AuthData::parse(&integration.auth_data) else {
            return TokenHealth {
                is_valid: false,
                expires_at: None,
                seconds_until_expiry: None,
                needs_refresh: true,
                consecutive_failures,
                last_error,
            };
        };

        let has_access_token = auth.access_token.as_deref().is_some_and(|t| !t.is_empty());
        let expires_at = auth.effective_expires_at();
        let seconds_until_expiry = expires_at.map(|at| (at - Utc::now()).num_seconds());

        // Unknown expiry is treated as expiring: better one redundant
        // refresh than a mid-sync 401.
        let needs_refresh =
            seconds_until_expiry.map_or(true, |secs| secs <= REFRESH_THRESHOLD_SECS);
        let is_valid = has_access_token && seconds_until_expiry.is_some_and(|secs| secs > 0);

        TokenHealth {
            is_valid,
            expires_at,
            seconds_until_expiry,
            needs_refresh,
            consecutive_failures,
            last_error,
        }
    }

    /// Refresh the integration's tokens when the expiry window demands it.
    /// Healthy tokens short-circuit to success without touching the
    /// provider.
    pub async fn refresh_if_needed(&self, integration: &mut Integration) -> RefreshResult {
        if !self.check_health(integration).needs_refresh {
            return RefreshResult::succeeded(None);
        }
        self.refresh(integration).await
    }

    /// Unconditionally exchange the refresh token for new tokens and merge
    /// them into the integration's auth data.
    ///
    /// Failures increment the consecutive failure counter; at
    /// [`MAX_REFRESH_FAILURES`] the integration is marked as needing
    /// interactive re-authentication. The caller persists the mutated
    /// integration either way.
    #[instrument(skip(self, integration), fields(integration_id = %integration.id, provider = %integration.provider))]
    pub async fn refresh(&self, integration: &mut Integration) -> RefreshResult {
        let Some(refresher) = self.refreshers.get(&integration.provider) else {
            let message = SyncError::Config(format!(
                "token refresh not implemented for {}",
                integration.provider
            ))
            .to_string();
            return RefreshResult::failed(message, false);
        };

        let credentials = match self.credentials_for(integration) {
            Ok(credentials) => credentials,
            Err(error) => {
                return self.record_failure(integration, &error.to_string());
            }
        };

        match refresher.refresh(&credentials).await {
            Ok(tokens) => {
                if let Err(error) = integration.update_auth_data(&tokens) {
                    return self.record_failure(integration, &error.to_string());
                }
                info!("token refresh succeeded");
                RefreshResult::succeeded(Some(tokens))
            }
            Err(error) => self.record_failure(integration, &error.to_string()),
        }
    }

    /// Whether a refresh failure means the refresh token is dead: either the
    /// message carries a known terminal signal or the integration has failed
    /// too many times in a row.
    #[must_use]
    pub fn is_reauth_required(&self, message: &str, integration: &Integration) -> bool {
        let lowered = message.to_lowercase();
        REAUTH_SIGNALS.iter().any(|signal| lowered.contains(signal))
            || integration.consecutive_refresh_failures() >= MAX_REFRESH_FAILURES
    }

    /// Gate a sync run on usable credentials. Called after
    /// [`refresh_if_needed`](Self::refresh_if_needed) so a refreshable token
    /// has already been refreshed.
    pub fn validate(&self, integration: &Integration) -> Result<()> {
        let health = self.check_health(integration);
        if health.consecutive_failures >= MAX_REFRESH_FAILURES {
            return Err(SyncError::AuthenticationRequired(format!(
                "integration {} exceeded {MAX_REFRESH_FAILURES} consecutive refresh failures",
                integration.id
            )));
        }
        if !health.is_valid {
            return Err(SyncError::AuthenticationRequired(format!(
                "integration {} has no valid access token",
                integration.id
            )));
        }
        Ok(())
    }

    fn credentials_for(&self, integration: &Integration) -> Result<ProviderCredentials> {
        let auth = AuthData::parse(&integration.auth_data)?;
        let refresh_token = auth
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                SyncError::AuthenticationRequired("integration has no refresh_token".to_string())
            })?;
        Ok(ProviderCredentials {
            access_token: auth.access_token.unwrap_or_default(),
            refresh_token,
            provider_tenant_id: auth.provider_tenant_id.unwrap_or_default(),
        })
    }

    fn record_failure(&self, integration: &mut Integration, message: &str) -> RefreshResult {
        let failures = integration.record_refresh_failure(message);
        let needs_reauth = self.is_reauth_required(message, integration);
        if needs_reauth {
            warn!(failures, error = message, "marking integration for re-authentication");
            integration.mark_reauth_required(message);
        } else {
            warn!(failures, error = message, "token refresh failed");
        }
        RefreshResult::failed(message.to_string(), needs_reauth)
    }
}
