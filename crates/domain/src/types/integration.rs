//! Integration aggregate
//!
//! A tenant's configured connection to one accounting provider, including the
//! opaque credential blob and health/sync bookkeeping. All state transitions
//! go through the methods below; fields are never assigned directly by other
//! layers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::{Result, SyncError};
use crate::types::provider::Provider;

/// Metadata key tracking consecutive token refresh failures.
pub const REFRESH_FAILURES_KEY: &str = "consecutive_refresh_failures";

/// Lifecycle status of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Active,
    Disabled,
    Error,
    SetupPending,
}

/// Rolling health assessment derived from sync outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncHealth {
    Healthy,
    Warning,
    Error,
    Unknown,
}

/// OAuth tokens returned by a provider refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Absolute expiration timestamp, calculated at creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Create a token set with `expires_at` derived from `expires_in`.
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        let expires_at =
            (expires_in > 0).then(|| Utc::now() + Duration::seconds(expires_in));
        Self { access_token, refresh_token, expires_in, expires_at }
    }
}

/// Typed view over the integration's opaque credential blob.
///
/// The blob is provider-shaped JSON; unknown keys are preserved untouched so
/// a round trip through `merge_tokens` never drops provider-specific fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthData {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Provider-side tenant/realm identifier (e.g. the Xero tenant id).
    #[serde(default)]
    pub provider_tenant_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AuthData {
    /// Parse the opaque blob into the typed view.
    pub fn parse(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| SyncError::Validation(format!("malformed auth data: {e}")))
    }

    /// Effective expiry: the explicit timestamp when present, otherwise
    /// `issued_at + expires_in`.
    pub fn effective_expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at.or_else(|| {
            match (self.issued_at, self.expires_in) {
                (Some(issued), Some(secs)) => Some(issued + Duration::seconds(secs)),
                _ => None,
            }
        })
    }
}

/// A tenant's connection to one accounting provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: Provider,
    /// Opaque credential blob; interpreted only through [`AuthData`].
    pub auth_data: Value,
    pub status: IntegrationStatus,
    pub sync_health: SyncHealth,
    pub sync_count: u64,
    pub error_count: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub next_scheduled_sync: Option<DateTime<Utc>>,
    /// Free-form metadata, including the consecutive refresh failure counter.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    /// Create a new integration in setup-pending state.
    #[must_use]
    pub fn new(tenant_id: Uuid, provider: Provider, auth_data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            provider,
            auth_data,
            status: IntegrationStatus::SetupPending,
            sync_health: SyncHealth::Unknown,
            sync_count: 0,
            error_count: 0,
            last_sync_at: None,
            last_error_at: None,
            last_error_message: None,
            next_scheduled_sync: None,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the integration active (after credentials are confirmed working).
    pub fn activate(&mut self) {
        self.status = IntegrationStatus::Active;
        self.touch();
    }

    /// Disable the integration; scheduled syncs stop picking it up.
    pub fn disable(&mut self) {
        self.status = IntegrationStatus::Disabled;
        self.touch();
    }

    /// Record a successful sync run and recompute health.
    pub fn record_successful_sync(&mut self) {
        self.sync_count += 1;
        self.last_sync_at = Some(Utc::now());
        if self.status == IntegrationStatus::SetupPending {
            self.status = IntegrationStatus::Active;
        }
        self.recompute_health();
        self.touch();
    }

    /// Record a failed sync run and recompute health.
    pub fn record_sync_error(&mut self, message: &str) {
        self.error_count += 1;
        self.last_error_at = Some(Utc::now());
        self.last_error_message = Some(message.to_string());
        self.recompute_health();
        self.touch();
    }

    /// Merge freshly refreshed tokens into the credential blob and clear the
    /// refresh failure state. Unknown blob keys are preserved.
    pub fn update_auth_data(&mut self, tokens: &TokenSet) -> Result<()> {
        let mut auth = AuthData::parse(&self.auth_data)?;
        auth.access_token = Some(tokens.access_token.clone());
        if let Some(refresh) = &tokens.refresh_token {
            auth.refresh_token = Some(refresh.clone());
        }
        auth.expires_in = Some(tokens.expires_in);
        auth.expires_at = tokens.expires_at;
        auth.issued_at = Some(Utc::now());
        self.auth_data = serde_json::to_value(auth)
            .map_err(|e| SyncError::Internal(format!("failed to serialize auth data: {e}")))?;
        self.clear_refresh_failures();
        self.last_error_message = None;
        if self.status == IntegrationStatus::Error {
            self.status = IntegrationStatus::Active;
        }
        self.touch();
        Ok(())
    }

    /// Current consecutive refresh failure counter.
    pub fn consecutive_refresh_failures(&self) -> u32 {
        self.metadata
            .get(REFRESH_FAILURES_KEY)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    }

    /// Record one refresh failure; returns the new counter value.
    pub fn record_refresh_failure(&mut self, message: &str) -> u32 {
        let failures = self.consecutive_refresh_failures() + 1;
        self.set_metadata_counter(failures);
        self.last_error_at = Some(Utc::now());
        self.last_error_message = Some(message.to_string());
        self.touch();
        failures
    }

    /// Reset the refresh failure counter.
    pub fn clear_refresh_failures(&mut self) {
        self.set_metadata_counter(0);
    }

    /// Flag the integration as needing interactive re-authentication.
    pub fn mark_reauth_required(&mut self, message: &str) {
        self.status = IntegrationStatus::Error;
        self.sync_health = SyncHealth::Error;
        self.last_error_at = Some(Utc::now());
        self.last_error_message = Some(message.to_string());
        self.touch();
    }

    fn set_metadata_counter(&mut self, value: u32) {
        if !self.metadata.is_object() {
            self.metadata = json!({});
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(REFRESH_FAILURES_KEY.to_string(), json!(value));
        }
    }

    fn recompute_health(&mut self) {
        let total = self.sync_count + self.error_count;
        self.sync_health = if total == 0 {
            SyncHealth::Unknown
        } else {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = self.sync_count as f64 / total as f64;
            if success_rate >= 0.9 {
                SyncHealth::Healthy
            } else if success_rate >= 0.5 {
                SyncHealth::Warning
            } else {
                SyncHealth::Error
            }
        };
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration_with(auth: Value) -> Integration {
        Integration::new(Uuid::new_v4(), Provider::Xero, auth)
    }

    #[test]
    fn new_integration_starts_pending_with_unknown_health() {
        let integration = integration_with(json!({}));
        assert_eq!(integration.status, IntegrationStatus::SetupPending);
        assert_eq!(integration.sync_health, SyncHealth::Unknown);
        assert_eq!(integration.consecutive_refresh_failures(), 0);
    }

    #[test]
    fn successful_sync_activates_and_marks_healthy() {
        let mut integration = integration_with(json!({}));
        integration.record_successful_sync();
        assert_eq!(integration.status, IntegrationStatus::Active);
        assert_eq!(integration.sync_health, SyncHealth::Healthy);
        assert_eq!(integration.sync_count, 1);
        assert!(integration.last_sync_at.is_some());
    }

    #[test]
    fn health_degrades_with_error_ratio() {
        let mut integration = integration_with(json!({}));
        integration.record_successful_sync();
        integration.record_sync_error("boom");
        // 1 success / 2 total = 0.5 -> warning
        assert_eq!(integration.sync_health, SyncHealth::Warning);
        integration.record_sync_error("boom");
        integration.record_sync_error("boom");
        // 1 / 4 = 0.25 -> error
        assert_eq!(integration.sync_health, SyncHealth::Error);
    }

    #[test]
    fn refresh_failure_counter_round_trips_through_metadata() {
        let mut integration = integration_with(json!({}));
        assert_eq!(integration.record_refresh_failure("invalid_grant"), 1);
        assert_eq!(integration.record_refresh_failure("invalid_grant"), 2);
        assert_eq!(integration.consecutive_refresh_failures(), 2);
        assert_eq!(
            integration.metadata.get(REFRESH_FAILURES_KEY).and_then(Value::as_u64),
            Some(2)
        );
        integration.clear_refresh_failures();
        assert_eq!(integration.consecutive_refresh_failures(), 0);
    }

    #[test]
    fn update_auth_data_merges_tokens_and_preserves_extra_keys() {
        let mut integration = integration_with(json!({
            "access_token": "old",
            "refresh_token": "rt-old",
            "scope": "accounting.transactions",
        }));
        integration.record_refresh_failure("transient");
        integration.status = IntegrationStatus::Error;

        let tokens = TokenSet::new("new-access".into(), Some("rt-new".into()), 1800);
        integration.update_auth_data(&tokens).unwrap();

        let auth = AuthData::parse(&integration.auth_data).unwrap();
        assert_eq!(auth.access_token.as_deref(), Some("new-access"));
        assert_eq!(auth.refresh_token.as_deref(), Some("rt-new"));
        assert_eq!(auth.expires_in, Some(1800));
        assert!(auth.issued_at.is_some());
        assert_eq!(
            auth.extra.get("scope").and_then(Value::as_str),
            Some("accounting.transactions")
        );
        assert_eq!(integration.consecutive_refresh_failures(), 0);
        assert_eq!(integration.status, IntegrationStatus::Active);
    }

    #[test]
    fn update_auth_data_keeps_previous_refresh_token_when_none_issued() {
        let mut integration = integration_with(json!({ "refresh_token": "rt-keep" }));
        let tokens = TokenSet::new("access".into(), None, 3600);
        integration.update_auth_data(&tokens).unwrap();

        let auth = AuthData::parse(&integration.auth_data).unwrap();
        assert_eq!(auth.refresh_token.as_deref(), Some("rt-keep"));
    }

    #[test]
    fn mark_reauth_required_transitions_to_error() {
        let mut integration = integration_with(json!({}));
        integration.mark_reauth_required("refresh token revoked");
        assert_eq!(integration.status, IntegrationStatus::Error);
        assert_eq!(integration.sync_health, SyncHealth::Error);
        assert_eq!(integration.last_error_message.as_deref(), Some("refresh token revoked"));
    }

    #[test]
    fn effective_expiry_falls_back_to_issued_plus_expires_in() {
        let issued = Utc::now();
        let auth = AuthData {
            issued_at: Some(issued),
            expires_in: Some(600),
            ..AuthData::default()
        };
        assert_eq!(auth.effective_expires_at(), Some(issued + Duration::seconds(600)));

        let explicit = Utc::now() + Duration::seconds(42);
        let auth = AuthData { expires_at: Some(explicit), ..AuthData::default() };
        assert_eq!(auth.effective_expires_at(), Some(explicit));
    }
}
