//! Error taxonomy for sync operations
//!
//! A single closed enum replaces the upstream class hierarchy: every error a
//! pipeline, service, or provider adapter can produce is one of these kinds,
//! and retry policy, HTTP mapping, and operational classification are pattern
//! matches over the tag rather than instance checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP statuses for which a provider API error is worth retrying.
pub const RETRYABLE_PROVIDER_STATUSES: [u16; 6] = [500, 502, 503, 504, 408, 429];

/// Canonical sync error kinds.
///
/// Extend by adding variants; existing semantics never change.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum SyncError {
    /// Credentials are invalid or expired beyond repair; tenant must
    /// re-authenticate interactively.
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    /// A single token refresh attempt failed. Retryable; escalates to
    /// `AuthenticationRequired` after ten consecutive failures.
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Provider throttling. Carries the provider-declared delay.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    /// Upstream 4xx/5xx that is not an auth or rate-limit condition.
    #[error("provider API error ({status}): {message}")]
    ProviderApi { status: u16, message: String },

    /// Malformed input or record. Record-level; never retried, never aborts
    /// the surrounding batch.
    #[error("validation error: {0}")]
    Validation(String),

    /// Reconciliation could not resolve a cross-entity reference.
    #[error("entity linking failed: {0}")]
    EntityLinking(String),

    /// More than one candidate matched during duplicate detection.
    #[error("ambiguous match: {0}")]
    AmbiguousMatch(String),

    /// Sync job level failure with an explicit retryability flag.
    #[error("sync job error: {message}")]
    Job { retryable: bool, message: String },

    /// Requested aggregate or entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid or missing configuration, including unsupported providers.
    #[error("configuration error: {0}")]
    Config(String),

    /// Repository/persistence failure surfaced through a port.
    #[error("repository error: {0}")]
    Repository(String),

    /// Unclassified failure; logged as a possible bug, surfaced generically.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// HTTP status analogue for this error kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthenticationRequired(_) | Self::TokenRefreshFailed(_) => 401,
            Self::RateLimit { .. } => 429,
            Self::ProviderApi { status, .. } => *status,
            Self::Validation(_) | Self::EntityLinking(_) => 422,
            Self::AmbiguousMatch(_) => 409,
            Self::NotFound(_) => 404,
            Self::Job { .. } | Self::Config(_) | Self::Repository(_) | Self::Internal(_) => 500,
        }
    }

    /// Operational errors are expected failure modes with stable codes and
    /// user-safe messages. Non-operational errors indicate a probable bug and
    /// are surfaced as a generic failure.
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Whether the default retry policy should re-attempt this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::TokenRefreshFailed(_) => true,
            Self::ProviderApi { status, .. } => RETRYABLE_PROVIDER_STATUSES.contains(status),
            Self::Job { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Stable machine-readable code for clients and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired(_) => "authentication_required",
            Self::TokenRefreshFailed(_) => "token_refresh_failed",
            Self::RateLimit { .. } => "rate_limit_exceeded",
            Self::ProviderApi { .. } => "provider_api_error",
            Self::Validation(_) => "data_validation_error",
            Self::EntityLinking(_) => "entity_linking_error",
            Self::AmbiguousMatch(_) => "duplicate_detection_ambiguous",
            Self::Job { .. } => "sync_job_error",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "configuration_error",
            Self::Repository(_) => "repository_error",
            Self::Internal(_) => "generic_sync_error",
        }
    }

    /// Message safe to show to an end user. Non-operational details are
    /// replaced with a generic failure line.
    pub fn user_message(&self) -> String {
        if self.is_operational() {
            self.to_string()
        } else {
            "An unexpected error occurred during synchronization.".to_string()
        }
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
