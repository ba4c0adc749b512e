//! Error classification and backoff computation
//!
//! Retryability itself is a pattern match on the `SyncError` tag (see
//! `SyncError::is_retryable`); this module adds the delay schedule and the
//! best-effort conversion of raw provider messages into the taxonomy.

use std::time::Duration;

use ledgersync_domain::{Provider, SyncError};
use rand::Rng;

/// Base delay for the first retry attempt.
const BASE_DELAY_MS: u64 = 1_000;
/// Upper bound on the exponential backoff component.
const MAX_DELAY_MS: u64 = 60_000;
/// Jitter fraction added on top of the computed backoff (0..=30%).
const JITTER_FRACTION: f64 = 0.3;

/// Message fragments that indicate an auth failure in unstructured provider
/// errors.
const AUTH_SIGNALS: [&str; 6] =
    ["invalid_grant", "unauthorized", "unauthorised", "401", "token expired", "authentication"];

/// Message fragments that indicate throttling.
const RATE_LIMIT_SIGNALS: [&str; 3] = ["rate limit", "too many requests", "429"];

/// Delay before the given retry attempt (1-based).
///
/// Rate-limit errors use the provider-declared delay verbatim; everything
/// else gets capped exponential backoff with up to 30% random jitter.
#[must_use]
pub fn retry_delay(error: &SyncError, attempt: u32) -> Duration {
    if let SyncError::RateLimit { retry_after_secs } = error {
        return Duration::from_secs(*retry_after_secs);
    }

    let exponent = attempt.saturating_sub(1).min(16);
    let base = (BASE_DELAY_MS.saturating_mul(1 << exponent)).min(MAX_DELAY_MS);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let jitter = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION) * base as f64;
    Duration::from_millis(base + jitter as u64)
}

/// Convert a raw provider failure message into the taxonomy.
///
/// Best-effort keyword sniffing, kept for compatibility with providers whose
/// clients only surface free text. Structured status codes from the provider
/// client take precedence over this path; it exists for errors that arrive
/// with no status at all.
#[must_use]
pub fn to_sync_error(raw: &str, provider: Provider, operation: &str) -> SyncError {
    let lowered = raw.to_lowercase();

    if AUTH_SIGNALS.iter().any(|signal| lowered.contains(signal)) {
        return SyncError::AuthenticationRequired(format!("{provider} {operation}: {raw}"));
    }
    if RATE_LIMIT_SIGNALS.iter().any(|signal| lowered.contains(signal)) {
        return SyncError::RateLimit { retry_after_secs: 60 };
    }

    SyncError::ProviderApi { status: 502, message: format!("{provider} {operation}: {raw}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_delay_is_the_declared_value_verbatim() {
        let err = SyncError::RateLimit { retry_after_secs: 5 };
        assert_eq!(retry_delay(&err, 1), Duration::from_secs(5));
        assert_eq!(retry_delay(&err, 7), Duration::from_secs(5));
    }

    #[test]
    fn backoff_doubles_and_caps_with_bounded_jitter() {
        let err = SyncError::ProviderApi { status: 503, message: "down".into() };

        for (attempt, base_ms) in [(1_u32, 1_000_u64), (2, 2_000), (3, 4_000), (6, 32_000)] {
            let delay = retry_delay(&err, attempt).as_millis() as u64;
            assert!(delay >= base_ms, "attempt {attempt}: {delay} < {base_ms}");
            assert!(
                delay <= base_ms + base_ms * 3 / 10 + 1,
                "attempt {attempt}: {delay} exceeds jitter bound"
            );
        }

        // Cap at 60s regardless of attempt number.
        let capped = retry_delay(&err, 30).as_millis() as u64;
        assert!(capped <= MAX_DELAY_MS + MAX_DELAY_MS * 3 / 10 + 1);
        assert!(capped >= MAX_DELAY_MS);
    }

    #[test]
    fn auth_keywords_classify_as_authentication_required() {
        for raw in ["invalid_grant: bad token", "HTTP 401 Unauthorized", "Token expired at noon"] {
            let err = to_sync_error(raw, Provider::Xero, "fetch_transactions");
            assert!(
                matches!(err, SyncError::AuthenticationRequired(_)),
                "{raw} misclassified as {err:?}"
            );
        }
    }

    #[test]
    fn rate_limit_keywords_classify_as_rate_limited() {
        let err = to_sync_error("Too Many Requests", Provider::Xero, "fetch_suppliers");
        assert!(matches!(err, SyncError::RateLimit { retry_after_secs: 60 }));
    }

    #[test]
    fn unknown_messages_fall_back_to_a_retryable_provider_api_error() {
        let err = to_sync_error("connection reset by peer", Provider::Xero, "fetch_invoices");
        assert!(err.is_retryable());
        match err {
            SyncError::ProviderApi { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("xero"));
                assert!(message.contains("fetch_invoices"));
            }
            other => panic!("expected provider api error, got {other:?}"),
        }
    }
}
