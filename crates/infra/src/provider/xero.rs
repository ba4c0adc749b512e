//! Xero API adapter
//!
//! Implements the `ProviderClient` and `TokenRefresher` ports against the
//! Xero accounting API. Credentials are drawn exclusively from the current
//! execution context; the client itself holds none. Base and token URLs are
//! configurable so tests can point them at a local mock server.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgersync_core::{require_current, ProviderClient, ProviderCredentials, TokenRefresher};
use ledgersync_domain::{PageQuery, Provider, Result, SyncError, TokenSet};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

const XERO_API_BASE: &str = "https://api.xero.com/api.xro/2.0";
const XERO_TOKEN_URL: &str = "https://identity.xero.com/connect/token";

/// Fallback delay when a 429 arrives without a usable Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Connection details for the Xero API.
#[derive(Debug, Clone)]
pub struct XeroConfig {
    pub api_base: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub http_timeout: Duration,
}

impl XeroConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: String, http_timeout: Duration) -> Self {
        Self {
            api_base: XERO_API_BASE.to_string(),
            token_url: XERO_TOKEN_URL.to_string(),
            client_id,
            client_secret,
            http_timeout,
        }
    }

    /// Point both endpoints at a different host (used by tests).
    #[must_use]
    pub fn with_base_urls(mut self, api_base: String, token_url: String) -> Self {
        self.api_base = api_base;
        self.token_url = token_url;
        self
    }
}

/// Xero accounting API client.
pub struct XeroClient {
    http: reqwest::Client,
    config: XeroConfig,
}

impl XeroClient {
    pub fn new(config: XeroConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Paginated GET of one endpoint, returning the raw record array named
    /// by `collection`.
    #[instrument(skip(self, query), fields(page = query.page))]
    async fn fetch_page(
        &self,
        endpoint: &str,
        collection: &str,
        query: &PageQuery,
    ) -> Result<Vec<Value>> {
        let context = require_current()?;
        let credentials = context.credentials()?;

        let url = format!("{}/{endpoint}", self.config.api_base);
        let mut request = self
            .http
            .get(&url)
            .bearer_auth(&credentials.access_token)
            .header("Xero-Tenant-Id", &credentials.provider_tenant_id)
            .header("Accept", "application/json")
            .query(&[("page", query.page.to_string()), ("pageSize", query.page_size.to_string())]);
        if let Some(since) = query.modified_since {
            request = request.query(&[("where", modified_since_filter(since))]);
        }

        let response = request.send().await.map_err(transport_error)?;
        let body = read_success_body(response, endpoint).await?;

        let records = body
            .get(collection)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(endpoint, count = records.len(), "fetched provider page");
        Ok(records)
    }
}

#[async_trait]
impl ProviderClient for XeroClient {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    async fn fetch_transactions(&self, query: &PageQuery) -> Result<Vec<Value>> {
        let records = self.fetch_page("BankTransactions", "BankTransactions", query).await?;
        Ok(records.iter().map(normalize_transaction).collect())
    }

    async fn fetch_suppliers(&self, query: &PageQuery) -> Result<Vec<Value>> {
        let records = self.fetch_page("Contacts", "Contacts", query).await?;
        Ok(records.iter().map(normalize_contact).collect())
    }

    async fn fetch_invoices(&self, query: &PageQuery) -> Result<Vec<Value>> {
        let records = self.fetch_page("Invoices", "Invoices", query).await?;
        Ok(records.iter().map(normalize_invoice).collect())
    }

    async fn fetch_journals(&self, query: &PageQuery) -> Result<Vec<Value>> {
        let records = self.fetch_page("ManualJournals", "ManualJournals", query).await?;
        Ok(records.iter().map(normalize_journal).collect())
    }
}

/// Translate one Xero bank transaction into the engine's record shape.
fn normalize_transaction(record: &Value) -> Value {
    serde_json::json!({
        "transaction_id": record.get("BankTransactionID"),
        "date": date_field(record),
        "amount": record.get("Total"),
        "reference": record.get("Reference"),
        "account_id": record.pointer("/BankAccount/AccountID"),
        "account_code": record.pointer("/BankAccount/Code"),
        "contact_id": record.pointer("/Contact/ContactID"),
        "contact_name": record.pointer("/Contact/Name"),
    })
}

fn normalize_contact(record: &Value) -> Value {
    serde_json::json!({
        "contact_id": record.get("ContactID"),
        "name": record.get("Name"),
        "email": record.get("EmailAddress"),
    })
}

fn normalize_invoice(record: &Value) -> Value {
    serde_json::json!({
        "invoice_id": record.get("InvoiceID"),
        "invoice_number": record.get("InvoiceNumber"),
        "contact_id": record.pointer("/Contact/ContactID"),
        "contact_name": record.pointer("/Contact/Name"),
        "total": record.get("Total"),
        "date": date_field(record),
        "status": record.get("Status"),
    })
}

fn normalize_journal(record: &Value) -> Value {
    // Xero journal lines carry a signed LineAmount; positive is a debit.
    let lines: Vec<Value> = record
        .get("JournalLines")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .map(|line| {
                    let amount = line.get("LineAmount").and_then(Value::as_f64).unwrap_or(0.0);
                    serde_json::json!({
                        "account_code": line.get("AccountCode"),
                        "debit": amount.max(0.0),
                        "credit": (-amount).max(0.0),
                        "description": line.get("Description"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    serde_json::json!({
        "journal_id": record.get("ManualJournalID"),
        "narration": record.get("Narration"),
        "date": date_field(record),
        "journal_lines": lines,
    })
}

/// Prefer the ISO `DateString` Xero sends alongside its legacy `/Date(ms)/`
/// format.
fn date_field(record: &Value) -> Value {
    record.get("DateString").or_else(|| record.get("Date")).cloned().unwrap_or(Value::Null)
}

/// Exchanges Xero refresh tokens for new token sets.
pub struct XeroTokenRefresher {
    http: reqwest::Client,
    config: XeroConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

impl XeroTokenRefresher {
    pub fn new(config: XeroConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl TokenRefresher for XeroTokenRefresher {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    #[instrument(skip_all)]
    async fn refresh(&self, credentials: &ProviderCredentials) -> Result<TokenSet> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credentials.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::TokenRefreshFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::TokenRefreshFailed(format!("malformed token response: {e}")))?;
        Ok(TokenSet::new(tokens.access_token, tokens.refresh_token, tokens.expires_in))
    }
}

/// Xero `where` clause filtering on the record modification timestamp.
fn modified_since_filter(since: DateTime<Utc>) -> String {
    format!("UpdatedDateUTC >= DateTime({})", since.format("%Y,%m,%d"))
}

/// Map transport failures onto retryable gateway-style statuses.
fn transport_error(error: reqwest::Error) -> SyncError {
    let status = if error.is_timeout() { 503 } else { 502 };
    SyncError::ProviderApi { status, message: format!("transport error: {error}") }
}

/// Check the response status and parse the JSON body, normalizing failures
/// into the taxonomy.
async fn read_success_body(response: reqwest::Response, endpoint: &str) -> Result<Value> {
    let status = response.status();

    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(SyncError::RateLimit { retry_after_secs });
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::AuthenticationRequired(format!(
            "{endpoint} returned {status}: {body}"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::ProviderApi {
            status: status.as_u16(),
            message: format!("{endpoint} returned {status}: {body}"),
        });
    }

    response
        .json()
        .await
        .map_err(|e| SyncError::ProviderApi {
            status: 502,
            message: format!("{endpoint} returned malformed JSON: {e}"),
        })
}
