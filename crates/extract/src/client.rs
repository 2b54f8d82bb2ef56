use std::future::Future;
use std::time::Duration;

use ledgerscan_core::{RawTransaction, Transaction, TransactionError};
use thiserror::Error;

use crate::config::ExtractionConfig;
use crate::encode::ImagePayload;
use crate::gemini::GeminiTransport;
use crate::schema::GenerateRequest;
use crate::transport::{Transport, TransportError};

pub const EXTRACTION_FAILED_MESSAGE: &str =
    "無法從圖片擷取資料，請稍後再試。(Failed to extract data from the image. Please try again.)";
pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "未設定 API 金鑰，請檢查環境設定。(API key is missing. Please check your environment configuration.)";

/// Variable consulted when the configured one is unset.
pub const FALLBACK_API_KEY_ENV: &str = "API_KEY";

/// What callers can tell apart: configuration problems vs. everything else.
///
/// Service diagnostics are logged where they happen and never carried here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("API key is missing: set {var}")]
    MissingCredential { var: String },
    #[error("Failed to extract data from the image")]
    Failed,
}

impl ExtractionError {
    /// Localized text safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExtractionError::MissingCredential { .. } => MISSING_CREDENTIAL_MESSAGE,
            ExtractionError::Failed => EXTRACTION_FAILED_MESSAGE,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Failed)
    }
}

/// Why a service reply could not become transactions. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not a JSON array of transactions: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row {index}: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: TransactionError,
    },
}

/// Image in, ordered transactions out.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        image: &ImagePayload,
    ) -> impl Future<Output = Result<Vec<Transaction>, ExtractionError>> + Send;
}

// ── Credentials ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    /// Read at call time from `var`, then `fallback` when `var` is unset or blank.
    Env { var: String, fallback: Option<String> },
    /// Fixed value, for tests and embedding. `None` behaves like an unset variable.
    Static(Option<String>),
}

impl ApiKeySource {
    pub fn env(var: impl Into<String>) -> Self {
        ApiKeySource::Env {
            var: var.into(),
            fallback: Some(FALLBACK_API_KEY_ENV.to_string()),
        }
    }

    pub fn resolve(&self) -> Result<String, ExtractionError> {
        match self {
            ApiKeySource::Env { var, fallback } => std::iter::once(var)
                .chain(fallback.iter())
                .find_map(|name| non_blank(std::env::var(name).ok()))
                .ok_or_else(|| ExtractionError::MissingCredential { var: var.clone() }),
            ApiKeySource::Static(key) => {
                non_blank(key.clone()).ok_or_else(|| ExtractionError::MissingCredential {
                    var: "<static>".to_string(),
                })
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct ExtractionClient<T> {
    transport: T,
    credentials: ApiKeySource,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl ExtractionClient<GeminiTransport> {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, TransportError> {
        let transport = GeminiTransport::new(config)?;
        Ok(Self::new(transport, ApiKeySource::env(&config.api_key_env))
            .with_retry(config.max_attempts, Duration::from_millis(500)))
    }
}

impl<T: Transport> ExtractionClient<T> {
    pub fn new(transport: T, credentials: ApiKeySource) -> Self {
        Self {
            transport,
            credentials,
            max_attempts: 1,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Retry transport failures up to `max_attempts` tries in total, doubling the
    /// pause between tries. Malformed replies are never retried.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send_with_retry(
        &self,
        request: &GenerateRequest,
        api_key: &str,
        image: &ImagePayload,
    ) -> Result<Option<String>, ExtractionError> {
        let mut attempt = 1;
        loop {
            match self.transport.send(request, api_key).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_attempts => {
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    tracing::warn!(
                        image = %image.digest(),
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %e,
                        "recognition request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        image = %image.digest(),
                        attempt,
                        error = %e,
                        "recognition request failed"
                    );
                    return Err(ExtractionError::Failed);
                }
            }
        }
    }
}

impl<T: Transport> Extractor for ExtractionClient<T> {
    async fn extract(&self, image: &ImagePayload) -> Result<Vec<Transaction>, ExtractionError> {
        let api_key = self.credentials.resolve().inspect_err(|e| {
            tracing::error!(error = %e, "extraction refused: no credential configured");
        })?;

        tracing::info!(
            image = %image.digest(),
            bytes = image.byte_len(),
            media_type = image.media_type(),
            "requesting extraction"
        );

        let request = GenerateRequest::for_image(image);
        let text = self.send_with_retry(&request, &api_key, image).await?;

        let transactions = parse_transactions(text.as_deref()).map_err(|e| {
            tracing::error!(image = %image.digest(), error = %e, "unusable recognition response");
            ExtractionError::Failed
        })?;

        tracing::info!(
            image = %image.digest(),
            count = transactions.len(),
            "extraction finished"
        );
        Ok(transactions)
    }
}

/// Turn the structured-output text into validated transactions, keeping reply order.
///
/// Missing or blank text (and a JSON `null`) mean nothing was recognized. A single
/// invalid row rejects the whole reply.
/// Longest pause between two recognition attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// `base` doubled per failed attempt, capped at [`MAX_RETRY_DELAY`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

pub fn parse_transactions(text: Option<&str>) -> Result<Vec<Transaction>, ResponseError> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(Vec::new());
    };

    let raw: Option<Vec<RawTransaction>> = serde_json::from_str(text)?;
    raw.unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            Transaction::validate(row).map_err(|source| ResponseError::Invalid { index, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockTransport};
    use ledgerscan_core::TransactionType;

    const TWO_ROWS: &str = r#"[
        {"date": "15/12/2025", "description": "Coffee; Shop\nBranch A", "amount": 4.5, "type": "EXPENSE"},
        {"date": "16/12/2025", "description": "Refund", "amount": 10, "type": "INCOME"}
    ]"#;

    fn key() -> ApiKeySource {
        ApiKeySource::Static(Some("test-key".to_string()))
    }

    fn image() -> ImagePayload {
        ImagePayload::from_bytes(b"fake image", "image/jpeg")
    }

    #[tokio::test]
    async fn extracts_rows_in_reply_order() {
        let client = ExtractionClient::new(MockTransport::new(TWO_ROWS), key());
        let txs = client.extract(&image()).await.unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "Coffee; Shop\nBranch A");
        assert_eq!(txs[0].kind, TransactionType::Expense);
        assert_eq!(txs[1].amount.to_string(), "10");
        assert_eq!(txs[1].kind, TransactionType::Income);
    }

    #[tokio::test]
    async fn request_carries_image_and_schema() {
        let client = ExtractionClient::new(MockTransport::new("[]"), key());
        client.extract(&image()).await.unwrap();

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        let inline = requests[0].image().unwrap();
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(inline.data, image().data());
        assert_eq!(
            requests[0].generation_config.response_schema,
            crate::schema::response_schema()
        );
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_call() {
        let client = ExtractionClient::new(MockTransport::new(TWO_ROWS), ApiKeySource::Static(None));
        let err = client.extract(&image()).await.unwrap_err();

        assert!(matches!(err, ExtractionError::MissingCredential { .. }));
        assert!(!err.is_retryable());
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn blank_credential_counts_as_missing() {
        let client = ExtractionClient::new(
            MockTransport::new(TWO_ROWS),
            ApiKeySource::Static(Some("   ".to_string())),
        );
        assert!(matches!(
            client.extract(&image()).await,
            Err(ExtractionError::MissingCredential { .. })
        ));
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn unset_env_variable_is_missing_credential() {
        let source = ApiKeySource::Env {
            var: "LEDGERSCAN_TEST_SURELY_UNSET_KEY".to_string(),
            fallback: None,
        };
        assert_eq!(
            source.resolve(),
            Err(ExtractionError::MissingCredential {
                var: "LEDGERSCAN_TEST_SURELY_UNSET_KEY".to_string()
            })
        );
    }

    #[tokio::test]
    async fn empty_array_is_empty_result() {
        let client = ExtractionClient::new(MockTransport::new("[]"), key());
        assert_eq!(client.extract(&image()).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn absent_text_is_empty_result() {
        let client = ExtractionClient::new(MockTransport::silent(), key());
        assert_eq!(client.extract(&image()).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn service_error_is_generic_failure() {
        let client = ExtractionClient::new(
            MockTransport::failing(500, "internal: quota shard 7 exploded"),
            key(),
        );
        let err = client.extract(&image()).await.unwrap_err();

        assert_eq!(err, ExtractionError::Failed);
        assert!(err.is_retryable());
        assert!(!err.user_message().contains("quota"));
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_is_generic_failure() {
        let client = ExtractionClient::new(MockTransport::new("{not json"), key());
        assert_eq!(client.extract(&image()).await, Err(ExtractionError::Failed));
    }

    #[tokio::test]
    async fn one_invalid_row_rejects_whole_reply() {
        let reply = r#"[
            {"date": "15/12/2025", "description": "ok", "amount": 1, "type": "EXPENSE"},
            {"date": "15/12/2025", "description": "bad", "amount": -1, "type": "EXPENSE"}
        ]"#;
        let client = ExtractionClient::new(MockTransport::new(reply), key());
        assert_eq!(client.extract(&image()).await, Err(ExtractionError::Failed));
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let client = ExtractionClient::new(
            MockTransport::sequence(vec![
                MockReply::Status { status: 503, body: "busy".into() },
                MockReply::Text(Some("[]".into())),
            ]),
            key(),
        );
        assert!(client.extract(&image()).await.is_err());
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_transport_failure() {
        let client = ExtractionClient::new(
            MockTransport::sequence(vec![
                MockReply::Status { status: 503, body: "busy".into() },
                MockReply::Text(Some(TWO_ROWS.into())),
            ]),
            key(),
        )
        .with_retry(3, Duration::ZERO);

        assert_eq!(client.extract(&image()).await.unwrap().len(), 2);
        assert_eq!(client.transport().calls(), 2);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_retried() {
        let client = ExtractionClient::new(MockTransport::new("nope"), key())
            .with_retry(3, Duration::ZERO);
        assert!(client.extract(&image()).await.is_err());
        assert_eq!(client.transport().calls(), 1);
    }

    #[test]
    fn parse_null_is_empty() {
        assert!(parse_transactions(Some("null")).unwrap().is_empty());
        assert!(parse_transactions(Some("  ")).unwrap().is_empty());
        assert!(parse_transactions(None).unwrap().is_empty());
    }

    #[test]
    fn parse_reports_offending_row() {
        let err = parse_transactions(Some(
            r#"[{"date": "2025-12-15", "description": "x", "amount": 1, "type": "EXPENSE"}]"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ResponseError::Invalid { index: 0, .. }));
    }

    #[test]
    fn user_messages_are_distinct() {
        assert_ne!(
            ExtractionError::Failed.user_message(),
            ExtractionError::MissingCredential { var: "X".into() }.user_message()
        );
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 29), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(Duration::MAX, 40), MAX_RETRY_DELAY);
        assert_eq!(backoff_delay(Duration::ZERO, 40), Duration::ZERO);
    }
}
