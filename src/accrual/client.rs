// Accrual service client
//
// One GET per order number, no retries. Retry and backoff policy belongs to
// the reconciler; this layer only turns HTTP responses into
// AccrualClassification values.

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client};
use std::time::Duration;
use tracing::debug;

use super::models::{AccrualClassification, AccrualResponse};
use crate::error::{AccrualError, AppError, AppResult};

/// Wait applied when a 429 carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Anything that can answer "what did this order earn?"
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn query(&self, order_number: &str) -> AccrualClassification;
}

/// HTTP client for the external accrual service
pub struct AccrualClient {
    client: Client,
    base_url: String,
    default_retry_after: Duration,
}

impl AccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build accrual client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_retry_after: DEFAULT_RETRY_AFTER,
        })
    }

    pub fn with_default_retry_after(mut self, wait: Duration) -> Self {
        self.default_retry_after = wait;
        self
    }

    fn order_url(&self, order_number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, order_number)
    }
}

#[async_trait]
impl AccrualSource for AccrualClient {
    async fn query(&self, order_number: &str) -> AccrualClassification {
        let url = self.order_url(order_number);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return AccrualClassification::Unavailable(AccrualError::Transport(e)),
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        // Only a 200 carries a body worth reading
        let classification = match classify_status(
            status,
            retry_after.as_deref(),
            self.default_retry_after,
        ) {
            Some(classification) => classification,
            None => match response.bytes().await {
                Ok(body) => classify_body(order_number, &body),
                Err(e) => AccrualClassification::Unavailable(AccrualError::Transport(e)),
            },
        };
        debug!(
            order = order_number,
            status,
            outcome = classification.label(),
            "Accrual query finished"
        );
        classification
    }
}

/// Classify a response from its status line and headers alone.
///
/// Returns `None` for 200, whose body still has to be read.
pub fn classify_status(
    status: u16,
    retry_after: Option<&str>,
    default_retry_after: Duration,
) -> Option<AccrualClassification> {
    match status {
        200 => None,
        204 => Some(AccrualClassification::NotYetRegistered),
        429 => Some(AccrualClassification::RateLimited {
            wait: parse_retry_after(retry_after).unwrap_or(default_retry_after),
        }),
        other => Some(AccrualClassification::Unavailable(
            AccrualError::UnexpectedStatus(other),
        )),
    }
}

/// Classify the body of a 200 answer for `order_number`
pub fn classify_body(order_number: &str, body: &[u8]) -> AccrualClassification {
    match serde_json::from_slice::<AccrualResponse>(body) {
        Ok(parsed) => match parsed.into_result(order_number) {
            Ok(result) => AccrualClassification::Accepted(result),
            Err(e) => AccrualClassification::Unavailable(e),
        },
        Err(e) => AccrualClassification::Unavailable(AccrualError::MalformedBody(e)),
    }
}

/// `Retry-After` in delta-seconds form
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}
