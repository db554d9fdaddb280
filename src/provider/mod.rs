//! Outbound adapter for the Meta WhatsApp Cloud API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use wa_relay_core::{MessagingProvider, ProviderReceipt, RelayError, RelayResult};

use crate::config::WhatsAppConfig;
use crate::utils::http::{MAX_RESPONSE_BYTES, http_client, limited_body};

/// Retry behaviour for outbound sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. 1 means no retry.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay_ms: config.retry_base_delay_ms,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay)
    }
}

pub struct MetaWhatsAppClient {
    client: Client,
    endpoint: String,
    access_token: String,
    retry: RetryPolicy,
}

impl MetaWhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Self {
        let endpoint = format!(
            "{}/{}/{}/messages",
            config.api_base_url.trim_end_matches('/'),
            config.api_version.trim_matches('/'),
            config.phone_number_id
        );
        Self {
            client: http_client(Duration::from_secs(config.timeout_secs)),
            endpoint,
            access_token: config.access_token.clone(),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, body: &Value) -> RelayResult<ProviderReceipt> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::Provider {
                message: format!("whatsapp request failed: {e}"),
                code: None,
                retryable: true,
            })?;

        let status = resp.status();
        let (bytes, _) = limited_body(resp, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| RelayError::Provider {
                message: format!("whatsapp response unreadable: {e}"),
                code: None,
                retryable: status.is_server_error(),
            })?;

        if !status.is_success() {
            return Err(parse_api_error(status, &bytes));
        }

        let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        let id = json
            .pointer("/messages/0/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::Provider {
                message: "whatsapp response has no message id".into(),
                code: None,
                retryable: false,
            })?;

        Ok(ProviderReceipt {
            provider_message_id: id.to_string(),
        })
    }
}

/// Map a non-2xx Graph API response to a provider error. 429 and 5xx are
/// retryable.
pub fn parse_api_error(status: StatusCode, body: &[u8]) -> RelayError {
    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

    if let Ok(json) = serde_json::from_slice::<Value>(body)
        && let Some(err) = json.get("error")
    {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let error_type = err.get("type").and_then(Value::as_str).unwrap_or("error");
        return RelayError::Provider {
            message: format!("whatsapp api error ({}, {}): {}", status.as_u16(), error_type, message),
            code: err.get("code").and_then(Value::as_i64),
            retryable,
        };
    }

    RelayError::Provider {
        message: format!(
            "whatsapp api error ({}): {}",
            status.as_u16(),
            String::from_utf8_lossy(body)
        ),
        code: None,
        retryable,
    }
}

#[async_trait]
impl MessagingProvider for MetaWhatsAppClient {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send_text(&self, recipient: &str, content: &str) -> RelayResult<ProviderReceipt> {
        let body = json!({
            "messaging_product": "whatsapp",
            "to": recipient,
            "type": "text",
            "text": {"body": content},
        });

        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(receipt) => {
                    debug!(
                        "whatsapp accepted message to {}: {}",
                        recipient, receipt.provider_message_id
                    );
                    return Ok(receipt);
                }
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "whatsapp send attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests;
