//! Remote rule management for the filtered stream.

use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::{
    config::{RateLimitInfo, RetryConfig, StreamConfig},
    error::{StreamFilterError, StreamResult},
    types::{
        AddStreamRulesRequest, DeleteRulesSpec, DeleteStreamRulesRequest, StreamRule,
        StreamRulesResponse,
    },
};

const RULES_PATH: &str = "/2/tweets/search/stream/rules";

/// Client for the server-side stream rules endpoint.
#[derive(Debug)]
pub struct RulesClient {
    client: Client,
    base_url: String,
    bearer_token: String,
    retry: RetryConfig,
}

impl RulesClient {
    /// Create a new rules client from configuration.
    pub fn new(config: &StreamConfig) -> StreamResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("stream-filter/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            retry: config.retry.clone(),
        })
    }

    /// List the rules currently stored on the server.
    pub async fn list(&self) -> StreamResult<StreamRulesResponse> {
        self.request(Method::GET, None::<&()>).await
    }

    /// Add rules to the server-side rule store.
    pub async fn add(&self, rules: &[StreamRule]) -> StreamResult<StreamRulesResponse> {
        let body = AddStreamRulesRequest {
            add: rules.to_vec(),
        };
        self.request(Method::POST, Some(&body)).await
    }

    /// Delete rules by ID.
    pub async fn delete(&self, ids: &[String]) -> StreamResult<StreamRulesResponse> {
        let body = DeleteStreamRulesRequest {
            delete: DeleteRulesSpec { ids: ids.to_vec() },
        };
        self.request(Method::POST, Some(&body)).await
    }

    /// Replace the server-side rule set: delete everything present, then add
    /// the given rules. Returns the created rules with their assigned IDs.
    pub async fn sync(&self, rules: &[StreamRule]) -> StreamResult<Vec<StreamRule>> {
        let existing = self.list().await?;
        let stale_ids: Vec<String> = existing
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|rule| rule.id)
            .collect();

        if !stale_ids.is_empty() {
            let response = self.delete(&stale_ids).await?;
            let deleted = response
                .meta
                .and_then(|m| m.summary)
                .and_then(|s| s.deleted)
                .unwrap_or(0);
            info!(deleted, "deleted existing stream rules");
        }

        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.add(rules).await?;

        if let Some(errors) = &response.errors {
            if !errors.is_empty() {
                let details: Vec<String> = errors.iter().map(|e| e.describe()).collect();
                return Err(StreamFilterError::Rules(details.join("; ")));
            }
        }

        let created = response
            .meta
            .as_ref()
            .and_then(|m| m.summary.as_ref())
            .and_then(|s| s.created)
            .unwrap_or(0);
        info!(created, "created stream rules");

        Ok(response.data.unwrap_or_default())
    }

    async fn request<T, B>(&self, method: Method, body: Option<&B>) -> StreamResult<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize,
    {
        let url = format!("{}{}", self.base_url, RULES_PATH);
        let mut delay = Duration::from_millis(self.retry.initial_delay_ms);
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, method = %method, "rules API request");

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bearer {}", self.bearer_token));

            if let Some(b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(response) => match self.handle_response(response).await {
                    Ok(data) => return Ok(data),
                    Err(e) if e.is_retryable() && attempts < self.retry.max_attempts => {
                        if let Some(retry_after) = e.retry_after() {
                            delay = retry_after;
                        }
                        warn!(
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying rules API request"
                        );
                        tokio::time::sleep(delay).await;
                        delay = std::cmp::min(
                            delay * 2,
                            Duration::from_millis(self.retry.max_delay_ms),
                        );
                    }
                    Err(e) => return Err(e),
                },
                Err(e) if (e.is_timeout() || e.is_connect()) && attempts < self.retry.max_attempts => {
                    warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after connection error"
                    );
                    tokio::time::sleep(delay).await;
                    delay =
                        std::cmp::min(delay * 2, Duration::from_millis(self.retry.max_delay_ms));
                }
                Err(e) => return Err(StreamFilterError::Http(e)),
            }
        }
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> StreamResult<T> {
        let status = response.status();
        let rate_limit = RateLimitInfo::from_headers(response.headers());

        if rate_limit.is_exhausted() {
            debug!(reset = ?rate_limit.reset, "rate limit exhausted");
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = rate_limit
                .time_until_reset()
                .map(|d| d.as_secs())
                .unwrap_or(60);
            return Err(StreamFilterError::RateLimited { retry_after });
        }

        let bytes = response.bytes().await?;

        if status.is_success() {
            serde_json::from_slice(&bytes).map_err(StreamFilterError::from)
        } else {
            #[derive(serde::Deserialize)]
            struct ErrorBody {
                #[serde(default)]
                title: Option<String>,
                #[serde(default)]
                detail: Option<String>,
            }

            let parsed: ErrorBody = serde_json::from_slice(&bytes).unwrap_or(ErrorBody {
                title: None,
                detail: Some(String::from_utf8_lossy(&bytes).into_owned()),
            });

            let message = parsed
                .detail
                .or(parsed.title)
                .unwrap_or_else(|| "unknown error".into());

            Err(StreamFilterError::Api {
                status: status.as_u16(),
                message,
                retry_after: rate_limit.time_until_reset().map(|d| d.as_secs()),
            })
        }
    }
}
