use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::pagination::parse_next_link;
use crate::error::{is_transient_status, MigrateError, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_MS: u64 = 1200;

/// Bounded exponential backoff for transient upstream failures.
///
/// Attempt `n` (zero-based) waits `backoff * 2^n`. Steady-state pacing between
/// logical operations is not part of this policy; see `crate::pacing`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF_MS)
    }
}

/// How a platform expects the credential to be presented.
#[derive(Debug, Clone)]
pub enum Auth {
    /// GitLab personal access token (`PRIVATE-TOKEN` header)
    PrivateToken(String),
    /// GitHub token (`Authorization: Bearer`, plus the v3 JSON media type)
    Bearer(String),
    #[cfg(test)]
    None,
}

/// A raw upstream response that survived the retry loop.
///
/// Non-transient error statuses are returned as data so callers can branch on
/// 404/422 without treating them as failures; `error_for_status` turns them
/// into `MigrateError::Upstream`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub next_link: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(MigrateError::Upstream {
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Resilient HTTP client shared by the source and destination platform clients.
///
/// Constructed once per platform with its credentials and passed by reference
/// into every component that talks to that platform.
pub struct ApiClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: &str, auth: Auth, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        match auth {
            Auth::PrivateToken(token) => {
                headers.insert(HeaderName::from_static("private-token"), header_value(&token)?);
            }
            Auth::Bearer(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static("application/vnd.github+json"),
                );
            }
            #[cfg(test)]
            Auth::None => {}
        }

        let client = Client::builder()
            .user_agent(concat!("glmigrate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| MigrateError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| MigrateError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    /// Resolve an API path relative to the configured base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send a request, retrying transient statuses and connection failures.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let mut retry_count = 0;
        loop {
            let mut request = self.client.request(method.clone(), url.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= self.retry.max_retries {
                        return Err(e.into());
                    }
                    let delay = self.retry.delay_for(retry_count);
                    warn!(
                        "Network error ({e}), retrying in {delay:?} ({}/{})...",
                        retry_count + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status().as_u16();
            if is_transient_status(status) {
                if retry_count >= self.retry.max_retries {
                    return Err(MigrateError::RetriesExhausted {
                        status,
                        retries: self.retry.max_retries,
                    });
                }
                let delay = self.retry.delay_for(retry_count);
                warn!(
                    "{method} {} returned {status}. Waiting {delay:?} before retry {}/{}...",
                    url.path(),
                    retry_count + 1,
                    self.retry.max_retries
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            let next_link = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_next_link);
            let body = response.text().await?;
            debug!("{method} {} -> {status}", url.path());

            return Ok(ApiResponse {
                status,
                next_link,
                body,
            });
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(Method::GET, self.endpoint(path)?, &[], None).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        self.send(Method::GET, self.endpoint(path)?, query, None)
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send(Method::POST, self.endpoint(path)?, &[], Some(body))
            .await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send(Method::PATCH, self.endpoint(path)?, &[], Some(body))
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send(Method::PUT, self.endpoint(path)?, &[], Some(body))
            .await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| MigrateError::Config(format!("Invalid credential header: {e}")))
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> ApiClient {
    ApiClient::new(
        base_url,
        Auth::None,
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::ZERO,
        },
    )
    .unwrap()
}
