//! API HTTP Client - Rate-limited REST Client
//!
//! Wraps reqwest with a concurrency cap, a request-rate limiter,
//! retries and optional request signing. Shared by the swap backend
//! and ledger gateway adapters.
//!
//! Retries are a per-call decision: reads go through `get_json` with
//! the configured budget, while `post_json` sends exactly once. A
//! swap submission or a ledger transfer that timed out may still have
//! landed, so resending it could pay twice.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::{ApiAuth, KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Non-retryable HTTP status returned by upstream.
#[derive(Debug, Clone, thiserror::Error)]
#[error("API error {status} on {method} {path}: {body}")]
pub struct ApiStatusError {
  pub status: StatusCode,
  pub method: String,
  pub path: String,
  pub body: String,
}

/// Configuration for the API client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
  /// Base URL, without trailing slash.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Retries for idempotent reads.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Outbound request budget per second.
  pub requests_per_second: u32,
}

impl Default for ApiClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://127.0.0.1:4943".to_string(),
      timeout: Duration::from_secs(10),
      max_concurrent: 10,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
      requests_per_second: 20,
    }
  }
}

/// Rate-limited HTTP client for the swap backend and ledger gateway.
pub struct ApiClient {
  /// Underlying HTTP client.
  http: Client,
  /// Request signer, if credentials are configured.
  auth: Option<Arc<ApiAuth>>,
  /// Client configuration.
  config: ApiClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Request-rate limiter.
  limiter: DefaultDirectRateLimiter,
}

impl ApiClient {
  /// Create a new API client.
  pub fn new(auth: Option<Arc<ApiAuth>>, config: ApiClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let per_second = NonZeroU32::new(config.requests_per_second)
      .context("requests_per_second must be positive")?;
    let limiter = RateLimiter::direct(Quota::per_second(per_second));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));

    Ok(Self {
      http,
      auth,
      config,
      semaphore,
      limiter,
    })
  }

  /// GET and decode JSON. Retried on transport errors, 429 and 5xx.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = format!("{}{}", self.config.base_url, path);
    let request = self.http.get(&url);
    let response = self
      .execute(request, "GET", path, "", self.config.max_retries)
      .await?;
    response
      .json()
      .await
      .with_context(|| format!("Failed to decode response of GET {path}"))
  }

  /// POST a JSON body and decode JSON. Sent exactly once.
  pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let body = serde_json::to_string(body).context("Failed to encode request body")?;
    let url = format!("{}{}", self.config.base_url, path);
    let request = self
      .http
      .post(&url)
      .header("Content-Type", "application/json")
      .body(body.clone());
    let response = self.execute(request, "POST", path, &body, 0).await?;
    response
      .json()
      .await
      .with_context(|| format!("Failed to decode response of POST {path}"))
  }

  /// Execute request with signing, rate limiting, and up to `retries` retries.
  async fn execute(
    &self,
    request: RequestBuilder,
    method: &str,
    path: &str,
    body: &str,
    retries: u32,
  ) -> Result<Response> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .context("Semaphore closed")?;

    let mut last_error = None;

    for attempt in 0..=retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis() as u64, path, "Retrying request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      let mut req = request
        .try_clone()
        .context("Failed to clone request")?;

      if let Some(auth) = &self.auth {
        let timestamp = ApiAuth::timestamp();
        let signature = auth.sign(&timestamp, method, path, body);
        req = req
          .header(KEY_HEADER, auth.api_key())
          .header(TIMESTAMP_HEADER, &timestamp)
          .header(SIGNATURE_HEADER, signature);
      }

      match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => return Ok(response),
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(path, "Rate limited by upstream, backing off");
            last_error = Some(anyhow::anyhow!("Rate limited on {method} {path}"));
          }
          status if status.is_server_error() => {
            warn!(status = %status, path, "Server error");
            last_error = Some(anyhow::anyhow!("Server error {status} on {method} {path}"));
          }
          status => {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiStatusError {
              status,
              method: method.to_string(),
              path: path.to_string(),
              body,
            }
            .into());
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, path, "Request failed");
          last_error = Some(anyhow::Error::new(e).context(format!("{method} {path}")));
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
  }
}
