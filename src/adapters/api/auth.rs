//! API Authentication - HMAC-SHA256 Request Signing
//!
//! Signs backend and ledger gateway requests with HMAC-SHA256 when
//! credentials are configured. Credentials come from environment
//! variables (SWAP_API_KEY, SWAP_API_SECRET). Without them requests go
//! out unsigned, which is what a local replica expects.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use base64::Engine;

/// Header carrying the API key.
pub const KEY_HEADER: &str = "SWAP-API-KEY";
/// Header carrying the signing timestamp (Unix seconds).
pub const TIMESTAMP_HEADER: &str = "SWAP-TIMESTAMP";
/// Header carrying the base64 HMAC signature.
pub const SIGNATURE_HEADER: &str = "SWAP-SIGNATURE";

/// Outbound API credentials.
pub struct ApiAuth {
    /// API key from SWAP_API_KEY env var.
    api_key: String,
    /// API secret from SWAP_API_SECRET env var (never sent in headers).
    api_secret: String,
}

impl ApiAuth {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Load credentials from the environment.
    ///
    /// Returns `Ok(None)` when neither variable is set. Setting only one
    /// of the two is a configuration error.
    pub fn from_env() -> Result<Option<Self>> {
        let key = std::env::var("SWAP_API_KEY").ok();
        let secret = std::env::var("SWAP_API_SECRET").ok();
        match (key, secret) {
            (Some(key), Some(secret)) => Ok(Some(Self::new(key, secret))),
            (None, None) => Ok(None),
            _ => anyhow::bail!("SWAP_API_KEY and SWAP_API_SECRET must be set together"),
        }
    }

    /// Get the API key for request headers.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Current Unix timestamp in seconds (for signing).
    pub fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string()
    }

    /// Sign a request.
    ///
    /// Signature format: base64(HMAC-SHA256(secret, timestamp + method + path + body))
    pub fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let message = format!("{timestamp}{method}{path}{body}");
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), self.api_secret.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac)
    }
}

impl std::fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiAuth")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
