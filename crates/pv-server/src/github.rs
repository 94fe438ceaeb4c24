//! GitHub integration: webhook signature validation and pull request lookup.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use pv_core::error::{PreviewError, Result};
use pv_core::services::router::PullRequestLookup;

type HmacSha256 = Hmac<Sha256>;

/// Validate a GitHub webhook signature (X-Hub-Signature-256).
pub fn validate_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("webhook secret not configured, skipping validation");
        return true;
    }

    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// `sha256=<hex>` signature for a payload, as GitHub sends it.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Deserialize)]
struct PullRequestState {
    state: String,
}

/// Pull request lookups against the GitHub REST API.
pub struct GithubClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }
}

#[async_trait]
impl PullRequestLookup for GithubClient {
    async fn is_open(&self, url: &str) -> Result<bool> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "previewd");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| PreviewError::PullRequestLookup(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(PreviewError::PullRequestLookup(format!(
                "GET {url} returned {}",
                resp.status()
            )));
        }
        let pr: PullRequestState = resp
            .json()
            .await
            .map_err(|e| PreviewError::PullRequestLookup(e.to_string()))?;
        Ok(pr.state == "open")
    }
}
