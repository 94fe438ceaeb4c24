//! Daemon secrets, loaded from environment variables.

#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Webhook secret for HMAC validation. Empty disables validation.
    pub webhook_secret: String,
    /// Token used for API lookups and https clones.
    pub github_token: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let webhook_secret = std::env::var("WEBHOOK_SECRET").unwrap_or_default();
        let github_token = std::env::var("GITHUB_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        if webhook_secret.is_empty() {
            tracing::warn!("WEBHOOK_SECRET not set -- webhook signature validation disabled");
        }
        if github_token.is_none() {
            tracing::warn!("GITHUB_ACCESS_TOKEN not set -- private repositories and PR lookups will fail");
        }

        Self {
            webhook_secret,
            github_token,
        }
    }
}
