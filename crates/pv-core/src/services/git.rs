use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PreviewError, Result};
use crate::models::Revision;

/// Produces a working copy at a given revision.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Create `target` as a new checkout of the revision.
    async fn fetch_fresh(&self, revision: &Revision, target: &Path) -> Result<()>;

    /// Move the existing checkout at `target` to the revision.
    async fn fetch_update(&self, revision: &Revision, target: &Path) -> Result<()>;
}

pub struct GitFetcher {
    access_token: Option<String>,
}

impl GitFetcher {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
        }
    }

    /// Clone URL with the access token embedded, for https remotes only.
    fn authenticated_url(&self, clone_url: &str) -> String {
        match (&self.access_token, clone_url.strip_prefix("https://")) {
            (Some(token), Some(rest)) => format!("https://x-access-token:{token}@{rest}"),
            _ => clone_url.to_string(),
        }
    }

    async fn run_git(&self, args: &[&str], working_directory: Option<&Path>) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| PreviewError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PreviewError::Git(self.redact(&format!(
                "git {} failed (exit {}): {stderr}",
                args.join(" "),
                output.status.code().unwrap_or(-1)
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn redact(&self, text: &str) -> String {
        match &self.access_token {
            Some(token) => text.replace(token.as_str(), "***"),
            None => text.to_string(),
        }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch_fresh(&self, revision: &Revision, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::info!(
            clone_url = %revision.clone_url,
            branch = %revision.branch,
            sha = %revision.sha,
            target = %target.display(),
            "cloning working copy"
        );
        let url = self.authenticated_url(&revision.clone_url);
        let branch_arg = format!("--branch={}", revision.branch);
        let target_arg = target.to_string_lossy();
        self.run_git(
            &["clone", "--depth=50", &branch_arg, &url, &target_arg],
            None,
        )
        .await?;
        // Keep the token out of .git/config.
        self.run_git(
            &["remote", "set-url", "origin", &revision.clone_url],
            Some(target),
        )
        .await?;
        self.run_git(&["checkout", "-qf", &revision.sha], Some(target))
            .await?;
        Ok(())
    }

    async fn fetch_update(&self, revision: &Revision, target: &Path) -> Result<()> {
        tracing::info!(
            branch = %revision.branch,
            sha = %revision.sha,
            target = %target.display(),
            "updating working copy"
        );
        let url = self.authenticated_url(&revision.clone_url);
        self.run_git(
            &["fetch", "--depth=50", &url, &revision.branch],
            Some(target),
        )
        .await?;
        self.run_git(&["checkout", "-qf", &revision.sha], Some(target))
            .await?;
        Ok(())
    }
}
