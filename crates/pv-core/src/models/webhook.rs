//! Typed subsets of the source-control webhook payloads the router acts on.

use serde::Deserialize;

use crate::error::{PreviewError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub state: Option<String>,
    pub head: GitRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckSuite {
    #[serde(default)]
    pub head_branch: Option<String>,
}

/// Pull request reference attached to a check run. `url` is the API URL
/// used to fetch current PR details.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub head_sha: String,
    pub check_suite: CheckSuite,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunEvent {
    pub action: String,
    pub check_run: CheckRun,
    pub repository: Repository,
}

impl CheckRunEvent {
    /// Head branch of the run, falling back to the repository default branch
    /// when the suite carries none.
    pub fn branch(&self) -> Option<&str> {
        self.check_run
            .check_suite
            .head_branch
            .as_deref()
            .or(self.repository.default_branch.as_deref())
    }

    pub fn succeeded(&self) -> bool {
        self.action == "completed" && self.check_run.conclusion.as_deref() == Some("success")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteEvent {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub ref_type: String,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    pub repository: Repository,
}

#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PullRequest(PullRequestEvent),
    CheckRun(CheckRunEvent),
    Delete(DeleteEvent),
    Push(PushEvent),
}

impl WebhookEvent {
    /// Decode a payload for the given event type (`X-GitHub-Event`).
    /// Unsupported event types decode to `None`.
    pub fn parse(event_type: &str, body: &[u8]) -> Result<Option<Self>> {
        let decode_err = |e: serde_json::Error| {
            PreviewError::InvalidPayload(format!("{event_type}: {e}"))
        };
        let event = match event_type {
            "pull_request" => Self::PullRequest(serde_json::from_slice(body).map_err(decode_err)?),
            "check_run" => Self::CheckRun(serde_json::from_slice(body).map_err(decode_err)?),
            "delete" => Self::Delete(serde_json::from_slice(body).map_err(decode_err)?),
            "push" => Self::Push(serde_json::from_slice(body).map_err(decode_err)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn repository(&self) -> &Repository {
        match self {
            Self::PullRequest(e) => &e.repository,
            Self::CheckRun(e) => &e.repository,
            Self::Delete(e) => &e.repository,
            Self::Push(e) => &e.repository,
        }
    }

    /// Branch used for config matching.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::PullRequest(e) => Some(e.pull_request.head.ref_name.as_str()),
            Self::CheckRun(e) => e.branch(),
            Self::Delete(e) => Some(strip_ref(&e.ref_name)),
            Self::Push(e) => Some(strip_ref(&e.ref_name)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PullRequest(_) => "pull_request",
            Self::CheckRun(_) => "check_run",
            Self::Delete(_) => "delete",
            Self::Push(_) => "push",
        }
    }
}

fn strip_ref(ref_name: &str) -> &str {
    ref_name
        .strip_prefix("refs/heads/")
        .or_else(|| ref_name.strip_prefix("refs/tags/"))
        .unwrap_or(ref_name)
}
