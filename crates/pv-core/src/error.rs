use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("no matching config for repository '{repository}' on branch '{branch}'")]
    ConfigResolution { repository: String, branch: String },

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("git operation failed: {0}")]
    Git(String),

    #[error("process supervisor failed: {0}")]
    Supervisor(String),

    #[error("process '{0}' is not known to the supervisor")]
    ProcessNotFound(String),

    #[error("port allocation failed: {0}")]
    PortAllocation(String),

    #[error("removal of '{id}' incomplete: {reason}")]
    Removal { id: String, reason: String },

    #[error("record store failed: {0}")]
    Store(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("pull request lookup failed: {0}")]
    PullRequestLookup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
