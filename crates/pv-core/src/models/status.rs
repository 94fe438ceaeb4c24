use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Revision;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Building,
    Rebuilding,
    Running,
}

impl DeploymentStatus {
    /// True while a job for this deployment was mid-flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, DeploymentStatus::Building | DeploymentStatus::Rebuilding)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Building => "BUILDING",
            DeploymentStatus::Rebuilding => "REBUILDING",
            DeploymentStatus::Running => "RUNNING",
        }
    }
}

/// Persisted under `<id>-STATUS`. Absence means "not deployed".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: DeploymentStatus,
    pub clone_url: String,
    pub branch: String,
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn new(status: DeploymentStatus, revision: &Revision) -> Self {
        Self {
            status,
            clone_url: revision.clone_url.clone(),
            branch: revision.branch.clone(),
            sha: revision.sha.clone(),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn revision(&self) -> Revision {
        Revision {
            clone_url: self.clone_url.clone(),
            branch: self.branch.clone(),
            sha: self.sha.clone(),
        }
    }
}
