use serde::Serialize;

use pv_core::models::{CommandType, DeploymentStatus};
use pv_core::services::store::StoreSnapshot;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub id: String,
    pub status: DeploymentStatus,
    pub branch: String,
    pub sha: String,
    pub port: Option<u16>,
    pub clone_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJobView {
    pub command_type: CommandType,
    pub deploy_id: String,
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub deployments: Vec<DeploymentView>,
    pub queue: Vec<QueuedJobView>,
}

impl StatusResponse {
    pub fn from_snapshot(snapshot: &StoreSnapshot) -> Self {
        let deployments = snapshot
            .statuses()
            .into_iter()
            .map(|(id, record)| DeploymentView {
                port: snapshot.port(&id),
                id: id.to_string(),
                status: record.status,
                branch: record.branch,
                sha: record.sha,
                clone_url: record.clone_url,
            })
            .collect();
        let queue = snapshot
            .jobs()
            .into_iter()
            .map(|job| QueuedJobView {
                command_type: job.command_type,
                deploy_id: job.deploy_id.to_string(),
            })
            .collect();
        Self { deployments, queue }
    }
}
