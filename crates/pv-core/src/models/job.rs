use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::DeploymentConfig;
use super::identity::DeploymentId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Deploy,
    Remove,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::Deploy => f.write_str("DEPLOY"),
            CommandType::Remove => f.write_str("REMOVE"),
        }
    }
}

/// Source revision a DEPLOY job builds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub clone_url: String,
    pub branch: String,
    pub sha: String,
}

/// A queued command. The config is a snapshot taken at enqueue time and is
/// not re-resolved when the job runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub command_type: CommandType,
    pub deploy_id: DeploymentId,
    pub config: DeploymentConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_data: Option<Revision>,
}

impl Job {
    pub fn deploy(id: DeploymentId, config: DeploymentConfig, revision: Revision) -> Self {
        Self {
            command_type: CommandType::Deploy,
            deploy_id: id,
            config,
            deploy_data: Some(revision),
        }
    }

    pub fn remove(id: DeploymentId, config: DeploymentConfig) -> Self {
        Self {
            command_type: CommandType::Remove,
            deploy_id: id,
            config,
            deploy_data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_uses_queue_wire_names() {
        let config: DeploymentConfig = serde_json::from_value(serde_json::json!({
            "repository": "acme/app",
            "port": "4000:4010",
            "startFile": "server.js"
        }))
        .unwrap();
        let job = Job::deploy(
            DeploymentId::for_pull_request(&config, 7),
            config,
            Revision {
                clone_url: "https://github.com/acme/app.git".into(),
                branch: "feature-x".into(),
                sha: "abc123".into(),
            },
        );
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["commandType"], "DEPLOY");
        assert_eq!(json["deployId"], "acme-app-pr-7");
        assert_eq!(json["config"]["repository"], "acme/app");
        assert_eq!(json["deployData"]["sha"], "abc123");

        let remove = Job::remove("acme-app-pr-7".into(), job.config.clone());
        let json = serde_json::to_value(&remove).unwrap();
        assert_eq!(json["commandType"], "REMOVE");
        assert!(json.get("deployData").is_none());
    }
}
