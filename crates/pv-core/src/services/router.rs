use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::webhook::{
    CheckRunEvent, DeleteEvent, PullRequestEvent, PushEvent, Repository,
};
use crate::models::{CommandType, DeploymentConfig, DeploymentId, Revision, WebhookEvent};
use crate::services::matcher;
use crate::services::queue::JobQueue;

/// Looks up the current state of a pull request.
#[async_trait]
pub trait PullRequestLookup: Send + Sync {
    /// `url` is the API URL of the pull request.
    async fn is_open(&self, url: &str) -> Result<bool>;
}

/// Turns webhook events into queue entries. Never runs deployment work
/// itself.
pub struct EventRouter {
    configs: Arc<Vec<DeploymentConfig>>,
    queue: Arc<JobQueue>,
    pull_requests: Arc<dyn PullRequestLookup>,
}

impl EventRouter {
    pub fn new(
        configs: Arc<Vec<DeploymentConfig>>,
        queue: Arc<JobQueue>,
        pull_requests: Arc<dyn PullRequestLookup>,
    ) -> Self {
        Self {
            configs,
            queue,
            pull_requests,
        }
    }

    /// Route one event. Returns the number of jobs enqueued; events that
    /// need no action enqueue nothing.
    pub async fn route(&self, event: &WebhookEvent) -> Result<usize> {
        let count = match event {
            WebhookEvent::PullRequest(e) => self.on_pull_request(e).await?,
            WebhookEvent::CheckRun(e) => self.on_check_run(e).await?,
            WebhookEvent::Delete(e) => self.on_delete(e).await?,
            WebhookEvent::Push(e) => self.on_push(e).await?,
        };
        tracing::debug!(event = event.kind(), repository = %event.repository().full_name, jobs = count, "event routed");
        Ok(count)
    }

    fn resolve(&self, repository: &Repository, branch: &str) -> Result<&DeploymentConfig> {
        matcher::resolve(&self.configs, &repository.full_name, branch)
    }

    async fn on_pull_request(&self, event: &PullRequestEvent) -> Result<usize> {
        let branch = event.pull_request.head.ref_name.as_str();
        let config = self.resolve(&event.repository, branch)?;
        let id = DeploymentId::for_pull_request(config, event.number);

        match event.action.as_str() {
            "closed" => {
                self.queue
                    .enqueue(CommandType::Remove, id, config.clone(), None)
                    .await?;
                Ok(1)
            }
            "opened" | "reopened" | "synchronize"
                if config.ignore_check && config.deploy_pull_request =>
            {
                let revision = Revision {
                    clone_url: event.repository.clone_url.clone(),
                    branch: branch.to_string(),
                    sha: event.pull_request.head.sha.clone(),
                };
                self.deploy_pull_request(config, id, revision).await
            }
            _ => Ok(0),
        }
    }

    async fn on_check_run(&self, event: &CheckRunEvent) -> Result<usize> {
        if !event.succeeded() {
            return Ok(0);
        }
        let Some(branch) = event.branch() else {
            return Ok(0);
        };
        let config = self.resolve(&event.repository, branch)?;
        // With ignoreCheck, pull_request and push events drive deployment.
        if config.ignore_check {
            return Ok(0);
        }
        let revision = Revision {
            clone_url: event.repository.clone_url.clone(),
            branch: branch.to_string(),
            sha: event.check_run.head_sha.clone(),
        };

        let pull_requests = &event.check_run.pull_requests;
        if pull_requests.is_empty() {
            if !config.deploy_branches {
                return Ok(0);
            }
            let id = DeploymentId::for_branch(config, branch);
            self.queue
                .enqueue(CommandType::Deploy, id, config.clone(), Some(revision))
                .await?;
            return Ok(1);
        }

        if !config.deploy_pull_request {
            return Ok(0);
        }
        let mut count = 0;
        for pr in pull_requests {
            if !self.pull_requests.is_open(&pr.url).await? {
                tracing::debug!(number = pr.number, "pull request no longer open, skipping");
                continue;
            }
            let id = DeploymentId::for_pull_request(config, pr.number);
            count += self.deploy_pull_request(config, id, revision.clone()).await?;
        }
        Ok(count)
    }

    async fn on_delete(&self, event: &DeleteEvent) -> Result<usize> {
        let name = event.ref_name.as_str();
        let (id, config) = match event.ref_type.as_str() {
            "tag" => {
                let config = self.resolve(&event.repository, name)?;
                (DeploymentId::for_tag(config, name), config)
            }
            "branch" => {
                let branch = name.strip_prefix("refs/heads/").unwrap_or(name);
                let config = self.resolve(&event.repository, branch)?;
                if config.is_static_branch(branch) {
                    tracing::info!(branch, "static branch deleted, keeping deployment");
                    return Ok(0);
                }
                (DeploymentId::for_branch(config, branch), config)
            }
            _ => return Ok(0),
        };
        self.queue
            .enqueue(CommandType::Remove, id, config.clone(), None)
            .await?;
        Ok(1)
    }

    async fn on_push(&self, event: &PushEvent) -> Result<usize> {
        if event.deleted {
            return Ok(0);
        }
        let Some(branch) = event.ref_name.strip_prefix("refs/heads/") else {
            return Ok(0);
        };
        let config = self.resolve(&event.repository, branch)?;
        if !(config.deploy_branches && config.ignore_check) {
            return Ok(0);
        }
        let revision = Revision {
            clone_url: event.repository.clone_url.clone(),
            branch: branch.to_string(),
            sha: event.after.clone(),
        };
        self.queue
            .enqueue(
                CommandType::Deploy,
                DeploymentId::for_branch(config, branch),
                config.clone(),
                Some(revision),
            )
            .await?;
        Ok(1)
    }

    /// Deploy a pull request. With branch deployments enabled the head
    /// branch's own deployment is removed first, unless the branch is static.
    async fn deploy_pull_request(
        &self,
        config: &DeploymentConfig,
        id: DeploymentId,
        revision: Revision,
    ) -> Result<usize> {
        let mut count = 0;
        if config.deploy_branches && !config.is_static_branch(&revision.branch) {
            let branch_id = DeploymentId::for_branch(config, &revision.branch);
            self.queue
                .enqueue(CommandType::Remove, branch_id, config.clone(), None)
                .await?;
            count += 1;
        }
        self.queue
            .enqueue(CommandType::Deploy, id, config.clone(), Some(revision))
            .await?;
        Ok(count + 1)
    }
}
