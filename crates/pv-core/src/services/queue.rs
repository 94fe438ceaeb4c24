use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{watch, Notify};

use crate::error::Result;
use crate::models::{CommandType, DeploymentConfig, DeploymentId, Job, Revision};
use crate::services::store::RecordStore;

/// Store key holding the ordered list of JSON-encoded jobs.
pub const QUEUE_KEY: &str = "deploy-queue";

const POP_RETRY_INITIAL: Duration = Duration::from_millis(100);
const POP_RETRY_MAX: Duration = Duration::from_secs(5);

/// Runs one job to completion.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<()>;
}

/// Durable FIFO of deploy/remove jobs. The head entry is the job in flight;
/// it stays persisted until it finishes so a crash mid-job replays it.
pub struct JobQueue {
    store: Arc<RecordStore>,
    appended: Notify,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuedIdentity {
    deploy_id: DeploymentId,
}

impl JobQueue {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            appended: Notify::new(),
        }
    }

    /// Append a job. Any pending (not in-flight) job for the same identity
    /// is dropped first, so at most one pending job per identity survives.
    pub async fn enqueue(
        &self,
        command_type: CommandType,
        id: DeploymentId,
        config: DeploymentConfig,
        revision: Option<Revision>,
    ) -> Result<()> {
        let job = Job {
            command_type,
            deploy_id: id,
            config,
            deploy_data: revision,
        };
        let encoded = serde_json::to_string(&job)?;

        let dropped = self
            .store
            .modify_list(QUEUE_KEY, |items| {
                let before = items.len();
                let mut index = 0;
                items.retain(|raw| {
                    let keep = index == 0 || !is_for(raw, &job.deploy_id);
                    index += 1;
                    keep
                });
                let dropped = before - items.len();
                items.push(encoded);
                dropped
            })
            .await?;

        tracing::info!(
            command = %job.command_type,
            deploy_id = %job.deploy_id,
            superseded = dropped,
            "job enqueued"
        );
        self.appended.notify_one();
        Ok(())
    }

    /// Decoded jobs in order; undecodable entries are skipped.
    pub async fn jobs(&self) -> Vec<Job> {
        self.store
            .list(QUEUE_KEY)
            .await
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    pub async fn head(&self) -> Option<Job> {
        let raw = self.store.list(QUEUE_KEY).await.into_iter().next()?;
        serde_json::from_str(&raw).ok()
    }

    /// Consumer loop. Executes the head job, pops it, repeats; waits for an
    /// append when the queue is empty. Job failures are logged and the job
    /// is dropped. Returns when `shutdown` turns true, after the current
    /// job.
    pub async fn run(
        &self,
        executor: &dyn JobExecutor,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!("queue consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(raw) = self.store.list(QUEUE_KEY).await.into_iter().next() else {
                tokio::select! {
                    _ = self.appended.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            match serde_json::from_str::<Job>(&raw) {
                Ok(job) => {
                    tracing::info!(command = %job.command_type, deploy_id = %job.deploy_id, "job started");
                    match executor.execute(&job).await {
                        Ok(()) => {
                            tracing::info!(command = %job.command_type, deploy_id = %job.deploy_id, "job finished")
                        }
                        Err(e) => tracing::error!(
                            command = %job.command_type,
                            deploy_id = %job.deploy_id,
                            error = %e,
                            "job failed, dropping"
                        ),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable queue entry"),
            }

            if !self.pop_head(&mut shutdown).await {
                break;
            }
        }
        tracing::info!("queue consumer stopped");
        Ok(())
    }

    /// Remove the finished head. Store write failures are retried with
    /// backoff and never re-run the job. Returns false when shutdown
    /// arrives first; the head then replays on the next start.
    async fn pop_head(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut delay = POP_RETRY_INITIAL;
        loop {
            let popped = self
                .store
                .modify_list(QUEUE_KEY, |items| {
                    if !items.is_empty() {
                        items.remove(0);
                    }
                })
                .await;
            match popped {
                Ok(()) => return true,
                Err(e) => tracing::error!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "failed to remove finished job from queue"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
            delay = (delay * 2).min(POP_RETRY_MAX);
        }
    }
}

fn is_for(raw: &str, id: &DeploymentId) -> bool {
    serde_json::from_str::<QueuedIdentity>(raw).is_ok_and(|queued| &queued.deploy_id == id)
}
