// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use pv_core::error::{PreviewError, Result};
use pv_core::models::{DeploymentConfig, Revision};
use pv_core::services::deployer::Deployer;
use pv_core::services::git::SourceFetcher;
use pv_core::services::queue::JobQueue;
use pv_core::services::router::PullRequestLookup;
use pv_core::services::store::RecordStore;
use pv_core::services::supervisor::{ProcessSpec, ProcessSupervisor};

/// Records every supervisor call as `"<op> <name>"`.
#[derive(Default)]
pub struct FakeSupervisor {
    pub calls: Mutex<Vec<String>>,
    pub started: Mutex<HashMap<String, ProcessSpec>>,
}

impl FakeSupervisor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spec(&self, name: &str) -> Option<ProcessSpec> {
        self.started.lock().unwrap().get(name).cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.started.lock().unwrap().contains_key(name)
    }

    /// Drop a process as a supervisor restarted without its saved list would.
    pub fn forget(&self, name: &str) {
        self.started.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn start(&self, spec: &ProcessSpec) -> Result<()> {
        self.calls.lock().unwrap().push(format!("start {}", spec.name));
        self.started
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("stop {name}"));
        if !self.is_running(name) {
            return Err(PreviewError::ProcessNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn restart(&self, spec: &ProcessSpec) -> Result<()> {
        self.calls.lock().unwrap().push(format!("restart {}", spec.name));
        if !self.is_running(&spec.name) {
            return Err(PreviewError::ProcessNotFound(spec.name.clone()));
        }
        self.started
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("delete {name}"));
        self.started.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Creates the target directory and writes the checked-out sha into it.
#[derive(Default)]
pub struct FakeFetcher {
    pub fetches: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch_fresh(&self, revision: &Revision, target: &Path) -> Result<()> {
        if target.exists() {
            return Err(PreviewError::Git(format!(
                "destination path '{}' already exists",
                target.display()
            )));
        }
        tokio::fs::create_dir_all(target).await?;
        tokio::fs::write(target.join("REVISION"), &revision.sha).await?;
        self.fetches
            .lock()
            .unwrap()
            .push(format!("fresh {}", revision.sha));
        Ok(())
    }

    async fn fetch_update(&self, revision: &Revision, target: &Path) -> Result<()> {
        tokio::fs::write(target.join("REVISION"), &revision.sha).await?;
        self.fetches
            .lock()
            .unwrap()
            .push(format!("update {}", revision.sha));
        Ok(())
    }
}

pub struct OpenPullRequests;

#[async_trait]
impl PullRequestLookup for OpenPullRequests {
    async fn is_open(&self, _url: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Everything a test needs, rooted in one temp dir.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<RecordStore>,
    pub queue: Arc<JobQueue>,
    pub supervisor: Arc<FakeSupervisor>,
    pub fetcher: Arc<FakeFetcher>,
    pub deployer: Arc<Deployer>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::open(dir).await
    }

    /// Reopen the state under `dir` with fresh in-memory collaborators, as a
    /// restarted daemon would.
    pub async fn open(dir: tempfile::TempDir) -> Self {
        let store = Arc::new(RecordStore::open(&dir.path().join("state")).await.unwrap());
        let queue = Arc::new(JobQueue::new(store.clone()));
        let supervisor = Arc::new(FakeSupervisor::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let deployer = Arc::new(Deployer::new(
            store.clone(),
            supervisor.clone(),
            fetcher.clone(),
            dir.path().join("deploys"),
        ));
        Self {
            dir,
            store,
            queue,
            supervisor,
            fetcher,
            deployer,
        }
    }

    pub fn deploys_dir(&self) -> PathBuf {
        self.dir.path().join("deploys")
    }

    /// Run the consumer until the queue is empty, then stop it.
    pub async fn drain(&self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = {
            let queue = self.queue.clone();
            let deployer = self.deployer.clone();
            tokio::spawn(async move { queue.run(deployer.as_ref(), shutdown_rx).await })
        };
        for _ in 0..500 {
            if self.queue.jobs().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        consumer.await.unwrap().unwrap();
        assert!(self.queue.jobs().await.is_empty(), "queue did not drain");
    }
}

/// Config for `acme/app` over the given port range.
pub fn acme_config(port: &str, extra: serde_json::Value) -> DeploymentConfig {
    let mut value = serde_json::json!({
        "repository": "acme/app",
        "port": port,
        "pre": ["echo installed > .installed"],
        "startFile": "server.js",
        "env": { "API_URL": "http://localhost:{{PORT}}/api" }
    });
    if let (Some(value), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        value.extend(extra.clone());
    }
    serde_json::from_value(value).unwrap()
}

pub fn revision(branch: &str, sha: &str) -> Revision {
    Revision {
        clone_url: "https://github.com/acme/app.git".into(),
        branch: branch.into(),
        sha: sha.into(),
    }
}

pub fn repository_json() -> serde_json::Value {
    serde_json::json!({
        "full_name": "acme/app",
        "clone_url": "https://github.com/acme/app.git",
        "default_branch": "main"
    })
}
