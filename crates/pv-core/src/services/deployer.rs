use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PreviewError, Result};
use crate::models::{
    CommandType, DeploymentConfig, DeploymentId, DeploymentStatus, Job, Revision, StatusRecord,
};
use crate::services::git::SourceFetcher;
use crate::services::matcher;
use crate::services::ports::{AssignedPorts, PortAllocator};
use crate::services::queue::{JobExecutor, JobQueue};
use crate::services::shell;
use crate::services::store::RecordStore;
use crate::services::supervisor::{ProcessSpec, ProcessSupervisor};
use crate::services::template;

/// Executes deploy and remove jobs against the record store, the working
/// copies under `deploys_directory` and the process supervisor.
pub struct Deployer {
    store: Arc<RecordStore>,
    supervisor: Arc<dyn ProcessSupervisor>,
    fetcher: Arc<dyn SourceFetcher>,
    port_allocator: PortAllocator,
    deploys_directory: PathBuf,
}

impl Deployer {
    pub fn new(
        store: Arc<RecordStore>,
        supervisor: Arc<dyn ProcessSupervisor>,
        fetcher: Arc<dyn SourceFetcher>,
        deploys_directory: PathBuf,
    ) -> Self {
        Self {
            store,
            supervisor,
            fetcher,
            port_allocator: PortAllocator::new(),
            deploys_directory,
        }
    }

    pub fn with_port_allocator(mut self, port_allocator: PortAllocator) -> Self {
        self.port_allocator = port_allocator;
        self
    }

    pub fn working_copy_path(&self, id: &DeploymentId) -> PathBuf {
        self.deploys_directory.join(id.path_segment())
    }

    /// Deploy a revision. A port plus a working copy means update in place,
    /// neither means provision fresh, and only one of the two is a torn
    /// state that is removed before provisioning fresh.
    pub async fn deploy(
        &self,
        config: &DeploymentConfig,
        id: &DeploymentId,
        revision: &Revision,
    ) -> Result<()> {
        let port = self.store.get_port(id.port_key()).await;
        let path = self.working_copy_path(id);
        let has_working_copy = path_exists(&path).await;

        match (port, has_working_copy) {
            (Some(port), true) => self.update(config, id, revision, port, &path).await,
            (None, false) => self.provision(config, id, revision, &path).await,
            (port, has_working_copy) => {
                tracing::warn!(
                    deploy_id = %id,
                    port = ?port,
                    working_copy = has_working_copy,
                    "partial deployment found, removing before provisioning"
                );
                if let Err(e) = self.remove_deployment(id, config).await {
                    tracing::warn!(deploy_id = %id, error = %e, "cleanup of partial deployment incomplete");
                }
                self.provision(config, id, revision, &path).await
            }
        }
    }

    async fn provision(
        &self,
        config: &DeploymentConfig,
        id: &DeploymentId,
        revision: &Revision,
        path: &Path,
    ) -> Result<()> {
        tracing::info!(deploy_id = %id, sha = %revision.sha, "provisioning");
        self.store
            .set_status(id, StatusRecord::new(DeploymentStatus::Building, revision))
            .await?;

        self.fetcher
            .fetch_fresh(revision, path)
            .await
            .map_err(as_provisioning)?;
        shell::run_commands(&config.pre, path).await?;

        let excluded = self.store.port_values().await;
        let ports = self.port_allocator.allocate_all(config, &excluded)?;
        for spec in self.process_specs(config, id, path, &ports) {
            self.supervisor.start(&spec).await.map_err(as_provisioning)?;
        }

        self.store.set_ports(&port_entries(config, id, &ports)).await?;
        self.store
            .set_status(id, StatusRecord::new(DeploymentStatus::Running, revision))
            .await?;
        tracing::info!(deploy_id = %id, port = ports.primary, "deployment running");
        Ok(())
    }

    async fn update(
        &self,
        config: &DeploymentConfig,
        id: &DeploymentId,
        revision: &Revision,
        port: u16,
        path: &Path,
    ) -> Result<()> {
        tracing::info!(deploy_id = %id, sha = %revision.sha, port, "updating in place");
        self.store
            .set_status(id, StatusRecord::new(DeploymentStatus::Rebuilding, revision))
            .await?;

        self.fetcher
            .fetch_update(revision, path)
            .await
            .map_err(as_provisioning)?;
        shell::run_commands(&config.pre, path).await?;

        let ports = self.existing_ports(config, id, port).await?;
        self.store.set_ports(&port_entries(config, id, &ports)).await?;
        for spec in self.process_specs(config, id, path, &ports) {
            self.restart_process(&spec).await?;
        }

        self.store
            .set_status(id, StatusRecord::new(DeploymentStatus::Running, revision))
            .await?;
        tracing::info!(deploy_id = %id, port, "deployment running");
        Ok(())
    }

    /// Stop then restart. A process the supervisor has forgotten (a host
    /// reboot, a provision that stopped half way) is started instead.
    async fn restart_process(&self, spec: &ProcessSpec) -> Result<()> {
        match self.supervisor.stop(&spec.name).await {
            Ok(()) | Err(PreviewError::ProcessNotFound(_)) => {}
            Err(e) => return Err(as_provisioning(e)),
        }
        match self.supervisor.restart(spec).await {
            Ok(()) => Ok(()),
            Err(PreviewError::ProcessNotFound(_)) => {
                tracing::warn!(name = %spec.name, "process unknown to supervisor, starting it");
                self.supervisor.start(spec).await.map_err(as_provisioning)
            }
            Err(e) => Err(as_provisioning(e)),
        }
    }

    /// Ports already assigned to this identity. Servers without an
    /// assignment (added to the config since) get a fresh one.
    async fn existing_ports(
        &self,
        config: &DeploymentConfig,
        id: &DeploymentId,
        primary: u16,
    ) -> Result<AssignedPorts> {
        let mut excluded: HashSet<u16> = self.store.port_values().await;
        let mut servers = Vec::with_capacity(config.additional_servers.len());
        for server in &config.additional_servers {
            let port = match self.store.get_port(&id.server_key(server)).await {
                Some(port) => port,
                None => {
                    let port = self
                        .port_allocator
                        .allocate(server.port.unwrap_or(config.port), &excluded)?;
                    excluded.insert(port);
                    port
                }
            };
            servers.push(port);
        }
        Ok(AssignedPorts { primary, servers })
    }

    fn process_specs(
        &self,
        config: &DeploymentConfig,
        id: &DeploymentId,
        path: &Path,
        ports: &AssignedPorts,
    ) -> Vec<ProcessSpec> {
        let env = template::build_process_env(config, id, ports);
        let mut specs = vec![ProcessSpec {
            name: id.to_string(),
            script: config.start_file.clone(),
            args: config.args.clone(),
            cwd: path.to_path_buf(),
            env: env.clone(),
        }];
        for (server, port) in config.additional_servers.iter().zip(&ports.servers) {
            let Some(start_file) = &server.start_file else {
                continue;
            };
            let mut env = env.clone();
            env.insert("PORT".to_string(), port.to_string());
            specs.push(ProcessSpec {
                name: id.server_key(server),
                script: start_file.clone(),
                args: server.args.clone(),
                cwd: path.to_path_buf(),
                env,
            });
        }
        specs
    }

    /// Tear down processes, records and the working copy. Every step is
    /// attempted; an absent deployment is a no-op.
    pub async fn remove_deployment(&self, id: &DeploymentId, config: &DeploymentConfig) -> Result<()> {
        let server_keys: Vec<String> = config
            .additional_servers
            .iter()
            .map(|server| id.server_key(server))
            .collect();
        let path = self.working_copy_path(id);

        let mut keys = vec![id.status_key(), id.port_key().to_string()];
        keys.extend(server_keys.iter().cloned());

        let has_records = self.store.get_status(id).await.is_some() || {
            let mut any = false;
            for key in &keys[1..] {
                any |= self.store.get_port(key).await.is_some();
            }
            any
        };
        let has_working_copy = path_exists(&path).await;
        if !has_records && !has_working_copy {
            tracing::debug!(deploy_id = %id, "nothing to remove");
            return Ok(());
        }

        tracing::info!(deploy_id = %id, "removing deployment");
        let mut failures = Vec::new();
        for name in std::iter::once(id.as_str()).chain(server_keys.iter().map(String::as_str)) {
            if let Err(e) = self.supervisor.delete(name).await {
                failures.push(format!("delete process {name}: {e}"));
            }
        }
        if let Err(e) = self.store.delete_keys(&keys).await {
            failures.push(format!("delete records: {e}"));
        }
        if has_working_copy {
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                failures.push(format!("delete {}: {e}", path.display()));
            }
        }

        if failures.is_empty() {
            tracing::info!(deploy_id = %id, "deployment removed");
            Ok(())
        } else {
            Err(PreviewError::Removal {
                id: id.to_string(),
                reason: failures.join("; "),
            })
        }
    }

    /// Crash-recovery sweep: re-enqueue a DEPLOY for every deployment left
    /// BUILDING or REBUILDING. Returns the number of jobs enqueued.
    pub async fn check_status(&self, queue: &JobQueue, configs: &[DeploymentConfig]) -> Result<usize> {
        let mut resumed = 0;
        for (id, record) in self.store.statuses().await {
            if !record.status.is_in_progress() {
                continue;
            }
            let Some(config) = config_for_record(configs, &id, &record) else {
                tracing::warn!(
                    deploy_id = %id,
                    clone_url = %record.clone_url,
                    branch = %record.branch,
                    "no config for interrupted deployment, skipping"
                );
                continue;
            };
            tracing::info!(deploy_id = %id, status = record.status.as_str(), "resuming interrupted deployment");
            queue
                .enqueue(CommandType::Deploy, id, config.clone(), Some(record.revision()))
                .await?;
            resumed += 1;
        }
        Ok(resumed)
    }
}

#[async_trait]
impl JobExecutor for Deployer {
    async fn execute(&self, job: &Job) -> Result<()> {
        match job.command_type {
            CommandType::Deploy => {
                let revision = job.deploy_data.as_ref().ok_or_else(|| {
                    PreviewError::Provisioning(format!("deploy job for {} has no revision", job.deploy_id))
                })?;
                self.deploy(&job.config, &job.deploy_id, revision).await
            }
            CommandType::Remove => self.remove_deployment(&job.deploy_id, &job.config).await,
        }
    }
}

/// Prefer the config whose identity prefix produced `id`, then fall back to
/// normal repository/branch matching.
fn config_for_record<'a>(
    configs: &'a [DeploymentConfig],
    id: &DeploymentId,
    record: &StatusRecord,
) -> Option<&'a DeploymentConfig> {
    let repository = matcher::repository_from_clone_url(&record.clone_url)?;
    configs
        .iter()
        .filter(|config| config.repository == repository && produced(config, id))
        .max_by_key(|config| config.id_prefix().len())
        .or_else(|| matcher::resolve(configs, &repository, &record.branch).ok())
}

fn produced(config: &DeploymentConfig, id: &DeploymentId) -> bool {
    id.as_str()
        .strip_prefix(&config.id_prefix())
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|rest| ["pr-", "branch-", "tag-"].iter().any(|kind| rest.starts_with(kind)))
}

fn port_entries(config: &DeploymentConfig, id: &DeploymentId, ports: &AssignedPorts) -> Vec<(String, u16)> {
    let mut entries = vec![(id.port_key().to_string(), ports.primary)];
    for (server, port) in config.additional_servers.iter().zip(&ports.servers) {
        entries.push((id.server_key(server), *port));
    }
    entries
}

fn as_provisioning(e: PreviewError) -> PreviewError {
    match e {
        PreviewError::Provisioning(_) => e,
        other => PreviewError::Provisioning(other.to_string()),
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeploymentConfig {
        serde_json::from_value(serde_json::json!({
            "name": "app",
            "repository": "acme/app",
            "port": "4000:4010",
            "startFile": "server.js",
            "additionalServers": [
                { "subdomain": "api", "portEnv": "API_PORT", "startFile": "api.js" },
                { "subdomain": "assets", "portEnv": "ASSETS_PORT" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn port_entries_cover_servers() {
        let id = DeploymentId::from("app-pr-1");
        let ports = AssignedPorts {
            primary: 4000,
            servers: vec![4001, 4002],
        };
        assert_eq!(
            port_entries(&config(), &id, &ports),
            vec![
                ("app-pr-1".to_string(), 4000),
                ("app-pr-1~api".to_string(), 4001),
                ("app-pr-1~assets".to_string(), 4002),
            ]
        );
    }

    #[test]
    fn recovery_prefers_config_that_produced_the_identity() {
        let mut other = config();
        other.name = Some("app-legacy".into());
        let configs = vec![config(), other];
        let record = StatusRecord::new(
            DeploymentStatus::Building,
            &Revision {
                clone_url: "https://github.com/acme/app.git".into(),
                branch: "feature-x".into(),
                sha: "abc123".into(),
            },
        );
        let found = config_for_record(&configs, &"app-legacy-pr-3".into(), &record).unwrap();
        assert_eq!(found.display_name(), "app-legacy");
        let found = config_for_record(&configs, &"app-pr-3".into(), &record).unwrap();
        assert_eq!(found.display_name(), "app");
    }

    #[test]
    fn as_provisioning_wraps_adapter_errors() {
        assert!(matches!(
            as_provisioning(PreviewError::Git("bad".into())),
            PreviewError::Provisioning(m) if m.contains("bad")
        ));
    }
}
