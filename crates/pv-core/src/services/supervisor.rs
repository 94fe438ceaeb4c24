use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

/// A long-running process as handed to a supervisor. `name` is the
/// supervisor-side handle and equals the deployment identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub name: String,
    pub script: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// Starts and stops named external processes.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn start(&self, spec: &ProcessSpec) -> Result<()>;

    /// May fail with `ProcessNotFound` when the supervisor has no such process.
    async fn stop(&self, name: &str) -> Result<()>;

    /// Restart with the environment in `spec`. May fail with
    /// `ProcessNotFound` when the supervisor has no such process.
    async fn restart(&self, spec: &ProcessSpec) -> Result<()>;

    /// Remove the process. A process that does not exist is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}
