use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PreviewError, Result};
use crate::services::supervisor::{ProcessSpec, ProcessSupervisor};

/// Supervisor backed by the `pm2` CLI.
pub struct Pm2Supervisor {
    program: String,
}

impl Pm2Supervisor {
    pub fn new() -> Self {
        Self {
            program: "pm2".to_string(),
        }
    }

    async fn run_pm2(
        &self,
        args: &[&str],
        working_directory: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).envs(env);
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| PreviewError::Supervisor(format!("failed to start pm2: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(PreviewError::Supervisor(format!(
                "pm2 {} failed (exit {}): {}",
                args.join(" "),
                output.status.code().unwrap_or(-1),
                if stderr.trim().is_empty() { stdout } else { stderr }
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for Pm2Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn start_args(spec: &ProcessSpec) -> Vec<&str> {
    let mut args = vec![
        "start",
        spec.script.as_str(),
        "--name",
        spec.name.as_str(),
    ];
    if let Some(cwd) = spec.cwd.to_str() {
        args.extend_from_slice(&["--cwd", cwd]);
    }
    if !spec.args.is_empty() {
        args.push("--");
        args.extend(spec.args.iter().map(String::as_str));
    }
    args
}

fn is_not_found(message: &str) -> bool {
    message.contains("not found")
}

fn missing_as_not_found<T>(name: &str, result: Result<T>) -> Result<T> {
    match result {
        Err(PreviewError::Supervisor(message)) if is_not_found(&message) => {
            Err(PreviewError::ProcessNotFound(name.to_string()))
        }
        other => other,
    }
}

#[async_trait]
impl ProcessSupervisor for Pm2Supervisor {
    async fn start(&self, spec: &ProcessSpec) -> Result<()> {
        tracing::info!(name = %spec.name, script = %spec.script, "pm2 start");
        self.run_pm2(&start_args(spec), Some(&spec.cwd), &spec.env)
            .await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        tracing::info!(name, "pm2 stop");
        let result = self.run_pm2(&["stop", name], None, &BTreeMap::new()).await;
        missing_as_not_found(name, result)?;
        Ok(())
    }

    async fn restart(&self, spec: &ProcessSpec) -> Result<()> {
        tracing::info!(name = %spec.name, "pm2 restart");
        let result = self
            .run_pm2(
                &["restart", &spec.name, "--update-env"],
                Some(&spec.cwd),
                &spec.env,
            )
            .await;
        missing_as_not_found(&spec.name, result)?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.run_pm2(&["delete", name], None, &BTreeMap::new()).await {
            Ok(_) => Ok(()),
            Err(PreviewError::Supervisor(message)) if is_not_found(&message) => {
                tracing::debug!(name, "pm2 process already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
