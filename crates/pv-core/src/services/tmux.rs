use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PreviewError, Result};
use crate::services::supervisor::{ProcessSpec, ProcessSupervisor};

/// Supervisor that runs each process in its own detached tmux session.
pub struct TmuxSupervisor {
    interpreter: Option<String>,
}

impl TmuxSupervisor {
    pub fn new() -> Self {
        Self { interpreter: None }
    }

    /// Prefix every script with an interpreter, e.g. `node`.
    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: Some(interpreter.into()),
        }
    }

    fn command_line(&self, spec: &ProcessSpec) -> String {
        self.interpreter
            .iter()
            .chain(std::iter::once(&spec.script))
            .chain(spec.args.iter())
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn new_session_args(&self, spec: &ProcessSpec) -> Vec<String> {
        let mut args = vec![
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            session_name(&spec.name),
            "-c".to_string(),
            spec.cwd.to_string_lossy().into_owned(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.command_line(spec));
        args
    }
}

impl Default for TmuxSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_tmux(arguments: &[&str]) -> Result<String> {
    let output = Command::new("tmux")
        .args(arguments)
        .output()
        .await
        .map_err(|e| PreviewError::Supervisor(format!("failed to start tmux: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PreviewError::Supervisor(format!(
            "tmux {} failed (exit {}): {stderr}",
            arguments.first().unwrap_or(&""),
            output.status.code().unwrap_or(-1)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn has_session(name: &str) -> Result<bool> {
    let target = format!("={name}");
    let result = Command::new("tmux")
        .args(["has-session", "-t", &target])
        .output()
        .await
        .map_err(|e| PreviewError::Supervisor(format!("failed to start tmux: {e}")))?;
    Ok(result.status.success())
}

async fn kill_session_if_present(name: &str) -> Result<()> {
    if has_session(name).await? {
        let target = format!("={name}");
        run_tmux(&["kill-session", "-t", &target]).await?;
    }
    Ok(())
}

/// tmux rewrites `.` and `:` in session names.
fn session_name(name: &str) -> String {
    name.replace(['.', ':'], "_")
}

fn shell_quote(part: &str) -> String {
    if !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

#[async_trait]
impl ProcessSupervisor for TmuxSupervisor {
    async fn start(&self, spec: &ProcessSpec) -> Result<()> {
        tracing::info!(name = %spec.name, script = %spec.script, "tmux start");
        let args = self.new_session_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_tmux(&args).await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        tracing::info!(name, "tmux stop");
        kill_session_if_present(&session_name(name)).await
    }

    async fn restart(&self, spec: &ProcessSpec) -> Result<()> {
        kill_session_if_present(&session_name(&spec.name)).await?;
        self.start(spec).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        kill_session_if_present(&session_name(name)).await
    }
}
