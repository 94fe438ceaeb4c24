use std::path::Path;

use tokio::process::Command;

use crate::error::{PreviewError, Result};

const STDERR_TAIL_LINES: usize = 20;

/// Run pre-start commands in order inside `working_directory`. The first
/// failing command aborts the rest.
pub async fn run_commands(commands: &[String], working_directory: &Path) -> Result<()> {
    for command in commands {
        tracing::info!(command = %command, cwd = %working_directory.display(), "running pre-start command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_directory)
            .output()
            .await
            .map_err(|e| PreviewError::Provisioning(format!("failed to run '{command}': {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PreviewError::Provisioning(format!(
                "'{command}' failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                tail(&stderr, STDERR_TAIL_LINES)
            )));
        }
    }
    Ok(())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
