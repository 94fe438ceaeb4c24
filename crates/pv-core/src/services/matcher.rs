use crate::error::{PreviewError, Result};
use crate::models::DeploymentConfig;

/// Pick the config for a repository/branch pair. A config matches when its
/// repository is equal, its branch filter (if any) equals the branch and its
/// blacklist (if any) does not contain the branch. With several matches the
/// first in list order wins.
pub fn resolve<'a>(
    configs: &'a [DeploymentConfig],
    repository: &str,
    branch: &str,
) -> Result<&'a DeploymentConfig> {
    let mut matching = configs.iter().filter(|config| {
        config.repository == repository
            && config.branch.as_deref().map_or(true, |b| b == branch)
            && !config
                .branch_black_list
                .as_ref()
                .is_some_and(|list| list.iter().any(|b| b == branch))
    });

    let first = matching.next().ok_or_else(|| PreviewError::ConfigResolution {
        repository: repository.to_string(),
        branch: branch.to_string(),
    })?;

    let others = matching.count();
    if others > 0 {
        tracing::warn!(
            repository,
            branch,
            matches = others + 1,
            selected = first.display_name(),
            "multiple matching configs, selecting first"
        );
    }
    Ok(first)
}

/// `https://github.com/acme/app.git` → `acme/app`. Used to re-derive the
/// config of a persisted status record.
pub fn repository_from_clone_url(clone_url: &str) -> Option<String> {
    let without_scheme = clone_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(clone_url);
    // Drop credentials and host; scp-style `git@host:owner/repo` uses ':'.
    let path = match without_scheme.split_once('/') {
        Some((host, path)) if !host.contains(':') || clone_url.contains("://") => path,
        _ => without_scheme.split_once(':').map(|(_, p)| p)?,
    };
    let repository = path.trim_end_matches('/').trim_end_matches(".git");
    if repository.is_empty() {
        None
    } else {
        Some(repository.to_string())
    }
}
