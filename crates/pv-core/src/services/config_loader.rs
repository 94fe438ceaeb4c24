use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{PreviewError, Result};
use crate::models::DeploymentConfig;

static SUBDOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap());

/// Load the ordered list of deployment configs from a YAML file.
pub fn load(config_path: &Path) -> Result<Vec<DeploymentConfig>> {
    if !config_path.exists() {
        return Err(PreviewError::ConfigNotFound(config_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(config_path)?;
    parse(&contents)
}

pub fn parse(contents: &str) -> Result<Vec<DeploymentConfig>> {
    let configs: Vec<DeploymentConfig> = serde_yaml::from_str(contents)
        .map_err(|e| PreviewError::InvalidConfig(e.to_string()))?;
    validate(&configs)?;
    Ok(configs)
}

fn validate(configs: &[DeploymentConfig]) -> Result<()> {
    if configs.is_empty() {
        return Err(PreviewError::InvalidConfig(
            "at least one deployment config is required".into(),
        ));
    }

    let mut prefixes = HashSet::new();
    for config in configs {
        let name = config.display_name();
        if config.repository.trim().is_empty() {
            return Err(PreviewError::InvalidConfig(format!(
                "config '{name}': repository field is required"
            )));
        }
        if config.start_file.trim().is_empty() {
            return Err(PreviewError::InvalidConfig(format!(
                "config '{name}': startFile field is required"
            )));
        }
        // Two configs sharing a prefix would derive colliding identities.
        if !prefixes.insert(config.id_prefix()) {
            return Err(PreviewError::InvalidConfig(format!(
                "config '{name}': name '{}' is already used by another config",
                config.id_prefix()
            )));
        }

        let mut subdomains = HashSet::new();
        for server in &config.additional_servers {
            if server.subdomain.trim().is_empty() || server.port_env.trim().is_empty() {
                return Err(PreviewError::InvalidConfig(format!(
                    "config '{name}': additional servers need subdomain and portEnv"
                )));
            }
            if !SUBDOMAIN_RE.is_match(&server.subdomain) {
                return Err(PreviewError::InvalidConfig(format!(
                    "config '{name}': subdomain '{}' must be a lowercase DNS label",
                    server.subdomain
                )));
            }
            if !subdomains.insert(server.subdomain.as_str()) {
                return Err(PreviewError::InvalidConfig(format!(
                    "config '{name}': duplicate additional server '{}'",
                    server.subdomain
                )));
            }
        }
    }
    Ok(())
}
