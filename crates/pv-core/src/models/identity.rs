use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{AdditionalServer, DeploymentConfig};

const STATUS_SUFFIX: &str = "-STATUS";

/// Joins an identity and an additional server's subdomain. Git ref names
/// cannot contain `~`, so a joined key never equals a deployment identity.
const SERVER_SEPARATOR: char = '~';

/// Stable key naming one logical preview target: a pull request, branch or
/// tag under one config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn for_pull_request(config: &DeploymentConfig, number: u64) -> Self {
        Self(format!("{}-pr-{number}", config.id_prefix()))
    }

    /// Accepts either a bare branch name or a full `refs/heads/...` ref.
    pub fn for_branch(config: &DeploymentConfig, branch: &str) -> Self {
        let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
        Self::from_ref_name(format!("{}-branch-{branch}", config.id_prefix()))
    }

    /// Accepts either a bare tag name or a full `refs/tags/...` ref.
    pub fn for_tag(config: &DeploymentConfig, tag: &str) -> Self {
        let tag = tag.strip_prefix("refs/tags/").unwrap_or(tag);
        Self::from_ref_name(format!("{}-tag-{tag}", config.id_prefix()))
    }

    /// A ref named `x-STATUS` would otherwise have its port key equal the
    /// status key of `x`.
    fn from_ref_name(mut id: String) -> Self {
        if id.ends_with(STATUS_SUFFIX) {
            id.push(SERVER_SEPARATOR);
        }
        Self(id)
    }

    /// Process name and port record key of an additional server.
    pub fn server_key(&self, server: &AdditionalServer) -> String {
        format!("{}{SERVER_SEPARATOR}{}", self.0, server.subdomain)
    }

    /// Identity rendered into an additional server's public host. Hosts are
    /// DNS labels, so this joins with `-` and is never used as a key.
    pub fn server_host_id(&self, server: &AdditionalServer) -> Self {
        Self(format!("{}-{}", self.0, server.subdomain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn status_key(&self) -> String {
        format!("{}{STATUS_SUFFIX}", self.0)
    }

    pub fn port_key(&self) -> &str {
        &self.0
    }

    pub fn from_status_key(key: &str) -> Option<Self> {
        key.strip_suffix(STATUS_SUFFIX)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
    }

    /// Single path component for this identity. Branch names may contain
    /// `/`, so `/` and `%` are percent-escaped; the mapping stays injective.
    pub fn path_segment(&self) -> String {
        let mut segment = String::with_capacity(self.0.len());
        for c in self.0.chars() {
            match c {
                '%' => segment.push_str("%25"),
                '/' => segment.push_str("%2F"),
                _ => segment.push(c),
            }
        }
        segment
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeploymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
