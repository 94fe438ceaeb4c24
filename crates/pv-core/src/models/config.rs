use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Static deployment configuration for one repository (optionally narrowed
/// to a branch). Loaded once at startup and snapshotted into every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_black_list: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub deploy_pull_request: bool,
    #[serde(default)]
    pub deploy_branches: bool,
    #[serde(default)]
    pub ignore_check: bool,
    /// Branches whose deployments are never removed by events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_branches: Vec<String>,
    pub port: PortSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<String>,
    pub start_file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "EnvTemplate::is_empty")]
    pub env: EnvTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_servers: Vec<AdditionalServer>,
}

fn default_true() -> bool {
    true
}

fn default_base_url_env() -> String {
    "BASE_URL".to_string()
}

impl DeploymentConfig {
    /// Display name: the explicit `name`, falling back to the repository.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.repository)
    }

    /// Identity prefix: the display name lowercased and made safe for
    /// filesystem paths and process names.
    pub fn id_prefix(&self) -> String {
        normalize_name(self.display_name())
    }

    pub fn is_static_branch(&self, branch: &str) -> bool {
        self.static_branches.iter().any(|b| b == branch)
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// A co-located server deployed alongside the main process. It gets its own
/// derived identity, port and environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalServer {
    pub subdomain: String,
    pub port_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url_env: Option<String>,
    /// Falls back to the parent config's port spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSpec>,
    /// When set, the server runs as its own supervised process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Port requirement: an exact port or an inclusive range to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortSpec", into = "String")]
pub enum PortSpec {
    Fixed(u16),
    Range { start: u16, end: u16 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPortSpec {
    Number(u16),
    Text(String),
}

impl TryFrom<RawPortSpec> for PortSpec {
    type Error = String;

    fn try_from(raw: RawPortSpec) -> Result<Self, Self::Error> {
        match raw {
            RawPortSpec::Number(0) => Err("port must be non-zero".into()),
            RawPortSpec::Number(port) => Ok(PortSpec::Fixed(port)),
            RawPortSpec::Text(text) => text.parse(),
        }
    }
}

impl FromStr for PortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_port = |v: &str| -> Result<u16, String> {
            match v.trim().parse::<u16>() {
                Ok(0) => Err("port must be non-zero".into()),
                Ok(p) => Ok(p),
                Err(_) => Err(format!("invalid port '{v}'")),
            }
        };
        match s.split_once(':') {
            Some((start, end)) => {
                let start = parse_port(start)?;
                let end = parse_port(end)?;
                if start > end {
                    return Err(format!("port range {start}:{end} is inverted"));
                }
                Ok(PortSpec::Range { start, end })
            }
            None => Ok(PortSpec::Fixed(parse_port(s)?)),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Fixed(port) => write!(f, "{port}"),
            PortSpec::Range { start, end } => write!(f, "{start}:{end}"),
        }
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}

impl PortSpec {
    pub fn contains(&self, port: u16) -> bool {
        match *self {
            PortSpec::Fixed(p) => p == port,
            PortSpec::Range { start, end } => (start..=end).contains(&port),
        }
    }
}

/// Environment variable templates, keyed by variable name. Values may
/// reference `{{PORT}}`, `{{ID}}` and `{{BASE_URL}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvTemplate(pub BTreeMap<String, String>);

impl EnvTemplate {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvTemplate {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
