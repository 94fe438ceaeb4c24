use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, TcpListener};

use crate::error::{PreviewError, Result};
use crate::models::{DeploymentConfig, PortSpec};

/// Ports chosen for one deployment: the primary process plus one per
/// additional server, in config order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedPorts {
    pub primary: u16,
    pub servers: Vec<u16>,
}

impl AssignedPorts {
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::once(self.primary).chain(self.servers.iter().copied())
    }
}

/// Picks verified-free TCP ports. Every candidate is checked with a real
/// bind/release on the bind address.
pub struct PortAllocator {
    bind_address: IpAddr,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn with_bind_address(bind_address: IpAddr) -> Self {
        Self { bind_address }
    }

    /// A fixed port must be free and not excluded. A range yields its
    /// lowest port that is neither excluded nor bound.
    pub fn allocate(&self, spec: PortSpec, excluded: &HashSet<u16>) -> Result<u16> {
        match spec {
            PortSpec::Fixed(port) => {
                if excluded.contains(&port) {
                    return Err(PreviewError::PortAllocation(format!(
                        "fixed port {port} is already assigned to another deployment"
                    )));
                }
                if !self.is_free(port) {
                    return Err(PreviewError::PortAllocation(format!(
                        "fixed port {port} is already in use"
                    )));
                }
                Ok(port)
            }
            PortSpec::Range { start, end } => (start..=end)
                .filter(|port| !excluded.contains(port))
                .find(|&port| self.is_free(port))
                .ok_or_else(|| {
                    PreviewError::PortAllocation(format!("no free port in range {start}:{end}"))
                }),
        }
    }

    /// Allocate the primary port and one port per additional server. Each
    /// choice is excluded from the ones after it.
    pub fn allocate_all(
        &self,
        config: &DeploymentConfig,
        excluded: &HashSet<u16>,
    ) -> Result<AssignedPorts> {
        let mut excluded = excluded.clone();
        let primary = self.allocate(config.port, &excluded).map_err(|e| {
            PreviewError::PortAllocation(format!("config '{}': {e}", config.display_name()))
        })?;
        excluded.insert(primary);

        let mut servers = Vec::with_capacity(config.additional_servers.len());
        for server in &config.additional_servers {
            let spec = server.port.unwrap_or(config.port);
            let port = self.allocate(spec, &excluded).map_err(|e| {
                PreviewError::PortAllocation(format!(
                    "config '{}', server '{}': {e}",
                    config.display_name(),
                    server.subdomain
                ))
            })?;
            excluded.insert(port);
            servers.push(port);
        }
        Ok(AssignedPorts { primary, servers })
    }

    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind((self.bind_address, port)).is_ok()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}
