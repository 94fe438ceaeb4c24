//! Rendering of env and host templates for a deployment.

use std::collections::BTreeMap;

use crate::models::{DeploymentConfig, DeploymentId};
use crate::services::ports::AssignedPorts;

const PORT_PLACEHOLDER: &str = "{{PORT}}";
const ID_PLACEHOLDER: &str = "{{ID}}";
const BASE_URL_PLACEHOLDER: &str = "{{BASE_URL}}";

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub id: &'a DeploymentId,
    pub port: u16,
    pub base_url: &'a str,
}

pub fn render(template: &str, ctx: &RenderContext<'_>) -> String {
    template
        .replace(PORT_PLACEHOLDER, &ctx.port.to_string())
        .replace(ID_PLACEHOLDER, ctx.id.as_str())
        .replace(BASE_URL_PLACEHOLDER, ctx.base_url)
}

/// Host for an identity. `{{ID}}` is substituted; a template without the
/// placeholder gets the identity prepended as its left-most label.
pub fn render_host(host_template: &str, id: &DeploymentId) -> String {
    if host_template.contains(ID_PLACEHOLDER) {
        host_template.replace(ID_PLACEHOLDER, id.as_str())
    } else {
        format!("{id}.{}", host_template.trim_start_matches('.'))
    }
}

/// Public URL of an identity. Without a host template the process is only
/// reachable on localhost.
pub fn base_url(config: &DeploymentConfig, id: &DeploymentId, port: u16) -> String {
    match config.host.as_deref() {
        Some(host) => format!("https://{}", render_host(host, id)),
        None => format!("http://localhost:{port}"),
    }
}

/// Full environment for the main process of a deployment: the rendered
/// template, then `PORT`, then the base URL, then every additional server's
/// port and base URL. Later entries win.
pub fn build_process_env(
    config: &DeploymentConfig,
    id: &DeploymentId,
    ports: &AssignedPorts,
) -> BTreeMap<String, String> {
    let base_url = base_url(config, id, ports.primary);
    let ctx = RenderContext {
        id,
        port: ports.primary,
        base_url: &base_url,
    };

    let mut env: BTreeMap<String, String> = config
        .env
        .iter()
        .map(|(key, value)| (key.clone(), render(value, &ctx)))
        .collect();
    env.insert("PORT".to_string(), ports.primary.to_string());
    env.insert(config.base_url_env.clone(), base_url.clone());

    for (server, port) in config.additional_servers.iter().zip(&ports.servers) {
        env.insert(server.port_env.clone(), port.to_string());
        if let Some(base_url_env) = &server.base_url_env {
            let server_id = id.server_host_id(server);
            env.insert(base_url_env.clone(), self::base_url(config, &server_id, *port));
        }
    }
    env
}
