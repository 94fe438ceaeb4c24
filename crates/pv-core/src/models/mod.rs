pub mod config;
pub mod identity;
pub mod job;
pub mod status;
pub mod webhook;

pub use config::{AdditionalServer, DeploymentConfig, EnvTemplate, PortSpec};
pub use identity::DeploymentId;
pub use job::{CommandType, Job, Revision};
pub use status::{DeploymentStatus, StatusRecord};
pub use webhook::WebhookEvent;
