use chrono::{DateTime, Utc};

use pv_core::models::{DeploymentId, Job, StatusRecord};
use pv_core::services::store::StoreSnapshot;

/// The active mode determines which UI is shown and how keys are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DeploymentList,
    HelpDialog,
}

/// One deployment as shown in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRow {
    pub id: DeploymentId,
    pub record: StatusRecord,
    pub port: Option<u16>,
}

/// Top-level application state. Read-only view over the record store.
pub struct App {
    pub mode: Mode,
    pub deployments: Vec<DeploymentRow>,
    pub queue: Vec<Job>,
    pub selected_index: usize,
    pub should_quit: bool,
    /// Set by the `r` key; consumed by the main loop.
    pub refresh_requested: bool,
    pub status_message: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            mode: Mode::DeploymentList,
            deployments: Vec::new(),
            queue: Vec::new(),
            selected_index: 0,
            should_quit: false,
            refresh_requested: false,
            status_message: None,
            last_refresh: None,
        }
    }

    /// Replace the displayed state. The selection follows the previously
    /// selected identity when it still exists.
    pub fn apply_snapshot(&mut self, snapshot: &StoreSnapshot, at: DateTime<Utc>) {
        let selected = self.selected_deployment().map(|row| row.id.clone());

        let mut deployments: Vec<DeploymentRow> = snapshot
            .statuses()
            .into_iter()
            .map(|(id, record)| DeploymentRow {
                port: snapshot.port(&id),
                id,
                record,
            })
            .collect();
        deployments.sort_by(|a, b| a.id.cmp(&b.id));

        self.selected_index = selected
            .and_then(|id| deployments.iter().position(|row| row.id == id))
            .unwrap_or(self.selected_index)
            .min(deployments.len().saturating_sub(1));
        self.deployments = deployments;
        self.queue = snapshot.jobs();
        self.last_refresh = Some(at);
    }

    pub fn selected_deployment(&self) -> Option<&DeploymentRow> {
        self.deployments.get(self.selected_index)
    }

    pub fn select_next(&mut self) {
        if !self.deployments.is_empty() {
            self.selected_index = (self.selected_index + 1) % self.deployments.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.deployments.is_empty() {
            if self.selected_index == 0 {
                self.selected_index = self.deployments.len() - 1;
            } else {
                self.selected_index -= 1;
            }
        }
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
    }
}
