// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use chrono::{DateTime, Utc};

use pv_core::models::{DeploymentStatus, Revision, StatusRecord};
use pv_tui::app::{App, DeploymentRow};
use pv_tui::ui;
use ratatui::{backend::TestBackend, Terminal};

/// Render the app to a string using a TestBackend of the given dimensions.
pub fn render_to_string(app: &App, width: u16, height: u16) -> String {
    let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
    terminal.draw(|f| ui::render(f, app, None)).unwrap();
    terminal.backend().to_string()
}

/// Render the app with a fixed `now` for deterministic timestamps.
pub fn render_to_string_at(app: &App, width: u16, height: u16, now: DateTime<Utc>) -> String {
    let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
    terminal.draw(|f| ui::render(f, app, Some(now))).unwrap();
    terminal.backend().to_string()
}

pub fn revision(branch: &str, sha: &str) -> Revision {
    Revision {
        clone_url: "https://github.com/acme/app.git".into(),
        branch: branch.into(),
        sha: sha.into(),
    }
}

/// Build a row with the given identity, status, branch and port.
pub fn make_row(id: &str, status: DeploymentStatus, branch: &str, port: Option<u16>) -> DeploymentRow {
    DeploymentRow {
        id: id.into(),
        record: StatusRecord::new(status, &revision(branch, "0123456789abcdef")),
        port,
    }
}
