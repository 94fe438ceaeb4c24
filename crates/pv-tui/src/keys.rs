use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{App, Mode};

/// Handle a key event, dispatching based on current mode.
pub fn handle_key(app: &mut App, key: KeyEvent) {
    tracing::debug!(mode = ?app.mode, key = ?key.code, "handle_key");
    match app.mode {
        Mode::DeploymentList => handle_deployment_list(app, key),
        Mode::HelpDialog => handle_help_dialog(app, key),
    }
}

fn handle_deployment_list(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Char('r') | KeyCode::Char('R') => app.refresh_requested = true,
        KeyCode::Char('?') => app.mode = Mode::HelpDialog,
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => app.should_quit = true,
        _ => {}
    }
}

fn handle_help_dialog(app: &mut App, key: KeyEvent) {
    if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
        app.mode = Mode::DeploymentList;
    }
}
