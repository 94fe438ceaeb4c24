mod app;
mod event;
mod keys;
mod ui;

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use pv_core::services::store::RecordStore;

use crate::app::App;
use crate::event::{DashboardEvent, Events, REFRESH_INTERVAL};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args: Vec<String> = std::env::args().collect();
    let debug = args.iter().any(|a| a == "--debug");
    let state_dir = args
        .iter()
        .position(|a| a == "--state-dir")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".preview"));

    let _guard = if debug {
        Some(setup_debug_logging())
    } else {
        None
    };

    run_interactive(&state_dir).await
}

/// Configure file-based tracing to `.preview-tui-debug.log` in CWD.
/// Returns the guard that must be held alive for the duration of the program.
fn setup_debug_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", ".preview-tui-debug.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_ansi(false)
        .init();

    guard
}

async fn run_interactive(state_dir: &Path) -> color_eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    refresh(&mut app, state_dir).await;
    let mut events = Events::start(REFRESH_INTERVAL);

    loop {
        terminal.draw(|f| ui::render(f, &app, None))?;

        match events.next().await {
            Some(DashboardEvent::Key(key)) => keys::handle_key(&mut app, key),
            Some(DashboardEvent::Refresh) => refresh(&mut app, state_dir).await,
            Some(DashboardEvent::Resize) => {}
            None => break,
        }

        if std::mem::take(&mut app.refresh_requested) {
            refresh(&mut app, state_dir).await;
            app.set_status("Refreshed");
        }

        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

/// Re-read the persisted store. A failed read keeps the last good view.
async fn refresh(app: &mut App, state_dir: &Path) {
    match RecordStore::read_snapshot(state_dir).await {
        Ok(snapshot) => {
            app.apply_snapshot(&snapshot, Utc::now());
            if app
                .status_message
                .as_deref()
                .is_some_and(|m| m.starts_with("Error"))
            {
                app.status_message = None;
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to read record store");
            app.set_status(format!("Error reading {}: {e}", state_dir.display()));
        }
    }
}
