pub mod deployment_table;
pub mod detail_panel;
pub mod dialog_help;
pub mod queue_panel;
pub mod status_bar;

use chrono::{DateTime, Utc};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::{App, Mode};

/// Rows taken by the detail panel, borders included.
const DETAIL_HEIGHT: u16 = 9;

/// Screen regions of the dashboard.
struct Areas {
    title: Rect,
    list: Rect,
    detail: Rect,
    queue: Rect,
    status: Rect,
}

impl Areas {
    fn split(area: Rect) -> Self {
        let [title, content, status] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(10),
            Constraint::Length(2),
        ])
        .areas(area);
        let [list, right] =
            Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
                .areas(content);
        let [detail, queue] =
            Layout::vertical([Constraint::Length(DETAIL_HEIGHT), Constraint::Min(4)]).areas(right);
        Self {
            title,
            list,
            detail,
            queue,
            status,
        }
    }
}

/// Top-level render dispatch. Pass `now` to pin timestamps for deterministic output,
/// or `None` to use the current time.
pub fn render(f: &mut Frame, app: &App, now: Option<DateTime<Utc>>) {
    let now = now.unwrap_or_else(Utc::now);
    let areas = Areas::split(f.area());

    render_title(f, areas.title, app);
    deployment_table::render(f, areas.list, app);
    detail_panel::render_with_now(f, areas.detail, app, now);
    queue_panel::render(f, areas.queue, app);
    status_bar::render(f, areas.status, app);

    if app.mode == Mode::HelpDialog {
        dialog_help::render(f);
    }
}

fn render_title(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(" Preview Deployments ", Style::default().fg(Color::Yellow)),
        Span::styled("(read-only)", Style::default().fg(Color::DarkGray)),
    ];
    if let Some(at) = app.last_refresh {
        spans.push(Span::styled(
            format!("  refreshed {} UTC", at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
