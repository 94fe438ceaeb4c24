use chrono::{DateTime, Utc};
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use pv_core::models::DeploymentStatus;

use crate::app::{App, DeploymentRow};

pub fn render_with_now(f: &mut Frame, area: Rect, app: &App, now: DateTime<Utc>) {
    let block = Block::default()
        .title(" Details ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let Some(row) = app.selected_deployment() else {
        let empty = Paragraph::new(" No deployment selected").block(block);
        f.render_widget(empty, area);
        return;
    };

    let lines = build_detail_lines(row, now);
    let paragraph = Paragraph::new(lines).block(block);
    f.render_widget(paragraph, area);
}

fn build_detail_lines(row: &DeploymentRow, now: DateTime<Utc>) -> Vec<Line<'static>> {
    let record = &row.record;
    let port = row
        .port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut lines = vec![
        detail_line("Id", row.id.as_str(), Color::White),
        detail_line("Status", record.status.as_str(), status_color(record.status)),
        detail_line("Branch", &record.branch, Color::White),
        detail_line("Sha", short_sha(&record.sha), Color::White),
        detail_line("Port", &port, Color::Cyan),
        detail_line("Clone URL", &record.clone_url, Color::DarkGray),
    ];

    if let Some(updated) = record.updated_at {
        let d = now.signed_duration_since(updated);
        lines.push(detail_line(
            "Updated",
            &format!("{} ago", format_duration(d)),
            Color::DarkGray,
        ));
    }

    lines
}

fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(7) {
        Some((end, _)) => &sha[..end],
        None => sha,
    }
}

fn format_duration(d: chrono::Duration) -> String {
    let total_secs = d.num_seconds().max(0);
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{hours}h {mins:02}m")
    } else if mins > 0 {
        format!("{mins}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

fn detail_line(label: &str, value: &str, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {label:<10} "),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(value.to_string(), Style::default().fg(color)),
    ])
}

fn status_color(status: DeploymentStatus) -> Color {
    match status {
        DeploymentStatus::Running => Color::Green,
        DeploymentStatus::Building | DeploymentStatus::Rebuilding => Color::Yellow,
    }
}
