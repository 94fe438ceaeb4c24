use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

use pv_core::models::DeploymentStatus;

use crate::app::App;

pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .deployments
        .iter()
        .map(|row| {
            let line = Line::from(vec![
                Span::raw(" "),
                status_icon(row.record.status),
                Span::raw(" "),
                Span::styled(row.id.as_str(), Style::default().fg(Color::White)),
                Span::raw("  "),
                Span::styled(
                    truncate_branch(&row.record.branch, 20),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
            ListItem::new(line)
        })
        .collect();

    let title = format!(" Deployments ({}) ", app.deployments.len());
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(0x1A, 0x3A, 0x5C))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.deployments.is_empty() {
        state.select(Some(app.selected_index));
    }

    f.render_stateful_widget(list, area, &mut state);
}

pub fn status_icon(status: DeploymentStatus) -> Span<'static> {
    match status {
        DeploymentStatus::Running => Span::styled("▶", Style::default().fg(Color::Green)),
        DeploymentStatus::Building | DeploymentStatus::Rebuilding => {
            Span::styled("◎", Style::default().fg(Color::Yellow))
        }
    }
}

fn truncate_branch(branch: &str, max_len: usize) -> String {
    if branch.chars().count() <= max_len {
        branch.to_string()
    } else {
        let truncated: String = branch.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}
