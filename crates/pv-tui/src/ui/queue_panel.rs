use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::Frame;

use pv_core::models::CommandType;

use crate::app::App;

pub fn render(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(format!(" Queue ({}) ", app.queue.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    if app.queue.is_empty() {
        let empty = Paragraph::new(Span::styled(
            " Queue is empty",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .queue
        .iter()
        .enumerate()
        .map(|(i, job)| {
            // The head stays in the queue until the consumer finishes it.
            let marker = if i == 0 {
                Span::styled(
                    "⟳ ",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Span::styled(format!("{i} "), Style::default().fg(Color::DarkGray))
            };
            let mut spans = vec![
                Span::raw(" "),
                marker,
                command_span(job.command_type),
                Span::raw(" "),
                Span::styled(job.deploy_id.to_string(), Style::default().fg(Color::White)),
            ];
            if i == 0 {
                spans.push(Span::styled(
                    "  (in flight)",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

fn command_span(command: CommandType) -> Span<'static> {
    match command {
        CommandType::Deploy => Span::styled("DEPLOY", Style::default().fg(Color::Green)),
        CommandType::Remove => Span::styled("REMOVE", Style::default().fg(Color::Red)),
    }
}
