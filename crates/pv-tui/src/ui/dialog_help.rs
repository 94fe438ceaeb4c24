use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

pub fn render(f: &mut Frame) {
    let area = popup_area(f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Help: Keybindings ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let lines = vec![
        section_header("Deployments"),
        key_line("Up / k", "Select previous deployment"),
        key_line("Down / j", "Select next deployment"),
        key_line("r / R", "Re-read the record store"),
        key_line("?", "Show this help"),
        key_line("Q / Esc", "Quit"),
        Line::from(""),
        section_header("Icons"),
        key_line("▶", "Running"),
        key_line("◎", "Building or rebuilding"),
        key_line("⟳", "Job in flight"),
    ];

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

/// Middle 60% of the screen in both directions.
fn popup_area(area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Percentage(60)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Percentage(60)])
        .flex(Flex::Center)
        .areas(row);
    popup
}

fn section_header(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("  {title}"),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    ))
}

fn key_line(key: &str, desc: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("    {key:<12}"),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(desc.to_string(), Style::default().fg(Color::White)),
    ])
}
