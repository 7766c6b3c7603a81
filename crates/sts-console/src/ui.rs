//! UI rendering for the console

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
};

use crate::app::App;
use crate::status::ActionStatus;
use crate::widgets::{dim, render_alert};

const GLOBAL_KEYS: &str = "Tab/←→ switch  1-9 jump  F5 reload  q quit";

/// Main UI rendering function
pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_main(frame, app, chunks[1]);
    draw_footer(frame, app, chunks[2]);
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<String> = app.tabs.iter().map(|tab| tab.title()).collect();
    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" simple-test-server ")
                .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        )
        .select(app.selected_tab)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    frame.render_widget(tabs, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    match app.active_view() {
        Some(view) => view.render(frame, area),
        None => render_alert(frame, area, "No tab", "Nothing to show."),
    }
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    let status = match &app.tabs_status {
        ActionStatus::Pending => {
            Span::styled("Loading servers...", Style::default().fg(Color::Yellow))
        }
        ActionStatus::Failed(error) => Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ActionStatus::Idle | ActionStatus::Succeeded(_) => Span::styled(
            format!("{} servers", app.tabs.len().saturating_sub(1)),
            Style::default().fg(Color::Green),
        ),
    };
    let mut spans = vec![status];
    if let Some(at) = app.last_update {
        spans.push(Span::styled(format!("  updated {}", at.format("%H:%M:%S")), dim()));
    }

    let help = app.active_view().map(|view| view.help()).unwrap_or_default();
    let lines = vec![
        Line::from(spans),
        Line::from(vec![
            Span::raw(help),
            Span::styled(format!("  {GLOBAL_KEYS}"), dim()),
        ]),
    ];
    let footer = Paragraph::new(lines).block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, area);
}
