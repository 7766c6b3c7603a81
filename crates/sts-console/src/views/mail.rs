//! Mail server tab: captured mails and logs.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use sts_client::{MailData, ServerType};
use tracing::debug;

use super::{TabView, ViewAction};
use crate::data::{Ctx, ViewUpdate};
use crate::format;
use crate::status::ActionStatus;
use crate::widgets::{LogsPanel, Sections, ServerInfo, dim, selected_style, window_start};

const INFO: usize = 0;
const MAILBOX: usize = 1;
const LOGS: usize = 2;

/// Mailbox of a mail server.
#[derive(Debug)]
pub struct MailView {
    id: String,
    info: ServerInfo,
    sections: Sections,
    mails: Vec<MailData>,
    selected: usize,
    status: ActionStatus,
    logs: LogsPanel,
}

impl MailView {
    /// View for mail server `id`.
    pub fn new(id: &str, log_tail: u32) -> Self {
        Self {
            id: id.to_string(),
            info: ServerInfo::new(id),
            sections: Sections::new(&["Container Information", "Mailbox", "Logs"])
                .closed(LOGS)
                .focused(MAILBOX),
            mails: Vec::new(),
            selected: 0,
            status: ActionStatus::Idle,
            logs: LogsPanel::new(ServerType::Mail, id, log_tail),
        }
    }

    /// Loaded mails.
    pub fn mails(&self) -> &[MailData] {
        &self.mails
    }

    /// Mail under the cursor.
    pub fn selected_mail(&self) -> Option<&MailData> {
        self.mails.get(self.selected)
    }

    fn reload(&mut self, ctx: &Ctx) {
        self.status.start();
        let client = ctx.client().clone();
        let id = self.id.clone();
        ctx.spawn(async move { ViewUpdate::Mails(client.mail_messages(&id).await) });
    }

    fn render_mailbox(&self, frame: &mut Frame, area: Rect) {
        if let ActionStatus::Failed(message) = &self.status {
            frame.render_widget(
                Paragraph::new(Span::styled(message.clone(), Style::default().fg(Color::Red))),
                area,
            );
            return;
        }
        if self.mails.is_empty() {
            let text = if self.status.is_pending() {
                "Loading..."
            } else {
                "No mails received yet"
            };
            frame.render_widget(Paragraph::new(Span::styled(text, dim())), area);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(area);

        let height = chunks[0].height as usize / 2;
        let start = window_start(self.selected, height);
        let focused = self.sections.focus() == MAILBOX;
        let lines: Vec<Line> = self
            .mails
            .iter()
            .enumerate()
            .skip(start)
            .take(height)
            .flat_map(|(index, mail)| {
                let style = if focused && index == self.selected {
                    selected_style()
                } else {
                    Style::default()
                };
                [
                    Line::from(Span::styled(
                        mail.subject().to_string(),
                        style.add_modifier(Modifier::BOLD),
                    )),
                    Line::from(Span::styled(
                        format!("  {}  {}", mail.from, format::local_time(&mail.created)),
                        if focused && index == self.selected { style } else { dim() },
                    )),
                ]
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), chunks[0]);

        if let Some(mail) = self.selected_mail() {
            let label =
                |text: &str| Span::styled(format!("{text:<9}"), Style::default().fg(Color::Cyan));
            let mut lines = vec![
                Line::from(vec![label("Subject"), Span::raw(mail.subject().to_string())]),
                Line::from(vec![label("From"), Span::raw(mail.from.to_string())]),
                Line::from(vec![label("To"), Span::raw(mail.recipients())]),
                Line::from(vec![label("Date"), Span::raw(format::local_time(&mail.created))]),
                Line::from(vec![
                    label("Size"),
                    Span::raw(format::format_bytes(mail.content.size, 2)),
                ]),
                Line::default(),
            ];
            lines.extend(mail.content.body.lines().map(|l| Line::from(l.to_string())));
            frame.render_widget(
                Paragraph::new(lines)
                    .wrap(Wrap { trim: false })
                    .block(Block::default().borders(Borders::LEFT)),
                chunks[1],
            );
        }
    }
}

impl TabView for MailView {
    fn mount(&mut self, ctx: &Ctx) {
        self.info.load(ctx);
        self.reload(ctx);
        self.logs.refresh(ctx);
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        self.sections.render(frame, area, |frame, index, inner| match index {
            INFO => self.info.render(frame, inner),
            MAILBOX => self.render_mailbox(frame, inner),
            LOGS => self.logs.render(frame, inner),
            _ => {}
        });
    }

    fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> ViewAction {
        if self.sections.handle_key(key) {
            return ViewAction::Consumed;
        }
        if self.sections.focused_open(LOGS) && self.logs.handle_key(key, ctx) {
            return ViewAction::Consumed;
        }
        let mailbox_focused = self.sections.focused_open(MAILBOX);
        match key.code {
            KeyCode::Char('s') => self.info.stop(ctx),
            KeyCode::Char('r') => self.reload(ctx),
            KeyCode::Up | KeyCode::Char('k') if mailbox_focused => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') if mailbox_focused => {
                if self.selected + 1 < self.mails.len() {
                    self.selected += 1;
                }
            }
            _ => return ViewAction::None,
        }
        ViewAction::Consumed
    }

    fn apply(&mut self, update: ViewUpdate, _ctx: &Ctx) -> ViewAction {
        match update {
            ViewUpdate::Container(result) => self.info.apply_container(result),
            ViewUpdate::Stopped(result) => return self.info.apply_stopped(result),
            ViewUpdate::Logs { request, result } => self.logs.apply(request, result),
            ViewUpdate::Mails(Ok(mails)) => {
                self.status.succeed(None);
                self.selected = self.selected.min(mails.len().saturating_sub(1));
                self.mails = mails;
            }
            ViewUpdate::Mails(Err(e)) => {
                self.status.fail(format!("Failed to load mails: {e}"));
            }
            other => debug!(?other, "Ignoring update"),
        }
        ViewAction::None
    }

    fn help(&self) -> &'static str {
        "[/] section  o open/close  ↑/↓ select  r reload  s stop"
    }
}
