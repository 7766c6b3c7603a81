//! Building blocks shared by the protocol views.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};
use sts_client::{ClientError, Container, LogResponse, ServerType};
use tracing::{debug, info};

use crate::data::{Ctx, ViewUpdate};
use crate::format;
use crate::status::ActionStatus;
use crate::views::ViewAction;

/// Tail sizes the logs panel cycles through.
pub const TAIL_OPTIONS: [u32; 4] = [50, 200, 500, 2000];

/// Style of the highlighted row in lists.
pub fn selected_style() -> Style {
    Style::default().fg(Color::Black).bg(Color::Cyan)
}

/// Style for secondary text.
pub fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

/// First row to draw so that `cursor` stays inside a window of `height` rows.
pub const fn window_start(cursor: usize, height: usize) -> usize {
    if height == 0 || cursor < height {
        0
    } else {
        cursor + 1 - height
    }
}

// ============================================================================
// Accordion sections
// ============================================================================

#[derive(Debug, Clone)]
struct Section {
    title: String,
    open: bool,
}

/// Vertically stacked, collapsible sections with one focused section.
///
/// `[`/`]` move the focus, `o` opens or closes the focused section.
#[derive(Debug, Clone)]
pub struct Sections {
    sections: Vec<Section>,
    focus: usize,
}

impl Sections {
    /// All sections open, first one focused.
    pub fn new(titles: &[&str]) -> Self {
        Self {
            sections: titles
                .iter()
                .map(|title| Section {
                    title: (*title).to_string(),
                    open: true,
                })
                .collect(),
            focus: 0,
        }
    }

    /// Start with section `index` collapsed.
    #[must_use]
    pub fn closed(mut self, index: usize) -> Self {
        if let Some(section) = self.sections.get_mut(index) {
            section.open = false;
        }
        self
    }

    /// Start with section `index` focused.
    #[must_use]
    pub fn focused(mut self, index: usize) -> Self {
        if index < self.sections.len() {
            self.focus = index;
        }
        self
    }

    /// Index of the focused section.
    pub const fn focus(&self) -> usize {
        self.focus
    }

    /// Whether section `index` is open.
    pub fn is_open(&self, index: usize) -> bool {
        self.sections.get(index).is_some_and(|s| s.open)
    }

    /// Whether the focused section is open, i.e. its content takes keys.
    pub fn focused_open(&self, index: usize) -> bool {
        self.focus == index && self.is_open(index)
    }

    /// Handle section navigation keys. Returns whether the key was used.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let count = self.sections.len();
        if count == 0 {
            return false;
        }
        match key.code {
            KeyCode::Char(']') => self.focus = (self.focus + 1) % count,
            KeyCode::Char('[') => self.focus = (self.focus + count - 1) % count,
            KeyCode::Char('o') => {
                if let Some(section) = self.sections.get_mut(self.focus) {
                    section.open = !section.open;
                }
            }
            _ => return false,
        }
        true
    }

    /// Draw the sections, handing each open section's inner area to `body`.
    pub fn render(
        &self,
        frame: &mut Frame,
        area: Rect,
        mut body: impl FnMut(&mut Frame, usize, Rect),
    ) {
        let constraints: Vec<Constraint> = self
            .sections
            .iter()
            .map(|s| if s.open { Constraint::Fill(1) } else { Constraint::Length(1) })
            .collect();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        for (index, (section, chunk)) in self.sections.iter().zip(chunks.iter()).enumerate() {
            let style = if index == self.focus {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Cyan)
            };
            if section.open {
                let block = Block::default()
                    .borders(Borders::ALL)
                    .border_style(if index == self.focus { style } else { Style::default() })
                    .title(format!(" ▼ {} ", section.title))
                    .title_style(style);
                let inner = block.inner(*chunk);
                frame.render_widget(block, *chunk);
                body(frame, index, inner);
            } else {
                let line = Line::from(Span::styled(format!(" ▶ {}", section.title), style));
                frame.render_widget(Paragraph::new(line), *chunk);
            }
        }
    }
}

// ============================================================================
// Text input
// ============================================================================

/// What a key did to a [`TextInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// The input is not being edited.
    Ignored,
    /// Still editing.
    Editing,
    /// Enter pressed; editing ended.
    Submitted,
    /// Escape pressed; the previous value was restored.
    Cancelled,
}

/// Single-line text field.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    value: String,
    backup: String,
    editing: bool,
}

impl TextInput {
    /// Field holding `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Current text.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replace the text.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Whether the field is being edited.
    pub const fn is_editing(&self) -> bool {
        self.editing
    }

    /// Start editing.
    pub fn begin(&mut self) {
        self.backup = self.value.clone();
        self.editing = true;
    }

    /// Feed a key while editing.
    pub fn handle_key(&mut self, key: KeyEvent) -> InputOutcome {
        if !self.editing {
            return InputOutcome::Ignored;
        }
        match key.code {
            KeyCode::Enter => {
                self.editing = false;
                return InputOutcome::Submitted;
            }
            KeyCode::Esc => {
                self.value = std::mem::take(&mut self.backup);
                self.editing = false;
                return InputOutcome::Cancelled;
            }
            KeyCode::Backspace => {
                self.value.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.value.push(c);
            }
            _ => {}
        }
        InputOutcome::Editing
    }

    /// `label: value` line, with a cursor while editing.
    pub fn line(&self, label: &str, focused: bool) -> Line<'static> {
        let label_style = if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let value_style = if self.editing {
            Style::default().add_modifier(Modifier::UNDERLINED)
        } else {
            Style::default()
        };
        let mut spans = vec![
            Span::styled(format!("{label}: "), label_style),
            Span::styled(self.value.clone(), value_style),
        ];
        if self.editing {
            spans.push(Span::styled("█", Style::default().fg(Color::Yellow)));
        }
        Line::from(spans)
    }
}

// ============================================================================
// Server information
// ============================================================================

/// Container details with a stop action.
#[derive(Debug)]
pub struct ServerInfo {
    id: String,
    container: Option<Container>,
    load: ActionStatus,
    stop: ActionStatus,
}

impl ServerInfo {
    /// Panel for container `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            container: None,
            load: ActionStatus::Idle,
            stop: ActionStatus::Idle,
        }
    }

    /// Loaded container details.
    pub const fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    /// Fetch the container details.
    pub fn load(&mut self, ctx: &Ctx) {
        self.load.start();
        let client = ctx.client().clone();
        let id = self.id.clone();
        ctx.spawn(async move { ViewUpdate::Container(client.get_container(&id).await) });
    }

    /// Stop (delete) the server. Ignored while a stop is pending.
    pub fn stop(&mut self, ctx: &Ctx) {
        if self.stop.is_pending() {
            return;
        }
        info!(id = %self.id, "Stopping server");
        self.stop.start();
        let client = ctx.client().clone();
        let id = self.id.clone();
        ctx.spawn(async move { ViewUpdate::Stopped(client.delete_container(&id).await) });
    }

    /// Store loaded details.
    pub fn apply_container(&mut self, result: Result<Container, ClientError>) {
        match result {
            Ok(container) => {
                self.load.succeed(None);
                self.container = Some(container);
            }
            Err(e) => {
                self.load.fail(e.to_string());
            }
        }
    }

    /// Record the stop outcome. Tabs are reloaded either way.
    pub fn apply_stopped(&mut self, result: Result<(), ClientError>) -> ViewAction {
        match result {
            Ok(()) => {
                self.stop.succeed(Some("Server stopped".into()));
            }
            Err(e) => {
                self.stop.fail(format!("Failed to stop server: {e}"));
            }
        }
        ViewAction::ReloadTabs
    }

    /// Draw the details.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let mut lines = Vec::new();
        match (&self.container, &self.load) {
            (Some(c), _) => {
                let label = |text: &str| {
                    Span::styled(format!("{text:<10}"), Style::default().fg(Color::Cyan))
                };
                lines.push(Line::from(vec![label("Name"), Span::raw(c.name.clone())]));
                lines.push(Line::from(vec![label("ID"), Span::raw(c.container_id.clone())]));
                lines.push(Line::from(vec![label("Type"), Span::raw(c.server_type.label())]));
                lines.push(Line::from(vec![label("Image"), Span::raw(c.image.clone())]));
                let created = c.created().map_or_else(|| "-".to_string(), format::local_datetime);
                lines.push(Line::from(vec![label("Created"), Span::raw(created)]));
                let ports = c
                    .ports
                    .iter()
                    .map(|(host, container)| format!("{host} → {container}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(Line::from(vec![label("Ports"), Span::raw(ports)]));
                if !c.env.is_empty() {
                    let env = c
                        .env
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    lines.push(Line::from(vec![label("Env"), Span::raw(env)]));
                }
                if !c.networks.is_empty() {
                    lines.push(Line::from(vec![
                        label("Networks"),
                        Span::raw(c.networks.join(", ")),
                    ]));
                }
            }
            (None, ActionStatus::Failed(message)) => {
                lines.push(Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(Color::Red),
                )));
            }
            (None, _) => lines.push(Line::from(Span::styled("Loading...", dim()))),
        }

        lines.push(Line::default());
        let stop = match &self.stop {
            ActionStatus::Pending => {
                Span::styled("Stopping...", Style::default().fg(Color::Yellow))
            }
            ActionStatus::Failed(message) => {
                Span::styled(message.clone(), Style::default().fg(Color::Red))
            }
            ActionStatus::Succeeded(message) => Span::styled(
                message.clone().unwrap_or_default(),
                Style::default().fg(Color::Green),
            ),
            ActionStatus::Idle => Span::styled("s: stop server", dim()),
        };
        lines.push(Line::from(stop));

        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
    }
}

// ============================================================================
// Logs
// ============================================================================

/// Container log tail with a selectable size.
#[derive(Debug)]
pub struct LogsPanel {
    server_type: ServerType,
    server_id: String,
    tail: u32,
    response: Option<LogResponse>,
    status: ActionStatus,
    request: u64,
}

impl LogsPanel {
    /// Panel tailing `tail` lines.
    pub fn new(server_type: ServerType, server_id: impl Into<String>, tail: u32) -> Self {
        Self {
            server_type,
            server_id: server_id.into(),
            tail: tail.max(1),
            response: None,
            status: ActionStatus::Idle,
            request: 0,
        }
    }

    /// Current tail size.
    pub const fn tail(&self) -> u32 {
        self.tail
    }

    /// Latest response.
    pub const fn response(&self) -> Option<&LogResponse> {
        self.response.as_ref()
    }

    /// Fetch the logs. Responses to earlier requests are ignored from now on.
    pub fn refresh(&mut self, ctx: &Ctx) {
        self.status.start();
        self.request += 1;
        let request = self.request;
        let client = ctx.client().clone();
        let (server_type, id, tail) = (self.server_type, self.server_id.clone(), self.tail);
        ctx.spawn(async move {
            let result = client.logs(server_type, &id, tail).await;
            ViewUpdate::Logs { request, result }
        });
    }

    /// Store the response to `request` if it is the latest one.
    pub fn apply(&mut self, request: u64, result: Result<LogResponse, ClientError>) {
        if request != self.request {
            debug!(request, latest = self.request, "Dropping superseded log response");
            return;
        }
        match result {
            Ok(response) => {
                self.status.succeed(None);
                self.response = Some(response);
            }
            Err(e) => {
                self.status.fail(e.to_string());
            }
        }
    }

    /// `+`/`-` change the tail size, `l` reloads.
    pub fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> bool {
        match key.code {
            KeyCode::Char('+') => {
                self.tail = TAIL_OPTIONS.into_iter().find(|t| *t > self.tail).unwrap_or(self.tail);
            }
            KeyCode::Char('-') => {
                self.tail = TAIL_OPTIONS
                    .into_iter()
                    .rev()
                    .find(|t| *t < self.tail)
                    .unwrap_or(self.tail);
            }
            KeyCode::Char('l') => {}
            _ => return false,
        }
        self.refresh(ctx);
        true
    }

    /// Draw the newest lines that fit.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let mut header = vec![Span::styled(format!("tail {}", self.tail), dim())];
        if let Some(response) = &self.response {
            let (state, color) = if response.container_running {
                ("running", Color::Green)
            } else {
                ("stopped", Color::Red)
            };
            header.push(Span::raw("  "));
            header.push(Span::styled(state, Style::default().fg(color)));
            if response.truncated {
                header.push(Span::styled("  (truncated)", dim()));
            }
        }
        match &self.status {
            ActionStatus::Pending => {
                header.push(Span::styled("  loading...", Style::default().fg(Color::Yellow)));
            }
            ActionStatus::Failed(message) => {
                header.push(Span::styled(format!("  {message}"), Style::default().fg(Color::Red)));
            }
            _ => {}
        }
        header.push(Span::styled("   +/- tail  l reload", dim()));

        let mut lines = vec![Line::from(header)];
        let room = (area.height as usize).saturating_sub(1);
        if let Some(response) = &self.response {
            if response.lines.is_empty() {
                lines.push(Line::from(Span::styled("No log lines", dim())));
            }
            let skip = response.lines.len().saturating_sub(room);
            for log in response.lines.iter().skip(skip) {
                lines.push(Line::from(vec![
                    Span::styled(format!("{} ", format::local_time(&log.ts)), dim()),
                    Span::raw(log.line.clone()),
                ]));
            }
        }
        frame.render_widget(Paragraph::new(lines), area);
    }
}

// ============================================================================
// Progress and alerts
// ============================================================================

/// Progress gauge. `None` renders as indeterminate.
pub fn render_progress(frame: &mut Frame, area: Rect, percent: Option<u32>, label: &str) {
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
        .percent(percent.map_or(0, |p| p.min(100) as u16))
        .label(match percent {
            Some(p) => format!("{}% {label}", p.min(100)),
            None => format!("… {label}"),
        });
    frame.render_widget(gauge, area);
}

/// Error box.
pub fn render_alert(frame: &mut Frame, area: Rect, title: &str, message: &str) {
    let paragraph = Paragraph::new(message.to_string())
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(format!(" {title} ")),
        );
    frame.render_widget(paragraph, area);
}
