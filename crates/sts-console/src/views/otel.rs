//! OpenTelemetry collector tab: live telemetry with a text filter.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use sts_client::{StreamCloser, StreamEvent};
use tracing::{debug, warn};

use super::{TabView, ViewAction};
use crate::data::{Ctx, ViewUpdate};
use crate::format;
use crate::history::BoundedHistory;
use crate::widgets::{InputOutcome, Sections, ServerInfo, TextInput, dim, render_alert};

const INFO: usize = 0;
const TELEMETRY: usize = 1;

/// One received frame: the text as sent and its display form.
#[derive(Debug, Clone)]
struct TelemetryFrame {
    raw: String,
    pretty: String,
}

impl TelemetryFrame {
    fn new(value: &serde_json::Value) -> Self {
        let raw = match value {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Self {
            raw,
            pretty: format::pretty_value(value),
        }
    }
}

/// Live telemetry of an OTEL collector.
#[derive(Debug)]
pub struct OtelView {
    id: String,
    info: ServerInfo,
    sections: Sections,
    messages: BoundedHistory<TelemetryFrame>,
    filter: TextInput,
    connected: bool,
    error: Option<String>,
    closer: Option<StreamCloser>,
}

impl OtelView {
    /// View for collector `id`, keeping at most `history` messages.
    pub fn new(id: &str, history: usize) -> Self {
        Self {
            id: id.to_string(),
            info: ServerInfo::new(id),
            sections: Sections::new(&["Container Information", "Telemetry Messages"])
                .closed(INFO)
                .focused(TELEMETRY),
            messages: BoundedHistory::new(history),
            filter: TextInput::default(),
            connected: false,
            error: None,
            closer: None,
        }
    }

    /// Pretty-printed messages whose raw frame matches the filter
    /// (case-insensitive substring), oldest first.
    pub fn filtered(&self) -> Vec<&str> {
        let needle = self.filter.value().trim().to_lowercase();
        self.messages
            .iter()
            .filter(|m| needle.is_empty() || m.raw.to_lowercase().contains(&needle))
            .map(|m| m.pretty.as_str())
            .collect()
    }

    /// Whether the stream is open.
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn on_stream(&mut self, event: StreamEvent<serde_json::Value>) {
        match event {
            StreamEvent::Connected => {
                self.connected = true;
                self.error = None;
            }
            StreamEvent::Item(value) => {
                self.messages.push(TelemetryFrame::new(&value));
            }
            StreamEvent::Error(e) => {
                warn!(id = %self.id, error = %e, "Telemetry stream failed");
                self.error = Some(format!("WebSocket error: {e}"));
            }
            StreamEvent::Disconnected => self.connected = false,
        }
    }

    fn render_telemetry(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        let state = if self.connected {
            Span::styled("● Connected", Style::default().fg(Color::Green))
        } else {
            Span::styled("○ Disconnected", Style::default().fg(Color::Red))
        };
        let mut header = self.filter.line("Filter", self.filter.is_editing()).spans;
        header.push(Span::raw("   "));
        header.push(state);
        header.push(Span::styled("   / filter  x clear filter  c clear", dim()));
        frame.render_widget(Paragraph::new(Line::from(header)), chunks[0]);

        if self.messages.is_empty() {
            let hint = Span::styled("No telemetry received yet", dim());
            frame.render_widget(Paragraph::new(hint), chunks[1]);
            return;
        }
        let room = chunks[1].height as usize;
        let mut lines: Vec<Line> = Vec::new();
        for message in self.filtered() {
            lines.push(Line::from(Span::styled("─".repeat(chunks[1].width as usize), dim())));
            lines.extend(message.lines().map(|l| Line::from(l.to_string())));
        }
        let skip = lines.len().saturating_sub(room);
        frame.render_widget(Paragraph::new(lines.split_off(skip)), chunks[1]);
    }
}

impl TabView for OtelView {
    fn mount(&mut self, ctx: &Ctx) {
        self.info.load(ctx);
        match ctx.client().otel_telemetry(&self.id) {
            Ok(stream) => {
                self.closer = Some(stream.closer());
                ctx.forward(stream, ViewUpdate::Telemetry);
            }
            Err(e) => self.error = Some(format!("WebSocket error: {e}")),
        }
    }

    fn unmount(&mut self) {
        if let Some(closer) = self.closer.take() {
            debug!(id = %self.id, "Closing telemetry stream");
            closer.close();
        }
        self.connected = false;
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let area = if let Some(error) = &self.error {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(0)])
                .split(area);
            render_alert(frame, chunks[0], "Error", error);
            chunks[1]
        } else {
            area
        };
        self.sections.render(frame, area, |frame, index, inner| match index {
            INFO => self.info.render(frame, inner),
            TELEMETRY => self.render_telemetry(frame, inner),
            _ => {}
        });
    }

    fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> ViewAction {
        if self.filter.handle_key(key) != InputOutcome::Ignored {
            return ViewAction::Consumed;
        }
        if self.sections.handle_key(key) {
            return ViewAction::Consumed;
        }
        match key.code {
            KeyCode::Char('s') => self.info.stop(ctx),
            KeyCode::Char('/') => self.filter.begin(),
            KeyCode::Char('x') => self.filter.set_value(""),
            KeyCode::Char('c') => self.messages.clear(),
            _ => return ViewAction::None,
        }
        ViewAction::Consumed
    }

    fn apply(&mut self, update: ViewUpdate, _ctx: &Ctx) -> ViewAction {
        match update {
            ViewUpdate::Container(result) => self.info.apply_container(result),
            ViewUpdate::Stopped(result) => return self.info.apply_stopped(result),
            ViewUpdate::Telemetry(event) => self.on_stream(event),
            other => debug!(?other, "Ignoring update"),
        }
        ViewAction::None
    }

    fn captures_input(&self) -> bool {
        self.filter.is_editing()
    }

    fn help(&self) -> &'static str {
        "[/] section  o open/close  / filter  x clear filter  c clear  s stop"
    }
}
