//! MQTT broker tab: live topic tree and message log.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use sts_client::{MqttMessage, StreamCloser, StreamEvent};
use tracing::{debug, warn};

use super::{TabView, ViewAction};
use crate::data::{Ctx, ViewUpdate};
use crate::format;
use crate::history::BoundedHistory;
use crate::topic_tree::TopicTreeState;
use crate::widgets::{Sections, ServerInfo, dim, selected_style, window_start};

const INFO: usize = 0;
const TREE: usize = 1;
const LOG: usize = 2;

/// Live view of an MQTT broker.
#[derive(Debug)]
pub struct MqttView {
    id: String,
    info: ServerInfo,
    sections: Sections,
    messages: BoundedHistory<MqttMessage>,
    tree: TopicTreeState,
    connected: bool,
    error: Option<String>,
    closer: Option<StreamCloser>,
}

impl MqttView {
    /// View for broker `id`, keeping at most `history` messages.
    pub fn new(id: &str, history: usize) -> Self {
        Self {
            id: id.to_string(),
            info: ServerInfo::new(id),
            sections: Sections::new(&["Container Information", "Topic Tree", "Message Log"])
                .focused(TREE),
            messages: BoundedHistory::new(history),
            tree: TopicTreeState::new(),
            connected: false,
            error: None,
            closer: None,
        }
    }

    /// Retained messages, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &MqttMessage> {
        self.messages.iter()
    }

    /// The topic tree.
    pub const fn tree(&self) -> &TopicTreeState {
        &self.tree
    }

    /// Whether the stream is open.
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn on_stream(&mut self, event: StreamEvent<MqttMessage>) {
        match event {
            StreamEvent::Connected => {
                self.connected = true;
                self.error = None;
            }
            StreamEvent::Item(message) => {
                self.messages.push(message);
                self.tree.rebuild(self.messages.iter());
            }
            StreamEvent::Error(e) => {
                warn!(id = %self.id, error = %e, "MQTT stream failed");
                self.error = Some(format!("WebSocket error: {e}"));
            }
            StreamEvent::Disconnected => self.connected = false,
        }
    }

    fn render_tree(&self, frame: &mut Frame, area: Rect) {
        let rows = self.tree.visible_rows();
        if rows.is_empty() {
            let hint = Span::styled("Waiting for messages...", dim());
            frame.render_widget(Paragraph::new(hint), area);
            return;
        }
        let focused = self.sections.focus() == TREE;
        let start = window_start(self.tree.cursor(), area.height as usize);
        let lines: Vec<Line> = rows
            .iter()
            .enumerate()
            .skip(start)
            .take(area.height as usize)
            .map(|(index, row)| {
                let marker = match (row.node.has_children(), row.expanded) {
                    (false, _) => "  ",
                    (true, true) => "▼ ",
                    (true, false) => "▶ ",
                };
                let style = if focused && index == self.tree.cursor() {
                    selected_style()
                } else if row.node.has_children() {
                    Style::default()
                } else {
                    Style::default().fg(Color::Green)
                };
                Line::from(Span::styled(
                    format!("{}{marker}{}", "  ".repeat(row.depth), row.node.name),
                    style,
                ))
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn render_log(&self, frame: &mut Frame, area: Rect) {
        let status = match (&self.error, self.connected) {
            (Some(error), _) => Span::styled(error.clone(), Style::default().fg(Color::Red)),
            (None, true) => Span::styled("● connected", Style::default().fg(Color::Green)),
            (None, false) => Span::styled("○ disconnected", Style::default().fg(Color::Yellow)),
        };
        let mut lines = vec![Line::from(vec![
            status,
            Span::styled(format!("  {} messages   c clear", self.messages.len()), dim()),
        ])];

        let mut log = Vec::new();
        for message in self.messages.iter() {
            let mut spans = Vec::new();
            if let Some(ts) = &message.timestamp {
                spans.push(Span::styled(format!("{} ", format::local_time(ts)), dim()));
            }
            spans.push(Span::styled(message.topic.clone(), Style::default().fg(Color::Cyan)));
            let payload = format::pretty_json(&message.payload);
            let mut payload_lines = payload.lines();
            spans.push(Span::raw(format!("  {}", payload_lines.next().unwrap_or_default())));
            log.push(Line::from(spans));
            log.extend(payload_lines.map(|line| Line::raw(format!("    {line}"))));
        }

        let room = (area.height as usize).saturating_sub(1);
        let skip = log.len().saturating_sub(room);
        lines.extend(log.into_iter().skip(skip));
        frame.render_widget(Paragraph::new(lines), area);
    }
}

impl TabView for MqttView {
    fn mount(&mut self, ctx: &Ctx) {
        self.info.load(ctx);
        match ctx.client().mqtt_messages(&self.id) {
            Ok(stream) => {
                self.closer = Some(stream.closer());
                ctx.forward(stream, ViewUpdate::Mqtt);
            }
            Err(e) => self.error = Some(format!("WebSocket error: {e}")),
        }
    }

    fn unmount(&mut self) {
        if let Some(closer) = self.closer.take() {
            debug!(id = %self.id, "Closing MQTT stream");
            closer.close();
        }
        self.connected = false;
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        self.sections.render(frame, area, |frame, index, inner| match index {
            INFO => self.info.render(frame, inner),
            TREE => self.render_tree(frame, inner),
            LOG => self.render_log(frame, inner),
            _ => {}
        });
    }

    fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> ViewAction {
        if self.sections.handle_key(key) {
            return ViewAction::Consumed;
        }
        let tree_focused = self.sections.focused_open(TREE);
        match key.code {
            KeyCode::Char('s') => self.info.stop(ctx),
            KeyCode::Char('c') => {
                self.messages.clear();
                self.tree.rebuild(self.messages.iter());
            }
            KeyCode::Up | KeyCode::Char('k') if tree_focused => self.tree.select_prev(),
            KeyCode::Down | KeyCode::Char('j') if tree_focused => self.tree.select_next(),
            KeyCode::Enter | KeyCode::Char(' ') if tree_focused => self.tree.toggle_selected(),
            _ => return ViewAction::None,
        }
        ViewAction::Consumed
    }

    fn apply(&mut self, update: ViewUpdate, _ctx: &Ctx) -> ViewAction {
        match update {
            ViewUpdate::Container(result) => self.info.apply_container(result),
            ViewUpdate::Stopped(result) => return self.info.apply_stopped(result),
            ViewUpdate::Mqtt(event) => self.on_stream(event),
            other => debug!(?other, "Ignoring update"),
        }
        ViewAction::None
    }

    fn help(&self) -> &'static str {
        "[/] section  o open/close  ↑/↓ move  enter expand  c clear  s stop"
    }
}
