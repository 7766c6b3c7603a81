//! Event handling for the console

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::app::App;
use crate::data::DataEvent;

/// Application events
#[derive(Debug)]
pub enum AppEvent {
    /// Terminal key press
    Key(KeyEvent),
    /// Terminal resize
    Resize(u16, u16),
    /// Tick for periodic redraws
    Tick,
    /// Result from the backend
    Data(DataEvent),
}

/// Event handler that polls for terminal events
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventHandler {
    /// Start polling the terminal, emitting a tick every `tick_rate` of idleness.
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();

        // `event::poll` blocks the calling thread
        tokio::task::spawn_blocking(move || {
            loop {
                let sent = if event::poll(tick_rate).unwrap_or(false) {
                    match event::read() {
                        Ok(Event::Key(key)) => event_tx.send(AppEvent::Key(key)),
                        Ok(Event::Resize(w, h)) => event_tx.send(AppEvent::Resize(w, h)),
                        _ => Ok(()),
                    }
                } else {
                    event_tx.send(AppEvent::Tick)
                };
                if sent.is_err() {
                    break;
                }
            }
        });

        Self { rx, tx }
    }

    /// Next event.
    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    /// Sender for background tasks.
    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }
}

/// Handle keyboard input.
///
/// The active view sees every key first; keys it does not use fall through
/// to the global bindings. While a view is editing text only Ctrl-C is global.
pub fn handle_key(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.running = false;
        return;
    }
    if app.view_captures_input() {
        app.dispatch_key(key);
        return;
    }
    if app.dispatch_key(key) {
        return;
    }

    match key.code {
        KeyCode::Char('q' | 'Q') => {
            app.running = false;
        }
        KeyCode::Tab | KeyCode::Right => {
            app.next_tab();
        }
        KeyCode::BackTab | KeyCode::Left => {
            app.prev_tab();
        }
        KeyCode::Char(c @ '1'..='9') => {
            let index = c as usize - '1' as usize;
            app.select(index);
        }
        KeyCode::F(5) => {
            app.reload_tabs();
        }
        _ => {}
    }
}
