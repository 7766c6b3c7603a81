//! Helpers shared by the view tests.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Terminal, backend::TestBackend, buffer::Buffer};
use sts_client::{ApiClient, ClientConfig};
use tokio::sync::mpsc;

use crate::data::Ctx;
use crate::events::AppEvent;
use crate::views::TabView;

/// Client pointed at a port nothing listens on.
pub fn client() -> ApiClient {
    ApiClient::new(ClientConfig::new("http://127.0.0.1:9").unwrap()).unwrap()
}

/// Context for mount `generation` plus the receiving end of its channel.
pub fn ctx(generation: u64) -> (Ctx, mpsc::UnboundedReceiver<AppEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Ctx::new(client(), tx, generation), rx)
}

pub fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

pub fn buffer_to_string(buffer: &Buffer) -> String {
    let width = buffer.area.width as usize;
    let mut text = String::new();
    for (index, cell) in buffer.content.iter().enumerate() {
        text.push_str(cell.symbol());
        if (index + 1) % width == 0 {
            text.push('\n');
        }
    }
    text
}

/// Render a view into a `width` x `height` buffer and return its text.
pub fn render_to_string<V: TabView + ?Sized>(view: &V, width: u16, height: u16) -> String {
    let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
    terminal
        .draw(|frame| {
            let area = frame.area();
            view.render(frame, area);
        })
        .unwrap();
    buffer_to_string(terminal.backend().buffer())
}
