//! Per-tab views and the registry that picks one for a tab.

mod create;
mod files;
mod mail;
mod mqtt;
mod otel;

pub use create::{CreateView, parse_env, parse_ports};
pub use files::{FilesView, base_url_for};
pub use mail::MailView;
pub use mqtt::MqttView;
pub use otel::OtelView;

use crossterm::event::KeyEvent;
use ratatui::{Frame, layout::Rect};
use sts_client::ServerType;

use crate::data::{Ctx, ViewUpdate};
use crate::history::DEFAULT_HISTORY;
use crate::tabs::{Tab, TabKind};

/// What the app should do after a view handled something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    /// Nothing; the key was not used.
    None,
    /// The key was used.
    Consumed,
    /// Re-list containers and rebuild the tabs.
    ReloadTabs,
}

/// Settings shared by all views.
#[derive(Debug, Clone, Copy)]
pub struct ViewOptions {
    /// Retained live messages per stream.
    pub history: usize,
    /// Initial log tail size.
    pub log_tail: u32,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            history: DEFAULT_HISTORY,
            log_tail: 500,
        }
    }
}

/// A tab's content.
///
/// Only the active tab's view is mounted. `mount` starts the view's requests
/// and streams; `unmount` closes streams. Results come back through
/// [`TabView::apply`].
pub trait TabView {
    /// Start loading.
    fn mount(&mut self, ctx: &Ctx);

    /// Release streams. Outstanding results are discarded by the app.
    fn unmount(&mut self) {}

    /// Draw into `area`.
    fn render(&self, frame: &mut Frame, area: Rect);

    /// Handle a key press.
    fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> ViewAction;

    /// Apply a backend result.
    fn apply(&mut self, update: ViewUpdate, ctx: &Ctx) -> ViewAction;

    /// Whether a text field is being edited, so global keys must not apply.
    fn captures_input(&self) -> bool {
        false
    }

    /// Key hints for the footer.
    fn help(&self) -> &'static str {
        "[/] section  o open/close"
    }
}

/// The view for a tab.
pub fn view_for(tab: &Tab, options: &ViewOptions) -> Box<dyn TabView> {
    match tab.kind {
        TabKind::Protocol(ServerType::Mqtt) => Box::new(MqttView::new(&tab.id, options.history)),
        TabKind::Protocol(ServerType::Mail) => Box::new(MailView::new(&tab.id, options.log_tail)),
        TabKind::Protocol(ServerType::Otel) => Box::new(OtelView::new(&tab.id, options.history)),
        TabKind::Protocol(server_type) => {
            Box::new(FilesView::new(server_type, &tab.id, options.log_tail))
        }
        TabKind::CreateNew => Box::new(CreateView::new()),
    }
}
