//! Tab model: one tab per running server plus a trailing "create" tab.

use sts_client::{Container, ServerType};

/// Id of the synthetic tab that creates new servers.
pub const CREATE_TAB_ID: &str = "create_new";

/// What a tab shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabKind {
    /// A running server of this protocol.
    Protocol(ServerType),
    /// The server creation form.
    CreateNew,
}

impl TabKind {
    /// Short glyph shown before the tab title.
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Protocol(ServerType::Web) => "🌐",
            Self::Protocol(ServerType::Ftp) => "📁",
            Self::Protocol(ServerType::Smb) => "🗄",
            Self::Protocol(ServerType::Mail) => "✉",
            Self::Protocol(ServerType::Mqtt) => "📡",
            Self::Protocol(ServerType::Otel) => "📈",
            Self::CreateNew => "+",
        }
    }
}

/// A tab of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    /// Container id, or [`CREATE_TAB_ID`].
    pub id: String,
    /// Display name.
    pub name: String,
    /// What the tab shows.
    pub kind: TabKind,
}

impl Tab {
    /// Tab for a running server.
    pub fn from_container(container: &Container) -> Self {
        Self {
            id: container.container_id.clone(),
            name: if container.name.trim().is_empty() {
                container.container_id.clone()
            } else {
                container.name.clone()
            },
            kind: TabKind::Protocol(container.server_type),
        }
    }

    /// The "create new server" tab.
    pub fn create_new() -> Self {
        Self {
            id: CREATE_TAB_ID.to_string(),
            name: "New Server".to_string(),
            kind: TabKind::CreateNew,
        }
    }

    /// Title shown in the tab bar.
    pub fn title(&self) -> String {
        format!("{} {}", self.kind.icon(), self.name)
    }
}

/// Tabs for `containers` in order, followed by the create tab.
pub fn build_tabs(containers: &[Container]) -> Vec<Tab> {
    let mut tabs: Vec<Tab> = containers.iter().map(Tab::from_container).collect();
    ensure_create_tab(&mut tabs);
    tabs
}

/// Make sure exactly one create tab exists and that it comes last.
pub fn ensure_create_tab(tabs: &mut Vec<Tab>) {
    tabs.retain(|tab| tab.kind != TabKind::CreateNew);
    tabs.push(Tab::create_new());
}
