//! Application state

use chrono::{DateTime, Local};
use crossterm::event::KeyEvent;
use sts_client::{ApiClient, ClientError, Container};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::data::{self, Ctx, ViewUpdate};
use crate::events::AppEvent;
use crate::status::ActionStatus;
use crate::tabs::{Tab, build_tabs};
use crate::views::{TabView, ViewAction, ViewOptions, view_for};

/// The mounted view of the selected tab.
pub struct ActiveView {
    /// Id of the tab it belongs to.
    pub tab_id: String,
    /// Mount generation; results tagged with another generation are stale.
    pub generation: u64,
    /// The view.
    pub view: Box<dyn TabView>,
}

/// Main application state
pub struct App {
    /// Whether the main loop keeps running.
    pub running: bool,
    /// Tabs, containers first and the create tab last.
    pub tabs: Vec<Tab>,
    /// Index of the selected tab.
    pub selected_tab: usize,
    /// Status of the last container listing.
    pub tabs_status: ActionStatus,
    /// When the tabs were last loaded.
    pub last_update: Option<DateTime<Local>>,
    active: Option<ActiveView>,
    client: ApiClient,
    tx: mpsc::UnboundedSender<AppEvent>,
    options: ViewOptions,
    generation: u64,
    loaded_once: bool,
}

impl App {
    /// App with only the create tab, nothing mounted yet.
    pub fn new(
        client: ApiClient,
        tx: mpsc::UnboundedSender<AppEvent>,
        options: ViewOptions,
    ) -> Self {
        Self {
            running: true,
            tabs: build_tabs(&[]),
            selected_tab: 0,
            tabs_status: ActionStatus::Idle,
            last_update: None,
            active: None,
            client,
            tx,
            options,
            generation: 0,
            loaded_once: false,
        }
    }

    /// Mount the selected tab and start loading the container list.
    pub fn start(&mut self) {
        self.mount_selected();
        self.reload_tabs();
    }

    /// Re-list containers.
    pub fn reload_tabs(&mut self) {
        self.tabs_status.start();
        data::load_tabs(self.client.clone(), self.tx.clone());
    }

    /// Rebuild the tabs from a container listing, keeping the selected tab
    /// (and its mounted view) when it still exists.
    pub fn apply_tabs(&mut self, result: Result<Vec<Container>, ClientError>) {
        let containers = match result {
            Ok(containers) => containers,
            Err(e) => {
                self.tabs_status.fail(format!("Failed to load servers: {e}"));
                return;
            }
        };
        self.tabs_status.succeed(None);
        self.last_update = Some(Local::now());

        let current = self.tabs.get(self.selected_tab).map(|tab| tab.id.clone());
        self.tabs = build_tabs(&containers);
        let index = if self.loaded_once {
            current
                .and_then(|id| self.tabs.iter().position(|tab| tab.id == id))
                .unwrap_or_else(|| self.selected_tab.min(self.tabs.len() - 1))
        } else {
            0
        };
        self.loaded_once = true;
        info!(servers = containers.len(), "Tabs loaded");
        self.select(index);
    }

    /// Select tab `index`, remounting only when the tab changes.
    pub fn select(&mut self, index: usize) {
        let Some(tab) = self.tabs.get(index) else {
            return;
        };
        self.selected_tab = index;
        if self.active.as_ref().is_some_and(|active| active.tab_id == tab.id) {
            return;
        }
        self.unmount();
        self.mount_selected();
    }

    /// Select the next tab, wrapping around.
    pub fn next_tab(&mut self) {
        if !self.tabs.is_empty() {
            self.select((self.selected_tab + 1) % self.tabs.len());
        }
    }

    /// Select the previous tab, wrapping around.
    pub fn prev_tab(&mut self) {
        if !self.tabs.is_empty() {
            self.select((self.selected_tab + self.tabs.len() - 1) % self.tabs.len());
        }
    }

    fn mount_selected(&mut self) {
        let Some(tab) = self.tabs.get(self.selected_tab) else {
            return;
        };
        self.generation += 1;
        let mut view = view_for(tab, &self.options);
        view.mount(&self.ctx());
        debug!(tab = %tab.id, generation = self.generation, "Mounted view");
        self.active = Some(ActiveView {
            tab_id: tab.id.clone(),
            generation: self.generation,
            view,
        });
    }

    fn unmount(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.view.unmount();
            debug!(tab = %active.tab_id, generation = active.generation, "Unmounted view");
        }
    }

    /// Unmount the active view before exit.
    pub fn shutdown(&mut self) {
        self.unmount();
    }

    fn ctx(&self) -> Ctx {
        Ctx::new(self.client.clone(), self.tx.clone(), self.generation)
    }

    /// The mounted view.
    pub fn active_view(&self) -> Option<&dyn TabView> {
        self.active.as_ref().map(|active| active.view.as_ref())
    }

    /// Generation of the mounted view.
    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.generation)
    }

    /// Whether the mounted view is editing text.
    pub fn view_captures_input(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.view.captures_input())
    }

    /// Offer a key to the mounted view. Returns whether it was used.
    pub fn dispatch_key(&mut self, key: KeyEvent) -> bool {
        let ctx = self.ctx();
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let action = active.view.handle_key(key, &ctx);
        self.handle_action(action);
        action != ViewAction::None
    }

    /// Hand a result to the mounted view, dropping it if it belongs to a
    /// view that has since been unmounted.
    pub fn apply_view_update(&mut self, generation: u64, update: ViewUpdate) {
        let ctx = self.ctx();
        let mounted = self.active.as_mut().filter(|active| active.generation == generation);
        let Some(active) = mounted else {
            debug!(generation, current = self.generation, "Dropping stale view update");
            return;
        };
        let action = active.view.apply(update, &ctx);
        self.handle_action(action);
    }

    fn handle_action(&mut self, action: ViewAction) {
        if action == ViewAction::ReloadTabs {
            self.reload_tabs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use sts_client::{MqttMessage, ServerType, StreamEvent};
    use crate::data::DataEvent;
    use crate::tabs::CREATE_TAB_ID;
    use crate::test_support::client;

    fn app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(client(), tx, ViewOptions::default()), rx)
    }

    fn container(id: &str, server_type: ServerType) -> Container {
        Container {
            container_id: id.to_string(),
            name: id.to_string(),
            image: String::new(),
            created_at: 0,
            status: 1,
            ports: BTreeMap::new(),
            env: BTreeMap::new(),
            networks: Vec::new(),
            server_type,
        }
    }

    #[tokio::test]
    async fn first_load_selects_first_tab() {
        let (mut app, _rx) = app();
        app.start();
        assert_eq!(app.tabs[0].id, CREATE_TAB_ID);
        assert_eq!(app.active_generation(), Some(1));

        app.apply_tabs(Ok(vec![
            container("a", ServerType::Mqtt),
            container("b", ServerType::Otel),
        ]));
        assert_eq!(app.tabs.len(), 3);
        assert_eq!(app.selected_tab, 0);
        assert_eq!(app.active_generation(), Some(2));
        assert!(app.tabs_status.is_succeeded());
        assert!(app.last_update.is_some());
    }

    #[tokio::test]
    async fn reload_keeps_selected_tab_mounted() {
        let (mut app, _rx) = app();
        app.start();
        app.apply_tabs(Ok(vec![
            container("a", ServerType::Mqtt),
            container("b", ServerType::Otel),
        ]));
        app.select(1);
        let generation = app.active_generation();

        app.apply_tabs(Ok(vec![
            container("new", ServerType::Web),
            container("a", ServerType::Mqtt),
            container("b", ServerType::Otel),
        ]));
        assert_eq!(app.selected_tab, 2);
        assert_eq!(app.tabs[2].id, "b");
        assert_eq!(app.active_generation(), generation);
    }

    #[tokio::test]
    async fn removed_tab_falls_back() {
        let (mut app, _rx) = app();
        app.start();
        app.apply_tabs(Ok(vec![
            container("a", ServerType::Mqtt),
            container("b", ServerType::Otel),
        ]));
        app.select(1);

        app.apply_tabs(Ok(vec![container("a", ServerType::Mqtt)]));
        assert_eq!(app.selected_tab, 1);
        assert_eq!(app.tabs[1].id, CREATE_TAB_ID);
    }

    #[tokio::test]
    async fn failed_load_keeps_tabs() {
        let (mut app, _rx) = app();
        app.start();
        app.apply_tabs(Err(ClientError::Transport("refused".into())));
        assert_eq!(app.tabs.len(), 1);
        assert_eq!(
            app.tabs_status.error(),
            Some("Failed to load servers: transport error: refused")
        );
    }

    #[tokio::test]
    async fn stale_updates_are_dropped() {
        let (mut app, _rx) = app();
        app.start();
        app.apply_tabs(Ok(vec![
            container("a", ServerType::Mqtt),
            container("b", ServerType::Mqtt),
        ]));
        let old = app.active_generation().unwrap();
        app.next_tab();
        let current = app.active_generation().unwrap();
        assert_ne!(old, current);

        let message = |generation: u64, topic: &str| DataEvent::View {
            generation,
            update: ViewUpdate::Mqtt(StreamEvent::Item(MqttMessage::new(topic, "1"))),
        };
        data::apply_data_event(&mut app, message(old, "stale"));
        data::apply_data_event(&mut app, message(current, "fresh"));

        let screen = crate::test_support::render_to_string(app.active_view().unwrap(), 80, 30);
        assert!(screen.contains("fresh"));
        assert!(!screen.contains("stale"));
    }

    #[tokio::test]
    async fn tab_navigation_wraps() {
        let (mut app, _rx) = app();
        app.start();
        app.apply_tabs(Ok(vec![container("a", ServerType::Mail)]));
        app.prev_tab();
        assert_eq!(app.selected_tab, 1);
        app.next_tab();
        assert_eq!(app.selected_tab, 0);
        app.select(7);
        assert_eq!(app.selected_tab, 0);
    }
}
