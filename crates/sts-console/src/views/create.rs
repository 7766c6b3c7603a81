//! Server creation form.

use std::collections::BTreeMap;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use sts_client::{
    ClientError, CreateServerRequest, PortMapping, ProgressEvent, ServerTemplate, ServerType,
    StreamCloser,
    StreamEvent,
};
use tracing::{debug, info, warn};

use super::{TabView, ViewAction};
use crate::data::{Ctx, ViewUpdate};
use crate::status::ActionStatus;
use crate::widgets::{TextInput, dim, render_progress};

const TYPE: usize = 0;
const NAME: usize = 1;
const IMAGE: usize = 2;
const PORTS: usize = 3;
const ENV: usize = 4;
const SUBMIT: usize = 5;

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

/// Parse `host:container` tokens separated by commas or whitespace.
pub fn parse_ports(text: &str) -> Result<Vec<PortMapping>, ClientError> {
    tokens(text).map(str::parse).collect()
}

/// Parse `KEY=VALUE` tokens separated by commas or whitespace.
pub fn parse_env(text: &str) -> Result<BTreeMap<String, String>, ClientError> {
    tokens(text)
        .map(|token| match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ClientError::Validation(format!(
                "invalid environment variable '{token}', expected KEY=VALUE"
            ))),
        })
        .collect()
}

/// Form that creates a new protocol server.
#[derive(Debug)]
pub struct CreateView {
    type_index: usize,
    name: TextInput,
    image: TextInput,
    ports: TextInput,
    env: TextInput,
    focus: usize,
    template: ActionStatus,
    submit: ActionStatus,
    progress: Option<ProgressEvent>,
    closer: Option<StreamCloser>,
}

impl Default for CreateView {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateView {
    /// Empty form with the first server type selected.
    pub fn new() -> Self {
        Self {
            type_index: 0,
            name: TextInput::default(),
            image: TextInput::default(),
            ports: TextInput::default(),
            env: TextInput::default(),
            focus: TYPE,
            template: ActionStatus::Idle,
            submit: ActionStatus::Idle,
            progress: None,
            closer: None,
        }
    }

    /// Selected server type.
    pub const fn server_type(&self) -> ServerType {
        ServerType::ALL[self.type_index % ServerType::ALL.len()]
    }

    /// Status of the last submission.
    pub const fn submit_status(&self) -> &ActionStatus {
        &self.submit
    }

    /// Build the request from the form.
    pub fn build_request(&self) -> Result<CreateServerRequest, ClientError> {
        let image = self.image.value().trim();
        if image.is_empty() {
            return Err(ClientError::Validation("image is required".into()));
        }
        let name = match self.name.value().trim() {
            "" => format!("simple-test-server-{}-0", self.server_type().path_segment()),
            name => name.to_string(),
        };
        Ok(CreateServerRequest {
            name,
            image: image.to_string(),
            ports: parse_ports(self.ports.value())?,
            env: parse_env(self.env.value())?,
        })
    }

    fn field_mut(&mut self, index: usize) -> Option<&mut TextInput> {
        match index {
            NAME => Some(&mut self.name),
            IMAGE => Some(&mut self.image),
            PORTS => Some(&mut self.ports),
            ENV => Some(&mut self.env),
            _ => None,
        }
    }

    fn editing_field(&mut self) -> Option<&mut TextInput> {
        [&mut self.name, &mut self.image, &mut self.ports, &mut self.env]
            .into_iter()
            .find(|field| field.is_editing())
    }

    fn load_template(&mut self, ctx: &Ctx) {
        self.template.start();
        let server_type = self.server_type();
        let client = ctx.client().clone();
        ctx.spawn(async move {
            ViewUpdate::Template(server_type, client.server_template(server_type).await)
        });
    }

    fn apply_template(
        &mut self,
        server_type: ServerType,
        result: Result<ServerTemplate, ClientError>,
    ) {
        if server_type != self.server_type() {
            debug!(%server_type, "Ignoring template for deselected type");
            return;
        }
        match result {
            Ok(template) => {
                self.template.succeed(None);
                self.image.set_value(template.image);
                let ports: Vec<String> =
                    template.ports.iter().map(|p| format!("{p}:{p}")).collect();
                self.ports.set_value(ports.join(", "));
                let env: Vec<String> =
                    template.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
                self.env.set_value(env.join(" "));
            }
            Err(e) => {
                self.template.fail(format!("Failed to load defaults: {e}"));
            }
        }
    }

    fn select_type(&mut self, ctx: &Ctx, forward: bool) {
        let count = ServerType::ALL.len();
        self.type_index = if forward {
            (self.type_index + 1) % count
        } else {
            (self.type_index + count - 1) % count
        };
        self.load_template(ctx);
    }

    fn submit(&mut self, ctx: &Ctx) {
        if self.submit.is_pending() {
            return;
        }
        self.submit.start();
        self.progress = None;
        let request = match self.build_request() {
            Ok(request) => request,
            Err(e) => {
                self.submit.fail(e.to_string());
                return;
            }
        };
        let server_type = self.server_type();
        info!(%server_type, name = %request.name, "Creating server");
        let client = ctx.client().clone();
        ctx.spawn(async move {
            ViewUpdate::Created(client.create_server(server_type, &request).await)
        });
    }

    fn on_progress(&mut self, event: StreamEvent<ProgressEvent>) -> ViewAction {
        match event {
            StreamEvent::Item(progress) => {
                let action = if progress.error {
                    self.submit.fail(progress.message.clone());
                    self.closer = None;
                    ViewAction::None
                } else if progress.percent >= 100 {
                    let message = if progress.message.is_empty() {
                        "Server created".to_string()
                    } else {
                        progress.message.clone()
                    };
                    self.submit.succeed(Some(message));
                    self.closer = None;
                    ViewAction::ReloadTabs
                } else {
                    ViewAction::None
                };
                self.progress = Some(progress);
                action
            }
            StreamEvent::Error(e) => {
                warn!(error = %e, "Progress stream failed");
                self.submit.fail(format!("Progress stream failed: {e}"));
                ViewAction::None
            }
            StreamEvent::Connected | StreamEvent::Disconnected => ViewAction::None,
        }
    }

    fn field_line(
        &self,
        index: usize,
        input: &TextInput,
        label: &str,
        hint: &str,
    ) -> Vec<Line<'static>> {
        vec![
            input.line(label, self.focus == index),
            Line::from(Span::styled(format!("  {hint}"), dim())),
        ]
    }
}

impl TabView for CreateView {
    fn mount(&mut self, ctx: &Ctx) {
        self.load_template(ctx);
    }

    fn unmount(&mut self) {
        self.closer = None;
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Create New Server ")
            .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
            .split(inner);

        let focused = |index: usize| {
            if self.focus == index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Cyan)
            }
        };
        let server_type = self.server_type();
        let mut lines = vec![Line::from(vec![
            Span::styled("Server Type: ", focused(TYPE)),
            Span::raw(format!("◀ {} ▶", server_type.label())),
        ])];
        lines.push(match &self.template {
            ActionStatus::Pending => Line::from(Span::styled("  loading defaults...", dim())),
            ActionStatus::Failed(message) => Line::from(Span::styled(
                format!("  {message}"),
                Style::default().fg(Color::Red),
            )),
            _ => Line::from(Span::styled("  ←/→ change type", dim())),
        });
        let default_name = format!("empty for simple-test-server-{}-0", server_type.path_segment());
        lines.extend(self.field_line(NAME, &self.name, "Name", &default_name));
        lines.extend(self.field_line(
            IMAGE,
            &self.image,
            "Image",
            "image pulled from the registry",
        ));
        lines.extend(self.field_line(
            PORTS,
            &self.ports,
            "Ports",
            "hostPort:containerPort, e.g. 80:8080",
        ));
        lines.extend(self.field_line(
            ENV,
            &self.env,
            "Environment",
            "VARIABLE=value, e.g. ENV=PROD",
        ));
        lines.push(Line::default());
        let button = if self.submit.is_pending() { "[ Creating... ]" } else { "[ Create ]" };
        lines.push(Line::from(Span::styled(button, focused(SUBMIT))));
        frame.render_widget(Paragraph::new(lines), chunks[0]);

        if self.submit.is_pending() || self.progress.is_some() {
            let (percent, label) = self
                .progress
                .as_ref()
                .map_or((None, String::new()), |p| (Some(p.percent), p.message.clone()));
            render_progress(frame, chunks[1], percent, &label);
        }
        let status = match &self.submit {
            ActionStatus::Failed(message) => {
                Span::styled(message.clone(), Style::default().fg(Color::Red))
            }
            ActionStatus::Succeeded(message) => Span::styled(
                message.clone().unwrap_or_default(),
                Style::default().fg(Color::Green),
            ),
            _ => Span::raw(""),
        };
        frame.render_widget(Paragraph::new(Line::from(status)), chunks[2]);
    }

    fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> ViewAction {
        if let Some(field) = self.editing_field() {
            field.handle_key(key);
            return ViewAction::Consumed;
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.focus = self.focus.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.focus = (self.focus + 1).min(SUBMIT),
            KeyCode::Left if self.focus == TYPE => self.select_type(ctx, false),
            KeyCode::Right if self.focus == TYPE => self.select_type(ctx, true),
            KeyCode::Enter if self.focus == SUBMIT => self.submit(ctx),
            KeyCode::Enter => match self.field_mut(self.focus) {
                Some(field) => field.begin(),
                None => return ViewAction::None,
            },
            _ => return ViewAction::None,
        }
        ViewAction::Consumed
    }

    fn apply(&mut self, update: ViewUpdate, ctx: &Ctx) -> ViewAction {
        match update {
            ViewUpdate::Template(server_type, result) => self.apply_template(server_type, result),
            ViewUpdate::Created(Ok(response)) => {
                debug!(req_id = %response.req_id, "Creation accepted");
                match ctx.client().watch_progress(&response.req_id) {
                    Ok(stream) => {
                        self.closer = Some(stream.closer());
                        ctx.forward(stream, ViewUpdate::Progress);
                    }
                    Err(e) => {
                        self.submit.fail(e.to_string());
                    }
                }
            }
            ViewUpdate::Created(Err(e)) => {
                self.submit.fail(e.to_string());
            }
            ViewUpdate::Progress(event) => return self.on_progress(event),
            other => debug!(?other, "Ignoring update"),
        }
        ViewAction::None
    }

    fn captures_input(&self) -> bool {
        [&self.name, &self.image, &self.ports, &self.env]
            .iter()
            .any(|field| field.is_editing())
    }

    fn help(&self) -> &'static str {
        "↑/↓ field  ←/→ type  enter edit/submit  esc cancel edit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ctx, key, render_to_string};
    use test_case::test_case;

    #[test]
    fn ports_accept_commas_and_whitespace() {
        let ports = parse_ports("80:8080, 1883:1883\n9001:9001").unwrap();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0], PortMapping { host: 80, container: 8080 });
        assert!(parse_ports("").unwrap().is_empty());
    }

    #[test_case("80" ; "missing container port")]
    #[test_case("a:b" ; "not numbers")]
    #[test_case("80:70000" ; "out of range")]
    fn invalid_ports_are_rejected(text: &str) {
        assert!(matches!(parse_ports(text), Err(ClientError::Validation(_))));
    }

    #[test]
    fn env_tokens() {
        let env = parse_env("A=1, B=x=y C=").unwrap();
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("B").map(String::as_str), Some("x=y"));
        assert_eq!(env.get("C").map(String::as_str), Some(""));
        assert!(parse_env("=x").is_err());
        assert!(parse_env("NOVALUE").is_err());
    }

    #[test]
    fn request_defaults_and_validation() {
        let mut view = CreateView::new();
        assert!(matches!(view.build_request(), Err(ClientError::Validation(_))));

        view.image.set_value("eclipse-mosquitto");
        view.ports.set_value("1883:1883");
        let request = view.build_request().unwrap();
        assert_eq!(request.name, "simple-test-server-mqtt-0");
        assert_eq!(request.ports, vec![PortMapping { host: 1883, container: 1883 }]);
    }

    #[tokio::test]
    async fn template_prefills_and_stale_templates_are_ignored() {
        let (ctx, _rx) = ctx(1);
        let mut view = CreateView::new();
        let template = ServerTemplate {
            name: "mqtt".into(),
            image: "custom-mqtt:latest".into(),
            ports: vec![1883, 9001],
            env: BTreeMap::from([("MQTT_USERNAME".to_string(), "user".to_string())]),
        };

        view.template.start();
        view.apply(ViewUpdate::Template(ServerType::Web, Ok(template.clone())), &ctx);
        assert_eq!(view.image.value(), "");

        view.apply(ViewUpdate::Template(ServerType::Mqtt, Ok(template)), &ctx);
        assert_eq!(view.image.value(), "custom-mqtt:latest");
        assert_eq!(view.ports.value(), "1883:1883, 9001:9001");
        assert_eq!(view.env.value(), "MQTT_USERNAME=user");
    }

    #[tokio::test]
    async fn editing_captures_input() {
        let (ctx, _rx) = ctx(1);
        let mut view = CreateView::new();
        view.handle_key(key(KeyCode::Down), &ctx);
        view.handle_key(key(KeyCode::Enter), &ctx);
        assert!(view.captures_input());
        for c in "srv".chars() {
            view.handle_key(key(KeyCode::Char(c)), &ctx);
        }
        view.handle_key(key(KeyCode::Enter), &ctx);
        assert!(!view.captures_input());
        assert_eq!(view.name.value(), "srv");
    }

    #[tokio::test]
    async fn invalid_form_fails_submit() {
        let (ctx, _rx) = ctx(1);
        let mut view = CreateView::new();
        view.focus = SUBMIT;
        view.handle_key(key(KeyCode::Enter), &ctx);
        assert_eq!(view.submit_status().error(), Some("invalid input: image is required"));
    }

    #[tokio::test]
    async fn progress_completion_reloads_tabs() {
        let (ctx, _rx) = ctx(1);
        let mut view = CreateView::new();
        view.submit.start();

        let step = |percent, message: &str, error| {
            ViewUpdate::Progress(StreamEvent::Item(ProgressEvent {
                percent,
                message: message.into(),
                error,
            }))
        };
        assert_eq!(view.apply(step(50, "Pulling image", false), &ctx), ViewAction::None);
        assert!(view.submit_status().is_pending());
        let screen = render_to_string(&view, 80, 24);
        assert!(screen.contains("50% Pulling image"));

        assert_eq!(view.apply(step(100, "Started", false), &ctx), ViewAction::ReloadTabs);
        assert_eq!(view.submit_status().message(), Some("Started"));
    }

    #[tokio::test]
    async fn progress_error_fails() {
        let (ctx, _rx) = ctx(1);
        let mut view = CreateView::new();
        view.submit.start();
        let failed = ViewUpdate::Progress(StreamEvent::Item(ProgressEvent {
            percent: 30,
            message: "pull failed".into(),
            error: true,
        }));
        assert_eq!(view.apply(failed, &ctx), ViewAction::None);
        assert_eq!(view.submit_status().error(), Some("pull failed"));
    }
}
