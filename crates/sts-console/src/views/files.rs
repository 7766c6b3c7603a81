//! File-serving tabs (Web, FTP, SMB): folder tree, upload and logs.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use sts_client::{ClientError, Container, ProgressFn, ServerType, UploadFile, UploadResponse};
use tracing::{debug, info};

use super::{TabView, ViewAction};
use crate::data::{Ctx, ViewUpdate};
use crate::file_tree::{BrowserRow, FileTreeBrowser, FileTreeCache, RemoteDirectory};
use crate::format;
use crate::status::ActionStatus;
use crate::widgets::{
    InputOutcome, LogsPanel, Sections, ServerInfo, TextInput, dim, render_progress, selected_style,
    window_start,
};

const INFO: usize = 0;
const TREE: usize = 1;
const UPLOAD: usize = 2;
const LOGS: usize = 3;

/// Largest file accepted for upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Base URL under which a server's files can be opened.
pub fn base_url_for(server_type: ServerType, container: Option<&Container>) -> Option<String> {
    match server_type {
        ServerType::Web => {
            let port = container
                .and_then(|c| {
                    c.ports
                        .iter()
                        .find(|(_, inner)| **inner == 80)
                        .map(|(host, _)| host.clone())
                })
                .unwrap_or_else(|| "80".to_string());
            Some(format!("http://localhost:{port}"))
        }
        ServerType::Ftp => Some("ftp://localhost".to_string()),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct UploadState {
    input: TextInput,
    status: ActionStatus,
    percent: u8,
    url: Option<String>,
}

/// Browse, upload into and tail a file-serving server.
#[derive(Debug)]
pub struct FilesView {
    server_type: ServerType,
    id: String,
    info: ServerInfo,
    sections: Sections,
    browser: Option<FileTreeBrowser>,
    tree_error: Option<String>,
    tree_id: u64,
    upload: UploadState,
    logs: LogsPanel,
}

impl FilesView {
    /// View for server `id`.
    pub fn new(server_type: ServerType, id: &str, log_tail: u32) -> Self {
        let logs_title = if server_type == ServerType::Web { "Access Logs" } else { "Logs" };
        Self {
            server_type,
            id: id.to_string(),
            info: ServerInfo::new(id),
            sections: Sections::new(&[
                "Container Information",
                "Folder Tree",
                "Upload Resource",
                logs_title,
            ])
                .closed(INFO)
                .closed(UPLOAD)
                .closed(LOGS)
                .focused(TREE),
            browser: None,
            tree_error: None,
            tree_id: 0,
            upload: UploadState::default(),
            logs: LogsPanel::new(server_type, id, log_tail),
        }
    }

    /// The folder tree, once mounted.
    pub const fn browser(&self) -> Option<&FileTreeBrowser> {
        self.browser.as_ref()
    }

    /// Status of the last upload.
    pub const fn upload_status(&self) -> &ActionStatus {
        &self.upload.status
    }

    /// URL of the last uploaded file.
    pub fn uploaded_url(&self) -> Option<&str> {
        self.upload.url.as_deref()
    }

    /// Replace the folder tree with a fresh, empty cache and load its root.
    fn reset_tree(&mut self, ctx: &Ctx) {
        let source = RemoteDirectory::new(ctx.client().clone(), self.server_type, self.id.clone());
        let mut browser = FileTreeBrowser::new(FileTreeCache::new(Arc::new(source)));
        browser.set_base_url(base_url_for(self.server_type, self.info.container()));
        self.browser = Some(browser);
        self.tree_id += 1;
        self.tree_error = None;
        self.load_dir(ctx, None, false);
    }

    fn load_dir(&self, ctx: &Ctx, path: Option<String>, refresh: bool) {
        let Some(browser) = &self.browser else {
            return;
        };
        let fetch = if refresh {
            browser.cache().refresh(path.as_deref())
        } else {
            browser.cache().get_children(path.as_deref())
        };
        let path = path.unwrap_or_default();
        let tree = self.tree_id;
        ctx.spawn(async move {
            let result = fetch.await.map(|_| ());
            ViewUpdate::TreeLoaded { tree, path, result }
        });
    }

    fn start_upload(&mut self, ctx: &Ctx) {
        let path = self.upload.input.value().trim().to_string();
        self.upload.status.start();
        self.upload.url = None;
        self.upload.percent = 0;
        if path.is_empty() {
            self.upload.status.fail("No files to upload.");
            return;
        }

        info!(id = %self.id, file = %path, "Uploading file");
        let client = ctx.client().clone();
        let reporter = ctx.clone();
        let (server_type, id) = (self.server_type, self.id.clone());
        ctx.spawn(async move {
            let result: Result<UploadResponse, ClientError> = async {
                let file = UploadFile::from_path(&path).await?;
                if file.len() > MAX_UPLOAD_BYTES {
                    return Err(ClientError::Validation(format!(
                        "{} exceeds the {} upload limit",
                        file.file_name,
                        format::format_bytes(MAX_UPLOAD_BYTES as u64, 0)
                    )));
                }
                let progress: ProgressFn = Arc::new(move |percent| {
                    reporter.send(ViewUpdate::UploadProgress(percent));
                });
                client.upload_file(&id, file, server_type, Some(progress)).await
            }
            .await;
            ViewUpdate::Uploaded(result)
        });
    }

    fn render_tree(&self, frame: &mut Frame, area: Rect) {
        let Some(browser) = &self.browser else {
            frame.render_widget(Paragraph::new(Span::styled("Loading...", dim())), area);
            return;
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);

        let rows = browser.rows();
        let focused = self.sections.focus() == TREE;
        let height = chunks[0].height as usize;
        let start = window_start(browser.cursor(), height);
        let lines: Vec<Line> = rows
            .iter()
            .enumerate()
            .skip(start)
            .take(height)
            .map(|(index, row)| {
                let indent = "  ".repeat(row.depth());
                let selected = focused && index == browser.cursor();
                let line = match row {
                    BrowserRow::Entry { entry, expanded, .. } if entry.is_dir() => {
                        let marker = if *expanded { "▼" } else { "▶" };
                        Line::from(Span::styled(
                            format!("{indent}{marker} {}/", entry.name),
                            Style::default().fg(Color::Cyan),
                        ))
                    }
                    BrowserRow::Entry { entry, .. } => Line::from(vec![
                        Span::raw(format!("{indent}  {}", entry.name)),
                        Span::styled(format!("  {}", format::human_size(entry.size)), dim()),
                    ]),
                    BrowserRow::Loading { .. } => {
                        Line::from(Span::styled(format!("{indent}Loading..."), dim()))
                    }
                    BrowserRow::Empty { .. } => {
                        Line::from(Span::styled(format!("{indent}Empty folder"), dim()))
                    }
                    BrowserRow::Truncated { .. } => Line::from(Span::styled(
                        format!("{indent}(truncated)"),
                        Style::default().fg(Color::Yellow),
                    )),
                };
                if selected { line.style(selected_style()) } else { line }
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), chunks[0]);

        let footer = if let Some(error) = &self.tree_error {
            Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red)))
        } else if let Some(url) = browser.selected_entry().and_then(|e| browser.open_url(&e)) {
            Line::from(vec![Span::styled("open: ", dim()), Span::raw(url)])
        } else {
            Line::from(Span::styled("↑/↓ move  enter expand  r refresh", dim()))
        };
        frame.render_widget(Paragraph::new(footer), chunks[1]);
    }

    fn render_upload(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        frame.render_widget(
            Paragraph::new(self.upload.input.line("File", self.sections.focus() == UPLOAD)),
            chunks[0],
        );
        if self.upload.status.is_pending() {
            render_progress(frame, chunks[1], Some(u32::from(self.upload.percent)), "Uploading...");
        } else {
            let hint = Span::styled("u: choose file and upload", dim());
            frame.render_widget(Paragraph::new(hint), chunks[1]);
        }
        let status = match (&self.upload.status, &self.upload.url) {
            (ActionStatus::Failed(message), _) => {
                Line::from(Span::styled(message.clone(), Style::default().fg(Color::Red)))
            }
            (ActionStatus::Succeeded(_), Some(url)) => Line::from(vec![
                Span::styled("Uploaded: ", Style::default().fg(Color::Green)),
                Span::raw(url.clone()),
            ]),
            _ => Line::default(),
        };
        frame.render_widget(Paragraph::new(status), chunks[2]);
    }
}

impl TabView for FilesView {
    fn mount(&mut self, ctx: &Ctx) {
        self.info.load(ctx);
        self.reset_tree(ctx);
        self.logs.refresh(ctx);
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        self.sections.render(frame, area, |frame, index, inner| match index {
            INFO => self.info.render(frame, inner),
            TREE => self.render_tree(frame, inner),
            UPLOAD => self.render_upload(frame, inner),
            LOGS => self.logs.render(frame, inner),
            _ => {}
        });
    }

    fn handle_key(&mut self, key: KeyEvent, ctx: &Ctx) -> ViewAction {
        match self.upload.input.handle_key(key) {
            InputOutcome::Ignored => {}
            InputOutcome::Submitted => {
                self.start_upload(ctx);
                return ViewAction::Consumed;
            }
            InputOutcome::Editing | InputOutcome::Cancelled => return ViewAction::Consumed,
        }
        if self.sections.handle_key(key) {
            return ViewAction::Consumed;
        }
        if self.sections.focused_open(LOGS) && self.logs.handle_key(key, ctx) {
            return ViewAction::Consumed;
        }

        let tree_focused = self.sections.focused_open(TREE);
        match key.code {
            KeyCode::Char('s') => self.info.stop(ctx),
            KeyCode::Char('u')
                if self.server_type.supports_upload() && !self.upload.status.is_pending() =>
            {
                self.upload.input.begin();
            }
            KeyCode::Char('r') => {
                self.reset_tree(ctx);
                self.logs.refresh(ctx);
            }
            KeyCode::Up | KeyCode::Char('k') if tree_focused => {
                if let Some(browser) = &mut self.browser {
                    browser.select_prev();
                }
            }
            KeyCode::Down | KeyCode::Char('j') if tree_focused => {
                if let Some(browser) = &mut self.browser {
                    browser.select_next();
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') if tree_focused => {
                let to_load = self.browser.as_mut().and_then(FileTreeBrowser::toggle_selected);
                if let Some(path) = to_load {
                    self.load_dir(ctx, Some(path), false);
                }
            }
            _ => return ViewAction::None,
        }
        ViewAction::Consumed
    }

    fn apply(&mut self, update: ViewUpdate, ctx: &Ctx) -> ViewAction {
        match update {
            ViewUpdate::Container(result) => {
                self.info.apply_container(result);
                let base_url = base_url_for(self.server_type, self.info.container());
                if let Some(browser) = &mut self.browser {
                    browser.set_base_url(base_url);
                }
            }
            ViewUpdate::Stopped(result) => return self.info.apply_stopped(result),
            ViewUpdate::Logs { request, result } => self.logs.apply(request, result),
            ViewUpdate::TreeLoaded { tree, .. } if tree != self.tree_id => {
                debug!(tree, current = self.tree_id, "Dropping result of a replaced folder tree");
            }
            ViewUpdate::TreeLoaded { path, result, .. } => match result {
                Ok(()) => {
                    if path.is_empty() {
                        self.tree_error = None;
                    }
                }
                Err(e) => {
                    let shown = if path.is_empty() { "/" } else { path.as_str() };
                    self.tree_error = Some(format!("Failed to load {shown}: {e}"));
                }
            },
            ViewUpdate::UploadProgress(percent) => {
                if self.upload.status.is_pending() {
                    self.upload.percent = self.upload.percent.max(percent);
                }
            }
            ViewUpdate::Uploaded(result) => match result {
                Ok(response) => {
                    info!(id = %self.id, url = %response.url, "Upload finished");
                    self.upload.percent = 100;
                    self.upload.status.succeed(Some("Uploaded".into()));
                    self.upload.url = Some(response.url);
                    self.upload.input.set_value("");
                    self.load_dir(ctx, None, true);
                }
                Err(e) => {
                    self.upload.status.fail(e.to_string());
                }
            },
            other => debug!(?other, "Ignoring update"),
        }
        ViewAction::None
    }

    fn captures_input(&self) -> bool {
        self.upload.input.is_editing()
    }

    fn help(&self) -> &'static str {
        "[/] section  o open/close  ↑/↓ move  enter expand  u upload  r refresh  s stop"
    }
}
