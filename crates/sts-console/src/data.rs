//! Backend results flowing back into the UI loop.
//!
//! Every request a view starts runs on its own task and reports back through
//! the app's event channel as a [`DataEvent`]. View results carry the
//! generation of the mount that started them, so results arriving after the
//! view was unmounted are dropped instead of touching a newer view.

use std::future::Future;

use sts_client::{
    ApiClient, ClientError, Container, CreateServerResponse, LogResponse, MailData, MqttMessage,
    ProgressEvent, ServerTemplate, ServerType, StreamEvent, StreamHandle, UploadResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::App;
use crate::events::AppEvent;

/// Data arriving from the backend.
#[derive(Debug)]
pub enum DataEvent {
    /// Result of listing running containers.
    TabsLoaded(Result<Vec<Container>, ClientError>),
    /// Result for the view mounted as `generation`.
    View {
        /// Mount generation that started the request.
        generation: u64,
        /// The result.
        update: ViewUpdate,
    },
}

/// A result addressed to the mounted view.
#[derive(Debug)]
pub enum ViewUpdate {
    /// Server details.
    Container(Result<Container, ClientError>),
    /// Outcome of stopping the server.
    Stopped(Result<(), ClientError>),
    /// Container logs.
    Logs {
        /// Sequence number of the request, per logs panel.
        request: u64,
        /// The response.
        result: Result<LogResponse, ClientError>,
    },
    /// Mailbox contents.
    Mails(Result<Vec<MailData>, ClientError>),
    /// A directory listing settled. The listing itself lives in the cache.
    TreeLoaded {
        /// Identity of the cache the fetch ran against.
        tree: u64,
        /// Directory path, `""` for the root.
        path: String,
        /// Error, if the fetch failed.
        result: Result<(), ClientError>,
    },
    /// Upload progress percentage.
    UploadProgress(u8),
    /// Upload finished.
    Uploaded(Result<UploadResponse, ClientError>),
    /// MQTT stream event.
    Mqtt(StreamEvent<MqttMessage>),
    /// OTEL stream event.
    Telemetry(StreamEvent<serde_json::Value>),
    /// Creation template for a server type.
    Template(ServerType, Result<ServerTemplate, ClientError>),
    /// Creation request accepted (or rejected).
    Created(Result<CreateServerResponse, ClientError>),
    /// Creation progress stream event.
    Progress(StreamEvent<ProgressEvent>),
}

/// Handle views use to reach the backend and report back.
#[derive(Debug, Clone)]
pub struct Ctx {
    client: ApiClient,
    tx: mpsc::UnboundedSender<AppEvent>,
    generation: u64,
}

impl Ctx {
    /// Context for the mount `generation`.
    pub fn new(client: ApiClient, tx: mpsc::UnboundedSender<AppEvent>, generation: u64) -> Self {
        Self {
            client,
            tx,
            generation,
        }
    }

    /// The API client.
    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Mount generation of the owning view.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a result. Returns `false` once the UI loop is gone.
    pub fn send(&self, update: ViewUpdate) -> bool {
        self.tx
            .send(AppEvent::Data(DataEvent::View {
                generation: self.generation,
                update,
            }))
            .is_ok()
    }

    /// Run `task` in the background and report its result.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ViewUpdate> + Send + 'static,
    {
        let ctx = self.clone();
        tokio::spawn(async move {
            let update = task.await;
            ctx.send(update);
        });
    }

    /// Forward every event of a push stream until it ends or the UI loop is
    /// gone. Closing the stream (through its closer) ends the forwarding.
    pub fn forward<T, F>(&self, mut stream: StreamHandle<T>, wrap: F)
    where
        T: Send + 'static,
        F: Fn(StreamEvent<T>) -> ViewUpdate + Send + 'static,
    {
        let ctx = self.clone();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if !ctx.send(wrap(event)) {
                    break;
                }
            }
            debug!(generation = ctx.generation, "Stream forwarding finished");
        });
    }
}

/// Start listing containers; the result arrives as [`DataEvent::TabsLoaded`].
pub fn load_tabs(client: ApiClient, tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let result = client.list_containers().await;
        if let Err(e) = &result {
            warn!(error = %e, "Failed to list containers");
        }
        let _ = tx.send(AppEvent::Data(DataEvent::TabsLoaded(result)));
    });
}

/// Apply a data event to the app state.
pub fn apply_data_event(app: &mut App, event: DataEvent) {
    match event {
        DataEvent::TabsLoaded(result) => app.apply_tabs(result),
        DataEvent::View { generation, update } => app.apply_view_update(generation, update),
    }
}
