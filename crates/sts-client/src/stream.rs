//! Push streams delivered through a channel.
//!
//! A [`StreamHandle`] owns the receiving end of a bounded channel fed by a
//! background task. Closing the handle (explicitly or by dropping it) cancels
//! the task; the task closes the underlying connection exactly once.

use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{MqttMessage, ServerType};

/// Channel capacity of every stream.
pub const STREAM_BUFFER: usize = 256;

/// Events produced by a push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent<T> {
    /// The connection is open.
    Connected,
    /// One decoded payload.
    Item(T),
    /// Connection or transport failure. Always followed by `Disconnected`.
    Error(String),
    /// The connection ended; no further events follow.
    Disconnected,
}

/// Receiving side of a push stream.
#[derive(Debug)]
pub struct StreamHandle<T> {
    rx: mpsc::Receiver<StreamEvent<T>>,
    cancel: CancellationToken,
}

impl<T> StreamHandle<T> {
    pub(crate) fn new(rx: mpsc::Receiver<StreamEvent<T>>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Wait for the next event. Returns `None` once closed or finished.
    pub async fn next(&mut self) -> Option<StreamEvent<T>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Close the stream. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether [`StreamHandle::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A detached closer, for owners that hand the handle to a forwarding task.
    pub fn closer(&self) -> StreamCloser {
        StreamCloser {
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Closes a stream when asked or when dropped.
#[derive(Debug)]
pub struct StreamCloser {
    cancel: CancellationToken,
}

impl StreamCloser {
    /// Close the stream. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the stream was closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamCloser {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ApiClient {
    /// Live MQTT messages of a broker.
    pub fn mqtt_messages(&self, id: &str) -> Result<StreamHandle<MqttMessage>> {
        let url =
            self.ws_endpoint(&["protocols", ServerType::Mqtt.path_segment(), id, "messages"])?;
        Ok(spawn_json_socket(url, self.config.connect_timeout))
    }

    /// Live telemetry of an OpenTelemetry collector. Each frame is arbitrary JSON.
    pub fn otel_telemetry(&self, id: &str) -> Result<StreamHandle<serde_json::Value>> {
        let url =
            self.ws_endpoint(&["protocols", ServerType::Otel.path_segment(), id, "telemetry"])?;
        Ok(spawn_json_socket(url, self.config.connect_timeout))
    }
}

/// Open a WebSocket whose text frames are JSON documents of type `T`.
pub fn spawn_json_socket<T>(url: Url, connect_timeout: Duration) -> StreamHandle<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        run_socket(url, connect_timeout, tx, task_cancel).await;
    });
    StreamHandle::new(rx, cancel)
}

async fn run_socket<T: DeserializeOwned>(
    url: Url,
    connect_timeout: Duration,
    tx: mpsc::Sender<StreamEvent<T>>,
    cancel: CancellationToken,
) {
    debug!(url = %url, "Connecting websocket");
    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        res = timeout(connect_timeout, connect_async(url.as_str())) => res,
    };
    let mut ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(err)) => {
            warn!(url = %url, error = %err, "Websocket connection failed");
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
            let _ = tx.send(StreamEvent::Disconnected).await;
            return;
        }
        Err(_) => {
            warn!(url = %url, "Websocket connection timed out");
            let _ = tx.send(StreamEvent::Error("connection timed out".into())).await;
            let _ = tx.send(StreamEvent::Disconnected).await;
            return;
        }
    };

    info!(url = %url, "Websocket connected");
    if tx.send(StreamEvent::Connected).await.is_err() {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                debug!(url = %url, "Closing websocket");
                let _ = ws.close(None).await;
                break;
            }
            frame = ws.next() => frame,
        };

        let decoded = match frame {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<T>(&text),
            Some(Ok(Message::Binary(bytes))) => serde_json::from_slice::<T>(&bytes),
            Some(Ok(Message::Close(_))) | None => {
                info!(url = %url, "Websocket closed by server");
                let _ = tx.send(StreamEvent::Disconnected).await;
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!(url = %url, error = %err, "Websocket error");
                let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                let _ = tx.send(StreamEvent::Disconnected).await;
                break;
            }
        };

        match decoded {
            Ok(item) => {
                if tx.send(StreamEvent::Item(item)).await.is_err() {
                    let _ = ws.close(None).await;
                    break;
                }
            }
            Err(err) => warn!(url = %url, error = %err, "Dropping malformed frame"),
        }
    }
}
