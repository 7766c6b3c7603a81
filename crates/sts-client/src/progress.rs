//! Server-creation progress over Server-Sent Events.

use futures::StreamExt;
use reqwest::RequestBuilder;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, ensure_success};
use crate::error::Result;
use crate::stream::{STREAM_BUFFER, StreamEvent, StreamHandle};
use crate::types::ProgressEvent;

/// Incremental decoder for a `text/event-stream` body.
///
/// Only `data` fields matter to the progress endpoint; other fields and
/// comment lines (keepalives) are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the data payload of every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        events
    }
}

impl ApiClient {
    /// Follow the progress of a server creation request.
    ///
    /// The stream ends after the first terminal event (`percent >= 100` or
    /// `error`), on transport failure, or when closed. There is no reconnect.
    pub fn watch_progress(&self, req_id: &str) -> Result<StreamHandle<ProgressEvent>> {
        let url = self.endpoint(&["servers", "progress", req_id])?;
        debug!(path = url.path(), "Opening progress stream");
        let request = self.http.get(url).header(ACCEPT, "text/event-stream");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            run_progress(request, tx, task_cancel).await;
        });
        Ok(StreamHandle::new(rx, cancel))
    }
}

async fn run_progress(
    request: RequestBuilder,
    tx: mpsc::Sender<StreamEvent<ProgressEvent>>,
    cancel: CancellationToken,
) {
    let sent = tokio::select! {
        () = cancel.cancelled() => return,
        res = request.send() => res,
    };
    let response = match sent {
        Ok(response) => ensure_success(response).await,
        Err(err) => Err(err.into()),
    };
    let response = match response {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Progress stream failed to open");
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
            let _ = tx.send(StreamEvent::Disconnected).await;
            return;
        }
    };

    if tx.send(StreamEvent::Connected).await.is_err() {
        return;
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Progress stream closed by client");
                return;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for data in decoder.push(&bytes) {
                    let event = match serde_json::from_str::<ProgressEvent>(&data) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(error = %err, "Dropping malformed progress event");
                            continue;
                        }
                    };
                    let terminal = event.is_terminal();
                    if tx.send(StreamEvent::Item(event)).await.is_err() {
                        return;
                    }
                    if terminal {
                        info!("Progress stream finished");
                        let _ = tx.send(StreamEvent::Disconnected).await;
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "Progress stream transport error");
                let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                let _ = tx.send(StreamEvent::Disconnected).await;
                return;
            }
            None => {
                let _ = tx.send(StreamEvent::Disconnected).await;
                return;
            }
        }
    }
}
