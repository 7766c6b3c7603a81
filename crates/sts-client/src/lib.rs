//! # sts-client
//!
//! Typed client for the simple-test-server backend.
//!
//! Covers the whole `/api/v1` surface the console consumes:
//! - Container listing, inspection and removal
//! - Server templates, creation and creation progress (SSE)
//! - Per-protocol file trees, logs, mails and uploads
//! - Live MQTT and OpenTelemetry streams (WebSocket)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   REST / multipart   ┌──────────────────┐
//! │             │─────────────────────►│                  │
//! │ sts-console │   WebSocket (JSON)   │  backend /api/v1 │
//! │             │◄─────────────────────│                  │
//! └─────────────┘   SSE (progress)     └──────────────────┘
//! ```
//!
//! Push streams are exposed as [`StreamHandle`]s: a channel fed by a
//! background task, closed idempotently by the owner.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod progress;
pub mod stream;
pub mod types;
pub mod upload;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use progress::SseDecoder;
pub use stream::{StreamCloser, StreamEvent, StreamHandle};
pub use types::{
    Container, CreateServerRequest, CreateServerResponse, EntryKind, FileTreeEntry,
    FileTreeListing, LogLine, LogResponse, MailAddress, MailContent, MailData, MqttMessage,
    PortMapping, ProgressEvent, ServerTemplate, ServerType, UploadResponse,
};
pub use upload::{ProgressFn, UploadFile};
