//! # sts-console
//!
//! Terminal console for simple-test-server protocol containers.
//!
//! One tab per running server plus a "New Server" tab. Each tab mounts a
//! protocol view:
//! - MQTT: live topic tree and message log
//! - Web / FTP / SMB: lazily loaded folder tree, uploads and logs
//! - Mail: captured mailbox
//! - OTEL: filterable telemetry stream
//!
//! Backend calls run on spawned tasks and report back through the app's
//! event channel; the UI loop is the only owner of view state.

#![forbid(unsafe_code)]

pub mod app;
pub mod data;
pub mod events;
pub mod file_tree;
pub mod format;
pub mod history;
pub mod status;
pub mod tabs;
pub mod topic_tree;
pub mod ui;
pub mod views;
pub mod widgets;

#[cfg(test)]
mod test_support;
