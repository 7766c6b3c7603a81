//! Wire types exchanged with the backend.
//!
//! Field names follow the backend's JSON exactly; renames are noted where the
//! Rust name differs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ClientError;

/// Protocol server flavours the backend can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServerType {
    /// MQTT broker.
    Mqtt,
    /// Generic HTTP server.
    Web,
    /// FTP server.
    Ftp,
    /// SMB share.
    Smb,
    /// SMTP / mail server.
    Mail,
    /// OpenTelemetry collector.
    Otel,
}

impl ServerType {
    /// All server types, in tab order.
    pub const ALL: [Self; 6] = [
        Self::Mqtt,
        Self::Web,
        Self::Ftp,
        Self::Smb,
        Self::Mail,
        Self::Otel,
    ];

    /// Upper-case wire name used by `/servers/{TYPE}` and container records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mqtt => "MQTT",
            Self::Web => "WEB",
            Self::Ftp => "FTP",
            Self::Smb => "SMB",
            Self::Mail => "MAIL",
            Self::Otel => "OTEL",
        }
    }

    /// Lower-case segment used by `/protocols/{type}/...`.
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::Web => "web",
            Self::Ftp => "ftp",
            Self::Smb => "smb",
            Self::Mail => "mail",
            Self::Otel => "otel",
        }
    }

    /// Human readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mqtt => "MQTT",
            Self::Web => "Web",
            Self::Ftp => "FTP",
            Self::Smb => "SMB",
            Self::Mail => "Mail",
            Self::Otel => "OTEL",
        }
    }

    /// Whether the backend exposes a browsable file tree for this type.
    pub const fn supports_file_tree(self) -> bool {
        matches!(self, Self::Web | Self::Ftp | Self::Smb)
    }

    /// Whether files can be uploaded into this server.
    pub const fn supports_upload(self) -> bool {
        matches!(self, Self::Web | Self::Ftp | Self::Smb)
    }

    /// Whether container logs can be fetched for this type.
    pub const fn supports_logs(self) -> bool {
        !matches!(self, Self::Mqtt)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClientError::Validation(format!("unknown server type: {s}")))
    }
}

impl Serialize for ServerType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A backend-managed running protocol server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Opaque container identifier.
    pub container_id: String,
    /// Container name.
    #[serde(default)]
    pub name: String,
    /// Docker image.
    #[serde(default)]
    pub image: String,
    /// Creation time, milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,
    /// Backend status code.
    #[serde(default)]
    pub status: i64,
    /// Host port → container port.
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    /// Environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Attached docker networks.
    #[serde(default)]
    pub networks: Vec<String>,
    /// Protocol server flavour.
    #[serde(rename = "type")]
    pub server_type: ServerType,
}

impl Container {
    /// Creation time as a UTC timestamp, if representable.
    pub fn created(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.created_at)
    }
}

/// Kind of a file tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory; expandable.
    Dir,
    /// Symbolic link.
    Symlink,
    /// Anything else.
    #[serde(other)]
    Unknown,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeEntry {
    /// File name.
    pub name: String,
    /// Path relative to the server root.
    pub path: String,
    /// Entry kind.
    #[serde(rename = "type", default = "unknown_kind")]
    pub kind: EntryKind,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// RFC 3339 modification time.
    #[serde(rename = "modifiedAt", default)]
    pub modified_at: String,
}

const fn unknown_kind() -> EntryKind {
    EntryKind::Unknown
}

impl FileTreeEntry {
    /// Whether the entry can be expanded.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Result of one directory listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeListing {
    /// Entries of the directory.
    #[serde(default)]
    pub entries: Vec<FileTreeEntry>,
    /// Backend capped the listing.
    #[serde(default)]
    pub truncated: bool,
}

/// One container log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub ts: String,
    /// Log text.
    pub line: String,
}

/// Result of a log tail request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogResponse {
    /// Most recent lines, oldest first.
    #[serde(default)]
    pub lines: Vec<LogLine>,
    /// Backend capped the output.
    #[serde(default)]
    pub truncated: bool,
    /// Whether the container is still running.
    #[serde(default)]
    pub container_running: bool,
}

/// Local part + domain of a mail address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAddress {
    /// Local part.
    #[serde(default, rename = "name")]
    pub local: String,
    /// Domain part.
    #[serde(default)]
    pub domain: String,
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Headers and body of a captured mail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailContent {
    /// Multi-valued headers.
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Raw body.
    #[serde(default)]
    pub body: String,
}

/// A mail captured by the SMTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailData {
    /// Message identifier.
    pub id: String,
    /// Sender.
    #[serde(default)]
    pub from: MailAddress,
    /// Recipients.
    #[serde(default)]
    pub to: Vec<MailAddress>,
    /// RFC 3339 receive time.
    #[serde(default)]
    pub created: String,
    /// Headers and body.
    #[serde(default)]
    pub content: MailContent,
}

impl MailData {
    /// First `Subject` header, or `(No Subject)`.
    pub fn subject(&self) -> &str {
        self.content
            .headers
            .get("Subject")
            .and_then(|values| values.first())
            .map_or("(No Subject)", String::as_str)
    }

    /// Comma separated recipient list.
    pub fn recipients(&self) -> String {
        self.to
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Envelope of `GET /protocols/mail/{id}/messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSummary {
    /// Captured mails.
    #[serde(default)]
    pub emails: Vec<MailData>,
}

/// One message observed by the MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttMessage {
    /// Slash delimited topic.
    pub topic: String,
    /// Opaque payload text.
    pub payload: String,
    /// Backend timestamp, if any.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MqttMessage {
    /// Create a message without a timestamp.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: None,
        }
    }
}

/// Default settings for a server type, from `GET /servers/{TYPE}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTemplate {
    /// Suggested name stem.
    #[serde(default)]
    pub name: String,
    /// Default image.
    #[serde(default)]
    pub image: String,
    /// Exposed container ports.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Default environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A `host:container` port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    /// Port on the host.
    pub host: u16,
    /// Port inside the container.
    pub container: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

impl FromStr for PortMapping {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ClientError::Validation(format!("invalid port mapping '{s}', expected host:container"))
        };
        let (host, container) = s.trim().split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            host: host.trim().parse().map_err(|_| invalid())?,
            container: container.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for PortMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut single = BTreeMap::new();
        single.insert(self.host.to_string(), self.container);
        single.serialize(serializer)
    }
}

/// Body of `POST /servers/{TYPE}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateServerRequest {
    /// Container name.
    pub name: String,
    /// Docker image.
    pub image: String,
    /// Port mappings, each serialized as `{"host": container}`.
    pub ports: Vec<PortMapping>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
}

/// Answer of `POST /servers/{TYPE}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServerResponse {
    /// Request id to follow on the progress stream.
    #[serde(rename = "reqId")]
    pub req_id: String,
}

/// One server-creation progress update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion, 0-100.
    #[serde(default)]
    pub percent: u32,
    /// Human readable step.
    #[serde(default)]
    pub message: String,
    /// Creation failed.
    #[serde(default)]
    pub error: bool,
}

impl ProgressEvent {
    /// Whether no further events are expected.
    pub const fn is_terminal(&self) -> bool {
        self.percent >= 100 || self.error
    }
}

/// Answer of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Where the uploaded resource can be reached.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("MQTT", ServerType::Mqtt ; "upper")]
    #[test_case("Web", ServerType::Web ; "mixed")]
    #[test_case("mail", ServerType::Mail ; "lower")]
    #[test_case(" otel ", ServerType::Otel ; "padded")]
    fn server_type_parses_case_insensitively(raw: &str, expected: ServerType) {
        assert_eq!(raw.parse::<ServerType>().unwrap(), expected);
    }

    #[test]
    fn server_type_rejects_unknown() {
        assert!("gopher".parse::<ServerType>().is_err());
    }

    #[test]
    fn server_type_wire_and_path() {
        assert_eq!(serde_json::to_string(&ServerType::Web).unwrap(), "\"WEB\"");
        assert_eq!(ServerType::Web.path_segment(), "web");
        assert!(ServerType::Smb.supports_file_tree());
        assert!(!ServerType::Mqtt.supports_upload());
        assert!(!ServerType::Mqtt.supports_logs());
    }

    #[test]
    fn container_deserializes_backend_shape() {
        let json = r#"{
            "container_id": "abc",
            "name": "simple-test-server-mqtt-0",
            "image": "simple-test-server-custom-mqtt:latest",
            "created_at": 1700000000000,
            "status": 1,
            "ports": {"1883": 1883, "9001": 9001},
            "env": {"MQTT_USERNAME": "user"},
            "networks": ["bridge"],
            "type": "MQTT"
        }"#;
        let container: Container = serde_json::from_str(json).unwrap();
        assert_eq!(container.container_id, "abc");
        assert_eq!(container.server_type, ServerType::Mqtt);
        assert_eq!(container.ports.get("1883"), Some(&1883));
        assert!(container.created().is_some());
    }

    #[test]
    fn file_entry_unknown_kind_falls_back() {
        let json = r#"{"name":"x","path":"x","type":"socket","size":0,"modifiedAt":""}"#;
        let entry: FileTreeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.kind, EntryKind::Unknown);
        assert!(!entry.is_dir());
    }

    #[test]
    fn mail_subject_defaults() {
        let mail: MailData = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
        assert_eq!(mail.subject(), "(No Subject)");

        let mail: MailData = serde_json::from_str(
            r#"{"id":"2","from":{"name":"a","domain":"x.io"},
                "to":[{"name":"b","domain":"y.io"},{"name":"c","domain":"y.io"}],
                "content":{"headers":{"Subject":["Hi"]},"size":12,"body":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(mail.subject(), "Hi");
        assert_eq!(mail.from.to_string(), "a@x.io");
        assert_eq!(mail.recipients(), "b@y.io, c@y.io");
    }

    #[test]
    fn port_mapping_parse_and_serialize() {
        let mapping: PortMapping = "80:8080".parse().unwrap();
        assert_eq!(mapping, PortMapping { host: 80, container: 8080 });
        assert_eq!(serde_json::to_string(&mapping).unwrap(), r#"{"80":8080}"#);
        assert!("80".parse::<PortMapping>().is_err());
        assert!("a:b".parse::<PortMapping>().is_err());
    }

    #[test]
    fn create_request_shape() {
        let mut env = BTreeMap::new();
        env.insert("ENV".to_string(), "PROD".to_string());
        let req = CreateServerRequest {
            name: "web-0".into(),
            image: "nginx:latest".into(),
            ports: vec![PortMapping { host: 8080, container: 80 }],
            env,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["ports"][0]["8080"], 80);
        assert_eq!(value["env"]["ENV"], "PROD");
    }

    #[test]
    fn progress_terminal_states() {
        assert!(!ProgressEvent { percent: 10, ..Default::default() }.is_terminal());
        assert!(ProgressEvent { percent: 100, ..Default::default() }.is_terminal());
        assert!(ProgressEvent { percent: 40, error: true, ..Default::default() }.is_terminal());
    }

    #[test]
    fn create_response_uses_req_id() {
        let resp: CreateServerResponse = serde_json::from_str(r#"{"reqId":"r-1"}"#).unwrap();
        assert_eq!(resp.req_id, "r-1");
    }
}
