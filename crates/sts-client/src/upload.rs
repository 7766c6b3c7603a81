//! Multipart file upload with progress reporting.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::client::{ApiClient, read_json};
use crate::error::{ClientError, Result};
use crate::types::{ServerType, UploadResponse};

/// Progress callback receiving a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A file staged for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Name sent in the multipart `filename` attribute.
    pub file_name: String,
    /// File contents.
    pub bytes: Bytes,
}

impl UploadFile {
    /// Stage in-memory contents.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::Validation(format!("{} has no file name", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl ApiClient {
    /// Upload a file into a server via `POST /protocols/{type}/{id}/upload`.
    ///
    /// `on_progress` is called after each body chunk is handed to the
    /// transport, with non-decreasing percentages ending at 100. An empty file
    /// produces no progress calls.
    pub async fn upload_file(
        &self,
        server_id: &str,
        file: UploadFile,
        server_type: ServerType,
        on_progress: Option<ProgressFn>,
    ) -> Result<UploadResponse> {
        let url = self.endpoint(&["protocols", server_type.path_segment(), server_id, "upload"])?;
        let total = file.len() as u64;
        debug!(path = url.path(), file = %file.file_name, bytes = total, "Uploading file");

        let body = progress_body(file.bytes, self.config.upload_chunk_size, on_progress);
        let part = Part::stream_with_length(body, total)
            .file_name(file.file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self.http.post(url).multipart(form).send().await?;
        let uploaded: UploadResponse = read_json(response).await?;
        info!(url = %uploaded.url, "Upload finished");
        Ok(uploaded)
    }
}

fn progress_body(
    bytes: Bytes,
    chunk_size: usize,
    on_progress: Option<ProgressFn>,
) -> reqwest::Body {
    let total = bytes.len();
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..total)
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(total)))
        .collect();

    let mut sent = 0usize;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len();
        if let Some(report) = &on_progress {
            report(percent(sent, total));
        }
        Ok::<Bytes, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) as u128 * 100) / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(10, 10), 100);
        assert_eq!(percent(20, 10), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn upload_file_helpers() {
        let file = UploadFile::new("hello.txt", &b"hello"[..]);
        assert_eq!(file.len(), 5);
        assert!(!file.is_empty());
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        tokio::fs::write(&path, b"<h1>hi</h1>").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "index.html");
        assert_eq!(&file.bytes[..], b"<h1>hi</h1>");
    }

    #[tokio::test]
    async fn from_path_missing_file_is_io_error() {
        let err = UploadFile::from_path("/definitely/not/here.txt").await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
