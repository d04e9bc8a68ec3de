//! Upload task state model
//!
//! ```text
//! pending --> uploading --> processing --> completed
//!                 |              |
//!                 +--------------+--> error
//! ```
//!
//! The transition methods are crate-private: only the coordinator moves a
//! task through its states, callers read cloned snapshots.

use super::document::{guess_content_type, Document};
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// A file queued for upload. Immutable once created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFile {
    name: String,
    content_type: String,
    size: u64,
    #[serde(skip)]
    data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: data.len() as u64,
            data,
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path {:?} has no usable file name", path),
                )
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;
        let content_type = guess_content_type(&name);
        Ok(Self::new(name, content_type, Bytes::from(data)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Payload bytes (cheap to clone)
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Error,
}

impl UploadStatus {
    /// `completed` and `error` are terminal; only `retry` leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

/// One file's journey through the pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    id: Uuid,
    file: UploadFile,
    progress: u8,
    status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<Document>,
}

impl UploadTask {
    pub(crate) fn new(file: UploadFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            progress: 0,
            status: UploadStatus::Pending,
            error: None,
            document: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Failure message, set only in `error`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Registered document, set only in `completed`
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Enter `uploading` from any state, clearing a previous outcome.
    pub(crate) fn begin(&mut self) {
        self.status = UploadStatus::Uploading;
        self.progress = 0;
        self.error = None;
        self.document = None;
    }

    /// Raise progress. Never decreases and never exceeds 100.
    pub(crate) fn advance_to(&mut self, progress: u8) -> bool {
        let next = progress.min(100).max(self.progress);
        let changed = next != self.progress;
        self.progress = next;
        changed
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = UploadStatus::Processing;
    }

    pub(crate) fn complete(&mut self, document: Document) {
        self.status = UploadStatus::Completed;
        self.progress = 100;
        self.error = None;
        self.document = Some(document);
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = UploadStatus::Error;
        self.error = Some(message.into());
        self.document = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::document::DocumentKind;

    fn file() -> UploadFile {
        UploadFile::new("a.pdf", "application/pdf", Bytes::from_static(b"%PDF-1.7"))
    }

    fn document() -> Document {
        Document {
            id: "doc-1".into(),
            name: "a.pdf".into(),
            url: "https://storage/a.pdf".into(),
            file_type: DocumentKind::Pdf,
            size: 8,
            knowledge_base_id: None,
            created_at: None,
        }
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = UploadTask::new(file());
        assert_eq!(task.status(), UploadStatus::Pending);
        assert_eq!(task.progress(), 0);
        assert_eq!(task.file().size(), 8);
        assert!(task.error().is_none());
        assert!(task.document().is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let mut task = UploadTask::new(file());
        task.begin();
        assert!(task.advance_to(30));
        assert!(!task.advance_to(20));
        assert_eq!(task.progress(), 30);
        task.advance_to(250);
        assert_eq!(task.progress(), 100);
    }

    #[test]
    fn test_terminal_states_are_exclusive() {
        let mut task = UploadTask::new(file());
        task.begin();
        task.fail("boom");
        assert_eq!(task.status(), UploadStatus::Error);
        assert!(task.document().is_none());

        task.begin();
        assert!(task.error().is_none());
        assert_eq!(task.progress(), 0);

        task.mark_processing();
        task.complete(document());
        assert_eq!(task.status(), UploadStatus::Completed);
        assert_eq!(task.progress(), 100);
        assert!(task.error().is_none());
        assert!(task.document().is_some());
    }

    #[test]
    fn test_task_serializes_without_payload() {
        let task = UploadTask::new(file());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["file"]["name"], "a.pdf");
        assert!(json["file"].get("data").is_none());
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-notes.md");
        tokio::fs::write(&path, b"# Notes").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "session-notes.md");
        assert_eq!(file.content_type(), "text/markdown");
        assert_eq!(file.size(), 7);
    }
}
