//! In-memory backend
//!
//! Implements all three remote roles without a network. Used by the CLI's
//! `--dry-run` mode, the test suite and the benchmarks.
//!
//! Failures can be injected per file name and stage, and an artificial
//! latency can be added to every call so the progress ramp has time to tick.

use super::document::{Document, DocumentRegistration};
use super::keys;
use super::{DocumentRegistrar, ObjectStore, SignedUrlIssuer, SignedUrlRequest, UploadError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Step at which an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Acquisition,
    Transfer,
    Registration,
}

/// A remote call observed by the backend, in call order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendCall {
    SignedUrl { name: String },
    Put { name: String },
    Register { name: String },
}

#[derive(Default)]
struct State {
    /// signed URL (without query) -> original file name
    issued: HashMap<String, String>,
    objects: HashMap<String, Bytes>,
    documents: Vec<Document>,
    failures: HashMap<String, FailAt>,
    calls: Vec<BackendCall>,
}

/// In-memory signed-URL issuer, object store and document registrar
pub struct MemoryBackend {
    base_url: String,
    latency: Duration,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            base_url: "memory://storage".to_string(),
            latency: Duration::ZERO,
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every upload of `name` fail at `stage` until cleared
    pub fn fail(&self, name: &str, stage: FailAt) {
        self.state.lock().failures.insert(name.to_string(), stage);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Stored objects keyed by object URL
    pub fn objects(&self) -> HashMap<String, Bytes> {
        self.state.lock().objects.clone()
    }

    /// Registered documents in registration order
    pub fn documents(&self) -> Vec<Document> {
        self.state.lock().documents.clone()
    }

    /// Remote calls in the order they were made
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn should_fail(&self, name: &str, stage: FailAt) -> bool {
        self.state.lock().failures.get(name) == Some(&stage)
    }
}

#[async_trait]
impl SignedUrlIssuer for MemoryBackend {
    async fn signed_url(&self, request: &SignedUrlRequest) -> Result<String, UploadError> {
        let name = request
            .metadata
            .get("original_name")
            .cloned()
            .unwrap_or_else(|| request.key.clone());
        self.state
            .lock()
            .calls
            .push(BackendCall::SignedUrl { name: name.clone() });
        self.delay().await;

        if self.should_fail(&name, FailAt::Acquisition) {
            return Err(UploadError::Acquisition(format!(
                "issuer rejected request for '{}'",
                name
            )));
        }

        let object_url = format!("{}/{}/{}", self.base_url, request.bucket, request.key);
        let signed = format!("{}?signature={}", object_url, uuid::Uuid::new_v4().simple());
        self.state.lock().issued.insert(object_url, name);
        Ok(signed)
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn put(&self, url: &str, body: Bytes, _content_type: &str) -> Result<(), UploadError> {
        let object_url = keys::object_url(url);
        let name = self
            .state
            .lock()
            .issued
            .get(&object_url)
            .cloned()
            .ok_or_else(|| UploadError::Transfer(format!("HTTP 403: unknown upload URL {}", url)))?;
        self.state
            .lock()
            .calls
            .push(BackendCall::Put { name: name.clone() });
        self.delay().await;

        if self.should_fail(&name, FailAt::Transfer) {
            return Err(UploadError::Transfer(format!(
                "HTTP 500: storage rejected '{}'",
                name
            )));
        }

        self.state.lock().objects.insert(object_url, body);
        Ok(())
    }
}

#[async_trait]
impl DocumentRegistrar for MemoryBackend {
    async fn register(
        &self,
        registration: &DocumentRegistration,
    ) -> Result<Document, UploadError> {
        self.state.lock().calls.push(BackendCall::Register {
            name: registration.name.clone(),
        });
        self.delay().await;

        if self.should_fail(&registration.name, FailAt::Registration) {
            return Err(UploadError::Registration(format!(
                "registrar rejected '{}'",
                registration.name
            )));
        }

        let document = Document {
            id: format!("doc-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
            name: registration.name.clone(),
            url: registration.url.clone(),
            file_type: registration.file_type,
            size: registration.size,
            knowledge_base_id: Some(registration.knowledge_base_id.clone()),
            created_at: Some(Utc::now()),
        };
        self.state.lock().documents.push(document.clone());
        Ok(document)
    }
}
