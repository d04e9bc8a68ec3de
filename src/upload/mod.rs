//! Upload module
//!
//! Drives knowledge-base files through the three-step handshake:
//! signed URL acquisition, direct-to-storage PUT, document registration.
//!
//! The remote side is reached through three traits so that HTTP, in-memory
//! and mock backends are interchangeable:
//!
//! | Trait | Step | Failure |
//! |-------|------|---------|
//! | [`SignedUrlIssuer`] | acquire a time-limited upload URL | [`UploadError::Acquisition`] |
//! | [`ObjectStore`] | PUT the bytes to that URL | [`UploadError::Transfer`] |
//! | [`DocumentRegistrar`] | persist the document record | [`UploadError::Registration`] |

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

pub mod coordinator;
pub mod document;
pub mod keys;
pub mod memory;
pub mod progress;
pub mod task;

pub use coordinator::{
    BuildError, CoordinatorOptions, UploadCoordinator, UploadCoordinatorBuilder, UploadObserver,
};
pub use document::{Document, DocumentKind, DocumentRegistration};
pub use progress::{ProgressEstimator, SimulatedRamp};
pub use task::{UploadFile, UploadStatus, UploadTask};

/// Upload errors
///
/// Every variant is caught per file by the coordinator and turned into the
/// task's `error` status; none of them escapes `submit` or `retry`.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to acquire upload URL: {0}")]
    Acquisition(String),

    #[error("Failed to transfer file to storage: {0}")]
    Transfer(String),

    #[error("Failed to register document: {0}")]
    Registration(String),

    #[error("Upload cancelled")]
    Cancelled,

    /// The batch driving the upload was dropped before the task finished
    #[error("Upload interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Pipeline step the error originated from, used as a log field and metric label
    pub fn stage(&self) -> &'static str {
        match self {
            UploadError::Acquisition(_) => "acquisition",
            UploadError::Transfer(_) => "transfer",
            UploadError::Registration(_) => "registration",
            UploadError::Cancelled => "cancelled",
            UploadError::Interrupted => "interrupted",
            UploadError::Io(_) => "io",
        }
    }
}

/// Request for a signed upload URL
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrlRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

/// Issues time-limited upload URLs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignedUrlIssuer: Send + Sync {
    /// Request an upload URL for `request.key` in `request.bucket`
    async fn signed_url(&self, request: &SignedUrlRequest) -> Result<String, UploadError>;
}

/// Accepts direct uploads to a signed URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// PUT `body` to `url` with the given content type
    async fn put(&self, url: &str, body: Bytes, content_type: &str) -> Result<(), UploadError>;
}

/// Persists document records for uploaded objects
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRegistrar: Send + Sync {
    /// Register an uploaded object and return the stored record
    async fn register(&self, registration: &DocumentRegistration)
        -> Result<Document, UploadError>;
}
