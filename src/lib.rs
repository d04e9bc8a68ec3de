//! kb-uploadr Library
//!
//! Upload coordinator for knowledge-base documents.
//!
//! # Features
//!
//! - **Three-step handshake**: signed URL, direct-to-storage PUT, document registration
//! - **Per-file state**: `pending → uploading → processing → completed | error`
//! - **Failure isolation**: one failing file never blocks or corrupts the rest
//! - **Ordered processing**: strictly sequential by default, bounded pool optional
//! - **Cancellation**: removing a task stops its in-flight network calls
//!
//! # Example
//!
//! ```no_run
//! use kb_uploadr::api::{ApiClient, HttpObjectStore};
//! use kb_uploadr::upload::{CoordinatorOptions, UploadCoordinator, UploadFile};
//! use kb_uploadr::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("kb-uploadr.yaml")?;
//!     let api = Arc::new(ApiClient::from_config(&config.api)?);
//!     let coordinator = UploadCoordinator::builder()
//!         .issuer(api.clone())
//!         .registrar(api)
//!         .object_store(Arc::new(HttpObjectStore::new(config.api.timeout())?))
//!         .options(CoordinatorOptions::from_config(&config, "kb-123"))
//!         .build()?;
//!
//!     let file = UploadFile::from_path("handbook.pdf").await?;
//!     let tasks = coordinator.submit(vec![file]).await;
//!     println!("{:?}", tasks[0].status());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod metrics;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{UploadCoordinator, UploadFile, UploadStatus, UploadTask};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
