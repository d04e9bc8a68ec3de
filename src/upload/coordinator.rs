//! Upload coordinator
//!
//! Owns the list of upload tasks and drives each file through the handshake:
//!
//! 1. request a signed URL from the [`SignedUrlIssuer`]
//! 2. PUT the bytes to that URL through the [`ObjectStore`]
//! 3. register the stored object with the [`DocumentRegistrar`]
//!
//! Steps 1 and 2 are reported as `uploading` while a [`ProgressEstimator`]
//! ticks the progress; step 3 is reported as `processing`.
//!
//! # Ordering
//!
//! Files run in submission order. With the default `max_concurrent_uploads`
//! of 1 a file is only dequeued once the previous one is terminal, so no two
//! handshakes overlap. Larger values run a bounded pool; the returned tasks
//! still follow submission order.
//!
//! # Failure isolation
//!
//! A failing step marks only its own task `error`. The error never escapes
//! [`UploadCoordinator::submit`] or [`UploadCoordinator::retry`], and the rest
//! of the batch keeps going.
//!
//! # Cancellation
//!
//! [`UploadCoordinator::remove`] and [`UploadCoordinator::clear`] cancel the
//! dropped tasks. The pipeline races every remote call against the task's
//! token, so a dismissed task stops at its next suspension point and its
//! results are discarded.
//!
//! Dropping a `submit` or `retry` future before it resolves marks the tasks
//! it still owned `error` ("Upload interrupted"), so they never stay in
//! flight and can be retried.
//!
//! # Example
//!
//! ```no_run
//! use kb_uploadr::upload::memory::MemoryBackend;
//! use kb_uploadr::upload::{CoordinatorOptions, UploadCoordinator, UploadFile};
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = UploadCoordinator::builder()
//!     .backend(Arc::new(MemoryBackend::new()))
//!     .options(CoordinatorOptions::new("kb-123", "knowledge-base"))
//!     .build()?;
//!
//! let file = UploadFile::new("a.pdf", "application/pdf", Bytes::from_static(b"%PDF"));
//! let tasks = coordinator.submit(vec![file]).await;
//! println!("{:?}", tasks[0].status());
//! # Ok(())
//! # }
//! ```

use super::document::{Document, DocumentKind, DocumentRegistration};
use super::keys;
use super::progress::{ProgressEstimator, SimulatedRamp};
use super::task::{UploadFile, UploadTask};
use super::{DocumentRegistrar, ObjectStore, SignedUrlIssuer, SignedUrlRequest, UploadError};
use crate::config::Config;
use crate::metrics;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Receives task list snapshots and batch outcomes.
///
/// All methods default to no-ops. They are called outside the task list
/// lock, so implementations may read the coordinator.
pub trait UploadObserver: Send + Sync {
    /// Called after every change to the task list
    fn on_progress(&self, _tasks: &[UploadTask]) {}

    /// Called once per batch with the documents of the files that completed
    fn on_complete(&self, _documents: &[Document]) {}

    /// Called once per batch when fewer files completed than were submitted
    fn on_error(&self, _failed: usize) {}
}

/// Coordinator builder errors
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("max_concurrent_uploads must be at least 1")]
    ZeroConcurrency,
}

/// Coordinator options
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Knowledge base that documents are registered under
    pub knowledge_base_id: String,
    /// Storage bucket sent to the signed-URL issuer
    pub bucket: String,
    /// First segment of every object key (may be empty)
    pub key_prefix: String,
    /// Period of the progress ramp
    pub tick_interval: Duration,
    /// 1 = strictly sequential
    pub max_concurrent_uploads: usize,
    pub record_metrics: bool,
}

impl CoordinatorOptions {
    pub fn new(knowledge_base_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            bucket: bucket.into(),
            key_prefix: "kb".to_string(),
            tick_interval: Duration::from_millis(200),
            max_concurrent_uploads: 1,
            record_metrics: false,
        }
    }

    pub fn from_config(config: &Config, knowledge_base_id: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            bucket: config.storage.bucket.clone(),
            key_prefix: config.storage.key_prefix.clone(),
            tick_interval: config.upload.progress.tick_interval(),
            max_concurrent_uploads: config.upload.max_concurrent_uploads,
            record_metrics: config.metrics.enabled,
        }
    }
}

/// Builder for UploadCoordinator
#[derive(Default)]
pub struct UploadCoordinatorBuilder {
    issuer: Option<Arc<dyn SignedUrlIssuer>>,
    store: Option<Arc<dyn ObjectStore>>,
    registrar: Option<Arc<dyn DocumentRegistrar>>,
    estimator: Option<Arc<dyn ProgressEstimator>>,
    observer: Option<Arc<dyn UploadObserver>>,
    options: Option<CoordinatorOptions>,
}

impl UploadCoordinatorBuilder {
    pub fn issuer(mut self, issuer: Arc<dyn SignedUrlIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registrar(mut self, registrar: Arc<dyn DocumentRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Use one value for all three remote roles
    pub fn backend<B>(self, backend: Arc<B>) -> Self
    where
        B: SignedUrlIssuer + ObjectStore + DocumentRegistrar + 'static,
    {
        self.issuer(backend.clone())
            .object_store(backend.clone())
            .registrar(backend)
    }

    /// Defaults to [`SimulatedRamp::default`]
    pub fn progress_estimator(mut self, estimator: Arc<dyn ProgressEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(mut self, options: CoordinatorOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Result<UploadCoordinator, BuildError> {
        let options = self.options.ok_or(BuildError::Missing("options"))?;
        if options.max_concurrent_uploads == 0 {
            return Err(BuildError::ZeroConcurrency);
        }

        let inner = Inner {
            slots: Mutex::new(Vec::new()),
            issuer: self.issuer.ok_or(BuildError::Missing("signed URL issuer"))?,
            store: self.store.ok_or(BuildError::Missing("object store"))?,
            registrar: self.registrar.ok_or(BuildError::Missing("document registrar"))?,
            estimator: self
                .estimator
                .unwrap_or_else(|| Arc::new(SimulatedRamp::default())),
            observer: self.observer,
            options,
        };

        Ok(UploadCoordinator {
            inner: Arc::new(inner),
        })
    }
}

struct Slot {
    task: UploadTask,
    cancel: CancellationToken,
}

/// Fails the tasks of a `submit` or `retry` whose future is dropped before
/// they reach a terminal state, so they can be retried.
///
/// Every task token of the batch is a child of `batch`. On drop the batch is
/// cancelled and each listed task that is still in flight under a cancelled
/// token is marked `error`. A slot claimed again by a later `retry` holds a
/// fresh token and is left alone.
struct BatchGuard<'a> {
    coordinator: &'a UploadCoordinator,
    batch: CancellationToken,
    armed: bool,
}

impl<'a> BatchGuard<'a> {
    fn new(coordinator: &'a UploadCoordinator) -> Self {
        Self {
            coordinator,
            batch: CancellationToken::new(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.batch.cancel();

        let interrupted = {
            let mut slots = self.coordinator.inner.slots.lock();
            let mut count = 0usize;
            for slot in slots
                .iter_mut()
                .filter(|slot| slot.cancel.is_cancelled() && !slot.task.status().is_terminal())
            {
                slot.task.fail(UploadError::Interrupted.to_string());
                count += 1;
            }
            count
        };

        if interrupted > 0 {
            warn!(interrupted, "Upload batch dropped before finishing");
            self.coordinator.notify_progress();
        }
    }
}

struct Inner {
    slots: Mutex<Vec<Slot>>,
    issuer: Arc<dyn SignedUrlIssuer>,
    store: Arc<dyn ObjectStore>,
    registrar: Arc<dyn DocumentRegistrar>,
    estimator: Arc<dyn ProgressEstimator>,
    observer: Option<Arc<dyn UploadObserver>>,
    options: CoordinatorOptions,
}

/// Upload coordinator
///
/// Cloning is cheap and every clone shares the same task list, so a caller
/// can read snapshots while a `submit` is running elsewhere.
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<Inner>,
}

impl UploadCoordinator {
    pub fn builder() -> UploadCoordinatorBuilder {
        UploadCoordinatorBuilder::default()
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.inner.options
    }

    /// Snapshot of the task list
    pub fn tasks(&self) -> Vec<UploadTask> {
        self.inner
            .slots
            .lock()
            .iter()
            .map(|slot| slot.task.clone())
            .collect()
    }

    pub fn task(&self, index: usize) -> Option<UploadTask> {
        self.inner
            .slots
            .lock()
            .get(index)
            .map(|slot| slot.task.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.lock().is_empty()
    }

    /// True while any task in the list has not reached a terminal state.
    ///
    /// Advisory: the coordinator does not reject concurrent submissions.
    pub fn is_uploading(&self) -> bool {
        self.inner
            .slots
            .lock()
            .iter()
            .any(|slot| !slot.task.status().is_terminal())
    }

    /// Queue `files` and run them through the pipeline.
    ///
    /// Returns the batch's tasks in submission order once every file is
    /// terminal. An empty list is a no-op.
    #[tracing::instrument(
        name = "upload.submit",
        skip(self, files),
        fields(
            knowledge_base = %self.inner.options.knowledge_base_id,
            files = files.len()
        )
    )]
    pub async fn submit(&self, files: Vec<UploadFile>) -> Vec<UploadTask> {
        if files.is_empty() {
            return Vec::new();
        }

        let mut guard = BatchGuard::new(self);
        let queued: Vec<(UploadTask, CancellationToken)> = {
            let mut slots = self.inner.slots.lock();
            files
                .into_iter()
                .map(|file| {
                    let task = UploadTask::new(file);
                    let cancel = guard.batch.child_token();
                    slots.push(Slot {
                        task: task.clone(),
                        cancel: cancel.clone(),
                    });
                    (task, cancel)
                })
                .collect()
        };
        self.notify_progress();

        let concurrency = self.inner.options.max_concurrent_uploads.max(1);
        let finished: Vec<UploadTask> = stream::iter(queued)
            .map(|(task, cancel)| self.process(task, cancel))
            .buffered(concurrency)
            .collect()
            .await;
        guard.disarm();

        self.report_batch(&finished);
        finished
    }

    /// Re-run the full pipeline for the task at `index`.
    ///
    /// Returns `None` without doing anything when the index is out of range
    /// or the task is not terminal.
    #[tracing::instrument(name = "upload.retry", skip(self))]
    pub async fn retry(&self, index: usize) -> Option<UploadTask> {
        let mut guard = BatchGuard::new(self);
        let (task, cancel) = {
            let mut slots = self.inner.slots.lock();
            let slot = slots.get_mut(index)?;
            if !slot.task.status().is_terminal() {
                debug!(status = ?slot.task.status(), "Retry ignored, task still in flight");
                return None;
            }
            // Claim the slot before releasing the lock so a second retry is a no-op.
            slot.task.begin();
            slot.cancel = guard.batch.child_token();
            (slot.task.clone(), slot.cancel.clone())
        };
        self.notify_progress();

        let finished = self.process(task, cancel).await;
        guard.disarm();
        self.report_batch(std::slice::from_ref(&finished));
        Some(finished)
    }

    /// Remove the task at `index`, cancelling it if still in flight.
    pub fn remove(&self, index: usize) -> Option<UploadTask> {
        let removed = {
            let mut slots = self.inner.slots.lock();
            if index >= slots.len() {
                return None;
            }
            slots.remove(index)
        };
        removed.cancel.cancel();
        debug!(task_id = %removed.task.id(), "Upload task removed");
        self.notify_progress();
        Some(removed.task)
    }

    /// Empty the task list, cancelling everything still in flight.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.inner.slots.lock());
        for slot in &drained {
            slot.cancel.cancel();
        }
        debug!(removed = drained.len(), "Upload task list cleared");
        self.notify_progress();
    }

    #[tracing::instrument(
        name = "upload.task",
        skip_all,
        fields(
            task_id = %task.id(),
            file = %task.file().name(),
            bytes = task.file().size()
        )
    )]
    async fn process(&self, mut task: UploadTask, cancel: CancellationToken) -> UploadTask {
        if cancel.is_cancelled() {
            task.fail(UploadError::Cancelled.to_string());
            return task;
        }

        let started = Instant::now();
        task.begin();
        self.publish(&task);

        match self.run_pipeline(&mut task, &cancel).await {
            Ok(document) => {
                if self.inner.options.record_metrics {
                    metrics::record_upload_success(task.file().size());
                    metrics::record_stage_duration("total", started.elapsed().as_secs_f64());
                }
                info!(
                    document_id = %document.id,
                    duration_ms = started.elapsed().as_millis(),
                    "Upload completed"
                );
                task.complete(document);
            }
            Err(UploadError::Cancelled) => {
                info!("Upload cancelled");
                task.fail(UploadError::Cancelled.to_string());
            }
            Err(e) => {
                if self.inner.options.record_metrics {
                    metrics::record_upload_failure(e.stage());
                }
                error!(
                    stage = e.stage(),
                    error = %e,
                    duration_ms = started.elapsed().as_millis(),
                    "Upload failed"
                );
                task.fail(e.to_string());
            }
        }

        self.publish(&task);
        task
    }

    async fn run_pipeline(
        &self,
        task: &mut UploadTask,
        cancel: &CancellationToken,
    ) -> Result<Document, UploadError> {
        let options = &self.inner.options;
        let file = task.file().clone();

        let transfer_started = Instant::now();
        let object_url = self
            .with_progress(task, cancel, self.transfer(&file))
            .await?;
        if options.record_metrics {
            metrics::record_stage_duration("transfer", transfer_started.elapsed().as_secs_f64());
        }

        if cancel.is_cancelled() {
            warn!(object_url = %object_url, "Upload cancelled after transfer, object left unregistered");
            return Err(UploadError::Cancelled);
        }

        task.mark_processing();
        self.publish(task);

        let registration = DocumentRegistration {
            knowledge_base_id: options.knowledge_base_id.clone(),
            name: file.name().to_string(),
            url: object_url.clone(),
            file_type: DocumentKind::classify(file.name(), file.content_type()),
            size: file.size(),
        };

        let registration_started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = self.inner.registrar.register(&registration) => result,
        };
        if options.record_metrics {
            metrics::record_stage_duration(
                "registration",
                registration_started.elapsed().as_secs_f64(),
            );
        }

        if let Err(e) = &result {
            warn!(object_url = %object_url, error = %e, "Stored object has no document record");
        }
        result
    }

    /// Steps 1 and 2: acquire a signed URL and PUT the bytes.
    ///
    /// Returns the object URL (the signed URL without its query string).
    async fn transfer(&self, file: &UploadFile) -> Result<String, UploadError> {
        let options = &self.inner.options;
        let request = SignedUrlRequest {
            bucket: options.bucket.clone(),
            key: keys::storage_key(
                &options.key_prefix,
                &options.knowledge_base_id,
                file.name(),
                Uuid::new_v4(),
            ),
            content_type: file.content_type().to_string(),
            metadata: HashMap::from([
                ("original_name".to_string(), file.name().to_string()),
                (
                    "knowledge_base_id".to_string(),
                    options.knowledge_base_id.clone(),
                ),
                ("size".to_string(), file.size().to_string()),
            ]),
        };

        let signed_url = self.inner.issuer.signed_url(&request).await?;
        debug!(key = %request.key, "Acquired signed upload URL");

        self.inner
            .store
            .put(&signed_url, file.data().clone(), file.content_type())
            .await?;
        debug!(key = %request.key, "Object stored");

        Ok(keys::object_url(&signed_url))
    }

    /// Drive `operation` to completion while ticking the progress estimator.
    async fn with_progress<T, F>(
        &self,
        task: &mut UploadTask,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, UploadError>
    where
        F: Future<Output = Result<T, UploadError>>,
    {
        tokio::pin!(operation);

        let period = self
            .inner
            .options
            .tick_interval
            .max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                result = &mut operation => return result,
                _ = ticker.tick() => {
                    let next = self.inner.estimator.advance(task.progress());
                    if task.advance_to(next) {
                        self.publish(task);
                    }
                }
            }
        }
    }

    /// Copy `task` into its slot if the caller still holds it.
    fn publish(&self, task: &UploadTask) {
        let found = {
            let mut slots = self.inner.slots.lock();
            match slots.iter_mut().find(|slot| slot.task.id() == task.id()) {
                Some(slot) => {
                    slot.task = task.clone();
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify_progress();
        }
    }

    fn notify_progress(&self) {
        if let Some(observer) = &self.inner.observer {
            let snapshot = self.tasks();
            observer.on_progress(&snapshot);
        }
    }

    fn report_batch(&self, finished: &[UploadTask]) {
        let documents: Vec<Document> = finished
            .iter()
            .filter_map(|task| task.document().cloned())
            .collect();
        let failed = finished.len() - documents.len();

        if failed > 0 {
            warn!(failed, total = finished.len(), "Upload batch finished with failures");
        } else {
            info!(total = finished.len(), "Upload batch finished");
        }

        if let Some(observer) = &self.inner.observer {
            observer.on_complete(&documents);
            if failed > 0 {
                observer.on_error(failed);
            }
        }
    }
}
