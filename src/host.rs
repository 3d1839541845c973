//! Host-application collaborators.
//!
//! The surrounding library owns record storage, preference panes and UI; the
//! engine only sees the traits here. The CLI binary wires in the file-system
//! sink and a log-backed reporter; a richer host supplies its own.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use crate::chain::ResolverEngine;
use crate::models::{Record, ResolvedCandidate};
use crate::resolvers::ResolverMethods;
use crate::utils::HttpClient;

/// A document successfully attached to a record.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Where the document was stored
    pub path: PathBuf,
    /// File name derived from the resolved URL
    pub file_name: String,
    /// Strategy that located the document
    pub access_method: String,
}

/// Errors from the attach collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("candidate has no fetchable URL")]
    NotActionable,

    #[error("failed to fetch document: {0}")]
    Fetch(String),

    #[error("document endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to store document: {0}")]
    Io(#[from] std::io::Error),
}

/// Materializes a document from an actionable candidate.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn attach(
        &self,
        candidate: &ResolvedCandidate,
        record: &dyn Record,
    ) -> Result<Attachment, AttachError>;
}

/// Receives user-facing progress and failure notices (the popup surface of
/// the original host).
pub trait StatusReporter: Send + Sync {
    fn report(&self, headline: &str, detail: &str, is_error: bool);
}

/// Reporter that routes notices to the log.
#[derive(Debug, Default)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, headline: &str, detail: &str, is_error: bool) {
        if is_error {
            tracing::warn!(detail, "{}", headline);
        } else {
            tracing::info!(detail, "{}", headline);
        }
    }
}

/// Sink that downloads the candidate into a directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    client: HttpClient,
    directory: PathBuf,
}

impl FileSink {
    pub fn new(client: HttpClient, directory: impl Into<PathBuf>) -> Self {
        Self {
            client,
            directory: directory.into(),
        }
    }

    /// Keeps the last token of the path supposing it is a filename, eg
    /// `https://example.com/path/<filename.pdf>?params`.
    fn file_name_from_url(url: &url::Url) -> Option<String> {
        url.path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string)
    }
}

#[async_trait]
impl DocumentSink for FileSink {
    async fn attach(
        &self,
        candidate: &ResolvedCandidate,
        record: &dyn Record,
    ) -> Result<Attachment, AttachError> {
        let target = candidate.target().ok_or(AttachError::NotActionable)?;

        let mut request = self.client.get(target);
        if let Some(referrer) = &candidate.referrer {
            request = request.header(reqwest::header::REFERER, referrer.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| AttachError::Fetch(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AttachError::Status(response.status()));
        }

        let final_url = response.url().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| AttachError::Fetch(err.to_string()))?;

        let file_name =
            Self::file_name_from_url(&final_url).unwrap_or_else(|| "document.pdf".to_string());
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(&file_name);
        std::fs::write(&path, &bytes)?;

        tracing::info!(
            record = %record.title(),
            path = %path.display(),
            "attached document"
        );

        Ok(Attachment {
            path,
            file_name,
            access_method: candidate.access_method.clone(),
        })
    }
}

/// Observer of record lifecycle events.
#[async_trait]
pub trait RecordObserver: Send + Sync {
    async fn records_added(&self, records: &[Arc<dyn Record>]);
}

/// In-process notification bus.
///
/// Registration is scoped: the returned guard deregisters the observer when
/// dropped, so an unloaded module can never leave a stale callback behind.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    observers: Mutex<HashMap<u64, Arc<dyn RecordObserver>>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; it stays registered for the guard's lifetime.
    pub fn register(&self, observer: Arc<dyn RecordObserver>) -> ObserverRegistration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.lock().unwrap().insert(id, observer);
        ObserverRegistration {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver an "added" event to every registered observer.
    pub async fn emit_added(&self, records: &[Arc<dyn Record>]) {
        let observers: Vec<Arc<dyn RecordObserver>> = self
            .inner
            .observers
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();

        for observer in observers {
            observer.records_added(records).await;
        }
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.inner.observers.lock().unwrap().len()
    }
}

/// RAII registration handle; dropping it deregisters the observer.
pub struct ObserverRegistration {
    bus: Weak<BusInner>,
    id: u64,
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Ok(mut observers) = bus.observers.lock() {
                observers.remove(&self.id);
            }
        }
    }
}

/// Kicks off resolution for records as they are added, when the
/// automatic-download preference is on. The flag is read at event time, so
/// toggling it takes effect without re-registering.
pub struct AutoDownloadObserver {
    engine: Arc<ResolverEngine>,
}

impl AutoDownloadObserver {
    pub fn new(engine: Arc<ResolverEngine>) -> Self {
        Self { engine }
    }

    /// Register the hook on a bus; resolution stops when the returned guard
    /// is dropped.
    pub fn register(engine: Arc<ResolverEngine>, bus: &NotificationBus) -> ObserverRegistration {
        bus.register(Arc::new(Self::new(engine)))
    }
}

#[async_trait]
impl RecordObserver for AutoDownloadObserver {
    async fn records_added(&self, records: &[Arc<dyn Record>]) {
        if !self.engine.config().automatic_download {
            return;
        }
        self.engine
            .update_records(records, ResolverMethods::default(), true)
            .await;
    }
}
