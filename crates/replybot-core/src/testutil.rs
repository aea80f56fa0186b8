//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{NormalizedRecord, RawEvent, SourceKind};
use crate::pipeline::{PipelineEvent, PipelineReporter};
use crate::traits::{EventSource, LinkExtractor, LinkProber, RecordSink, SourceError};

// ---------------------------------------------------------------------------
// MockProber
// ---------------------------------------------------------------------------

/// Mock prober backed by a redirect table.
///
/// URLs without an entry "resolve" to themselves. Errors are one-shot.
#[derive(Clone, Default)]
pub struct MockProber {
    redirects: Arc<Mutex<HashMap<String, String>>>,
    errors: Arc<Mutex<HashMap<String, AppError>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.redirects.lock().unwrap().insert(from.into(), to.into());
        self
    }

    pub fn with_error(self, url: impl Into<String>, error: AppError) -> Self {
        self.errors.lock().unwrap().insert(url.into(), error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LinkProber for MockProber {
    async fn probe(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(e) = self.errors.lock().unwrap().remove(url) {
            return Err(e);
        }
        Ok(self
            .redirects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor returning a fixed link list and the content as its text view.
#[derive(Clone, Default)]
pub struct MockExtractor {
    links: Arc<Vec<String>>,
}

impl MockExtractor {
    /// Extractor that never finds links.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn with_links(links: Vec<String>) -> Self {
        Self {
            links: Arc::new(links),
        }
    }
}

impl LinkExtractor for MockExtractor {
    fn extract_links(&self, _content: &str) -> Vec<String> {
        self.links.as_ref().clone()
    }

    fn plain_text(&self, content: &str) -> String {
        content.to_string()
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Mock sink that records appends.
///
/// `failures` is consumed one entry per append: `Some(err)` fails that
/// append, `None` lets it through. Once exhausted, every append succeeds.
#[derive(Clone, Default)]
pub struct MockSink {
    pub appended: Arc<Mutex<Vec<NormalizedRecord>>>,
    failures: Arc<Mutex<Vec<Option<AppError>>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(failures: Vec<Option<AppError>>) -> Self {
        Self {
            appended: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(failures)),
        }
    }

    pub fn appended_ids(&self) -> Vec<String> {
        self.appended
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }
}

impl RecordSink for MockSink {
    async fn append(&self, record: &NormalizedRecord) -> Result<(), AppError> {
        let failure = {
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                None
            } else {
                failures.remove(0)
            }
        };
        if let Some(e) = failure {
            return Err(e);
        }
        self.appended.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Mock producer that emits a fixed list of events, then ends.
pub struct MockSource {
    kind: SourceKind,
    events: Vec<RawEvent>,
    errors: Vec<AppError>,
}

impl MockSource {
    pub fn new(kind: SourceKind, events: Vec<RawEvent>) -> Self {
        Self {
            kind,
            events,
            errors: Vec::new(),
        }
    }

    /// Errors are sent on the error channel before any event is emitted.
    pub fn with_errors(mut self, errors: Vec<AppError>) -> Self {
        self.errors = errors;
        self
    }
}

impl EventSource for MockSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn start(
        self,
        errors: mpsc::Sender<SourceError>,
        _cancel: CancellationToken,
    ) -> BoxStream<'static, RawEvent> {
        let kind = self.kind;
        let failures = self.errors;
        let events = self.events;
        stream::once(async move {
            for error in failures {
                let _ = errors.send(SourceError::new(kind, error)).await;
            }
            stream::iter(events)
        })
        .flatten()
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a short tag for every event it sees.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn contains(&self, tag: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == tag)
    }

    pub fn count(&self, tag: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == tag)
            .count()
    }
}

impl PipelineReporter for RecordingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        let tag = match event {
            PipelineEvent::Started => "started".to_string(),
            PipelineEvent::StateChanged { state } => format!("state:{state}"),
            PipelineEvent::EventReceived { .. } => "received".to_string(),
            PipelineEvent::Classified { category, .. } => format!("classified:{category}"),
            PipelineEvent::Dropped { .. } => "dropped".to_string(),
            PipelineEvent::InvalidRecord { .. } => "invalid".to_string(),
            PipelineEvent::SourceFailed { .. } => "source_failed".to_string(),
            PipelineEvent::Enqueued { .. } => "enqueued".to_string(),
            PipelineEvent::Written { .. } => "written".to_string(),
            PipelineEvent::WriteFailed { .. } => "write_failed".to_string(),
            PipelineEvent::Stopped { .. } => "stopped".to_string(),
            PipelineEvent::WriterStopped { .. } => "writer_stopped".to_string(),
        };
        self.events.lock().unwrap().push(tag);
    }
}
