use std::future::Future;

use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{NormalizedRecord, RawEvent, SourceKind};

/// Issues one lightweight request for a URL and reports where it ended up.
///
/// Implementations follow whatever redirects the transport follows and
/// return the final URL. Any failure (including timeout) is an error; the
/// resolver turns it into "unresolved".
pub trait LinkProber: Send + Sync + Clone {
    fn probe(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Pulls links and a text view out of a post body.
pub trait LinkExtractor: Send + Sync + Clone {
    /// Hrefs of human-authored anchors, in document order.
    ///
    /// Anchors carrying a non-empty `class` or `style` (mentions, hashtags)
    /// are skipped. Never fails: unparseable input yields no links.
    fn extract_links(&self, content: &str) -> Vec<String>;

    /// Content with markup stripped and line breaks preserved.
    fn plain_text(&self, content: &str) -> String;
}

/// Append-only destination for classified posts.
pub trait RecordSink: Send + Sync + Clone {
    fn append(
        &self,
        record: &NormalizedRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A producer failure, reported without stopping the pipeline.
#[derive(Debug)]
pub struct SourceError {
    pub source: SourceKind,
    pub error: AppError,
}

impl SourceError {
    pub fn new(source: SourceKind, error: AppError) -> Self {
        Self { source, error }
    }
}

/// A producer of raw posts.
///
/// Each adapter converts its native event shape into [`RawEvent`] before
/// items leave `start`; downstream stages never see source-specific types.
pub trait EventSource: Send + 'static {
    fn kind(&self) -> SourceKind;

    /// Begin producing. The returned stream ends when the source
    /// disconnects or `cancel` fires; failures go to `errors`.
    fn start(
        self,
        errors: mpsc::Sender<SourceError>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, RawEvent>;
}

/// A sink that discards every record, for dry runs.
#[derive(Debug, Clone)]
pub struct NullSink;

impl RecordSink for NullSink {
    async fn append(&self, _record: &NormalizedRecord) -> Result<(), AppError> {
        Ok(())
    }
}
