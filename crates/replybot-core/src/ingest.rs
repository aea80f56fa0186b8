//! End-to-end wiring of the reply-bot pipeline.
//!
//! ```text
//! EventSource ─┐                                  ┌───────────┐
//! EventSource ─┼─> StreamMerger ─> Coordinator ─> │ queue (N) │ ─> WriterStage ─> RecordSink
//!              │        errors ──────┘            └───────────┘
//! ```

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classify::Classifier;
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::merge::{SourceSummary, StreamMerger, join_sources};
use crate::models::RawEvent;
use crate::pipeline::{PipelineCoordinator, PipelineReporter, PipelineStats, WriterStats};
use crate::traits::{EventSource, LinkExtractor, LinkProber, RecordSink, SourceError};
use crate::writer::WriterStage;

/// The set of producers feeding one pipeline run.
///
/// Each source is started as it is added; its stream is merged once
/// [`IngestService::run`] spawns the merger.
pub struct SourceSet {
    merger: StreamMerger<RawEvent>,
    errors_tx: mpsc::Sender<SourceError>,
    errors_rx: mpsc::Receiver<SourceError>,
    cancel: CancellationToken,
}

impl SourceSet {
    pub fn new(config: &PipelineConfig, cancel: CancellationToken) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(config.merge_capacity.max(1));
        Self {
            merger: StreamMerger::with_capacity(config.merge_capacity),
            errors_tx,
            errors_rx,
            cancel,
        }
    }

    pub fn add<E: EventSource>(mut self, source: E) -> Self {
        let name = source.kind().as_str();
        tracing::info!(source = name, "Starting source");
        let stream = source.start(self.errors_tx.clone(), self.cancel.clone());
        self.merger = self.merger.add_source(name, stream);
        self
    }

    pub fn len(&self) -> usize {
        self.merger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merger.is_empty()
    }
}

/// Totals for one complete run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub pipeline: PipelineStats,
    pub writer: WriterStats,
    pub sources: Vec<SourceSummary>,
}

/// Runs sources, coordinator and writer until the sources end or `cancel` fires.
pub struct IngestService<X: LinkExtractor, P: LinkProber, S: RecordSink> {
    coordinator: PipelineCoordinator<X, P>,
    sink: S,
    config: PipelineConfig,
}

impl<X, P, S> IngestService<X, P, S>
where
    X: LinkExtractor,
    P: LinkProber,
    S: RecordSink + 'static,
{
    pub fn new(classifier: Classifier<X, P>, sink: S, config: PipelineConfig) -> Self {
        Self {
            coordinator: PipelineCoordinator::new(classifier),
            sink,
            config,
        }
    }

    /// Run one pipeline.
    ///
    /// On cancellation the coordinator stops taking events, then the writer
    /// drains whatever is already queued before this returns.
    pub async fn run<R>(
        &self,
        sources: SourceSet,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<IngestReport, AppError>
    where
        R: PipelineReporter + Clone + 'static,
    {
        let checked = match self.config.validate() {
            Ok(()) if sources.is_empty() => {
                Err(AppError::ConfigError("no sources configured".into()))
            }
            checked => checked,
        };
        if let Err(e) = checked {
            // Producers were started when added; stop them before bailing.
            cancel.cancel();
            return Err(e);
        }

        let SourceSet {
            merger,
            errors_tx,
            errors_rx,
            ..
        } = sources;
        // Producers hold their own clones; the error channel closes with them.
        drop(errors_tx);

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity);

        let writer = WriterStage::new(self.sink.clone());
        let writer_reporter = reporter.clone();
        let writer_task = tokio::spawn(async move { writer.run(queue_rx, &writer_reporter).await });

        let (events_rx, tasks) = merger.spawn(cancel.clone()).into_parts();

        let pipeline = self
            .coordinator
            .run(events_rx, errors_rx, queue_tx, cancel.clone(), reporter)
            .await;

        // Stop producers in case the coordinator ended for another reason.
        cancel.cancel();

        let writer = writer_task
            .await
            .map_err(|e| AppError::Generic(format!("writer task failed: {e}")))?;
        let sources = join_sources(tasks).await;

        Ok(IngestReport {
            pipeline: pipeline?,
            writer,
            sources,
        })
    }
}
