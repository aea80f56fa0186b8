use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classify::Classifier;
use crate::error::AppError;
use crate::models::{Category, NormalizedRecord, RawEvent, SourceKind};
use crate::traits::{LinkExtractor, LinkProber, SourceError};

/// Lifecycle of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting merged events.
    Streaming,
    /// Cancellation requested; finishing the event in hand, taking no more.
    Draining,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Streaming => write!(f, "streaming"),
            PipelineState::Draining => write!(f, "draining"),
        }
    }
}

/// Events emitted by the pipeline stages for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Started,
    StateChanged {
        state: PipelineState,
    },
    EventReceived {
        source: SourceKind,
        id: &'a str,
    },
    Classified {
        id: &'a str,
        url: &'a str,
        category: Category,
    },
    Dropped {
        source: SourceKind,
        id: &'a str,
    },
    InvalidRecord {
        id: &'a str,
        error: &'a str,
    },
    SourceFailed {
        source: SourceKind,
        error: &'a str,
    },
    Enqueued {
        id: &'a str,
    },
    Written {
        id: &'a str,
        category: Category,
    },
    WriteFailed {
        id: &'a str,
        error: &'a str,
    },
    Stopped {
        stats: &'a PipelineStats,
    },
    WriterStopped {
        stats: &'a WriterStats,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPipelineReporter;

impl PipelineReporter for TracingPipelineReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Started => {
                tracing::info!("Pipeline started");
            }
            PipelineEvent::StateChanged { state } => {
                tracing::info!(%state, "Pipeline state changed");
            }
            PipelineEvent::EventReceived { source, id } => {
                tracing::trace!(%source, %id, "Event received");
            }
            PipelineEvent::Classified { id, url, category } => {
                tracing::info!(%id, %url, %category, "Post matched");
            }
            PipelineEvent::Dropped { source, id } => {
                tracing::trace!(%source, %id, "No match, dropped");
            }
            PipelineEvent::InvalidRecord { id, error } => {
                tracing::warn!(%id, %error, "Matched post could not be normalized");
            }
            PipelineEvent::SourceFailed { source, error } => {
                tracing::error!(%source, %error, "Source failed");
            }
            PipelineEvent::Enqueued { id } => {
                tracing::debug!(%id, "Record queued for writing");
            }
            PipelineEvent::Written { id, category } => {
                tracing::info!(%id, %category, "Record written");
            }
            PipelineEvent::WriteFailed { id, error } => {
                tracing::error!(%id, %error, "Record write failed, dropped");
            }
            PipelineEvent::Stopped { stats } => {
                tracing::info!(
                    received = stats.received,
                    matched = stats.matched,
                    dropped = stats.dropped,
                    invalid = stats.invalid,
                    source_errors = stats.source_errors,
                    "Pipeline stopped"
                );
            }
            PipelineEvent::WriterStopped { stats } => {
                tracing::info!(
                    written = stats.written,
                    failed = stats.failed,
                    "Writer stopped"
                );
            }
        }
    }
}

/// Counters for one coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub matched: u64,
    pub dropped: u64,
    pub invalid: u64,
    pub source_errors: u64,
}

/// Counters for one writer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

/// Consumes merged events, classifies them, and queues records for the writer.
pub struct PipelineCoordinator<X, P>
where
    X: LinkExtractor,
    P: LinkProber,
{
    classifier: Classifier<X, P>,
}

impl<X, P> PipelineCoordinator<X, P>
where
    X: LinkExtractor,
    P: LinkProber,
{
    pub fn new(classifier: Classifier<X, P>) -> Self {
        Self { classifier }
    }

    /// Run until the merged stream closes or `cancel` fires.
    ///
    /// Producer errors arriving on `errors` are reported and otherwise
    /// ignored. Sending on `queue` waits while the writer is behind.
    pub async fn run<R: PipelineReporter>(
        &self,
        mut events: mpsc::Receiver<RawEvent>,
        mut errors: mpsc::Receiver<SourceError>,
        queue: mpsc::Sender<NormalizedRecord>,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<PipelineStats, AppError> {
        let mut stats = PipelineStats::default();
        let mut errors_open = true;

        reporter.report(PipelineEvent::Started);
        reporter.report(PipelineEvent::StateChanged {
            state: PipelineState::Streaming,
        });

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    reporter.report(PipelineEvent::StateChanged {
                        state: PipelineState::Draining,
                    });
                    break;
                }
                failure = errors.recv(), if errors_open => match failure {
                    Some(failure) => {
                        stats.source_errors += 1;
                        let error = failure.error.to_string();
                        reporter.report(PipelineEvent::SourceFailed {
                            source: failure.source,
                            error: &error,
                        });
                    }
                    None => errors_open = false,
                },
                event = events.recv() => match event {
                    Some(event) => {
                        // Classification and enqueueing are awaited here,
                        // outside the select, so cancellation never cuts
                        // an event off half-processed.
                        if !self.process_event(event, &queue, &mut stats, reporter).await {
                            tracing::warn!("Writer queue closed, stopping pipeline");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        reporter.report(PipelineEvent::Stopped { stats: &stats });
        Ok(stats)
    }

    /// Returns false if the writer queue has gone away.
    async fn process_event<R: PipelineReporter>(
        &self,
        event: RawEvent,
        queue: &mpsc::Sender<NormalizedRecord>,
        stats: &mut PipelineStats,
        reporter: &R,
    ) -> bool {
        stats.received += 1;
        reporter.report(PipelineEvent::EventReceived {
            source: event.source,
            id: &event.id,
        });

        let category = match self.classifier.classify(&event.content).await {
            Category::NoMatch => event.feed_category.unwrap_or(Category::NoMatch),
            category => category,
        };

        if !category.is_match() {
            stats.dropped += 1;
            reporter.report(PipelineEvent::Dropped {
                source: event.source,
                id: &event.id,
            });
            return true;
        }

        let id = event.id.clone();
        let record = match NormalizedRecord::from_event(event, category) {
            Ok(record) => record,
            Err(e) => {
                stats.invalid += 1;
                let error = e.to_string();
                reporter.report(PipelineEvent::InvalidRecord { id: &id, error: &error });
                return true;
            }
        };

        stats.matched += 1;
        reporter.report(PipelineEvent::Classified {
            id: record.id(),
            url: record.canonical_url(),
            category,
        });

        if queue.send(record).await.is_err() {
            return false;
        }
        reporter.report(PipelineEvent::Enqueued { id: &id });
        true
    }
}
