//! Fan-in of independent event streams.
//!
//! ```text
//! source A ──task──┐
//! source B ──task──┼──> bounded mpsc ──> MergedStream
//! source C ──task──┘
//! ```
//!
//! Every source gets its own task, so a slow source never holds back a fast
//! one. Items from one source keep their relative order; there is no order
//! across sources. When the shared channel is full, every task waits on it.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Adapt an `mpsc::Receiver` into a [`Stream`].
pub fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// How many items one source forwarded before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub name: String,
    pub forwarded: u64,
}

/// Builder for a merged stream over any number of sources.
pub struct StreamMerger<T> {
    capacity: usize,
    sources: Vec<(String, BoxStream<'static, T>)>,
}

impl<T: Send + 'static> StreamMerger<T> {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Set the bound of the shared output channel (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sources: Vec::new(),
        }
    }

    /// Register a source. Sources need not share a concrete stream type.
    pub fn add_source<S>(mut self, name: impl Into<String>, source: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        self.sources.push((name.into(), source.boxed()));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Start one forwarding task per source.
    ///
    /// The output ends once every source has ended, or once `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> MergedStream<T> {
        let (tx, rx) = mpsc::channel(self.capacity);

        let tasks = self
            .sources
            .into_iter()
            .map(|(name, source)| {
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(forward(name, source, tx, cancel))
            })
            .collect();

        // Only the per-source tasks hold senders now, so the receiver
        // closes when the last of them finishes.
        drop(tx);

        MergedStream { rx, tasks }
    }
}

impl<T: Send + 'static> Default for StreamMerger<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn forward<T: Send + 'static>(
    name: String,
    mut source: BoxStream<'static, T>,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
) -> SourceSummary {
    let mut forwarded = 0;

    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = source.next() => item,
        };

        let Some(item) = item else {
            tracing::info!(source = %name, forwarded, "Source ended");
            break;
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    tracing::debug!(source = %name, "Merged stream receiver dropped");
                    break;
                }
            }
        }
        forwarded += 1;
    }

    SourceSummary { name, forwarded }
}

/// Receiving end of a [`StreamMerger`].
pub struct MergedStream<T> {
    rx: mpsc::Receiver<T>,
    tasks: Vec<JoinHandle<SourceSummary>>,
}

impl<T: Send + 'static> MergedStream<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Split into the raw receiver and the per-source task handles.
    pub fn into_parts(self) -> (mpsc::Receiver<T>, Vec<JoinHandle<SourceSummary>>) {
        (self.rx, self.tasks)
    }

    /// Wait for every forwarding task and collect their summaries.
    pub async fn join(self) -> Vec<SourceSummary> {
        drop(self.rx);
        join_sources(self.tasks).await
    }
}

/// Wait for forwarding tasks returned by [`MergedStream::into_parts`].
pub async fn join_sources(tasks: Vec<JoinHandle<SourceSummary>>) -> Vec<SourceSummary> {
    let mut summaries = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(summary) => summaries.push(summary),
            Err(e) => tracing::error!(error = %e, "Merge task panicked"),
        }
    }
    summaries
}
