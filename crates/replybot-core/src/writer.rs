use tokio::sync::mpsc;

use crate::models::NormalizedRecord;
use crate::pipeline::{PipelineEvent, PipelineReporter, WriterStats};
use crate::traits::RecordSink;

/// Single consumer between the coordinator and the sink.
///
/// Records are appended in queue order. A failed append is reported and the
/// record dropped; the stage keeps going. It stops once every sender of the
/// queue is gone, so anything already queued is still written on shutdown.
pub struct WriterStage<S: RecordSink> {
    sink: S,
}

impl<S: RecordSink> WriterStage<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub async fn run<R: PipelineReporter>(
        &self,
        mut queue: mpsc::Receiver<NormalizedRecord>,
        reporter: &R,
    ) -> WriterStats {
        let mut stats = WriterStats::default();

        while let Some(record) = queue.recv().await {
            match self.sink.append(&record).await {
                Ok(()) => {
                    stats.written += 1;
                    reporter.report(PipelineEvent::Written {
                        id: record.id(),
                        category: record.category(),
                    });
                }
                Err(e) => {
                    stats.failed += 1;
                    let error = e.to_string();
                    reporter.report(PipelineEvent::WriteFailed {
                        id: record.id(),
                        error: &error,
                    });
                }
            }
        }

        reporter.report(PipelineEvent::WriterStopped { stats: &stats });
        stats
    }
}
