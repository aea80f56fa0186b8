pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod resolve;
pub mod traits;
pub mod writer;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use classify::{Classification, Classifier, match_game};
pub use config::{ClassifierConfig, FeedConfig, PipelineConfig, ResolverConfig};
pub use error::AppError;
pub use ingest::{IngestReport, IngestService, SourceSet};
pub use merge::{MergedStream, StreamMerger, receiver_stream};
pub use models::{Category, NormalizedRecord, RawEvent, ResolvedLink, SourceKind, StoredPost};
pub use pipeline::{
    PipelineCoordinator, PipelineEvent, PipelineReporter, PipelineState, PipelineStats,
    TracingPipelineReporter, WriterStats,
};
pub use resolve::{LinkResolver, is_front_page, strip_trackers};
pub use traits::{EventSource, LinkExtractor, LinkProber, NullSink, RecordSink, SourceError};
pub use writer::WriterStage;
