use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use replybot_core::error::AppError;
use replybot_core::models::NormalizedRecord;
use replybot_core::traits::RecordSink;
use serde::Serialize;

/// Row layout shared with the triage sheet.
#[derive(Serialize)]
struct CsvRow {
    post_id: String,
    url: String,
    category: &'static str,
    content: String,
    source: &'static str,
    responded: bool,
}

impl From<&NormalizedRecord> for CsvRow {
    fn from(record: &NormalizedRecord) -> Self {
        Self {
            post_id: record.id().to_string(),
            url: record.canonical_url().to_string(),
            category: record.category().as_str(),
            content: record.content().to_string(),
            source: record.source().as_str(),
            responded: false,
        }
    }
}

/// Appends classified posts to a CSV file.
///
/// The header is written only when the file is created (or empty), so
/// restarts keep appending to the same table.
#[derive(Clone, Debug)]
pub struct CsvSink {
    path: PathBuf,
    writer: Arc<Mutex<csv::Writer<File>>>,
}

impl CsvSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::SinkError(format!("opening {}: {e}", path.display())))?;
        let is_new = file
            .metadata()
            .map_err(|e| AppError::SinkError(format!("inspecting {}: {e}", path.display())))?
            .len()
            == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);

        tracing::info!(path = %path.display(), new_file = is_new, "CSV sink opened");
        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvSink {
    /// File I/O runs on the blocking pool.
    async fn append(&self, record: &NormalizedRecord) -> Result<(), AppError> {
        let row = CsvRow::from(record);
        let writer = Arc::clone(&self.writer);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut writer = writer
                .lock()
                .map_err(|_| AppError::SinkError("CSV writer lock poisoned".into()))?;
            writer
                .serialize(&row)
                .map_err(|e| AppError::SinkError(format!("writing row: {e}")))?;
            writer
                .flush()
                .map_err(|e| AppError::SinkError(format!("flushing {}: {e}", path.display())))
        })
        .await
        .map_err(|e| AppError::SinkError(format!("CSV write task failed: {e}")))?
    }
}
