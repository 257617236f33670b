//! Whole-job ingestion lifecycle.
//!
//! One job = one spawned task with its own store connection. The caller
//! receives exactly one terminal message over a oneshot channel: a
//! [`JobResult`] with per-kind counters and row errors, or a fatal
//! [`IngestError`] with nothing counted. Rows are processed strictly
//! sequentially so a policy's foreign-key lookups always observe every
//! upsert that precedes it in file order.

use std::path::PathBuf;

use serde_json::json;
use tokio::sync::oneshot;
use tracing::{error, info};

use super::reader::{self, FileFormat};
use super::row::{RowOutcome, RowProcessor};
use crate::database::Database;
use crate::errors::{IngestError, RowProcessingError};
use crate::models::{JobResult, JobSummary};

pub struct IngestionJob {
    file_path: PathBuf,
    declared_type: String,
}

/// Receiving half of the job's one-shot terminal message.
pub struct JobHandle {
    rx: oneshot::Receiver<Result<JobResult, IngestError>>,
}

impl JobHandle {
    /// Wait for the job's terminal message.
    ///
    /// A worker that dies without reporting (panic, runtime teardown) is
    /// indistinguishable from a lost connection and is reported as one.
    pub async fn wait(self) -> Result<JobResult, IngestError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(IngestError::Connection(
                "ingestion worker terminated before reporting a result".to_string(),
            )),
        }
    }
}

impl IngestionJob {
    /// `declared_type` is the uploaded file's extension, e.g. ".csv".
    pub fn new<T: Into<String>>(file_path: PathBuf, declared_type: T) -> Self {
        Self {
            file_path,
            declared_type: declared_type.into(),
        }
    }

    /// Run the job in its own task, detached from the caller.
    pub fn spawn(self, database_url: String) -> JobHandle {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = self.run(&database_url).await;
            if let Err(ref e) = outcome {
                error!("ingestion job failed: {}", e);
            }
            // The caller may have gone away; the job's work is already durable
            let _ = tx.send(outcome);
        });
        JobHandle { rx }
    }

    /// Execute the job on the current task. `spawn` is the normal entry
    /// point; this is the lifecycle itself.
    pub async fn run(&self, database_url: &str) -> Result<JobResult, IngestError> {
        let database = Database::connect_for_job(database_url)
            .await
            .map_err(|e| IngestError::Connection(e.to_string()))?;

        let result = self.process_file(&database).await;
        database.close().await;

        if let Ok(ref result) = result {
            info!(
                "ingestion finished: {} records, {} errors",
                result.records_processed, result.summary.errors
            );
        }
        result
    }

    async fn process_file(&self, database: &Database) -> Result<JobResult, IngestError> {
        let format = FileFormat::from_extension(&self.declared_type)
            .ok_or_else(|| IngestError::UnsupportedFormat(self.declared_type.clone()))?;

        let path = self.file_path.clone();
        let rows = tokio::task::spawn_blocking(move || reader::read_rows(&path, format))
            .await
            .map_err(|e| {
                IngestError::file_read(self.file_path.display().to_string(), e.to_string())
            })??;

        if rows.is_empty() {
            return Err(IngestError::EmptyDataset);
        }

        let processor = RowProcessor::new(database);
        let mut summary = JobSummary::default();
        let mut row_errors = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            match processor.process(row).await {
                RowOutcome::Applied(touched) => {
                    for kind in touched {
                        summary.record(kind);
                    }
                }
                RowOutcome::Failed(message) => {
                    summary.record_error();
                    row_errors.push(RowProcessingError::new(index + 1, message).to_string());
                }
            }
        }

        Ok(JobResult {
            records_processed: rows.len() as u64,
            summary,
            row_errors,
        })
    }
}

/// Serialize a fatal job error into the terminal failure shape.
pub fn failure_body(error: &IngestError) -> serde_json::Value {
    json!({
        "error": error.to_string(),
        "recordsProcessed": 0,
        "summary": {},
    })
}
