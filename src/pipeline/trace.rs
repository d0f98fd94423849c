// Pipeline run tracing
// Append-only JSONL log of pass starts and completions, one run id per writer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while writing or reading a trace
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 on disk
    pub timestamp: DateTime<Utc>,

    /// Shared by every entry of one pipeline run
    pub run_id: Uuid,

    /// Pass name
    pub stage: String,

    /// Fraction of the pipeline done, [0.0, 1.0]
    pub progress: f64,

    pub message: String,

    /// Pass statistics on completion entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(run_id: Uuid, stage: String, progress: f64, message: String) -> Self {
        TraceEntry {
            timestamp: Utc::now(),
            run_id,
            stage,
            progress: progress.clamp(0.0, 1.0),
            message,
            data: None,
        }
    }

    /// Serialize to a JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries for one pipeline run to a JSONL file
pub struct TraceWriter {
    file_path: PathBuf,
    run_id: Uuid,
}

impl TraceWriter {
    /// New writer with a fresh run id; the file is created on first write
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter {
            file_path,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Start an entry for `stage` tagged with this writer's run id
    pub fn entry(&self, stage: impl Into<String>) -> TraceBuilder {
        TraceBuilder {
            run_id: self.run_id,
            stage: stage.into(),
        }
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Builder for entries of one stage
pub struct TraceBuilder {
    run_id: Uuid,
    stage: String,
}

impl TraceBuilder {
    pub fn progress(self, progress: f64, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, self.stage, progress, message.into())
    }

    /// Entry at progress 1.0
    pub fn complete(self, message: impl Into<String>) -> TraceEntry {
        self.progress(1.0, message)
    }

    pub fn with_data(self, progress: f64, message: impl Into<String>, data: serde_json::Value) -> TraceEntry {
        let mut entry = self.progress(progress, message);
        entry.data = Some(data);
        entry
    }
}

/// Read every entry of a JSONL trace file, skipping blank lines
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TraceError::from))
        .collect()
}
