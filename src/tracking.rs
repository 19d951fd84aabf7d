//! Per-epoch experiment tracking.
//!
//! Trainers report to an [`ExperimentTracker`]. With tracking off the sink is
//! [`NoopTracker`]; with tracking on every epoch becomes one JSON line in
//! `<model_dir>/<run_name>.metrics.jsonl`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Metrics of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Run the epoch belongs to.
    pub run_name: String,
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Mean training batch loss.
    pub train_loss: f64,
    /// Mean validation batch loss, when there was a validation partition.
    pub valid_loss: Option<f64>,
    /// Whether this epoch produced a checkpoint.
    pub checkpointed: bool,
}

/// Sink for epoch metrics.
pub trait ExperimentTracker {
    /// Record one epoch.
    fn log_epoch(&mut self, metrics: &EpochMetrics) -> Result<()>;

    /// Flush buffered output at the end of a run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn log_epoch(&mut self, _metrics: &EpochMetrics) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per epoch to a file.
#[derive(Debug)]
pub struct JsonlTracker {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonlTracker {
    /// Open (truncating) the metrics file, creating parent directories.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        Ok(JsonlTracker { path, out: BufWriter::new(file) })
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExperimentTracker for JsonlTracker {
    fn log_epoch(&mut self, metrics: &EpochMetrics) -> Result<()> {
        serde_json::to_writer(&mut self.out, metrics)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        debug!("[Tracking] metrics written to {}", self.path.display());
        Ok(())
    }
}

/// `<model_dir>/<run_name>.metrics.jsonl`.
pub fn metrics_path(model_dir: &Path, run_name: &str) -> PathBuf {
    model_dir.join(format!("{run_name}.metrics.jsonl"))
}

/// The tracker a run should use.
pub fn tracker_for(enabled: bool, model_dir: &Path, run_name: &str) -> Result<Box<dyn ExperimentTracker>> {
    if enabled {
        Ok(Box::new(JsonlTracker::create(metrics_path(model_dir, run_name))?))
    } else {
        Ok(Box::new(NoopTracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            run_name: "run".into(),
            epoch,
            train_loss: 1.5,
            valid_loss: Some(1.25),
            checkpointed: epoch == 0,
        }
    }

    #[test]
    fn jsonl_writes_one_line_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_for(true, dir.path(), "run").unwrap();
        tracker.log_epoch(&metrics(0)).unwrap();
        tracker.log_epoch(&metrics(1)).unwrap();
        tracker.finish().unwrap();

        let text = fs::read_to_string(metrics_path(dir.path(), "run")).unwrap();
        let lines: Vec<EpochMetrics> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines, vec![metrics(0), metrics(1)]);
    }

    #[test]
    fn disabled_tracking_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_for(false, dir.path(), "run").unwrap();
        tracker.log_epoch(&metrics(0)).unwrap();
        tracker.finish().unwrap();
        assert!(!metrics_path(dir.path(), "run").exists());
    }
}
