//! Checkpoint markers recording training progress.
//!
//! A marker is a small JSON file `ckpt-<step>.json` in the model directory.
//! Training resumes from the newest marker; evaluation and sampling poll for
//! new ones.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ddsp_core::Result;

const CHECKPOINT_PREFIX: &str = "ckpt-";
const CHECKPOINT_SUFFIX: &str = ".json";

/// Training state at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Global training step.
    pub step: u64,
    /// Records consumed up to this step.
    pub records_seen: u64,
    /// Model the run was configured with.
    pub model: String,
    /// Data provider the run was configured with.
    pub data_provider: String,
    /// Timestamp (RFC 3339).
    pub timestamp: String,
}

impl CheckpointMetadata {
    /// Metadata for the current training state.
    pub fn new(step: u64, records_seen: u64) -> Self {
        Self {
            step,
            records_seen,
            model: String::new(),
            data_provider: String::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Set the model description.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the data provider description.
    pub fn with_data_provider(mut self, provider: impl Into<String>) -> Self {
        self.data_provider = provider.into();
        self
    }
}

/// Saves and finds checkpoint markers in a model directory.
pub struct CheckpointManager {
    model_dir: PathBuf,
    max_checkpoints: Option<usize>,
}

impl CheckpointManager {
    /// Manage markers in `model_dir`, creating it if needed.
    pub fn new(model_dir: impl AsRef<Path>) -> Result<Self> {
        let model_dir = model_dir.as_ref().to_path_buf();
        fs::create_dir_all(&model_dir)?;
        Ok(Self {
            model_dir,
            max_checkpoints: Some(5),
        })
    }

    /// Keep at most `max` markers.
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = Some(max.max(1));
        self
    }

    /// Path of the marker for `step`.
    pub fn checkpoint_path(&self, step: u64) -> PathBuf {
        self.model_dir
            .join(format!("{CHECKPOINT_PREFIX}{step}{CHECKPOINT_SUFFIX}"))
    }

    /// Write a marker and prune old ones.
    pub fn save(&self, metadata: &CheckpointMetadata) -> Result<PathBuf> {
        let path = self.checkpoint_path(metadata.step);
        let json = serde_json::to_string_pretty(metadata).map_err(io::Error::from)?;
        fs::write(&path, json)?;
        self.cleanup_old_checkpoints()?;
        tracing::info!(step = metadata.step, path = %path.display(), "Saved checkpoint");
        Ok(path)
    }

    /// Steps with a marker, oldest first.
    pub fn steps(&self) -> Result<Vec<u64>> {
        if !self.model_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut steps: Vec<u64> = Vec::new();
        for entry in fs::read_dir(&self.model_dir)? {
            let name = entry?.file_name();
            let step = name
                .to_string_lossy()
                .strip_prefix(CHECKPOINT_PREFIX)
                .and_then(|rest| rest.strip_suffix(CHECKPOINT_SUFFIX))
                .and_then(|step| step.parse().ok());
            if let Some(step) = step {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    /// Read the marker for `step`.
    pub fn load(&self, step: u64) -> Result<CheckpointMetadata> {
        let json = fs::read_to_string(self.checkpoint_path(step))?;
        let metadata = serde_json::from_str(&json).map_err(io::Error::from)?;
        Ok(metadata)
    }

    /// Newest marker, if any.
    pub fn latest(&self) -> Result<Option<CheckpointMetadata>> {
        match self.steps()?.last() {
            Some(step) => self.load(*step).map(Some),
            None => Ok(None),
        }
    }

    fn cleanup_old_checkpoints(&self) -> Result<()> {
        let Some(max) = self.max_checkpoints else {
            return Ok(());
        };
        let steps = self.steps()?;
        let excess = steps.len().saturating_sub(max);
        for step in &steps[..excess] {
            if let Err(e) = fs::remove_file(self.checkpoint_path(*step)) {
                tracing::warn!(step, error = %e, "Failed to remove old checkpoint");
            } else {
                tracing::debug!(step, "Removed old checkpoint");
            }
        }
        Ok(())
    }
}
