//! The routines a run dispatches to.

use std::path::PathBuf;

use ddsp_core::{ResolvedConfig, Result};
use ddsp_data::DataProvider;

use crate::model::ModelSpec;

/// Arguments of a training run.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    /// Source of training batches.
    pub data_provider: DataProvider,
    /// Model to train.
    pub model: ModelSpec,
    /// Directory for checkpoints and the operative config.
    pub model_dir: PathBuf,
    /// Step at which training stops.
    pub num_steps: u64,
    /// Address of the execution master, empty for local.
    pub master: String,
    /// Whether the run targets a TPU.
    pub use_tpu: bool,
    /// The resolved configuration.
    pub config: ResolvedConfig,
}

/// Arguments of an evaluation or sampling run.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    /// Source of evaluation batches.
    pub data_provider: DataProvider,
    /// Model to evaluate.
    pub model: ModelSpec,
    /// Directory holding checkpoints; outputs are written beneath it.
    pub model_dir: PathBuf,
    /// Address of the execution master, empty for local.
    pub master: String,
    /// Process the current checkpoint once instead of polling.
    pub run_once: bool,
    /// The resolved configuration.
    pub config: ResolvedConfig,
}

/// Train, evaluate, and sample entry points.
pub trait Routines {
    /// Train until `num_steps`.
    fn train(&self, request: TrainRequest) -> Result<()>;

    /// Evaluate checkpoints as they appear.
    fn evaluate(&self, request: EvalRequest) -> Result<()>;

    /// Write audio samples for checkpoints as they appear.
    fn sample(&self, request: EvalRequest) -> Result<()>;
}
