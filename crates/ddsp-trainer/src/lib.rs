//! Train, evaluate, and sample routines for the DDSP runner.
//!
//! This crate provides:
//! - The [`Routines`] collaborator contract and its request types
//! - Model selection from configuration ([`get_model`])
//! - Checkpoint markers for resuming and polling
//! - [`PipelineRoutines`], which drive the input pipeline end to end

#![warn(missing_docs)]

pub mod checkpoint;
mod model;
pub mod pipeline_routines;
mod routines;

pub use checkpoint::{CheckpointManager, CheckpointMetadata};
pub use model::*;
pub use pipeline_routines::{PipelineRoutines, OPERATIVE_CONFIG};
pub use routines::*;

use ddsp_core::Registry;

/// Register the routines, `get_model`, and the models as configurables.
pub fn register_configurables(registry: &mut Registry) {
    registry
        .register(
            "train",
            &[
                "data_provider",
                "batch_size",
                "learning_rate",
                "lr_decay_steps",
                "lr_decay_rate",
                "grad_clip_norm",
                "steps_per_summary",
                "steps_per_save",
            ],
        )
        .register(
            "evaluate",
            &["data_provider", "batch_size", "num_batches", "poll_interval_secs"],
        )
        .register(
            "sample",
            &[
                "data_provider",
                "batch_size",
                "num_batches",
                "sample_rate",
                "poll_interval_secs",
            ],
        )
        .register("get_model", &["model"])
        .register("cumsum", &["use_tpu"])
        .register_open("Autoencoder");
}
