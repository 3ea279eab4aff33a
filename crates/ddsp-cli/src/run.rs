//! Configuration layering and mode dispatch.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;

use ddsp_core::{expand_user, ConfigBuilder, LayerOrigin, Registry, ResolvedConfig};
use ddsp_data::DataProvider;
use ddsp_trainer::{get_model, EvalRequest, Routines, TrainRequest, OPERATIVE_CONFIG};

/// Gin files compiled into the binary, looked up by relative name.
pub const BUILTIN_GIN_FILES: [(&str, &str); 5] = [
    (
        "optimization/base.gin",
        include_str!("../gin/optimization/base.gin"),
    ),
    (
        "optimization/base_tpu.gin",
        include_str!("../gin/optimization/base_tpu.gin"),
    ),
    (
        "datasets/nsynth_tfds.gin",
        include_str!("../gin/datasets/nsynth_tfds.gin"),
    ),
    (
        "datasets/solo_instrument.gin",
        include_str!("../gin/datasets/solo_instrument.gin"),
    ),
    ("models/ae.gin", include_str!("../gin/models/ae.gin")),
];

/// What the run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Train the model.
    Train,
    /// Evaluate checkpoints.
    Eval,
    /// Sample audio from checkpoints.
    Sample,
}

impl Mode {
    /// Configurable name of the routine this mode dispatches to.
    pub fn routine(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Eval => "evaluate",
            Self::Sample => "sample",
        }
    }
}

/// Options of a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// What the run does.
    pub mode: Mode,
    /// Checkpoint and summary directory; `~` is expanded.
    pub model_dir: String,
    /// Address of the execution master.
    pub master: String,
    /// Whether the run targets a TPU.
    pub use_tpu: bool,
    /// Extra directories searched for gin files.
    pub gin_search_path: Vec<String>,
    /// Gin files, parsed in order.
    pub gin_file: Vec<String>,
    /// Newline-separated gin bindings, parsed after the files.
    pub gin_param: Vec<String>,
    /// Step at which training stops.
    pub num_train_steps: u64,
    /// Evaluate or sample once instead of polling.
    pub eval_once: bool,
    /// Wait before evaluating or sampling.
    pub initial_delay_secs: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Train,
            model_dir: "~/tmp/ddsp".to_string(),
            master: String::new(),
            use_tpu: false,
            gin_search_path: Vec::new(),
            gin_file: Vec::new(),
            gin_param: Vec::new(),
            num_train_steps: 1_000_000,
            eval_once: false,
            initial_delay_secs: None,
        }
    }
}

/// Registry of every configurable the runner knows.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    ddsp_data::register_configurables(&mut registry);
    ddsp_trainer::register_configurables(&mut registry);
    registry
}

/// Layer the configuration; later layers override earlier ones.
///
/// 1. Optimization defaults (strict)
/// 2. The operative config of a previous run in `model_dir`, if present
/// 3. The `cumsum.use_tpu` override (strict)
/// 4. User gin files, then user bindings
pub fn parse_gin(opts: &RunOptions, model_dir: &Path) -> ddsp_core::Result<ResolvedConfig> {
    let registry = registry();
    let mut builder = BUILTIN_GIN_FILES
        .iter()
        .fold(ConfigBuilder::new(&registry), |builder, (name, contents)| {
            builder.with_builtin_file(name, contents)
        });
    for path in &opts.gin_search_path {
        builder.add_search_path(expand_user(path));
    }

    let defaults = if opts.use_tpu {
        "optimization/base_tpu.gin"
    } else {
        "optimization/base.gin"
    };
    builder.parse_file(LayerOrigin::Defaults, defaults, false)?;

    let operative = model_dir.join(OPERATIVE_CONFIG);
    if operative.is_file() {
        tracing::info!(path = %operative.display(), "Loading operative config");
        builder.parse_file(
            LayerOrigin::OperativeSnapshot,
            &operative.to_string_lossy(),
            true,
        )?;
    }

    let cumsum = format!(
        "ddsp.core.cumsum.use_tpu = {}",
        if opts.use_tpu { "True" } else { "False" }
    );
    builder.parse_bindings(LayerOrigin::Override, "cumsum override", &cumsum, false)?;

    for file in &opts.gin_file {
        builder.parse_file(LayerOrigin::User, file, true)?;
    }
    for (i, params) in opts.gin_param.iter().enumerate() {
        builder.parse_bindings(LayerOrigin::User, &format!("--gin_param[{i}]"), params, true)?;
    }
    builder.build()
}

fn delay_start(initial_delay_secs: Option<u64>) {
    if let Some(secs) = initial_delay_secs.filter(|secs| *secs > 0) {
        tracing::info!(secs, "Waiting before start");
        thread::sleep(Duration::from_secs(secs));
    }
}

/// Parse the configuration and dispatch to the routine for `opts.mode`.
pub fn run<R: Routines>(opts: &RunOptions, routines: &R) -> anyhow::Result<()> {
    let model_dir = expand_user(&opts.model_dir);
    let config = parse_gin(opts, &model_dir).context("Failed to parse gin configuration")?;
    let model = get_model(&config)?;
    let data_provider = DataProvider::from_config(&config, opts.mode.routine())?;
    tracing::info!(
        mode = opts.mode.routine(),
        model_dir = %model_dir.display(),
        bindings = config.len(),
        "Starting run"
    );

    match opts.mode {
        Mode::Train => routines
            .train(TrainRequest {
                data_provider,
                model,
                model_dir,
                num_steps: opts.num_train_steps,
                master: opts.master.clone(),
                use_tpu: opts.use_tpu,
                config,
            })
            .context("Training failed")?,
        Mode::Eval | Mode::Sample => {
            delay_start(opts.initial_delay_secs);
            let request = EvalRequest {
                data_provider,
                model,
                model_dir,
                master: opts.master.clone(),
                run_once: opts.eval_once,
                config,
            };
            if opts.mode == Mode::Eval {
                routines.evaluate(request).context("Evaluation failed")?;
            } else {
                routines.sample(request).context("Sampling failed")?;
            }
        }
    }
    Ok(())
}
