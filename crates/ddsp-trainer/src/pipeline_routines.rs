//! Built-in routines that drive the input pipeline and persist run state.
//!
//! These routines perform no model math. Training consumes batches and
//! writes checkpoint markers; evaluation summarizes the batches it reads;
//! sampling exports the `audio` feature as WAV files.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use ddsp_core::{DdspError, ResolvedConfig, Result};
use ddsp_data::{Batch, DatasetSource, Feature, InputParams};

use crate::checkpoint::{CheckpointManager, CheckpointMetadata};
use crate::routines::{EvalRequest, Routines, TrainRequest};

/// Name of the operative config snapshot in the model directory.
pub const OPERATIVE_CONFIG: &str = "operative_config-0.gin";

/// Settings of the train routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSettings {
    /// Records per batch.
    pub batch_size: usize,
    /// Steps between throughput logs.
    pub steps_per_summary: u64,
    /// Steps between checkpoint markers.
    pub steps_per_save: u64,
}

impl TrainSettings {
    /// Read `train.*` bindings, with defaults.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        Ok(Self {
            batch_size: config.get_usize("train.batch_size")?.unwrap_or(32),
            steps_per_summary: config
                .get_usize("train.steps_per_summary")?
                .unwrap_or(300)
                .max(1) as u64,
            steps_per_save: config
                .get_usize("train.steps_per_save")?
                .unwrap_or(300)
                .max(1) as u64,
        })
    }
}

/// Settings of the evaluate and sample routines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSettings {
    /// Records per batch.
    pub batch_size: usize,
    /// Batches read per checkpoint.
    pub num_batches: usize,
    /// Wait between polls for a new checkpoint.
    pub poll_interval: Duration,
    /// Sample rate of exported audio.
    pub sample_rate: u32,
}

impl EvalSettings {
    /// Read `evaluate.*` bindings, with defaults.
    pub fn evaluate(config: &ResolvedConfig) -> Result<Self> {
        Self::read(config, "evaluate", 32, 50)
    }

    /// Read `sample.*` bindings, with defaults.
    pub fn sample(config: &ResolvedConfig) -> Result<Self> {
        Self::read(config, "sample", 16, 1)
    }

    fn read(
        config: &ResolvedConfig,
        routine: &str,
        batch_size: usize,
        num_batches: usize,
    ) -> Result<Self> {
        let key = |param: &str| format!("{routine}.{param}");
        let poll_secs = config.get_f64(&key("poll_interval_secs"))?.unwrap_or(30.0);
        let sample_rate = config.get_usize(&key("sample_rate"))?.unwrap_or(16_000);
        Ok(Self {
            batch_size: config.get_usize(&key("batch_size"))?.unwrap_or(batch_size),
            num_batches: config.get_usize(&key("num_batches"))?.unwrap_or(num_batches),
            poll_interval: Duration::try_from_secs_f64(poll_secs.max(0.0)).map_err(|e| {
                DdspError::Config(format!("{routine}.poll_interval_secs: {poll_secs}: {e}"))
            })?,
            sample_rate: u32::try_from(sample_rate).map_err(|_| {
                DdspError::Config(format!("{routine}.sample_rate: {sample_rate} is out of range"))
            })?,
        })
    }
}

/// One line of `eval/summaries.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    /// Checkpoint step evaluated.
    pub step: u64,
    /// Batches read.
    pub batches: usize,
    /// Records read.
    pub records: usize,
    /// Mean of every float feature over all records.
    pub means: BTreeMap<String, f64>,
    /// Timestamp (RFC 3339).
    pub timestamp: String,
}

/// Routines that exercise the data pipeline without a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRoutines;

impl PipelineRoutines {
    /// Create the routines.
    pub fn new() -> Self {
        Self
    }
}

fn progress_bar(total: u64, position: u64) -> indicatif::ProgressBar {
    let progress = indicatif::ProgressBar::new(total);
    if let Ok(style) = indicatif::ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        progress.set_style(style.progress_chars("#>-"));
    }
    progress.set_position(position);
    progress
}

impl Routines for PipelineRoutines {
    fn train(&self, request: TrainRequest) -> Result<()> {
        let settings = TrainSettings::from_config(&request.config)?;
        let manager = CheckpointManager::new(&request.model_dir)?;
        let operative = request.model_dir.join(OPERATIVE_CONFIG);
        fs::write(&operative, request.config.to_gin_string())?;
        tracing::info!(path = %operative.display(), "Wrote operative config");

        let resumed = manager.latest()?;
        let mut step = resumed.as_ref().map_or(0, |m| m.step);
        let mut records_seen = resumed.as_ref().map_or(0, |m| m.records_seen);
        if step >= request.num_steps {
            tracing::info!(step, num_steps = request.num_steps, "Training already complete");
            return Ok(());
        }
        tracing::info!(
            model = %request.model,
            provider = %request.data_provider,
            start_step = step,
            num_steps = request.num_steps,
            batch_size = settings.batch_size,
            master = %request.master,
            use_tpu = request.use_tpu,
            "Starting training"
        );

        let input_fn = request.data_provider.get_input_fn(true, -1);
        let mut pairs = input_fn(&InputParams {
            batch_size: settings.batch_size,
        })?;
        let progress = progress_bar(request.num_steps, step);
        let checkpoint = |step: u64, records_seen: u64| {
            manager.save(
                &CheckpointMetadata::new(step, records_seen)
                    .with_model(request.model.to_string())
                    .with_data_provider(request.data_provider.to_string()),
            )
        };

        let mut last_saved = step;
        let mut window_start = Instant::now();
        let mut window_records = 0u64;
        while step < request.num_steps {
            let (inputs, _targets) = match pairs.next() {
                Some(pair) => pair?,
                None => {
                    tracing::warn!(step, "Input pipeline ended before num_steps");
                    break;
                }
            };
            step += 1;
            records_seen += inputs.len() as u64;
            window_records += inputs.len() as u64;
            progress.set_position(step);

            if step % settings.steps_per_summary == 0 {
                let elapsed = window_start.elapsed().as_secs_f64().max(f64::EPSILON);
                let records_per_sec = window_records as f64 / elapsed;
                tracing::info!(step, records_per_sec, "Training summary");
                progress.set_message(format!("{records_per_sec:.1} records/s"));
                window_start = Instant::now();
                window_records = 0;
            }
            if step % settings.steps_per_save == 0 {
                checkpoint(step, records_seen)?;
                last_saved = step;
            }
        }
        if last_saved != step {
            checkpoint(step, records_seen)?;
        }
        progress.finish_with_message("Training complete");
        Ok(())
    }

    fn evaluate(&self, request: EvalRequest) -> Result<()> {
        let settings = EvalSettings::evaluate(&request.config)?;
        let summaries = request.model_dir.join("eval").join("summaries.jsonl");
        poll_checkpoints(&request, settings.poll_interval, |step| {
            let batches = request
                .data_provider
                .get_batch(settings.batch_size, false, -1)?;
            let summary = summarize(step, batches.take(settings.num_batches))?;
            append_summary(&summaries, &summary)?;
            tracing::info!(
                step,
                batches = summary.batches,
                records = summary.records,
                "Evaluation complete"
            );
            Ok(())
        })
    }

    fn sample(&self, request: EvalRequest) -> Result<()> {
        let settings = EvalSettings::sample(&request.config)?;
        poll_checkpoints(&request, settings.poll_interval, |step| {
            let dir = request
                .model_dir
                .join("samples")
                .join(format!("step_{step}"));
            fs::create_dir_all(&dir)?;
            let batches = request
                .data_provider
                .get_batch(settings.batch_size, false, -1)?;
            let mut written = 0;
            for (b, batch) in batches.take(settings.num_batches).enumerate() {
                written += write_batch_audio(&dir, b, &batch?, settings.sample_rate)?;
            }
            tracing::info!(step, files = written, dir = %dir.display(), "Wrote samples");
            Ok(())
        })
    }
}

/// Run `process` for each new checkpoint.
///
/// With `run_once`, the newest checkpoint (or step 0 when none exists) is
/// processed once.
fn poll_checkpoints(
    request: &EvalRequest,
    interval: Duration,
    mut process: impl FnMut(u64) -> Result<()>,
) -> Result<()> {
    let manager = CheckpointManager::new(&request.model_dir)?;
    let mut last_processed: Option<u64> = None;
    loop {
        let latest = manager.latest()?.map(|m| m.step);
        let target = match latest {
            Some(step) if last_processed != Some(step) => Some(step),
            Some(_) => None,
            None if request.run_once => Some(0),
            None => None,
        };
        match target {
            Some(step) => {
                process(step)?;
                last_processed = Some(step);
            }
            None => tracing::info!(
                model_dir = %request.model_dir.display(),
                "Waiting for a new checkpoint"
            ),
        }
        if request.run_once {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn summarize(step: u64, batches: impl Iterator<Item = Result<Batch>>) -> Result<EvalSummary> {
    let mut totals: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    let mut num_batches = 0;
    let mut records = 0;
    for batch in batches {
        let batch = batch?;
        num_batches += 1;
        records += batch.len();
        for record in batch.iter() {
            for (name, feature) in record.iter() {
                if let Some(values) = feature.as_floats() {
                    let total = totals.entry(name.to_string()).or_insert((0.0, 0));
                    total.0 += values.iter().map(|v| *v as f64).sum::<f64>();
                    total.1 += values.len() as u64;
                }
            }
        }
    }
    let means = totals
        .into_iter()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect();
    Ok(EvalSummary {
        step,
        batches: num_batches,
        records,
        means,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn append_summary(path: &Path, summary: &EvalSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(summary).map_err(io::Error::from)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn write_batch_audio(
    dir: &Path,
    batch_index: usize,
    batch: &Batch,
    sample_rate: u32,
) -> Result<usize> {
    for (index, record) in batch.iter().enumerate() {
        let audio = match record.get("audio") {
            Some(Feature::Float(values)) => values,
            Some(other) => {
                return Err(DdspError::schema_mismatch(
                    "audio",
                    format!("expected float32, found {}", other.dtype_name()),
                ))
            }
            None => return Err(DdspError::MissingField("audio".to_string())),
        };
        let path = dir.join(format!("{batch_index}_{index}.wav"));
        write_wav(&path, audio, sample_rate)?;
    }
    Ok(batch.len())
}

/// Write mono float audio in [-1, 1] as 16-bit PCM.
pub fn write_wav(path: &Path, audio: &[f32], sample_rate: u32) -> Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_error)?;
    for sample in audio {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;
    Ok(path.to_path_buf())
}

fn wav_error(e: hound::Error) -> DdspError {
    match e {
        hound::Error::IoError(e) => DdspError::Io(e),
        other => DdspError::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
    }
}
