//! Providers for prepared TFDS catalogue datasets.
//!
//! A prepared dataset lives under
//! `<data_dir>/<dataset>/<config>/<version>/` as TFRecord shards named
//! `<dataset>-<split>.tfrecord-NNNNN-of-MMMMM`. Downloading and preparing
//! datasets is left to TFDS itself; this module only reads what is on disk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::seq::SliceRandom;

use ddsp_core::{expand_user, DdspError, Result};

use crate::example::decode_example;
use crate::pipeline::{FileOpener, Interleave, PreprocessFn, RecordStream};
use crate::provider::DatasetSource;
use crate::record::Record;
use crate::tfrecord::TfRecordReader;

/// Default TFDS data directory.
pub const DEFAULT_DATA_DIR: &str = "~/tensorflow_datasets";

/// Public bucket holding prepared TFDS datasets.
pub const PUBLIC_TFDS_BUCKET: &str = "gs://tfds-data/datasets";

/// Default NSynth catalogue name.
pub const DEFAULT_NSYNTH_NAME: &str = "nsynth/gansynth_subset.f0_and_loudness:2.3.0";

/// Default NSynth split.
pub const DEFAULT_NSYNTH_SPLIT: &str = "train";

const SHARD_CYCLE_LENGTH: usize = 16;
const SHARD_BLOCK_LENGTH: usize = 16;

/// Flattened NSynth fields and the nested paths they are read from.
const NSYNTH_FIELDS: [(&str, &str); 8] = [
    ("pitch", "pitch"),
    ("audio", "audio"),
    ("instrument_source", "instrument.source"),
    ("instrument_family", "instrument.family"),
    ("instrument", "instrument.label"),
    ("f0_hz", "f0.hz"),
    ("f0_confidence", "f0.confidence"),
    ("loudness_db", "loudness.db"),
];

/// How records of a catalogue dataset are preprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TfdsSchema {
    /// Records are passed through unchanged.
    Generic,
    /// NSynth records are flattened to the fields used for training.
    NSynth,
}

/// Catalogue name split into its parts: `dataset[/config][:version]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueName {
    /// Dataset name.
    pub dataset: String,
    /// Builder config, if any.
    pub config: Option<String>,
    /// Version string, if pinned.
    pub version: Option<String>,
}

impl CatalogueName {
    /// Parse a catalogue name.
    pub fn parse(name: &str) -> Result<Self> {
        let (path, version) = match name.split_once(':') {
            Some((path, version)) => (path, Some(version.to_string())),
            None => (name, None),
        };
        let (dataset, config) = match path.split_once('/') {
            Some((dataset, config)) => (dataset, Some(config.to_string())),
            None => (path, None),
        };
        if dataset.is_empty() || config.as_deref() == Some("") || version.as_deref() == Some("") {
            return Err(DdspError::InvalidArgument(format!(
                "Invalid TFDS dataset name '{name}'"
            )));
        }
        Ok(Self {
            dataset: dataset.to_string(),
            config,
            version,
        })
    }
}

/// Reads a prepared TFDS dataset split.
#[derive(Debug, Clone)]
pub struct TfdsProvider {
    name: String,
    split: String,
    data_dir: String,
    schema: TfdsSchema,
}

impl TfdsProvider {
    /// Provider for an arbitrary catalogue dataset.
    pub fn new(name: &str, split: &str, data_dir: &str) -> Self {
        Self {
            name: name.to_string(),
            split: split.to_string(),
            data_dir: data_dir.to_string(),
            schema: TfdsSchema::Generic,
        }
    }

    /// NSynth provider; unset arguments take the NSynth defaults.
    pub fn nsynth(name: Option<&str>, split: Option<&str>, data_dir: Option<&str>) -> Self {
        let data_dir = data_dir.unwrap_or(PUBLIC_TFDS_BUCKET);
        if data_dir == PUBLIC_TFDS_BUCKET {
            tracing::warn!(
                "Using public TFDS GCS bucket to load NSynth. If not running on GCP, \
                 this will be very slow, and it is recommended you prepare the dataset \
                 locally with TFDS and set the data_dir appropriately."
            );
        }
        Self {
            name: name.unwrap_or(DEFAULT_NSYNTH_NAME).to_string(),
            split: split.unwrap_or(DEFAULT_NSYNTH_SPLIT).to_string(),
            data_dir: data_dir.to_string(),
            schema: TfdsSchema::NSynth,
        }
    }

    /// Catalogue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split name.
    pub fn split(&self) -> &str {
        &self.split
    }

    /// Data directory as configured.
    pub fn data_dir(&self) -> &str {
        &self.data_dir
    }

    /// Preprocessing schema.
    pub fn schema(&self) -> TfdsSchema {
        self.schema
    }

    /// Name this provider is configured under.
    pub fn configurable_name(&self) -> &'static str {
        match self.schema {
            TfdsSchema::Generic => "TfdsProvider",
            TfdsSchema::NSynth => "NSynthTfds",
        }
    }

    /// Directory holding the prepared version of the dataset.
    ///
    /// Without a pinned version the highest prepared version is used.
    pub fn dataset_dir(&self) -> Result<PathBuf> {
        let catalogue = CatalogueName::parse(&self.name)?;
        let mut base = expand_user(&self.data_dir).join(&catalogue.dataset);
        if let Some(config) = &catalogue.config {
            base.push(config);
        }
        let dir = match &catalogue.version {
            Some(version) => base.join(version),
            None => latest_version(&base)?.ok_or_else(|| self.not_prepared(&base))?,
        };
        if !dir.is_dir() {
            return Err(self.not_prepared(&dir));
        }
        Ok(dir)
    }

    /// Shard files of the split, in name order.
    pub fn shard_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.dataset_dir()?;
        let catalogue = CatalogueName::parse(&self.name)?;
        let prefix = format!("{}-{}.tfrecord", catalogue.dataset, self.split);
        let mut shards = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                shards.push(entry.path());
            }
        }
        if shards.is_empty() {
            return Err(DdspError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No shards for split '{}' in {}", self.split, dir.display()),
            )));
        }
        shards.sort();
        Ok(shards)
    }

    fn not_prepared(&self, path: &Path) -> DdspError {
        DdspError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!(
                "Dataset '{}' is not prepared at {}; prepare it with TFDS first",
                self.name,
                path.display()
            ),
        ))
    }
}

fn parse_version(name: &str) -> Option<(u64, u64, u64)> {
    let mut parts = name.split('.').map(|p| p.parse::<u64>().ok());
    let version = (parts.next()??, parts.next()??, parts.next()??);
    parts.next().is_none().then_some(version)
}

fn latest_version(base: &Path) -> Result<Option<PathBuf>> {
    if !base.is_dir() {
        return Ok(None);
    }
    let mut best: Option<((u64, u64, u64), PathBuf)> = None;
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(version) = parse_version(&entry.file_name().to_string_lossy()) {
            if best.as_ref().map_or(true, |(v, _)| version > *v) {
                best = Some((version, entry.path()));
            }
        }
    }
    Ok(best.map(|(_, path)| path))
}

fn open_shard(path: PathBuf) -> Result<Box<dyn Iterator<Item = Result<Record>> + Send>> {
    let reader = TfRecordReader::open(&path)?;
    Ok(Box::new(reader.map(|bytes| {
        bytes.and_then(|bytes| Record::from_flat(decode_example(&bytes)?, '/'))
    })))
}

fn preprocess_nsynth(mut record: Record) -> Result<Record> {
    let mut out = Record::new();
    for (target, source) in NSYNTH_FIELDS {
        out.insert(target, record.take_path(source)?);
    }
    Ok(out)
}

impl DatasetSource for TfdsProvider {
    fn get_dataset(&self, shuffle: bool) -> Result<RecordStream> {
        let mut shards = self.shard_files()?;
        if shuffle {
            shards.shuffle(&mut rand::thread_rng());
        }
        tracing::info!(
            dataset = %self.name,
            split = %self.split,
            shards = shards.len(),
            "Reading TFDS dataset"
        );
        let open: FileOpener<Record> = Arc::new(open_shard);
        Ok(Box::new(Interleave::new(
            shards,
            open,
            SHARD_CYCLE_LENGTH,
            SHARD_BLOCK_LENGTH,
        )))
    }

    fn get_preprocess_fn(&self) -> PreprocessFn {
        match self.schema {
            TfdsSchema::Generic => crate::pipeline::identity(),
            TfdsSchema::NSynth => Arc::new(preprocess_nsynth),
        }
    }
}
