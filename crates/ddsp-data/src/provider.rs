//! Data provider capability and the configured provider enum.

use std::fmt;

use serde::{Deserialize, Serialize};

use ddsp_core::{DdspError, Registry, ResolvedConfig, Result};

use crate::pipeline::{
    autotune_depth, identity, Batch, BatchStream, Batcher, ParallelMap, Passes, Prefetch,
    PreprocessFn, RecordStream, Repeat, Shuffle, StreamFactory, SHUFFLE_BUFFER_SIZE,
};
use crate::tfds::{TfdsProvider, DEFAULT_DATA_DIR};
use crate::tfrecord_provider::{RecordSchema, TfRecordProvider};

/// Parameters handed to an [`InputFn`] by the training harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParams {
    /// Records per batch.
    pub batch_size: usize,
}

/// Stream of `(features, labels)` pairs. Both halves are the same batch.
pub type PairStream = Box<dyn Iterator<Item = Result<(Batch, Batch)>> + Send>;

/// Deferred pipeline construction, invoked with the harness's parameters.
pub type InputFn = Box<dyn Fn(&InputParams) -> Result<PairStream> + Send + Sync>;

/// A source of records with an optional per-record preprocessing step.
///
/// Implementors supply [`get_dataset`](DatasetSource::get_dataset); batching
/// and input functions are built on top of it.
pub trait DatasetSource: Send + Sync {
    /// Stream of raw records. With `shuffle`, file order is randomized.
    fn get_dataset(&self, shuffle: bool) -> Result<RecordStream>;

    /// Per-record transformation. Defaults to identity.
    fn get_preprocess_fn(&self) -> PreprocessFn {
        identity()
    }

    /// Batched, preprocessed, optionally shuffled and repeated stream.
    ///
    /// `repeats` of `-1` repeats indefinitely. Batches always hold exactly
    /// `batch_size` records; a final partial batch is dropped.
    fn get_batch(&self, batch_size: usize, shuffle: bool, repeats: i64) -> Result<BatchStream>
    where
        Self: Clone + Sized + 'static,
    {
        let passes = Passes::from_repeats(repeats)?;
        let source = self.clone();
        let preprocess = self.get_preprocess_fn();
        let factory: StreamFactory = Box::new(move || {
            let dataset = source.get_dataset(shuffle)?;
            let mapped = ParallelMap::new(dataset, preprocess.clone());
            let stream: RecordStream = if shuffle {
                Box::new(Shuffle::new(mapped, SHUFFLE_BUFFER_SIZE, None))
            } else {
                Box::new(mapped)
            };
            Ok(stream)
        });
        let batches = Batcher::new(Repeat::new(factory, passes)?, batch_size)?;
        Ok(Box::new(Prefetch::spawn(batches, autotune_depth())?))
    }

    /// Input function yielding `(batch, batch)` pairs.
    ///
    /// The pipeline is built on each invocation.
    fn get_input_fn(&self, shuffle: bool, repeats: i64) -> InputFn
    where
        Self: Clone + Sized + 'static,
    {
        let source = self.clone();
        Box::new(move |params: &InputParams| -> Result<PairStream> {
            let batches = source.get_batch(params.batch_size, shuffle, repeats)?;
            Ok(Box::new(batches.map(|batch| batch.map(|b| (b.clone(), b)))))
        })
    }
}

/// A data provider selected by configuration.
#[derive(Debug, Clone)]
pub enum DataProvider {
    /// Prepared TFDS catalogue dataset.
    Tfds(TfdsProvider),
    /// Files matched by a glob pattern.
    TfRecord(TfRecordProvider),
}

impl DataProvider {
    /// Resolve the provider bound to `<routine>.data_provider`.
    pub fn from_config(config: &ResolvedConfig, routine: &str) -> Result<Self> {
        let key = format!("{routine}.data_provider");
        let reference = config.require_reference(&key)?;
        let name = reference.configurable_name();
        // Provider parameters may be scoped to the routine, e.g.
        // `evaluate/NSynthTfds.split = 'valid'`.
        let param = |p: &str| format!("{routine}/{name}.{p}");
        let missing = |p: &str| DdspError::MissingRequired(format!("{name}.{p}"));
        let provider = match name {
            "NSynthTfds" => Self::Tfds(TfdsProvider::nsynth(
                config.get_str(&param("name"))?,
                config.get_str(&param("split"))?,
                config.get_str(&param("data_dir"))?,
            )),
            "TfdsProvider" => {
                let dataset = config
                    .get_str(&param("name"))?
                    .ok_or_else(|| missing("name"))?;
                let split = config
                    .get_str(&param("split"))?
                    .ok_or_else(|| missing("split"))?;
                let data_dir = config
                    .get_str(&param("data_dir"))?
                    .unwrap_or(DEFAULT_DATA_DIR);
                Self::Tfds(TfdsProvider::new(dataset, split, data_dir))
            }
            "TFRecordProvider" => Self::TfRecord(TfRecordProvider::new(
                config.get_str(&param("file_pattern"))?,
                RecordSchema::VariableLength,
            )?),
            "SoloInstrument" => Self::TfRecord(TfRecordProvider::new(
                config.get_str(&param("file_pattern"))?,
                RecordSchema::SoloInstrument,
            )?),
            other => {
                return Err(DdspError::Config(format!(
                    "'{key}' refers to unknown data provider '{other}'"
                )))
            }
        };
        tracing::info!(routine, provider = %provider, "Resolved data provider");
        Ok(provider)
    }

    /// Configurable name of the provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tfds(p) => p.configurable_name(),
            Self::TfRecord(p) => p.schema().configurable_name(),
        }
    }
}

impl fmt::Display for DataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tfds(p) => write!(f, "{}({}, split={})", self.name(), p.name(), p.split()),
            Self::TfRecord(p) => write!(f, "{}({})", self.name(), p.file_pattern()),
        }
    }
}

impl DatasetSource for DataProvider {
    fn get_dataset(&self, shuffle: bool) -> Result<RecordStream> {
        match self {
            Self::Tfds(p) => p.get_dataset(shuffle),
            Self::TfRecord(p) => p.get_dataset(shuffle),
        }
    }

    fn get_preprocess_fn(&self) -> PreprocessFn {
        match self {
            Self::Tfds(p) => p.get_preprocess_fn(),
            Self::TfRecord(p) => p.get_preprocess_fn(),
        }
    }
}

/// Register the data providers as configurables.
pub fn register_configurables(registry: &mut Registry) {
    registry
        .register("NSynthTfds", &["name", "split", "data_dir"])
        .register("TfdsProvider", &["name", "split", "data_dir"])
        .register("TFRecordProvider", &["file_pattern"])
        .register("SoloInstrument", &["file_pattern"]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Feature, Record};
    use ddsp_core::{ConfigBuilder, LayerOrigin};

    #[derive(Clone)]
    struct Counting {
        len: i64,
    }

    impl DatasetSource for Counting {
        fn get_dataset(&self, _shuffle: bool) -> Result<RecordStream> {
            let len = self.len;
            Ok(Box::new(
                (0..len).map(|n| Ok(Record::new().with("id", Feature::Int64(vec![n])))),
            ))
        }
    }

    fn config(text: &str) -> ResolvedConfig {
        let mut registry = Registry::new();
        register_configurables(&mut registry);
        registry
            .register("train", &["data_provider"])
            .register("evaluate", &["data_provider"]);
        let mut builder = ConfigBuilder::new(&registry);
        builder
            .parse_bindings(LayerOrigin::User, "test", text, false)
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_default_preprocess_is_identity() {
        let source = Counting { len: 3 };
        let record = Record::new().with("id", Feature::Int64(vec![9]));
        assert_eq!((source.get_preprocess_fn())(record.clone()).unwrap(), record);
    }

    #[test]
    fn test_get_batch_counts() {
        let source = Counting { len: 10 };
        assert_eq!(source.get_batch(3, false, 1).unwrap().count(), 3);
        assert_eq!(source.get_batch(3, false, 2).unwrap().count(), 6);
        assert_eq!(source.get_batch(3, false, 0).unwrap().count(), 0);
        assert_eq!(source.get_batch(3, true, -1).unwrap().take(25).count(), 25);
        assert!(matches!(
            source.get_batch(0, false, 1),
            Err(DdspError::InvalidArgument(_))
        ));
        assert!(matches!(
            source.get_batch(3, false, -5),
            Err(DdspError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_input_fn_pairs_are_identical() {
        let input_fn = Counting { len: 8 }.get_input_fn(false, 1);
        let pairs: Vec<(Batch, Batch)> = input_fn(&InputParams { batch_size: 4 })
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        for (features, labels) in pairs {
            assert_eq!(features, labels);
            assert_eq!(features.len(), 4);
        }
    }

    #[test]
    fn test_from_config_selects_provider() {
        let cfg = config(
            "train.data_provider = @data.SoloInstrument()\n\
             SoloInstrument.file_pattern = '/data/solo/*.tfrecord'\n\
             evaluate.data_provider = @NSynthTfds()\n\
             NSynthTfds.data_dir = '/data/tfds'\n\
             evaluate/NSynthTfds.split = 'valid'\n",
        );
        match DataProvider::from_config(&cfg, "train").unwrap() {
            DataProvider::TfRecord(p) => {
                assert_eq!(p.schema(), RecordSchema::SoloInstrument);
                assert_eq!(p.file_pattern(), "/data/solo/*.tfrecord");
            }
            other => panic!("unexpected provider {other}"),
        }
        match DataProvider::from_config(&cfg, "evaluate").unwrap() {
            DataProvider::Tfds(p) => {
                assert_eq!(p.split(), "valid");
                assert_eq!(p.data_dir(), "/data/tfds");
            }
            other => panic!("unexpected provider {other}"),
        }
    }

    #[test]
    fn test_from_config_errors() {
        let cfg = config("train.data_provider = @TFRecordProvider()\n");
        assert!(matches!(
            DataProvider::from_config(&cfg, "train"),
            Err(DdspError::NotImplemented(_))
        ));
        assert!(matches!(
            DataProvider::from_config(&cfg, "evaluate"),
            Err(DdspError::MissingRequired(_))
        ));
    }
}
