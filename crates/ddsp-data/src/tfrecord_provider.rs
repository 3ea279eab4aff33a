//! Providers reading TFRecord files matched by a glob pattern.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;

use ddsp_core::{DdspError, Result};

use crate::features::{parse_single_example, DType, FeaturesDict, FixedLenFeature};
use crate::pipeline::{FileOpener, Interleave, PreprocessFn, RecordStream};
use crate::provider::DatasetSource;
use crate::record::{Record, SERIALIZED_KEY};
use crate::tfrecord::TfRecordReader;

/// Files read concurrently by [`TfRecordProvider::get_dataset`].
pub const INTERLEAVE_CYCLE_LENGTH: usize = 40;

/// Samples of audio in one SoloInstrument example (4 seconds at 16kHz).
pub const SOLO_AUDIO_LENGTH: usize = 64_000;

/// Frames of f0 and loudness in one SoloInstrument example (4 seconds at 250Hz).
pub const SOLO_FRAME_LENGTH: usize = 1_000;

const AUDIO_FEATURES: [&str; 4] = ["audio", "f0_hz", "f0_confidence", "loudness_db"];

/// Feature layout of the serialized examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSchema {
    /// Audio features of any length.
    VariableLength,
    /// Fixed-length solo instrument excerpts.
    SoloInstrument,
}

impl RecordSchema {
    /// Features parsed from every example.
    pub fn features_dict(&self) -> FeaturesDict {
        AUDIO_FEATURES
            .iter()
            .map(|name| {
                let spec = match (self, *name) {
                    (Self::VariableLength, _) => FixedLenFeature::variable(DType::Float32),
                    (Self::SoloInstrument, "audio") => {
                        FixedLenFeature::new(SOLO_AUDIO_LENGTH, DType::Float32)
                    }
                    (Self::SoloInstrument, _) => {
                        FixedLenFeature::new(SOLO_FRAME_LENGTH, DType::Float32)
                    }
                };
                (name.to_string(), spec)
            })
            .collect()
    }

    /// Pattern used when none is configured. No schema declares one.
    pub fn default_file_pattern(&self) -> Result<String> {
        Err(DdspError::NotImplemented(format!(
            "You must pass a 'file_pattern' argument to {} or choose a provider \
             with a default file pattern",
            self.configurable_name()
        )))
    }

    /// Name this schema is configured under.
    pub fn configurable_name(&self) -> &'static str {
        match self {
            Self::VariableLength => "TFRecordProvider",
            Self::SoloInstrument => "SoloInstrument",
        }
    }
}

/// Reads serialized examples from the files matching a glob pattern.
#[derive(Debug, Clone)]
pub struct TfRecordProvider {
    file_pattern: String,
    schema: RecordSchema,
}

impl TfRecordProvider {
    /// Create a provider, falling back to the schema's default pattern.
    pub fn new(file_pattern: Option<&str>, schema: RecordSchema) -> Result<Self> {
        let file_pattern = match file_pattern {
            Some(pattern) => pattern.to_string(),
            None => schema.default_file_pattern()?,
        };
        Ok(Self {
            file_pattern,
            schema,
        })
    }

    /// SoloInstrument provider over `file_pattern`.
    pub fn solo_instrument(file_pattern: &str) -> Self {
        Self {
            file_pattern: file_pattern.to_string(),
            schema: RecordSchema::SoloInstrument,
        }
    }

    /// Glob pattern of the input files.
    pub fn file_pattern(&self) -> &str {
        &self.file_pattern
    }

    /// Feature layout.
    pub fn schema(&self) -> RecordSchema {
        self.schema
    }

    /// Files matching the pattern, sorted, or randomly ordered with `shuffle`.
    pub fn list_files(&self, shuffle: bool) -> Result<Vec<PathBuf>> {
        let pattern = ddsp_core::expand_user(&self.file_pattern);
        let pattern = pattern.to_string_lossy();
        let entries =
            glob::glob(&pattern).map_err(|e| DdspError::Pattern(format!("{pattern}: {e}")))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| DdspError::Io(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(DdspError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No files matched pattern: {pattern}"),
            )));
        }
        files.sort();
        if shuffle {
            files.shuffle(&mut rand::thread_rng());
        }
        Ok(files)
    }
}

fn open_file(path: PathBuf) -> Result<Box<dyn Iterator<Item = Result<Record>> + Send>> {
    let reader = TfRecordReader::open(path)?;
    Ok(Box::new(reader.map(|bytes| bytes.map(Record::serialized))))
}

impl DatasetSource for TfRecordProvider {
    fn get_dataset(&self, shuffle: bool) -> Result<RecordStream> {
        let files = self.list_files(shuffle)?;
        tracing::info!(
            pattern = %self.file_pattern,
            files = files.len(),
            "Reading TFRecord files"
        );
        let open: FileOpener<Record> = Arc::new(open_file);
        Ok(Box::new(Interleave::new(
            files,
            open,
            INTERLEAVE_CYCLE_LENGTH,
            1,
        )))
    }

    fn get_preprocess_fn(&self) -> PreprocessFn {
        let features = self.schema.features_dict();
        Arc::new(move |record: Record| -> Result<Record> {
            let bytes = record
                .serialized_bytes()
                .ok_or_else(|| DdspError::MissingField(SERIALIZED_KEY.to_string()))?;
            parse_single_example(bytes, &features)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_dict_lengths() {
        let solo = RecordSchema::SoloInstrument.features_dict();
        assert_eq!(solo.len(), 4);
        assert_eq!(solo["audio"].len, Some(64_000));
        assert_eq!(solo["f0_hz"].len, Some(1_000));
        assert_eq!(solo["f0_confidence"].len, Some(1_000));
        assert_eq!(solo["loudness_db"].len, Some(1_000));

        let variable = RecordSchema::VariableLength.features_dict();
        assert!(variable.values().all(|f| f.len.is_none() && f.dtype == DType::Float32));
    }

    #[test]
    fn test_missing_pattern_is_not_implemented() {
        for schema in [RecordSchema::VariableLength, RecordSchema::SoloInstrument] {
            let err = TfRecordProvider::new(None, schema).unwrap_err();
            assert!(matches!(err, DdspError::NotImplemented(_)));
            assert!(err.to_string().contains("file_pattern"));
        }
    }

    #[test]
    fn test_list_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tfrecord", "a.tfrecord", "c.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pattern = format!("{}/*.tfrecord", dir.path().display());
        let provider = TfRecordProvider::solo_instrument(&pattern);

        let files = provider.list_files(false).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.tfrecord"), dir.path().join("b.tfrecord")]
        );

        let mut shuffled = provider.list_files(true).unwrap();
        shuffled.sort();
        assert_eq!(shuffled, files);
    }

    #[test]
    fn test_list_files_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.tfrecord", dir.path().display());
        match TfRecordProvider::solo_instrument(&pattern).list_files(false) {
            Err(DdspError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(matches!(
            TfRecordProvider::solo_instrument("data/[*.tfrecord").list_files(false),
            Err(DdspError::Pattern(_))
        ));
    }

    #[test]
    fn test_preprocess_requires_serialized_bytes() {
        let preprocess = TfRecordProvider::solo_instrument("*").get_preprocess_fn();
        let err = preprocess(Record::new()).unwrap_err();
        assert!(matches!(err, DdspError::MissingField(ref f) if f == SERIALIZED_KEY));
    }
}
