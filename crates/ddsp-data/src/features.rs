//! Feature specifications and example parsing.

use std::collections::BTreeMap;
use std::fmt;

use ddsp_core::{DdspError, Result};

use crate::example::decode_example;
use crate::record::{Feature, Record};

/// Element type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit float.
    Float32,
    /// 64-bit integer.
    Int64,
    /// Byte string.
    String,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float32 => "float32",
            Self::Int64 => "int64",
            Self::String => "string",
        })
    }
}

/// A fixed-length feature: a one-dimensional shape plus a dtype.
///
/// A `len` of `None` marks a variable-length dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLenFeature {
    /// Expected number of values, if fixed.
    pub len: Option<usize>,
    /// Element type.
    pub dtype: DType,
}

impl FixedLenFeature {
    /// Feature with exactly `len` values.
    pub const fn new(len: usize, dtype: DType) -> Self {
        Self {
            len: Some(len),
            dtype,
        }
    }

    /// Feature with any number of values.
    pub const fn variable(dtype: DType) -> Self {
        Self { len: None, dtype }
    }

    fn check(&self, name: &str, feature: &Feature) -> Result<()> {
        let dtype_ok = matches!(
            (self.dtype, feature),
            (DType::Float32, Feature::Float(_))
                | (DType::Int64, Feature::Int64(_))
                | (DType::String, Feature::Bytes(_))
        );
        if !dtype_ok {
            return Err(DdspError::schema_mismatch(
                name,
                format!("expected {}, found {}", self.dtype, feature.dtype_name()),
            ));
        }
        match self.len {
            Some(len) if feature.len() != len => Err(DdspError::schema_mismatch(
                name,
                format!("expected {len} values, found {}", feature.len()),
            )),
            _ => Ok(()),
        }
    }
}

/// Mapping from feature name to its specification.
pub type FeaturesDict = BTreeMap<String, FixedLenFeature>;

/// Parse a serialized `Example` against `features`.
///
/// Every listed feature must be present with the declared dtype and length;
/// features not listed are ignored.
pub fn parse_single_example(serialized: &[u8], features: &FeaturesDict) -> Result<Record> {
    let mut flat = decode_example(serialized)?;
    let mut record = Record::new();
    for (name, spec) in features {
        let feature = flat
            .remove(name)
            .ok_or_else(|| DdspError::MissingField(name.clone()))?;
        spec.check(name, &feature)?;
        record.insert(name.clone(), feature);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example::encode_example;

    fn features() -> FeaturesDict {
        let mut dict = FeaturesDict::new();
        dict.insert("audio".into(), FixedLenFeature::new(4, DType::Float32));
        dict.insert("f0_hz".into(), FixedLenFeature::variable(DType::Float32));
        dict
    }

    #[test]
    fn test_parse_keeps_listed_features() {
        let serialized = encode_example(
            &Record::new()
                .with("audio", Feature::Float(vec![0.0, 0.1, 0.2, 0.3]))
                .with("f0_hz", Feature::Float(vec![440.0]))
                .with("extra", Feature::Int64(vec![1])),
        )
        .unwrap();
        let record = parse_single_example(&serialized, &features()).unwrap();
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["audio", "f0_hz"]);
        assert_eq!(record.get("f0_hz").unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let serialized = encode_example(
            &Record::new()
                .with("audio", Feature::Float(vec![0.0; 3]))
                .with("f0_hz", Feature::Float(vec![])),
        )
        .unwrap();
        let err = parse_single_example(&serialized, &features()).unwrap_err();
        assert!(matches!(err, DdspError::SchemaMismatch { ref feature, .. } if feature == "audio"));
    }

    #[test]
    fn test_parse_rejects_wrong_dtype() {
        let serialized = encode_example(
            &Record::new()
                .with("audio", Feature::Float(vec![0.0; 4]))
                .with("f0_hz", Feature::Int64(vec![440])),
        )
        .unwrap();
        let err = parse_single_example(&serialized, &features()).unwrap_err();
        assert!(err.to_string().contains("expected float32, found int64"));
    }

    #[test]
    fn test_parse_missing_feature() {
        let serialized =
            encode_example(&Record::new().with("audio", Feature::Float(vec![0.0; 4]))).unwrap();
        let err = parse_single_example(&serialized, &features()).unwrap_err();
        assert!(matches!(err, DdspError::MissingField(ref f) if f == "f0_hz"));
    }
}
