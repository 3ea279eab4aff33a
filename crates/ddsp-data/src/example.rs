//! `tf.train.Example` codec.
//!
//! The messages are generated from `src/protos/example.proto` at build time.
//! Repeated numeric values are written packed and accepted both packed and
//! unpacked.

use std::collections::BTreeMap;

use protobuf::{Message, MessageField};

use ddsp_core::{DdspError, Result};

use crate::protos::example as pb;
use crate::record::{Feature, Record};

fn decode_error(msg: impl Into<String>) -> DdspError {
    DdspError::Decode(msg.into())
}

/// Decode a serialized `Example` into its flat feature map.
///
/// Keys are returned verbatim; use [`Record::from_flat`] to nest keys that
/// contain a separator. Duplicate map entries keep the last value.
pub fn decode_example(bytes: &[u8]) -> Result<BTreeMap<String, Feature>> {
    let example = pb::Example::parse_from_bytes(bytes)
        .map_err(|e| decode_error(format!("malformed Example: {e}")))?;
    let features = example
        .features
        .into_option()
        .map(|features| features.feature)
        .unwrap_or_default();

    features
        .into_iter()
        .map(|(key, feature)| {
            let value = match feature.kind {
                Some(pb::feature::Kind::BytesList(list)) => Feature::Bytes(list.value),
                Some(pb::feature::Kind::FloatList(list)) => Feature::Float(list.value),
                Some(pb::feature::Kind::Int64List(list)) => Feature::Int64(list.value),
                None => return Err(decode_error(format!("feature '{key}' has no value list"))),
            };
            Ok((key, value))
        })
        .collect()
}

/// Encode a record as a serialized `Example`.
///
/// Nested features are flattened into `parent/child` keys.
pub fn encode_example(record: &Record) -> Result<Vec<u8>> {
    let mut features = pb::Features::new();
    for (key, feature) in record.flatten('/') {
        features.feature.insert(key, to_proto(feature));
    }
    let mut example = pb::Example::new();
    example.features = MessageField::some(features);
    example
        .write_to_bytes()
        .map_err(|e| decode_error(format!("unable to encode Example: {e}")))
}

fn to_proto(feature: Feature) -> pb::Feature {
    let kind = match feature {
        Feature::Bytes(value) => pb::feature::Kind::BytesList(pb::BytesList {
            value,
            ..Default::default()
        }),
        Feature::Float(value) => pb::feature::Kind::FloatList(pb::FloatList {
            value,
            ..Default::default()
        }),
        Feature::Int64(value) => pb::feature::Kind::Int64List(pb::Int64List {
            value,
            ..Default::default()
        }),
        // flatten() never yields nested features
        Feature::Nested(_) => pb::feature::Kind::BytesList(pb::BytesList::new()),
    };
    let mut out = pb::Feature::new();
    out.kind = Some(kind);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Length-delimited field with a single-byte length.
    fn len_field(field: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![(field << 3) | 2, body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    fn entry(key: &str, feature: &[u8]) -> Vec<u8> {
        let mut entry = len_field(1, key.as_bytes());
        entry.extend(len_field(2, feature));
        len_field(1, &entry)
    }

    #[test]
    fn test_encode_decode_example() {
        let record = Record::new()
            .with("audio", Feature::Float(vec![0.5, -0.25, 1.0]))
            .with("pitch", Feature::Int64(vec![60, -1]))
            .with("id", Feature::Bytes(vec![b"keyboard_001".to_vec()]))
            .with(
                "instrument",
                Feature::Nested(Record::new().with("family", Feature::Int64(vec![4]))),
            );

        let flat = decode_example(&encode_example(&record).unwrap()).unwrap();
        assert_eq!(flat.len(), 4);
        assert_eq!(flat["audio"], Feature::Float(vec![0.5, -0.25, 1.0]));
        assert_eq!(flat["pitch"], Feature::Int64(vec![60, -1]));
        assert_eq!(flat["instrument/family"], Feature::Int64(vec![4]));
        assert_eq!(Record::from_flat(flat, '/').unwrap(), record);
    }

    #[test]
    fn test_decode_unpacked_values() {
        // FloatList with two unpacked fixed32 values.
        let mut floats: Vec<u8> = Vec::new();
        for v in [1.5f32, 2.5] {
            floats.push((1 << 3) | 5);
            floats.extend_from_slice(&v.to_le_bytes());
        }
        // Int64List with two unpacked varints: 7 and 300.
        let ints: [u8; 5] = [1 << 3, 0x07, 1 << 3, 0xAC, 0x02];

        let mut features = entry("f", &len_field(2, &floats));
        features.extend(entry("i", &len_field(3, &ints)));
        let example = len_field(1, &features);

        let flat = decode_example(&example).unwrap();
        assert_eq!(flat["f"], Feature::Float(vec![1.5, 2.5]));
        assert_eq!(flat["i"], Feature::Int64(vec![7, 300]));
    }

    #[test]
    fn test_decode_feature_without_kind() {
        let example = len_field(1, &entry("x", &[]));
        let err = decode_example(&example).unwrap_err();
        assert!(matches!(err, DdspError::Decode(ref msg) if msg.contains("'x'")));
    }

    #[test]
    fn test_decode_empty_and_truncated() {
        assert!(decode_example(&[]).unwrap().is_empty());

        let bytes =
            encode_example(&Record::new().with("x", Feature::Float(vec![1.0; 8]))).unwrap();
        let err = decode_example(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, DdspError::Decode(_)));
    }
}
