//! Record and feature types.

use std::collections::BTreeMap;

use ddsp_core::{DdspError, Result};

/// Key under which an unparsed serialized record is carried.
pub const SERIALIZED_KEY: &str = "serialized";

/// One feature value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// List of byte strings.
    Bytes(Vec<Vec<u8>>),
    /// List of 32-bit floats.
    Float(Vec<f32>),
    /// List of 64-bit integers.
    Int64(Vec<i64>),
    /// Nested group of features.
    Nested(Record),
}

impl Feature {
    /// Name of the stored dtype.
    pub fn dtype_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "string",
            Self::Float(_) => "float32",
            Self::Int64(_) => "int64",
            Self::Nested(_) => "nested",
        }
    }

    /// Number of values (fields, for nested features).
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Nested(r) => r.len(),
        }
    }

    /// Whether the feature holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Float values, if this is a float feature.
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Integer values, if this is an int64 feature.
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int64(v) => Some(v),
            _ => None,
        }
    }
}

/// A single unit of training data: named features, possibly nested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, Feature>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an unparsed serialized record.
    pub fn serialized(bytes: Vec<u8>) -> Self {
        Self::new().with(SERIALIZED_KEY, Feature::Bytes(vec![bytes]))
    }

    /// Bytes of an unparsed serialized record.
    pub fn serialized_bytes(&self) -> Option<&[u8]> {
        match self.fields.get(SERIALIZED_KEY) {
            Some(Feature::Bytes(values)) if values.len() == 1 => Some(&values[0]),
            _ => None,
        }
    }

    /// Build a nested record from flat keys such as `instrument/family`.
    pub fn from_flat(flat: BTreeMap<String, Feature>, separator: char) -> Result<Self> {
        let mut record = Self::new();
        for (key, feature) in flat {
            let parts: Vec<&str> = key.split(separator).collect();
            record.insert_path(&parts, feature, &key)?;
        }
        Ok(record)
    }

    fn insert_path(&mut self, parts: &[&str], feature: Feature, full_key: &str) -> Result<()> {
        let conflict = || DdspError::Decode(format!("Conflicting feature key '{full_key}'"));
        match parts {
            [] => Err(conflict()),
            [last] => {
                if self.fields.contains_key(*last) {
                    return Err(conflict());
                }
                self.fields.insert(last.to_string(), feature);
                Ok(())
            }
            [head, rest @ ..] => {
                let child = self
                    .fields
                    .entry(head.to_string())
                    .or_insert_with(|| Feature::Nested(Record::new()));
                match child {
                    Feature::Nested(nested) => nested.insert_path(rest, feature, full_key),
                    _ => Err(conflict()),
                }
            }
        }
    }

    /// Add a feature, builder style.
    pub fn with(mut self, key: impl Into<String>, feature: Feature) -> Self {
        self.insert(key, feature);
        self
    }

    /// Insert or replace a feature.
    pub fn insert(&mut self, key: impl Into<String>, feature: Feature) -> Option<Feature> {
        self.fields.insert(key.into(), feature)
    }

    /// Feature by top-level key.
    pub fn get(&self, key: &str) -> Option<&Feature> {
        self.fields.get(key)
    }

    /// Feature by dotted path (`instrument.family`).
    pub fn get_path(&self, path: &str) -> Option<&Feature> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            match current {
                Feature::Nested(record) => current = record.fields.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Feature by dotted path, failing with [`DdspError::MissingField`].
    pub fn require_path(&self, path: &str) -> Result<&Feature> {
        self.get_path(path)
            .ok_or_else(|| DdspError::MissingField(path.to_string()))
    }

    /// Remove a feature by dotted path, failing with [`DdspError::MissingField`].
    pub fn take_path(&mut self, path: &str) -> Result<Feature> {
        let missing = || DdspError::MissingField(path.to_string());
        match path.split_once('.') {
            None => self.fields.remove(path).ok_or_else(missing),
            Some((head, rest)) => match self.fields.get_mut(head) {
                Some(Feature::Nested(nested)) => nested.take_path(rest).map_err(|_| missing()),
                _ => Err(missing()),
            },
        }
    }

    /// Remove a top-level feature.
    pub fn remove(&mut self, key: &str) -> Option<Feature> {
        self.fields.remove(key)
    }

    /// Top-level keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Top-level features in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of top-level features.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no features.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flatten nested features into `parent/child` keys.
    pub fn flatten(&self, separator: char) -> BTreeMap<String, Feature> {
        let mut out = BTreeMap::new();
        self.flatten_into("", separator, &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, separator: char, out: &mut BTreeMap<String, Feature>) {
        for (key, feature) in &self.fields {
            let full = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}{separator}{key}")
            };
            match feature {
                Feature::Nested(nested) => nested.flatten_into(&full, separator, out),
                other => {
                    out.insert(full, other.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nsynth_flat() -> BTreeMap<String, Feature> {
        let mut flat = BTreeMap::new();
        flat.insert("pitch".into(), Feature::Int64(vec![60]));
        flat.insert("instrument/family".into(), Feature::Int64(vec![3]));
        flat.insert("instrument/source".into(), Feature::Int64(vec![0]));
        flat.insert("f0/hz".into(), Feature::Float(vec![261.6, 262.0]));
        flat
    }

    #[test]
    fn test_from_flat_nests_keys() {
        let record = Record::from_flat(nsynth_flat(), '/').unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(
            record.get_path("instrument.family"),
            Some(&Feature::Int64(vec![3]))
        );
        assert_eq!(record.get_path("f0.hz").unwrap().len(), 2);
        assert!(record.get_path("f0.confidence").is_none());
        assert!(record.get_path("pitch.value").is_none());
        assert_eq!(record.flatten('/'), nsynth_flat());
    }

    #[test]
    fn test_from_flat_rejects_conflicts() {
        let mut flat = nsynth_flat();
        flat.insert("instrument".into(), Feature::Int64(vec![1]));
        assert!(matches!(
            Record::from_flat(flat, '/'),
            Err(DdspError::Decode(_))
        ));
    }

    #[test]
    fn test_require_and_take_path() {
        let mut record = Record::from_flat(nsynth_flat(), '/').unwrap();
        let err = record.require_path("instrument.label").unwrap_err();
        assert!(matches!(err, DdspError::MissingField(ref f) if f == "instrument.label"));

        let family = record.take_path("instrument.family").unwrap();
        assert_eq!(family, Feature::Int64(vec![3]));
        let err = record.take_path("instrument.family").unwrap_err();
        assert!(matches!(err, DdspError::MissingField(ref f) if f == "instrument.family"));
    }

    #[test]
    fn test_serialized_record() {
        let record = Record::serialized(vec![1, 2, 3]);
        assert_eq!(record.serialized_bytes(), Some(&[1u8, 2, 3][..]));
        assert!(Record::new().serialized_bytes().is_none());
    }
}
