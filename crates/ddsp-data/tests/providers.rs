//! End-to-end tests of the providers over on-disk fixtures.

use std::path::Path;

use ddsp_core::DdspError;
use ddsp_data::example::encode_example;
use ddsp_data::prelude::*;
use ddsp_data::tfds::DEFAULT_NSYNTH_NAME;
use ddsp_data::{RecordSchema, TfRecordWriter};
use tempfile::TempDir;

const RECORDS_PER_FILE: usize = 5;

fn solo_example(id: usize, audio_len: usize) -> Vec<u8> {
    let mut audio = vec![0.0f32; audio_len];
    audio[0] = id as f32;
    let record = Record::new()
        .with("audio", Feature::Float(audio))
        .with("f0_hz", Feature::Float(vec![440.0; 1000]))
        .with("f0_confidence", Feature::Float(vec![0.9; 1000]))
        .with("loudness_db", Feature::Float(vec![-40.0; 1000]))
        .with("id", Feature::Int64(vec![id as i64]));
    encode_example(&record).unwrap()
}

fn write_file(path: &Path, examples: impl IntoIterator<Item = Vec<u8>>) {
    let mut writer = TfRecordWriter::create(path).unwrap();
    for example in examples {
        writer.write_record(&example).unwrap();
    }
    writer.flush().unwrap();
}

/// Two files of solo instrument examples, ids 0..10.
fn solo_fixture() -> (TempDir, TfRecordProvider) {
    let dir = tempfile::tempdir().unwrap();
    for file in 0..2 {
        let ids = (0..RECORDS_PER_FILE).map(|i| file * RECORDS_PER_FILE + i);
        write_file(
            &dir.path().join(format!("solo-{file}.tfrecord")),
            ids.map(|id| solo_example(id, 64_000)),
        );
    }
    let pattern = format!("{}/solo-*.tfrecord", dir.path().display());
    (dir, TfRecordProvider::solo_instrument(&pattern))
}

fn audio_id(record: &Record) -> usize {
    record.get("audio").and_then(Feature::as_floats).unwrap()[0] as usize
}

fn ids(batches: BatchStream) -> Vec<usize> {
    let mut out = Vec::new();
    for batch in batches {
        out.extend(batch.unwrap().iter().map(audio_id));
    }
    out
}

#[test]
fn test_batches_have_exact_size() {
    let (_dir, provider) = solo_fixture();
    let batches: Vec<Batch> = provider
        .get_batch(4, false, 1)
        .unwrap()
        .collect::<ddsp_core::Result<_>>()
        .unwrap();
    assert_eq!(batches.len(), 2);
    for batch in &batches {
        assert_eq!(batch.len(), 4);
        for record in batch.iter() {
            let keys: Vec<&str> = record.keys().collect();
            assert_eq!(keys, vec!["audio", "f0_confidence", "f0_hz", "loudness_db"]);
            assert_eq!(record.get("audio").unwrap().len(), 64_000);
        }
    }
}

#[test]
fn test_finite_repeats_give_exact_passes() {
    let (_dir, provider) = solo_fixture();
    assert_eq!(ids(provider.get_batch(1, false, 3).unwrap()).len(), 30);
    assert_eq!(ids(provider.get_batch(1, false, 0).unwrap()).len(), 0);
}

#[test]
fn test_unbounded_repeat_cycles() {
    let (_dir, provider) = solo_fixture();
    let one_pass = ids(provider.get_batch(1, false, 1).unwrap());
    let cycled: Vec<usize> = provider
        .get_batch(1, false, -1)
        .unwrap()
        .take(3 * one_pass.len())
        .flat_map(|batch| batch.unwrap().into_records())
        .map(|record| audio_id(&record))
        .collect();
    assert_eq!(cycled, one_pass.repeat(3));
}

#[test]
fn test_unshuffled_order_is_stable() {
    let (_dir, provider) = solo_fixture();
    let first = ids(provider.get_batch(2, false, 1).unwrap());
    let second = ids(provider.get_batch(2, false, 1).unwrap());
    assert_eq!(first, second);
    // Two files interleaved one record at a time.
    assert_eq!(&first[..4], &[0, 5, 1, 6]);
}

#[test]
fn test_shuffle_preserves_records() {
    let (_dir, provider) = solo_fixture();
    let mut shuffled = ids(provider.get_batch(2, true, 1).unwrap());
    shuffled.sort_unstable();
    assert_eq!(shuffled, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_input_fn_pairs() {
    let (_dir, provider) = solo_fixture();
    let input_fn = provider.get_input_fn(false, 1);
    let mut pairs = 0;
    for pair in input_fn(&InputParams { batch_size: 5 }).unwrap() {
        let (features, labels) = pair.unwrap();
        assert_eq!(features, labels);
        pairs += 1;
    }
    assert_eq!(pairs, 2);
}

#[test]
fn test_solo_instrument_rejects_short_audio() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("short.tfrecord"), [solo_example(0, 63_999)]);
    let pattern = format!("{}/*.tfrecord", dir.path().display());
    let provider = TfRecordProvider::solo_instrument(&pattern);

    let first = provider.get_batch(1, false, 1).unwrap().next().unwrap();
    match first {
        Err(DdspError::SchemaMismatch { feature, .. }) => assert_eq!(feature, "audio"),
        other => panic!("expected schema mismatch, got {other:?}"),
    }

    // The same example parses without a fixed length.
    let variable = TfRecordProvider::new(
        Some(provider.file_pattern()),
        RecordSchema::VariableLength,
    )
    .unwrap();
    assert_eq!(ids(variable.get_batch(1, false, 1).unwrap()), vec![0]);
}

#[test]
fn test_corrupt_file_surfaces_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.tfrecord");
    write_file(&path, [solo_example(0, 64_000)]);
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    std::fs::write(&path, bytes).unwrap();

    let pattern = format!("{}/*.tfrecord", dir.path().display());
    let provider = TfRecordProvider::solo_instrument(&pattern);
    let first = provider.get_batch(1, false, 1).unwrap().next().unwrap();
    assert!(matches!(first, Err(DdspError::CorruptRecord { .. })));
}

fn nsynth_record(id: i64, with_family: bool) -> Record {
    let mut instrument = Record::new()
        .with("source", Feature::Int64(vec![0]))
        .with("label", Feature::Int64(vec![id % 3]));
    if with_family {
        instrument.insert("family", Feature::Int64(vec![4]));
    }
    Record::new()
        .with("id", Feature::Bytes(vec![format!("note_{id}").into_bytes()]))
        .with("pitch", Feature::Int64(vec![60 + id]))
        .with("velocity", Feature::Int64(vec![100]))
        .with("audio", Feature::Float(vec![id as f32; 64]))
        .with("instrument", Feature::Nested(instrument))
        .with(
            "f0",
            Feature::Nested(
                Record::new()
                    .with("hz", Feature::Float(vec![261.6; 4]))
                    .with("confidence", Feature::Float(vec![1.0; 4])),
            ),
        )
        .with(
            "loudness",
            Feature::Nested(Record::new().with("db", Feature::Float(vec![-30.0; 4]))),
        )
}

/// Prepared NSynth layout with two train shards.
fn nsynth_fixture(with_family: bool) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let version_dir = dir
        .path()
        .join("nsynth/gansynth_subset.f0_and_loudness/2.3.0");
    std::fs::create_dir_all(&version_dir).unwrap();
    for shard in 0..2 {
        let records = (0..4)
            .map(|i| encode_example(&nsynth_record(shard * 4 + i, with_family)).unwrap());
        write_file(
            &version_dir.join(format!("nsynth-train.tfrecord-0000{shard}-of-00002")),
            records,
        );
    }
    dir
}

#[test]
fn test_nsynth_flattens_records() {
    let dir = nsynth_fixture(true);
    let data_dir = dir.path().display().to_string();
    let provider = TfdsProvider::nsynth(None, None, Some(&data_dir));
    assert_eq!(provider.name(), DEFAULT_NSYNTH_NAME);

    let batches: Vec<Batch> = provider
        .get_batch(4, false, 1)
        .unwrap()
        .collect::<ddsp_core::Result<_>>()
        .unwrap();
    assert_eq!(batches.len(), 2);

    let record = &batches[0].records()[0];
    let keys: Vec<&str> = record.keys().collect();
    assert_eq!(
        keys,
        vec![
            "audio",
            "f0_confidence",
            "f0_hz",
            "instrument",
            "instrument_family",
            "instrument_source",
            "loudness_db",
            "pitch",
        ]
    );
    assert_eq!(record.get("instrument_family"), Some(&Feature::Int64(vec![4])));
    assert_eq!(record.get("pitch"), Some(&Feature::Int64(vec![60])));
}

#[test]
fn test_nsynth_missing_family() {
    let dir = nsynth_fixture(false);
    let data_dir = dir.path().display().to_string();
    let provider = TfdsProvider::nsynth(None, Some("train"), Some(&data_dir));

    let first = provider.get_batch(2, false, 1).unwrap().next().unwrap();
    match first {
        Err(DdspError::MissingField(field)) => assert_eq!(field, "instrument.family"),
        other => panic!("expected missing field, got {other:?}"),
    }
}

#[test]
fn test_tfds_missing_split() {
    let dir = nsynth_fixture(true);
    let data_dir = dir.path().display().to_string();
    let provider = TfdsProvider::nsynth(None, Some("valid"), Some(&data_dir));
    match provider.get_batch(2, false, 1) {
        Err(DdspError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("split should not exist"),
    }
}
