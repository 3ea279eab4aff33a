//! Data providers for DDSP training.
//!
//! This crate provides:
//! - TFRecord file framing and the `tf.train.Example` codec
//! - Feature specifications and example parsing
//! - Streaming pipeline stages (interleave, parallel map, shuffle, repeat,
//!   batch, prefetch)
//! - Providers for prepared TFDS datasets and globbed TFRecord files

#![warn(missing_docs)]

pub mod example;
pub mod features;
pub mod pipeline;
mod provider;
mod record;
pub mod tfds;
pub mod tfrecord;
pub mod tfrecord_provider;

mod protos {
    include!(concat!(env!("OUT_DIR"), "/tf-protos/mod.rs"));
}

pub use features::{parse_single_example, DType, FeaturesDict, FixedLenFeature};
pub use pipeline::{Batch, BatchStream, PreprocessFn, RecordStream};
pub use provider::*;
pub use record::*;
pub use tfds::{TfdsProvider, TfdsSchema};
pub use tfrecord::{TfRecordReader, TfRecordWriter};
pub use tfrecord_provider::{RecordSchema, TfRecordProvider};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::pipeline::{Batch, BatchStream, RecordStream};
    pub use crate::provider::{DataProvider, DatasetSource, InputFn, InputParams};
    pub use crate::record::{Feature, Record};
    pub use crate::tfds::TfdsProvider;
    pub use crate::tfrecord_provider::TfRecordProvider;
}
