//! Streaming pipeline stages.
//!
//! Each stage is an iterator adapter over `Result` items so that failures
//! from any upstream stage surface to the consumer in order. The stages
//! mirror the usual input pipeline:
//!
//! ```text
//! interleave(files) -> parallel map -> shuffle -> repeat -> batch -> prefetch
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use ddsp_core::{DdspError, Result};

use crate::record::Record;

/// Stream of records.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Stream of batches.
pub type BatchStream = Box<dyn Iterator<Item = Result<Batch>> + Send>;

/// Per-record transformation applied by [`ParallelMap`].
pub type PreprocessFn = Arc<dyn Fn(Record) -> Result<Record> + Send + Sync>;

/// Re-opens a source for each pass of [`Repeat`].
pub type StreamFactory = Box<dyn FnMut() -> Result<RecordStream> + Send>;

/// Opens one input file of an [`Interleave`].
pub type FileOpener<T> =
    Arc<dyn Fn(PathBuf) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>> + Send + Sync>;

/// Records held by the shuffle buffer.
pub const SHUFFLE_BUFFER_SIZE: usize = 10_000;

/// Preprocessing function that returns records unchanged.
pub fn identity() -> PreprocessFn {
    Arc::new(|record: Record| -> Result<Record> { Ok(record) })
}

/// Buffer depth used by automatically tuned stages.
pub fn autotune_depth() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}

/// A fixed-size group of records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    /// Wrap records as a batch.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in stream order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Take ownership of the records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Applies a [`PreprocessFn`] on the rayon pool, preserving input order.
pub struct ParallelMap<I> {
    inner: I,
    f: PreprocessFn,
    chunk: usize,
    ready: VecDeque<Result<Record>>,
    exhausted: bool,
}

impl<I: Iterator<Item = Result<Record>>> ParallelMap<I> {
    /// Map `inner` through `f`.
    pub fn new(inner: I, f: PreprocessFn) -> Self {
        Self {
            inner,
            f,
            chunk: rayon::current_num_threads().max(1) * 4,
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    fn refill(&mut self) {
        let mut inputs = Vec::with_capacity(self.chunk);
        while inputs.len() < self.chunk {
            match self.inner.next() {
                Some(item) => inputs.push(item),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        let f = &self.f;
        let outputs: Vec<Result<Record>> = inputs
            .into_par_iter()
            .map(|item| item.and_then(|record| f(record)))
            .collect();
        self.ready.extend(outputs);
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for ParallelMap<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ready.is_empty() && !self.exhausted {
            self.refill();
        }
        self.ready.pop_front()
    }
}

/// Buffered random shuffle.
///
/// Keeps up to `capacity` records and emits a uniformly chosen one each
/// step, so output is a permutation of the input.
pub struct Shuffle<I> {
    inner: I,
    buffer: Vec<Record>,
    capacity: usize,
    rng: StdRng,
    exhausted: bool,
}

impl<I: Iterator<Item = Result<Record>>> Shuffle<I> {
    /// Shuffle `inner` through a buffer of `capacity` records.
    pub fn new(inner: I, capacity: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner,
            buffer: Vec::new(),
            capacity: capacity.max(1),
            rng,
            exhausted: false,
        }
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Shuffle<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(Ok(record)) => self.buffer.push(record),
                Some(Err(e)) => return Some(Err(e)),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.buffer.len());
        Some(Ok(self.buffer.swap_remove(idx)))
    }
}

/// Number of passes over a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passes {
    /// Repeat until the consumer stops.
    Unbounded,
    /// Exactly this many passes.
    Exactly(usize),
}

impl Passes {
    /// Interpret a repeat count where `-1` means unbounded.
    pub fn from_repeats(repeats: i64) -> Result<Self> {
        match repeats {
            -1 => Ok(Self::Unbounded),
            n if n >= 0 => Ok(Self::Exactly(n as usize)),
            n => Err(DdspError::InvalidArgument(format!(
                "repeats must be -1 or non-negative, got {n}"
            ))),
        }
    }
}

/// Concatenates passes over a source, re-opening it through a factory.
///
/// With [`Passes::Unbounded`] a pass that yields nothing ends the stream,
/// since repeating an empty source would never produce a record.
pub struct Repeat {
    factory: StreamFactory,
    remaining: Passes,
    current: Option<RecordStream>,
    yielded: bool,
    done: bool,
}

impl Repeat {
    /// Build the stage and open the first pass, so that source errors such
    /// as a pattern matching no files surface immediately.
    pub fn new(mut factory: StreamFactory, passes: Passes) -> Result<Self> {
        let (current, remaining) = match passes {
            Passes::Exactly(0) => (None, Passes::Exactly(0)),
            Passes::Exactly(n) => (Some(factory()?), Passes::Exactly(n - 1)),
            Passes::Unbounded => (Some(factory()?), Passes::Unbounded),
        };
        Ok(Self {
            factory,
            remaining,
            current,
            yielded: false,
            done: false,
        })
    }

    fn open_next_pass(&mut self) -> Option<Result<()>> {
        match self.remaining {
            Passes::Exactly(0) => return None,
            Passes::Exactly(n) => self.remaining = Passes::Exactly(n - 1),
            Passes::Unbounded => {}
        }
        match (self.factory)() {
            Ok(stream) => {
                self.current = Some(stream);
                self.yielded = false;
                Some(Ok(()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl Iterator for Repeat {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            match self.current.as_mut() {
                Some(stream) => match stream.next() {
                    Some(item) => {
                        self.yielded = true;
                        return Some(item);
                    }
                    None => {
                        self.current = None;
                        if !self.yielded && self.remaining == Passes::Unbounded {
                            tracing::warn!("Dataset pass produced no records; ending repeat");
                            self.done = true;
                            return None;
                        }
                    }
                },
                None => match self.open_next_pass() {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => {
                        self.done = true;
                        return None;
                    }
                },
            }
        }
    }
}

/// Groups records into batches of exactly `batch_size`, dropping the
/// final partial batch.
pub struct Batcher<I> {
    inner: I,
    batch_size: usize,
}

impl<I: Iterator<Item = Result<Record>>> Batcher<I> {
    /// Batch `inner`.
    pub fn new(inner: I, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(DdspError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Self { inner, batch_size })
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Batcher<I> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut records = Vec::with_capacity(self.batch_size);
        while records.len() < self.batch_size {
            match self.inner.next()? {
                Ok(record) => records.push(record),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(Batch::new(records)))
    }
}

/// Runs an iterator on a background thread, buffering up to `depth` items.
///
/// The producer stops at its next send once this handle is dropped.
pub struct Prefetch<T> {
    receiver: Receiver<T>,
}

impl<T: Send + 'static> Prefetch<T> {
    /// Start producing from `inner`.
    pub fn spawn<I>(inner: I, depth: usize) -> Result<Self>
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(depth.max(1));
        thread::Builder::new()
            .name("ddsp-prefetch".to_string())
            .spawn(move || {
                for item in inner {
                    if sender.send(item).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self { receiver })
    }
}

impl<T> Iterator for Prefetch<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

/// Reads several files concurrently and interleaves their items.
///
/// Up to `cycle_length` files are open at once, each on its own reader
/// thread. Items are taken round-robin, `block_length` at a time from each
/// open file. When a file is exhausted its slot is refilled with the next
/// unopened file.
pub struct Interleave<T> {
    pending: VecDeque<PathBuf>,
    open: FileOpener<T>,
    slots: Vec<Option<Receiver<Result<T>>>>,
    block_length: usize,
    cursor: usize,
    taken: usize,
}

impl<T: Send + 'static> Interleave<T> {
    /// Interleave `files`, opening each with `open`.
    pub fn new(
        files: Vec<PathBuf>,
        open: FileOpener<T>,
        cycle_length: usize,
        block_length: usize,
    ) -> Self {
        let cycle_length = cycle_length.max(1).min(files.len().max(1));
        let mut interleave = Self {
            pending: files.into(),
            open,
            slots: (0..cycle_length).map(|_| None).collect(),
            block_length: block_length.max(1),
            cursor: 0,
            taken: 0,
        };
        interleave.fill_slots();
        interleave
    }

    fn fill_slots(&mut self) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].is_none() {
                if let Some(path) = self.pending.pop_front() {
                    self.slots[idx] = Some(self.spawn_reader(path));
                }
            }
        }
    }

    fn spawn_reader(&self, path: PathBuf) -> Receiver<Result<T>> {
        let (sender, receiver) = mpsc::sync_channel(self.block_length);
        let open = Arc::clone(&self.open);
        let spawned = thread::Builder::new()
            .name("ddsp-reader".to_string())
            .spawn({
                let sender = sender.clone();
                move || read_file(open, path, sender)
            });
        if let Err(e) = spawned {
            let _ = sender.send(Err(e.into()));
        }
        receiver
    }

    fn advance(&mut self) {
        self.taken = 0;
        self.cursor = (self.cursor + 1) % self.slots.len();
    }
}

fn read_file<T>(open: FileOpener<T>, path: PathBuf, sender: SyncSender<Result<T>>) {
    tracing::debug!(path = %path.display(), "Opening input file");
    match open(path) {
        Ok(items) => {
            for item in items {
                if sender.send(item).is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            let _ = sender.send(Err(e));
        }
    }
}

impl<T: Send + 'static> Iterator for Interleave<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.fill_slots();
            if self.slots.iter().all(Option::is_none) {
                return None;
            }
            let idx = self.cursor;
            let received = match &self.slots[idx] {
                Some(receiver) => receiver.recv().ok(),
                None => {
                    self.advance();
                    continue;
                }
            };
            match received {
                Some(item) => {
                    self.taken += 1;
                    if self.taken >= self.block_length {
                        self.advance();
                    }
                    return Some(item);
                }
                None => {
                    self.slots[idx] = None;
                    self.advance();
                }
            }
        }
    }
}
