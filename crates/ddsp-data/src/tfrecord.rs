//! TFRecord file framing.
//!
//! Each entry is laid out as:
//!
//! ```text
//! u64  length            (little endian)
//! u32  masked_crc32c(length bytes)
//! [u8] data[length]
//! u32  masked_crc32c(data)
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use ddsp_core::{DdspError, Result};

const MASK_DELTA: u32 = 0xa282_ead8;
const CASTAGNOLI: u32 = 0x82F6_3B78;
const HEADER_LEN: usize = 12;

static CRC32C_TABLE: [u32; 256] = make_table();

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CASTAGNOLI
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32C (Castagnoli) checksum.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc = CRC32C_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Masked CRC-32C as stored in TFRecord files.
pub fn masked_crc32c(data: &[u8]) -> u32 {
    crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Sequential reader over the entries of one TFRecord file.
pub struct TfRecordReader<R> {
    reader: R,
    path: PathBuf,
    finished: bool,
}

impl TfRecordReader<BufReader<File>> {
    /// Open a TFRecord file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: Read> TfRecordReader<R> {
    /// Wrap a reader; `path` is only used in error messages.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            finished: false,
        }
    }

    /// Read the next entry, or `None` at a clean end of file.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; HEADER_LEN];
        match self.read_full(&mut header)? {
            0 => return Ok(None),
            HEADER_LEN => {}
            n => return Err(self.corrupt(format!("truncated header ({n} of {HEADER_LEN} bytes)"))),
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[..8]);
        let mut len_crc = [0u8; 4];
        len_crc.copy_from_slice(&header[8..]);
        if masked_crc32c(&len_bytes) != u32::from_le_bytes(len_crc) {
            return Err(self.corrupt("length checksum mismatch"));
        }
        let len = u64::from_le_bytes(len_bytes);
        let len = usize::try_from(len).map_err(|_| self.corrupt(format!("record of {len} bytes")))?;

        let mut data = vec![0u8; len];
        let read = self.read_full(&mut data)?;
        if read != len {
            return Err(self.corrupt(format!("truncated data ({read} of {len} bytes)")));
        }

        let mut footer = [0u8; 4];
        if self.read_full(&mut footer)? != footer.len() {
            return Err(self.corrupt("truncated data checksum"));
        }
        if masked_crc32c(&data) != u32::from_le_bytes(footer) {
            return Err(self.corrupt("data checksum mismatch"));
        }
        Ok(Some(data))
    }

    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn corrupt(&self, reason: impl Into<String>) -> DdspError {
        DdspError::corrupt_record(&self.path, reason)
    }
}

impl<R: Read> Iterator for TfRecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_record() {
            Ok(Some(data)) => Some(Ok(data)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Writer producing TFRecord framing.
pub struct TfRecordWriter<W: Write> {
    writer: W,
}

impl TfRecordWriter<BufWriter<File>> {
    /// Create (or truncate) a TFRecord file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TfRecordWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one entry.
    pub fn write_record(&mut self, data: &[u8]) -> Result<()> {
        let len = (data.len() as u64).to_le_bytes();
        self.writer.write_all(&len)?;
        self.writer.write_all(&masked_crc32c(&len).to_le_bytes())?;
        self.writer.write_all(data)?;
        self.writer.write_all(&masked_crc32c(data).to_le_bytes())?;
        Ok(())
    }

    /// Flush buffered entries.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
