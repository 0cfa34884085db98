//! Way and relation record files.
//!
//! Records are bincode payloads framed with a varint length, written in
//! insertion order. A sibling offsets file maps element id to file position
//! and is sorted once at read time for binary search.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bincode::{Decode, Encode};

use crate::cache::OFFSETS_EXT;
use crate::coding::{read_uvarint_at, write_uvarint};
use crate::common::bincode_config;
use crate::errors::{GazetteerError, Result};

const FLUSH_COUNT: usize = 10_000_000;
const WRITE_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Buffered writer of sorted-later `(key, value)` pair files.
pub struct IndexFileWriter {
    out: BufWriter<File>,
    elements: Vec<(u64, u64)>,
}

impl IndexFileWriter {
    /// Creates the pair file.
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            elements: Vec::new(),
        })
    }

    /// Adds one pair, flushing in batches.
    pub fn add(&mut self, key: u64, value: u64) -> Result<()> {
        if self.elements.len() > FLUSH_COUNT {
            self.flush()?;
        }
        self.elements.push((key, value));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for (key, value) in &self.elements {
            self.out.write_all(&key.to_le_bytes())?;
            self.out.write_all(&value.to_le_bytes())?;
        }
        self.elements.clear();
        Ok(())
    }

    /// Flushes every buffered pair to disk.
    pub fn write_all(mut self) -> Result<()> {
        self.flush()?;
        self.out.flush()?;
        Ok(())
    }
}

/// Reader over a pair file, sorted in memory for binary search.
pub struct IndexFileReader {
    elements: Vec<(u64, u64)>,
}

impl IndexFileReader {
    /// Loads and sorts the pair file.
    pub fn open(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        if bytes.len() % 16 != 0 {
            return Err(GazetteerError::invalid_input(
                "offsets",
                format!("damaged pair file {}", path.display()),
            ));
        }
        let mut elements = Vec::with_capacity(bytes.len() / 16);
        for chunk in bytes.chunks_exact(16) {
            elements.push((
                u64::from_le_bytes(chunk[0..8].try_into().expect("pair size")),
                u64::from_le_bytes(chunk[8..16].try_into().expect("pair size")),
            ));
        }
        elements.sort_unstable();
        Ok(Self { elements })
    }

    /// Looks up the first value stored for `key`.
    pub fn value_by_key(&self, key: u64) -> Option<u64> {
        let i = self.elements.partition_point(|(k, _)| *k < key);
        match self.elements.get(i) {
            Some((k, v)) if *k == key => Some(*v),
            _ => None,
        }
    }

    /// Calls `f` for every value stored for `key`.
    pub fn for_each_value<F: FnMut(u64)>(&self, key: u64, mut f: F) {
        let mut i = self.elements.partition_point(|(k, _)| *k < key);
        while let Some((k, v)) = self.elements.get(i) {
            if *k != key {
                break;
            }
            f(*v);
            i += 1;
        }
    }
}

fn offsets_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(OFFSETS_EXT);
    PathBuf::from(s)
}

/// Writer of one element record file plus its offsets index.
pub struct ElementCacheWriter {
    inner: Mutex<ElementCacheWriterInner>,
}

struct ElementCacheWriterInner {
    payload: BufWriter<File>,
    position: u64,
    offsets: IndexFileWriter,
}

impl ElementCacheWriter {
    /// Creates the payload and offsets files.
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(ElementCacheWriterInner {
                payload: BufWriter::with_capacity(WRITE_BUFFER_SIZE, File::create(path)?),
                position: 0,
                offsets: IndexFileWriter::new(&offsets_path(path))?,
            }),
        })
    }

    /// Appends one record.
    pub fn write<T: Encode>(&self, id: u64, element: &T) -> Result<()> {
        let encoded = bincode::encode_to_vec(element, bincode_config())?;
        let mut inner = self.inner.lock().expect("element cache writer poisoned");
        let position = inner.position;
        inner.offsets.add(id, position)?;
        let mut frame = Vec::with_capacity(encoded.len() + 4);
        write_uvarint(&mut frame, encoded.len() as u64)?;
        frame.extend_from_slice(&encoded);
        inner.payload.write_all(&frame)?;
        inner.position += frame.len() as u64;
        Ok(())
    }

    /// Flushes the payload and the offsets index.
    pub fn save_offsets(self) -> Result<()> {
        let inner = self
            .inner
            .into_inner()
            .expect("element cache writer poisoned");
        let mut payload = inner.payload;
        payload.flush()?;
        inner.offsets.write_all()
    }
}

/// Random-access reader over an element record file.
pub struct ElementCacheReader {
    payload: Vec<u8>,
    offsets: IndexFileReader,
}

impl ElementCacheReader {
    /// Opens the payload and offsets files.
    pub fn open(path: &Path) -> Result<Self> {
        let mut payload = Vec::new();
        File::open(path)?.read_to_end(&mut payload)?;
        Ok(Self {
            payload,
            offsets: IndexFileReader::open(&offsets_path(path))?,
        })
    }

    /// Decodes the record stored for `id`.
    pub fn get<T: Decode<()>>(&self, id: u64) -> Option<T> {
        let position = self.offsets.value_by_key(id)? as usize;
        let mut pos = position;
        let len = read_uvarint_at(&self.payload, &mut pos).ok()? as usize;
        let frame = self.payload.get(pos..pos + len)?;
        match bincode::decode_from_slice(frame, bincode_config()) {
            Ok((element, _)) => Some(element),
            Err(e) => {
                log::warn!("corrupt cache record for id {id}: {e}");
                None
            }
        }
    }
}
