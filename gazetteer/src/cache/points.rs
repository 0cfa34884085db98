//! Node coordinate storages.
//!
//! All three modes share the fixed-point representation of
//! [`LatLon`](super::LatLon) and the `(0, 0)` absent sentinel.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use hashbrown::HashMap;
use memmap2::{Mmap, MmapMut};

use crate::cache::{LatLon, NodeStorageType};
use crate::common::COORD_SCALE;
use crate::errors::{GazetteerError, Result};

/// Node-id ceiling of the dense storages. OSM had around 4.1 billion nodes
/// at capture time.
pub const NODE_ID_CEILING: u64 = 1 << 33;

const RECORD_SIZE: u64 = 8;

/// Write half of a node storage. Implementations are thread-safe; per-id
/// writes from concurrent workers are disjoint.
pub trait PointStorageWriter: Send + Sync {
    /// Stores one node.
    fn add_point(&self, id: u64, lat: f64, lon: f64) -> Result<()>;

    /// Stores a batch of nodes.
    fn add_points(&self, nodes: &[(u64, LatLon)]) -> Result<()> {
        for (id, ll) in nodes {
            self.add_point(
                *id,
                f64::from(ll.lat) / COORD_SCALE,
                f64::from(ll.lon) / COORD_SCALE,
            )?;
        }
        Ok(())
    }

    /// Number of stored nodes.
    fn num_processed(&self) -> u64;

    /// Flushes the storage to disk.
    fn finish(&self) -> Result<()>;
}

/// Read half of a node storage.
pub trait PointStorageReader: Send + Sync {
    /// Returns degrees, or `None` for the sentinel or an absent id.
    fn point(&self, id: u64) -> Option<(f64, f64)>;
}

pub(crate) fn to_latlon(lat: f64, lon: f64) -> Result<LatLon> {
    let lat64 = (lat * COORD_SCALE) as i64;
    let lon64 = (lon * COORD_SCALE) as i64;
    if i32::try_from(lat64).is_err() || i32::try_from(lon64).is_err() {
        return Err(GazetteerError::invalid_input(
            "coords",
            format!("coordinate out of 32-bit fixed-point range: {lat} {lon}"),
        ));
    }
    Ok(LatLon {
        lat: lat64 as i32,
        lon: lon64 as i32,
    })
}

fn from_latlon(ll: LatLon) -> Option<(f64, f64)> {
    if ll.lat == 0 && ll.lon == 0 {
        return None;
    }
    Some((
        f64::from(ll.lat) / COORD_SCALE,
        f64::from(ll.lon) / COORD_SCALE,
    ))
}

#[inline(always)]
fn pack(ll: LatLon) -> u64 {
    ((ll.lat as u32 as u64) << 32) | (ll.lon as u32 as u64)
}

#[inline(always)]
fn unpack(v: u64) -> LatLon {
    LatLon {
        lat: (v >> 32) as u32 as i32,
        lon: v as u32 as i32,
    }
}

// Memory ------------------------------------------------------------------

/// Dense in-RAM array of packed coordinates, persisted on `finish`.
pub struct MemoryPointStorageWriter {
    data: Vec<AtomicU64>,
    path: std::path::PathBuf,
    num_processed: AtomicU64,
}

impl MemoryPointStorageWriter {
    /// Allocates the full-size array. Untouched slots stay zero pages.
    pub fn new(path: &Path) -> Self {
        Self::with_capacity(path, NODE_ID_CEILING)
    }

    /// Allocates a smaller array; used by tests.
    pub fn with_capacity(path: &Path, capacity: u64) -> Self {
        let mut data = Vec::new();
        data.resize_with(capacity as usize, || AtomicU64::new(0));
        Self {
            data,
            path: path.to_owned(),
            num_processed: AtomicU64::new(0),
        }
    }
}

impl PointStorageWriter for MemoryPointStorageWriter {
    fn add_point(&self, id: u64, lat: f64, lon: f64) -> Result<()> {
        let slot = self.data.get(id as usize).ok_or_else(|| {
            GazetteerError::invalid_input(
                "node_id",
                format!("node id {id} exceeds the allocated cache size"),
            )
        })?;
        slot.store(pack(to_latlon(lat, lon)?), Ordering::Relaxed);
        self.num_processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn num_processed(&self) -> u64 {
        self.num_processed.load(Ordering::Relaxed)
    }

    fn finish(&self) -> Result<()> {
        let mut w = BufWriter::new(File::create(&self.path)?);
        for slot in &self.data {
            let ll = unpack(slot.load(Ordering::Relaxed));
            w.write_all(&ll.lat.to_le_bytes())?;
            w.write_all(&ll.lon.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Reader that loads the dense file fully into memory.
pub struct MemoryPointStorageReader {
    data: Vec<LatLon>,
}

impl MemoryPointStorageReader {
    /// Reads the whole dense array file.
    pub fn open(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let mut data = Vec::with_capacity(bytes.len() / RECORD_SIZE as usize);
        for chunk in bytes.chunks_exact(RECORD_SIZE as usize) {
            data.push(LatLon {
                lat: i32::from_le_bytes(chunk[0..4].try_into().expect("chunk size")),
                lon: i32::from_le_bytes(chunk[4..8].try_into().expect("chunk size")),
            });
        }
        Ok(Self { data })
    }
}

impl PointStorageReader for MemoryPointStorageReader {
    fn point(&self, id: u64) -> Option<(f64, f64)> {
        let ll = *self.data.get(id as usize)?;
        let point = from_latlon(ll);
        if point.is_none() {
            log::error!("node with id = {id} not found");
        }
        point
    }
}

// File --------------------------------------------------------------------

/// Dense storage backed by a memory-mapped file.
pub struct FilePointStorageWriter {
    map: MmapMut,
    num_processed: AtomicU64,
}

impl FilePointStorageWriter {
    /// Creates the backing file at full size.
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_capacity(path, NODE_ID_CEILING)
    }

    /// Creates a smaller backing file; used by tests.
    pub fn with_capacity(path: &Path, capacity: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity * RECORD_SIZE)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        // Pages are dirtied in ascending id order, so advise sequential
        // write-back.
        #[cfg(unix)]
        let _ = map.advise(memmap2::Advice::Sequential);
        Ok(Self {
            map,
            num_processed: AtomicU64::new(0),
        })
    }

    fn slots(&self) -> &[AtomicU64] {
        // The mapping is page-aligned and sized in whole records, so
        // reinterpreting as atomics is sound; concurrent workers write
        // disjoint ids.
        unsafe {
            std::slice::from_raw_parts(
                self.map.as_ptr() as *const AtomicU64,
                self.map.len() / RECORD_SIZE as usize,
            )
        }
    }
}

impl PointStorageWriter for FilePointStorageWriter {
    fn add_point(&self, id: u64, lat: f64, lon: f64) -> Result<()> {
        let slots = self.slots();
        let slot = slots.get(id as usize).ok_or_else(|| {
            GazetteerError::invalid_input(
                "node_id",
                format!("node id {id} exceeds the allocated cache size"),
            )
        })?;
        let ll = to_latlon(lat, lon)?;
        let mut record = [0u8; 8];
        record[0..4].copy_from_slice(&ll.lat.to_le_bytes());
        record[4..8].copy_from_slice(&ll.lon.to_le_bytes());
        // from_ne_bytes keeps the on-disk byte order exact: storing the
        // native value writes `record` back verbatim.
        slot.store(u64::from_ne_bytes(record), Ordering::Relaxed);
        self.num_processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn num_processed(&self) -> u64 {
        self.num_processed.load(Ordering::Relaxed)
    }

    fn finish(&self) -> Result<()> {
        self.map.flush_async()?;
        Ok(())
    }
}

/// Reader over the memory-mapped dense array.
pub struct FilePointStorageReader {
    map: Mmap,
}

impl FilePointStorageReader {
    /// Maps the dense array file for random reads.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        #[cfg(unix)]
        let _ = map.advise(memmap2::Advice::WillNeed);
        Ok(Self { map })
    }
}

impl PointStorageReader for FilePointStorageReader {
    fn point(&self, id: u64) -> Option<(f64, f64)> {
        let offset = (id * RECORD_SIZE) as usize;
        let bytes = self.map.get(offset..offset + RECORD_SIZE as usize)?;
        let ll = LatLon {
            lat: i32::from_le_bytes(bytes[0..4].try_into().expect("record size")),
            lon: i32::from_le_bytes(bytes[4..8].try_into().expect("record size")),
        };
        let point = from_latlon(ll);
        if point.is_none() {
            log::error!("node with id = {id} not found");
        }
        point
    }
}

// Index -------------------------------------------------------------------

/// Append-only stream of `[u64 id | i32 lat | i32 lon]` records.
pub struct IndexPointStorageWriter {
    out: Mutex<BufWriter<File>>,
    num_processed: AtomicU64,
}

impl IndexPointStorageWriter {
    /// Creates the packed stream file.
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            out: Mutex::new(BufWriter::new(File::create(path)?)),
            num_processed: AtomicU64::new(0),
        })
    }
}

impl PointStorageWriter for IndexPointStorageWriter {
    fn add_point(&self, id: u64, lat: f64, lon: f64) -> Result<()> {
        let ll = to_latlon(lat, lon)?;
        let mut out = self.out.lock().expect("index point writer poisoned");
        out.write_all(&id.to_le_bytes())?;
        out.write_all(&ll.lat.to_le_bytes())?;
        out.write_all(&ll.lon.to_le_bytes())?;
        self.num_processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn num_processed(&self) -> u64 {
        self.num_processed.load(Ordering::Relaxed)
    }

    fn finish(&self) -> Result<()> {
        self.out
            .lock()
            .expect("index point writer poisoned")
            .flush()?;
        Ok(())
    }
}

/// Reader that scans the packed stream into a hash map once.
pub struct IndexPointStorageReader {
    map: HashMap<u64, LatLon>,
}

impl IndexPointStorageReader {
    /// Scans the packed stream file.
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("nodes reading is started");
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let mut map = HashMap::new();
        for chunk in bytes.chunks_exact(16) {
            let id = u64::from_le_bytes(chunk[0..8].try_into().expect("record size"));
            let ll = LatLon {
                lat: i32::from_le_bytes(chunk[8..12].try_into().expect("record size")),
                lon: i32::from_le_bytes(chunk[12..16].try_into().expect("record size")),
            };
            map.insert(id, ll);
        }
        log::info!("nodes reading is finished");
        Ok(Self { map })
    }
}

impl PointStorageReader for IndexPointStorageReader {
    fn point(&self, id: u64) -> Option<(f64, f64)> {
        let ll = *self.map.get(&id)?;
        let point = from_latlon(ll);
        if point.is_none() {
            log::error!("inconsistent index storage: node with id = {id} must exist");
        }
        point
    }
}

// Factories ---------------------------------------------------------------

/// Creates the writer for the selected storage mode.
pub fn create_point_storage_writer(
    storage: NodeStorageType,
    path: &Path,
) -> Result<Box<dyn PointStorageWriter>> {
    Ok(match storage {
        NodeStorageType::Memory => Box::new(MemoryPointStorageWriter::new(path)),
        NodeStorageType::Index => Box::new(IndexPointStorageWriter::new(path)?),
        NodeStorageType::File => Box::new(FilePointStorageWriter::new(path)?),
    })
}

/// Creates the reader for the selected storage mode.
pub fn create_point_storage_reader(
    storage: NodeStorageType,
    path: &Path,
) -> Result<Box<dyn PointStorageReader>> {
    Ok(match storage {
        NodeStorageType::Memory => Box::new(MemoryPointStorageReader::open(path)?),
        NodeStorageType::Index => Box::new(IndexPointStorageReader::open(path)?),
        NodeStorageType::File => Box::new(FilePointStorageReader::open(path)?),
    })
}
