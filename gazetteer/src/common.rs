//! Common settings in Gazetteer.
use bincode::config::{self, Fixint, LittleEndian};

/// Gets the common bincode configuration of serialization.
pub const fn bincode_config() -> config::Configuration<LittleEndian, Fixint> {
    config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// Magic bytes opening the binary token index.
pub const TOKEN_INDEX_MAGIC: &[u8; 8] = b"GZRTOKIX";

/// Format version of the binary token index. A mismatch on load is fatal.
pub const TOKEN_INDEX_FORMAT_VERSION: u32 = 2;

/// Format version of the spatial interval index.
pub const INTERVAL_INDEX_FORMAT_VERSION: u8 = 2;

/// Number of OSM elements in one sharding chunk (see [`crate::osm`]).
pub const OSM_CHUNK_SIZE: u64 = 10_000;

/// Fixed-point scale of intermediate node coordinates: degrees times 1e7.
pub const COORD_SCALE: f64 = 1e7;
