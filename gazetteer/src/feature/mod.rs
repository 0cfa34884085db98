//! Typed features produced by the second pass.
//!
//! A feature combines resolved geometry with tag classification. Features
//! are written to temporary files as varint-framed bincode records and are
//! never mutated after emission.

mod builder;
mod classify;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use bincode::{Decode, Encode};

pub use builder::FeatureBuilder;
pub use classify::{Classificator, FeatureKind};

use crate::coding::{read_uvarint_at, write_uvarint};
use crate::common::bincode_config;
use crate::errors::Result;
use crate::geometry::Geometry;
use crate::ids::GeoObjectId;

/// The default-locale language code of a feature name.
pub const DEFAULT_LANG: &str = "default";

/// Region-specific attributes collected from boundary tags.
#[derive(Clone, Default, Debug, PartialEq, Decode, Encode)]
pub struct RegionInfo {
    /// `admin_level` tag, if parseable.
    pub admin_level: Option<u8>,
    /// `place` tag value.
    pub place: Option<String>,
    /// `ISO3166-1:alpha2` (or compatible) code.
    pub iso_code: Option<String>,
    /// OSM id of the `label`/`admin_centre` member, if any.
    pub label_osm_id: Option<u64>,
}

/// A classified feature with resolved geometry.
#[derive(Clone, Debug, Decode, Encode)]
pub struct FeatureRecord {
    /// Feature id encoding its OSM origin.
    pub id: GeoObjectId,
    /// Resolved geometry.
    pub geom: Geometry,
    /// Classified kinds, in rule order.
    pub kinds: Vec<FeatureKind>,
    /// Names as `(lang, value)`; lang [`DEFAULT_LANG`] carries the main name.
    pub names: Vec<(String, String)>,
    /// `addr:street` tag.
    pub street: Option<String>,
    /// `addr:housenumber` tag.
    pub house: Option<String>,
    /// Present for administrative boundaries and place features.
    pub region_info: Option<RegionInfo>,
}

impl FeatureRecord {
    /// Main (default-locale) name, empty when unnamed.
    pub fn name(&self) -> &str {
        self.names
            .iter()
            .find(|(lang, _)| lang == DEFAULT_LANG)
            .map(|(_, name)| name.as_str())
            .unwrap_or("")
    }

    /// Name in a specific language.
    pub fn name_in(&self, lang: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|(l, _)| l == lang)
            .map(|(_, name)| name.as_str())
    }

    /// English name, falling back to the main name.
    pub fn international_name(&self) -> &str {
        self.name_in("en").unwrap_or_else(|| self.name())
    }

    /// Checks whether the feature carries a kind.
    pub fn has_kind(&self, kind: FeatureKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Whether the geometry is a point.
    pub fn is_point(&self) -> bool {
        matches!(self.geom, Geometry::Point(_))
    }

    /// Whether the geometry is a line.
    pub fn is_line(&self) -> bool {
        matches!(self.geom, Geometry::Line(_))
    }

    /// Whether the geometry is an area.
    pub fn is_area(&self) -> bool {
        matches!(self.geom, Geometry::Area(_))
    }
}

/// Appends feature records to a temporary features file.
pub struct FeatureWriter {
    out: BufWriter<File>,
}

impl FeatureWriter {
    /// Creates (truncates) the file.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }

    /// Appends one record.
    pub fn write(&mut self, feature: &FeatureRecord) -> Result<()> {
        let encoded = bincode::encode_to_vec(feature, bincode_config())?;
        write_uvarint(&mut self.out, encoded.len() as u64)?;
        self.out.write_all(&encoded)?;
        Ok(())
    }

    /// Appends a pre-serialized frame produced by [`serialize_feature`].
    pub fn write_serialized(&mut self, frame: &[u8]) -> Result<()> {
        self.out.write_all(frame)?;
        Ok(())
    }

    /// Flushes the file.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Serializes one feature into a framed byte buffer.
pub fn serialize_feature(feature: &FeatureRecord) -> Result<Vec<u8>> {
    let encoded = bincode::encode_to_vec(feature, bincode_config())?;
    let mut frame = Vec::with_capacity(encoded.len() + 4);
    write_uvarint(&mut frame, encoded.len() as u64)?;
    frame.extend_from_slice(&encoded);
    Ok(frame)
}

/// Reads a features file sequentially, calling `f` for every record.
pub fn for_each_feature<F: FnMut(FeatureRecord)>(path: &Path, mut f: F) -> Result<()> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let mut pos = 0usize;
    while pos < bytes.len() {
        let len = read_uvarint_at(&bytes, &mut pos)? as usize;
        let frame = bytes.get(pos..pos + len).ok_or_else(|| {
            crate::errors::GazetteerError::invalid_input("features", "truncated record")
        })?;
        pos += len;
        match bincode::decode_from_slice::<FeatureRecord, _>(frame, bincode_config()) {
            Ok((feature, _)) => f(feature),
            Err(e) => log::warn!("skipping corrupt feature record: {e}"),
        }
    }
    Ok(())
}

/// Reads a features file with `threads` workers.
///
/// `make_fn` is called once per worker; records are dealt to workers in
/// chunks over a bounded channel, so ordering across workers is not
/// preserved.
pub fn for_each_feature_parallel<F, M>(threads: usize, path: &Path, make_fn: M) -> Result<()>
where
    F: FnMut(FeatureRecord) + Send,
    M: Fn() -> F,
{
    if threads <= 1 {
        let mut f = make_fn();
        return for_each_feature(path, |feature| f(feature));
    }

    const CHUNK: usize = 256;
    let (tx, rx) = crossbeam_channel::bounded::<Vec<FeatureRecord>>(threads * 2);
    std::thread::scope(|scope| -> Result<()> {
        let mut workers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let rx = rx.clone();
            let mut f = make_fn();
            workers.push(scope.spawn(move || {
                while let Ok(chunk) = rx.recv() {
                    for feature in chunk {
                        f(feature);
                    }
                }
            }));
        }
        drop(rx);

        let mut chunk = Vec::with_capacity(CHUNK);
        let read_result = for_each_feature(path, |feature| {
            chunk.push(feature);
            if chunk.len() == CHUNK {
                let full = std::mem::replace(&mut chunk, Vec::with_capacity(CHUNK));
                let _ = tx.send(full);
            }
        });
        if !chunk.is_empty() {
            let _ = tx.send(chunk);
        }
        drop(tx);
        read_result
    })
}
