//! Spatial interval index over space-filling-curve cell ranges.
//!
//! Feature geometries are covered by quadtree cells; `(cell id, feature id)`
//! pairs are sorted and serialized as a tiered interval index that answers
//! "which features may contain this point" with a conservative superset.

mod builder;
mod cell;
mod covering;
mod reader;

use std::path::Path;

pub use builder::IntervalIndexBuilder;
pub use cell::CellId;
pub use covering::{cover_geometry, CellCover};
pub use reader::IntervalIndex;

use rayon::prelude::*;

use crate::errors::Result;
use crate::feature::FeatureRecord;
use crate::geometry::Point;

/// Covering depth for region polygons.
pub const REGIONS_DEPTH: u32 = 6;

/// Covering depth for geo-object geometries.
pub const GEO_OBJECTS_DEPTH: u32 = 8;

/// A `(cell id, feature id)` pair produced by the covering step.
pub type CellValuePair = (u64, u64);

/// Covers a batch of features, returning unsorted pairs.
pub fn cover_features(features: &[FeatureRecord], depth: u32) -> Vec<CellValuePair> {
    features
        .par_iter()
        .flat_map_iter(|feature| {
            let cover = CellCover::new(depth);
            cover_geometry(&feature.geom, &cover)
                .into_iter()
                .map(move |cell| (cell.to_int64(depth), feature.id.encoded()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Builds a covering index file over features passing `filter`.
///
/// `threads_count` controls the parallel block sort; it is always required.
pub fn build_covering_index<F>(
    features_path: &Path,
    out_path: &Path,
    depth: u32,
    threads_count: usize,
    filter: F,
) -> Result<u64>
where
    F: Fn(&FeatureRecord) -> bool,
{
    let mut features = Vec::new();
    crate::feature::for_each_feature(features_path, |feature| {
        if filter(&feature) {
            features.push(feature);
        }
    })?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads_count.max(1))
        .build()
        .map_err(|e| crate::errors::GazetteerError::invalid_input("threads_count", e.to_string()))?;
    let mut pairs = pool.install(|| {
        let mut pairs = cover_features(&features, depth);
        pairs.par_sort_unstable();
        pairs
    });
    pairs.dedup();

    let covered = features.len() as u64;
    let mut out = std::io::BufWriter::new(std::fs::File::create(out_path)?);
    IntervalIndexBuilder::new(2 * depth, 1, 8)?.build(&mut out, &pairs)?;
    log::info!(
        "covering index {}: {} features, {} cell-value pairs",
        out_path.display(),
        covered,
        pairs.len()
    );
    Ok(covered)
}

/// A loaded covering index answering point queries.
pub struct CoveringIndex {
    index: IntervalIndex,
    depth: u32,
}

impl CoveringIndex {
    /// Loads an index file. A version mismatch is fatal.
    pub fn open(path: &Path, depth: u32) -> Result<Self> {
        Ok(Self {
            index: IntervalIndex::open(path)?,
            depth,
        })
    }

    /// Calls `f` with the encoded id of every candidate feature at `p`.
    ///
    /// The result is a superset of the features actually containing the
    /// point; callers filter with an exact geometry test.
    pub fn for_each_at_point<F: FnMut(u64)>(&self, p: Point, mut f: F) {
        let cover = CellCover::new(self.depth);
        let leaf = cover.leaf_cell(p);
        for cell in leaf.ancestors_and_self() {
            self.index.for_each_at_key(cell.to_int64(self.depth), &mut f);
        }
    }
}
