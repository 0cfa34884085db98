//! Reverse lookup of the region owning a point.
//!
//! Combines the regions covering index (candidate superset), the region
//! polygons (exact containment) and the regions key-value store (address
//! predicates). Shared read-only by the streets and geo-objects stages.

use std::path::Path;

use hashbrown::HashMap;
use serde_json::Value;

use crate::cellindex::{CoveringIndex, REGIONS_DEPTH};
use crate::errors::Result;
use crate::feature::for_each_feature;
use crate::geometry::{point_in_rings, Geometry, Point};
use crate::kv::{json_at, KeyValueStorage};

/// A region key-value hit.
pub struct RegionHit<'a> {
    /// Encoded region id.
    pub id: u64,
    /// The region's jsonl document.
    pub value: &'a Value,
}

/// Point-to-region resolver.
pub struct RegionFinder {
    index: CoveringIndex,
    geometries: HashMap<u64, (f64, Vec<Vec<Point>>)>,
    storage: KeyValueStorage,
}

impl RegionFinder {
    /// Loads the covering index, region polygons and key-value store.
    pub fn open(
        regions_index_path: &Path,
        regions_features_path: &Path,
        regions_kv_path: &Path,
    ) -> Result<Self> {
        let index = CoveringIndex::open(regions_index_path, REGIONS_DEPTH)?;
        let mut geometries = HashMap::new();
        for_each_feature(regions_features_path, |feature| {
            if let Geometry::Area(rings) = &feature.geom {
                geometries.insert(
                    feature.id.encoded(),
                    (feature.geom.area(), rings.clone()),
                );
            }
        })?;
        let storage = KeyValueStorage::open(regions_kv_path, |_, _| true)?;
        Ok(Self {
            index,
            geometries,
            storage,
        })
    }

    /// Finds the deepest (smallest-area) region containing `point` whose
    /// key-value document satisfies `pred`.
    pub fn find<P>(&self, point: Point, pred: P) -> Option<RegionHit<'_>>
    where
        P: Fn(&Value) -> bool,
    {
        let mut best: Option<(f64, u64, &Value)> = None;
        self.index.for_each_at_point(point, |id| {
            let Some((area, rings)) = self.geometries.get(&id) else {
                return;
            };
            if !point_in_rings(point, rings) {
                return;
            }
            let Some(value) = self.storage.find(id) else {
                return;
            };
            if !pred(value) {
                return;
            }
            let better = match &best {
                Some((best_area, _, _)) => area < best_area,
                None => true,
            };
            if better {
                best = Some((*area, id, value));
            }
        });
        best.map(|(_, id, value)| RegionHit { id, value })
    }

    /// The region whose address makes it a street administrator: it has a
    /// `locality` (when `need_locality`) and neither `suburb` nor
    /// `sublocality`.
    pub fn find_street_administrator(
        &self,
        point: Point,
        need_locality: bool,
    ) -> Option<RegionHit<'_>> {
        self.find(point, |value| {
            let Some(address) =
                json_at(value, &["properties", "locales", "default", "address"])
            else {
                return false;
            };
            if address.get("suburb").is_some() || address.get("sublocality").is_some() {
                return false;
            }
            !need_locality || address.get("locality").is_some()
        })
    }

    /// Direct access to the region documents.
    pub fn storage(&self) -> &KeyValueStorage {
        &self.storage
    }
}
