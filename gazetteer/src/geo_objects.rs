//! Geo-objects key-value generation.
//!
//! Buildings and features with house numbers get the owning region's
//! locales plus their street and house fields. Addressless POIs inherit
//! the address of the building at their point, found through an in-memory
//! covering index; the rest are reported in the ids-without-addresses file.

use std::io::Write;
use std::path::Path;

use hashbrown::{HashMap, HashSet};
use serde_json::{Map, Value};

use crate::cellindex::{cover_features, IntervalIndex, IntervalIndexBuilder, GEO_OBJECTS_DEPTH};
use crate::errors::Result;
use crate::feature::{for_each_feature, FeatureKind, FeatureRecord};
use crate::geometry::{point_in_rings, Geometry};
use crate::ids::GeoObjectId;
use crate::kv::{json_at, write_key_value_line};
use crate::locator::RegionFinder;

/// Countries allowed to keep addressless buildings; `*` allows all.
pub struct AddresslessAllowlist {
    all: bool,
    countries: HashSet<String>,
}

impl AddresslessAllowlist {
    /// Parses the comma-separated `--allow_addressless_for_countries` flag.
    pub fn from_flag(flag: &str) -> Self {
        let flag = flag.trim();
        Self {
            all: flag == "*" || flag.is_empty(),
            countries: flag.split(',').map(|s| s.trim().to_string()).collect(),
        }
    }

    fn allows(&self, country: Option<&str>) -> bool {
        self.all || country.is_some_and(|c| self.countries.contains(c))
    }
}

/// Per-stage counters, logged at the end.
#[derive(Default, Debug)]
pub struct GeoObjectsStats {
    /// Buildings and housed features written.
    pub buildings: u64,
    /// POIs that inherited a building address.
    pub pois_enriched: u64,
    /// Features dropped for having no resolvable region.
    pub no_region: u64,
    /// Ids written to the addressless report.
    pub addressless: u64,
}

struct BuildingRecord {
    id: GeoObjectId,
    value: Value,
    point: crate::geometry::Point,
    rings: Vec<Vec<crate::geometry::Point>>,
}

/// Runs the stage. `nodes_list` filters which POIs are considered; `None`
/// disables POI enrichment entirely.
pub fn generate_geo_objects_kv<W: Write, A: Write>(
    finder: &RegionFinder,
    geo_objects_features_path: &Path,
    kv_out: &mut W,
    addressless_out: Option<&mut A>,
    allowlist: &AddresslessAllowlist,
    nodes_list: Option<&HashSet<u64>>,
) -> Result<GeoObjectsStats> {
    let mut stats = GeoObjectsStats::default();
    let mut buildings: Vec<BuildingRecord> = Vec::new();
    let mut pois: Vec<FeatureRecord> = Vec::new();

    let mut write_error: Option<crate::errors::GazetteerError> = None;
    for_each_feature(geo_objects_features_path, |feature| {
        if write_error.is_some() {
            return;
        }
        let is_addressed = feature.has_kind(FeatureKind::Building)
            || feature.house.as_deref().is_some_and(|h| !h.is_empty());
        if !is_addressed {
            if feature.has_kind(FeatureKind::Poi) {
                pois.push(feature);
            }
            return;
        }

        let point = feature.geom.key_point();
        let Some(hit) = finder.find(point, |_| true) else {
            stats.no_region += 1;
            return;
        };
        let country = crate::kv::json_str_at(
            hit.value,
            &["properties", "locales", "default", "address", "country"],
        );
        let has_house = feature.house.as_deref().is_some_and(|h| !h.is_empty());
        if !has_house && !allowlist.allows(country) {
            return;
        }

        let value = building_value(&feature, hit.value);
        if let Err(e) = write_key_value_line(kv_out, feature.id, &value) {
            write_error = Some(e);
            return;
        }
        stats.buildings += 1;
        let rings = match &feature.geom {
            Geometry::Area(rings) => rings.clone(),
            _ => vec![],
        };
        buildings.push(BuildingRecord {
            id: feature.id,
            value,
            point,
            rings,
        });
    })?;
    if let Some(e) = write_error {
        return Err(e);
    }

    let mut without_address: Vec<GeoObjectId> = Vec::new();
    if let Some(nodes_list) = nodes_list {
        let index = build_buildings_index(&buildings)?;
        let by_id: HashMap<u64, &BuildingRecord> =
            buildings.iter().map(|b| (b.id.encoded(), b)).collect();
        for poi in &pois {
            if !nodes_list.contains(&poi.id.encoded()) {
                continue;
            }
            let point = poi.geom.key_point();
            let mut host: Option<&BuildingRecord> = None;
            index.for_each_at_point(point, |id| {
                if host.is_some() {
                    return;
                }
                if let Some(building) = by_id.get(&id) {
                    if building.rings.is_empty() || point_in_rings(point, &building.rings) {
                        host = Some(building);
                    }
                }
            });
            match host {
                Some(building) => {
                    let value = poi_value(poi, &building.value);
                    write_key_value_line(kv_out, poi.id, &value)?;
                    stats.pois_enriched += 1;
                }
                None => without_address.push(poi.id),
            }
        }
    }

    if let Some(out) = addressless_out {
        for id in &without_address {
            writeln!(out, "{}", id.to_hex())?;
        }
        stats.addressless = without_address.len() as u64;
    }

    log::info!(
        "geo objects: {} buildings, {} enriched POIs, {} without region, {} addressless",
        stats.buildings,
        stats.pois_enriched,
        stats.no_region,
        stats.addressless
    );
    Ok(stats)
}

struct BuildingsIndex {
    index: IntervalIndex,
}

impl BuildingsIndex {
    fn for_each_at_point<F: FnMut(u64)>(&self, p: crate::geometry::Point, mut f: F) {
        let cover = crate::cellindex::CellCover::new(GEO_OBJECTS_DEPTH);
        let leaf = cover.leaf_cell(p);
        for cell in leaf.ancestors_and_self() {
            self.index
                .for_each_at_key(cell.to_int64(GEO_OBJECTS_DEPTH), &mut f);
        }
    }
}

fn build_buildings_index(buildings: &[BuildingRecord]) -> Result<BuildingsIndex> {
    let features: Vec<FeatureRecord> = buildings
        .iter()
        .map(|b| FeatureRecord {
            id: b.id,
            geom: if b.rings.is_empty() {
                Geometry::Point(b.point)
            } else {
                Geometry::Area(b.rings.clone())
            },
            kinds: vec![FeatureKind::Building],
            names: vec![],
            street: None,
            house: None,
            region_info: None,
        })
        .collect();
    let mut pairs = cover_features(&features, GEO_OBJECTS_DEPTH);
    pairs.sort_unstable();
    pairs.dedup();
    let mut bytes = Vec::new();
    IntervalIndexBuilder::new(2 * GEO_OBJECTS_DEPTH, 1, 8)?.build(&mut bytes, &pairs)?;
    Ok(BuildingsIndex {
        index: IntervalIndex::from_bytes(bytes)?,
    })
}

/// Region locales enriched with the building's street and house number.
fn building_value(feature: &FeatureRecord, region_value: &Value) -> Value {
    let mut locales = Map::new();
    if let Some(region_locales) =
        json_at(region_value, &["properties", "locales"]).and_then(|v| v.as_object())
    {
        for (lang, region_locale) in region_locales {
            let mut address = region_locale
                .get("address")
                .and_then(|a| a.as_object())
                .cloned()
                .unwrap_or_default();
            if let Some(street) = feature.street.as_deref().filter(|s| !s.is_empty()) {
                address.insert("street".to_string(), Value::String(street.to_string()));
            }
            if let Some(house) = feature.house.as_deref().filter(|h| !h.is_empty()) {
                address.insert("building".to_string(), Value::String(house.to_string()));
            }
            let mut locale = Map::new();
            let name = feature
                .name_in(lang)
                .unwrap_or_else(|| feature.name());
            if !name.is_empty() {
                locale.insert("name".to_string(), Value::String(name.to_string()));
            }
            locale.insert("address".to_string(), Value::Object(address));
            locales.insert(lang.clone(), Value::Object(locale));
        }
    }

    let mut properties = Map::new();
    properties.insert("kind".to_string(), Value::String("building".to_string()));
    properties.insert("locales".to_string(), Value::Object(locales));
    serde_json::json!({ "properties": Value::Object(properties) })
}

/// A POI reuses its host building's document with its own name.
fn poi_value(poi: &FeatureRecord, building_value: &Value) -> Value {
    let mut value = building_value.clone();
    if let Some(locales) = value
        .get_mut("properties")
        .and_then(|p| p.get_mut("locales"))
        .and_then(|l| l.as_object_mut())
    {
        for (lang, locale) in locales.iter_mut() {
            let name = poi.name_in(lang).unwrap_or_else(|| poi.name());
            if !name.is_empty() {
                if let Some(locale) = locale.as_object_mut() {
                    locale.insert("name".to_string(), Value::String(name.to_string()));
                }
            }
        }
    }
    value
}
