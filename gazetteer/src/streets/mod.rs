//! Streets: aggregation of named highways into per-region street records.

mod geometry;
mod tracing;

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use hashbrown::{HashMap, HashSet};
use serde_json::{Map, Value};

pub use geometry::StreetGeometry;
pub use tracing::{trace_street_regions, PathSegment};

use crate::errors::Result;
use crate::feature::{
    for_each_feature, for_each_feature_parallel, FeatureRecord, FeatureWriter, DEFAULT_LANG,
};
use crate::geometry::Geometry;
use crate::ids::{GeoObjectId, IdType};
use crate::kv::{json_at, write_key_value_line};
use crate::locator::RegionFinder;
use crate::normalize::normalize;

/// One aggregated street inside a region.
pub struct Street {
    /// Merged multilang names; earlier inserts win per language.
    pub names: Vec<(String, String)>,
    /// Composite geometry.
    pub geometry: StreetGeometry,
}

impl Street {
    fn merge_names(&mut self, names: &[(String, String)]) {
        for (lang, name) in names {
            if !self.names.iter().any(|(l, _)| l == lang) {
                self.names.push((lang.clone(), name.clone()));
            }
        }
    }

    fn name_in(&self, lang: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|(l, _)| l == lang)
            .map(|(_, n)| n.as_str())
    }

    fn main_name(&self) -> &str {
        self.name_in(DEFAULT_LANG).unwrap_or("")
    }
}

type RegionStreets = HashMap<String, Street>;

#[derive(Default)]
struct RegionsArena {
    regions: Mutex<HashMap<u64, RegionStreets>>,
}

#[derive(Default)]
struct FeaturesArena {
    street_features: Mutex<HashMap<GeoObjectId, (u64, String)>>,
}

/// Builds streets from the streets features file and geo-object bindings.
///
/// Region-keyed state is sharded into `N^2` arenas hashed by region id and
/// feature-keyed state into `N^2` arenas hashed by feature id, so that any
/// two of the `N` workers rarely contend on one mutex.
pub struct StreetsBuilder<'a> {
    regions_arenas: Vec<RegionsArena>,
    features_arenas: Vec<FeaturesArena>,
    region_finder: &'a RegionFinder,
    threads_count: usize,
    surrogate_counter: AtomicU64,
}

impl<'a> StreetsBuilder<'a> {
    /// Creates a builder over the region finder.
    pub fn new(region_finder: &'a RegionFinder, threads_count: usize) -> Self {
        let threads_count = threads_count.max(1);
        let arenas = threads_count * threads_count;
        Self {
            regions_arenas: (0..arenas).map(|_| RegionsArena::default()).collect(),
            features_arenas: (0..arenas).map(|_| FeaturesArena::default()).collect(),
            region_finder,
            threads_count,
            surrogate_counter: AtomicU64::new(0),
        }
    }

    /// Assembly: feeds every street feature through the region tracing.
    pub fn assemble_streets(&self, streets_features_path: &Path) -> Result<()> {
        for_each_feature_parallel(self.threads_count, streets_features_path, || {
            |feature: FeatureRecord| self.add_street(&feature)
        })
    }

    /// Binding: attaches `addr:street` names of geo-objects to their
    /// owning regions.
    pub fn assemble_bindings(&self, geo_objects_features_path: &Path) -> Result<()> {
        for_each_feature_parallel(self.threads_count, geo_objects_features_path, || {
            |feature: FeatureRecord| {
                let Some(street_name) = feature.street.clone().filter(|s| !s.is_empty()) else {
                    return;
                };
                self.add_street_binding(street_name, &feature);
            }
        })
    }

    fn add_street(&self, feature: &FeatureRecord) {
        match &feature.geom {
            Geometry::Area(_) => self.add_street_area(feature),
            Geometry::Point(_) => self.add_street_point(feature),
            Geometry::Line(points) => self.add_street_highway(feature, points),
        }
    }

    fn add_street_highway(&self, feature: &FeatureRecord, points: &[crate::geometry::Point]) {
        let segments = trace_street_regions(points, |p| {
            self.region_finder
                .find_street_administrator(p, true)
                .map(|hit| hit.id)
        });
        let single = segments.len() == 1;
        for segment in segments {
            let street_id = if single {
                feature.id
            } else {
                self.next_surrogate_id()
            };
            self.insert_street(segment.region_id, feature, |street| {
                street.geometry.add_highway_line(street_id, segment.path);
            });
            self.map_street_feature(feature.id, segment.region_id, feature.name());
        }
    }

    fn add_street_area(&self, feature: &FeatureRecord) {
        let center = feature.geom.bounding_rect().center();
        let Some(hit) = self.region_finder.find_street_administrator(center, true) else {
            return;
        };
        let Geometry::Area(rings) = &feature.geom else {
            return;
        };
        self.insert_street(hit.id, feature, |street| {
            street.geometry.add_highway_area(feature.id, rings.clone());
        });
        self.map_street_feature(feature.id, hit.id, feature.name());
    }

    fn add_street_point(&self, feature: &FeatureRecord) {
        let point = feature.geom.key_point();
        let Some(hit) = self.region_finder.find_street_administrator(point, true) else {
            return;
        };
        self.insert_street(hit.id, feature, |street| {
            street.geometry.set_pin(feature.id, point);
        });
        self.map_street_feature(feature.id, hit.id, feature.name());
    }

    fn add_street_binding(&self, street_name: String, feature: &FeatureRecord) {
        let point = feature.geom.key_point();
        let Some(hit) = self.region_finder.find_street_administrator(point, true) else {
            return;
        };
        let id = self.next_surrogate_id();
        let arena = self.regions_arena(hit.id);
        let mut regions = arena.regions.lock().expect("regions arena poisoned");
        let streets = regions.entry(hit.id).or_default();
        let street = streets.entry(normalize(&street_name)).or_insert_with(|| Street {
            names: vec![(DEFAULT_LANG.to_string(), street_name.clone())],
            geometry: StreetGeometry::default(),
        });
        street.geometry.add_binding(id, point);
    }

    fn insert_street<F: FnOnce(&mut Street)>(
        &self,
        region_id: u64,
        feature: &FeatureRecord,
        update: F,
    ) {
        let arena = self.regions_arena(region_id);
        let mut regions = arena.regions.lock().expect("regions arena poisoned");
        let streets = regions.entry(region_id).or_default();
        let street = streets
            .entry(normalize(feature.name()))
            .or_insert_with(|| Street {
                names: vec![],
                geometry: StreetGeometry::default(),
            });
        street.merge_names(&feature.names);
        update(street);
    }

    fn map_street_feature(&self, feature_id: GeoObjectId, region_id: u64, name: &str) {
        let arena = self.features_arena(feature_id);
        let mut map = arena
            .street_features
            .lock()
            .expect("features arena poisoned");
        map.entry(feature_id)
            .or_insert_with(|| (region_id, normalize(name)));
    }

    fn regions_arena(&self, region_id: u64) -> &RegionsArena {
        let hash = region_id.wrapping_mul(0x9e3779b97f4a7c15);
        &self.regions_arenas[(hash % self.regions_arenas.len() as u64) as usize]
    }

    fn features_arena(&self, feature_id: GeoObjectId) -> &FeaturesArena {
        let hash = feature_id.encoded().wrapping_mul(0x9e3779b97f4a7c15);
        &self.features_arenas[(hash % self.features_arenas.len() as u64) as usize]
    }

    fn next_surrogate_id(&self) -> GeoObjectId {
        let id = self.surrogate_counter.fetch_add(1, Ordering::Relaxed);
        GeoObjectId::new(IdType::Surrogate, id)
    }

    /// Emission: one jsonl record per aggregated street, keyed by the pin.
    pub fn save_streets_kv<W: Write>(&self, out: &mut W) -> Result<u64> {
        let mut written = 0u64;
        for arena in &self.regions_arenas {
            let regions = arena.regions.lock().expect("regions arena poisoned");
            for (region_id, streets) in regions.iter() {
                let Some(region_value) = self.region_finder.storage().find(*region_id) else {
                    log::warn!("street region {region_id:x} has no key-value entry");
                    continue;
                };
                for street in streets.values() {
                    let Some((pin_id, pin)) = street.geometry.get_or_choose_pin() else {
                        continue;
                    };
                    let value = make_street_value(*region_id, region_value, street, pin);
                    write_key_value_line(out, pin_id, &value)?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    /// Rewrites the streets features file so that every record carries
    /// exactly one geometric piece of an aggregated street.
    pub fn regenerate_aggregated_streets(&self, streets_features_path: &Path) -> Result<()> {
        let tmp_path = streets_features_path.with_extension("aggregated.tmp");
        let mut collector = FeatureWriter::create(&tmp_path)?;
        let mut processed: HashSet<(u64, String)> = HashSet::new();

        let mut write_error: Option<crate::errors::GazetteerError> = None;
        for_each_feature(streets_features_path, |feature| {
            if write_error.is_some() {
                return;
            }
            let key = {
                let arena = self.features_arena(feature.id);
                let map = arena
                    .street_features
                    .lock()
                    .expect("features arena poisoned");
                map.get(&feature.id).cloned()
            };
            let Some(key) = key else {
                return;
            };
            if !processed.insert(key.clone()) {
                return;
            }
            let arena = self.regions_arena(key.0);
            let regions = arena.regions.lock().expect("regions arena poisoned");
            let Some(street) = regions.get(&key.0).and_then(|s| s.get(&key.1)) else {
                return;
            };
            if let Err(e) = write_street_pieces(street, &mut collector) {
                write_error = Some(e);
            }
        })?;
        if let Some(e) = write_error {
            return Err(e);
        }
        collector.finish()?;
        std::fs::rename(&tmp_path, streets_features_path)?;
        Ok(())
    }
}

fn write_street_pieces(street: &Street, collector: &mut FeatureWriter) -> Result<()> {
    let Some((pin_id, pin)) = street.geometry.get_or_choose_pin() else {
        return Ok(());
    };
    let base = |geom: Geometry, id: GeoObjectId| FeatureRecord {
        id,
        geom,
        kinds: vec![crate::feature::FeatureKind::Highway],
        names: street.names.clone(),
        street: None,
        house: None,
        region_info: None,
    };
    collector.write(&base(Geometry::Point(pin), pin_id))?;
    for (id, rings) in street.geometry.areas() {
        collector.write(&base(Geometry::Area(rings.clone()), *id))?;
    }
    for (id, path) in street.geometry.lines() {
        collector.write(&base(Geometry::Line(path.clone()), *id))?;
    }
    Ok(())
}

/// The jsonl document of one street: the owning region's locales with the
/// street name layered in, plus the pin and bounding box.
fn make_street_value(
    region_id: u64,
    region_value: &Value,
    street: &Street,
    pin: crate::geometry::Point,
) -> Value {
    let mut locales = Map::new();
    if let Some(region_locales) =
        json_at(region_value, &["properties", "locales"]).and_then(|v| v.as_object())
    {
        for (lang, region_locale) in region_locales {
            let street_name = street
                .name_in(lang)
                .unwrap_or_else(|| street.main_name())
                .to_string();
            if street_name.is_empty() {
                continue;
            }
            let mut address = region_locale
                .get("address")
                .and_then(|a| a.as_object())
                .cloned()
                .unwrap_or_default();
            address.insert("street".to_string(), Value::String(street_name.clone()));
            let mut locale = Map::new();
            locale.insert("name".to_string(), Value::String(street_name));
            locale.insert("address".to_string(), Value::Object(address));
            locales.insert(lang.clone(), Value::Object(locale));
        }
    }

    let bbox = street.geometry.bbox();
    let mut properties = Map::new();
    properties.insert("kind".to_string(), Value::String("street".to_string()));
    properties.insert("locales".to_string(), Value::Object(locales));
    properties.insert(
        "dref".to_string(),
        Value::String(GeoObjectId::from_encoded(region_id).to_hex()),
    );

    let mut object = Map::new();
    object.insert("properties".to_string(), Value::Object(properties));
    object.insert(
        "bbox".to_string(),
        serde_json::json!([bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y]),
    );
    object.insert("pin".to_string(), serde_json::json!([pin.x, pin.y]));
    Value::Object(object)
}
