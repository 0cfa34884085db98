//! Region hierarchy resolution.
//!
//! The regions translator output is reassembled here into per-country trees
//! of nested administrative regions, each assigned a place level, and
//! serialized as the regions key-value file.

mod builder;
mod kv;
mod specifiers;
mod tree;

use std::io::Write;
use std::path::Path;

pub use builder::RegionsBuilder;
pub use kv::write_regions_kv;
pub use specifiers::{default_specifier_registry, CountrySpecifier, SpecifierRegistry};
pub use tree::{RegionTree, TreeNode};

use hashbrown::HashMap;

use crate::errors::Result;
use crate::feature::{for_each_feature, FeatureKind, FeatureRecord};
use crate::geometry::{point_in_rings, Geometry, Point, Rect};
use crate::ids::GeoObjectId;

/// Place classification of a region or place point.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PlaceType {
    /// Unclassified.
    Unknown,
    /// A sovereign country.
    Country,
    /// First-level subdivision.
    State,
    /// First-level subdivision (alternative naming).
    Province,
    /// Second-level subdivision.
    District,
    /// Second-level subdivision (alternative naming).
    County,
    /// Second-level subdivision (alternative naming).
    Municipality,
    /// A large populated place.
    City,
    /// A mid-size populated place.
    Town,
    /// A small populated place.
    Village,
    /// A tiny populated place.
    Hamlet,
    /// A few houses standing alone.
    IsolatedDwelling,
    /// A part of a locality.
    Suburb,
    /// A part of a suburb.
    Quarter,
    /// A small named part of a locality.
    Neighbourhood,
}

impl PlaceType {
    /// Parses the OSM `place` tag value.
    pub fn from_tag(value: &str) -> Self {
        match value {
            "country" => Self::Country,
            "state" | "region" => Self::State,
            "province" => Self::Province,
            "district" => Self::District,
            "county" => Self::County,
            "municipality" => Self::Municipality,
            "city" => Self::City,
            "town" => Self::Town,
            "village" => Self::Village,
            "hamlet" => Self::Hamlet,
            "isolated_dwelling" => Self::IsolatedDwelling,
            "suburb" => Self::Suburb,
            "quarter" => Self::Quarter,
            "neighbourhood" => Self::Neighbourhood,
            _ => Self::Unknown,
        }
    }

    /// The tag-style name, used as the `kind` key-value property.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Country => "country",
            Self::State => "state",
            Self::Province => "province",
            Self::District => "district",
            Self::County => "county",
            Self::Municipality => "municipality",
            Self::City => "city",
            Self::Town => "town",
            Self::Village => "village",
            Self::Hamlet => "hamlet",
            Self::IsolatedDwelling => "isolated_dwelling",
            Self::Suburb => "suburb",
            Self::Quarter => "quarter",
            Self::Neighbourhood => "neighbourhood",
        }
    }
}

/// Generic level of a region inside a country tree.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum PlaceLevel {
    /// Country outer.
    Country,
    /// First-level subdivision.
    Region,
    /// Second-level subdivision.
    Subregion,
    /// A populated place.
    Locality,
    /// A part of a locality.
    Suburb,
    /// A part of a suburb.
    Sublocality,
    /// Not placeable.
    Unknown,
}

impl PlaceLevel {
    /// Address-slot name in key-value records.
    pub fn address_key(self) -> Option<&'static str> {
        match self {
            Self::Country => Some("country"),
            Self::Region => Some("region"),
            Self::Subregion => Some("subregion"),
            Self::Locality => Some("locality"),
            Self::Suburb => Some("suburb"),
            Self::Sublocality => Some("sublocality"),
            Self::Unknown => None,
        }
    }
}

/// A place node that can label a region or extend a tree.
#[derive(Clone, Debug)]
pub struct PlacePoint {
    /// OSM node id.
    pub id: u64,
    /// Default-locale name.
    pub name: String,
    /// All names as `(lang, value)`.
    pub names: Vec<(String, String)>,
    /// Classified place type.
    pub place_type: PlaceType,
    /// Position.
    pub point: Point,
}

/// An administrative region with derived geometry attributes.
#[derive(Clone, Debug)]
pub struct Region {
    /// Feature id.
    pub id: GeoObjectId,
    /// Default-locale name.
    pub name: String,
    /// All names as `(lang, value)`.
    pub names: Vec<(String, String)>,
    /// `admin_level` value, if known.
    pub admin_level: Option<u8>,
    /// Declared place type.
    pub place_type: PlaceType,
    /// ISO 3166 code of the region itself.
    pub iso_code: Option<String>,
    /// OSM id of the declared label place point.
    pub label_osm_id: Option<u64>,
    /// The bound label place point.
    pub label: Option<PlacePoint>,
    /// Outer polygon rings.
    pub rings: Vec<Vec<Point>>,
    area: f64,
    rect: Rect,
}

impl Region {
    /// Builds a region from an area feature.
    pub fn from_feature(feature: &FeatureRecord) -> Option<Self> {
        let Geometry::Area(rings) = &feature.geom else {
            return None;
        };
        let info = feature.region_info.clone().unwrap_or_default();
        let area = feature.geom.area();
        let rect = feature.geom.bounding_rect();
        Some(Self {
            id: feature.id,
            name: feature.name().to_string(),
            names: feature.names.clone(),
            admin_level: info.admin_level,
            place_type: info
                .place
                .as_deref()
                .map(PlaceType::from_tag)
                .unwrap_or(PlaceType::Unknown),
            iso_code: info.iso_code,
            label_osm_id: info.label_osm_id,
            label: None,
            rings: rings.clone(),
            area,
            rect,
        })
    }

    /// Polygon area.
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Bounding rectangle.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Center of the bounding rectangle.
    pub fn center(&self) -> Point {
        self.rect.center()
    }

    /// English name falling back to the default name; country trees are
    /// grouped by this.
    pub fn international_name(&self) -> &str {
        self.names
            .iter()
            .find(|(lang, _)| lang == "en" || lang == "int")
            .map(|(_, name)| name.as_str())
            .unwrap_or(&self.name)
    }

    /// Checks whether the bounding rectangle contains the other region's.
    pub fn contains_rect(&self, other: &Region) -> bool {
        self.rect.contains_rect(&other.rect)
    }

    /// Point-in-polygon test.
    pub fn contains_point(&self, p: Point) -> bool {
        point_in_rings(p, &self.rings)
    }

    /// Polygon containment: every sampled vertex of `other` lies inside.
    pub fn contains_region(&self, other: &Region) -> bool {
        if !self.rect.contains_rect(&other.rect) && !self.contains_point(other.center()) {
            return false;
        }
        other.rings.iter().flatten().all(|p| self.contains_point(*p))
    }
}

/// A region annotated with its resolved level.
#[derive(Clone, Debug)]
pub struct LevelRegion {
    /// Resolved level.
    pub level: PlaceLevel,
    /// The region.
    pub region: Region,
}

/// Regions and place points loaded from a regions features file.
pub struct RegionsInput {
    /// Area regions.
    pub regions: Vec<Region>,
    /// Place points keyed by OSM node id.
    pub place_points: HashMap<u64, PlacePoint>,
}

/// Loads the regions translator output.
pub fn load_regions_input(features_path: &Path) -> Result<RegionsInput> {
    let mut regions = Vec::new();
    let mut place_points = HashMap::new();
    for_each_feature(features_path, |feature| {
        if feature.is_area() && feature.has_kind(FeatureKind::AdminBoundary) {
            if let Some(region) = Region::from_feature(&feature) {
                regions.push(region);
            }
            return;
        }
        if let (Geometry::Point(point), Some(info)) = (&feature.geom, &feature.region_info) {
            let place_type = info
                .place
                .as_deref()
                .map(PlaceType::from_tag)
                .unwrap_or(PlaceType::Unknown);
            if place_type == PlaceType::Unknown {
                return;
            }
            place_points.insert(
                feature.id.serial(),
                PlacePoint {
                    id: feature.id.serial(),
                    name: feature.name().to_string(),
                    names: feature.names.clone(),
                    place_type,
                    point: *point,
                },
            );
        }
    })?;
    Ok(RegionsInput {
        regions,
        place_points,
    })
}

/// Builds all country trees and writes the regions key-value file.
pub fn generate_regions_kv<W: Write>(
    features_path: &Path,
    out: &mut W,
    data_version: &str,
    threads_count: usize,
) -> Result<u64> {
    let input = load_regions_input(features_path)?;
    log::info!(
        "loaded {} regions and {} place points",
        input.regions.len(),
        input.place_points.len()
    );
    let builder = RegionsBuilder::new(
        input.regions,
        input.place_points,
        default_specifier_registry(),
        threads_count,
    );
    writeln!(out, "version {data_version}")?;
    let mut written = 0u64;
    let mut seen = hashbrown::HashSet::new();
    builder.for_each_country(|name, trees| {
        log::info!("building region tree for {name}");
        for tree in trees {
            written += write_regions_kv(tree, &mut seen, out)?;
        }
        Ok(())
    })?;
    log::info!("regions key-value entries written: {written}");
    Ok(written)
}
