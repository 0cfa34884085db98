//! Per-country behavior of the region resolver.
//!
//! A specifier canonicalizes admin levels and place types into generic
//! place levels, breaks geometric ties, and may rewrite a country's outer
//! boundary. Country-specific rules plug into the registry without touching
//! the core resolver.

use crate::geometry::Point;
use crate::regions::{LevelRegion, PlaceLevel, PlaceType, Region, RegionTree};

/// Hooks a country can override.
pub trait CountrySpecifier: Send + Sync {
    /// Rewrites the country's outer polygons, e.g. to excise disputed
    /// enclaves. `planet` is the full area-ordered region list.
    fn rectify_boundary(&self, _outers: &mut Vec<Region>, _planet: &[Region]) {}

    /// Post-hoc level reassignment over the finished trees.
    fn adjust_regions_level(&self, _trees: &mut [RegionTree]) {}

    /// Tiebreaker when geometry is inconclusive: `-1` puts `l` under `r`,
    /// `1` puts `r` under `l`, `0` leaves them unrelated.
    fn relate_by_weight(&self, l: &LevelRegion, r: &LevelRegion) -> i32 {
        let lw = level_weight(l.level);
        let rw = level_weight(r.level);
        if lw > rw {
            1
        } else if lw < rw {
            -1
        } else {
            0
        }
    }

    /// Canonicalizes admin level into a generic level when the place type
    /// does not decide it.
    fn specific_country_level(&self, region: &Region) -> PlaceLevel {
        match region.admin_level {
            Some(2) => PlaceLevel::Country,
            Some(3) | Some(4) => PlaceLevel::Region,
            Some(5) | Some(6) => PlaceLevel::Subregion,
            Some(7) | Some(8) => PlaceLevel::Locality,
            Some(9) | Some(10) => PlaceLevel::Suburb,
            Some(11) | Some(12) => PlaceLevel::Sublocality,
            _ => PlaceLevel::Unknown,
        }
    }

    /// The resolved level of a region: by declared place type first,
    /// falling back to [`Self::specific_country_level`].
    fn level(&self, region: &Region) -> PlaceLevel {
        match place_type_level(region.place_type) {
            PlaceLevel::Unknown => self.specific_country_level(region),
            level => level,
        }
    }
}

/// Level of a declared place type; `Unknown` defers to admin levels.
pub fn place_type_level(place_type: PlaceType) -> PlaceLevel {
    match place_type {
        PlaceType::Country => PlaceLevel::Country,
        PlaceType::State | PlaceType::Province => PlaceLevel::Region,
        PlaceType::District | PlaceType::County | PlaceType::Municipality => {
            PlaceLevel::Subregion
        }
        PlaceType::City
        | PlaceType::Town
        | PlaceType::Village
        | PlaceType::Hamlet
        | PlaceType::IsolatedDwelling => PlaceLevel::Locality,
        PlaceType::Suburb | PlaceType::Quarter => PlaceLevel::Suburb,
        PlaceType::Neighbourhood => PlaceLevel::Sublocality,
        PlaceType::Unknown => PlaceLevel::Unknown,
    }
}

fn level_weight(level: PlaceLevel) -> i32 {
    match level {
        PlaceLevel::Country => 6,
        PlaceLevel::Region => 5,
        PlaceLevel::Subregion => 4,
        PlaceLevel::Locality => 3,
        PlaceLevel::Suburb => 2,
        PlaceLevel::Sublocality => 1,
        PlaceLevel::Unknown => 0,
    }
}

struct DefaultSpecifier;

impl CountrySpecifier for DefaultSpecifier {}

/// Ukraine: oblasts map to Region, raions to Subregion, city districts to
/// Sublocality; Crimea and Sevastopol are excised from the outer per the
/// disputed-boundary policy.
struct UkraineSpecifier;

const CRIMEA_LABEL: Point = Point::new(34.7401104, 45.1890034);
const SEVASTOPOL_LABEL: Point = Point::new(33.4720239, 44.5547288);

impl UkraineSpecifier {
    fn find_correcting_region<'a>(
        planet: &'a [Region],
        names: &[&str],
        covered_point: Point,
    ) -> Option<&'a Region> {
        planet.iter().find(|region| {
            region.admin_level.is_some()
                && region.iso_code.as_deref() == Some("RU")
                && names.contains(&region.name.as_str())
                && region.contains_point(covered_point)
        })
    }

    fn exclude_region_area(outers: &mut [Region], excised: &Region) {
        // Rings fully inside the excised polygon leave the outer.
        for outer in outers.iter_mut() {
            outer
                .rings
                .retain(|ring| !ring.iter().all(|p| excised.contains_point(*p)));
        }
    }
}

impl CountrySpecifier for UkraineSpecifier {
    fn rectify_boundary(&self, outers: &mut Vec<Region>, planet: &[Region]) {
        match Self::find_correcting_region(planet, &["Республика Крым", "Крым"], CRIMEA_LABEL) {
            Some(region) => Self::exclude_region_area(outers, region),
            None => log::warn!("failed to fix region1 for Ukraine"),
        }
        match Self::find_correcting_region(planet, &["Севастополь"], SEVASTOPOL_LABEL) {
            Some(region) => Self::exclude_region_area(outers, region),
            None => log::warn!("failed to fix region2 for Ukraine"),
        }
    }

    fn specific_country_level(&self, region: &Region) -> PlaceLevel {
        match region.admin_level {
            Some(4) => PlaceLevel::Region,      // oblasts
            Some(6) => PlaceLevel::Subregion,   // raions
            Some(7) => PlaceLevel::Sublocality, // city districts
            _ => PlaceLevel::Unknown,
        }
    }
}

/// Maps country names to specifiers, with a shared default.
pub struct SpecifierRegistry {
    specifiers: Vec<(&'static str, Box<dyn CountrySpecifier>)>,
    default: Box<dyn CountrySpecifier>,
}

impl SpecifierRegistry {
    /// Gets the specifier for a country by international name.
    pub fn for_country(&self, name: &str) -> &dyn CountrySpecifier {
        self.specifiers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| s.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}

/// The built-in registry.
pub fn default_specifier_registry() -> SpecifierRegistry {
    SpecifierRegistry {
        specifiers: vec![("Ukraine", Box::new(UkraineSpecifier))],
        default: Box::new(DefaultSpecifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::ids::GeoObjectId;

    fn region(admin_level: Option<u8>, place: PlaceType) -> Region {
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let feature = crate::feature::FeatureRecord {
            id: GeoObjectId::from_relation(1),
            geom: crate::geometry::Geometry::Area(vec![ring]),
            kinds: vec![crate::feature::FeatureKind::AdminBoundary],
            names: vec![("default".to_string(), "R".to_string())],
            street: None,
            house: None,
            region_info: Some(crate::feature::RegionInfo {
                admin_level,
                place: Some(place.as_str().to_string()),
                iso_code: None,
                label_osm_id: None,
            }),
        };
        Region::from_feature(&feature).unwrap()
    }

    #[test]
    fn test_default_levels() {
        let registry = default_specifier_registry();
        let spec = registry.for_country("Atlantis");
        assert_eq!(spec.level(&region(Some(2), PlaceType::Unknown)), PlaceLevel::Country);
        assert_eq!(spec.level(&region(Some(6), PlaceType::Unknown)), PlaceLevel::Subregion);
        assert_eq!(spec.level(&region(Some(6), PlaceType::City)), PlaceLevel::Locality);
        assert_eq!(spec.level(&region(None, PlaceType::Unknown)), PlaceLevel::Unknown);
    }

    #[test]
    fn test_ukraine_levels() {
        let registry = default_specifier_registry();
        let spec = registry.for_country("Ukraine");
        assert_eq!(spec.level(&region(Some(4), PlaceType::Unknown)), PlaceLevel::Region);
        assert_eq!(spec.level(&region(Some(6), PlaceType::Unknown)), PlaceLevel::Subregion);
        assert_eq!(
            spec.level(&region(Some(7), PlaceType::Unknown)),
            PlaceLevel::Sublocality
        );
        assert_eq!(spec.level(&region(Some(8), PlaceType::Unknown)), PlaceLevel::Unknown);
    }
}
