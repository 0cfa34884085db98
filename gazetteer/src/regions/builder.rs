//! Country tree construction: parent selection over overlapping polygons.

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::errors::Result;
use crate::geometry::{overlap_percentage, Rect};
use crate::normalize::is_ascii_numeric;
use crate::regions::specifiers::place_type_level;
use crate::regions::{
    CountrySpecifier, LevelRegion, PlaceLevel, PlacePoint, PlaceType, Region, RegionTree,
    SpecifierRegistry,
};

/// Polygon-simplification drift tolerated by area comparisons, in percent.
const AREA_RELATIVE_ERROR_PERCENT: f64 = 0.1;

/// Builds per-country region trees from the planet's region set.
pub struct RegionsBuilder {
    regions_in_area_order: Vec<Region>,
    countries_outers: Vec<Region>,
    place_points: HashMap<u64, PlacePoint>,
    registry: SpecifierRegistry,
    threads_count: usize,
}

impl RegionsBuilder {
    /// Prepares the builder: binds label place points, orders regions by
    /// area and extracts country outers.
    pub fn new(
        mut regions: Vec<Region>,
        mut place_points: HashMap<u64, PlacePoint>,
        registry: SpecifierRegistry,
        threads_count: usize,
    ) -> Self {
        assert!(threads_count != 0);

        place_points.retain(|_, p| !is_ascii_numeric(&p.name));
        Self::move_label_place_points(&mut place_points, &mut regions);

        regions.sort_by(|l, r| r.area().total_cmp(&l.area()));
        let countries_outers = Self::extract_countries_outers(&mut regions);

        Self {
            regions_in_area_order: regions,
            countries_outers,
            place_points,
            registry,
            threads_count,
        }
    }

    fn move_label_place_points(
        place_points: &mut HashMap<u64, PlacePoint>,
        regions: &mut [Region],
    ) {
        for region in regions.iter_mut() {
            let Some(label_id) = region.label_osm_id else {
                continue;
            };
            let Some(label) = place_points.get(&label_id) else {
                continue;
            };
            // A country label on a non-country boundary is an anomaly:
            // drop the binding, retain the region.
            if label.place_type == PlaceType::Country && region.admin_level != Some(2) {
                continue;
            }
            region.label = Some(label.clone());
        }
        for region in regions.iter() {
            if let Some(label) = &region.label {
                place_points.remove(&label.id);
            }
        }
    }

    fn extract_countries_outers(regions: &mut Vec<Region>) -> Vec<Region> {
        let is_country = |region: &Region| {
            region.place_type == PlaceType::Country
                || (region.admin_level == Some(2) && region.place_type == PlaceType::Unknown)
        };
        let outers = regions.iter().filter(|r| is_country(r)).cloned().collect();
        regions.retain(|r| !is_country(r));
        outers
    }

    /// The extracted country outers.
    pub fn countries_outers(&self) -> &[Region] {
        &self.countries_outers
    }

    fn country_international_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for outer in &self.countries_outers {
            let name = outer.international_name().to_string();
            if !name.is_empty() && seen.insert(name.clone()) {
                names.push(name);
            }
        }
        names.sort_unstable();
        names
    }

    /// Builds every country on its own worker and hands the finished trees
    /// to `f` in deterministic (name) order.
    pub fn for_each_country<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &mut [RegionTree]) -> Result<()>,
    {
        let names = self.country_international_names();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads_count)
            .build()
            .map_err(|e| {
                crate::errors::GazetteerError::invalid_input("threads_count", e.to_string())
            })?;
        let mut built: Vec<(String, Vec<RegionTree>)> = pool.install(|| {
            names
                .par_iter()
                .map(|name| (name.clone(), self.build_country(name)))
                .collect()
        });
        for (name, trees) in &mut built {
            f(name, trees)?;
        }
        Ok(())
    }

    /// Builds the trees of one country.
    pub fn build_country(&self, country_name: &str) -> Vec<RegionTree> {
        let specifier = self.registry.for_country(country_name);

        let mut outers: Vec<Region> = self
            .countries_outers
            .iter()
            .filter(|outer| outer.international_name() == country_name)
            .cloned()
            .collect();
        specifier.rectify_boundary(&mut outers, &self.regions_in_area_order);

        let country_code: Option<String> = outers
            .iter()
            .find_map(|o| o.iso_code.as_deref())
            .map(|code| sovereign_iso_code(code).to_string());

        let mut trees: Vec<RegionTree> = outers
            .into_iter()
            .map(|outer| {
                self.build_country_region_tree(outer, country_code.as_deref(), specifier)
            })
            .collect();

        for tree in &mut trees {
            self.integrate_place_points(tree, specifier);
        }

        specifier.adjust_regions_level(&mut trees);
        trees
    }

    fn build_country_region_tree(
        &self,
        outer: Region,
        country_code: Option<&str>,
        specifier: &dyn CountrySpecifier,
    ) -> RegionTree {
        let mut tree = RegionTree::new(LevelRegion {
            level: PlaceLevel::Country,
            region: outer,
        });

        for region in &self.regions_in_area_order {
            if !tree.node(tree.root()).region.region.contains_rect(region) {
                continue;
            }
            if let (Some(iso), Some(code)) = (region.iso_code.as_deref(), country_code) {
                if sovereign_iso_code(iso) != code {
                    continue;
                }
            }
            let level = if is_ascii_numeric(&region.name) {
                PlaceLevel::Unknown
            } else {
                region
                    .label
                    .as_ref()
                    .map(|label| place_type_level(label.place_type))
                    .filter(|level| *level != PlaceLevel::Unknown)
                    .unwrap_or_else(|| specifier.level(region))
            };
            tree.add_node(LevelRegion {
                level,
                region: region.clone(),
            });
        }

        // Smallest first: each node looks for the closest containing
        // ancestor among the larger ones.
        for i in (1..tree.len()).rev() {
            if let Some(parent) = self.choose_parent(&tree, i, specifier) {
                tree.attach(parent, i);
            }
        }
        tree
    }

    fn choose_parent(
        &self,
        tree: &RegionTree,
        for_index: usize,
        specifier: &dyn CountrySpecifier,
    ) -> Option<usize> {
        let region = &tree.node(for_index).region;

        // Candidates with area within the error band of |region| come first,
        // then strictly larger ones up to the root.
        let mut start = for_index;
        while start + 1 < tree.len()
            && !is_area_less_rely(&tree.node(start + 1).region.region, &region.region)
        {
            start += 1;
        }

        let mut parent: Option<usize> = None;
        let mut j = start + 1;
        while j > 0 {
            j -= 1;
            if j == for_index {
                continue;
            }
            let candidate = &tree.node(j).region;
            if let Some(p) = parent {
                if is_area_less_rely(&tree.node(p).region.region, &candidate.region) {
                    break;
                }
            }
            if !candidate.region.contains_rect(&region.region)
                && !candidate.region.contains_point(region.region.center())
            {
                continue;
            }
            if compare_affiliation(candidate, region, specifier) == 1 {
                if let Some(p) = parent {
                    if compare_affiliation(candidate, &tree.node(p).region, specifier) >= 0 {
                        continue;
                    }
                }
                parent = Some(j);
            }
        }
        parent
    }

    fn integrate_place_points(&self, tree: &mut RegionTree, _specifier: &dyn CountrySpecifier) {
        let mut points: Vec<&PlacePoint> = self.place_points.values().collect();
        points.sort_by_key(|p| p.id);

        let mut attachments: Vec<(usize, PlacePoint)> = Vec::new();
        for point in points {
            if !tree
                .node(tree.root())
                .region
                .region
                .contains_point(point.point)
            {
                continue;
            }
            let level = place_type_level(point.place_type);
            if level == PlaceLevel::Unknown {
                continue;
            }
            // The smallest attached region containing the point hosts it,
            // unless an equally named region already represents the place.
            let mut host: Option<usize> = None;
            for (index, node) in tree.iter() {
                if index != tree.root() && node.parent.is_none() {
                    continue;
                }
                if node.region.region.name == point.name {
                    host = None;
                    break;
                }
                if node.region.region.contains_point(point.point) {
                    let better = match host {
                        Some(h) => {
                            node.region.region.area() < tree.node(h).region.region.area()
                        }
                        None => true,
                    };
                    if better {
                        host = Some(index);
                    }
                }
            }
            if let Some(host) = host {
                attachments.push((host, point.clone()));
            }
        }
        for (host, point) in attachments {
            let node = tree.add_node(LevelRegion {
                level: place_type_level(point.place_type),
                region: region_from_place_point(&point),
            });
            tree.attach(host, node);
        }
    }
}

fn region_from_place_point(point: &PlacePoint) -> Region {
    let mut rect = Rect::empty();
    rect.add(point.point);
    Region {
        id: crate::ids::GeoObjectId::from_node(point.id),
        name: point.name.clone(),
        names: point.names.clone(),
        admin_level: None,
        place_type: point.place_type,
        iso_code: None,
        label_osm_id: None,
        label: None,
        rings: vec![],
        area: 0.0,
        rect,
    }
}

/// `l` is reliably smaller than `r`, beyond simplification drift.
fn is_area_less_rely(l: &Region, r: &Region) -> bool {
    let ratio = 1.0 + AREA_RELATIVE_ERROR_PERCENT / 100.0;
    ratio * l.area() < r.area()
}

/// The containment-and-overlap relation: `1` puts `r` under `l`, `-1` puts
/// `l` under `r`, `0` leaves them unrelated.
pub fn compare_affiliation(
    l: &LevelRegion,
    r: &LevelRegion,
    specifier: &dyn CountrySpecifier,
) -> i32 {
    if is_area_less_rely(&r.region, &l.region) && l.region.contains_region(&r.region) {
        return 1;
    }
    if is_area_less_rely(&l.region, &r.region) && r.region.contains_region(&l.region) {
        return -1;
    }

    if overlap_percentage(&l.region.rings, &r.region.rings) < 50.0 {
        return 0;
    }

    let l_area = l.region.area();
    let r_area = r.region.area();
    if 0.5 * l_area > r_area {
        log::debug!(
            "region {:?} contains partly {:?}",
            l.region.id,
            r.region.id
        );
        return 1;
    }
    if 0.5 * r_area > l_area {
        log::debug!(
            "region {:?} contains partly {:?}",
            r.region.id,
            l.region.id
        );
        return -1;
    }

    specifier.relate_by_weight(l, r)
}

/// Maps a dependency's ISO code to its sovereign's code, so that overseas
/// territories do not leak into another country's tree. Codes outside the
/// dependency table stand for themselves.
pub fn sovereign_iso_code(iso: &str) -> &str {
    match iso {
        "AX" => "FI",
        "AS" | "GU" | "PR" | "UM" | "VI" => "US",
        "AI" | "BM" | "IO" | "KY" | "FK" | "GI" | "MS" | "PN" | "SH" | "GS" | "TC" | "VG" => "GB",
        "AW" | "BQ" | "SX" => "NL",
        "BV" | "SJ" => "NO",
        "CX" | "CC" | "HM" | "NF" => "AU",
        "CK" | "CW" | "NU" | "TK" => "NZ",
        "GF" | "PF" | "TF" | "GP" | "MQ" | "YT" | "NC" | "RE" | "BL" | "MF" | "PM" | "WF" => "FR",
        "GL" => "DK",
        "HK" | "MO" => "CN",
        other => other,
    }
}
