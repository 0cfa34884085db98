//! Builds feature records from OSM elements and the intermediate cache.

use crate::cache::IntermediateDataReader;
use crate::feature::{Classificator, FeatureKind, FeatureRecord, RegionInfo, DEFAULT_LANG};
use crate::geometry::{Geometry, Point};
use crate::ids::GeoObjectId;
use crate::osm::{EntityType, OsmElement};

/// Resolves element geometry through the cache and attaches classification.
pub struct FeatureBuilder<'a> {
    cache: &'a IntermediateDataReader,
    classificator: &'a Classificator,
}

impl<'a> FeatureBuilder<'a> {
    /// Creates a builder over the second-pass cache.
    pub fn new(cache: &'a IntermediateDataReader, classificator: &'a Classificator) -> Self {
        Self {
            cache,
            classificator,
        }
    }

    /// Builds a feature, or `None` when classification is empty or the
    /// geometry cannot be resolved (missing nodes are non-fatal).
    pub fn make(&self, element: &OsmElement) -> Option<FeatureRecord> {
        let kinds = self.classificator.classify(&element.tags);
        if kinds.is_empty() {
            return None;
        }

        let (id, geom) = match element.entity_type {
            EntityType::Node => (
                GeoObjectId::from_node(element.id),
                Geometry::Point(Point::new(element.lon, element.lat)),
            ),
            EntityType::Way => {
                let geom = self.resolve_way_geometry(element, &kinds)?;
                (GeoObjectId::from_way(element.id), geom)
            }
            EntityType::Relation => {
                let geom = self.resolve_relation_geometry(element)?;
                (GeoObjectId::from_relation(element.id), geom)
            }
            EntityType::Unknown => return None,
        };

        if geom.is_degenerate() {
            log::debug!("degenerate geometry for element {}", element.id);
            return None;
        }

        Some(FeatureRecord {
            id,
            geom,
            kinds,
            names: collect_names(element),
            street: element.tag_value("addr:street").map(str::to_string),
            house: element.tag_value("addr:housenumber").map(str::to_string),
            region_info: collect_region_info(element, self.cache),
        })
    }

    fn resolve_way_geometry(
        &self,
        element: &OsmElement,
        kinds: &[FeatureKind],
    ) -> Option<Geometry> {
        let points = self.resolve_points(element.id, &element.nodes)?;
        if points.len() < 2 {
            return None;
        }
        let closed = element.nodes.first() == element.nodes.last();
        let areal = kinds.iter().any(|k| {
            matches!(
                k,
                FeatureKind::AdminBoundary | FeatureKind::Building | FeatureKind::Square
            )
        });
        if closed && areal && points.len() >= 4 {
            let mut ring = points;
            ring.pop();
            Some(Geometry::Area(vec![ring]))
        } else {
            Some(Geometry::Line(points))
        }
    }

    fn resolve_relation_geometry(&self, element: &OsmElement) -> Option<Geometry> {
        let mut segments = Vec::new();
        for member in &element.members {
            if member.entity_type != EntityType::Way {
                continue;
            }
            if !(member.role.is_empty() || member.role == "outer") {
                continue;
            }
            let Some(way) = self.cache.way(member.reference) else {
                log::warn!(
                    "relation {}: member way {} is not cached, skipping member",
                    element.id,
                    member.reference
                );
                continue;
            };
            if let Some(points) = self.resolve_points(member.reference, &way.nodes) {
                if points.len() >= 2 {
                    segments.push(points);
                }
            }
        }
        let rings = assemble_rings(segments);
        if rings.is_empty() {
            return None;
        }
        Some(Geometry::Area(rings))
    }

    fn resolve_points(&self, owner_id: u64, node_ids: &[u64]) -> Option<Vec<Point>> {
        let mut points = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            match self.cache.node(*node_id) {
                Some((lat, lon)) => points.push(Point::new(lon, lat)),
                None => {
                    log::warn!("way {owner_id}: node {node_id} is not cached, skipping way");
                    return None;
                }
            }
        }
        Some(points)
    }
}

fn collect_names(element: &OsmElement) -> Vec<(String, String)> {
    let mut names = Vec::new();
    for tag in &element.tags {
        if tag.key == "name" && !tag.value.is_empty() {
            names.push((DEFAULT_LANG.to_string(), tag.value.clone()));
        } else if let Some(lang) = tag.key.strip_prefix("name:") {
            if !lang.is_empty() && !tag.value.is_empty() {
                names.push((lang.to_string(), tag.value.clone()));
            }
        } else if tag.key == "int_name" && !tag.value.is_empty() {
            names.push(("int".to_string(), tag.value.clone()));
        }
    }
    names
}

fn collect_region_info(
    element: &OsmElement,
    cache: &IntermediateDataReader,
) -> Option<RegionInfo> {
    let boundary = element.has_tag_value("boundary", "administrative");
    let place = element.tag_value("place");
    if !boundary && place.is_none() {
        return None;
    }

    let mut label_osm_id = None;
    for member in &element.members {
        if member.entity_type == EntityType::Node
            && (member.role == "label" || member.role == "admin_centre")
        {
            label_osm_id = Some(member.reference);
            break;
        }
    }
    // Ways inherit label members from their boundary relations.
    if label_osm_id.is_none() && element.entity_type == EntityType::Way {
        cache.for_each_relation_of_way(element.id, |_, relation| {
            if label_osm_id.is_none() && relation.tag_value("type") == Some("boundary") {
                label_osm_id = relation
                    .nodes
                    .iter()
                    .find(|(_, role)| role == "label" || role == "admin_centre")
                    .map(|(id, _)| *id);
            }
        });
    }

    Some(RegionInfo {
        admin_level: element.tag_value("admin_level").and_then(|v| v.parse().ok()),
        place: place.map(str::to_string),
        iso_code: element
            .tag_value("ISO3166-1:alpha2")
            .or_else(|| element.tag_value("ISO3166-1"))
            .or_else(|| element.tag_value("ISO3166-2"))
            .map(|s| s.split('-').next().unwrap_or(s).to_string()),
        label_osm_id,
    })
}

/// Joins way segments end-to-end into closed rings. Unclosable chains are
/// kept as open rings so containment tests still see their vertices.
fn assemble_rings(mut segments: Vec<Vec<Point>>) -> Vec<Vec<Point>> {
    let mut rings = Vec::new();
    while let Some(mut current) = segments.pop() {
        loop {
            if current.len() >= 3 && points_eq(current[0], current[current.len() - 1]) {
                current.pop();
                break;
            }
            let tail = current[current.len() - 1];
            let next = segments.iter().position(|s| {
                points_eq(s[0], tail) || points_eq(s[s.len() - 1], tail)
            });
            match next {
                Some(i) => {
                    let mut segment = segments.swap_remove(i);
                    if points_eq(segment[segment.len() - 1], tail) {
                        segment.reverse();
                    }
                    current.extend_from_slice(&segment[1..]);
                }
                None => break,
            }
        }
        if current.len() >= 3 {
            rings.push(current);
        }
    }
    rings
}

fn points_eq(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
}
