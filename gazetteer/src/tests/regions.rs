use hashbrown::HashMap;

use crate::feature::{FeatureKind, FeatureRecord, RegionInfo, DEFAULT_LANG};
use crate::geometry::{Geometry, Point};
use crate::ids::GeoObjectId;
use crate::regions::{
    default_specifier_registry, PlaceLevel, PlacePoint, PlaceType, Region, RegionsBuilder,
};

fn area_region(id: u64, name: &str, x0: f64, y0: f64, side: f64, admin_level: u8) -> Region {
    let feature = FeatureRecord {
        id: GeoObjectId::from_relation(id),
        geom: Geometry::Area(vec![vec![
            Point::new(x0, y0),
            Point::new(x0 + side, y0),
            Point::new(x0 + side, y0 + side),
            Point::new(x0, y0 + side),
        ]]),
        kinds: vec![FeatureKind::AdminBoundary],
        names: vec![
            (DEFAULT_LANG.to_string(), name.to_string()),
            ("en".to_string(), name.to_string()),
        ],
        street: None,
        house: None,
        region_info: Some(RegionInfo {
            admin_level: Some(admin_level),
            place: None,
            iso_code: None,
            label_osm_id: None,
        }),
    };
    Region::from_feature(&feature).unwrap()
}

fn builder(regions: Vec<Region>, place_points: Vec<PlacePoint>) -> RegionsBuilder {
    let place_points: HashMap<u64, PlacePoint> =
        place_points.into_iter().map(|p| (p.id, p)).collect();
    RegionsBuilder::new(regions, place_points, default_specifier_registry(), 2)
}

fn city_point(id: u64, name: &str, x: f64, y: f64) -> PlacePoint {
    PlacePoint {
        id,
        name: name.to_string(),
        names: vec![(DEFAULT_LANG.to_string(), name.to_string())],
        place_type: PlaceType::City,
        point: Point::new(x, y),
    }
}

#[test]
fn nested_regions_form_a_chain() {
    let regions = vec![
        area_region(1, "Freedonia", 0.0, 0.0, 20.0, 2),
        area_region(2, "Northland", 1.0, 1.0, 8.0, 4),
        area_region(3, "Lakeshire", 2.0, 2.0, 6.0, 6),
    ];
    let trees = builder(regions, vec![]).build_country("Freedonia");
    assert_eq!(trees.len(), 1);
    let tree = &trees[0];
    assert_eq!(tree.len(), 3);

    let root = tree.node(tree.root());
    assert_eq!(root.region.level, PlaceLevel::Country);
    assert_eq!(root.children.len(), 1);

    let region = tree.node(root.children[0]);
    assert_eq!(region.region.region.name, "Northland");
    assert_eq!(region.region.level, PlaceLevel::Region);
    assert_eq!(region.children.len(), 1);

    let subregion = tree.node(region.children[0]);
    assert_eq!(subregion.region.region.name, "Lakeshire");
    assert_eq!(subregion.region.level, PlaceLevel::Subregion);

    // Ancestors contain their descendants' representative points, and are
    // reliably larger.
    for (index, node) in tree.iter() {
        for (ancestor_index, ancestor) in tree.ancestors(index).skip(1) {
            assert!(ancestor
                .region
                .region
                .contains_point(node.region.region.center()));
            assert!(
                ancestor.region.region.area() > node.region.region.area(),
                "ancestor {ancestor_index} not larger than {index}"
            );
        }
    }
}

#[test]
fn disjoint_region_stays_out_of_the_chain() {
    let regions = vec![
        area_region(1, "Freedonia", 0.0, 0.0, 20.0, 2),
        area_region(2, "Northland", 1.0, 1.0, 8.0, 4),
        area_region(3, "Southland", 1.0, 11.0, 8.0, 4),
    ];
    let trees = builder(regions, vec![]).build_country("Freedonia");
    let tree = &trees[0];
    let root = tree.node(tree.root());
    // Both siblings hang off the country, not off each other.
    assert_eq!(root.children.len(), 2);
}

#[test]
fn place_point_lands_in_smallest_region() {
    let regions = vec![
        area_region(1, "Freedonia", 0.0, 0.0, 20.0, 2),
        area_region(2, "Northland", 1.0, 1.0, 8.0, 4),
    ];
    let trees =
        builder(regions, vec![city_point(50, "Cityville", 5.0, 5.0)]).build_country("Freedonia");
    let tree = &trees[0];
    let cityville = tree
        .iter()
        .find(|(_, n)| n.region.region.name == "Cityville")
        .map(|(i, _)| i)
        .expect("place point attached");
    let node = tree.node(cityville);
    assert_eq!(node.region.level, PlaceLevel::Locality);
    let parent = node.parent.expect("attached under a region");
    assert_eq!(tree.node(parent).region.region.name, "Northland");
}

#[test]
fn regions_kv_feeds_the_geocoder() {
    let regions = vec![
        area_region(1, "Freedonia", 0.0, 0.0, 20.0, 2),
        area_region(2, "Northland", 1.0, 1.0, 8.0, 4),
    ];
    let builder = builder(regions, vec![city_point(50, "Cityville", 5.0, 5.0)]);

    let mut kv = Vec::new();
    let mut seen = hashbrown::HashSet::new();
    builder
        .for_each_country(|_, trees| {
            for tree in trees.iter() {
                crate::regions::write_regions_kv(tree, &mut seen, &mut kv)?;
            }
            Ok(())
        })
        .unwrap();
    let kv = String::from_utf8(kv).unwrap();
    assert_eq!(kv.lines().count(), 3);

    let geocoder = crate::geocoder::Geocoder::from_jsonl_reader(kv.as_bytes(), false, 1).unwrap();
    let results = geocoder.process_query("freedonia northland cityville");
    assert!(!results.is_empty());
    assert_eq!(
        results[0].osm_id,
        GeoObjectId::from_node(50),
        "the locality wins the full-address query"
    );
    assert!((results[0].certainty - 1.0).abs() < 1e-9);
}
