use std::io::Write;
use std::path::PathBuf;

use crate::cellindex::{build_covering_index, REGIONS_DEPTH};
use crate::feature::{FeatureKind, FeatureRecord, FeatureWriter, DEFAULT_LANG};
use crate::geometry::{Geometry, Point};
use crate::ids::{GeoObjectId, IdType};
use crate::locator::RegionFinder;
use crate::streets::StreetsBuilder;

const REGION_ID: u64 = 0xc000000000000a01;

struct Fixture {
    _dir: tempfile::TempDir,
    regions_index: PathBuf,
    regions_features: PathBuf,
    regions_kv: PathBuf,
    streets_features: PathBuf,
    geo_objects_features: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();

    let regions_features = dir.path().join("regions.features.tmp");
    let mut writer = FeatureWriter::create(&regions_features).unwrap();
    writer
        .write(&FeatureRecord {
            id: GeoObjectId::from_encoded(REGION_ID),
            geom: Geometry::Area(vec![vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ]]),
            kinds: vec![FeatureKind::AdminBoundary],
            names: vec![(DEFAULT_LANG.to_string(), "Testville".to_string())],
            street: None,
            house: None,
            region_info: None,
        })
        .unwrap();
    writer.finish().unwrap();

    let regions_kv = dir.path().join("regions.jsonl");
    {
        let mut out = std::fs::File::create(&regions_kv).unwrap();
        writeln!(
            out,
            "{} {}",
            GeoObjectId::from_encoded(REGION_ID).to_hex(),
            concat!(
                "{\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
                "{\"name\": \"Testville\", \"address\": {\"locality\": \"Testville\", ",
                "\"country\": \"Freedonia\"}}}}}",
            )
        )
        .unwrap();
    }

    let regions_index = dir.path().join("regions.locidx");
    build_covering_index(&regions_features, &regions_index, REGIONS_DEPTH, 1, |_| true).unwrap();

    let streets_features = dir.path().join("streets.features.tmp");
    let mut writer = FeatureWriter::create(&streets_features).unwrap();
    writer
        .write(&FeatureRecord {
            id: GeoObjectId::from_way(77),
            geom: Geometry::Line(vec![
                Point::new(1.0, 5.0),
                Point::new(3.0, 5.0),
                Point::new(5.0, 5.0),
            ]),
            kinds: vec![FeatureKind::Highway],
            names: vec![(DEFAULT_LANG.to_string(), "Main Street".to_string())],
            street: None,
            house: None,
            region_info: None,
        })
        .unwrap();
    writer.finish().unwrap();

    let geo_objects_features = dir.path().join("geo_objects.features.tmp");
    let mut writer = FeatureWriter::create(&geo_objects_features).unwrap();
    writer
        .write(&FeatureRecord {
            id: GeoObjectId::from_node(500),
            geom: Geometry::Point(Point::new(2.0, 5.1)),
            kinds: vec![FeatureKind::Building],
            names: vec![],
            street: Some("Main Street".to_string()),
            house: Some("5".to_string()),
            region_info: None,
        })
        .unwrap();
    writer.finish().unwrap();

    Fixture {
        _dir: dir,
        regions_index,
        regions_features,
        regions_kv,
        streets_features,
        geo_objects_features,
    }
}

#[test]
fn streets_kv_carries_the_region_address() {
    let f = fixture();
    let finder = RegionFinder::open(&f.regions_index, &f.regions_features, &f.regions_kv).unwrap();
    let builder = StreetsBuilder::new(&finder, 2);
    builder.assemble_streets(&f.streets_features).unwrap();
    builder.assemble_bindings(&f.geo_objects_features).unwrap();

    let mut kv = Vec::new();
    let written = builder.save_streets_kv(&mut kv).unwrap();
    assert_eq!(written, 1);

    let kv = String::from_utf8(kv).unwrap();
    let (id, json) = crate::kv::parse_key_value_line(kv.lines().next().unwrap()).unwrap();
    // The whole way stays one segment, so the pin keeps the way id.
    assert_eq!(id, GeoObjectId::from_way(77));

    let value: serde_json::Value = serde_json::from_str(json).unwrap();
    assert_eq!(
        crate::kv::json_str_at(&value, &["properties", "kind"]),
        Some("street")
    );
    assert_eq!(
        crate::kv::json_str_at(
            &value,
            &["properties", "locales", "default", "address", "street"],
        ),
        Some("Main Street")
    );
    assert_eq!(
        crate::kv::json_str_at(
            &value,
            &["properties", "locales", "default", "address", "locality"],
        ),
        Some("Testville")
    );
    assert_eq!(
        crate::kv::json_str_at(&value, &["properties", "dref"]),
        Some(GeoObjectId::from_encoded(REGION_ID).to_hex().as_str())
    );
    assert!(value.get("pin").is_some());
    assert!(value.get("bbox").is_some());
}

#[test]
fn aggregated_streets_rewrite_emits_pieces() {
    let f = fixture();
    let finder = RegionFinder::open(&f.regions_index, &f.regions_features, &f.regions_kv).unwrap();
    let builder = StreetsBuilder::new(&finder, 1);
    builder.assemble_streets(&f.streets_features).unwrap();
    builder.regenerate_aggregated_streets(&f.streets_features).unwrap();

    let mut pieces = vec![];
    crate::feature::for_each_feature(&f.streets_features, |piece| pieces.push(piece)).unwrap();
    // One pin plus one line segment, both named after the street.
    assert_eq!(pieces.len(), 2);
    assert!(pieces.iter().any(|p| p.is_point()));
    assert!(pieces.iter().any(|p| p.is_line()));
    for piece in &pieces {
        assert_eq!(piece.name(), "Main Street");
        assert_eq!(piece.id, GeoObjectId::from_way(77));
    }
}

#[test]
fn street_outside_any_region_is_dropped() {
    let f = fixture();
    let finder = RegionFinder::open(&f.regions_index, &f.regions_features, &f.regions_kv).unwrap();
    let builder = StreetsBuilder::new(&finder, 1);

    let dir = tempfile::tempdir().unwrap();
    let lost_path = dir.path().join("lost.features.tmp");
    let mut writer = FeatureWriter::create(&lost_path).unwrap();
    writer
        .write(&FeatureRecord {
            id: GeoObjectId::from_way(88),
            geom: Geometry::Line(vec![Point::new(40.0, 40.0), Point::new(41.0, 40.0)]),
            kinds: vec![FeatureKind::Highway],
            names: vec![(DEFAULT_LANG.to_string(), "Nowhere Street".to_string())],
            street: None,
            house: None,
            region_info: None,
        })
        .unwrap();
    writer.finish().unwrap();

    builder.assemble_streets(&lost_path).unwrap();
    let mut kv = Vec::new();
    assert_eq!(builder.save_streets_kv(&mut kv).unwrap(), 0);
}

#[test]
fn surrogate_ids_reserve_their_own_type() {
    let id = GeoObjectId::new(IdType::Surrogate, 3);
    assert_eq!(id.id_type(), IdType::Surrogate);
    assert_ne!(id, GeoObjectId::from_way(3));
}
