use crate::cellindex::{build_covering_index, CoveringIndex, GEO_OBJECTS_DEPTH};
use crate::feature::{FeatureKind, FeatureRecord, FeatureWriter, DEFAULT_LANG};
use crate::geometry::{Geometry, Point};
use crate::ids::GeoObjectId;

fn street_square_feature(id: u64, x0: f64, y0: f64, x1: f64, y1: f64) -> FeatureRecord {
    FeatureRecord {
        id: GeoObjectId::from_way(id),
        geom: Geometry::Area(vec![vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]]),
        kinds: vec![FeatureKind::Highway],
        names: vec![(DEFAULT_LANG.to_string(), format!("street {id}"))],
        street: None,
        house: None,
        region_info: None,
    }
}

#[test]
fn cover_and_query_points() {
    let dir = tempfile::tempdir().unwrap();
    let features_path = dir.path().join("streets.features.tmp");
    let index_path = dir.path().join("objects.locidx");

    let mut writer = FeatureWriter::create(&features_path).unwrap();
    // A street polygon covering the square [0, 1] x [2, 3].
    writer
        .write(&street_square_feature(100, 0.0, 2.0, 1.0, 3.0))
        .unwrap();
    // A distant polygon that must not answer for the first one's points.
    writer
        .write(&street_square_feature(200, 50.0, 50.0, 51.0, 51.0))
        .unwrap();
    writer.finish().unwrap();

    let covered =
        build_covering_index(&features_path, &index_path, GEO_OBJECTS_DEPTH, 2, |_| true)
            .unwrap();
    assert_eq!(covered, 2);

    let index = CoveringIndex::open(&index_path, GEO_OBJECTS_DEPTH).unwrap();
    let street_id = GeoObjectId::from_way(100).encoded();

    for p in [
        Point::new(0.1, 2.5),
        Point::new(0.3, 2.5),
        Point::new(0.2, 2.55),
    ] {
        let mut ids = vec![];
        index.for_each_at_point(p, |id| ids.push(id));
        assert!(ids.contains(&street_id), "point {p:?} missed the street");
    }

    let mut far_ids = vec![];
    index.for_each_at_point(Point::new(50.5, 50.5), |id| far_ids.push(id));
    assert!(far_ids.contains(&GeoObjectId::from_way(200).encoded()));
    assert!(!far_ids.contains(&street_id));
}

#[test]
fn index_is_conservative_superset() {
    // The file round-trip answers exactly like an in-memory covering
    // baseline over a grid of probe points.
    let dir = tempfile::tempdir().unwrap();
    let features_path = dir.path().join("objects.features.tmp");
    let index_path = dir.path().join("objects.locidx");

    let features = vec![
        street_square_feature(1, -10.0, -10.0, 10.0, 10.0),
        street_square_feature(2, 5.0, 5.0, 25.0, 25.0),
        street_square_feature(3, -40.0, 8.0, -30.0, 18.0),
    ];
    let mut writer = FeatureWriter::create(&features_path).unwrap();
    for f in &features {
        writer.write(f).unwrap();
    }
    writer.finish().unwrap();

    build_covering_index(&features_path, &index_path, GEO_OBJECTS_DEPTH, 1, |_| true).unwrap();
    let index = CoveringIndex::open(&index_path, GEO_OBJECTS_DEPTH).unwrap();

    for xi in -5..6 {
        for yi in -5..6 {
            let p = Point::new(xi as f64 * 7.0, yi as f64 * 7.0);
            let mut answered = vec![];
            index.for_each_at_point(p, |id| answered.push(id));
            for f in &features {
                let Geometry::Area(rings) = &f.geom else { unreachable!() };
                if crate::geometry::point_in_rings(p, rings) {
                    assert!(
                        answered.contains(&f.id.encoded()),
                        "index dropped feature {:?} at {p:?}",
                        f.id
                    );
                }
            }
        }
    }
}

#[test]
fn empty_features_build_empty_index() {
    let dir = tempfile::tempdir().unwrap();
    let features_path = dir.path().join("empty.features.tmp");
    let index_path = dir.path().join("empty.locidx");
    FeatureWriter::create(&features_path)
        .unwrap()
        .finish()
        .unwrap();

    build_covering_index(&features_path, &index_path, GEO_OBJECTS_DEPTH, 1, |_| true).unwrap();
    let index = CoveringIndex::open(&index_path, GEO_OBJECTS_DEPTH).unwrap();
    let mut ids = vec![];
    index.for_each_at_point(Point::new(0.0, 0.0), |id| ids.push(id));
    assert!(ids.is_empty());
}
