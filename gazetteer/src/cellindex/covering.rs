//! Covering geometries with quadtree cells.

use crate::cellindex::CellId;
use crate::geometry::{point_in_rings, segments_intersect, Geometry, Point};

/// Area saved by a subdivision must exceed one leaf cell, otherwise the
/// parent cell is kept.
const CELL_PENALTY_AREA: f64 = 1.0;

/// Subtrees are handed to the worker pool above this remaining depth.
const PARALLEL_BELOW_LEVEL: u32 = 2;

/// Result of intersecting an object with one cell.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum CellObjectIntersection {
    /// No intersection.
    None,
    /// Cell and object partially overlap.
    Intersect,
    /// The cell lies fully inside the object.
    CellInsideObject,
    /// The object lies fully inside the cell.
    ObjectInsideCell,
}

/// Maps world coordinates to the covering grid of a fixed depth.
///
/// The grid has `2^(depth-1)` leaf cells per side over the lon/lat
/// rectangle; all intersection tests run in grid units where a leaf side
/// is 1.
#[derive(Clone, Copy)]
pub struct CellCover {
    depth: u32,
}

impl CellCover {
    /// Creates a mapping for the given depth.
    pub fn new(depth: u32) -> Self {
        assert!((2..=16).contains(&depth));
        Self { depth }
    }

    /// Covering depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn side(&self) -> f64 {
        f64::from(1u32 << (self.depth - 1))
    }

    /// World point to grid coordinates.
    pub fn to_grid(&self, p: Point) -> Point {
        let n = self.side();
        Point::new(
            ((p.x + 180.0) / 360.0).clamp(0.0, 1.0) * n,
            ((p.y + 90.0) / 180.0).clamp(0.0, 1.0) * n,
        )
    }

    /// The leaf cell containing a world point.
    pub fn leaf_cell(&self, p: Point) -> CellId {
        let g = self.to_grid(p);
        let max_index = (1u32 << (self.depth - 1)) - 1;
        let x = (g.x.floor() as u32).min(max_index);
        let y = (g.y.floor() as u32).min(max_index);
        CellId::from_xy(x, y, self.depth - 1)
    }

    /// Grid rectangle of a cell as `(min, max)`.
    fn cell_rect(&self, cell: CellId) -> (Point, Point) {
        let side = f64::from(1u32 << (self.depth - 1 - cell.level()));
        let (x, y) = cell.xy();
        let min = Point::new(f64::from(x) * side, f64::from(y) * side);
        (min, Point::new(min.x + side, min.y + side))
    }

    fn cell_area(&self, cell: CellId) -> f64 {
        let side = f64::from(1u32 << (self.depth - 1 - cell.level()));
        side * side
    }
}

fn rect_corners(min: Point, max: Point) -> [Point; 4] {
    [
        min,
        Point::new(max.x, min.y),
        max,
        Point::new(min.x, max.y),
    ]
}

fn point_in_rect(p: Point, min: Point, max: Point) -> bool {
    p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
}

fn segment_intersects_rect(a: Point, b: Point, min: Point, max: Point) -> bool {
    if point_in_rect(a, min, max) || point_in_rect(b, min, max) {
        return true;
    }
    let corners = rect_corners(min, max);
    (0..4).any(|i| segments_intersect(a, b, corners[i], corners[(i + 1) % 4]))
}

/// Classifies a polyline against a cell.
fn intersect_cell_with_polyline(
    cover: &CellCover,
    cell: CellId,
    points: &[Point],
) -> CellObjectIntersection {
    let (min, max) = cover.cell_rect(cell);
    let mut any_inside = false;
    let mut all_inside = true;
    for p in points {
        if point_in_rect(*p, min, max) {
            any_inside = true;
        } else {
            all_inside = false;
        }
    }
    if all_inside {
        return CellObjectIntersection::ObjectInsideCell;
    }
    if any_inside {
        return CellObjectIntersection::Intersect;
    }
    for seg in points.windows(2) {
        if segment_intersects_rect(seg[0], seg[1], min, max) {
            return CellObjectIntersection::Intersect;
        }
    }
    CellObjectIntersection::None
}

/// Classifies a polygon set against a cell.
fn intersect_cell_with_rings(
    cover: &CellCover,
    cell: CellId,
    rings: &[Vec<Point>],
) -> CellObjectIntersection {
    let (min, max) = cover.cell_rect(cell);
    let corners = rect_corners(min, max);

    for ring in rings {
        for i in 0..ring.len() {
            let a = ring[i];
            let b = ring[(i + 1) % ring.len()];
            for c in 0..4 {
                if segments_intersect(a, b, corners[c], corners[(c + 1) % 4]) {
                    return CellObjectIntersection::Intersect;
                }
            }
        }
    }

    // No edge crossings: containment is decided by single point tests.
    if corners.iter().all(|c| point_in_rings(*c, rings)) {
        return CellObjectIntersection::CellInsideObject;
    }
    if rings
        .iter()
        .flatten()
        .next()
        .is_some_and(|p| point_in_rect(*p, min, max))
    {
        return CellObjectIntersection::ObjectInsideCell;
    }
    let center = Point::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);
    if point_in_rings(center, rings) {
        return CellObjectIntersection::Intersect;
    }
    CellObjectIntersection::None
}

/// Covers a geometry, returning a small conservative cell set.
pub fn cover_geometry(geom: &Geometry, cover: &CellCover) -> Vec<CellId> {
    match geom {
        Geometry::Point(p) => vec![cover.leaf_cell(*p)],
        Geometry::Line(points) => {
            let grid: Vec<Point> = points.iter().map(|p| cover.to_grid(*p)).collect();
            let mut out = Vec::new();
            cover_object(
                &|cell| intersect_cell_with_polyline(cover, cell, &grid),
                cover,
                CellId::root(),
                &mut out,
            );
            out
        }
        Geometry::Area(rings) => {
            let grid: Vec<Vec<Point>> = rings
                .iter()
                .map(|ring| ring.iter().map(|p| cover.to_grid(*p)).collect())
                .collect();
            let mut out = Vec::new();
            cover_object(
                &|cell| intersect_cell_with_rings(cover, cell, &grid),
                cover,
                CellId::root(),
                &mut out,
            );
            out
        }
    }
}

/// Recursive covering with the cell-penalty heuristic. Shallow sibling
/// subtrees run on the worker pool.
fn cover_object<F>(intersect: &F, cover: &CellCover, cell: CellId, out: &mut Vec<CellId>)
where
    F: Fn(CellId) -> CellObjectIntersection + Sync,
{
    let cell_area = cover.cell_area(cell);
    match intersect(cell) {
        CellObjectIntersection::None => return,
        CellObjectIntersection::CellInsideObject => {
            out.push(cell);
            return;
        }
        _ if CELL_PENALTY_AREA >= cell_area => {
            out.push(cell);
            return;
        }
        _ => {}
    }

    if cell.level() == cover.depth() - 1 {
        out.push(cell);
        return;
    }

    let mut subdiv = Vec::new();
    if cell.level() < PARALLEL_BELOW_LEVEL && cover.depth() > 4 {
        let mut parts: [Vec<CellId>; 4] = Default::default();
        let [p0, p1, p2, p3] = &mut parts;
        rayon::join(
            || {
                cover_object(intersect, cover, cell.child(0), p0);
                cover_object(intersect, cover, cell.child(1), p1);
            },
            || {
                cover_object(intersect, cover, cell.child(2), p2);
                cover_object(intersect, cover, cell.child(3), p3);
            },
        );
        for part in parts {
            subdiv.extend(part);
        }
    } else {
        for i in 0..4 {
            cover_object(intersect, cover, cell.child(i), &mut subdiv);
        }
    }

    if subdiv.is_empty() {
        return;
    }

    let subdiv_area: f64 = subdiv.iter().map(|c| cover.cell_area(*c)).sum();
    // Subdivide only when it saves more than the cell penalty.
    if subdiv.len() > 1 && CELL_PENALTY_AREA >= cell_area - subdiv_area {
        out.push(cell);
    } else {
        out.extend(subdiv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn square_area(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Area(vec![vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]])
    }

    #[test]
    fn test_point_cover_is_leaf() {
        let cover = CellCover::new(8);
        let cells = cover_geometry(&Geometry::Point(Point::new(0.1, 2.5)), &cover);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].level(), 7);
    }

    #[test]
    fn test_area_cover_contains_inner_points() {
        let cover = CellCover::new(8);
        let geom = square_area(0.0, 2.0, 1.0, 3.0);
        let cells = cover_geometry(&geom, &cover);
        assert!(!cells.is_empty());

        for p in [
            Point::new(0.1, 2.5),
            Point::new(0.3, 2.5),
            Point::new(0.2, 2.55),
        ] {
            let leaf = cover.leaf_cell(p);
            let covered = cells.iter().any(|c| {
                leaf.ancestors_and_self().contains(c)
            });
            assert!(covered, "point {p:?} not covered");
        }

        let outside = cover.leaf_cell(Point::new(5.0, 5.0));
        // The 1x1-degree square at depth 8 is smaller than a leaf cell, so
        // the covering may keep the shared leaf; a point two cells away
        // must not be covered.
        let covered = cells
            .iter()
            .any(|c| outside.ancestors_and_self().contains(c));
        assert!(!covered || outside == cover.leaf_cell(Point::new(0.5, 2.5)));
    }

    #[test]
    fn test_wide_area_cover_is_small() {
        let cover = CellCover::new(6);
        let geom = square_area(-179.0, -89.0, 179.0, 89.0);
        let cells = cover_geometry(&geom, &cover);
        assert!(!cells.is_empty());
        // The covering stays far below the exhaustive leaf count.
        assert!(cells.len() < 256, "covering too large: {}", cells.len());
        let leaf = cover.leaf_cell(Point::new(0.0, 0.0));
        assert!(cells
            .iter()
            .any(|c| leaf.ancestors_and_self().contains(c)));
    }

    #[test]
    fn test_line_cover() {
        let cover = CellCover::new(8);
        let geom = Geometry::Line(vec![Point::new(-10.0, 0.0), Point::new(10.0, 0.0)]);
        let cells = cover_geometry(&geom, &cover);
        assert!(!cells.is_empty());
        let leaf = cover.leaf_cell(Point::new(0.0, 0.0));
        assert!(cells
            .iter()
            .any(|c| leaf.ancestors_and_self().contains(c)));
    }
}
