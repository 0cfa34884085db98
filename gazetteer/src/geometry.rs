//! Planar geometry primitives for containment tests and coverings.
//!
//! Coordinates are WGS84 degrees with `x = lon`, `y = lat`. Only the
//! operations needed by the region resolver and the spatial index live here;
//! rendering-grade geometry is out of scope.

use bincode::{Decode, Encode};

/// A point in degrees, `x = lon`, `y = lat`.
#[derive(Clone, Copy, Default, PartialEq, Debug, Decode, Encode)]
pub struct Point {
    /// Longitude in degrees.
    pub x: f64,
    /// Latitude in degrees.
    pub y: f64,
}

impl Point {
    /// Creates a point from longitude and latitude.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned bounding rectangle.
#[derive(Clone, Copy, Debug, Decode, Encode)]
pub struct Rect {
    /// Lower-left corner.
    pub min: Point,
    /// Upper-right corner.
    pub max: Point,
}

impl Rect {
    /// An empty rectangle that extends when points are added.
    pub fn empty() -> Self {
        Self {
            min: Point::new(f64::MAX, f64::MAX),
            max: Point::new(f64::MIN, f64::MIN),
        }
    }

    /// Returns true if no point was ever added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Extends the rectangle to cover `p`.
    pub fn add(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Builds the bounding rectangle of a point sequence.
    pub fn from_points<'a, I: IntoIterator<Item = &'a Point>>(points: I) -> Self {
        let mut rect = Self::empty();
        for p in points {
            rect.add(*p);
        }
        rect
    }

    /// Checks whether `p` lies inside or on the border.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Checks whether `other` lies fully inside.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        !other.is_empty()
            && self.contains_point(other.min)
            && self.contains_point(other.max)
    }

    /// Center of the rectangle.
    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }
}

/// Feature geometry: a point, a polyline, or a polygon set of outer rings.
#[derive(Clone, Debug, Decode, Encode)]
pub enum Geometry {
    /// A single point.
    Point(Point),
    /// An open polyline with at least two points.
    Line(Vec<Point>),
    /// One or more outer rings. Rings are implicitly closed.
    Area(Vec<Vec<Point>>),
}

impl Geometry {
    /// Returns the bounding rectangle.
    pub fn bounding_rect(&self) -> Rect {
        match self {
            Self::Point(p) => Rect::from_points([p]),
            Self::Line(points) => Rect::from_points(points),
            Self::Area(rings) => {
                let mut rect = Rect::empty();
                for ring in rings {
                    for p in ring {
                        rect.add(*p);
                    }
                }
                rect
            }
        }
    }

    /// A representative point: the point itself, a middle vertex of a line,
    /// or the first vertex of the first ring.
    pub fn key_point(&self) -> Point {
        match self {
            Self::Point(p) => *p,
            Self::Line(points) => points[points.len() / 2],
            Self::Area(rings) => rings[0][0],
        }
    }

    /// Total area of the rings; zero for points and lines.
    pub fn area(&self) -> f64 {
        match self {
            Self::Area(rings) => rings.iter().map(|r| ring_area(r)).sum(),
            _ => 0.0,
        }
    }

    /// Whether the geometry is degenerate (too few vertices or zero area).
    pub fn is_degenerate(&self) -> bool {
        match self {
            Self::Point(_) => false,
            Self::Line(points) => points.len() < 2,
            Self::Area(rings) => {
                rings.is_empty() || rings.iter().all(|r| r.len() < 3 || ring_area(r) == 0.0)
            }
        }
    }
}

/// Unsigned shoelace area of one ring.
pub fn ring_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    (sum / 2.0).abs()
}

/// Even-odd point-in-ring test. Border points count as inside.
pub fn point_in_ring(p: Point, ring: &[Point]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];
        if on_segment(p, a, b) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Point-in-polygon over a set of outer rings.
pub fn point_in_rings(p: Point, rings: &[Vec<Point>]) -> bool {
    rings.iter().any(|r| point_in_ring(p, r))
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    cross(a, b, p).abs() < 1e-12
        && p.x >= a.x.min(b.x) - 1e-12
        && p.x <= a.x.max(b.x) + 1e-12
        && p.y >= a.y.min(b.y) - 1e-12
        && p.y <= a.y.max(b.y) + 1e-12
}

/// Checks whether segments `a1 a2` and `b1 b2` intersect, touching included.
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(a1, b1, b2))
        || (d2 == 0.0 && on_segment(a2, b1, b2))
        || (d3 == 0.0 && on_segment(b1, a1, a2))
        || (d4 == 0.0 && on_segment(b2, a1, a2))
}

/// Fraction of the smaller polygon's area shared with the other, in percent.
///
/// Estimated on a regular sample grid over the smaller polygon's bounding
/// rectangle. Admin-boundary decisions only need a coarse figure (the
/// resolver compares against 50), so sampling resolution is fixed.
pub fn overlap_percentage(a: &[Vec<Point>], b: &[Vec<Point>]) -> f64 {
    let (small, large) = if area_of(a) <= area_of(b) { (a, b) } else { (b, a) };
    let rect = rings_rect(small);
    if rect.is_empty() {
        return 0.0;
    }
    const STEPS: usize = 48;
    let dx = (rect.max.x - rect.min.x) / STEPS as f64;
    let dy = (rect.max.y - rect.min.y) / STEPS as f64;
    if dx == 0.0 || dy == 0.0 {
        return 0.0;
    }
    let mut in_small = 0u32;
    let mut in_both = 0u32;
    for i in 0..STEPS {
        for j in 0..STEPS {
            let p = Point::new(
                rect.min.x + dx * (i as f64 + 0.5),
                rect.min.y + dy * (j as f64 + 0.5),
            );
            if point_in_rings(p, small) {
                in_small += 1;
                if point_in_rings(p, large) {
                    in_both += 1;
                }
            }
        }
    }
    if in_small == 0 {
        return 0.0;
    }
    100.0 * f64::from(in_both) / f64::from(in_small)
}

fn area_of(rings: &[Vec<Point>]) -> f64 {
    rings.iter().map(|r| ring_area(r)).sum()
}

fn rings_rect(rings: &[Vec<Point>]) -> Rect {
    let mut rect = Rect::empty();
    for ring in rings {
        for p in ring {
            rect.add(*p);
        }
    }
    rect
}
