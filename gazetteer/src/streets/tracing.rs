//! Splitting a highway path into per-region segments.

use crate::geometry::Point;

/// One maximal sub-path inside a single region.
pub struct PathSegment {
    /// Owning region id.
    pub region_id: u64,
    /// Segment points, at least two.
    pub path: Vec<Point>,
}

/// Walks the path and cuts it wherever the owning region changes. Points
/// with no owning region break the current segment. Boundary points are
/// shared by both adjacent segments so neither loses length.
pub fn trace_street_regions<F>(points: &[Point], region_of: F) -> Vec<PathSegment>
where
    F: Fn(Point) -> Option<u64>,
{
    let mut segments: Vec<PathSegment> = Vec::new();
    let mut current: Option<PathSegment> = None;

    for point in points.iter().copied() {
        let region = region_of(point);
        match (&mut current, region) {
            (Some(segment), Some(region_id)) if segment.region_id == region_id => {
                segment.path.push(point);
            }
            (_, Some(region_id)) => {
                if let Some(mut segment) = current.take() {
                    // Close the outgoing segment at the crossing point.
                    segment.path.push(point);
                    push_if_valid(&mut segments, segment);
                }
                current = Some(PathSegment {
                    region_id,
                    path: vec![point],
                });
            }
            (Some(_), None) => {
                push_if_valid(&mut segments, current.take().expect("current checked"));
            }
            (None, None) => {}
        }
    }
    if let Some(segment) = current.take() {
        push_if_valid(&mut segments, segment);
    }
    segments
}

fn push_if_valid(segments: &mut Vec<PathSegment>, segment: PathSegment) {
    if segment.path.len() >= 2 {
        segments.push(segment);
    }
}
