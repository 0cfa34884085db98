//! Composite street geometry: pin, bounding box, segments and areal parts.

use crate::geometry::{Point, Rect};
use crate::ids::GeoObjectId;

/// Accumulated geometry of one aggregated street.
#[derive(Default)]
pub struct StreetGeometry {
    pin: Option<(GeoObjectId, Point)>,
    bindings: Vec<(GeoObjectId, Point)>,
    lines: Vec<(GeoObjectId, Vec<Point>)>,
    areas: Vec<(GeoObjectId, Vec<Vec<Point>>)>,
}

impl StreetGeometry {
    /// Sets the explicit pin (a named point such as a square label).
    pub fn set_pin(&mut self, id: GeoObjectId, point: Point) {
        self.pin = Some((id, point));
    }

    /// Adds one traced highway segment.
    pub fn add_highway_line(&mut self, id: GeoObjectId, path: Vec<Point>) {
        if path.len() >= 2 {
            self.lines.push((id, path));
        }
    }

    /// Adds an areal part (a square).
    pub fn add_highway_area(&mut self, id: GeoObjectId, rings: Vec<Vec<Point>>) {
        if !rings.is_empty() {
            self.areas.push((id, rings));
        }
    }

    /// Adds an address binding point.
    pub fn add_binding(&mut self, id: GeoObjectId, point: Point) {
        self.bindings.push((id, point));
    }

    /// Line segments.
    pub fn lines(&self) -> &[(GeoObjectId, Vec<Point>)] {
        &self.lines
    }

    /// Areal parts.
    pub fn areas(&self) -> &[(GeoObjectId, Vec<Vec<Point>>)] {
        &self.areas
    }

    /// The explicit pin, if one was set.
    pub fn pin(&self) -> Option<(GeoObjectId, Point)> {
        self.pin
    }

    /// The pin, or a representative point: a middle vertex of the first
    /// segment, an area corner, or a binding point.
    pub fn get_or_choose_pin(&self) -> Option<(GeoObjectId, Point)> {
        if let Some(pin) = self.pin {
            return Some(pin);
        }
        if let Some((id, path)) = self.lines.first() {
            return Some((*id, path[path.len() / 2]));
        }
        if let Some((id, rings)) = self.areas.first() {
            return Some((*id, rings[0][0]));
        }
        self.bindings.first().copied()
    }

    /// Bounding box of every part.
    pub fn bbox(&self) -> Rect {
        let mut rect = Rect::empty();
        if let Some((_, p)) = self.pin {
            rect.add(p);
        }
        for (_, p) in &self.bindings {
            rect.add(*p);
        }
        for (_, path) in &self.lines {
            for p in path {
                rect.add(*p);
            }
        }
        for (_, rings) in &self.areas {
            for ring in rings {
                for p in ring {
                    rect.add(*p);
                }
            }
        }
        rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_preference() {
        let mut g = StreetGeometry::default();
        assert!(g.get_or_choose_pin().is_none());
        g.add_highway_line(
            GeoObjectId::from_way(1),
            vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(4.0, 0.0)],
        );
        let (id, p) = g.get_or_choose_pin().unwrap();
        assert_eq!(id, GeoObjectId::from_way(1));
        assert_eq!(p, Point::new(2.0, 0.0));

        g.set_pin(GeoObjectId::from_node(7), Point::new(1.0, 1.0));
        let (id, _) = g.get_or_choose_pin().unwrap();
        assert_eq!(id, GeoObjectId::from_node(7));
    }

    #[test]
    fn test_bbox() {
        let mut g = StreetGeometry::default();
        g.add_highway_line(
            GeoObjectId::from_way(1),
            vec![Point::new(-1.0, 0.0), Point::new(3.0, 2.0)],
        );
        g.add_binding(GeoObjectId::from_node(2), Point::new(5.0, -2.0));
        let bbox = g.bbox();
        assert_eq!(bbox.min, Point::new(-1.0, -2.0));
        assert_eq!(bbox.max, Point::new(5.0, 2.0));
    }
}
