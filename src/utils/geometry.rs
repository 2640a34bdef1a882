//! Planar helpers shared by the mosaic and cohesion passes
//!
//! Boundary extraction, exact length of a boundary lying on/inside a region, and
//! an R-tree over bounding boxes for candidate search.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BoundingRect, Coord, Intersects, Line, LineString, MultiLineString, MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// Distance under which a point counts as lying on a boundary (map units)
pub const COINCIDENCE_TOLERANCE: f64 = 1e-6;

/// Exterior and interior rings of every part
pub fn boundary(geometry: &MultiPolygon<f64>) -> MultiLineString<f64> {
    let mut rings: Vec<LineString<f64>> = Vec::new();
    for polygon in geometry.0.iter() {
        rings.push(polygon.exterior().clone());
        rings.extend(polygon.interiors().iter().cloned());
    }
    MultiLineString::new(rings)
}

pub fn segment_length(segment: &Line<f64>) -> f64 {
    segment.dx().hypot(segment.dy())
}

pub fn boundary_length(lines: &MultiLineString<f64>) -> f64 {
    lines
        .0
        .iter()
        .flat_map(|ring| ring.lines())
        .map(|segment| segment_length(&segment))
        .sum()
}

/// Length of `lines` lying inside or on the boundary of `region`
///
/// Every segment is split where it crosses or runs along the region boundary;
/// each piece is then classified by its midpoint.
pub fn length_within(lines: &MultiLineString<f64>, region: &MultiPolygon<f64>) -> f64 {
    let region_edges: Vec<Line<f64>> = boundary(region)
        .0
        .iter()
        .flat_map(|ring| ring.lines())
        .collect();

    let mut total = 0.0;
    for segment in lines.0.iter().flat_map(|ring| ring.lines()) {
        let length = segment_length(&segment);
        if length <= COINCIDENCE_TOLERANCE {
            continue;
        }

        let mut cuts = vec![0.0, 1.0];
        for edge in &region_edges {
            match line_intersection(segment, *edge) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    cuts.push(parameter_along(&segment, intersection));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    cuts.push(parameter_along(&segment, intersection.start));
                    cuts.push(parameter_along(&segment, intersection.end));
                }
                None => {}
            }
        }

        cuts.iter_mut().for_each(|t| *t = t.clamp(0.0, 1.0));
        cuts.sort_by(|a, b| a.total_cmp(b));
        cuts.dedup_by(|a, b| (*a - *b).abs() * length <= COINCIDENCE_TOLERANCE);

        for piece in cuts.windows(2) {
            let (t0, t1) = (piece[0], piece[1]);
            let midpoint = point_at(&segment, (t0 + t1) / 2.0);
            if covers(region, &region_edges, midpoint) {
                total += (t1 - t0) * length;
            }
        }
    }
    total
}

fn parameter_along(segment: &Line<f64>, point: Coord<f64>) -> f64 {
    let (dx, dy) = (segment.dx(), segment.dy());
    let squared = dx * dx + dy * dy;
    ((point.x - segment.start.x) * dx + (point.y - segment.start.y) * dy) / squared
}

fn point_at(segment: &Line<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: segment.start.x + t * segment.dx(),
        y: segment.start.y + t * segment.dy(),
    }
}

fn distance_to_segment(point: Coord<f64>, segment: &Line<f64>) -> f64 {
    let (dx, dy) = (segment.dx(), segment.dy());
    let squared = dx * dx + dy * dy;
    let t = if squared == 0.0 {
        0.0
    } else {
        parameter_along(segment, point).clamp(0.0, 1.0)
    };
    let closest = point_at(segment, t);
    (point.x - closest.x).hypot(point.y - closest.y)
}

fn covers(region: &MultiPolygon<f64>, edges: &[Line<f64>], point: Coord<f64>) -> bool {
    region.intersects(&Point::from(point))
        || edges
            .iter()
            .any(|edge| distance_to_segment(point, edge) <= COINCIDENCE_TOLERANCE)
}

/// Grow a rectangle by `distance` on every side
pub fn expand_rect(rect: Rect<f64>, distance: f64) -> Rect<f64> {
    let offset = Coord { x: distance, y: distance };
    Rect::new(rect.min() - offset, rect.max() + offset)
}

// ============================================================================
// Spatial index
// ============================================================================

/// Bounding box tagged with the key of the geometry it came from
#[derive(Debug, Clone)]
pub struct IndexedEnvelope<K> {
    pub key: K,
    aabb: AABB<[f64; 2]>,
}

impl<K> RTreeObject for IndexedEnvelope<K> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

fn to_aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// R-tree over geometry bounding boxes, queried by rectangle
pub struct SpatialIndex<K> {
    tree: RTree<IndexedEnvelope<K>>,
}

impl<K: Clone> SpatialIndex<K> {
    /// Geometries without a bounding box (empty) are left out
    pub fn new<'a>(entries: impl IntoIterator<Item = (K, &'a MultiPolygon<f64>)>) -> Self {
        let envelopes: Vec<IndexedEnvelope<K>> = entries
            .into_iter()
            .filter_map(|(key, geometry)| {
                geometry.bounding_rect().map(|rect| IndexedEnvelope {
                    key,
                    aabb: to_aabb(&rect),
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// Keys whose bounding box touches `rect`
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<K> {
        self.tree
            .locate_in_envelope_intersecting(&to_aabb(rect))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::polygon;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]])
    }

    #[test]
    fn test_boundary_length() {
        assert_relative_eq!(boundary_length(&boundary(&square(0.0, 0.0, 2.0))), 8.0);
    }

    #[test]
    fn test_length_within_self_is_full() {
        let shape = square(0.0, 0.0, 3.0);
        let ring = boundary(&shape);
        assert_relative_eq!(length_within(&ring, &shape), 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_length_within_shared_edge() {
        let a = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 1.0), (x: 0.0, y: 1.0),
        ]]);
        let b = MultiPolygon::new(vec![polygon![
            (x: 3.0, y: 0.0), (x: 6.0, y: 0.0), (x: 6.0, y: 1.0), (x: 3.0, y: 1.0),
        ]]);
        assert_relative_eq!(length_within(&boundary(&a), &b), 1.0, epsilon = 1e-9);
        assert_relative_eq!(length_within(&boundary(&b), &a), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_length_within_partial_and_disjoint() {
        let small = square(0.0, 0.0, 1.0);
        let far = square(10.0, 10.0, 1.0);
        assert_relative_eq!(length_within(&boundary(&small), &far), 0.0);

        // Half of the bottom edge of `big` lies on top of `small`
        let big = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 3.0), (x: 0.0, y: 3.0),
        ]]);
        assert_relative_eq!(length_within(&boundary(&big), &small), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_spatial_index_candidates() {
        let shapes = [square(0.0, 0.0, 1.0), square(5.0, 0.0, 1.0), square(1.0, 0.0, 1.0)];
        let index = SpatialIndex::new(shapes.iter().enumerate().map(|(i, s)| (i, s)));
        assert_eq!(index.len(), 3);

        let query = expand_rect(Rect::new((0.0, 0.0), (1.0, 1.0)), 0.5);
        let mut found = index.candidates(&query);
        found.sort_unstable();
        assert_eq!(found, vec![0, 2]);
    }
}
