use crate::types::{Boundary, Point};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::centroid::Centroid;
use geo::algorithm::contains::Contains;

/// Point-in-polygon and centroid primitives the aggregator relies on.
///
/// Must be `Sync`: boundaries are classified in parallel against a shared
/// point slice.
pub trait Geometry: Sync {
    /// Points lying inside `boundary`, in input order.
    fn points_in_boundary<'a>(&self, points: &'a [Point], boundary: &Boundary) -> Vec<&'a Point>;

    /// Centroid of `boundary` as a lng/lat point, `None` for empty geometry.
    fn centroid(&self, boundary: &Boundary) -> Option<geo::Point<f64>>;
}

/// Planar (lng/lat as x/y) geometry backed by `geo`.
///
/// Holes and multi-polygons follow `geo`'s containment rules; a point on a
/// boundary edge is not contained.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarGeometry;

impl Geometry for PlanarGeometry {
    fn points_in_boundary<'a>(&self, points: &'a [Point], boundary: &Boundary) -> Vec<&'a Point> {
        let Some(bbox) = boundary.geometry.bounding_rect() else {
            return Vec::new();
        };

        let (min, max) = (bbox.min(), bbox.max());
        points
            .iter()
            .filter(|p| {
                let c = p.location.0;
                c.x >= min.x && c.x <= max.x && c.y >= min.y && c.y <= max.y
            })
            .filter(|p| boundary.geometry.contains(&p.location))
            .collect()
    }

    fn centroid(&self, boundary: &Boundary) -> Option<geo::Point<f64>> {
        boundary.geometry.centroid()
    }
}
