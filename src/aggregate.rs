use crate::error::{ChoroplethError, Result};
use crate::geometry::Geometry;
use crate::stats::summarize;
use crate::types::{Boundary, BoundaryStats, Point};
use rayon::prelude::*;
use tracing::debug;

/// Tags every present boundary with the statistic of the points inside it.
///
/// `None` boundaries are dropped. A boundary that contains no points (or only
/// points without a valid value) still yields a result, with `average: None`.
/// Boundaries are classified in parallel; output keeps input order.
pub fn aggregate<G>(
    boundaries: &[Option<Boundary>],
    points: &[Point],
    field: &str,
    geometry: &G,
) -> Result<Vec<BoundaryStats>>
where
    G: Geometry + ?Sized,
{
    if field.trim().is_empty() {
        return Err(ChoroplethError::MissingField);
    }

    debug!(
        "Aggregating '{}' over {} points into {} boundaries",
        field,
        points.len(),
        boundaries.len()
    );

    let results = boundaries
        .par_iter()
        .filter_map(Option::as_ref)
        .map(|boundary| boundary_stats(boundary, points, field, geometry))
        .collect();

    Ok(results)
}

fn boundary_stats<G>(boundary: &Boundary, points: &[Point], field: &str, geometry: &G) -> BoundaryStats
where
    G: Geometry + ?Sized,
{
    let inside = geometry.points_in_boundary(points, boundary);
    let summary = summarize(inside.iter().copied(), field);

    BoundaryStats {
        boundary: boundary.clone(),
        points: inside.into_iter().cloned().collect(),
        average: summary.average,
        values: summary.values,
    }
}
