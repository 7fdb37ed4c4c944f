use crate::aggregate::aggregate;
use crate::error::Result;
use crate::geometry::{Geometry, PlanarGeometry};
use crate::range::{reduce, Range};
use crate::scale::Rgb;
use crate::types::{Boundary, BoundaryResult, BoundaryStats, Point};
use tracing::info;

/// Boundaries + points in, colored boundaries out.
///
/// Holds nothing but the geometry collaborator, so repeated calls with the
/// same input give identical output.
#[derive(Debug, Clone, Default)]
pub struct ChoroplethEngine<G = PlanarGeometry> {
    geometry: G,
}

impl ChoroplethEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<G: Geometry> ChoroplethEngine<G> {
    pub fn with_geometry(geometry: G) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn compute(
        &self,
        boundaries: &[Option<Boundary>],
        points: &[Point],
        field: &str,
        low: Rgb,
        high: Rgb,
    ) -> Result<Vec<BoundaryResult>> {
        let stats = aggregate(boundaries, points, field, &self.geometry)?;
        let range = reduce(&stats);

        match range.bounds() {
            Some((min, max)) => info!(
                "'{}' ranges {} to {} across {} boundaries",
                field,
                min,
                max,
                stats.len()
            ),
            None => info!("No boundary has a valid '{}' value; leaving all uncolored", field),
        }

        Ok(colorize(stats, &range, low, high))
    }
}

/// Color pass: attaches `scale(average)` to every statistic with an average.
///
/// An empty range builds no scale and leaves every color `None`.
pub fn colorize(stats: Vec<BoundaryStats>, range: &Range, low: Rgb, high: Rgb) -> Vec<BoundaryResult> {
    let scale = range.scale(low, high);

    stats
        .into_iter()
        .map(|s| {
            let color = scale.zip(s.average).map(|(scale, avg)| scale.color(avg));
            s.into_result(color)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures::square;
    use geo::MultiPolygon;

    fn stats(id: &str, average: Option<f64>) -> BoundaryStats {
        BoundaryStats {
            boundary: Boundary::new(id, MultiPolygon::new(vec![])),
            points: Vec::new(),
            average,
            values: Vec::new(),
        }
    }

    #[test]
    fn colorize_leaves_missing_averages_uncolored() {
        let input = vec![stats("a", Some(0.0)), stats("b", None), stats("c", Some(10.0))];
        let range = Range { min: Some(0.0), max: Some(10.0) };

        let colored = colorize(input, &range, Rgb::WHITE, Rgb::BLACK);

        let colors: Vec<Option<Rgb>> = colored.iter().map(|r| r.color).collect();
        assert_eq!(colors, vec![Some(Rgb::WHITE), None, Some(Rgb::BLACK)]);
    }

    #[test]
    fn colorize_with_empty_range_colors_nothing() {
        let colored = colorize(vec![stats("a", None)], &Range::default(), Rgb::WHITE, Rgb::BLACK);
        assert_eq!(colored[0].color, None);
    }

    #[test]
    fn huge_averages_stay_on_the_scale() {
        let high = Rgb::new(0, 0, 200);
        let boundaries = vec![
            Some(square("big", 0.0, 0.0, 1.0, 1.0)),
            Some(square("small", 2.0, 0.0, 3.0, 1.0)),
        ];
        let points = vec![
            Point::new(0.5, 0.5).with_field("f", 1e308),
            Point::new(0.6, 0.6).with_field("f", 1e308),
            Point::new(0.5, 2.5).with_field("f", 1.0),
        ];

        let results = ChoroplethEngine::new()
            .compute(&boundaries, &points, "f", Rgb::WHITE, high)
            .unwrap();

        assert_eq!(results[0].average, Some(1e308));
        assert_eq!(results[0].color, Some(high));
        assert_eq!(results[1].average, Some(1.0));
        assert_eq!(results[1].color, Some(Rgb::WHITE));
    }

    #[test]
    fn compute_uses_global_range() {
        let boundaries = vec![
            Some(square("low", 0.0, 0.0, 1.0, 1.0)),
            Some(square("high", 2.0, 0.0, 3.0, 1.0)),
        ];
        let points = vec![
            Point::new(0.5, 0.5).with_field("f", 1),
            Point::new(0.5, 2.5).with_field("f", 3),
        ];

        let results = ChoroplethEngine::new()
            .compute(&boundaries, &points, "f", Rgb::WHITE, Rgb::BLACK)
            .unwrap();

        assert_eq!(results[0].color, Some(Rgb::WHITE));
        assert_eq!(results[1].color, Some(Rgb::BLACK));
    }
}
