use crate::scale::{ColorScale, Rgb};
use crate::types::BoundaryStats;
use serde::Serialize;

/// Global spread of boundary averages. Both ends are `None` when no boundary
/// had a valid average.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Range {
    /// Folds averages into a range, skipping `None`.
    ///
    /// Seeds from the first valid average, so an all-`None` input stays
    /// `{None, None}` instead of leaking a placeholder.
    pub fn from_averages<I>(averages: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        averages
            .into_iter()
            .flatten()
            .fold(Range::default(), |range, value| Range {
                min: Some(range.min.map_or(value, |m| m.min(value))),
                max: Some(range.max.map_or(value, |m| m.max(value))),
            })
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.min.zip(self.max)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds().is_none()
    }

    /// A scale over this range, or `None` when there is nothing to scale or
    /// either bound is not finite.
    pub fn scale(&self, low: Rgb, high: Rgb) -> Option<ColorScale> {
        self.bounds()
            .filter(|(min, max)| min.is_finite() && max.is_finite())
            .map(|(min, max)| ColorScale::new(min, max, low, high))
    }
}

/// Range of the averages across a set of per-boundary statistics.
pub fn reduce(results: &[BoundaryStats]) -> Range {
    Range::from_averages(results.iter().map(|r| r.average))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_has_no_bounds() {
        assert_eq!(reduce(&[]), Range::default());
        assert!(Range::default().is_empty());
    }

    #[test]
    fn skips_missing_averages() {
        let range = Range::from_averages([None, Some(3.0), None, Some(-1.5), Some(2.0)]);
        assert_eq!(range.bounds(), Some((-1.5, 3.0)));
    }

    #[test]
    fn single_value_is_degenerate() {
        let range = Range::from_averages([Some(4.0)]);
        assert_eq!(range, Range { min: Some(4.0), max: Some(4.0) });
    }

    #[test]
    fn empty_range_builds_no_scale() {
        assert!(Range::default().scale(Rgb::WHITE, Rgb::BLACK).is_none());
    }

    #[test]
    fn non_finite_bounds_build_no_scale() {
        let range = Range::from_averages([Some(1.0), Some(f64::INFINITY)]);
        assert!(range.scale(Rgb::WHITE, Rgb::BLACK).is_none());

        let range = Range::from_averages([Some(f64::NEG_INFINITY), Some(1.0)]);
        assert!(range.scale(Rgb::WHITE, Rgb::BLACK).is_none());
    }

    proptest! {
        #[test]
        fn all_missing_averages_yield_no_bounds(n in 0_usize..64) {
            let range = Range::from_averages(std::iter::repeat(None).take(n));
            prop_assert_eq!(range, Range { min: None, max: None });
        }

        #[test]
        fn bounds_enclose_every_valid_average(
            averages in prop::collection::vec(prop::option::of(-1e9_f64..1e9), 1..64),
        ) {
            let range = Range::from_averages(averages.iter().copied());
            let valid: Vec<f64> = averages.iter().flatten().copied().collect();
            match range.bounds() {
                None => prop_assert!(valid.is_empty()),
                Some((min, max)) => {
                    prop_assert!(min <= max);
                    for v in valid {
                        prop_assert!(min <= v && v <= max);
                    }
                }
            }
        }
    }
}
