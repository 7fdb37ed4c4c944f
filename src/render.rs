use crate::geometry::Geometry;
use crate::scale::Rgb;
use crate::types::{Boundary, BoundaryResult};
use anyhow::{Context, Result};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Rect;
use geojson::{Feature, FeatureCollection, JsonObject};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Opacity for regions that have a color.
pub const FILL_OPACITY: f64 = 1.0;
/// Opacity for "no data" regions, which are filled with the low color.
pub const NO_DATA_OPACITY: f64 = 0.1;
/// Tooltips sit just north of the centroid so they don't cover it.
const TOOLTIP_LAT_OFFSET: f64 = 0.001;

/// How one boundary is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRegion {
    pub boundary: Boundary,
    pub average: Option<f64>,
    pub color: Option<Rgb>,
    pub fill: Rgb,
    pub fill_opacity: f64,
    pub tooltip: Tooltip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub text: String,
    /// `[lng, lat]`; absent for an empty geometry.
    pub anchor: Option<[f64; 2]>,
}

/// Applies the fill policy and builds tooltips for every result.
pub fn style_regions<G>(results: &[BoundaryResult], field: &str, low: Rgb, geometry: &G) -> Vec<RenderedRegion>
where
    G: Geometry + ?Sized,
{
    results
        .iter()
        .map(|result| {
            let (fill, fill_opacity) = match result.color {
                Some(color) => (color, FILL_OPACITY),
                None => (low, NO_DATA_OPACITY),
            };

            RenderedRegion {
                boundary: result.boundary.clone(),
                average: result.average,
                color: result.color,
                fill,
                fill_opacity,
                tooltip: Tooltip {
                    text: tooltip_text(field, result.average),
                    anchor: geometry
                        .centroid(&result.boundary)
                        .map(|c| [c.x(), c.y() + TOOLTIP_LAT_OFFSET]),
                },
            }
        })
        .collect()
}

pub fn tooltip_text(field: &str, average: Option<f64>) -> String {
    match average {
        Some(avg) => format!("{}: {}", field, avg),
        None => format!("{}: no data", field),
    }
}

pub fn to_feature_collection(regions: &[RenderedRegion], field: &str) -> FeatureCollection {
    let features = regions
        .iter()
        .map(|region| {
            let mut props = JsonObject::new();
            props.insert("id".into(), Value::from(region.boundary.id.clone()));
            props.insert("field".into(), Value::from(field));
            props.insert("average".into(), region.average.map_or(Value::Null, Value::from));
            props.insert(
                "color".into(),
                region.color.map_or(Value::Null, |c| Value::from(c.to_string())),
            );
            props.insert("fill".into(), Value::from(region.fill.to_string()));
            props.insert("fill_opacity".into(), Value::from(region.fill_opacity));
            props.insert("tooltip".into(), Value::from(region.tooltip.text.clone()));
            props.insert(
                "tooltip_anchor".into(),
                region
                    .tooltip
                    .anchor
                    .map_or(Value::Null, |a| Value::from(a.to_vec())),
            );

            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &region.boundary.geometry,
                ))),
                id: None,
                properties: Some(props),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(path: &Path, collection: &FeatureCollection) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let content = serde_json::to_string(collection)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write GeoJSON: {:?}", path))?;
    info!("Wrote {} regions to {:?}", collection.features.len(), path);
    Ok(())
}

// Wrapper for RTree indexing
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// R-tree over region bounding boxes for lng/lat lookups.
pub struct RegionIndex {
    tree: RTree<RegionEnvelope>,
    extent: Option<Rect<f64>>,
}

impl RegionIndex {
    pub fn build(regions: &[RenderedRegion]) -> Self {
        let mut extent: Option<Rect<f64>> = None;
        let items: Vec<RegionEnvelope> = regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let rect = region.boundary.geometry.bounding_rect()?;
                extent = Some(match extent {
                    Some(e) => Rect::new(
                        geo::Coord { x: e.min().x.min(rect.min().x), y: e.min().y.min(rect.min().y) },
                        geo::Coord { x: e.max().x.max(rect.max().x), y: e.max().y.max(rect.max().y) },
                    ),
                    None => rect,
                });
                Some(RegionEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(items),
            extent,
        }
    }

    /// Bounding box of every indexed region.
    pub fn extent(&self) -> Option<Rect<f64>> {
        self.extent
    }

    /// Index of the first region containing the point, if any.
    pub fn locate(&self, regions: &[RenderedRegion], lng: f64, lat: f64) -> Option<usize> {
        let point = geo::Point::new(lng, lat);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([lng, lat]))
            .map(|candidate| candidate.index)
            .filter(|&i| regions.get(i).is_some_and(|r| r.boundary.geometry.contains(&point)))
            .min()
    }
}

/// Tallest preview allowed, as a multiple of the width.
pub const MAX_ASPECT: f64 = 4.0;

/// Rasterizes the regions into an equirectangular preview `width` pixels wide.
///
/// Height follows the extent's aspect ratio, corrected for latitude, and is
/// capped at `MAX_ASPECT` times the width. Pixels outside every region stay
/// transparent.
pub fn render_image(regions: &[RenderedRegion], width: u32) -> Option<RgbaImage> {
    let index = RegionIndex::build(regions);
    let extent = index.extent()?;
    let span_x = extent.width();
    let span_y = extent.height();
    if width == 0 || span_x <= 0.0 || span_y <= 0.0 {
        return None;
    }

    let mid_lat = (extent.min().y + extent.max().y) / 2.0;
    let aspect = span_y / (span_x * mid_lat.to_radians().cos().max(0.01));
    let height = ((width as f64 * aspect.min(MAX_ASPECT)).round() as u32).max(1);

    let rows: Vec<Vec<Rgba<u8>>> = (0..height)
        .into_par_iter()
        .map(|py| {
            let lat = extent.max().y - (py as f64 + 0.5) / height as f64 * span_y;
            (0..width)
                .map(|px| {
                    let lng = extent.min().x + (px as f64 + 0.5) / width as f64 * span_x;
                    match index.locate(regions, lng, lat) {
                        Some(i) => {
                            let region = &regions[i];
                            let alpha = (region.fill_opacity * 255.0).round().clamp(0.0, 255.0) as u8;
                            region.fill.to_rgba(alpha)
                        }
                        None => Rgba([0, 0, 0, 0]),
                    }
                })
                .collect()
        })
        .collect();

    let mut img: RgbaImage = ImageBuffer::new(width, height);
    for (py, row) in rows.into_iter().enumerate() {
        for (px, pixel) in row.into_iter().enumerate() {
            img.put_pixel(px as u32, py as u32, pixel);
        }
    }
    Some(img)
}

pub fn write_image(path: &Path, regions: &[RenderedRegion], width: u32) -> Result<()> {
    let Some(img) = render_image(regions, width) else {
        info!("Nothing to rasterize; skipping {:?}", path);
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    img.save(path)
        .with_context(|| format!("Failed to save image: {:?}", path))?;
    info!("Wrote {}x{} preview to {:?}", img.width(), img.height(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures::square;
    use crate::geometry::PlanarGeometry;
    use approx::assert_relative_eq;

    fn result(boundary: Boundary, average: Option<f64>, color: Option<Rgb>) -> BoundaryResult {
        BoundaryResult {
            boundary,
            points: Vec::new(),
            average,
            values: Vec::new(),
            color,
        }
    }

    fn regions() -> Vec<RenderedRegion> {
        let results = vec![
            result(square("a", 0.0, 0.0, 1.0, 1.0), Some(2.5), Some(Rgb::BLACK)),
            result(square("b", 1.0, 0.0, 2.0, 1.0), None, None),
        ];
        style_regions(&results, "ph", Rgb::WHITE, &PlanarGeometry)
    }

    #[test]
    fn no_data_regions_use_faint_low_color() {
        let regions = regions();

        assert_eq!((regions[0].fill, regions[0].fill_opacity), (Rgb::BLACK, 1.0));
        assert_eq!((regions[1].fill, regions[1].fill_opacity), (Rgb::WHITE, 0.1));
    }

    #[test]
    fn tooltips_sit_above_centroid() {
        let regions = regions();

        assert_eq!(regions[0].tooltip.text, "ph: 2.5");
        assert_eq!(regions[1].tooltip.text, "ph: no data");
        let [lng, lat] = regions[0].tooltip.anchor.unwrap();
        assert_relative_eq!(lng, 0.5);
        assert_relative_eq!(lat, 0.501);
    }

    #[test]
    fn feature_collection_carries_styling() {
        let fc = to_feature_collection(&regions(), "ph");

        assert_eq!(fc.features.len(), 2);
        let props = fc.features[1].properties.as_ref().unwrap();
        assert_eq!(props["id"], "b");
        assert_eq!(props["average"], Value::Null);
        assert_eq!(props["color"], Value::Null);
        assert_eq!(props["fill"], "#ffffff");
    }

    #[test]
    fn index_locates_regions() {
        let regions = regions();
        let index = RegionIndex::build(&regions);

        assert_eq!(index.locate(&regions, 0.5, 0.5), Some(0));
        assert_eq!(index.locate(&regions, 1.5, 0.5), Some(1));
        assert_eq!(index.locate(&regions, 5.0, 5.0), None);
    }

    #[test]
    fn image_paints_each_region() {
        let img = render_image(&regions(), 20).unwrap();

        assert_eq!(img.width(), 20);
        assert_eq!(img.height(), 10);
        assert_eq!(*img.get_pixel(2, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(17, 5), Rgba([255, 255, 255, 26]));
    }

    #[test]
    fn thin_extent_height_is_capped() {
        let results = vec![result(square("sliver", 0.0, 0.0, 0.00001, 1.0), Some(7.0), Some(Rgb::BLACK))];
        let regions = style_regions(&results, "ph", Rgb::WHITE, &PlanarGeometry);

        let img = render_image(&regions, 64).unwrap();

        assert_eq!(img.width(), 64);
        assert_eq!(img.height(), 256);
    }

    #[test]
    fn nothing_to_draw() {
        assert!(render_image(&[], 100).is_none());
    }
}
