use crate::cache::FileCache;
use crate::config::AppConfig;
use crate::fetch::{Fetcher, JsonExportSource};
use crate::types::{Boundary, Point};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use serde_json::{Map, Value};
use shapefile::Reader;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Loads the boundary layer named in the config.
///
/// Features without a usable id come back as `None`; the engine drops them.
pub fn load_boundaries(config: &AppConfig) -> Result<Vec<Option<Boundary>>> {
    let path = &config.input.boundaries;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let id_property = &config.input.boundary_id_property;
    let boundaries = match extension.as_str() {
        "shp" => load_shapefile(path, id_property)?,
        "json" | "geojson" => load_geojson(path, id_property)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    info!(
        "Loaded {} boundaries ({} without id)",
        boundaries.len(),
        boundaries.iter().filter(|b| b.is_none()).count()
    );
    Ok(boundaries)
}

/// Loads points from the CSV file if one is configured, otherwise fetches the
/// configured dataset through the file cache.
pub fn load_points(config: &AppConfig) -> Result<Vec<Point>> {
    if let Some(csv_path) = &config.input.points_csv {
        return load_points_csv(csv_path);
    }

    let source_path = config
        .input
        .source
        .as_ref()
        .ok_or_else(|| anyhow!("Either input.points_csv or input.source must be set"))?;
    let dataset = config
        .choropleth
        .dataset
        .as_deref()
        .ok_or_else(|| anyhow!("choropleth.dataset is required when reading input.source"))?;

    let source = JsonExportSource::from_path(source_path)?;
    let cache = FileCache::new(&config.cache.dir);
    let mut fetcher = Fetcher::new(source, cache, config.cache.freshness()?);
    fetcher.fetch_points(dataset)
}

fn load_geojson(path: &Path, id_property: &str) -> Result<Vec<Option<Boundary>>> {
    info!("Loading GeoJSON from {:?}...", path);
    let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;
    boundaries_from_geojson(geojson, id_property)
}

pub fn boundaries_from_geojson(geojson: GeoJson, id_property: &str) -> Result<Vec<Option<Boundary>>> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut boundaries = Vec::new();

    for feature in collection.features {
        let id = match feature.properties.as_ref().and_then(|props| props.get(id_property)) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        boundaries.push(id.map(|id| Boundary::new(id, geometry)));
    }

    Ok(boundaries)
}

fn load_shapefile(path: &Path, id_property: &str) -> Result<Vec<Option<Boundary>>> {
    info!("Loading Shapefile from {:?}...", path);
    let mut reader =
        Reader::from_path(path).with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut boundaries = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let id_value = record
            .get(id_property)
            .ok_or_else(|| anyhow!("Id column '{}' not found in Shapefile", id_property))?;

        let id = match id_value {
            shapefile::dbase::FieldValue::Character(s) => s.clone(),
            shapefile::dbase::FieldValue::Numeric(n) => n.map(|n| n.to_string()),
            _ => return Err(anyhow!("Shapefile id column must be text or numeric")),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        boundaries.push(id.map(|id| Boundary::new(id, geometry)));
    }

    Ok(boundaries)
}

/// Reads points from a CSV with `lat` and `lng` (or `lon`) columns. Every
/// column is kept as a text field.
pub fn load_points_csv(path: &Path) -> Result<Vec<Point>> {
    info!("Loading points from {:?}...", path);
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    points_from_csv(file)
}

pub fn points_from_csv<R: Read>(reader: R) -> Result<Vec<Point>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    if !headers.iter().any(|h| h == "lat") {
        return Err(anyhow!("CSV has no 'lat' column"));
    }

    let mut points = Vec::new();
    let mut skipped = 0usize;

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();

        match Point::from_record(fields) {
            Ok(point) => points.push(point),
            Err(_) => {
                skipped += 1;
                warn!("Skipping CSV row {}: no usable location", row + 1);
            }
        }
    }

    info!("Loaded {} points ({} skipped)", points.len(), skipped);
    Ok(points)
}
