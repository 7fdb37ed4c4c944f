use crate::cache::Freshness;
use crate::scale::Rgb;
use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub choropleth: ChoroplethConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub boundaries: PathBuf, // .geojson / .json / .shp
    pub boundary_id_property: String,
    pub source: Option<PathBuf>, // database export
    pub points_csv: Option<PathBuf>, // takes precedence over `source`
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChoroplethConfig {
    pub dataset: Option<String>,
    pub color_by: String,
    pub min_color: String, // Hex code
    pub max_color: String, // Hex code
}

impl ChoroplethConfig {
    /// Parses the configured colors as `(low, high)`.
    pub fn colors(&self) -> Result<(Rgb, Rgb)> {
        let low = self
            .min_color
            .parse::<Rgb>()
            .with_context(|| "Invalid choropleth.min_color")?;
        let high = self
            .max_color
            .parse::<Rgb>()
            .with_context(|| "Invalid choropleth.max_color")?;
        Ok((low, high))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
}

impl CacheConfig {
    /// The configured freshness window. Negative ages and ages too large for
    /// a `chrono::Duration` are rejected.
    pub fn freshness(&self) -> Result<Freshness> {
        if self.max_age_hours < 0 {
            return Err(anyhow!("cache.max_age_hours must not be negative, got {}", self.max_age_hours));
        }
        Duration::try_hours(self.max_age_hours)
            .map(Freshness::new)
            .ok_or_else(|| anyhow!("cache.max_age_hours is out of range: {}", self.max_age_hours))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub geojson: PathBuf,
    pub image: Option<PathBuf>,
    #[serde(default = "default_image_width")]
    pub image_width: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_max_age_hours() -> i64 {
    24
}

fn default_image_width() -> u32 {
    1024
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(".")
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
        [input]
        boundaries = "wards.geojson"
        boundary_id_property = "name"
        source = "export.json"

        [choropleth]
        dataset = "water-quality"
        color_by = "ph"
        min_color = "#ffffff"
        max_color = "#08306b"

        [output]
        geojson = "out/map.geojson"
    "##;

    #[test]
    fn applies_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.cache.dir, PathBuf::from(".cache"));
        assert_eq!(config.cache.freshness().unwrap(), Freshness::hours(24));
        assert_eq!(config.output.image, None);
        assert_eq!(config.output.image_width, 1024);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.input.points_csv, None);
    }

    #[test]
    fn parses_colors() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        let (low, high) = config.choropleth.colors().unwrap();
        assert_eq!(low, Rgb::WHITE);
        assert_eq!(high, Rgb::new(8, 48, 107));
    }

    #[test]
    fn rejects_bad_color() {
        let text = MINIMAL.replace("#08306b", "navy");
        let config = AppConfig::from_toml(&text).unwrap();
        assert!(config.choropleth.colors().is_err());
    }

    #[test]
    fn rejects_unrepresentable_cache_age() {
        let text = format!("{}\n[cache]\nmax_age_hours = 9223372036854775807\n", MINIMAL);
        let config = AppConfig::from_toml(&text).unwrap();
        assert!(config.cache.freshness().is_err());

        let text = format!("{}\n[cache]\nmax_age_hours = -1\n", MINIMAL);
        let config = AppConfig::from_toml(&text).unwrap();
        assert!(config.cache.freshness().is_err());
    }

    #[test]
    fn missing_section_fails() {
        assert!(AppConfig::from_toml("[input]\nboundaries = \"x\"").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.choropleth.color_by, "ph");
    }
}
