//! Dataset retrieval in front of the choropleth core.
//!
//! Records come from a [`DataSource`] shaped like a realtime-database tree:
//! `groups/<name>` lists member ids, `data/<id>` holds one record plus its
//! birth certificate. Results are cached per dataset id behind a
//! [`Freshness`] window.

use crate::cache::{Cache, Freshness};
use crate::types::Point;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// Cache key for the dataset catalog.
pub const CATALOG_KEY: &str = "dataSets";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Comma-separated ids of the group's records.
    #[serde(default)]
    pub member_list: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub birth_certificate: Map<String, Value>,
}

/// Catalog listing for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

pub trait DataSource {
    /// All groups, keyed by group name.
    fn groups(&self) -> Result<Vec<(String, GroupRecord)>>;
    fn group(&self, name: &str) -> Result<Option<GroupRecord>>;
    fn entry(&self, id: &str) -> Result<Option<EntryRecord>>;
}

/// A database export held in memory: `{ "groups": {...}, "data": {...} }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonExportSource {
    #[serde(default)]
    groups: BTreeMap<String, GroupRecord>,
    #[serde(default)]
    data: HashMap<String, EntryRecord>,
}

impl JsonExportSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Loading database export from {:?}", path);
        let file = File::open(path)
            .with_context(|| format!("Failed to open database export: {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse database export: {:?}", path))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Malformed database export")
    }
}

impl DataSource for JsonExportSource {
    fn groups(&self) -> Result<Vec<(String, GroupRecord)>> {
        Ok(self
            .groups
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn group(&self, name: &str) -> Result<Option<GroupRecord>> {
        Ok(self.groups.get(name).cloned())
    }

    fn entry(&self, id: &str) -> Result<Option<EntryRecord>> {
        Ok(self.data.get(id).cloned())
    }
}

/// Fetches datasets through a cache. Holds the cache it was given; nothing is
/// read from ambient storage.
pub struct Fetcher<S, C> {
    source: S,
    cache: C,
    freshness: Freshness,
}

impl<S: DataSource, C: Cache> Fetcher<S, C> {
    pub fn new(source: S, cache: C, freshness: Freshness) -> Self {
        Self {
            source,
            cache,
            freshness,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn fetch_points(&mut self, dataset_id: &str) -> Result<Vec<Point>> {
        self.fetch_points_at(dataset_id, Utc::now())
    }

    pub fn fetch_points_at(&mut self, dataset_id: &str, now: DateTime<Utc>) -> Result<Vec<Point>> {
        let records = self.fetch_records_at(dataset_id, now)?;
        Ok(records_to_points(records))
    }

    /// Normalized raw records of a dataset, served from cache while fresh.
    pub fn fetch_records_at(
        &mut self,
        dataset_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Map<String, Value>>> {
        if let Some(cached) = self.cached(dataset_id, now)? {
            return Ok(cached);
        }

        let group_name = dataset_id.replace('-', " ");
        let group = self
            .source
            .group(&group_name)?
            .ok_or_else(|| anyhow!("Dataset '{}' not found", dataset_id))?;

        let mut records = Vec::new();
        for member in group.member_list.split(',').map(str::trim) {
            if member.is_empty() || member == "undefined" {
                continue;
            }
            match self.source.entry(member)? {
                Some(entry) => records.push(normalize_entry(member, entry)),
                None => warn!("Dataset '{}' lists missing record '{}'", dataset_id, member),
            }
        }

        info!("Fetched {} records for dataset '{}'", records.len(), dataset_id);
        let value = serde_json::to_value(&records)?;
        self.cache.put(dataset_id, value, now)?;
        Ok(records)
    }

    pub fn fetch_dataset_catalog(&mut self) -> Result<Vec<DatasetInfo>> {
        self.fetch_dataset_catalog_at(Utc::now())
    }

    pub fn fetch_dataset_catalog_at(&mut self, now: DateTime<Utc>) -> Result<Vec<DatasetInfo>> {
        if let Some(cached) = self.cached(CATALOG_KEY, now)? {
            return Ok(cached);
        }

        let catalog: Vec<DatasetInfo> = self
            .source
            .groups()?
            .into_iter()
            .map(|(key, group)| dataset_info(&key, group))
            .collect();

        let value = serde_json::to_value(&catalog)?;
        self.cache.put(CATALOG_KEY, value, now)?;
        Ok(catalog)
    }

    fn cached<T>(&self, key: &str, now: DateTime<Utc>) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let Some(entry) = self.cache.get(key)? else {
            return Ok(None);
        };
        if !self.freshness.is_fresh(&entry, now) {
            debug!("Cache entry '{}' is stale", key);
            return Ok(None);
        }
        match serde_json::from_value(entry.value) {
            Ok(value) => {
                debug!("Cache hit for '{}'", key);
                Ok(Some(value))
            }
            Err(e) => {
                warn!("Discarding unreadable cache entry '{}': {}", key, e);
                Ok(None)
            }
        }
    }
}

/// Flattens a stored entry into a point record: stamps the id, backfills the
/// location from the birth certificate and strips photo fields.
pub fn normalize_entry(id: &str, entry: EntryRecord) -> Map<String, Value> {
    let EntryRecord {
        mut data,
        birth_certificate,
    } = entry;

    data.insert("id".to_string(), Value::String(id.to_string()));

    for (target, source) in [("lat", "lat"), ("lng", "lon")] {
        let Some(fallback) = birth_certificate.get(source).filter(|v| is_truthy(v)) else {
            continue;
        };
        if !data.get(target).is_some_and(is_truthy) {
            data.insert(target.to_string(), fallback.clone());
        }
    }

    data.retain(|key, _| !key.to_lowercase().contains("photo"));
    data
}

/// Converts records to points, skipping those without a location.
pub fn records_to_points(records: Vec<Map<String, Value>>) -> Vec<Point> {
    let total = records.len();
    let points: Vec<Point> = records
        .into_iter()
        .filter_map(|record| match Point::from_record(record) {
            Ok(point) => Some(point),
            Err(e) => {
                debug!("Skipping record: {}", e);
                None
            }
        })
        .collect();

    if points.len() < total {
        warn!("{} of {} records had no usable location", total - points.len(), total);
    }
    points
}

fn dataset_info(key: &str, group: GroupRecord) -> DatasetInfo {
    let name = group.name.unwrap_or_else(|| key.to_string());
    let description = group
        .description
        .unwrap_or_else(|| format!("A data set containing information on {}", name));
    DatasetInfo {
        id: dataset_id_for(key),
        name,
        description,
    }
}

/// Group key to dataset id: every run of spaces becomes one `-`.
fn dataset_id_for(key: &str) -> String {
    let mut id = String::with_capacity(key.len());
    let mut in_space = false;
    for c in key.chars() {
        if c == ' ' {
            if !in_space {
                id.push('-');
            }
            in_space = true;
        } else {
            id.push(c);
            in_space = false;
        }
    }
    id
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn export() -> JsonExportSource {
        JsonExportSource::from_value(json!({
            "groups": {
                "water quality": {
                    "name": "Water Quality",
                    "member_list": "r1, r2,r3,undefined,"
                },
                "soil  samples": { "member_list": "" }
            },
            "data": {
                "r1": {
                    "data": { "ph": "7.2", "lat": 1.0, "lng": 2.0, "Photo_URL": "x.jpg" },
                    "birth_certificate": { "lat": 9.0, "lon": 9.0 }
                },
                "r2": {
                    "data": { "ph": 6.5, "profilePhoto": "y.png" },
                    "birth_certificate": { "lat": 3.0, "lon": "4.0" }
                }
            }
        }))
        .unwrap()
    }

    fn fetcher() -> Fetcher<JsonExportSource, MemoryCache> {
        Fetcher::new(export(), MemoryCache::new(), Freshness::default())
    }

    #[test]
    fn normalizes_records() {
        let records = fetcher().fetch_records_at("water-quality", now()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({ "id": "r1", "ph": "7.2", "lat": 1.0, "lng": 2.0 })
        );
        assert_eq!(
            Value::Object(records[1].clone()),
            json!({ "id": "r2", "ph": 6.5, "lat": 3.0, "lng": "4.0" })
        );
    }

    #[test]
    fn points_carry_backfilled_location() {
        let points = fetcher().fetch_points_at("water-quality", now()).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!((points[1].lat(), points[1].lng()), (3.0, 4.0));
        assert_eq!(points[1].id.as_deref(), Some("r2"));
    }

    #[test]
    fn fresh_cache_is_served_without_the_source() {
        let mut fetcher = fetcher();
        let first = fetcher.fetch_records_at("water-quality", now()).unwrap();

        let mut cached = Fetcher::new(
            JsonExportSource::default(),
            fetcher.cache().clone(),
            Freshness::default(),
        );
        let later = now() + Duration::hours(23);
        assert_eq!(cached.fetch_records_at("water-quality", later).unwrap(), first);

        let stale = now() + Duration::hours(24);
        assert!(cached.fetch_records_at("water-quality", stale).is_err());
    }

    #[test]
    fn unknown_dataset_is_an_error() {
        assert!(fetcher().fetch_records_at("nope", now()).is_err());
    }

    #[test]
    fn catalog_fills_defaults() {
        let mut fetcher = fetcher();
        let catalog = fetcher.fetch_dataset_catalog_at(now()).unwrap();

        assert_eq!(
            catalog,
            vec![
                DatasetInfo {
                    id: "soil-samples".into(),
                    name: "soil  samples".into(),
                    description: "A data set containing information on soil  samples".into(),
                },
                DatasetInfo {
                    id: "water-quality".into(),
                    name: "Water Quality".into(),
                    description: "A data set containing information on Water Quality".into(),
                },
            ]
        );
        assert!(fetcher.cache().get(CATALOG_KEY).unwrap().is_some());
    }

    #[test]
    fn falsy_location_is_backfilled() {
        let entry = EntryRecord {
            data: json!({ "lat": 0, "lng": "" }).as_object().unwrap().clone(),
            birth_certificate: json!({ "lat": 5.5, "lon": 0 }).as_object().unwrap().clone(),
        };

        let record = normalize_entry("e", entry);

        assert_eq!(record.get("lat"), Some(&json!(5.5)));
        assert_eq!(record.get("lng"), Some(&json!("")));
    }

    #[test]
    fn dataset_ids_collapse_spaces() {
        assert_eq!(dataset_id_for("a  b c"), "a-b-c");
        assert_eq!(dataset_id_for(" lead"), "-lead");
    }
}
