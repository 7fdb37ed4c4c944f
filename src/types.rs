use crate::error::{ChoroplethError, Result};
use crate::scale::Rgb;
use crate::stats::parse_number;
use geo::{MultiPolygon, Polygon};
use serde_json::{Map, Value};

/// A geolocated record.
///
/// `lat`/`lng` are required and checked once, when the point is built.
/// Every other key stays a dynamic JSON field looked up by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: Option<String>,
    // x = longitude, y = latitude
    pub location: geo::Point<f64>,
    pub fields: Map<String, Value>,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        let mut fields = Map::new();
        fields.insert("lat".to_string(), Value::from(lat));
        fields.insert("lng".to_string(), Value::from(lng));
        Self {
            id: None,
            location: geo::Point::new(lng, lat),
            fields,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Builds a point from a raw record. Accepts `lng` or `lon` for longitude,
    /// as numbers or numeric text.
    pub fn from_record(fields: Map<String, Value>) -> Result<Self> {
        let id = fields.get("id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let lat = fields.get("lat").and_then(parse_number);
        let lng = fields
            .get("lng")
            .or_else(|| fields.get("lon"))
            .and_then(parse_number);

        match (lat, lng) {
            (Some(lat), Some(lng)) => Ok(Self {
                id,
                location: geo::Point::new(lng, lat),
                fields,
            }),
            _ => Err(ChoroplethError::MissingLocation {
                id: id.unwrap_or_else(|| "<unknown>".to_string()),
            }),
        }
    }

    pub fn lat(&self) -> f64 {
        self.location.y()
    }

    pub fn lng(&self) -> f64 {
        self.location.x()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// One reportable region. The id is the identity carried through to results.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
}

impl Boundary {
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
        }
    }

    pub fn from_polygon(id: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self::new(id, MultiPolygon::new(vec![polygon]))
    }
}

/// Phase-one output: a boundary tagged with its statistic, not yet colored.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryStats {
    pub boundary: Boundary,
    pub points: Vec<Point>,
    pub average: Option<f64>,
    pub values: Vec<Option<f64>>,
}

impl BoundaryStats {
    /// Phase two: produce the colored result, consuming the statistic.
    pub fn into_result(self, color: Option<Rgb>) -> BoundaryResult {
        BoundaryResult {
            boundary: self.boundary,
            points: self.points,
            average: self.average,
            values: self.values,
            color,
        }
    }
}

/// A boundary with its statistic and color. `color` is `None` exactly when
/// `average` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryResult {
    pub boundary: Boundary,
    pub points: Vec<Point>,
    pub average: Option<f64>,
    pub values: Vec<Option<f64>>,
    pub color: Option<Rgb>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn from_record_reads_text_coordinates() {
        let point = Point::from_record(record(json!({
            "id": "abc",
            "lat": "53.35",
            "lng": -6.26,
            "ph": "7.1",
        })))
        .unwrap();

        assert_eq!(point.id.as_deref(), Some("abc"));
        assert_eq!(point.lat(), 53.35);
        assert_eq!(point.lng(), -6.26);
        assert_eq!(point.field("ph"), Some(&json!("7.1")));
    }

    #[test]
    fn from_record_accepts_lon_alias() {
        let point = Point::from_record(record(json!({"lat": 1.0, "lon": 2.0}))).unwrap();
        assert_eq!(point.lng(), 2.0);
    }

    #[test]
    fn from_record_without_location_fails() {
        let err = Point::from_record(record(json!({"id": "x", "lat": 1.0}))).unwrap_err();
        assert_eq!(err, ChoroplethError::MissingLocation { id: "x".into() });
    }
}
