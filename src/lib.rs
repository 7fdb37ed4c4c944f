//! Choropleth maps from geolocated records.
//!
//! Points are classified into boundary polygons, each boundary gets the mean
//! of a chosen field, and the means are colored on one linear scale spanning
//! the global range. The core ([`engine`], [`aggregate`], [`stats`],
//! [`range`], [`scale`]) is pure and synchronous; loading, caching,
//! rendering and serving sit around it.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod range;
pub mod render;
pub mod scale;
pub mod server;
pub mod stats;
pub mod types;

pub use engine::ChoroplethEngine;
pub use error::ChoroplethError;
pub use geometry::{Geometry, PlanarGeometry};
pub use range::Range;
pub use scale::{ColorScale, Rgb};
pub use types::{Boundary, BoundaryResult, BoundaryStats, Point};
