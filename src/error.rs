use thiserror::Error;

/// Contract violations the choropleth core refuses to absorb.
///
/// Bad data (unparseable field values, empty boundaries, an empty range) is
/// never an error; these variants only cover misuse by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChoroplethError {
    /// The `colorBy` field name was empty or blank.
    #[error("field name to aggregate must not be empty")]
    MissingField,

    /// A color literal could not be parsed as `#rrggbb` / `#rgb`.
    #[error("invalid color literal: {0:?}")]
    InvalidColor(String),

    /// A record lacked a usable `lat`/`lng` pair.
    #[error("record {id} has no usable lat/lng location")]
    MissingLocation { id: String },
}

pub type Result<T, E = ChoroplethError> = std::result::Result<T, E>;
