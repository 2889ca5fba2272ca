//! Error types for the HSR pipeline

use thiserror::Error;

/// Main error type for HSR operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Region set is empty; cannot assign points")]
    EmptyRegionSet,

    #[error("Data integrity violation in region '{region}': {reason}")]
    DataIntegrity { region: String, reason: String },

    #[error("Geometry repair failed for '{0}'")]
    GeometryRepair(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for HSR operations
pub type Result<T> = std::result::Result<T, Error>;
