//! # HSR Core
//!
//! Core types and I/O for the Hidden Species Richness (HSR) pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - Domain vector types: survey points, regions, infrastructure layers
//! - Geometry repair applied before any spatial predicate
//! - Native single-band GeoTIFF I/O

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{
    repair_geometry, repair_multi_polygon, repair_polygon, FeatureClass, FeatureKind, Region,
    RegionSet, SurveyPoint,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{
        repair_geometry, repair_multi_polygon, repair_polygon, FeatureClass, FeatureKind, Region,
        RegionSet, SurveyPoint,
    };
}
