//! # HSR Pipeline
//!
//! Analysis stages for the Hidden Species Richness index.
//!
//! ## Stages
//!
//! - **assign**: point-to-region assignment with centroid fallback
//! - **adjacency**: region neighbor relation
//! - **distance**: neighbor-limited nearest-feature distances
//! - **cache**: content-addressed cache of the distance intermediate
//! - **standardize**: median/MAD robust Z-scores
//! - **compose**: per-region statistics and the HSR index
//! - **fusion**: rasterization, resampling and critical-areas blending
//! - **priority**: per-species conservation priority scoring

pub mod adjacency;
pub mod assign;
pub mod cache;
pub mod compose;
pub mod distance;
pub mod fusion;
pub mod priority;
pub mod standardize;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::adjacency::RegionAdjacency;
    pub use crate::assign::{assign_points, Assignment};
    pub use crate::cache::DistanceCache;
    pub use crate::compose::{
        attach_areas, attach_distances, attach_z_scores, compose_hsr, count_hidden_species,
        count_sequences, init_stats, HsrWeights, RegionStats,
    };
    pub use crate::distance::{
        global_distances, nearest_distances, DistanceParams, PointDistances,
    };
    pub use crate::fusion::{
        critical_areas, grid_from_bounds, normalize_minmax, rasterize_hsr,
        rasterize_region_ids, region_priority_ranking, resample_bilinear, sum_loss_rasters,
        FusionWeights, RegionRank, Scenario,
    };
    pub use crate::priority::{
        compare_scenarios, score_species, PriorityCategory, ScenarioShift, SpeciesPriority,
        SpeciesRecord,
    };
    pub use crate::standardize::{mad, median, robust_z, RobustParams};
    pub use hsr_core::prelude::*;
}
