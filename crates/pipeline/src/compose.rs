//! Per-region statistics assembly and HSR composition
//!
//! Each stage takes the current record set and returns a new, enriched
//! one; nothing mutates shared state between stages. Left-join semantics
//! apply throughout: a region absent from some source contributes a zero
//! count or NaN metric for that stage, never an error, so every region
//! always has a row.

use hsr_core::{Error, RegionSet, Result, SurveyPoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::assign::Assignment;
use crate::distance::PointDistances;
use crate::standardize::{median, robust_z};

/// Weights for the Z-score adjustment term of the HSR formula
#[derive(Debug, Clone, Copy)]
pub struct HsrWeights {
    pub accessibility: f64,
    pub size: f64,
}

impl Default for HsrWeights {
    fn default() -> Self {
        Self {
            accessibility: 0.2,
            size: 0.2,
        }
    }
}

/// One region's accumulated statistics.
///
/// Built incrementally: counts, then distances, then Z-scores, then the
/// final index. NaN marks metrics a region has no data for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionStats {
    pub region: String,
    pub hidden_species: usize,
    /// Distinct lineage identifiers, sorted, semicolon-joined for output
    pub species_ids: String,
    pub sequences: usize,
    pub median_road_km: f64,
    pub median_city_km: f64,
    pub median_protected_km: f64,
    /// Mean of the three per-region median distances
    pub accessibility: f64,
    pub log_accessibility: f64,
    pub area_km2: f64,
    pub log_area: f64,
    pub z_accessibility: f64,
    pub z_area: f64,
    pub hsr: f64,
}

/// Start a record set: one row per region with its area, everything else
/// empty
pub fn init_stats(regions: &RegionSet) -> Vec<RegionStats> {
    regions
        .iter()
        .map(|r| RegionStats {
            region: r.name.clone(),
            hidden_species: 0,
            species_ids: String::new(),
            sequences: 0,
            median_road_km: f64::NAN,
            median_city_km: f64::NAN,
            median_protected_km: f64::NAN,
            accessibility: f64::NAN,
            log_accessibility: f64::NAN,
            area_km2: f64::NAN,
            log_area: f64::NAN,
            z_accessibility: f64::NAN,
            z_area: f64::NAN,
            hsr: f64::NAN,
        })
        .collect()
}

/// Attach planar polygon areas in km²
pub fn attach_areas(stats: &[RegionStats], regions: &RegionSet) -> Vec<RegionStats> {
    stats
        .iter()
        .zip(regions.iter())
        .map(|(row, region)| {
            let area = region.area_km2();
            RegionStats {
                area_km2: area,
                log_area: area.ln_1p(),
                ..row.clone()
            }
        })
        .collect()
}

/// Count distinct hidden-species lineages per region
pub fn count_hidden_species(
    stats: &[RegionStats],
    points: &[SurveyPoint],
    assignments: &[Assignment],
) -> Vec<RegionStats> {
    let mut per_region: Vec<BTreeSet<String>> = vec![BTreeSet::new(); stats.len()];
    for (point, assignment) in points.iter().zip(assignments) {
        if let Some(id) = &point.id {
            per_region[assignment.region].insert(id.clone());
        }
    }

    stats
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let ids = &per_region[idx];
            RegionStats {
                hidden_species: ids.len(),
                species_ids: ids.iter().cloned().collect::<Vec<_>>().join(";"),
                ..row.clone()
            }
        })
        .collect()
}

/// Count genetic sequences per region
pub fn count_sequences(stats: &[RegionStats], assignments: &[Assignment]) -> Vec<RegionStats> {
    let mut counts = vec![0usize; stats.len()];
    for assignment in assignments {
        counts[assignment.region] += 1;
    }

    stats
        .iter()
        .enumerate()
        .map(|(idx, row)| RegionStats {
            sequences: counts[idx],
            ..row.clone()
        })
        .collect()
}

/// Attach per-region median distances and the derived mean accessibility.
///
/// Accessibility composes median-of-points then mean-of-medians: each
/// infrastructure class gets the median over the region's points, and
/// the region's accessibility is the arithmetic mean of those three
/// medians.
pub fn attach_distances(
    stats: &[RegionStats],
    assignments: &[Assignment],
    distances: &[PointDistances],
) -> Vec<RegionStats> {
    let mut roads: Vec<Vec<f64>> = vec![Vec::new(); stats.len()];
    let mut cities: Vec<Vec<f64>> = vec![Vec::new(); stats.len()];
    let mut protected: Vec<Vec<f64>> = vec![Vec::new(); stats.len()];

    for (assignment, d) in assignments.iter().zip(distances) {
        roads[assignment.region].push(d.road_km);
        cities[assignment.region].push(d.city_km);
        protected[assignment.region].push(d.protected_km);
    }

    stats
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let road = median(&roads[idx]).unwrap_or(f64::NAN);
            let city = median(&cities[idx]).unwrap_or(f64::NAN);
            let prot = median(&protected[idx]).unwrap_or(f64::NAN);
            let accessibility = (road + city + prot) / 3.0;

            RegionStats {
                median_road_km: road,
                median_city_km: city,
                median_protected_km: prot,
                accessibility,
                log_accessibility: accessibility.ln_1p(),
                ..row.clone()
            }
        })
        .collect()
}

/// Standardize log-accessibility and log-area into robust Z-scores
pub fn attach_z_scores(stats: &[RegionStats]) -> Vec<RegionStats> {
    let log_access: Vec<f64> = stats.iter().map(|r| r.log_accessibility).collect();
    let log_area: Vec<f64> = stats.iter().map(|r| r.log_area).collect();

    let (z_access, _) = robust_z(&log_access, "log_accessibility");
    let (z_area, _) = robust_z(&log_area, "log_area");

    stats
        .iter()
        .enumerate()
        .map(|(idx, row)| RegionStats {
            z_accessibility: z_access[idx],
            z_area: z_area[idx],
            ..row.clone()
        })
        .collect()
}

/// Compose the final index:
///
/// ```text
/// HSR = S / ln(N + 1) * (1 + w_a * Z_accessibility + w_s * Z_area)
/// ```
///
/// Regions with no sequences and no species score exactly 0. A region
/// claiming hidden species without a single supporting sequence is a
/// contradiction in the inputs and fails the run rather than being
/// divided through.
pub fn compose_hsr(stats: &[RegionStats], weights: &HsrWeights) -> Result<Vec<RegionStats>> {
    stats
        .iter()
        .map(|row| {
            let hsr = if row.sequences == 0 {
                if row.hidden_species > 0 {
                    return Err(Error::DataIntegrity {
                        region: row.region.clone(),
                        reason: format!(
                            "{} hidden species recorded with zero sequences",
                            row.hidden_species
                        ),
                    });
                }
                0.0
            } else {
                let base = row.hidden_species as f64 / ((row.sequences as f64) + 1.0).ln();
                let za = if row.z_accessibility.is_finite() {
                    row.z_accessibility
                } else {
                    0.0
                };
                let zs = if row.z_area.is_finite() { row.z_area } else { 0.0 };
                base * (1.0 + weights.accessibility * za + weights.size * zs)
            };

            Ok(RegionStats {
                hsr,
                ..row.clone()
            })
        })
        .collect()
}
