//! Per-species conservation priority scoring
//!
//! Four criteria, equally weighted at 25%: IUCN threat status, projected
//! suitable-area loss under the chosen scenario, extent of occurrence,
//! and overlap with the human footprint. Missing data never drops a
//! species; each absent criterion falls back to the neutral score of 3.

use serde::{Deserialize, Serialize};

use crate::fusion::Scenario;

const NEUTRAL_SCORE: u8 = 3;
const CRITERION_WEIGHT: f64 = 0.25;

/// Raw input row for one species, straight from the assessment table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub species: String,
    pub iucn_status: Option<String>,
    pub area_loss_ssp245: Option<f64>,
    pub area_loss_ssp585: Option<f64>,
    /// Extent of occurrence in km²
    #[serde(alias = "eoo", alias = "terrestrial_eoo")]
    pub eoo_km2: Option<f64>,
    /// Percentage of range overlapping the human footprint
    pub human_footprint: Option<f64>,
}

/// Five-level priority category derived from the final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriorityCategory {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl PriorityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityCategory::VeryLow => "very_low",
            PriorityCategory::Low => "low",
            PriorityCategory::Medium => "medium",
            PriorityCategory::High => "high",
            PriorityCategory::VeryHigh => "very_high",
        }
    }
}

/// Scored species row for one scenario, with per-criterion contributions
#[derive(Debug, Clone, Serialize)]
pub struct SpeciesPriority {
    pub species: String,
    pub iucn_score: u8,
    pub area_loss_score: u8,
    pub eoo_score: u8,
    pub human_footprint_score: u8,
    pub final_score: f64,
    /// Relative contribution of each criterion to the final score, in %
    pub iucn_contribution: f64,
    pub area_loss_contribution: f64,
    pub eoo_contribution: f64,
    pub human_footprint_contribution: f64,
    pub category: PriorityCategory,
    pub rank: usize,
}

/// One species' movement between the two scenario rankings
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioShift {
    pub species: String,
    pub score_ssp245: f64,
    pub score_ssp585: f64,
    /// SSP585 score minus SSP245 score
    pub score_difference: f64,
    pub rank_ssp245: usize,
    pub rank_ssp585: usize,
    /// Positive when the species climbs the ranking under SSP585
    pub rank_change: i64,
}

/// IUCN threat status score. DD scores above LC: data deficiency is
/// treated as more worrying than a confirmed least-concern assessment.
pub fn iucn_score(status: Option<&str>) -> u8 {
    let Some(status) = status else {
        return NEUTRAL_SCORE;
    };
    match status.trim().to_uppercase().as_str() {
        "CR" => 7,
        "EN" => 6,
        "VU" => 5,
        "NT" => 4,
        "DD" => 4,
        "LC" => 3,
        "NE" => 1,
        _ => NEUTRAL_SCORE,
    }
}

/// Suitable-area loss score, banded on the loss percentage
pub fn area_loss_score(percentage: Option<f64>) -> u8 {
    banded_percentage(percentage)
}

/// Extent-of-occurrence score: the smaller the range, the higher the
/// priority. Thresholds follow the IUCN criterion B bands.
pub fn eoo_score(eoo_km2: Option<f64>) -> u8 {
    let Some(eoo) = eoo_km2.filter(|v| v.is_finite()) else {
        return NEUTRAL_SCORE;
    };
    if eoo < 100.0 {
        5
    } else if eoo < 5000.0 {
        4
    } else if eoo < 20000.0 {
        3
    } else if eoo < 50000.0 {
        2
    } else {
        1
    }
}

/// Human-footprint overlap score, same bands as area loss
pub fn human_footprint_score(overlap: Option<f64>) -> u8 {
    banded_percentage(overlap)
}

fn banded_percentage(percentage: Option<f64>) -> u8 {
    let Some(pct) = percentage.filter(|v| v.is_finite()) else {
        return NEUTRAL_SCORE;
    };
    if pct > 80.0 {
        5
    } else if pct > 60.0 {
        4
    } else if pct > 40.0 {
        3
    } else if pct > 20.0 {
        2
    } else {
        1
    }
}

/// Score every species under `scenario` and rank them highest-first.
///
/// Categories come from five equal-width bins over the observed score
/// range; with identical scores everywhere the single bin collapses to
/// `Medium`.
pub fn score_species(records: &[SpeciesRecord], scenario: Scenario) -> Vec<SpeciesPriority> {
    let mut scored: Vec<SpeciesPriority> = records
        .iter()
        .map(|r| {
            let area_loss = match scenario {
                Scenario::Ssp245 => r.area_loss_ssp245,
                Scenario::Ssp585 => r.area_loss_ssp585,
            };

            let iucn = iucn_score(r.iucn_status.as_deref());
            let loss = area_loss_score(area_loss);
            let eoo = eoo_score(r.eoo_km2);
            let footprint = human_footprint_score(r.human_footprint);

            let final_score = CRITERION_WEIGHT
                * (iucn as f64 + loss as f64 + eoo as f64 + footprint as f64);
            let contribution =
                |score: u8| score as f64 * CRITERION_WEIGHT / final_score * 100.0;

            SpeciesPriority {
                species: r.species.clone(),
                iucn_score: iucn,
                area_loss_score: loss,
                eoo_score: eoo,
                human_footprint_score: footprint,
                final_score,
                iucn_contribution: contribution(iucn),
                area_loss_contribution: contribution(loss),
                eoo_contribution: contribution(eoo),
                human_footprint_contribution: contribution(footprint),
                category: PriorityCategory::Medium,
                rank: 0,
            }
        })
        .collect();

    if scored.is_empty() {
        return scored;
    }

    let min = scored.iter().map(|s| s.final_score).fold(f64::INFINITY, f64::min);
    let max = scored
        .iter()
        .map(|s| s.final_score)
        .fold(f64::NEG_INFINITY, f64::max);

    for row in &mut scored {
        row.category = categorize(row.final_score, min, max);
    }

    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (idx, row) in scored.iter_mut().enumerate() {
        row.rank = idx + 1;
    }

    scored
}

fn categorize(score: f64, min: f64, max: f64) -> PriorityCategory {
    if max == min {
        return PriorityCategory::Medium;
    }
    let bin = ((score - min) / (max - min) * 5.0).floor().min(4.0) as usize;
    match bin {
        0 => PriorityCategory::VeryLow,
        1 => PriorityCategory::Low,
        2 => PriorityCategory::Medium,
        3 => PriorityCategory::High,
        _ => PriorityCategory::VeryHigh,
    }
}

/// Score the table under both scenarios and report, per species, the
/// score difference (SSP585 − SSP245) and the rank movement. Sorted by
/// score difference, largest increase first.
pub fn compare_scenarios(records: &[SpeciesRecord]) -> Vec<ScenarioShift> {
    let ssp245 = score_species(records, Scenario::Ssp245);
    let ssp585 = score_species(records, Scenario::Ssp585);

    let mut shifts: Vec<ScenarioShift> = records
        .iter()
        .filter_map(|r| {
            let a = ssp245.iter().find(|s| s.species == r.species)?;
            let b = ssp585.iter().find(|s| s.species == r.species)?;
            Some(ScenarioShift {
                species: r.species.clone(),
                score_ssp245: a.final_score,
                score_ssp585: b.final_score,
                score_difference: b.final_score - a.final_score,
                rank_ssp245: a.rank,
                rank_ssp585: b.rank,
                rank_change: a.rank as i64 - b.rank as i64,
            })
        })
        .collect();

    shifts.sort_by(|a, b| {
        b.score_difference
            .partial_cmp(&a.score_difference)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    shifts
}
