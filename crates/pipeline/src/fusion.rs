//! Raster fusion
//!
//! Turns the per-region HSR table into a surface and blends it with the
//! human-footprint and climate-loss rasters into a single critical-areas
//! surface, then ranks regions by their median criticality. All rasters
//! use NaN for cells outside the data.

use std::collections::HashMap;

use geo::Contains;
use geo_types::Point;
use hsr_core::{Error, Raster, RegionSet, Result};
use tracing::warn;

use crate::compose::RegionStats;
use crate::standardize::median;

/// Climate projection scenario a loss raster stack belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Ssp245,
    Ssp585,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Ssp245 => "ssp245",
            Scenario::Ssp585 => "ssp585",
        }
    }
}

/// Blend weights for the critical-areas surface
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub hsr: f64,
    pub footprint: f64,
    pub loss: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            hsr: 0.33,
            footprint: 0.34,
            loss: 0.33,
        }
    }
}

impl FusionWeights {
    /// Weights must partition the blend: sum to 1 within 1e-6
    pub fn validate(&self) -> Result<()> {
        let sum = self.hsr + self.footprint + self.loss;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidParameter {
                name: "fusion weights",
                value: format!("{:.6}", sum),
                reason: "must sum to 1".to_string(),
            });
        }
        Ok(())
    }
}

/// One region's rank entry in the critical-areas ordering
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegionRank {
    pub region: String,
    pub median_critical: f64,
}

/// Empty grid covering `bounds` (min_x, min_y, max_x, max_y) at
/// `cell_size` map units, north-up
pub fn grid_from_bounds(bounds: (f64, f64, f64, f64), cell_size: f64) -> Result<Raster<f64>> {
    let (min_x, min_y, max_x, max_y) = bounds;
    if cell_size <= 0.0 || !cell_size.is_finite() {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: format!("{cell_size}"),
            reason: "must be a positive finite number".to_string(),
        });
    }

    let cols = ((max_x - min_x) / cell_size).ceil() as usize;
    let rows = ((max_y - min_y) / cell_size).ceil() as usize;
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::filled(rows, cols, f64::NAN);
    raster.set_transform(hsr_core::GeoTransform::new(
        min_x, max_y, cell_size, -cell_size,
    ));
    raster.set_nodata(Some(f64::NAN));
    Ok(raster)
}

/// Rasterize region membership onto `grid`: each cell gets the index of
/// the region containing its centroid, or -1 outside every region.
///
/// First containing region wins, same tie-break as point assignment.
pub fn rasterize_region_ids(regions: &RegionSet, grid: &Raster<f64>) -> Result<Raster<i32>> {
    if regions.is_empty() {
        return Err(Error::EmptyRegionSet);
    }

    let (rows, cols) = grid.shape();
    let mut ids: Raster<i32> = Raster::filled(rows, cols, -1);
    ids.set_transform(*grid.transform());

    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = grid.pixel_to_geo(col, row);
            let center = Point::new(x, y);
            for (idx, region) in regions.iter().enumerate() {
                if region.geometry.contains(&center) {
                    unsafe { ids.set_unchecked(row, col, idx as i32) };
                    break;
                }
            }
        }
    }

    Ok(ids)
}

/// Paint each region's HSR value over its cells; NaN outside all regions
pub fn rasterize_hsr(
    regions: &RegionSet,
    stats: &[RegionStats],
    grid: &Raster<f64>,
) -> Result<Raster<f64>> {
    if stats.len() != regions.len() {
        return Err(Error::SizeMismatch {
            er: regions.len(),
            ec: 1,
            ar: stats.len(),
            ac: 1,
        });
    }

    let ids = rasterize_region_ids(regions, grid)?;
    let (rows, cols) = grid.shape();
    let mut out = grid.like(f64::NAN);

    for row in 0..rows {
        for col in 0..cols {
            let id = unsafe { ids.get_unchecked(row, col) };
            if id >= 0 {
                unsafe { out.set_unchecked(row, col, stats[id as usize].hsr) };
            }
        }
    }

    Ok(out)
}

/// Bilinear resampling of `src` onto `target`'s grid.
///
/// The four surrounding source cells are weighted by proximity; weights
/// of NaN neighbors are dropped and the rest renormalized, so valid data
/// does not bleed NaN at the edge of coverage. A cell with no valid
/// neighbor at all stays NaN.
pub fn resample_bilinear(src: &Raster<f64>, target: &Raster<f64>) -> Raster<f64> {
    let (rows, cols) = target.shape();
    let (src_rows, src_cols) = src.shape();
    let mut out = target.like(f64::NAN);

    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = target.pixel_to_geo(col, row);
            // Fractional position in source cell-center space.
            let (fc, fr) = src.geo_to_pixel(x, y);
            let (fc, fr) = (fc - 0.5, fr - 0.5);

            let c0 = fc.floor();
            let r0 = fr.floor();
            let dx = fc - c0;
            let dy = fr - r0;

            let mut weighted = 0.0;
            let mut total_weight = 0.0;
            for (dr, dc, w) in [
                (0.0, 0.0, (1.0 - dx) * (1.0 - dy)),
                (0.0, 1.0, dx * (1.0 - dy)),
                (1.0, 0.0, (1.0 - dx) * dy),
                (1.0, 1.0, dx * dy),
            ] {
                let (sr, sc) = (r0 + dr, c0 + dc);
                if sr < 0.0 || sc < 0.0 || sr >= src_rows as f64 || sc >= src_cols as f64 {
                    continue;
                }
                let v = unsafe { src.get_unchecked(sr as usize, sc as usize) };
                if v.is_nan() || w == 0.0 {
                    continue;
                }
                weighted += v * w;
                total_weight += w;
            }

            if total_weight > 0.0 {
                unsafe { out.set_unchecked(row, col, weighted / total_weight) };
            }
        }
    }

    out
}

/// Rescale valid cells to [0, 1] by min-max.
///
/// A constant raster has no spread to rescale and passes through
/// unchanged with a warning. Idempotent on a raster already in [0, 1]
/// with min 0 and max 1.
pub fn normalize_minmax(raster: &Raster<f64>) -> Raster<f64> {
    let Some((min, max)) = raster.value_range() else {
        warn!("normalization skipped: raster has no valid cells");
        return raster.clone();
    };
    if min == max {
        warn!("normalization skipped: constant raster (all valid cells = {min})");
        return raster.clone();
    }

    let mut out = raster.clone();
    out.data_mut().mapv_inplace(|v| {
        if v.is_nan() {
            v
        } else {
            (v - min) / (max - min)
        }
    });
    out
}

/// Cell-wise sum of per-species loss rasters sharing one grid.
///
/// NaN cells are treated as zero loss unless every layer is NaN there,
/// in which case the sum stays NaN.
pub fn sum_loss_rasters(rasters: &[Raster<f64>]) -> Result<Raster<f64>> {
    let first = rasters
        .first()
        .ok_or_else(|| Error::MissingInput("loss raster stack is empty".to_string()))?;
    let (rows, cols) = first.shape();

    for r in &rasters[1..] {
        let (ar, ac) = r.shape();
        if (ar, ac) != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar,
                ac,
            });
        }
    }

    let mut out = first.like(f64::NAN);
    for row in 0..rows {
        for col in 0..cols {
            let mut sum = 0.0;
            let mut any_valid = false;
            for r in rasters {
                let v = unsafe { r.get_unchecked(row, col) };
                if !v.is_nan() {
                    sum += v;
                    any_valid = true;
                }
            }
            if any_valid {
                unsafe { out.set_unchecked(row, col, sum) };
            }
        }
    }

    Ok(out)
}

/// Weighted blend of the three normalized component surfaces on the loss
/// raster's grid.
///
/// HSR and footprint are resampled onto the loss grid first; each
/// component is min-max normalized before blending. A cell is NaN in
/// the output when any component is NaN there.
pub fn critical_areas(
    hsr: &Raster<f64>,
    footprint: &Raster<f64>,
    loss: &Raster<f64>,
    weights: &FusionWeights,
) -> Result<Raster<f64>> {
    weights.validate()?;

    let hsr_on_grid = normalize_minmax(&resample_bilinear(hsr, loss));
    let footprint_on_grid = normalize_minmax(&resample_bilinear(footprint, loss));
    let loss_norm = normalize_minmax(loss);

    let (rows, cols) = loss.shape();
    let mut out = loss.like(f64::NAN);

    for row in 0..rows {
        for col in 0..cols {
            let h = unsafe { hsr_on_grid.get_unchecked(row, col) };
            let f = unsafe { footprint_on_grid.get_unchecked(row, col) };
            let l = unsafe { loss_norm.get_unchecked(row, col) };
            if h.is_nan() || f.is_nan() || l.is_nan() {
                continue;
            }
            let blended = weights.hsr * h + weights.footprint * f + weights.loss * l;
            unsafe { out.set_unchecked(row, col, blended) };
        }
    }

    Ok(out)
}

/// Rank regions by the median of the critical surface over their cells,
/// highest first. Regions with no valid cells rank last with NaN.
pub fn region_priority_ranking(
    critical: &Raster<f64>,
    regions: &RegionSet,
) -> Result<Vec<RegionRank>> {
    let ids = rasterize_region_ids(regions, critical)?;
    let (rows, cols) = critical.shape();

    let mut per_region: HashMap<i32, Vec<f64>> = HashMap::new();
    for row in 0..rows {
        for col in 0..cols {
            let id = unsafe { ids.get_unchecked(row, col) };
            let v = unsafe { critical.get_unchecked(row, col) };
            if id >= 0 && !v.is_nan() {
                per_region.entry(id).or_default().push(v);
            }
        }
    }

    let mut ranking: Vec<RegionRank> = regions
        .iter()
        .enumerate()
        .map(|(idx, region)| {
            let med = per_region
                .get(&(idx as i32))
                .and_then(|vals| median(vals))
                .unwrap_or(f64::NAN);
            RegionRank {
                region: region.name.clone(),
                median_critical: med,
            }
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.median_critical
            .partial_cmp(&a.median_critical)
            .unwrap_or_else(|| {
                // NaN sorts after every number.
                if a.median_critical.is_nan() && !b.median_critical.is_nan() {
                    std::cmp::Ordering::Greater
                } else if !a.median_critical.is_nan() && b.median_critical.is_nan() {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
    });

    Ok(ranking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::{LineString, Polygon};
    use hsr_core::{GeoTransform, Region};

    fn square(x0: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x0, 0.0),
                (x0 + size, 0.0),
                (x0 + size, size),
                (x0, size),
                (x0, 0.0),
            ]),
            vec![],
        )
    }

    fn two_regions() -> RegionSet {
        RegionSet::new(vec![
            Region::new("west", square(0.0, 10.0)),
            Region::new("east", square(10.0, 10.0)),
        ])
    }

    fn stats_row(name: &str, hsr: f64) -> RegionStats {
        RegionStats {
            region: name.to_string(),
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
            hsr,
        }
    }

    #[test]
    fn test_grid_from_bounds() {
        let grid = grid_from_bounds((0.0, 0.0, 20.0, 10.0), 2.0).unwrap();
        assert_eq!(grid.shape(), (5, 10));
        assert_relative_eq!(grid.transform().origin_x, 0.0);
        assert_relative_eq!(grid.transform().origin_y, 10.0);
        assert!(grid_from_bounds((0.0, 0.0, 10.0, 10.0), 0.0).is_err());
    }

    #[test]
    fn test_rasterize_region_ids_and_outside() {
        let regions = two_regions();
        let grid = grid_from_bounds((0.0, 0.0, 30.0, 10.0), 2.0).unwrap();
        let ids = rasterize_region_ids(&regions, &grid).unwrap();

        // x=1 → west, x=11 → east, x=25 → outside.
        assert_eq!(ids.get(2, 0).unwrap(), 0);
        assert_eq!(ids.get(2, 5).unwrap(), 1);
        assert_eq!(ids.get(2, 12).unwrap(), -1);
    }

    #[test]
    fn test_rasterize_hsr_paints_region_values() {
        let regions = two_regions();
        let stats = vec![stats_row("west", 0.5), stats_row("east", 2.0)];
        let grid = grid_from_bounds((0.0, 0.0, 20.0, 10.0), 2.0).unwrap();

        let surface = rasterize_hsr(&regions, &stats, &grid).unwrap();
        assert_relative_eq!(surface.get(2, 1).unwrap(), 0.5);
        assert_relative_eq!(surface.get(2, 7).unwrap(), 2.0);
    }

    #[test]
    fn test_resample_identity_grid() {
        let mut src = Raster::filled(4, 4, 0.0);
        src.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        for row in 0..4 {
            for col in 0..4 {
                src.set(row, col, (row * 4 + col) as f64).unwrap();
            }
        }

        let out = resample_bilinear(&src, &src.like(f64::NAN));
        for row in 0..4 {
            for col in 0..4 {
                assert_relative_eq!(out.get(row, col).unwrap(), (row * 4 + col) as f64);
            }
        }
    }

    #[test]
    fn test_resample_interpolates_between_centers() {
        let mut src = Raster::filled(1, 2, 0.0);
        src.set_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        src.set(0, 0, 10.0).unwrap();
        src.set(0, 1, 20.0).unwrap();

        // One target cell centered exactly between the two source centers.
        let mut target = Raster::filled(1, 1, f64::NAN);
        target.set_transform(GeoTransform::new(0.5, 1.0, 1.0, -1.0));

        let out = resample_bilinear(&src, &target);
        assert_relative_eq!(out.get(0, 0).unwrap(), 15.0);
    }

    #[test]
    fn test_resample_renormalizes_around_nan() {
        let mut src = Raster::filled(1, 2, 0.0);
        src.set_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        src.set(0, 0, 10.0).unwrap();
        src.set(0, 1, f64::NAN).unwrap();

        let mut target = Raster::filled(1, 1, f64::NAN);
        target.set_transform(GeoTransform::new(0.5, 1.0, 1.0, -1.0));

        // The NaN neighbor's weight is dropped, so the valid one carries
        // the full weight instead of poisoning the cell.
        let out = resample_bilinear(&src, &target);
        assert_relative_eq!(out.get(0, 0).unwrap(), 10.0);
    }

    #[test]
    fn test_normalize_minmax_range_and_idempotence() {
        let mut raster = Raster::filled(1, 3, 0.0);
        raster.set(0, 0, 2.0).unwrap();
        raster.set(0, 1, 6.0).unwrap();
        raster.set(0, 2, 10.0).unwrap();

        let norm = normalize_minmax(&raster);
        assert_relative_eq!(norm.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(norm.get(0, 1).unwrap(), 0.5);
        assert_relative_eq!(norm.get(0, 2).unwrap(), 1.0);

        let again = normalize_minmax(&norm);
        for col in 0..3 {
            assert_relative_eq!(again.get(0, col).unwrap(), norm.get(0, col).unwrap());
        }
    }

    #[test]
    fn test_normalize_constant_passthrough() {
        let raster = Raster::filled(2, 2, 7.0);
        let norm = normalize_minmax(&raster);
        for row in 0..2 {
            for col in 0..2 {
                assert_relative_eq!(norm.get(row, col).unwrap(), 7.0);
            }
        }
    }

    #[test]
    fn test_sum_loss_rasters() {
        let mut a = Raster::filled(1, 2, 1.0);
        let mut b = Raster::filled(1, 2, 2.0);
        a.set(0, 1, f64::NAN).unwrap();
        b.set(0, 1, f64::NAN).unwrap();

        let sum = sum_loss_rasters(&[a, b]).unwrap();
        assert_relative_eq!(sum.get(0, 0).unwrap(), 3.0);
        assert!(sum.get(0, 1).unwrap().is_nan());

        let mismatched = vec![Raster::filled(1, 2, 0.0), Raster::filled(2, 2, 0.0)];
        assert!(matches!(
            sum_loss_rasters(&mismatched),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_fusion_weights_must_sum_to_one() {
        assert!(FusionWeights::default().validate().is_ok());
        let bad = FusionWeights {
            hsr: 0.5,
            footprint: 0.5,
            loss: 0.5,
        };
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_critical_areas_blend() {
        let transform = GeoTransform::new(0.0, 2.0, 1.0, -1.0);
        let mut hsr = Raster::filled(2, 2, 0.0);
        let mut footprint = Raster::filled(2, 2, 0.0);
        let mut loss = Raster::filled(2, 2, 0.0);
        for r in [&mut hsr, &mut footprint, &mut loss] {
            r.set_transform(transform);
        }
        // A gradient in every component; corner (1,1) maximal everywhere.
        for row in 0..2 {
            for col in 0..2 {
                let v = (row * 2 + col) as f64;
                hsr.set(row, col, v).unwrap();
                footprint.set(row, col, v * 10.0).unwrap();
                loss.set(row, col, v * 100.0).unwrap();
            }
        }

        let out = critical_areas(&hsr, &footprint, &loss, &FusionWeights::default()).unwrap();
        // All components normalized to the same gradient, so the blend
        // equals that gradient regardless of weight split.
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(out.get(1, 1).unwrap(), 1.0);
        assert!(out.get(0, 1).unwrap() > 0.0 && out.get(0, 1).unwrap() < 1.0);
    }

    #[test]
    fn test_region_priority_ranking_orders_descending() {
        let regions = two_regions();
        let mut critical = grid_from_bounds((0.0, 0.0, 20.0, 10.0), 2.0).unwrap();
        let (rows, cols) = critical.shape();
        for row in 0..rows {
            for col in 0..cols {
                let v = if col < 5 { 0.2 } else { 0.9 };
                critical.set(row, col, v).unwrap();
            }
        }

        let ranking = region_priority_ranking(&critical, &regions).unwrap();
        assert_eq!(ranking[0].region, "east");
        assert_relative_eq!(ranking[0].median_critical, 0.9);
        assert_eq!(ranking[1].region, "west");
        assert_relative_eq!(ranking[1].median_critical, 0.2);
    }
}
