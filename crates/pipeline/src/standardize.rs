//! Robust standardization
//!
//! Region-level accessibility and area distributions are skewed, with a
//! handful of very remote or very large provinces. Median/MAD
//! standardization keeps those outliers from distorting every other
//! region's score the way mean/stdev would.

use serde::Serialize;
use tracing::warn;

/// Center and spread used for a standardization pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RobustParams {
    pub median: f64,
    pub mad: f64,
}

/// Median over the finite entries of `values`; `None` when there are none
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = finite.len();
    Some(if n % 2 == 0 {
        (finite[n / 2 - 1] + finite[n / 2]) / 2.0
    } else {
        finite[n / 2]
    })
}

/// Median Absolute Deviation around `center`
pub fn mad(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| (v - center).abs())
        .collect();
    median(&deviations)
}

/// MAD-based Z-scores: Z = (value − median) / MAD.
///
/// Entries that are not finite (regions without data) stay NaN; they do
/// not participate in the median or the MAD. When the MAD is zero every
/// value with data is identical and the ratio is undefined; the chosen
/// policy is Z = 0 for all of them, logged as a data-quality warning.
pub fn robust_z(values: &[f64], metric: &str) -> (Vec<f64>, RobustParams) {
    let center = match median(values) {
        Some(m) => m,
        None => {
            warn!("no finite values to standardize for '{metric}'");
            return (
                vec![f64::NAN; values.len()],
                RobustParams {
                    median: f64::NAN,
                    mad: f64::NAN,
                },
            );
        }
    };
    let spread = mad(values, center).unwrap_or(0.0);

    let z = if spread == 0.0 {
        warn!("MAD is zero for '{metric}'; all Z-scores set to 0");
        values
            .iter()
            .map(|v| if v.is_finite() { 0.0 } else { f64::NAN })
            .collect()
    } else {
        values
            .iter()
            .map(|v| {
                if v.is_finite() {
                    (v - center) / spread
                } else {
                    f64::NAN
                }
            })
            .collect()
    };

    (
        z,
        RobustParams {
            median: center,
            mad: spread,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN]), None);
    }

    #[test]
    fn test_median_skips_nan() {
        assert_eq!(median(&[f64::NAN, 5.0, 1.0, f64::NAN, 3.0]), Some(3.0));
    }

    #[test]
    fn test_mad() {
        // median = 3, |dev| = [2, 1, 0, 1, 2], MAD = 1
        let m = mad(&[1.0, 2.0, 3.0, 4.0, 5.0], 3.0).unwrap();
        assert_relative_eq!(m, 1.0);
    }

    #[test]
    fn test_z_scores_are_zero_centered() {
        let values = vec![10.0, 20.0, 30.0, 45.0, 80.0];
        let (z, params) = robust_z(&values, "test");

        assert!(params.mad > 0.0);
        // By construction the median of the Z-scores is exactly 0.
        assert_relative_eq!(median(&z).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_mad_gives_zero_scores() {
        let values = vec![7.0, 7.0, 7.0];
        let (z, params) = robust_z(&values, "test");

        assert_eq!(params.mad, 0.0);
        assert!(z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nan_entries_stay_nan() {
        let values = vec![1.0, f64::NAN, 3.0, 5.0];
        let (z, _) = robust_z(&values, "test");

        assert!(z[1].is_nan());
        assert!(z[0].is_finite());
        assert!(z[3].is_finite());
    }
}
