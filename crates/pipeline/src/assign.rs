//! Point-to-region assignment
//!
//! Maps every survey point to exactly one biogeographic region. The
//! primary rule is polygon containment; any point that no region
//! contains (coastal samples, boundary precision artifacts) falls back
//! to the region with the nearest centroid, so downstream counting
//! always sees full coverage.

use geo::{BoundingRect, Contains, Distance, Euclidean};
use hsr_core::{Error, RegionSet, Result, SurveyPoint};

/// Outcome of assigning one point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Index of the region in the input `RegionSet`
    pub region: usize,
    /// Whether the nearest-centroid fallback was used
    pub via_fallback: bool,
}

/// Assign every point to a region.
///
/// Containment ties (a point inside more than one polygon) resolve to
/// the first matching region in input order. This tie-break is part of
/// the contract: results are deterministic for a fixed region order.
///
/// # Errors
/// [`Error::EmptyRegionSet`] if there are no regions to assign to.
pub fn assign_points(points: &[SurveyPoint], regions: &RegionSet) -> Result<Vec<Assignment>> {
    if regions.is_empty() {
        return Err(Error::EmptyRegionSet);
    }

    // Bounding boxes pre-filter the exact containment tests.
    let boxes: Vec<_> = regions
        .iter()
        .map(|r| r.geometry.bounding_rect())
        .collect();
    let centroids: Vec<_> = regions.iter().map(|r| r.centroid()).collect();

    let assignments = points
        .iter()
        .map(|sp| {
            let p = sp.point();

            let contained = regions.iter().enumerate().find(|(idx, region)| {
                let in_bbox = boxes[*idx]
                    .map(|b| {
                        p.x() >= b.min().x
                            && p.x() <= b.max().x
                            && p.y() >= b.min().y
                            && p.y() <= b.max().y
                    })
                    .unwrap_or(false);
                in_bbox && region.geometry.contains(&p)
            });

            match contained {
                Some((idx, _)) => Assignment {
                    region: idx,
                    via_fallback: false,
                },
                None => {
                    let nearest = centroids
                        .iter()
                        .enumerate()
                        .min_by(|(_, a), (_, b)| {
                            let da = Euclidean.distance(p, **a);
                            let db = Euclidean.distance(p, **b);
                            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .map(|(idx, _)| idx)
                        .unwrap_or(0);
                    Assignment {
                        region: nearest,
                        via_fallback: true,
                    }
                }
            }
        })
        .collect();

    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Polygon};
    use hsr_core::Region;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )
    }

    fn two_regions() -> RegionSet {
        RegionSet::new(vec![
            Region::new("west", square(0.0, 0.0, 10.0)),
            Region::new("east", square(10.0, 0.0, 10.0)),
        ])
    }

    #[test]
    fn test_containment_assignment() {
        let regions = two_regions();
        let points = vec![
            SurveyPoint::new(None, 5.0, 5.0),
            SurveyPoint::new(None, 15.0, 5.0),
        ];

        let result = assign_points(&points, &regions).unwrap();
        assert_eq!(result[0].region, 0);
        assert_eq!(result[1].region, 1);
        assert!(!result[0].via_fallback);
    }

    #[test]
    fn test_fallback_to_nearest_centroid() {
        let regions = two_regions();
        // Outside both polygons, closer to the east centroid (15, 5).
        let points = vec![SurveyPoint::new(None, 25.0, 5.0)];

        let result = assign_points(&points, &regions).unwrap();
        assert_eq!(result[0].region, 1);
        assert!(result[0].via_fallback);
    }

    #[test]
    fn test_total_coverage() {
        let regions = two_regions();
        let points: Vec<_> = (0..50)
            .map(|i| SurveyPoint::new(None, i as f64 * 2.0 - 20.0, i as f64 * 0.7 - 10.0))
            .collect();

        let result = assign_points(&points, &regions).unwrap();
        assert_eq!(result.len(), points.len());
        assert!(result.iter().all(|a| a.region < regions.len()));
    }

    #[test]
    fn test_island_point_contained_by_multipart_region() {
        use geo_types::MultiPolygon;

        // Coastal province with a detached island, plus an inland province
        // whose centroid is closer to the island than the coastal one's.
        let regions = RegionSet::new(vec![
            Region::new(
                "coastal",
                MultiPolygon::new(vec![square(0.0, 0.0, 10.0), square(40.0, 0.0, 4.0)]),
            ),
            Region::new("inland", square(20.0, 0.0, 10.0)),
        ]);
        let points = vec![SurveyPoint::new(None, 42.0, 2.0)];

        let result = assign_points(&points, &regions).unwrap();
        assert_eq!(result[0].region, 0);
        assert!(!result[0].via_fallback);
    }

    #[test]
    fn test_overlap_resolves_to_first_in_order() {
        let regions = RegionSet::new(vec![
            Region::new("a", square(0.0, 0.0, 10.0)),
            Region::new("b", square(0.0, 0.0, 10.0)), // identical polygon
        ]);
        let points = vec![SurveyPoint::new(None, 5.0, 5.0)];

        let result = assign_points(&points, &regions).unwrap();
        assert_eq!(result[0].region, 0);
    }

    #[test]
    fn test_empty_region_set_is_fatal() {
        let points = vec![SurveyPoint::new(None, 0.0, 0.0)];
        assert!(assign_points(&points, &RegionSet::default()).is_err());
    }
}
