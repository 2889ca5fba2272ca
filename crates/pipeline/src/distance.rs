//! Neighbor-limited distance engine
//!
//! For every genetic-sequence point, computes the minimum distance to the
//! nearest road, city, and protected-area feature. A full cross-distance
//! matrix is quadratic and infeasible, so the candidate set for each
//! region is limited to features whose envelope intersects the region
//! plus its topological neighbors. If the local subset is empty the
//! engine silently widens to the full feature class for that region's
//! points: a cost fallback, never a correctness one.

use geo::{BoundingRect, Distance, Euclidean};
use geo_types::{Geometry, Point};
use hsr_core::{Error, FeatureClass, RegionSet, Result, SurveyPoint};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::adjacency::RegionAdjacency;
use crate::assign::Assignment;
use crate::maybe_rayon::*;

/// Minimum distances from one point to each infrastructure class, in km
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDistances {
    pub road_km: f64,
    pub city_km: f64,
    pub protected_km: f64,
}

/// Tuning parameters for the distance engine
#[derive(Debug, Clone)]
pub struct DistanceParams {
    /// Points processed per batch within a region. Affects throughput
    /// only, never results.
    pub batch_size: usize,
    /// Linear units of the analysis frame per kilometer
    pub units_per_km: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            batch_size: 512,
            units_per_km: 1000.0,
        }
    }
}

/// One feature's envelope in the R-tree
struct EnvelopeItem {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for EnvelopeItem {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Spatial index over one feature class
struct FeatureIndex<'a> {
    class: &'a FeatureClass,
    tree: RTree<EnvelopeItem>,
}

impl<'a> FeatureIndex<'a> {
    fn build(class: &'a FeatureClass) -> Result<Self> {
        if class.is_empty() {
            return Err(Error::MissingInput(format!(
                "feature layer '{}' has no geometries",
                class.kind.as_str()
            )));
        }

        let items: Vec<EnvelopeItem> = class
            .geometries
            .iter()
            .enumerate()
            .filter_map(|(index, geom)| {
                geom.bounding_rect().map(|rect| EnvelopeItem {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Ok(Self {
            class,
            tree: RTree::bulk_load(items),
        })
    }

    /// Feature indices whose envelope intersects the query envelope.
    /// Empty result means the caller must widen to the global set.
    fn candidates(&self, envelope: &AABB<[f64; 2]>) -> Vec<usize> {
        self.tree
            .locate_in_envelope_intersecting(envelope)
            .map(|item| item.index)
            .collect()
    }

    fn min_distance(&self, point: &Point<f64>, candidates: &[usize]) -> f64 {
        candidates
            .iter()
            .map(|&i| geometry_distance(point, &self.class.geometries[i]))
            .fold(f64::INFINITY, f64::min)
    }

    fn min_distance_global(&self, point: &Point<f64>) -> f64 {
        self.class
            .geometries
            .iter()
            .map(|g| geometry_distance(point, g))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Euclidean distance from a point to any supported geometry, in frame units
fn geometry_distance(point: &Point<f64>, geom: &Geometry<f64>) -> f64 {
    match geom {
        Geometry::Point(g) => Euclidean.distance(*point, *g),
        Geometry::MultiPoint(g) => g
            .0
            .iter()
            .map(|q| Euclidean.distance(*point, *q))
            .fold(f64::INFINITY, f64::min),
        Geometry::Line(g) => Euclidean.distance(point, g),
        Geometry::LineString(g) => Euclidean.distance(point, g),
        Geometry::MultiLineString(g) => g
            .0
            .iter()
            .map(|ls| Euclidean.distance(point, ls))
            .fold(f64::INFINITY, f64::min),
        Geometry::Polygon(g) => Euclidean.distance(point, g),
        Geometry::MultiPolygon(g) => g
            .0
            .iter()
            .map(|p| Euclidean.distance(point, p))
            .fold(f64::INFINITY, f64::min),
        _ => f64::INFINITY,
    }
}

/// Envelope covering a region and all its neighbors
fn neighborhood_envelope(
    regions: &RegionSet,
    adjacency: &RegionAdjacency,
    region: usize,
) -> Option<AABB<[f64; 2]>> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    let indices = std::iter::once(region).chain(adjacency.neighbors(region).iter().copied());
    for idx in indices {
        if let Some(rect) = regions.get(idx).and_then(|r| r.geometry.bounding_rect()) {
            min_x = min_x.min(rect.min().x);
            min_y = min_y.min(rect.min().y);
            max_x = max_x.max(rect.max().x);
            max_y = max_y.max(rect.max().y);
        }
    }

    (min_x <= max_x).then(|| AABB::from_corners([min_x, min_y], [max_x, max_y]))
}

/// Compute per-point minimum distances to roads, cities and protected areas.
///
/// Regions are independent given the precomputed adjacency and feature
/// indexes, so they are processed as a parallel map; each task returns
/// `(point index, distances)` pairs that are scattered into a single
/// position-indexed output, which keeps accumulation contention-free.
pub fn nearest_distances(
    points: &[SurveyPoint],
    assignments: &[Assignment],
    regions: &RegionSet,
    adjacency: &RegionAdjacency,
    roads: &FeatureClass,
    cities: &FeatureClass,
    protected: &FeatureClass,
    params: &DistanceParams,
) -> Result<Vec<PointDistances>> {
    if points.len() != assignments.len() {
        return Err(Error::Algorithm(format!(
            "{} points but {} assignments",
            points.len(),
            assignments.len()
        )));
    }

    let road_index = FeatureIndex::build(roads)?;
    let city_index = FeatureIndex::build(cities)?;
    let protected_index = FeatureIndex::build(protected)?;

    // Group point indices by region so each region is one unit of work.
    let mut by_region: Vec<Vec<usize>> = vec![Vec::new(); regions.len()];
    for (point_idx, assignment) in assignments.iter().enumerate() {
        by_region[assignment.region].push(point_idx);
    }

    let tasks: Vec<(usize, Vec<usize>)> = by_region
        .into_iter()
        .enumerate()
        .filter(|(_, idxs)| !idxs.is_empty())
        .collect();

    let scale = params.units_per_km;
    let batch = params.batch_size.max(1);

    let computed: Vec<(usize, PointDistances)> = tasks
        .into_par_iter()
        .flat_map(|(region_idx, point_idxs)| {
            let envelope = neighborhood_envelope(regions, adjacency, region_idx);

            let local =
                |index: &FeatureIndex| -> Vec<usize> {
                    envelope
                        .as_ref()
                        .map(|env| index.candidates(env))
                        .unwrap_or_default()
                };

            let road_local = local(&road_index);
            let city_local = local(&city_index);
            let protected_local = local(&protected_index);

            let mut out = Vec::with_capacity(point_idxs.len());
            for chunk in point_idxs.chunks(batch) {
                for &point_idx in chunk {
                    let p = points[point_idx].point();

                    let road = if road_local.is_empty() {
                        road_index.min_distance_global(&p)
                    } else {
                        road_index.min_distance(&p, &road_local)
                    };
                    let city = if city_local.is_empty() {
                        city_index.min_distance_global(&p)
                    } else {
                        city_index.min_distance(&p, &city_local)
                    };
                    let prot = if protected_local.is_empty() {
                        protected_index.min_distance_global(&p)
                    } else {
                        protected_index.min_distance(&p, &protected_local)
                    };

                    out.push((
                        point_idx,
                        PointDistances {
                            road_km: road / scale,
                            city_km: city / scale,
                            protected_km: prot / scale,
                        },
                    ));
                }
            }
            out
        })
        .collect();

    let mut result = vec![
        PointDistances {
            road_km: f64::NAN,
            city_km: f64::NAN,
            protected_km: f64::NAN,
        };
        points.len()
    ];
    for (point_idx, distances) in computed {
        result[point_idx] = distances;
    }

    Ok(result)
}

/// Brute-force distances against the full feature classes.
///
/// Reference implementation used to verify that the neighbor-limited
/// search returns identical results.
pub fn global_distances(
    points: &[SurveyPoint],
    roads: &FeatureClass,
    cities: &FeatureClass,
    protected: &FeatureClass,
    params: &DistanceParams,
) -> Result<Vec<PointDistances>> {
    let road_index = FeatureIndex::build(roads)?;
    let city_index = FeatureIndex::build(cities)?;
    let protected_index = FeatureIndex::build(protected)?;
    let scale = params.units_per_km;

    Ok(points
        .iter()
        .map(|sp| {
            let p = sp.point();
            PointDistances {
                road_km: road_index.min_distance_global(&p) / scale,
                city_km: city_index.min_distance_global(&p) / scale,
                protected_km: protected_index.min_distance_global(&p) / scale,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::assign_points;
    use geo_types::{LineString, Polygon};
    use hsr_core::{FeatureKind, Region};

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

    fn setup() -> (RegionSet, FeatureClass, FeatureClass, FeatureClass) {
        let regions = RegionSet::new(vec![
            Region::new("west", square(0.0, 0.0, 10_000.0)),
            Region::new("east", square(10_000.0, 0.0, 10_000.0)),
        ]);

        let roads = FeatureClass::new(
            FeatureKind::Roads,
            vec![Geometry::LineString(LineString::from(vec![
                (0.0, 5_000.0),
                (20_000.0, 5_000.0),
            ]))],
        );
        let cities = FeatureClass::new(
            FeatureKind::Cities,
            vec![
                Geometry::Point(Point::new(1_000.0, 1_000.0)),
                Geometry::Point(Point::new(19_000.0, 1_000.0)),
            ],
        );
        let protected = FeatureClass::new(
            FeatureKind::ProtectedAreas,
            vec![Geometry::Polygon(square(4_000.0, 4_000.0, 2_000.0))],
        );

        (regions, roads, cities, protected)
    }

    #[test]
    fn test_distances_in_kilometers() {
        let (regions, roads, cities, protected) = setup();
        let adjacency = RegionAdjacency::build(&regions);
        let points = vec![SurveyPoint::new(None, 1_000.0, 1_000.0)];
        let assignments = assign_points(&points, &regions).unwrap();

        let result = nearest_distances(
            &points,
            &assignments,
            &regions,
            &adjacency,
            &roads,
            &cities,
            &protected,
            &DistanceParams::default(),
        )
        .unwrap();

        // 4 km straight down to the road line, on top of the city point.
        assert!((result[0].road_km - 4.0).abs() < 1e-9);
        assert!(result[0].city_km.abs() < 1e-9);
        assert!(result[0].protected_km > 0.0);
    }

    #[test]
    fn test_local_matches_global() {
        let (regions, roads, cities, protected) = setup();
        let adjacency = RegionAdjacency::build(&regions);
        let points: Vec<_> = (0..40)
            .map(|i| SurveyPoint::new(None, 250.0 + i as f64 * 490.0, 300.0 + i as f64 * 230.0))
            .collect();
        let assignments = assign_points(&points, &regions).unwrap();
        let params = DistanceParams::default();

        let local = nearest_distances(
            &points,
            &assignments,
            &regions,
            &adjacency,
            &roads,
            &cities,
            &protected,
            &params,
        )
        .unwrap();
        let global = global_distances(&points, &roads, &cities, &protected, &params).unwrap();

        for (l, g) in local.iter().zip(global.iter()) {
            assert!((l.road_km - g.road_km).abs() < 1e-9);
            assert!((l.city_km - g.city_km).abs() < 1e-9);
            assert!((l.protected_km - g.protected_km).abs() < 1e-9);
        }
    }

    #[test]
    fn test_distances_non_negative() {
        let (regions, roads, cities, protected) = setup();
        let adjacency = RegionAdjacency::build(&regions);
        let points: Vec<_> = (0..20)
            .map(|i| SurveyPoint::new(None, i as f64 * 1_000.0, i as f64 * 700.0))
            .collect();
        let assignments = assign_points(&points, &regions).unwrap();

        let result = nearest_distances(
            &points,
            &assignments,
            &regions,
            &adjacency,
            &roads,
            &cities,
            &protected,
            &DistanceParams::default(),
        )
        .unwrap();

        for d in &result {
            assert!(d.road_km >= 0.0);
            assert!(d.city_km >= 0.0);
            assert!(d.protected_km >= 0.0);
        }
    }

    #[test]
    fn test_empty_feature_class_is_missing_input() {
        let (regions, roads, cities, _) = setup();
        let adjacency = RegionAdjacency::build(&regions);
        let empty = FeatureClass::new(FeatureKind::ProtectedAreas, vec![]);
        let points = vec![SurveyPoint::new(None, 1.0, 1.0)];
        let assignments = assign_points(&points, &regions).unwrap();

        let result = nearest_distances(
            &points,
            &assignments,
            &regions,
            &adjacency,
            &roads,
            &cities,
            &empty,
            &DistanceParams::default(),
        );
        assert!(matches!(result, Err(Error::MissingInput(_))));
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        let (regions, roads, cities, protected) = setup();
        let adjacency = RegionAdjacency::build(&regions);
        let points: Vec<_> = (0..30)
            .map(|i| SurveyPoint::new(None, i as f64 * 600.0, 2_000.0))
            .collect();
        let assignments = assign_points(&points, &regions).unwrap();

        let small = DistanceParams {
            batch_size: 1,
            ..Default::default()
        };
        let large = DistanceParams {
            batch_size: 10_000,
            ..Default::default()
        };

        let a = nearest_distances(
            &points, &assignments, &regions, &adjacency, &roads, &cities, &protected, &small,
        )
        .unwrap();
        let b = nearest_distances(
            &points, &assignments, &regions, &adjacency, &roads, &cities, &protected, &large,
        )
        .unwrap();

        assert_eq!(a, b);
    }
}
