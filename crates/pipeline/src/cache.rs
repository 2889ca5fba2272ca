//! Content-addressed disk cache for the distance intermediate
//!
//! The distance computation is the dominant cost of a run and its result
//! is reused across reruns, so it is cached to disk. The cache key is a
//! stable hash over the bit patterns of every point and feature
//! coordinate: change any input and the key changes, which closes the
//! staleness gap an existence-only file check would leave open.

use geo_types::{Coord, Geometry};
use hsr_core::{FeatureClass, Result, SurveyPoint};
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::distance::PointDistances;

/// Disk cache rooted at a directory
#[derive(Debug, Clone)]
pub struct DistanceCache {
    dir: PathBuf,
}

impl DistanceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Content hash over the full distance-engine input.
    ///
    /// The unit scale participates because it multiplies every stored
    /// value; batch size does not, it never changes results.
    pub fn key(points: &[SurveyPoint], features: &[&FeatureClass], units_per_km: f64) -> String {
        let mut hasher = FxHasher::default();

        hasher.write_u64(units_per_km.to_bits());
        hasher.write_usize(points.len());
        for p in points {
            hasher.write_u64(p.x.to_bits());
            hasher.write_u64(p.y.to_bits());
        }

        for class in features {
            hasher.write(class.kind.as_str().as_bytes());
            hasher.write_usize(class.len());
            for geom in &class.geometries {
                hash_geometry(&mut hasher, geom);
            }
        }

        format!("{:016x}", hasher.finish())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("distances-{key}.json"))
    }

    /// Cache hit returns the stored distances; any read or parse failure
    /// is treated as a miss
    pub fn load(&self, key: &str) -> Option<Vec<PointDistances>> {
        let path = self.path_for(key);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(distances) => Some(distances),
            Err(e) => {
                warn!("discarding unreadable distance cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store distances, overwriting any previous entry for this key
    pub fn store(&self, key: &str, distances: &[PointDistances]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string(distances)
            .map_err(|e| hsr_core::Error::Other(e.to_string()))?;
        std::fs::write(self.path_for(key), text)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn hash_geometry(hasher: &mut FxHasher, geom: &Geometry<f64>) {
    let mut coord = |c: &Coord<f64>| {
        hasher.write_u64(c.x.to_bits());
        hasher.write_u64(c.y.to_bits());
    };

    match geom {
        Geometry::Point(g) => coord(&g.0),
        Geometry::MultiPoint(g) => g.0.iter().for_each(|p| coord(&p.0)),
        Geometry::Line(g) => {
            coord(&g.start);
            coord(&g.end);
        }
        Geometry::LineString(g) => g.0.iter().for_each(&mut coord),
        Geometry::MultiLineString(g) => {
            g.0.iter().for_each(|ls| ls.0.iter().for_each(&mut coord))
        }
        Geometry::Polygon(g) => {
            g.exterior().0.iter().for_each(&mut coord);
            g.interiors()
                .iter()
                .for_each(|ring| ring.0.iter().for_each(&mut coord));
        }
        Geometry::MultiPolygon(g) => {
            for p in &g.0 {
                p.exterior().0.iter().for_each(&mut coord);
                p.interiors()
                    .iter()
                    .for_each(|ring| ring.0.iter().for_each(&mut coord));
            }
        }
        Geometry::Rect(g) => {
            coord(&g.min());
            coord(&g.max());
        }
        Geometry::Triangle(g) => {
            coord(&g.v1());
            coord(&g.v2());
            coord(&g.v3());
        }
        Geometry::GeometryCollection(g) => {
            drop(coord);
            g.0.iter().for_each(|inner| hash_geometry(hasher, inner));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use hsr_core::FeatureKind;

    fn temp_cache(tag: &str) -> DistanceCache {
        let dir = std::env::temp_dir().join(format!("hsr-cache-test-{tag}-{}", std::process::id()));
        DistanceCache::new(dir)
    }

    fn sample_class() -> FeatureClass {
        FeatureClass::new(
            FeatureKind::Cities,
            vec![Geometry::Point(Point::new(1.0, 2.0))],
        )
    }

    #[test]
    fn test_roundtrip() {
        let cache = temp_cache("roundtrip");
        let distances = vec![
            PointDistances {
                road_km: 1.5,
                city_km: 0.0,
                protected_km: 12.25,
            },
            PointDistances {
                road_km: 3.0,
                city_km: 8.5,
                protected_km: 0.5,
            },
        ];

        let points = vec![SurveyPoint::new(None, 0.0, 0.0)];
        let class = sample_class();
        let key = DistanceCache::key(&points, &[&class], 1000.0);

        assert!(cache.load(&key).is_none());
        cache.store(&key, &distances).unwrap();
        assert_eq!(cache.load(&key).unwrap(), distances);

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_key_changes_with_input() {
        let class = sample_class();
        let a = vec![SurveyPoint::new(None, 0.0, 0.0)];
        let b = vec![SurveyPoint::new(None, 0.0, 1e-9)];

        let key_a = DistanceCache::key(&a, &[&class], 1000.0);
        let key_b = DistanceCache::key(&b, &[&class], 1000.0);
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_key_changes_with_unit_scale() {
        // Same points and features in a different unit scale must miss:
        // every stored value is divided by this factor.
        let class = sample_class();
        let points = vec![SurveyPoint::new(None, 0.0, 0.0)];

        let meters = DistanceCache::key(&points, &[&class], 1000.0);
        let feet = DistanceCache::key(&points, &[&class], 3280.84);
        assert_ne!(meters, feet);
    }

    #[test]
    fn test_key_stable_for_same_input() {
        let class = sample_class();
        let points = vec![SurveyPoint::new(Some("x".into()), 3.0, 4.0)];

        assert_eq!(
            DistanceCache::key(&points, &[&class], 1000.0),
            DistanceCache::key(&points, &[&class], 1000.0),
        );
    }

    #[test]
    fn test_loaded_floats_are_bit_exact() {
        // Irrational distances exercise the full f64 mantissa; a hit must
        // return exactly what was stored.
        let cache = temp_cache("bit-exact");
        let stored = vec![PointDistances {
            road_km: 5.0_f64.sqrt() * 10.0,
            city_km: 2.0_f64.sqrt() / 3.0,
            protected_km: 0.1 + 0.2,
        }];

        let points = vec![SurveyPoint::new(None, 1.0, 2.0)];
        let class = sample_class();
        let key = DistanceCache::key(&points, &[&class], 1000.0);

        cache.store(&key, &stored).unwrap();
        let loaded = cache.load(&key).unwrap();
        assert_eq!(loaded[0].road_km.to_bits(), stored[0].road_km.to_bits());
        assert_eq!(loaded[0].city_km.to_bits(), stored[0].city_km.to_bits());
        assert_eq!(
            loaded[0].protected_km.to_bits(),
            stored[0].protected_km.to_bits()
        );

        std::fs::remove_dir_all(cache.dir()).ok();
    }

    #[test]
    fn test_store_overwrites() {
        let cache = temp_cache("overwrite");
        let points = vec![SurveyPoint::new(None, 5.0, 5.0)];
        let class = sample_class();
        let key = DistanceCache::key(&points, &[&class], 1000.0);

        let first = vec![PointDistances {
            road_km: 1.0,
            city_km: 1.0,
            protected_km: 1.0,
        }];
        let second = vec![PointDistances {
            road_km: 2.0,
            city_km: 2.0,
            protected_km: 2.0,
        }];

        cache.store(&key, &first).unwrap();
        cache.store(&key, &second).unwrap();
        assert_eq!(cache.load(&key).unwrap(), second);

        std::fs::remove_dir_all(cache.dir()).ok();
    }
}
