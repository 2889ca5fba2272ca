//! Region adjacency relation
//!
//! The distance engine restricts its feature search to a region plus its
//! topological neighbors. The relation is symmetric and computed once
//! per run; regions sharing only a boundary count as neighbors.

use geo::{BoundingRect, Intersects};
use hsr_core::RegionSet;

/// Precomputed symmetric "touches" relation between regions
#[derive(Debug, Clone)]
pub struct RegionAdjacency {
    neighbors: Vec<Vec<usize>>,
}

impl RegionAdjacency {
    /// Build the adjacency relation for a region set.
    ///
    /// Quadratic in the number of regions with a bounding-box pre-filter;
    /// province counts are small enough that this runs in milliseconds.
    pub fn build(regions: &RegionSet) -> Self {
        let n = regions.len();
        let boxes: Vec<_> = regions
            .iter()
            .map(|r| r.geometry.bounding_rect())
            .collect();

        let mut neighbors = vec![Vec::new(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                let boxes_touch = match (boxes[i], boxes[j]) {
                    (Some(a), Some(b)) => a.intersects(&b),
                    _ => false,
                };
                if !boxes_touch {
                    continue;
                }

                let (ri, rj) = (regions.get(i).unwrap(), regions.get(j).unwrap());
                if ri.geometry.intersects(&rj.geometry) {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }

        Self { neighbors }
    }

    /// Neighbor indices of region `idx`
    pub fn neighbors(&self, idx: usize) -> &[usize] {
        &self.neighbors[idx]
    }

    pub fn are_neighbors(&self, a: usize, b: usize) -> bool {
        self.neighbors[a].contains(&b)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
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

    #[test]
    fn test_shared_edge_is_adjacent() {
        let regions = RegionSet::new(vec![
            Region::new("a", square(0.0, 0.0, 10.0)),
            Region::new("b", square(10.0, 0.0, 10.0)),
            Region::new("c", square(100.0, 0.0, 10.0)),
        ]);

        let adj = RegionAdjacency::build(&regions);
        assert!(adj.are_neighbors(0, 1));
        assert!(adj.are_neighbors(1, 0));
        assert!(!adj.are_neighbors(0, 2));
        assert!(!adj.are_neighbors(1, 2));
    }

    #[test]
    fn test_symmetry() {
        let regions = RegionSet::new(vec![
            Region::new("a", square(0.0, 0.0, 10.0)),
            Region::new("b", square(5.0, 5.0, 10.0)),
        ]);

        let adj = RegionAdjacency::build(&regions);
        for i in 0..adj.len() {
            for &j in adj.neighbors(i) {
                assert!(adj.are_neighbors(j, i));
            }
        }
    }
}
