//! Vector data structures for the HSR pipeline
//!
//! Points, biogeographic regions and infrastructure feature classes,
//! already reprojected into the metric analysis frame by the loader.

use crate::error::{Error, Result};
use geo::orient::{Direction, Orient};
use geo::{Area, Centroid};
use geo_types::{Geometry, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

/// Road class codes retained by the accessibility analysis (`GP_RTP`)
pub const ROAD_CLASSES: [i32; 2] = [1, 2];

/// A single georeferenced sample in the analysis frame.
///
/// Hidden-species points carry the lineage identifier; all-sequence
/// points may leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPoint {
    pub id: Option<String>,
    pub x: f64,
    pub y: f64,
}

impl SurveyPoint {
    pub fn new(id: Option<String>, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// A biogeographic province used as the spatial aggregation unit.
///
/// The boundary is a `MultiPolygon`: coastal provinces carry islands,
/// and every part participates in containment, area and centroid.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(name: impl Into<String>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            name: name.into(),
            geometry: geometry.into(),
        }
    }

    /// Unsigned area over all parts, in square kilometers (frame units
    /// are meters)
    pub fn area_km2(&self) -> f64 {
        self.geometry.unsigned_area() / 1.0e6
    }

    /// Area-weighted centroid; falls back to the first exterior vertex
    /// of the first part for degenerate geometries so the
    /// nearest-centroid assignment never fails
    pub fn centroid(&self) -> Point<f64> {
        self.geometry.centroid().unwrap_or_else(|| {
            let c = self
                .geometry
                .0
                .first()
                .and_then(|p| p.exterior().0.first())
                .copied()
                .unwrap_or_default();
            Point::new(c.x, c.y)
        })
    }
}

/// Ordered collection of regions.
///
/// Input order is load-bearing: the point-to-region assigner resolves
/// containment ties to the first matching region in this order.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Region> {
        self.regions.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.name.clone()).collect()
    }
}

/// Kind of infrastructure layer used in the accessibility analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Roads,
    Cities,
    ProtectedAreas,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Roads => "roads",
            FeatureKind::Cities => "cities",
            FeatureKind::ProtectedAreas => "protected_areas",
        }
    }
}

/// One infrastructure layer: a bag of geometries of a single kind
#[derive(Debug, Clone)]
pub struct FeatureClass {
    pub kind: FeatureKind,
    pub geometries: Vec<Geometry<f64>>,
}

impl FeatureClass {
    pub fn new(kind: FeatureKind, geometries: Vec<Geometry<f64>>) -> Self {
        Self { kind, geometries }
    }

    /// Build the road layer, keeping only the functional classes in
    /// [`ROAD_CLASSES`]
    pub fn roads(lines: Vec<(i32, LineString<f64>)>) -> Self {
        let geometries = lines
            .into_iter()
            .filter(|(class, _)| ROAD_CLASSES.contains(class))
            .map(|(_, ls)| Geometry::LineString(ls))
            .collect();
        Self::new(FeatureKind::Roads, geometries)
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

/// Repair a polygon before any spatial predicate runs against it.
///
/// Interior rings that collapsed below a triangle are dropped and ring
/// winding is normalized, the same cleanup a zero-width buffer performs.
/// An unusable exterior ring is unrecoverable and surfaces as
/// [`Error::GeometryRepair`].
pub fn repair_polygon(name: &str, polygon: Polygon<f64>) -> Result<Polygon<f64>> {
    let (exterior, interiors) = polygon.into_inner();

    if ring_len(&exterior) < 4 {
        return Err(Error::GeometryRepair(name.to_string()));
    }

    let interiors: Vec<LineString<f64>> = interiors
        .into_iter()
        .filter(|ring| ring_len(ring) >= 4)
        .collect();

    let repaired = Polygon::new(close_ring(exterior), interiors.into_iter().map(close_ring).collect());
    Ok(repaired.orient(Direction::Default))
}

/// Repair every part of a multi-polygon
pub fn repair_multi_polygon(name: &str, mp: MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    let polys: Result<Vec<Polygon<f64>>> = mp
        .0
        .into_iter()
        .map(|p| repair_polygon(name, p))
        .collect();
    Ok(MultiPolygon::new(polys?))
}

/// Repair every polygonal part of a geometry; non-polygonal geometries
/// pass through untouched
pub fn repair_geometry(name: &str, geometry: Geometry<f64>) -> Result<Geometry<f64>> {
    match geometry {
        Geometry::Polygon(p) => Ok(Geometry::Polygon(repair_polygon(name, p)?)),
        Geometry::MultiPolygon(mp) => {
            Ok(Geometry::MultiPolygon(repair_multi_polygon(name, mp)?))
        }
        other => Ok(other),
    }
}

fn ring_len(ring: &LineString<f64>) -> usize {
    // A closed ring repeats its first coordinate; count distinct vertices + closure.
    if ring.is_closed() {
        ring.0.len()
    } else {
        ring.0.len() + 1
    }
}

fn close_ring(mut ring: LineString<f64>) -> LineString<f64> {
    if !ring.is_closed() {
        if let Some(first) = ring.0.first().copied() {
            ring.0.push(first);
        }
    }
    ring
}
