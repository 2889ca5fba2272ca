//! CSV readers and writers for the pipeline's tabular inputs and outputs
//!
//! Vector layers arrive as CSV with a WKT geometry column; column lookup
//! is case-insensitive and accepts the common aliases of each field.

use anyhow::{bail, Context, Result};
use geo_types::{Geometry, MultiPolygon};
use hsr_core::{repair_multi_polygon, FeatureClass, FeatureKind, Region, RegionSet, SurveyPoint};
use serde::Serialize;
use std::path::Path;
use tracing::warn;
use wkt::TryFromWkt;

use hsr_pipeline::priority::SpeciesRecord;

const POINT_ID_COLUMNS: &[&str] = &["id", "species", "lineage"];
const X_COLUMNS: &[&str] = &["x", "longitude", "lon"];
const Y_COLUMNS: &[&str] = &["y", "latitude", "lat"];
const REGION_NAME_COLUMNS: &[&str] = &["provincias", "province", "region", "name"];
const GEOMETRY_COLUMNS: &[&str] = &["wkt", "geometry", "geom"];
const ROAD_CLASS_COLUMNS: &[&str] = &["gp_rtp", "road_class", "class"];

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Index of the first header matching any of `names`, case-insensitively
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
}

fn require_column(headers: &csv::StringRecord, names: &[&str], path: &Path) -> Result<usize> {
    find_column(headers, names).with_context(|| {
        format!(
            "{} has no column named any of [{}]",
            path.display(),
            names.join(", ")
        )
    })
}

/// Read survey points from a table with X/Y (or Longitude/Latitude)
/// columns and an optional lineage identifier
pub fn read_points(path: &Path) -> Result<Vec<SurveyPoint>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();

    let x_col = require_column(&headers, X_COLUMNS, path)?;
    let y_col = require_column(&headers, Y_COLUMNS, path)?;
    let id_col = find_column(&headers, POINT_ID_COLUMNS);

    let mut points = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad record at line {}", line + 2))?;
        let x: f64 = record[x_col]
            .trim()
            .parse()
            .with_context(|| format!("invalid X at line {}", line + 2))?;
        let y: f64 = record[y_col]
            .trim()
            .parse()
            .with_context(|| format!("invalid Y at line {}", line + 2))?;
        let id = id_col
            .map(|c| record[c].trim().to_string())
            .filter(|s| !s.is_empty());
        points.push(SurveyPoint::new(id, x, y));
    }

    if points.is_empty() {
        bail!("{} contains no points", path.display());
    }
    Ok(points)
}

/// Read regions from a table with a name column and a WKT polygon column.
///
/// MultiPolygon geometries are kept whole, islands included; every ring
/// is passed through geometry repair before use. Input row order is
/// preserved.
pub fn read_regions(path: &Path) -> Result<RegionSet> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();

    let name_col = require_column(&headers, REGION_NAME_COLUMNS, path)?;
    let geom_col = require_column(&headers, GEOMETRY_COLUMNS, path)?;

    let mut regions = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad record at line {}", line + 2))?;
        let name = record[name_col].trim().to_string();
        let geom = Geometry::<f64>::try_from_wkt_str(record[geom_col].trim())
            .map_err(|e| anyhow::anyhow!("invalid WKT for region '{name}': {e}"))?;

        let geometry = match geom {
            Geometry::Polygon(p) => MultiPolygon::from(p),
            Geometry::MultiPolygon(mp) => {
                if mp.0.is_empty() {
                    bail!("region '{}' has an empty MultiPolygon", name);
                }
                mp
            }
            other => bail!(
                "region '{}' must be a polygon, got {}",
                name,
                kind_of(&other)
            ),
        };

        let geometry = repair_multi_polygon(&name, geometry)
            .with_context(|| format!("region '{name}' failed geometry repair"))?;
        regions.push(Region::new(name, geometry));
    }

    if regions.is_empty() {
        bail!("{} contains no regions", path.display());
    }
    Ok(RegionSet::new(regions))
}

/// Read the road layer, keeping only the transit-relevant class codes
pub fn read_roads(path: &Path) -> Result<FeatureClass> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();

    let class_col = require_column(&headers, ROAD_CLASS_COLUMNS, path)?;
    let geom_col = require_column(&headers, GEOMETRY_COLUMNS, path)?;

    let mut lines = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad record at line {}", line + 2))?;
        let class: i32 = match record[class_col].trim().parse() {
            Ok(c) => c,
            Err(_) => {
                warn!("skipping road at line {} with unparseable class", line + 2);
                continue;
            }
        };
        let geom = Geometry::<f64>::try_from_wkt_str(record[geom_col].trim())
            .map_err(|e| anyhow::anyhow!("invalid WKT at line {}: {e}", line + 2))?;

        match geom {
            Geometry::LineString(ls) => lines.push((class, ls)),
            Geometry::MultiLineString(mls) => {
                lines.extend(mls.0.into_iter().map(|ls| (class, ls)));
            }
            other => {
                warn!(
                    "skipping non-line road geometry ({}) at line {}",
                    kind_of(&other),
                    line + 2
                );
            }
        }
    }

    Ok(FeatureClass::roads(lines))
}

/// Read a generic feature layer (cities, protected areas) from a WKT column
pub fn read_features(path: &Path, kind: FeatureKind) -> Result<FeatureClass> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let geom_col = require_column(&headers, GEOMETRY_COLUMNS, path)?;

    let mut geometries = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad record at line {}", line + 2))?;
        let geom = Geometry::<f64>::try_from_wkt_str(record[geom_col].trim())
            .map_err(|e| anyhow::anyhow!("invalid WKT at line {}: {e}", line + 2))?;
        geometries.push(hsr_core::repair_geometry(kind.as_str(), geom)?);
    }

    Ok(FeatureClass::new(kind, geometries))
}

/// Read the species assessment table for priority scoring
pub fn read_species_records(path: &Path) -> Result<Vec<SpeciesRecord>> {
    let mut reader = open_reader(path)?;
    let mut records = Vec::new();
    for (line, row) in reader.deserialize().enumerate() {
        let record: SpeciesRecord =
            row.with_context(|| format!("bad species record at line {}", line + 2))?;
        records.push(record);
    }
    if records.is_empty() {
        bail!("{} contains no species records", path.display());
    }
    Ok(records)
}

/// Write any serializable row set as CSV
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn kind_of(geom: &Geometry<f64>) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
