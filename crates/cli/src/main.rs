//! HSR CLI - Hidden Species Richness biodiversity pipeline

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geo::BoundingRect;
use hsr_core::io::{read_geotiff, write_geotiff};
use hsr_core::{FeatureClass, FeatureKind, Raster, RegionSet, SurveyPoint};
use hsr_pipeline::prelude::*;

mod io;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hsr")]
#[command(author, version, about = "Hidden Species Richness biodiversity pipeline", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign survey points to regions
    Assign {
        /// Survey points CSV (ID, X/Longitude, Y/Latitude)
        points: PathBuf,
        /// Regions CSV with a WKT polygon column
        regions: PathBuf,
        /// Output assignment table
        output: PathBuf,
    },
    /// Compute per-point distances to roads, cities and protected areas
    Distances {
        /// Survey points CSV
        points: PathBuf,
        /// Regions CSV with a WKT polygon column
        regions: PathBuf,
        /// Roads CSV (class column + WKT lines)
        #[arg(long)]
        roads: PathBuf,
        /// Cities CSV (WKT)
        #[arg(long)]
        cities: PathBuf,
        /// Protected areas CSV (WKT)
        #[arg(long)]
        protected: PathBuf,
        /// Directory for the distance cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Output distance table
        output: PathBuf,
    },
    /// Build the per-region statistics table with the HSR index
    Stats {
        /// Survey points CSV
        points: PathBuf,
        /// Regions CSV with a WKT polygon column
        regions: PathBuf,
        /// Roads CSV (class column + WKT lines)
        #[arg(long)]
        roads: PathBuf,
        /// Cities CSV (WKT)
        #[arg(long)]
        cities: PathBuf,
        /// Protected areas CSV (WKT)
        #[arg(long)]
        protected: PathBuf,
        /// Directory for the distance cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Weight of the accessibility Z-score
        #[arg(long, default_value = "0.2")]
        accessibility_weight: f64,
        /// Weight of the region-size Z-score
        #[arg(long, default_value = "0.2")]
        size_weight: f64,
        /// Output statistics table
        output: PathBuf,
    },
    /// Rasterize the HSR statistics table onto a grid
    Rasterize {
        /// Regions CSV with a WKT polygon column
        regions: PathBuf,
        /// Statistics table produced by `stats`
        stats: PathBuf,
        /// Output GeoTIFF
        output: PathBuf,
        /// Cell size in map units
        #[arg(long, default_value = "1000.0")]
        cell_size: f64,
    },
    /// Fuse HSR, human footprint and climate loss into critical areas
    Fuse {
        /// HSR surface GeoTIFF
        #[arg(long)]
        hsr: PathBuf,
        /// Human footprint GeoTIFF
        #[arg(long)]
        footprint: PathBuf,
        /// Per-species loss GeoTIFFs for one scenario
        #[arg(long, num_args = 1..)]
        loss: Vec<PathBuf>,
        /// Weight of the HSR component
        #[arg(long, default_value = "0.33")]
        hsr_weight: f64,
        /// Weight of the human footprint component
        #[arg(long, default_value = "0.34")]
        footprint_weight: f64,
        /// Weight of the climate loss component
        #[arg(long, default_value = "0.33")]
        loss_weight: f64,
        /// Regions CSV; enables the per-region ranking table
        #[arg(long)]
        regions: Option<PathBuf>,
        /// Output path for the ranking table
        #[arg(long)]
        ranking: Option<PathBuf>,
        /// Output critical-areas GeoTIFF
        output: PathBuf,
    },
    /// Score species conservation priority under both scenarios
    Priority {
        /// Species assessment CSV
        input: PathBuf,
        /// Output prefix; writes <prefix>_ssp245.csv, <prefix>_ssp585.csv
        /// and <prefix>_comparison.csv
        output_prefix: PathBuf,
    },
    /// Run the full pipeline: assignment, distances, statistics, rasters
    Run {
        /// Survey points CSV
        points: PathBuf,
        /// Regions CSV with a WKT polygon column
        regions: PathBuf,
        /// Roads CSV (class column + WKT lines)
        #[arg(long)]
        roads: PathBuf,
        /// Cities CSV (WKT)
        #[arg(long)]
        cities: PathBuf,
        /// Protected areas CSV (WKT)
        #[arg(long)]
        protected: PathBuf,
        /// Human footprint GeoTIFF; enables fusion
        #[arg(long)]
        footprint: Option<PathBuf>,
        /// Per-species loss GeoTIFFs; enables fusion
        #[arg(long, num_args = 1..)]
        loss: Vec<PathBuf>,
        /// Directory for the distance cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Cell size in map units for rasterization
        #[arg(long, default_value = "1000.0")]
        cell_size: f64,
        /// Output directory
        output: PathBuf,
    },
}

// ─── Output rows ────────────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct AssignmentRow {
    id: String,
    region: String,
    via_fallback: bool,
}

#[derive(serde::Serialize)]
struct DistanceRow {
    id: String,
    x: f64,
    y: f64,
    road_km: f64,
    city_km: f64,
    protected_km: f64,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> =
        read_geotiff(path).with_context(|| format!("failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_raster(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing raster...");
    write_geotiff(raster, path).with_context(|| format!("failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

struct FeatureLayers {
    roads: FeatureClass,
    cities: FeatureClass,
    protected: FeatureClass,
}

fn read_feature_layers(roads: &Path, cities: &Path, protected: &Path) -> Result<FeatureLayers> {
    let pb = spinner("Reading feature layers...");
    let layers = FeatureLayers {
        roads: io::read_roads(roads)?,
        cities: io::read_features(cities, FeatureKind::Cities)?,
        protected: io::read_features(protected, FeatureKind::ProtectedAreas)?,
    };
    pb.finish_and_clear();
    info!(
        "Features: {} roads, {} cities, {} protected areas",
        layers.roads.len(),
        layers.cities.len(),
        layers.protected.len()
    );
    Ok(layers)
}

/// Distances with an optional disk cache in front of the engine
fn cached_distances(
    points: &[SurveyPoint],
    assignments: &[Assignment],
    regions: &RegionSet,
    adjacency: &RegionAdjacency,
    layers: &FeatureLayers,
    cache_dir: Option<&Path>,
) -> Result<Vec<PointDistances>> {
    let params = DistanceParams::default();
    let classes = [&layers.roads, &layers.cities, &layers.protected];
    let cache = cache_dir.map(DistanceCache::new);
    let key = cache
        .as_ref()
        .map(|_| DistanceCache::key(points, &classes, params.units_per_km));

    if let (Some(cache), Some(key)) = (&cache, &key) {
        if let Some(hit) = cache.load(key) {
            info!("Distance cache hit ({key})");
            return Ok(hit);
        }
    }

    let pb = spinner("Computing distances...");
    let distances = nearest_distances(
        points,
        assignments,
        regions,
        adjacency,
        &layers.roads,
        &layers.cities,
        &layers.protected,
        &params,
    )?;
    pb.finish_and_clear();

    if let (Some(cache), Some(key)) = (&cache, &key) {
        cache.store(key, &distances)?;
    }
    Ok(distances)
}

/// Full table pipeline: assignment through the composed HSR index
fn compute_stats(
    points: &[SurveyPoint],
    regions: &RegionSet,
    layers: &FeatureLayers,
    cache_dir: Option<&Path>,
    weights: &HsrWeights,
) -> Result<Vec<RegionStats>> {
    let assignments = assign_points(points, regions)?;
    let adjacency = RegionAdjacency::build(regions);
    let distances = cached_distances(points, &assignments, regions, &adjacency, layers, cache_dir)?;

    let stats = init_stats(regions);
    let stats = attach_areas(&stats, regions);
    let stats = count_hidden_species(&stats, points, &assignments);
    let stats = count_sequences(&stats, &assignments);
    let stats = attach_distances(&stats, &assignments, &distances);
    let stats = attach_z_scores(&stats);
    Ok(compose_hsr(&stats, weights)?)
}

/// Union of the regions' bounding rectangles as (min_x, min_y, max_x, max_y)
fn region_bounds(regions: &RegionSet) -> Result<(f64, f64, f64, f64)> {
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for region in regions.iter() {
        if let Some(rect) = region.geometry.bounding_rect() {
            bounds = Some(match bounds {
                None => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
                Some((x0, y0, x1, y1)) => (
                    x0.min(rect.min().x),
                    y0.min(rect.min().y),
                    x1.max(rect.max().x),
                    y1.max(rect.max().y),
                ),
            });
        }
    }
    bounds.context("no region has a valid extent")
}

fn assignment_rows(points: &[SurveyPoint], regions: &RegionSet, assignments: &[Assignment]) -> Vec<AssignmentRow> {
    points
        .iter()
        .zip(assignments)
        .map(|(p, a)| AssignmentRow {
            id: p.id.clone().unwrap_or_default(),
            region: regions
                .get(a.region)
                .map(|r| r.name.clone())
                .unwrap_or_default(),
            via_fallback: a.via_fallback,
        })
        .collect()
}

/// Sum the per-species loss stack and blend it into the critical-areas
/// surface. Returns both; the summed loss is an output in its own right.
fn fuse_rasters(
    hsr: &Raster<f64>,
    footprint: &Raster<f64>,
    loss_paths: &[PathBuf],
    weights: &FusionWeights,
) -> Result<(Raster<f64>, Raster<f64>)> {
    if loss_paths.is_empty() {
        bail!("at least one loss raster is required");
    }
    let loss_layers: Vec<Raster<f64>> = loss_paths
        .iter()
        .map(|p| read_raster(p))
        .collect::<Result<_>>()?;
    let loss = sum_loss_rasters(&loss_layers)?;
    let critical = critical_areas(hsr, footprint, &loss, weights)?;
    Ok((loss, critical))
}

/// Path for the summed loss raster, next to the critical-areas output
fn loss_sum_path(critical: &Path) -> PathBuf {
    let stem = critical
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "critical_areas".to_string());
    critical.with_file_name(format!("{stem}_loss_sum.tif"))
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Assign {
            points,
            regions,
            output,
        } => {
            let points = io::read_points(&points)?;
            let regions = io::read_regions(&regions)?;
            let start = Instant::now();
            let assignments = assign_points(&points, &regions)?;
            let elapsed = start.elapsed();

            let fallbacks = assignments.iter().filter(|a| a.via_fallback).count();
            info!(
                "Assigned {} points to {} regions ({} via fallback)",
                points.len(),
                regions.len(),
                fallbacks
            );
            io::write_table(&output, &assignment_rows(&points, &regions, &assignments))?;
            done("Assignments", &output, elapsed);
        }

        Commands::Distances {
            points,
            regions,
            roads,
            cities,
            protected,
            cache_dir,
            output,
        } => {
            let points = io::read_points(&points)?;
            let regions = io::read_regions(&regions)?;
            let layers = read_feature_layers(&roads, &cities, &protected)?;

            let start = Instant::now();
            let assignments = assign_points(&points, &regions)?;
            let adjacency = RegionAdjacency::build(&regions);
            let distances = cached_distances(
                &points,
                &assignments,
                &regions,
                &adjacency,
                &layers,
                cache_dir.as_deref(),
            )?;
            let elapsed = start.elapsed();

            let rows: Vec<DistanceRow> = points
                .iter()
                .zip(&distances)
                .map(|(p, d)| DistanceRow {
                    id: p.id.clone().unwrap_or_default(),
                    x: p.x,
                    y: p.y,
                    road_km: d.road_km,
                    city_km: d.city_km,
                    protected_km: d.protected_km,
                })
                .collect();
            io::write_table(&output, &rows)?;
            done("Distances", &output, elapsed);
        }

        Commands::Stats {
            points,
            regions,
            roads,
            cities,
            protected,
            cache_dir,
            accessibility_weight,
            size_weight,
            output,
        } => {
            let points = io::read_points(&points)?;
            let regions = io::read_regions(&regions)?;
            let layers = read_feature_layers(&roads, &cities, &protected)?;
            let weights = HsrWeights {
                accessibility: accessibility_weight,
                size: size_weight,
            };

            let start = Instant::now();
            let stats = compute_stats(&points, &regions, &layers, cache_dir.as_deref(), &weights)?;
            let elapsed = start.elapsed();

            io::write_table(&output, &stats)?;
            done("Statistics", &output, elapsed);
        }

        Commands::Rasterize {
            regions,
            stats,
            output,
            cell_size,
        } => {
            let regions = io::read_regions(&regions)?;
            let mut reader = csv::Reader::from_path(&stats)
                .with_context(|| format!("failed to open {}", stats.display()))?;
            let stats: Vec<RegionStats> = reader
                .deserialize()
                .collect::<std::result::Result<_, _>>()
                .context("failed to parse statistics table")?;

            let start = Instant::now();
            let grid = grid_from_bounds(region_bounds(&regions)?, cell_size)?;
            let surface = rasterize_hsr(&regions, &stats, &grid)?;
            let elapsed = start.elapsed();

            write_raster(&surface, &output)?;
            done("HSR surface", &output, elapsed);
        }

        Commands::Fuse {
            hsr,
            footprint,
            loss,
            hsr_weight,
            footprint_weight,
            loss_weight,
            regions,
            ranking,
            output,
        } => {
            let weights = FusionWeights {
                hsr: hsr_weight,
                footprint: footprint_weight,
                loss: loss_weight,
            };
            let hsr = read_raster(&hsr)?;
            let footprint = read_raster(&footprint)?;

            let start = Instant::now();
            let (loss_sum, critical) = fuse_rasters(&hsr, &footprint, &loss, &weights)?;
            let elapsed = start.elapsed();
            write_raster(&critical, &output)?;

            let loss_path = loss_sum_path(&output);
            write_raster(&loss_sum, &loss_path)?;
            println!("Summed loss saved to: {}", loss_path.display());
            done("Critical areas", &output, elapsed);

            if let (Some(regions), Some(ranking)) = (regions, ranking) {
                let regions = io::read_regions(&regions)?;
                let ranks = region_priority_ranking(&critical, &regions)?;
                io::write_table(&ranking, &ranks)?;
                println!("Region ranking saved to: {}", ranking.display());
            }
        }

        Commands::Priority {
            input,
            output_prefix,
        } => {
            let records = io::read_species_records(&input)?;
            let start = Instant::now();

            let prefix = output_prefix.display();
            for scenario in [Scenario::Ssp245, Scenario::Ssp585] {
                let scored = score_species(&records, scenario);
                let path = PathBuf::from(format!("{}_{}.csv", prefix, scenario.as_str()));
                io::write_table(&path, &scored)?;
                println!("Priority table saved to: {}", path.display());
            }

            let shifts = compare_scenarios(&records);
            let path = PathBuf::from(format!("{}_comparison.csv", prefix));
            io::write_table(&path, &shifts)?;
            done("Scenario comparison", &path, start.elapsed());
        }

        Commands::Run {
            points,
            regions,
            roads,
            cities,
            protected,
            footprint,
            loss,
            cache_dir,
            cell_size,
            output,
        } => {
            std::fs::create_dir_all(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;

            let points = io::read_points(&points)?;
            let regions = io::read_regions(&regions)?;
            let layers = read_feature_layers(&roads, &cities, &protected)?;
            let start = Instant::now();

            let stats = compute_stats(
                &points,
                &regions,
                &layers,
                cache_dir.as_deref(),
                &HsrWeights::default(),
            )?;
            let stats_path = output.join("region_stats.csv");
            io::write_table(&stats_path, &stats)?;
            println!("Statistics saved to: {}", stats_path.display());

            let grid = grid_from_bounds(region_bounds(&regions)?, cell_size)?;
            let surface = rasterize_hsr(&regions, &stats, &grid)?;
            let surface_path = output.join("hsr.tif");
            write_raster(&surface, &surface_path)?;
            println!("HSR surface saved to: {}", surface_path.display());

            match footprint {
                Some(footprint) if !loss.is_empty() => {
                    let footprint = read_raster(&footprint)?;
                    let (loss_sum, critical) =
                        fuse_rasters(&surface, &footprint, &loss, &FusionWeights::default())?;

                    let loss_path = output.join("loss_sum.tif");
                    write_raster(&loss_sum, &loss_path)?;
                    println!("Summed loss saved to: {}", loss_path.display());

                    let critical_path = output.join("critical_areas.tif");
                    write_raster(&critical, &critical_path)?;
                    println!("Critical areas saved to: {}", critical_path.display());

                    let ranks = region_priority_ranking(&critical, &regions)?;
                    let ranking_path = output.join("region_ranking.csv");
                    io::write_table(&ranking_path, &ranks)?;
                    println!("Region ranking saved to: {}", ranking_path.display());
                }
                _ => info!("No footprint/loss rasters given; skipping fusion"),
            }

            done("Pipeline", &output, start.elapsed());
        }
    }

    Ok(())
}
