//! Altitude-over-distance profiles along a polyline.
//!
//! The engine resamples the input polyline to roughly a target number of
//! points, extracts ground altitudes through the raster cache, optionally
//! smooths them, and assembles distance/altitude/coordinate records.
//!
//! Resampling never places two points closer than the elevation grid's
//! native spacing when smart filling is on; when the target count cannot be
//! reached because of that floor, the profile is returned with fewer points
//! and flagged [`ProfileStatus::Approximated`].

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{RasterCache, SpatialReference};
use crate::error::Result;
use crate::filters::{filter_altitude, round_coordinate, round_distance};
use crate::raster::GeoRaster;
use crate::tile::TileReader;

/// Native spacing of the elevation grid, in meters. No resampling mode that
/// honors the mesh places points closer than this along a segment.
pub const MINIMUM_MESH_RESOLUTION: f64 = 2.0;

/// Points produced when the caller does not request an explicit count.
pub const PROFILE_DEFAULT_POINT_COUNT: u32 = 200;

/// Ceiling on requested point counts, enforced by the validation layer.
pub const PROFILE_MAX_POINT_COUNT: u32 = 5000;

/// Below this total polyline length resampling is pointless.
const MIN_TOTAL_DISTANCE: f64 = 0.001;

/// A point in the native projection of the active spatial reference.
pub type Coordinate = (f64, f64);

/// A validated profile request.
///
/// The surrounding layer hands in already-typed values; the engine performs
/// no string parsing and no range validation beyond the mesh-resolution
/// floor.
#[derive(Debug, Clone)]
pub struct ProfileRequest {
    /// Polyline vertices; at least two unless `only_requested_points`.
    pub points: Vec<Coordinate>,
    pub spatial_reference: SpatialReference,
    /// Requested number of output points; `None` means the default of
    /// [`PROFILE_DEFAULT_POINT_COUNT`], which is never flagged approximated.
    pub target_point_count: Option<u32>,
    /// Half width of the smoothing window; 0 disables smoothing.
    pub smoothing_half_window: u32,
    /// Skip resampling and profile exactly the input vertices.
    pub only_requested_points: bool,
    /// Honor the minimum mesh resolution when placing points.
    pub smart_filling: bool,
    /// Guarantee every input vertex survives in the output.
    pub keep_original_vertices: bool,
}

impl ProfileRequest {
    /// A request with default resampling (200 points, no smoothing).
    pub fn new(points: Vec<Coordinate>, spatial_reference: SpatialReference) -> Self {
        Self {
            points,
            spatial_reference,
            target_point_count: None,
            smoothing_half_window: 0,
            only_requested_points: false,
            smart_filling: false,
            keep_original_vertices: false,
        }
    }
}

/// One record of the computed profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileSample {
    /// Ground altitude, rounded to 0.1 m; `None` when the point is uncovered
    /// or its raw altitude is not above zero.
    pub altitude: Option<f64>,
    /// Running planar distance from the first point, rounded to 0.1 m when
    /// the sample is added (accumulation itself is unrounded).
    pub distance_m: f64,
    pub easting: f64,
    pub northing: f64,
}

/// Whether the requested point count was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProfileStatus {
    Exact,
    /// Fewer points than requested because segments at the mesh-resolution
    /// floor could not take more. Non-fatal, user-visible.
    Approximated,
}

/// Tabular rendition of a profile, one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    pub headers: [&'static str; 4],
    /// `[distance, altitude, easting, northing]`; the altitude cell is empty
    /// for samples without a valid altitude.
    pub rows: Vec<[String; 4]>,
}

/// The computed profile plus its point-count status.
#[derive(Debug, Clone)]
pub struct Profile {
    samples: Vec<ProfileSample>,
    status: ProfileStatus,
}

impl Profile {
    pub fn samples(&self) -> &[ProfileSample] {
        &self.samples
    }

    pub fn status(&self) -> ProfileStatus {
        self.status
    }

    /// Records for JSON output: samples without a valid altitude are
    /// dropped.
    pub fn into_json_records(self) -> Vec<ProfileSample> {
        self.samples
            .into_iter()
            .filter(|s| s.altitude.is_some())
            .collect()
    }

    /// Tabular output: every sample is kept, invalid altitudes become empty
    /// cells.
    pub fn into_table(self) -> ProfileTable {
        ProfileTable {
            headers: ["Distance", "Altitude", "Easting", "Northing"],
            rows: self
                .samples
                .into_iter()
                .map(|s| {
                    [
                        s.distance_m.to_string(),
                        s.altitude.map(|a| a.to_string()).unwrap_or_default(),
                        s.easting.to_string(),
                        s.northing.to_string(),
                    ]
                })
                .collect(),
        }
    }
}

/// Computes altitude profiles against a shared raster cache.
pub struct ProfileEngine<'a> {
    cache: &'a RasterCache,
}

impl<'a> ProfileEngine<'a> {
    pub fn new(cache: &'a RasterCache) -> Self {
        Self { cache }
    }

    /// Compute the profile for `request`.
    ///
    /// # Errors
    ///
    /// Fails only when the raster dataset for the requested spatial
    /// reference is unconfigured or cannot be built. Uncovered points and
    /// unreadable tiles degrade to samples without altitude.
    pub fn profile(&self, request: &ProfileRequest) -> Result<Profile> {
        let raster = self.cache.get(request.spatial_reference)?;
        let target = request
            .target_point_count
            .unwrap_or(PROFILE_DEFAULT_POINT_COUNT);

        let coordinates = if request.only_requested_points {
            request.points.clone()
        } else {
            resample(
                &request.points,
                target,
                request.smart_filling,
                request.keep_original_vertices,
            )
        };

        let mut altitudes = extract_altitudes(&raster, &coordinates);
        if request.smoothing_half_window > 0 {
            altitudes = smooth(request.smoothing_half_window, &altitudes);
        }

        let status = match request.target_point_count {
            Some(n) if !request.only_requested_points && (coordinates.len() as u32) < n => {
                ProfileStatus::Approximated
            }
            _ => ProfileStatus::Exact,
        };
        debug!(
            input = request.points.len(),
            resampled = coordinates.len(),
            ?status,
            "profile computed"
        );

        Ok(Profile {
            samples: assemble(&coordinates, &altitudes),
            status,
        })
    }
}

/// Resample the polyline to roughly `target` points.
fn resample(points: &[Coordinate], target: u32, smart: bool, keep_vertices: bool) -> Vec<Coordinate> {
    if points.len() < 2 {
        return points.to_vec();
    }
    if keep_vertices {
        fill_keeping_vertices(points, target, smart)
    } else {
        fill(points, target, smart)
    }
}

/// Fill mode: spread extra points over the whole line, proportionally to
/// segment length. Every original vertex is emitted as a join point.
fn fill(points: &[Coordinate], target: u32, smart: bool) -> Vec<Coordinate> {
    let distances = segment_distances(points);
    let total: f64 = distances.iter().sum();
    if total == 0.0 {
        return points.to_vec();
    }

    let mut result = vec![points[0]];
    for (i, &end) in points.iter().enumerate().skip(1) {
        let start = points[i - 1];
        let segment = distances[i - 1];
        if smart {
            // Segments at or under the mesh resolution take no extra points.
            if segment > MINIMUM_MESH_RESOLUTION {
                let allocated = (f64::from(target) * segment / total) as u32;
                if allocated > 0 {
                    let spacing = (segment / f64::from(allocated)).max(MINIMUM_MESH_RESOLUTION);
                    for k in 1..=allocated {
                        let along = f64::from(k) * spacing;
                        // Keep the join vertex at least one mesh cell away.
                        if along > segment - MINIMUM_MESH_RESOLUTION {
                            break;
                        }
                        result.push(interpolate(start, end, along / segment));
                    }
                }
            }
            result.push(end);
        } else {
            let share = f64::from(target.saturating_sub(1)) * segment / total;
            let count = ((share + 0.5).floor()).max(1.0) as u32;
            let dx = (end.0 - start.0) / f64::from(count);
            let dy = (end.1 - start.1) / f64::from(count);
            // k == count lands exactly on the segment-end vertex.
            for k in 1..=count {
                result.push((start.0 + dx * f64::from(k), start.1 + dy * f64::from(k)));
            }
        }
    }
    result
}

/// Keep-original-vertices mode: apportion `target - 1` points across
/// segments, then fill each segment independently.
fn fill_keeping_vertices(points: &[Coordinate], target: u32, smart: bool) -> Vec<Coordinate> {
    let distances = segment_distances(points);
    let total: f64 = distances.iter().sum();
    if total < MIN_TOTAL_DISTANCE {
        return points.to_vec();
    }

    let allocation = apportion(&distances, total, target.saturating_sub(1));
    let mut result = Vec::new();
    for i in 1..points.len() {
        result.extend(fill_segment(
            points[i - 1],
            points[i],
            allocation[i - 1],
            smart,
            distances[i - 1],
        ));
    }
    result.push(points[points.len() - 1]);
    result
}

/// Fill one segment with up to `allocated` points: the start vertex plus
/// interior points. The end vertex joins as the next segment's start (or the
/// final push of the caller).
fn fill_segment(
    start: Coordinate,
    end: Coordinate,
    allocated: u32,
    smart: bool,
    segment: f64,
) -> Vec<Coordinate> {
    let mut result = vec![start];
    if smart {
        if segment > MINIMUM_MESH_RESOLUTION && allocated > 0 {
            let spacing = (segment / f64::from(allocated)).max(MINIMUM_MESH_RESOLUTION);
            for k in 1..allocated {
                let along = f64::from(k) * spacing;
                if along > segment - MINIMUM_MESH_RESOLUTION {
                    break;
                }
                result.push(interpolate(start, end, along / segment));
            }
        }
    } else {
        let count = allocated.max(1);
        let dx = (end.0 - start.0) / f64::from(count);
        let dy = (end.1 - start.1) / f64::from(count);
        for k in 1..count {
            result.push((start.0 + dx * f64::from(k), start.1 + dy * f64::from(k)));
        }
    }
    result
}

/// Largest-remainder apportionment of `budget` points across segments.
///
/// Each segment is guaranteed the floor of its exact fractional share; the
/// leftover points go one by one to the largest fractional remainders
/// (earlier segment wins ties). The allocation always sums to exactly
/// `budget`.
fn apportion(distances: &[f64], total: f64, budget: u32) -> Vec<u32> {
    let quotas: Vec<f64> = distances
        .iter()
        .map(|d| f64::from(budget) * d / total)
        .collect();
    let mut allocation: Vec<u32> = quotas.iter().map(|q| q.floor() as u32).collect();
    let assigned: u32 = allocation.iter().sum();

    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        let fraction_a = quotas[a] - quotas[a].floor();
        let fraction_b = quotas[b] - quotas[b].floor();
        fraction_b
            .partial_cmp(&fraction_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for &i in order
        .iter()
        .cycle()
        .take(budget.saturating_sub(assigned) as usize)
    {
        allocation[i] += 1;
    }
    allocation
}

/// Extract an altitude per coordinate, reusing tiles touched earlier in the
/// batch: consecutive profile points are usually spatially close, so the
/// working set is checked before the full index scan. Every tile handle
/// opened here is released when the batch scope ends, on every exit path.
fn extract_altitudes(raster: &GeoRaster, coordinates: &[Coordinate]) -> Vec<Option<f64>> {
    let mut readers: Vec<TileReader<'_>> = Vec::new();
    let mut altitudes = Vec::with_capacity(coordinates.len());
    for &(x, y) in coordinates {
        let mut altitude = None;
        let mut covered = false;
        for reader in &readers {
            if reader.contains(x, y) {
                covered = true;
                altitude = read_or_warn(reader, x, y);
                break;
            }
        }
        if !covered {
            if let Some(tile) = raster.tile_at(x, y) {
                match tile.open() {
                    Ok(reader) => {
                        altitude = read_or_warn(&reader, x, y);
                        readers.push(reader);
                    }
                    Err(e) => {
                        warn!(
                            tile = %tile.path().display(),
                            error = %e,
                            "tile unreadable, treating point as uncovered"
                        );
                    }
                }
            }
        }
        altitudes.push(altitude);
    }
    altitudes
}

fn read_or_warn(reader: &TileReader<'_>, x: f64, y: f64) -> Option<f64> {
    match reader.height_at(x, y) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                tile = %reader.tile().path().display(),
                x, y, error = %e,
                "tile read failed, treating point as uncovered"
            );
            None
        }
    }
}

/// Weighted moving average with weight `1/(|k|+1)` over a window of
/// `half_window` samples on each side. Samples without altitude and window
/// positions outside the array are skipped; a window with no usable sample
/// stays `None`.
fn smooth(half_window: u32, altitudes: &[Option<f64>]) -> Vec<Option<f64>> {
    let h = i64::from(half_window);
    let len = altitudes.len() as i64;
    (0..len)
        .map(|j| {
            let mut sum = 0.0;
            let mut weight = 0.0;
            for k in -h..=h {
                let p = j + k;
                if p < 0 || p >= len {
                    continue;
                }
                if let Some(value) = altitudes[p as usize] {
                    let factor = 1.0 / (k.abs() as f64 + 1.0);
                    sum += value * factor;
                    weight += factor;
                }
            }
            (weight > 0.0).then(|| sum / weight)
        })
        .collect()
}

/// Assemble the distance/altitude/coordinate records.
fn assemble(coordinates: &[Coordinate], altitudes: &[Option<f64>]) -> Vec<ProfileSample> {
    let mut samples = Vec::with_capacity(coordinates.len());
    let mut total_distance = 0.0;
    let mut previous: Option<Coordinate> = None;
    for (&coordinate, &altitude) in coordinates.iter().zip(altitudes) {
        if let Some(prev) = previous {
            total_distance += distance_between(prev, coordinate);
        }
        samples.push(ProfileSample {
            altitude: filter_altitude(altitude),
            distance_m: round_distance(total_distance),
            easting: round_coordinate(coordinate.0),
            northing: round_coordinate(coordinate.1),
        });
        previous = Some(coordinate);
    }
    samples
}

fn segment_distances(points: &[Coordinate]) -> Vec<f64> {
    points
        .windows(2)
        .map(|pair| distance_between(pair[0], pair[1]))
        .collect()
}

/// Planar Euclidean distance in projected meters.
fn distance_between(a: Coordinate, b: Coordinate) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn interpolate(start: Coordinate, end: Coordinate, t: f64) -> Coordinate {
    (
        start.0 + (end.0 - start.0) * t,
        start.1 + (end.1 - start.1) * t,
    )
}
