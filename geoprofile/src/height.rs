//! Single-point altitude lookup.

use crate::cache::{RasterCache, SpatialReference};
use crate::error::Result;
use crate::filters::filter_altitude;

/// Ground altitude at a single point, rounded to 0.1 m.
///
/// Returns `Ok(None)` when no tile covers the point or the stored altitude
/// is not above zero.
///
/// # Errors
///
/// Fails when no raster dataset is configured for `spatial_reference` or the
/// dataset cannot be built.
pub fn height(
    cache: &RasterCache,
    spatial_reference: SpatialReference,
    easting: f64,
    northing: f64,
) -> Result<Option<f64>> {
    let raster = cache.get(spatial_reference)?;
    Ok(filter_altitude(raster.height_at(easting, northing)))
}
