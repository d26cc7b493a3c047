//! # geoprofile - Terrain Elevation Profiles
//!
//! Library for querying ground altitudes and computing altitude profiles
//! from tiled digital terrain models in the BinaryTerrain (`.bt`) format.
//!
//! ## Features
//!
//! - **Fast**: Memory-mapped tile access, headers parsed once per tile
//! - **Memory Efficient**: Tiles are mapped on demand and released per batch
//! - **Indexed**: Tile coverage comes from a shapefile index plus a dBASE
//!   attribute table, one dataset per spatial reference system
//! - **Offline**: Works entirely from local files
//!
//! ## Quick Start
//!
//! ```ignore
//! use geoprofile::{height, ProfileEngine, ProfileRequest, RasterCache};
//!
//! let cache = RasterCache::builder()
//!     .index_file(2056, "/data/dtm/index.shp")
//!     .preload(2056)
//!     .build()?;
//!
//! // Single point lookup
//! let altitude = height(&cache, 2056, 2_600_000.0, 1_200_000.0)?;
//!
//! // Altitude profile along a line
//! let engine = ProfileEngine::new(&cache);
//! let mut request = ProfileRequest::new(
//!     vec![(2_600_000.0, 1_200_000.0), (2_601_000.0, 1_200_500.0)],
//!     2056,
//! );
//! request.target_point_count = Some(300);
//! request.smart_filling = true;
//! let profile = engine.profile(&request)?;
//! for sample in profile.samples() {
//!     println!("{}m @ {:?}", sample.distance_m, sample.altitude);
//! }
//! ```
//!
//! ## BinaryTerrain Format
//!
//! Each tile is a regular grid with a 256-byte header. The fields consumed
//! here sit at byte offset 10: column count (`u32`), row count (`u32`), cell
//! size in bytes (`i16`) and a float flag (`i16`), all little-endian. Cell
//! data starts at byte offset 256, stored column by column with the rows of
//! a column adjacent. Cells are `f32`, `i16` or `i32` depending on the
//! header.

pub mod cache;
pub mod dbf;
pub mod error;
mod filters;
pub mod height;
pub mod profile;
pub mod raster;
pub mod shape;
pub mod tile;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export main types at crate root for convenience
pub use cache::{RasterCache, RasterCacheBuilder, SpatialReference};
pub use dbf::{AttributeTable, FieldDescriptor, FieldValue};
pub use error::{DtmError, Result};
pub use height::height;
pub use profile::{
    Coordinate, Profile, ProfileEngine, ProfileRequest, ProfileSample, ProfileStatus,
    ProfileTable, MINIMUM_MESH_RESOLUTION, PROFILE_DEFAULT_POINT_COUNT, PROFILE_MAX_POINT_COUNT,
};
pub use raster::{GeoRaster, TILE_EXTENSION};
pub use shape::{read_index, BoundingBox, Geometry, ShapeRecord};
pub use tile::{GridHeader, TerrainTile, TileReader};
