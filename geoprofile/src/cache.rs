//! Process-wide cache of terrain rasters, keyed by spatial reference.
//!
//! The cache is an explicit object with a controlled lifecycle: build it at
//! startup from a mapping of spatial-reference ids to index files, hand it
//! by reference to the query handlers. Entries are constructed lazily on
//! first use unless listed for eager preload, so the first user request is
//! never the one paying the decode cost.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use moka::sync::Cache;
use tracing::{debug, info};

use crate::error::{DtmError, Result};
use crate::raster::GeoRaster;

/// Integer code identifying a projected coordinate system and, implicitly,
/// the terrain dataset to query (e.g. 2056 or 21781).
pub type SpatialReference = u32;

/// Cache of [`GeoRaster`] instances, one per configured spatial reference.
///
/// Concurrent first-access for the same unseen key is safe; if two requests
/// race, one construction may be wasted, which is harmless since building a
/// raster is a pure read.
///
/// # Example
///
/// ```ignore
/// use geoprofile::RasterCache;
///
/// let cache = RasterCache::builder()
///     .index_file(2056, "/data/dtm/lv95/index.shp")
///     .index_file(21781, "/data/dtm/lv03/index.shp")
///     .preload(2056)
///     .build()?;
///
/// let raster = cache.get(2056)?;
/// ```
pub struct RasterCache {
    index_files: HashMap<SpatialReference, PathBuf>,
    rasters: Cache<SpatialReference, Arc<GeoRaster>>,
}

impl RasterCache {
    /// Create a builder for configuring the cache.
    pub fn builder() -> RasterCacheBuilder {
        RasterCacheBuilder::default()
    }

    /// The raster for `sr`, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// [`DtmError::UnknownSpatialReference`] if no index file is configured
    /// for `sr`; otherwise any construction failure of the underlying
    /// raster, which is a configuration defect rather than a per-request
    /// condition.
    pub fn get(&self, sr: SpatialReference) -> Result<Arc<GeoRaster>> {
        let index_file = self
            .index_files
            .get(&sr)
            .ok_or(DtmError::UnknownSpatialReference { sr })?;
        self.rasters
            .try_get_with(sr, || {
                debug!(sr, "building terrain raster");
                GeoRaster::open(index_file).map(Arc::new)
            })
            .map_err(DtmError::Shared)
    }

    /// Whether the raster for `sr` is already built.
    pub fn is_loaded(&self, sr: SpatialReference) -> bool {
        self.rasters.contains_key(&sr)
    }

    /// Configured spatial references, in ascending order.
    pub fn spatial_references(&self) -> Vec<SpatialReference> {
        let mut ids: Vec<SpatialReference> = self.index_files.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Builder for [`RasterCache`].
#[derive(Default)]
pub struct RasterCacheBuilder {
    index_files: HashMap<SpatialReference, PathBuf>,
    preload: Vec<SpatialReference>,
}

impl RasterCacheBuilder {
    /// Register the tile-index file backing `sr`.
    pub fn index_file<P: Into<PathBuf>>(mut self, sr: SpatialReference, path: P) -> Self {
        self.index_files.insert(sr, path.into());
        self
    }

    /// Eagerly build the raster for `sr` during [`Self::build`].
    pub fn preload(mut self, sr: SpatialReference) -> Self {
        self.preload.push(sr);
        self
    }

    /// Build the cache and run the configured preloads.
    ///
    /// # Errors
    ///
    /// A raster that cannot be built aborts the whole preload: a missing or
    /// malformed dataset is a startup-time defect, not something to degrade
    /// around.
    pub fn build(self) -> Result<RasterCache> {
        let cache = RasterCache {
            index_files: self.index_files,
            rasters: Cache::builder().build(),
        };
        for sr in self.preload {
            cache.get(sr)?;
            info!(sr, "terrain raster preloaded");
        }
        Ok(cache)
    }
}
