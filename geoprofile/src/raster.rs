//! Spatial tile index over one terrain dataset.
//!
//! A [`GeoRaster`] is built once from a tile-index file and its companion
//! attribute table: each index record contributes one [`TerrainTile`] whose
//! bounds come from the record's bounding box and whose backing file comes
//! from the attribute "location" field. The structure is immutable after
//! construction; lookup is a linear first-match scan.

use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dbf::AttributeTable;
use crate::error::{DtmError, Result};
use crate::shape::read_index;
use crate::tile::TerrainTile;

/// File extension every referenced tile must carry.
pub const TILE_EXTENSION: &str = "bt";

/// Attribute field holding each tile's file location.
const LOCATION_FIELD: &str = "location";

/// An immutable set of terrain tiles covering one spatial reference.
#[derive(Debug)]
pub struct GeoRaster {
    tiles: Vec<TerrainTile>,
}

impl GeoRaster {
    /// Build the raster from a tile-index file.
    ///
    /// The companion attribute table is expected next to the index, with the
    /// same base name and the `dbf` extension. Relative tile locations are
    /// resolved against the index file's directory.
    ///
    /// # Errors
    ///
    /// Construction fails on a corrupt index ([`DtmError::MalformedIndex`]),
    /// a corrupt or incomplete attribute table
    /// ([`DtmError::MalformedAttributes`]) or a location that does not end
    /// with the tile extension ([`DtmError::InvalidTileReference`]). These
    /// are startup-time defects: the dataset serves no request at all rather
    /// than degrading silently.
    pub fn open<P: AsRef<Path>>(index_path: P) -> Result<Self> {
        let index_path = index_path.as_ref();
        debug!(index = %index_path.display(), "reading tile index");
        let shapes = read_index(BufReader::new(File::open(index_path)?))?;

        let attribute_path = index_path.with_extension("dbf");
        debug!(attributes = %attribute_path.display(), "reading attribute table");
        let table = AttributeTable::read(BufReader::new(File::open(&attribute_path)?))?;

        let location_index =
            table
                .field_index(LOCATION_FIELD)
                .ok_or_else(|| DtmError::MalformedAttributes {
                    reason: format!("no {LOCATION_FIELD:?} field in {}", attribute_path.display()),
                })?;
        if table.records().len() < shapes.len() {
            return Err(DtmError::MalformedAttributes {
                reason: format!(
                    "{} attribute records for {} index records",
                    table.records().len(),
                    shapes.len()
                ),
            });
        }

        let directory = match index_path.parent() {
            Some(parent) if parent != Path::new("") => parent,
            _ => Path::new("."),
        };

        let mut tiles = Vec::with_capacity(shapes.len());
        for (shape, record) in shapes.iter().zip(table.records()) {
            let location = record[location_index].as_text().ok_or_else(|| {
                DtmError::InvalidTileReference {
                    location: format!("{:?}", record[location_index]),
                    index: index_path.to_path_buf(),
                }
            })?;
            let tile_path = if Path::new(location).is_absolute() {
                PathBuf::from(location)
            } else {
                directory.join(location)
            };
            if tile_path.extension().and_then(OsStr::to_str) != Some(TILE_EXTENSION) {
                return Err(DtmError::InvalidTileReference {
                    location: location.to_string(),
                    index: index_path.to_path_buf(),
                });
            }
            let bounds = shape.geometry.bounding_box().ok_or_else(|| {
                DtmError::MalformedIndex {
                    reason: format!("record {} has no bounding box", shape.number),
                }
            })?;
            tiles.push(TerrainTile::new(bounds, tile_path));
        }

        info!(
            tiles = tiles.len(),
            index = %index_path.display(),
            "terrain raster loaded"
        );
        Ok(Self { tiles })
    }

    /// All tiles, in index order.
    pub fn tiles(&self) -> &[TerrainTile] {
        &self.tiles
    }

    /// First tile containing `(x, y)`, or `None` if the point is uncovered.
    pub fn tile_at(&self, x: f64, y: f64) -> Option<&TerrainTile> {
        self.tiles.iter().find(|tile| tile.contains(x, y))
    }

    /// Ground altitude at `(x, y)`.
    ///
    /// `None` means the point is outside every tile, or the covering tile
    /// became unreadable since the index was loaded; the latter is logged
    /// and degrades to "no altitude" instead of failing the query.
    pub fn height_at(&self, x: f64, y: f64) -> Option<f64> {
        let tile = self.tile_at(x, y)?;
        match tile.open().and_then(|reader| reader.height_at(x, y)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    tile = %tile.path().display(),
                    x, y, error = %e,
                    "tile unreadable, treating point as uncovered"
                );
                None
            }
        }
    }
}
