//! Terrain tile parsing and point queries.
//!
//! Each tile is one rectangular patch of the elevation grid, backed by a
//! little-endian binary file: a 256-byte header (grid dimensions, cell size
//! and float flag at byte offset 10) followed by raw cell data laid out
//! column-major with a row stride. Cell values are 32-bit IEEE floats,
//! signed 16-bit or signed 32-bit integers.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::shape::BoundingBox;

/// Byte offset of the grid dimensions within the tile header.
const HEADER_OFFSET: usize = 10;

/// Byte offset of the first cell.
const DATA_OFFSET: usize = 256;

/// Grid dimensions and cell encoding of one tile file.
///
/// Read once, on the first query against the tile, and cached for the
/// tile's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridHeader {
    pub cols: u32,
    pub rows: u32,
    /// Byte stride of one cell (2 or 4 in practice).
    pub cell_size: i16,
    /// Cells hold 32-bit IEEE floats instead of integers.
    pub is_float: bool,
}

impl GridHeader {
    fn parse(data: &[u8], path: &Path) -> Result<Self> {
        if data.len() < HEADER_OFFSET + 12 {
            return Err(invalid_data(path, "file shorter than the grid header"));
        }
        let raw = &data[HEADER_OFFSET..HEADER_OFFSET + 12];
        let header = GridHeader {
            cols: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            rows: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            cell_size: i16::from_le_bytes([raw[8], raw[9]]),
            is_float: i16::from_le_bytes([raw[10], raw[11]]) == 1,
        };
        if header.cols == 0 || header.rows == 0 || header.cell_size <= 0 {
            return Err(invalid_data(path, "grid header with impossible dimensions"));
        }
        Ok(header)
    }
}

/// One tile of the terrain model.
///
/// The tile owns its bounds and file path from the moment the index is
/// decoded; the grid header is populated on the first query. The backing
/// file is never held open between batches — see [`TerrainTile::open`].
#[derive(Debug)]
pub struct TerrainTile {
    bounds: BoundingBox,
    path: PathBuf,
    header: OnceCell<GridHeader>,
}

impl TerrainTile {
    pub fn new(bounds: BoundingBox, path: PathBuf) -> Self {
        Self {
            bounds,
            path,
            header: OnceCell::new(),
        }
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Half-open containment test, `[min, max)` on both axes.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.bounds.contains(x, y)
    }

    /// Open the backing file for one batch of queries.
    ///
    /// The returned reader memory-maps the file and keeps it mapped until
    /// dropped, so all points of a profile that hit this tile share one
    /// handle and the handle is released when the batch scope ends, on every
    /// exit path. The grid header is read on the first `open` of the tile's
    /// lifetime and reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or if its
    /// header is truncated or implausible.
    pub fn open(&self) -> Result<TileReader<'_>> {
        let file = File::open(&self.path)?;

        // SAFETY: the tile files are read-only datasets; the mapping is
        // never exposed mutably.
        let data = unsafe { Mmap::map(&file)? };

        let header = *self
            .header
            .get_or_try_init(|| GridHeader::parse(&data, &self.path))?;
        let resolution_x = (self.bounds.max_x - self.bounds.min_x) / f64::from(header.cols);
        let resolution_y = (self.bounds.max_y - self.bounds.min_y) / f64::from(header.rows);

        Ok(TileReader {
            tile: self,
            data,
            header,
            resolution_x,
            resolution_y,
        })
    }
}

/// A scoped, memory-mapped view of one tile file.
pub struct TileReader<'a> {
    tile: &'a TerrainTile,
    data: Mmap,
    header: GridHeader,
    resolution_x: f64,
    resolution_y: f64,
}

impl TileReader<'_> {
    /// The tile this reader was opened from.
    pub fn tile(&self) -> &TerrainTile {
        self.tile
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.tile.contains(x, y)
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    /// Grid spacing along x, in projected meters.
    pub fn resolution_x(&self) -> f64 {
        self.resolution_x
    }

    /// Grid spacing along y, in projected meters.
    pub fn resolution_y(&self) -> f64 {
        self.resolution_y
    }

    /// Decode the ground altitude at `(x, y)`.
    ///
    /// The caller must have routed through a containment test first: the
    /// tile does not bounds-check the coordinate, and a point outside
    /// `[min, max)` maps to a meaningless cell. A cell offset falling
    /// outside the file is reported as an IO error, never read.
    pub fn height_at(&self, x: f64, y: f64) -> Result<f64> {
        let px = ((x - self.tile.bounds.min_x) / self.resolution_x).floor() as i64;
        let py = ((y - self.tile.bounds.min_y) / self.resolution_y).floor() as i64;
        let cell_size = i64::from(self.header.cell_size);

        // Column-major with row stride: cell (px, py) lives at index
        // py + px * rows. This matches the tile writer exactly.
        let offset = DATA_OFFSET as i64 + (py + px * i64::from(self.header.rows)) * cell_size;
        let width: usize = if self.header.is_float || self.header.cell_size != 2 {
            4
        } else {
            2
        };
        if offset < 0 || offset as usize + width > self.data.len() {
            return Err(invalid_data(
                &self.tile.path,
                &format!("cell offset {offset} outside file"),
            ));
        }
        let cell = &self.data[offset as usize..offset as usize + width];

        let value = if self.header.is_float {
            f64::from(f32::from_le_bytes([cell[0], cell[1], cell[2], cell[3]]))
        } else if self.header.cell_size == 2 {
            f64::from(i16::from_le_bytes([cell[0], cell[1]]))
        } else {
            f64::from(i32::from_le_bytes([cell[0], cell[1], cell[2], cell[3]]))
        };
        Ok(value)
    }
}

fn invalid_data(path: &Path, reason: &str) -> crate::error::DtmError {
    crate::error::DtmError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("tile {}: {reason}", path.display()),
    ))
}
