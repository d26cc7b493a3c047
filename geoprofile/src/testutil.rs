//! Synthetic dataset builders shared by the unit tests: tile-index files,
//! attribute tables and terrain tiles with known cell values.

use std::fs;
use std::path::{Path, PathBuf};

use crate::shape::BoundingBox;

pub(crate) const INDEX_HEADER_LEN: usize = 100;

const TILE_HEADER_LEN: usize = 256;
const LOCATION_FIELD_LEN: u8 = 80;

/// Encode one polygon index record (ring of the bounding box corners).
pub(crate) fn polygon_record(number: u32, bounds: &BoundingBox) -> Vec<u8> {
    let points = [
        (bounds.min_x, bounds.min_y),
        (bounds.min_x, bounds.max_y),
        (bounds.max_x, bounds.max_y),
        (bounds.max_x, bounds.min_y),
        (bounds.min_x, bounds.min_y),
    ];
    // shape type + bbox + two counts + one part offset + ring points
    let content_len = (4 + 32 + 4 + 4 + 4 + points.len() * 16) / 2;

    let mut buf = Vec::new();
    buf.extend_from_slice(&number.to_be_bytes());
    buf.extend_from_slice(&(content_len as u32).to_be_bytes());
    buf.extend_from_slice(&5u32.to_le_bytes());
    for v in [bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y] {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&1i32.to_le_bytes());
    buf.extend_from_slice(&(points.len() as i32).to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    for (x, y) in points {
        buf.extend_from_slice(&x.to_le_bytes());
        buf.extend_from_slice(&y.to_le_bytes());
    }
    buf
}

fn tile_header(cols: u32, rows: u32, cell_size: i16, is_float: bool) -> Vec<u8> {
    let mut header = vec![0u8; TILE_HEADER_LEN];
    header[10..14].copy_from_slice(&cols.to_le_bytes());
    header[14..18].copy_from_slice(&rows.to_le_bytes());
    header[18..20].copy_from_slice(&cell_size.to_le_bytes());
    header[20..22].copy_from_slice(&i16::from(is_float).to_le_bytes());
    header
}

/// Write a tile of i16 cells; `values` is indexed `py + px * rows`.
pub(crate) fn write_i16_tile(path: &Path, cols: u32, rows: u32, values: &[i16]) {
    assert_eq!(values.len(), (cols * rows) as usize);
    let mut data = tile_header(cols, rows, 2, false);
    for v in values {
        data.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, data).unwrap();
}

/// Write a tile of f32 cells; `values` is indexed `py + px * rows`.
pub(crate) fn write_float_tile(path: &Path, cols: u32, rows: u32, values: &[f32]) {
    assert_eq!(values.len(), (cols * rows) as usize);
    let mut data = tile_header(cols, rows, 4, true);
    for v in values {
        data.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, data).unwrap();
}

/// Write a tile of i32 cells; `values` is indexed `py + px * rows`.
pub(crate) fn write_i32_tile(path: &Path, cols: u32, rows: u32, values: &[i32]) {
    assert_eq!(values.len(), (cols * rows) as usize);
    let mut data = tile_header(cols, rows, 4, false);
    for v in values {
        data.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, data).unwrap();
}

/// One tile of a synthetic dataset.
pub(crate) struct TileSpec {
    pub bounds: BoundingBox,
    /// Uniform altitude of every cell.
    pub value: i16,
    /// Location recorded in the attribute table; defaults to `tile_{i}.bt`.
    pub name: Option<String>,
}

impl TileSpec {
    pub fn flat(min_x: f64, min_y: f64, max_x: f64, max_y: f64, value: i16) -> Self {
        Self {
            bounds: BoundingBox {
                min_x,
                min_y,
                max_x,
                max_y,
            },
            value,
            name: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Write a complete dataset (index, attribute table, tile files) into `dir`
/// and return the index path.
pub(crate) fn write_dataset(dir: &Path, tiles: &[TileSpec]) -> PathBuf {
    let mut index = vec![0u8; INDEX_HEADER_LEN];
    let mut locations = Vec::new();

    for (i, spec) in tiles.iter().enumerate() {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("tile_{i}.bt"));
        let cols = 10;
        let rows = 10;
        write_i16_tile(
            &dir.join(&name),
            cols,
            rows,
            &vec![spec.value; (cols * rows) as usize],
        );
        index.extend(polygon_record(i as u32 + 1, &spec.bounds));
        locations.push(name);
    }

    let index_path = dir.join("index.shp");
    fs::write(&index_path, index).unwrap();
    fs::write(index_path.with_extension("dbf"), attribute_table(&locations)).unwrap();
    index_path
}

/// Encode an attribute table with a single `location` character field.
fn attribute_table(locations: &[String]) -> Vec<u8> {
    let mut data = Vec::new();
    data.push(0x03);
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(&(locations.len() as u32).to_le_bytes());
    data.extend_from_slice(&(33u16 + 32).to_le_bytes());
    data.extend_from_slice(&[0u8; 22]);

    let mut descriptor = [0u8; 32];
    descriptor[..8].copy_from_slice(b"location");
    descriptor[11] = b'C';
    descriptor[16] = LOCATION_FIELD_LEN;
    data.extend_from_slice(&descriptor);
    data.push(0x0D);

    for location in locations {
        assert!(location.len() <= LOCATION_FIELD_LEN as usize);
        data.push(b' ');
        let mut cell = vec![b' '; LOCATION_FIELD_LEN as usize];
        cell[..location.len()].copy_from_slice(location.as_bytes());
        data.extend_from_slice(&cell);
    }
    data
}
