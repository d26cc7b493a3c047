//! Decoder for the binary tile-index format.
//!
//! The index is a sequential stream of shape records, each carrying a
//! big-endian record header and a little-endian payload. The only payload
//! field the terrain system consumes is the bounding box of polygon-like
//! records (one axis-aligned box per tile); the remaining geometry is
//! decoded byte-for-byte so the stream position stays correct, then
//! discarded.

use std::io::{self, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::error::{DtmError, Result};

/// Length of the global file header preceding the first record.
const FILE_HEADER_LEN: u64 = 100;

/// Byte length of one (x, y) point in a record payload.
const XY_POINT_LEN: u64 = 16;

/// An axis-aligned rectangle in projected meters.
///
/// Containment is half-open on both axes: a point on the `min` edge is
/// inside, a point on the `max` edge belongs to the neighbouring rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Check whether `(x, y)` falls inside `[min, max)` on both axes.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }
}

/// Decoded geometry of one index record.
///
/// Polyline, polygon and multipoint records keep only their bounding box;
/// their part and point payloads are consumed and discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Null,
    Point { x: f64, y: f64 },
    Polyline(BoundingBox),
    Polygon(BoundingBox),
    MultiPoint(BoundingBox),
}

impl Geometry {
    /// The record's bounding box, if the shape type carries one.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Polyline(b) | Geometry::Polygon(b) | Geometry::MultiPoint(b) => Some(*b),
            Geometry::Null | Geometry::Point { .. } => None,
        }
    }
}

/// One record of the tile index.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    /// Record number as declared in the stream (1-based).
    pub number: u32,
    pub geometry: Geometry,
}

/// Read every record of an index stream.
///
/// The global header's record-count field is not trusted: decoding proceeds
/// record-by-record until the stream is exhausted. A stream ending cleanly
/// at a record boundary is a normal end of input; ending mid-record is a
/// [`DtmError::MalformedIndex`].
pub fn read_index<R: Read>(mut reader: R) -> Result<Vec<ShapeRecord>> {
    let mut header = [0u8; FILE_HEADER_LEN as usize];
    reader
        .read_exact(&mut header)
        .map_err(|_| malformed("file header shorter than 100 bytes"))?;

    let mut records = Vec::new();
    loop {
        // A clean EOF here means the previous record was the last one.
        let mut record_number = [0u8; 4];
        match reader.read_exact(&mut record_number) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(DtmError::Io(e)),
        }
        let number = u32::from_be_bytes(record_number);

        // Content length (in 16-bit words) is declared but not needed: the
        // payload is walked field by field instead.
        let _content_len = reader
            .read_u32::<BigEndian>()
            .map_err(|_| malformed_record(number, "truncated record header"))?;
        let shape_type = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| malformed_record(number, "truncated record header"))?;

        let geometry = match shape_type {
            0 => Geometry::Null,
            1 => {
                let x = read_f64(&mut reader, number)?;
                let y = read_f64(&mut reader, number)?;
                Geometry::Point { x, y }
            }
            3 | 5 => {
                let bbox = read_bounding_box(&mut reader, number)?;
                let num_parts = read_count(&mut reader, number, "part count")?;
                let num_points = read_count(&mut reader, number, "point count")?;
                skip(&mut reader, num_parts * 4, number)?;
                skip(&mut reader, num_points * XY_POINT_LEN, number)?;
                if shape_type == 3 {
                    Geometry::Polyline(bbox)
                } else {
                    Geometry::Polygon(bbox)
                }
            }
            8 => {
                let bbox = read_bounding_box(&mut reader, number)?;
                let num_points = read_count(&mut reader, number, "point count")?;
                skip(&mut reader, num_points * XY_POINT_LEN, number)?;
                Geometry::MultiPoint(bbox)
            }
            other => {
                return Err(malformed_record(
                    number,
                    &format!("unrecognized shape type {other}"),
                ))
            }
        };

        records.push(ShapeRecord { number, geometry });
    }

    debug!(records = records.len(), "tile index decoded");
    Ok(records)
}

fn read_bounding_box<R: Read>(reader: &mut R, record: u32) -> Result<BoundingBox> {
    Ok(BoundingBox {
        min_x: read_f64(reader, record)?,
        min_y: read_f64(reader, record)?,
        max_x: read_f64(reader, record)?,
        max_y: read_f64(reader, record)?,
    })
}

fn read_f64<R: Read>(reader: &mut R, record: u32) -> Result<f64> {
    reader
        .read_f64::<LittleEndian>()
        .map_err(|_| malformed_record(record, "truncated geometry"))
}

fn read_count<R: Read>(reader: &mut R, record: u32, what: &str) -> Result<u64> {
    let count = reader
        .read_i32::<LittleEndian>()
        .map_err(|_| malformed_record(record, &format!("truncated {what}")))?;
    if count < 0 {
        return Err(malformed_record(record, &format!("negative {what}")));
    }
    Ok(count as u64)
}

/// Consume exactly `n` payload bytes whose values are discarded.
fn skip<R: Read>(reader: &mut R, n: u64, record: u32) -> Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
    if copied != n {
        return Err(malformed_record(record, "stream ends mid-record"));
    }
    Ok(())
}

fn malformed(reason: &str) -> DtmError {
    DtmError::MalformedIndex {
        reason: reason.to_string(),
    }
}

fn malformed_record(record: u32, reason: &str) -> DtmError {
    DtmError::MalformedIndex {
        reason: format!("record {record}: {reason}"),
    }
}
