//! Decoder for the fixed-width attribute table paired with a tile index.
//!
//! The table stores one record per index entry; the terrain system reads it
//! for a single field, the tile file location, but the decoder handles the
//! full field-type repertoire so any companion table parses cleanly.
//!
//! Format summary: a 32-byte header (record count, header length), one
//! 32-byte descriptor per field, a terminator byte, then back-to-back
//! fixed-width data records prefixed with a one-byte deletion flag.

use std::io::Read;

use byteorder::ReadBytesExt;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::{DtmError, Result};

/// Byte that terminates the field-descriptor block.
const DESCRIPTOR_TERMINATOR: u8 = 0x0D;

/// Deletion-flag value of a live record.
const NOT_DELETED: u8 = b' ';

/// Per-field metadata from the table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Raw one-byte type code (`N`, `D`, `L`, `C`, ...).
    pub type_code: u8,
    /// Fixed width of the field in bytes.
    pub length: u8,
    /// Digits after the decimal point for numeric fields.
    pub decimal_count: u8,
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    /// `None` encodes the format's explicit "unknown" logical state.
    Logical(Option<bool>),
}

impl FieldValue {
    /// The value as text, for fields holding paths or labels.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A fully decoded attribute table: field metadata ahead of the data rows.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    fields: Vec<FieldDescriptor>,
    records: Vec<Vec<FieldValue>>,
}

impl AttributeTable {
    /// Decode a complete attribute stream.
    ///
    /// Records whose deletion flag is set are skipped entirely, so the
    /// returned rows pair one-to-one with the live entries of the index.
    ///
    /// # Errors
    ///
    /// Returns [`DtmError::MalformedAttributes`] if the header, descriptor
    /// terminator or any declared record is corrupt or truncated.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; 32];
        reader
            .read_exact(&mut header)
            .map_err(|_| malformed("header shorter than 32 bytes"))?;
        let record_count = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let header_len = u16::from_le_bytes([header[8], header[9]]);
        if header_len < 33 || (header_len - 33) % 32 != 0 {
            return Err(malformed(&format!("implausible header length {header_len}")));
        }
        let field_count = (header_len as usize - 33) / 32;
        debug!(record_count, field_count, "attribute table header decoded");

        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(read_descriptor(&mut reader)?);
        }

        let terminator = reader
            .read_u8()
            .map_err(|_| malformed("missing descriptor terminator"))?;
        if terminator != DESCRIPTOR_TERMINATOR {
            return Err(malformed(&format!(
                "invalid descriptor terminator 0x{terminator:02X}"
            )));
        }

        let record_len = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();
        let mut buf = vec![0u8; record_len];
        let mut records = Vec::new();
        for i in 0..record_count {
            reader
                .read_exact(&mut buf)
                .map_err(|_| malformed(&format!("record {i} truncated")))?;
            if buf[0] != NOT_DELETED {
                continue;
            }
            records.push(decode_record(&fields, &buf[1..])?);
        }

        Ok(Self { fields, records })
    }

    /// Field metadata, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Live data records, in file order.
    pub fn records(&self) -> &[Vec<FieldValue>] {
        &self.records
    }

    /// Position of the field named `name` (ASCII case-insensitive).
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }
}

fn read_descriptor<R: Read>(reader: &mut R) -> Result<FieldDescriptor> {
    let mut raw = [0u8; 32];
    reader
        .read_exact(&mut raw)
        .map_err(|_| malformed("truncated field descriptor"))?;
    let name_bytes: Vec<u8> = raw[..11].iter().copied().filter(|&b| b != 0).collect();
    Ok(FieldDescriptor {
        name: String::from_utf8_lossy(&name_bytes).into_owned(),
        type_code: raw[11],
        length: raw[16],
        decimal_count: raw[17],
    })
}

fn decode_record(fields: &[FieldDescriptor], data: &[u8]) -> Result<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(fields.len());
    let mut offset = 0;
    for field in fields {
        let raw = &data[offset..offset + field.length as usize];
        offset += field.length as usize;
        values.push(decode_value(field, raw)?);
    }
    Ok(values)
}

fn decode_value(field: &FieldDescriptor, raw: &[u8]) -> Result<FieldValue> {
    let text = String::from_utf8_lossy(raw);
    match field.type_code {
        b'N' => {
            let trimmed: String = text.chars().filter(|&c| c != '\0').collect();
            let trimmed = trimmed.trim();
            if trimmed.is_empty() {
                Ok(FieldValue::Integer(0))
            } else if field.decimal_count > 0 {
                let value = trimmed.parse::<f64>().map_err(|_| {
                    malformed(&format!("field {:?}: invalid decimal {trimmed:?}", field.name))
                })?;
                Ok(FieldValue::Decimal(value))
            } else {
                let value = trimmed.parse::<i64>().map_err(|_| {
                    malformed(&format!("field {:?}: invalid integer {trimmed:?}", field.name))
                })?;
                Ok(FieldValue::Integer(value))
            }
        }
        b'D' => {
            let digits = text.trim();
            let parsed = (digits.len() == 8)
                .then(|| {
                    let y = digits[0..4].parse::<i32>().ok()?;
                    let m = digits[4..6].parse::<u32>().ok()?;
                    let d = digits[6..8].parse::<u32>().ok()?;
                    NaiveDate::from_ymd_opt(y, m, d)
                })
                .flatten();
            parsed.map(FieldValue::Date).ok_or_else(|| {
                malformed(&format!("field {:?}: invalid date {digits:?}", field.name))
            })
        }
        b'L' => {
            let flag = raw.first().copied().unwrap_or(b'?');
            let value = match flag {
                b'Y' | b'y' | b'T' | b't' => Some(true),
                b'N' | b'n' | b'F' | b'f' => Some(false),
                _ => None,
            };
            Ok(FieldValue::Logical(value))
        }
        _ => {
            let trimmed: String = text.chars().filter(|&c| c != '\0').collect();
            Ok(FieldValue::Text(trimmed.trim().to_string()))
        }
    }
}

fn malformed(reason: &str) -> DtmError {
    DtmError::MalformedAttributes {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestField {
        name: &'static str,
        type_code: u8,
        length: u8,
        decimal_count: u8,
    }

    /// Assemble a minimal attribute file from field specs and raw rows.
    fn build_table(fields: &[TestField], rows: &[Vec<&[u8]>], deleted: &[bool]) -> Vec<u8> {
        let header_len = 33 + 32 * fields.len() as u16;
        let mut data = Vec::new();
        data.push(0x03); // version byte
        data.extend_from_slice(&[0, 0, 0]); // last-update date
        data.extend_from_slice(&(rows.len() as u32).to_le_bytes());
        data.extend_from_slice(&header_len.to_le_bytes());
        data.extend_from_slice(&[0u8; 22]);
        assert_eq!(data.len(), 32);

        for f in fields {
            let mut descriptor = [0u8; 32];
            descriptor[..f.name.len()].copy_from_slice(f.name.as_bytes());
            descriptor[11] = f.type_code;
            descriptor[16] = f.length;
            descriptor[17] = f.decimal_count;
            data.extend_from_slice(&descriptor);
        }
        data.push(DESCRIPTOR_TERMINATOR);

        for (row, &is_deleted) in rows.iter().zip(deleted) {
            data.push(if is_deleted { b'*' } else { b' ' });
            for (field, value) in fields.iter().zip(row) {
                let mut cell = vec![b' '; field.length as usize];
                cell[..value.len()].copy_from_slice(value);
                data.extend_from_slice(&cell);
            }
        }
        data
    }

    #[test]
    fn test_field_typing() {
        let fields = [
            TestField { name: "location", type_code: b'C', length: 20, decimal_count: 0 },
            TestField { name: "area", type_code: b'N', length: 10, decimal_count: 2 },
            TestField { name: "id", type_code: b'N', length: 6, decimal_count: 0 },
            TestField { name: "surveyed", type_code: b'D', length: 8, decimal_count: 0 },
            TestField { name: "active", type_code: b'L', length: 1, decimal_count: 0 },
        ];
        let rows = vec![vec![
            b"tiles/a.bt".as_slice(),
            b"12.50",
            b"42",
            b"20190401",
            b"T",
        ]];
        let data = build_table(&fields, &rows, &[false]);

        let table = AttributeTable::read(&data[..]).unwrap();
        assert_eq!(table.fields().len(), 5);
        assert_eq!(table.records().len(), 1);

        let record = &table.records()[0];
        assert_eq!(record[0], FieldValue::Text("tiles/a.bt".to_string()));
        assert_eq!(record[1], FieldValue::Decimal(12.5));
        assert_eq!(record[2], FieldValue::Integer(42));
        assert_eq!(
            record[3],
            FieldValue::Date(NaiveDate::from_ymd_opt(2019, 4, 1).unwrap())
        );
        assert_eq!(record[4], FieldValue::Logical(Some(true)));
    }

    #[test]
    fn test_empty_numeric_is_zero_and_unknown_logical() {
        let fields = [
            TestField { name: "id", type_code: b'N', length: 6, decimal_count: 0 },
            TestField { name: "active", type_code: b'L', length: 1, decimal_count: 0 },
        ];
        let rows = vec![vec![b"".as_slice(), b"?"]];
        let data = build_table(&fields, &rows, &[false]);

        let table = AttributeTable::read(&data[..]).unwrap();
        let record = &table.records()[0];
        assert_eq!(record[0], FieldValue::Integer(0));
        assert_eq!(record[1], FieldValue::Logical(None));
    }

    #[test]
    fn test_deleted_record_is_skipped() {
        let fields = [TestField { name: "location", type_code: b'C', length: 12, decimal_count: 0 }];
        let rows = vec![
            vec![b"tiles/a.bt".as_slice()],
            vec![b"tiles/b.bt".as_slice()],
        ];
        let data = build_table(&fields, &rows, &[true, false]);

        let table = AttributeTable::read(&data[..]).unwrap();
        assert_eq!(table.records().len(), 1);
        assert_eq!(table.records()[0][0].as_text(), Some("tiles/b.bt"));
    }

    #[test]
    fn test_field_index_case_insensitive() {
        let fields = [TestField { name: "LOCATION", type_code: b'C', length: 12, decimal_count: 0 }];
        let rows = vec![vec![b"tiles/a.bt".as_slice()]];
        let data = build_table(&fields, &rows, &[false]);

        let table = AttributeTable::read(&data[..]).unwrap();
        assert_eq!(table.field_index("location"), Some(0));
        assert_eq!(table.field_index("missing"), None);
    }

    #[test]
    fn test_invalid_terminator() {
        let fields = [TestField { name: "id", type_code: b'N', length: 4, decimal_count: 0 }];
        let mut data = build_table(&fields, &[], &[]);
        let terminator_pos = 32 + 32;
        data[terminator_pos] = 0xFF;

        let result = AttributeTable::read(&data[..]);
        assert!(matches!(result, Err(DtmError::MalformedAttributes { .. })));
    }

    #[test]
    fn test_truncated_record() {
        let fields = [TestField { name: "location", type_code: b'C', length: 12, decimal_count: 0 }];
        let rows = vec![vec![b"tiles/a.bt".as_slice()]];
        let mut data = build_table(&fields, &rows, &[false]);
        data.truncate(data.len() - 4);

        let result = AttributeTable::read(&data[..]);
        assert!(matches!(result, Err(DtmError::MalformedAttributes { .. })));
    }

    #[test]
    fn test_truncated_header() {
        let result = AttributeTable::read(&[0u8; 10][..]);
        assert!(matches!(result, Err(DtmError::MalformedAttributes { .. })));
    }
}
