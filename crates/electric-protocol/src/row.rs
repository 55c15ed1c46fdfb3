//! Row codec (C3): `(nulls_bitmask, values[])` given an ordered column schema.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// One column of a `Relation`, in the order it is advertised on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub pg_type_name: String,
    pub nullable: bool,
    pub part_of_identity: bool,
}

/// A decoded or to-be-encoded column value. Distinct from "absent" (not a
/// key in the map at all), which the codec also treats as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnValue {
    Null,
    Value(Vec<u8>),
}

impl ColumnValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ColumnValue::Null => None,
            ColumnValue::Value(v) => Some(v),
        }
    }
}

/// Wire row: MSB-first null bitmask (padded with zeros to a whole byte) plus
/// one value per column, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub nulls: Vec<u8>,
    pub values: Vec<Vec<u8>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowCodecError {
    #[error("value for column '{0}' is out of range for its integer type")]
    IntegerOutOfRange(String),
    #[error("value for column '{0}' is not a valid float")]
    InvalidFloat(String),
    #[error("value for column '{0}' is not a canonical UUID")]
    InvalidUuid(String),
    #[error("non-empty value for column '{0}' has its null bit set")]
    NonEmptyValueMarkedNull(String),
    #[error("row has {got} values but schema has {expected} columns")]
    ColumnCountMismatch { expected: usize, got: usize },
}

fn bitmask_len(n_columns: usize) -> usize {
    n_columns.div_ceil(8)
}

fn set_bit(mask: &mut [u8], index: usize) {
    let byte = index / 8;
    let bit = 7 - (index % 8); // MSB-first within each byte
    mask[byte] |= 1 << bit;
}

fn get_bit(mask: &[u8], index: usize) -> bool {
    let byte = index / 8;
    let bit = 7 - (index % 8);
    (mask[byte] >> bit) & 1 == 1
}

/// Encode `(row_map, column_order) -> Row` per `spec.md` §4.3.
pub fn encode(values: &HashMap<String, ColumnValue>, columns: &[Column]) -> Row {
    let mut nulls = vec![0u8; bitmask_len(columns.len())];
    let mut out_values = Vec::with_capacity(columns.len());

    for (i, col) in columns.iter().enumerate() {
        match values.get(&col.name) {
            None | Some(ColumnValue::Null) => {
                set_bit(&mut nulls, i);
                out_values.push(Vec::new());
            }
            Some(ColumnValue::Value(bytes)) => {
                let encoded = if col.pg_type_name == "timestamptz" {
                    normalize_timestamptz_bytes(bytes)
                } else {
                    bytes.clone()
                };
                out_values.push(encoded);
            }
        }
    }

    Row {
        nulls,
        values: out_values,
    }
}

/// Decode `Row -> row_map`, validating per-type textual encodings.
pub fn decode(
    row: &Row,
    columns: &[Column],
) -> Result<HashMap<String, ColumnValue>, RowCodecError> {
    if row.values.len() != columns.len() {
        return Err(RowCodecError::ColumnCountMismatch {
            expected: columns.len(),
            got: row.values.len(),
        });
    }
    let expected_mask_len = bitmask_len(columns.len());
    // A shorter-than-expected mask is treated as all-zero for the missing
    // tail bits; a 0-column schema has a 0-byte mask.
    let mut mask = row.nulls.clone();
    if mask.len() < expected_mask_len {
        mask.resize(expected_mask_len, 0);
    }

    let mut out = HashMap::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        let is_null = get_bit(&mask, i);
        let raw = &row.values[i];
        if is_null {
            if !raw.is_empty() {
                return Err(RowCodecError::NonEmptyValueMarkedNull(col.name.clone()));
            }
            out.insert(col.name.clone(), ColumnValue::Null);
            continue;
        }
        validate_typed_value(col, raw)?;
        out.insert(col.name.clone(), ColumnValue::Value(raw.clone()));
    }
    Ok(out)
}

fn validate_typed_value(col: &Column, raw: &[u8]) -> Result<(), RowCodecError> {
    match col.pg_type_name.as_str() {
        "int2" => parse_int_range(col, raw, i16::MIN.into(), i16::MAX.into()),
        "int4" => parse_int_range(col, raw, i32::MIN.into(), i32::MAX.into()),
        "int8" => parse_int_range(col, raw, i64::MIN.into(), i64::MAX.into()),
        "float8" => {
            let s = String::from_utf8_lossy(raw);
            s.parse::<f64>()
                .map(|_| ())
                .map_err(|_| RowCodecError::InvalidFloat(col.name.clone()))
        }
        "uuid" => {
            let s = String::from_utf8_lossy(raw);
            uuid::Uuid::parse_str(&s)
                .map(|_| ())
                .map_err(|_| RowCodecError::InvalidUuid(col.name.clone()))
        }
        _ => Ok(()),
    }
}

fn parse_int_range(col: &Column, raw: &[u8], min: i128, max: i128) -> Result<(), RowCodecError> {
    let s = String::from_utf8_lossy(raw);
    let v: i128 = s
        .parse()
        .map_err(|_| RowCodecError::IntegerOutOfRange(col.name.clone()))?;
    if v < min || v > max {
        return Err(RowCodecError::IntegerOutOfRange(col.name.clone()));
    }
    Ok(())
}

/// `timestamptz` normalization: a bare `±HH` offset gets `:00` appended.
/// `±HH:MM` offsets pass through untouched.
fn normalize_timestamptz_bytes(bytes: &[u8]) -> Vec<u8> {
    let Ok(s) = std::str::from_utf8(bytes) else {
        return bytes.to_vec();
    };
    normalize_timestamptz(s).into_bytes()
}

fn normalize_timestamptz(s: &str) -> String {
    let split_idx = s.find(' ').unwrap_or(0);
    let (head, tail) = s.split_at(split_idx);
    if let Some(sign_pos) = tail.find(['+', '-']) {
        let offset = &tail[sign_pos + 1..];
        if offset.len() == 2 && offset.bytes().all(|b| b.is_ascii_digit()) {
            return format!("{head}{}{offset}:00", &tail[..=sign_pos]);
        }
    }
    s.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<Column> {
        vec![
            Column { name: "id".into(), pg_type_name: "text".into(), nullable: false, part_of_identity: true },
            Column { name: "content".into(), pg_type_name: "text".into(), nullable: true, part_of_identity: false },
            Column { name: "note".into(), pg_type_name: "text".into(), nullable: true, part_of_identity: false },
        ]
    }

    #[test]
    fn round_trip_present_and_missing_keys() {
        let columns = cols();
        let mut m = HashMap::new();
        m.insert("id".to_string(), ColumnValue::Value(b"u1".to_vec()));
        m.insert("content".to_string(), ColumnValue::Value(b"hello".to_vec()));
        // "note" absent entirely.
        let row = encode(&m, &columns);
        let decoded = decode(&row, &columns).unwrap();
        assert_eq!(decoded["id"], ColumnValue::Value(b"u1".to_vec()));
        assert_eq!(decoded["content"], ColumnValue::Value(b"hello".to_vec()));
        assert_eq!(decoded["note"], ColumnValue::Null);
    }

    #[test]
    fn null_and_empty_are_distinguished() {
        let columns = cols();
        let mut m = HashMap::new();
        m.insert("id".to_string(), ColumnValue::Value(b"u1".to_vec()));
        m.insert("content".to_string(), ColumnValue::Null);
        m.insert("note".to_string(), ColumnValue::Value(Vec::new()));
        let row = encode(&m, &columns);
        // bit 1 (content) set, bit 2 (note) clear
        assert!(get_bit(&row.nulls, 1));
        assert!(!get_bit(&row.nulls, 2));
        let decoded = decode(&row, &columns).unwrap();
        assert_eq!(decoded["content"], ColumnValue::Null);
        assert_eq!(decoded["note"], ColumnValue::Value(Vec::new()));
    }

    #[test]
    fn bitmask_is_msb_first_and_padded() {
        let columns: Vec<Column> = (0..9)
            .map(|i| Column { name: format!("c{i}"), pg_type_name: "text".into(), nullable: true, part_of_identity: false })
            .collect();
        let mut m = HashMap::new();
        m.insert("c0".to_string(), ColumnValue::Null);
        m.insert("c8".to_string(), ColumnValue::Null);
        let row = encode(&m, &columns);
        assert_eq!(row.nulls.len(), 2);
        assert_eq!(row.nulls[0], 0b1000_0000);
        assert_eq!(row.nulls[1], 0b1000_0000);
    }

    #[test]
    fn decode_rejects_non_empty_value_with_null_bit_set() {
        let columns = cols();
        let row = Row {
            nulls: vec![0b0100_0000],
            values: vec![b"u1".to_vec(), b"oops".to_vec(), Vec::new()],
        };
        assert_eq!(
            decode(&row, &columns),
            Err(RowCodecError::NonEmptyValueMarkedNull("content".into()))
        );
    }

    #[test]
    fn decode_validates_integer_range_and_uuid() {
        let columns = vec![
            Column { name: "n".into(), pg_type_name: "int2".into(), nullable: false, part_of_identity: false },
        ];
        let ok = Row { nulls: vec![0], values: vec![b"100".to_vec()] };
        assert!(decode(&ok, &columns).is_ok());
        let too_big = Row { nulls: vec![0], values: vec![b"999999".to_vec()] };
        assert_eq!(
            decode(&too_big, &columns),
            Err(RowCodecError::IntegerOutOfRange("n".into()))
        );

        let uuid_cols = vec![
            Column { name: "u".into(), pg_type_name: "uuid".into(), nullable: false, part_of_identity: false },
        ];
        let bad_uuid = Row { nulls: vec![0], values: vec![b"not-a-uuid".to_vec()] };
        assert_eq!(
            decode(&bad_uuid, &uuid_cols),
            Err(RowCodecError::InvalidUuid("u".into()))
        );
    }

    #[test]
    fn timestamptz_short_offset_gets_normalized_long_offset_untouched() {
        assert_eq!(
            normalize_timestamptz("2023-08-14 10:01:28.848242-04"),
            "2023-08-14 10:01:28.848242-04:00"
        );
        assert_eq!(
            normalize_timestamptz("2023-08-14 08:31:28.848242-05:30"),
            "2023-08-14 08:31:28.848242-05:30"
        );
    }

    #[test]
    fn encode_normalizes_timestamptz_column_values() {
        let columns = vec![
            Column { name: "ts".into(), pg_type_name: "timestamptz".into(), nullable: false, part_of_identity: false },
        ];
        let mut m = HashMap::new();
        m.insert(
            "ts".to_string(),
            ColumnValue::Value(b"2023-08-14 10:01:28.848242-04".to_vec()),
        );
        let row = encode(&m, &columns);
        assert_eq!(row.values[0], b"2023-08-14 10:01:28.848242-04:00".to_vec());
    }
}
