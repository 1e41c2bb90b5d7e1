use crate::batch::{BoundBatch, BoundColumn};
use crate::schema::{BindField, Category, TypeCode};
use crate::value::{Value, timestamp_to_units};
use crate::{Error, Result};

pub const RAW_BLOCK_VERSION: i32 = 1;

/// version, total length, rows, columns, flag word (4 bytes each) + group id.
pub const HEADER_LEN: usize = 28;
pub const TOTAL_LEN_OFFSET: usize = 4;
/// type code (1) + meta (4).
pub const DESCRIPTOR_LEN: usize = 5;
pub const LENGTH_ENTRY_LEN: usize = 4;
pub const OFFSET_ENTRY_LEN: usize = 4;
pub const VAR_LEN_PREFIX: usize = 2;

/// Offset-table value for a null row of a variable-length column.
pub const NULL_OFFSET: i32 = -1;

fn write_i32_le(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64_le(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn count_i32(n: usize, what: &str) -> Result<i32> {
    n.try_into()
        .map_err(|_| Error::Other(format!("{what} too large")))
}

pub fn encode_raw_block(batch: &BoundBatch, group_id: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_raw_block_into(batch, group_id, &mut out)?;
    Ok(out)
}

/// Encodes `batch` into `out`, replacing its contents. On error `out` is left
/// empty.
pub fn encode_raw_block_into(batch: &BoundBatch, group_id: u64, out: &mut Vec<u8>) -> Result<()> {
    out.clear();
    let res = encode_inner(batch, group_id, out);
    if res.is_err() {
        out.clear();
    }
    res
}

fn encode_inner(batch: &BoundBatch, group_id: u64, out: &mut Vec<u8>) -> Result<()> {
    let row_count = batch.row_count();
    let columns = batch.columns();

    write_i32_le(out, RAW_BLOCK_VERSION);
    write_i32_le(out, 0); // total length, patched below
    write_i32_le(out, count_i32(row_count, "row_count")?);
    write_i32_le(out, count_i32(columns.len(), "col_count")?);
    write_i32_le(out, 0); // flag word
    write_u64_le(out, group_id);

    for col in columns {
        let info = col.field().ty.info();
        out.push(info.code.as_u8());
        write_i32_le(out, info.meta());
    }
    for col in columns {
        write_i32_le(out, col.field().length_entry()?);
    }

    for (idx, col) in columns.iter().enumerate() {
        out.extend_from_slice(col.nulls().as_bytes());
        match col.field().ty.info().category {
            Category::Fixed(width) => write_fixed_column(out, idx, col, width)?,
            Category::Variable => write_var_column(out, idx, col)?,
        }
    }

    let total = count_i32(out.len(), "raw block")?;
    out[TOTAL_LEN_OFFSET..TOTAL_LEN_OFFSET + 4].copy_from_slice(&total.to_le_bytes());
    Ok(())
}

fn write_fixed_column(out: &mut Vec<u8>, column: usize, col: &BoundColumn, width: usize) -> Result<()> {
    let field = col.field();
    out.reserve(col.values().len() * width);
    for value in col.values() {
        let start = out.len();
        write_fixed_value(out, column, field, value, width)?;
        if out.len() - start != width {
            return Err(Error::TypeMismatch {
                column,
                expected: field.ty,
                actual: value.kind_name(),
            });
        }
    }
    Ok(())
}

fn write_fixed_value(
    out: &mut Vec<u8>,
    column: usize,
    field: &BindField,
    value: &Value,
    width: usize,
) -> Result<()> {
    match value {
        // null slots are still present, zero-filled
        Value::Null => out.resize(out.len() + width, 0),
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::TinyInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::SmallInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::BigInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UTinyInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::USmallInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UBigInt(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Timestamp(ts) => {
            let units = timestamp_to_units(ts, field.precision)
                .ok_or(Error::ValueTooLarge { column, len: width })?;
            out.extend_from_slice(&units.to_le_bytes());
        }
        Value::Decimal(d) => match field.ty {
            TypeCode::Decimal64 => {
                let v = i64::try_from(d.unscaled)
                    .map_err(|_| Error::ValueTooLarge { column, len: 16 })?;
                out.extend_from_slice(&v.to_le_bytes());
            }
            _ => out.extend_from_slice(&d.unscaled.to_le_bytes()),
        },
        Value::Text(_) | Value::Bytes(_) => {
            return Err(Error::TypeMismatch {
                column,
                expected: field.ty,
                actual: value.kind_name(),
            });
        }
    }
    Ok(())
}

fn write_var_column(out: &mut Vec<u8>, column: usize, col: &BoundColumn) -> Result<()> {
    let field = col.field();
    let utf32 = field.ty == TypeCode::NChar;

    let table_start = out.len();
    out.resize(table_start + col.values().len() * OFFSET_ENTRY_LEN, 0);
    let data_start = out.len();

    for (row, value) in col.values().iter().enumerate() {
        let offset = match value {
            Value::Null => NULL_OFFSET,
            Value::Text(s) if utf32 => {
                let offset = data_offset(out, data_start, column)?;
                write_utf32_entry(out, column, s)?;
                offset
            }
            Value::Text(s) => {
                let offset = data_offset(out, data_start, column)?;
                write_bytes_entry(out, column, s.as_bytes())?;
                offset
            }
            Value::Bytes(b) => {
                let offset = data_offset(out, data_start, column)?;
                write_bytes_entry(out, column, b)?;
                offset
            }
            other => {
                return Err(Error::TypeMismatch {
                    column,
                    expected: field.ty,
                    actual: other.kind_name(),
                });
            }
        };
        let slot = table_start + row * OFFSET_ENTRY_LEN;
        out[slot..slot + OFFSET_ENTRY_LEN].copy_from_slice(&offset.to_le_bytes());
    }
    Ok(())
}

fn data_offset(out: &[u8], data_start: usize, column: usize) -> Result<i32> {
    let len = out.len() - data_start;
    len.try_into()
        .map_err(|_| Error::ValueTooLarge { column, len })
}

fn entry_len(column: usize, len: usize) -> Result<u16> {
    len.try_into()
        .map_err(|_| Error::ValueTooLarge { column, len })
}

fn write_bytes_entry(out: &mut Vec<u8>, column: usize, bytes: &[u8]) -> Result<()> {
    let len = entry_len(column, bytes.len())?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_utf32_entry(out: &mut Vec<u8>, column: usize, s: &str) -> Result<()> {
    let len = entry_len(column, s.chars().count() * 4)?;
    out.extend_from_slice(&len.to_le_bytes());
    for ch in s.chars() {
        out.extend_from_slice(&u32::from(ch).to_le_bytes());
    }
    Ok(())
}
