//! Read side of the raw-block format.
//!
//! [`RawBlockView`] parses the header and locates every column's bitmap and
//! payload without copying. [`RowCursor`] owns a fetched buffer and turns it
//! into typed rows one at a time.

use crate::batch::{NullBitmap, null_mask};
use crate::codec::raw_block::{
    DESCRIPTOR_LEN, HEADER_LEN, LENGTH_ENTRY_LEN, OFFSET_ENTRY_LEN, RAW_BLOCK_VERSION,
    VAR_LEN_PREFIX,
};
use crate::codec::reader::{BlockReader, read_array_at, read_var_entry_at, slice_at};
use crate::schema::{Category, ColumnTypeInfo, FieldMeta, Precision, TypeCode, describe};
use crate::value::{Decimal, Value, units_to_timestamp};
use crate::{Error, Result};

pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlockHeader {
    pub version: i32,
    pub total_len: usize,
    pub row_count: usize,
    pub col_count: usize,
    /// Reserved; carried through unexamined.
    pub flag: i32,
    pub group_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub info: ColumnTypeInfo,
    pub meta: i32,
    pub length: i32,
    bitmap_offset: usize,
    /// Fixed: first value slot. Variable: first offset-table entry.
    values_offset: usize,
    /// Variable only: start of the packed `[len][bytes]` area.
    var_data_offset: usize,
}

impl ColumnLayout {
    pub fn bitmap_offset(&self) -> usize {
        self.bitmap_offset
    }

    pub fn values_offset(&self) -> usize {
        self.values_offset
    }
}

#[derive(Debug, Clone)]
pub struct RawBlockView<'a> {
    bytes: &'a [u8],
    header: RawBlockHeader,
    columns: Vec<ColumnLayout>,
}

fn non_negative(v: i32, what: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::Other(format!("invalid {what}: {v}")))
}

impl<'a> RawBlockView<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut r = BlockReader::new(bytes);
        let version = r.read_i32_le()?;
        if version != RAW_BLOCK_VERSION {
            return Err(Error::Other(format!(
                "unsupported raw block version: {version}"
            )));
        }
        let total_len = non_negative(r.read_i32_le()?, "block length")?;
        let row_count = non_negative(r.read_i32_le()?, "row count")?;
        let col_count = non_negative(r.read_i32_le()?, "column count")?;
        let flag = r.read_i32_le()?;
        let group_id = r.read_u64_le()?;
        if total_len > bytes.len() {
            return Err(Error::Other("truncated raw block".to_string()));
        }
        let header = RawBlockHeader {
            version,
            total_len,
            row_count,
            col_count,
            flag,
            group_id,
        };

        let tables_len = col_count
            .checked_mul(DESCRIPTOR_LEN + LENGTH_ENTRY_LEN)
            .ok_or_else(|| Error::Other("decode overflow".to_string()))?;
        slice_at(bytes, HEADER_LEN, tables_len)?;

        let mut descriptors = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            let code = r.read_u8()?;
            let meta = r.read_i32_le()?;
            descriptors.push((describe(code)?, meta));
        }
        let mut lengths = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            lengths.push(r.read_i32_le()?);
        }

        let bitmap_len = NullBitmap::len_for_row_count(row_count)?;
        let mut pos = r.position();
        let mut columns = Vec::with_capacity(col_count);
        for ((info, meta), length) in descriptors.into_iter().zip(lengths) {
            let bitmap_offset = pos;
            slice_at(bytes, bitmap_offset, bitmap_len)?;
            let values_offset = bitmap_offset + bitmap_len;
            let (var_data_offset, end) = match info.category {
                Category::Fixed(width) => {
                    let len = row_count
                        .checked_mul(width)
                        .ok_or_else(|| Error::Other("decode overflow".to_string()))?;
                    slice_at(bytes, values_offset, len)?;
                    (0, values_offset + len)
                }
                Category::Variable => {
                    let table_len = row_count
                        .checked_mul(OFFSET_ENTRY_LEN)
                        .ok_or_else(|| Error::Other("decode overflow".to_string()))?;
                    slice_at(bytes, values_offset, table_len)?;
                    let data_offset = values_offset + table_len;
                    let extent = var_extent(bytes, values_offset, data_offset, row_count)?;
                    (data_offset, data_offset + extent)
                }
            };
            columns.push(ColumnLayout {
                info,
                meta,
                length,
                bitmap_offset,
                values_offset,
                var_data_offset,
            });
            pos = end;
        }
        if pos > total_len {
            return Err(Error::Other(format!(
                "raw block overruns declared length: {pos} > {total_len}"
            )));
        }

        Ok(Self {
            bytes,
            header,
            columns,
        })
    }

    pub fn header(&self) -> &RawBlockHeader {
        &self.header
    }

    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    pub fn is_null(&self, col: usize, row: usize) -> Result<bool> {
        column_is_null(self.bytes, self.column(col)?, row)
    }

    /// Offset-table entry of a variable-length column.
    pub fn var_offset(&self, col: usize, row: usize) -> Result<i32> {
        let layout = self.column(col)?;
        if !layout.info.is_variable() {
            return Err(Error::Other(format!("column {col} is not variable-length")));
        }
        read_offset(self.bytes, layout, row)
    }

    fn column(&self, col: usize) -> Result<&ColumnLayout> {
        self.columns
            .get(col)
            .ok_or_else(|| Error::Other(format!("column index out of range: {col}")))
    }
}

// Size of the packed area: the furthest end of any non-null entry.
fn var_extent(bytes: &[u8], table: usize, data: usize, row_count: usize) -> Result<usize> {
    let mut extent = 0usize;
    for row in 0..row_count {
        let offset = i32::from_le_bytes(read_array_at::<4>(bytes, table + row * OFFSET_ENTRY_LEN)?);
        if offset < 0 {
            continue;
        }
        let start = data + offset as usize;
        let entry = read_var_entry_at(bytes, start)?;
        extent = extent.max(offset as usize + VAR_LEN_PREFIX + entry.len());
    }
    Ok(extent)
}

fn column_is_null(bytes: &[u8], layout: &ColumnLayout, row: usize) -> Result<bool> {
    let byte = read_array_at::<1>(bytes, layout.bitmap_offset + row / 8)?[0];
    Ok(byte & null_mask(row) != 0)
}

fn read_offset(bytes: &[u8], layout: &ColumnLayout, row: usize) -> Result<i32> {
    read_array_at::<4>(bytes, layout.values_offset + row * OFFSET_ENTRY_LEN).map(i32::from_le_bytes)
}

fn decode_cell(
    bytes: &[u8],
    layout: &ColumnLayout,
    row: usize,
    field: &FieldMeta,
    precision: Precision,
) -> Result<Value> {
    if column_is_null(bytes, layout, row)? {
        return Ok(Value::Null);
    }
    let width = match layout.info.category {
        Category::Fixed(width) => width,
        Category::Variable => return decode_var_cell(bytes, layout, row),
    };
    let at = layout.values_offset + row * width;
    let value = match layout.info.code {
        TypeCode::Bool => Value::Bool(read_array_at::<1>(bytes, at)?[0] != 0),
        TypeCode::TinyInt => Value::TinyInt(i8::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::SmallInt => Value::SmallInt(i16::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::Int => Value::Int(i32::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::BigInt => Value::BigInt(i64::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::UTinyInt => Value::UTinyInt(u8::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::USmallInt => Value::USmallInt(u16::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::UInt => Value::UInt(u32::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::UBigInt => Value::UBigInt(u64::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::Float => Value::Float(f32::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::Double => Value::Double(f64::from_le_bytes(read_array_at(bytes, at)?)),
        TypeCode::Timestamp => {
            let units = i64::from_le_bytes(read_array_at(bytes, at)?);
            let ts = units_to_timestamp(units, precision)
                .ok_or_else(|| Error::Other(format!("timestamp out of range: {units}")))?;
            Value::Timestamp(ts)
        }
        TypeCode::Decimal64 => Value::Decimal(Decimal {
            unscaled: i64::from_le_bytes(read_array_at(bytes, at)?) as i128,
            precision: field.precision,
            scale: field.scale,
        }),
        TypeCode::Decimal => Value::Decimal(Decimal {
            unscaled: i128::from_le_bytes(read_array_at(bytes, at)?),
            precision: field.precision,
            scale: field.scale,
        }),
        TypeCode::Binary
        | TypeCode::NChar
        | TypeCode::Json
        | TypeCode::VarBinary
        | TypeCode::Geometry => {
            return Err(Error::Other("variable-length type in fixed layout".to_string()));
        }
    };
    Ok(value)
}

fn decode_var_cell(bytes: &[u8], layout: &ColumnLayout, row: usize) -> Result<Value> {
    let offset = read_offset(bytes, layout, row)?;
    if offset < 0 {
        return Err(Error::Other(format!(
            "negative offset for non-null row {row}"
        )));
    }
    let entry = read_var_entry_at(bytes, layout.var_data_offset + offset as usize)?;
    match layout.info.code {
        TypeCode::NChar => decode_utf32(entry).map(Value::Text),
        TypeCode::Binary => Ok(match std::str::from_utf8(entry) {
            Ok(s) => Value::Text(s.to_string()),
            Err(_) => Value::Bytes(entry.to_vec()),
        }),
        _ => Ok(Value::Bytes(entry.to_vec())),
    }
}

fn decode_utf32(entry: &[u8]) -> Result<String> {
    if entry.len() % 4 != 0 {
        return Err(Error::Other("UTF-32 entry length not a multiple of 4".to_string()));
    }
    let mut s = String::with_capacity(entry.len() / 4);
    for unit in entry.chunks_exact(4) {
        let code = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
        let ch = char::from_u32(code)
            .ok_or_else(|| Error::Other(format!("invalid UTF-32 code unit: {code:#x}")))?;
        s.push(ch);
    }
    Ok(s)
}

/// Walks one fetched block row by row.
#[derive(Debug, Clone)]
pub struct RowCursor {
    bytes: Vec<u8>,
    start: usize,
    header: RawBlockHeader,
    columns: Vec<ColumnLayout>,
    fields: Vec<FieldMeta>,
    precision: Precision,
    next_row: usize,
}

pub fn open_block(bytes: Vec<u8>, fields: &[FieldMeta], precision: Precision) -> Result<RowCursor> {
    RowCursor::open(bytes, 0, fields, precision)
}

impl RowCursor {
    /// Opens the block that begins at `start` within `bytes`; anything before
    /// `start` is ignored.
    pub fn open(
        bytes: Vec<u8>,
        start: usize,
        fields: &[FieldMeta],
        precision: Precision,
    ) -> Result<Self> {
        let block = bytes
            .get(start..)
            .ok_or_else(|| Error::Other("truncated raw block".to_string()))?;
        let view = RawBlockView::parse(block)?;
        let header = *view.header();
        if header.col_count != fields.len() {
            return Err(Error::Other(format!(
                "field count mismatch: block has {}, metadata has {}",
                header.col_count,
                fields.len()
            )));
        }
        for (i, (layout, field)) in view.columns().iter().zip(fields).enumerate() {
            if layout.info.code != field.ty {
                return Err(Error::Other(format!(
                    "column {i} type mismatch: block has {}, metadata has {}",
                    layout.info.code.name(),
                    field.ty.name()
                )));
            }
        }
        let columns = view.columns().to_vec();
        Ok(Self {
            bytes,
            start,
            header,
            columns,
            fields: fields.to_vec(),
            precision,
            next_row: 0,
        })
    }

    pub fn header(&self) -> &RawBlockHeader {
        &self.header
    }

    pub fn row_count(&self) -> usize {
        self.header.row_count
    }

    pub fn remaining(&self) -> usize {
        self.header.row_count - self.next_row
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Next row, or `None` once every row of the block has been produced.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let mut row = Vec::with_capacity(self.columns.len());
        if self.next_row_into(&mut row)? {
            Ok(Some(row))
        } else {
            Ok(None)
        }
    }

    /// Decodes the next row into `dest`, reusing its allocation. Returns
    /// `false` at end of block.
    pub fn next_row_into(&mut self, dest: &mut Vec<Value>) -> Result<bool> {
        if self.is_exhausted() {
            return Ok(false);
        }
        dest.clear();
        let block = &self.bytes[self.start..];
        for (layout, field) in self.columns.iter().zip(&self.fields) {
            dest.push(decode_cell(block, layout, self.next_row, field, self.precision)?);
        }
        self.next_row += 1;
        Ok(true)
    }
}

/// Decodes every row of a standalone block.
pub fn decode_raw_block(bytes: &[u8], fields: &[FieldMeta], precision: Precision) -> Result<Vec<Row>> {
    let mut cursor = open_block(bytes.to_vec(), fields, precision)?;
    let mut rows = Vec::with_capacity(cursor.row_count());
    while let Some(row) = cursor.next_row()? {
        rows.push(row);
    }
    Ok(rows)
}
