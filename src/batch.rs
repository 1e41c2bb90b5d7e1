use chrono::SecondsFormat;

use crate::schema::{BindField, TypeCode};
use crate::value::{Decimal, Value};
use crate::{Error, Result};

fn ceil_div_8(n: usize) -> Result<usize> {
    n.checked_add(7)
        .ok_or_else(|| Error::Other("size overflow".to_string()))
        .map(|v| v / 8)
}

#[inline]
pub(crate) fn null_mask(row_idx: usize) -> u8 {
    0x80u8 >> (row_idx % 8)
}

/// Per-column null markers, one bit per row, most significant bit first.
/// A set bit means the row is null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullBitmap {
    bytes: Vec<u8>,
}

impl NullBitmap {
    pub fn new_all_valid(row_count: usize) -> Result<Self> {
        let len = ceil_div_8(row_count)?;
        Ok(Self {
            bytes: vec![0u8; len],
        })
    }

    pub fn len_for_row_count(row_count: usize) -> Result<usize> {
        ceil_div_8(row_count)
    }

    pub fn set_null(&mut self, row_idx: usize, is_null: bool) -> Result<()> {
        let byte = self
            .bytes
            .get_mut(row_idx / 8)
            .ok_or_else(|| Error::Other("null bitmap out of bounds".to_string()))?;
        if is_null {
            *byte |= null_mask(row_idx);
        } else {
            *byte &= !null_mask(row_idx);
        }
        Ok(())
    }

    pub fn is_null(&self, row_idx: usize) -> Result<bool> {
        let byte = self
            .bytes
            .get(row_idx / 8)
            .ok_or_else(|| Error::Other("null bitmap out of bounds".to_string()))?;
        Ok(byte & null_mask(row_idx) != 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }
}

/// One column of caller input, row-ordered, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInput {
    pub field: BindField,
    pub values: Vec<Value>,
}

impl ColumnInput {
    pub fn new(field: BindField, values: Vec<Value>) -> Self {
        Self { field, values }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundColumn {
    field: BindField,
    nulls: NullBitmap,
    values: Vec<Value>,
}

impl BoundColumn {
    pub fn field(&self) -> &BindField {
        &self.field
    }

    pub fn nulls(&self) -> &NullBitmap {
        &self.nulls
    }

    /// Row values; null rows hold [`Value::Null`].
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Validated, column-major parameter set ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundBatch {
    row_count: usize,
    columns: Vec<BoundColumn>,
}

impl BoundBatch {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[BoundColumn] {
        &self.columns
    }

    pub fn fields(&self) -> impl Iterator<Item = &BindField> {
        self.columns.iter().map(|c| &c.field)
    }
}

/// Binds columns whose row count is taken from the first column.
pub fn bind(columns: Vec<ColumnInput>) -> Result<BoundBatch> {
    let row_count = columns.first().ok_or(Error::EmptyBatch)?.values.len();
    bind_with_row_count(columns, row_count)
}

pub fn bind_with_row_count(columns: Vec<ColumnInput>, row_count: usize) -> Result<BoundBatch> {
    if columns.is_empty() {
        return Err(Error::EmptyBatch);
    }
    for col in &columns {
        if col.values.len() != row_count {
            return Err(Error::RowCountMismatch {
                expected: row_count,
                actual: col.values.len(),
            });
        }
    }

    let mut bound = Vec::with_capacity(columns.len());
    for (column, input) in columns.into_iter().enumerate() {
        let mut nulls = NullBitmap::new_all_valid(row_count)?;
        let mut values = Vec::with_capacity(row_count);
        for (row, value) in input.values.into_iter().enumerate() {
            if value.is_null() {
                nulls.set_null(row, true)?;
                values.push(Value::Null);
            } else {
                values.push(check_kind(column, &input.field, value)?);
            }
        }
        bound.push(BoundColumn {
            field: input.field,
            nulls,
            values,
        });
    }

    Ok(BoundBatch {
        row_count,
        columns: bound,
    })
}

fn check_kind(column: usize, field: &BindField, value: Value) -> Result<Value> {
    let ty = field.ty;
    let mismatch = |actual: &'static str| Error::TypeMismatch {
        column,
        expected: ty,
        actual,
    };
    match (ty, value) {
        (TypeCode::Bool, v @ Value::Bool(_))
        | (TypeCode::TinyInt, v @ Value::TinyInt(_))
        | (TypeCode::SmallInt, v @ Value::SmallInt(_))
        | (TypeCode::Int, v @ Value::Int(_))
        | (TypeCode::BigInt, v @ Value::BigInt(_))
        | (TypeCode::UTinyInt, v @ Value::UTinyInt(_))
        | (TypeCode::USmallInt, v @ Value::USmallInt(_))
        | (TypeCode::UInt, v @ Value::UInt(_))
        | (TypeCode::UBigInt, v @ Value::UBigInt(_))
        | (TypeCode::Float, v @ Value::Float(_))
        | (TypeCode::Double, v @ Value::Double(_))
        | (TypeCode::Timestamp, v @ Value::Timestamp(_)) => Ok(v),
        (TypeCode::Decimal | TypeCode::Decimal64, Value::Decimal(d)) => {
            rescale_decimal(column, field, d).map(Value::Decimal)
        }
        // variable columns hold the kind decoding produces for their type
        (TypeCode::NChar, Value::Text(s)) => Ok(Value::Text(s)),
        (TypeCode::NChar, Value::Bytes(b)) => String::from_utf8(b)
            .map(Value::Text)
            .map_err(|_| mismatch("non-UTF-8 bytes")),
        (TypeCode::Binary, Value::Text(s)) => Ok(Value::Text(s)),
        (TypeCode::Binary, Value::Bytes(b)) => Ok(match String::from_utf8(b) {
            Ok(s) => Value::Text(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        }),
        (TypeCode::VarBinary | TypeCode::Json | TypeCode::Geometry, Value::Text(s)) => {
            Ok(Value::Bytes(s.into_bytes()))
        }
        (TypeCode::VarBinary | TypeCode::Json | TypeCode::Geometry, Value::Bytes(b)) => {
            Ok(Value::Bytes(b))
        }
        (_, other) => Err(mismatch(other.kind_name())),
    }
}

/// Brings `d` to the column's scale. A value with more fractional digits than
/// the column, or more digits than its precision, is rejected.
fn rescale_decimal(column: usize, field: &BindField, d: Decimal) -> Result<Decimal> {
    if d.scale > field.scale {
        return Err(Error::InvalidBinding(format!(
            "decimal scale {} exceeds column {column} scale {}",
            d.scale, field.scale
        )));
    }
    let too_large = || {
        Error::InvalidBinding(format!(
            "decimal {d} exceeds column {column} precision {}",
            field.decimal_precision
        ))
    };
    let unscaled = 10i128
        .checked_pow(u32::from(field.scale - d.scale))
        .and_then(|factor| d.unscaled.checked_mul(factor))
        .ok_or_else(too_large)?;
    if field.decimal_precision > 0 {
        let limit = 10u128.checked_pow(u32::from(field.decimal_precision));
        if limit.is_some_and(|limit| unscaled.unsigned_abs() >= limit) {
            return Err(too_large());
        }
    }
    let precision = match field.decimal_precision {
        0 => d.precision,
        p => p,
    };
    Ok(Decimal {
        unscaled,
        precision,
        scale: field.scale,
    })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Query,
}

/// One logical unit of statement binding: an optional child table, its tag
/// row, and the column values for that table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StmtBindData {
    pub table_name: Option<String>,
    pub tags: Vec<Value>,
    /// Column-major: `cols[c][r]`.
    pub cols: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmtBinding {
    pub table_name: Option<String>,
    pub tags: Option<BoundBatch>,
    pub cols: Option<BoundBatch>,
}

pub fn bind_stmt(
    kind: StatementKind,
    units: Vec<StmtBindData>,
    col_fields: &[BindField],
    tag_fields: &[BindField],
) -> Result<Vec<StmtBinding>> {
    if units.is_empty() {
        return Err(Error::EmptyBatch);
    }
    let is_insert = kind == StatementKind::Insert;

    let mut out = Vec::with_capacity(units.len());
    for unit in units {
        let table_name = unit.table_name.filter(|name| !name.is_empty());
        if table_name.is_some() && !is_insert {
            return Err(Error::InvalidBinding(
                "table name is not allowed in query statement".to_string(),
            ));
        }

        let tags = if unit.tags.is_empty() {
            None
        } else {
            if !is_insert {
                return Err(Error::InvalidBinding(
                    "tag is not allowed in query statement".to_string(),
                ));
            }
            // one tag row, transposed into single-row columns
            let tag_cols = unit.tags.into_iter().map(|v| vec![v]).collect();
            Some(bind_declared(tag_cols, tag_fields)?)
        };

        let cols = if unit.cols.is_empty() {
            None
        } else if is_insert {
            Some(bind_declared(unit.cols, col_fields)?)
        } else {
            Some(bind_query(unit.cols)?)
        };

        out.push(StmtBinding {
            table_name,
            tags,
            cols,
        });
    }
    Ok(out)
}

fn bind_declared(data: Vec<Vec<Value>>, fields: &[BindField]) -> Result<BoundBatch> {
    if data.len() != fields.len() {
        return Err(Error::ColumnCountMismatch {
            expected: fields.len(),
            actual: data.len(),
        });
    }
    let columns = data
        .into_iter()
        .zip(fields.iter())
        .map(|(values, field)| ColumnInput::new(*field, values))
        .collect();
    bind(columns)
}

/// Binds query parameters, one value per column, inferring each column's type
/// from its value.
pub fn bind_query(cols: Vec<Vec<Value>>) -> Result<BoundBatch> {
    if cols.is_empty() {
        return Err(Error::EmptyBatch);
    }
    let mut inputs = Vec::with_capacity(cols.len());
    for mut values in cols {
        if values.len() != 1 {
            return Err(Error::RowCountMismatch {
                expected: 1,
                actual: values.len(),
            });
        }
        let value = values.remove(0);
        let (field, value) = infer_field(value)?;
        inputs.push(ColumnInput::new(field, vec![value]));
    }
    bind_with_row_count(inputs, 1)
}

fn infer_field(value: Value) -> Result<(BindField, Value)> {
    let ty = match &value {
        Value::Null => {
            return Err(Error::InvalidBinding(
                "bind query data can not be null".to_string(),
            ));
        }
        Value::Bool(_) => TypeCode::Bool,
        Value::TinyInt(_) => TypeCode::TinyInt,
        Value::SmallInt(_) => TypeCode::SmallInt,
        Value::Int(_) => TypeCode::Int,
        Value::BigInt(_) => TypeCode::BigInt,
        Value::UTinyInt(_) => TypeCode::UTinyInt,
        Value::USmallInt(_) => TypeCode::USmallInt,
        Value::UInt(_) => TypeCode::UInt,
        Value::UBigInt(_) => TypeCode::UBigInt,
        Value::Float(_) => TypeCode::Float,
        Value::Double(_) => TypeCode::Double,
        Value::Text(_) | Value::Bytes(_) => TypeCode::Binary,
        Value::Timestamp(ts) => {
            let text = ts.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            let field = var_field(text.len());
            return Ok((field, Value::Text(text)));
        }
        Value::Decimal(_) => {
            return Err(Error::InvalidBinding(
                "decimal is not supported in query binding".to_string(),
            ));
        }
    };
    let field = match &value {
        Value::Text(s) => var_field(s.len()),
        Value::Bytes(b) => var_field(b.len()),
        _ => BindField::new(ty),
    };
    Ok((field, value))
}

fn var_field(len: usize) -> BindField {
    let capacity = u32::try_from(len).unwrap_or(u32::MAX).saturating_add(2);
    BindField::new(TypeCode::Binary).with_capacity(capacity)
}
