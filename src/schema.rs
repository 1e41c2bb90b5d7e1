//! Type catalog for the raw-block wire format.
//!
//! Every column type code the server can send maps to a fixed or
//! variable-length layout plus the rule used to turn its bytes into a
//! [`Value`](crate::value::Value).

use crate::{Error, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeCode {
    Bool = 1,
    TinyInt = 2,
    SmallInt = 3,
    Int = 4,
    BigInt = 5,
    Float = 6,
    Double = 7,
    Binary = 8,
    Timestamp = 9,
    NChar = 10,
    UTinyInt = 11,
    USmallInt = 12,
    UInt = 13,
    UBigInt = 14,
    Json = 15,
    VarBinary = 16,
    Decimal = 17,
    Geometry = 20,
    Decimal64 = 21,
}

impl TypeCode {
    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            1 => Ok(TypeCode::Bool),
            2 => Ok(TypeCode::TinyInt),
            3 => Ok(TypeCode::SmallInt),
            4 => Ok(TypeCode::Int),
            5 => Ok(TypeCode::BigInt),
            6 => Ok(TypeCode::Float),
            7 => Ok(TypeCode::Double),
            8 => Ok(TypeCode::Binary),
            9 => Ok(TypeCode::Timestamp),
            10 => Ok(TypeCode::NChar),
            11 => Ok(TypeCode::UTinyInt),
            12 => Ok(TypeCode::USmallInt),
            13 => Ok(TypeCode::UInt),
            14 => Ok(TypeCode::UBigInt),
            15 => Ok(TypeCode::Json),
            16 => Ok(TypeCode::VarBinary),
            17 => Ok(TypeCode::Decimal),
            20 => Ok(TypeCode::Geometry),
            21 => Ok(TypeCode::Decimal64),
            _ => Err(Error::UnsupportedType(code)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Server-side type name, as reported in column metadata.
    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Bool => "BOOL",
            TypeCode::TinyInt => "TINYINT",
            TypeCode::SmallInt => "SMALLINT",
            TypeCode::Int => "INT",
            TypeCode::BigInt => "BIGINT",
            TypeCode::Float => "FLOAT",
            TypeCode::Double => "DOUBLE",
            TypeCode::Binary => "VARCHAR",
            TypeCode::Timestamp => "TIMESTAMP",
            TypeCode::NChar => "NCHAR",
            TypeCode::UTinyInt => "TINYINT UNSIGNED",
            TypeCode::USmallInt => "SMALLINT UNSIGNED",
            TypeCode::UInt => "INT UNSIGNED",
            TypeCode::UBigInt => "BIGINT UNSIGNED",
            TypeCode::Json => "JSON",
            TypeCode::VarBinary => "VARBINARY",
            TypeCode::Decimal => "DECIMAL",
            TypeCode::Geometry => "GEOMETRY",
            TypeCode::Decimal64 => "DECIMAL64",
        }
    }

    pub fn info(self) -> ColumnTypeInfo {
        let (category, encoding) = match self {
            TypeCode::Bool => (Category::Fixed(1), Encoding::Bool),
            TypeCode::TinyInt => (Category::Fixed(1), Encoding::Int { signed: true }),
            TypeCode::SmallInt => (Category::Fixed(2), Encoding::Int { signed: true }),
            TypeCode::Int => (Category::Fixed(4), Encoding::Int { signed: true }),
            TypeCode::BigInt => (Category::Fixed(8), Encoding::Int { signed: true }),
            TypeCode::UTinyInt => (Category::Fixed(1), Encoding::Int { signed: false }),
            TypeCode::USmallInt => (Category::Fixed(2), Encoding::Int { signed: false }),
            TypeCode::UInt => (Category::Fixed(4), Encoding::Int { signed: false }),
            TypeCode::UBigInt => (Category::Fixed(8), Encoding::Int { signed: false }),
            TypeCode::Float => (Category::Fixed(4), Encoding::Float),
            TypeCode::Double => (Category::Fixed(8), Encoding::Float),
            TypeCode::Timestamp => (Category::Fixed(8), Encoding::Timestamp),
            TypeCode::Decimal => (Category::Fixed(16), Encoding::Decimal),
            TypeCode::Decimal64 => (Category::Fixed(8), Encoding::Decimal),
            TypeCode::NChar => (Category::Variable, Encoding::Text),
            TypeCode::Binary | TypeCode::VarBinary | TypeCode::Geometry | TypeCode::Json => {
                (Category::Variable, Encoding::Bytes)
            }
        };
        let text_encoding = match encoding {
            Encoding::Text => TextEncoding::Utf32Le,
            _ => TextEncoding::None,
        };
        ColumnTypeInfo {
            code: self,
            category,
            encoding,
            text_encoding,
        }
    }

    pub fn is_decimal(self) -> bool {
        matches!(self, TypeCode::Decimal | TypeCode::Decimal64)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Category {
    /// Fixed byte width per row.
    Fixed(usize),
    Variable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextEncoding {
    None,
    Utf32Le,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Encoding {
    Bool,
    Int { signed: bool },
    Float,
    Timestamp,
    Decimal,
    Text,
    Bytes,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColumnTypeInfo {
    pub code: TypeCode,
    pub category: Category,
    pub encoding: Encoding,
    pub text_encoding: TextEncoding,
}

impl ColumnTypeInfo {
    pub fn fixed_width(&self) -> Option<usize> {
        match self.category {
            Category::Fixed(w) => Some(w),
            Category::Variable => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.category == Category::Variable
    }

    /// Descriptor meta word: byte width for fixed columns, 0 otherwise.
    pub fn meta(&self) -> i32 {
        self.fixed_width().unwrap_or(0) as i32
    }
}

pub fn describe(code: u8) -> Result<ColumnTypeInfo> {
    TypeCode::from_u8(code).map(TypeCode::info)
}

/// Time unit of timestamp columns.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    #[default]
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl Precision {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Precision::Millisecond),
            1 => Ok(Precision::Microsecond),
            2 => Ok(Precision::Nanosecond),
            _ => Err(Error::Other(format!("unknown time precision: {code}"))),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Precision::Millisecond => 0,
            Precision::Microsecond => 1,
            Precision::Nanosecond => 2,
        }
    }
}

/// Declared type of one bind column or tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BindField {
    pub ty: TypeCode,
    pub precision: Precision,
    /// Byte capacity written to the column length entry of variable columns.
    pub capacity: u32,
    /// Decimal digits; 0 leaves the value unchecked.
    pub decimal_precision: u8,
    /// Decimal scale. Bound decimals are rescaled to it.
    pub scale: u8,
}

impl BindField {
    pub fn new(ty: TypeCode) -> Self {
        Self {
            ty,
            precision: Precision::Millisecond,
            capacity: 0,
            decimal_precision: 0,
            scale: 0,
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_decimal(mut self, precision: u8, scale: u8) -> Self {
        self.decimal_precision = precision;
        self.scale = scale;
        self
    }

    /// Column length entry for this field.
    pub fn length_entry(&self) -> Result<i32> {
        let len = match self.ty.info().category {
            Category::Fixed(w) => w,
            Category::Variable => self.capacity as usize,
        };
        i32::try_from(len)
            .map_err(|_| Error::Other(format!("column capacity too large: {len}")))
    }
}

// 2-byte length prefix in front of every variable-length entry.
const VAR_DATA_OFFSET: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypes {
    fields: Vec<BindField>,
}

impl ColumnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[BindField] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<BindField> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(mut self, field: BindField) -> Self {
        self.fields.push(field);
        self
    }

    fn push_var(self, ty: TypeCode, max_len: u32) -> Self {
        self.push(BindField::new(ty).with_capacity(max_len.saturating_add(VAR_DATA_OFFSET)))
    }

    pub fn add_bool(self) -> Self {
        self.push(BindField::new(TypeCode::Bool))
    }

    pub fn add_tinyint(self) -> Self {
        self.push(BindField::new(TypeCode::TinyInt))
    }

    pub fn add_smallint(self) -> Self {
        self.push(BindField::new(TypeCode::SmallInt))
    }

    pub fn add_int(self) -> Self {
        self.push(BindField::new(TypeCode::Int))
    }

    pub fn add_bigint(self) -> Self {
        self.push(BindField::new(TypeCode::BigInt))
    }

    pub fn add_utinyint(self) -> Self {
        self.push(BindField::new(TypeCode::UTinyInt))
    }

    pub fn add_usmallint(self) -> Self {
        self.push(BindField::new(TypeCode::USmallInt))
    }

    pub fn add_uint(self) -> Self {
        self.push(BindField::new(TypeCode::UInt))
    }

    pub fn add_ubigint(self) -> Self {
        self.push(BindField::new(TypeCode::UBigInt))
    }

    pub fn add_float(self) -> Self {
        self.push(BindField::new(TypeCode::Float))
    }

    pub fn add_double(self) -> Self {
        self.push(BindField::new(TypeCode::Double))
    }

    pub fn add_timestamp(self) -> Self {
        self.add_timestamp_with_precision(Precision::Millisecond)
    }

    pub fn add_timestamp_with_precision(self, precision: Precision) -> Self {
        self.push(BindField::new(TypeCode::Timestamp).with_precision(precision))
    }

    pub fn add_binary(self, max_len: u32) -> Self {
        self.push_var(TypeCode::Binary, max_len)
    }

    pub fn add_varbinary(self, max_len: u32) -> Self {
        self.push_var(TypeCode::VarBinary, max_len)
    }

    pub fn add_geometry(self, max_len: u32) -> Self {
        self.push_var(TypeCode::Geometry, max_len)
    }

    pub fn add_json(self, max_len: u32) -> Self {
        self.push_var(TypeCode::Json, max_len)
    }

    /// `max_chars` characters, each stored as one 4-byte UTF-32 code unit.
    pub fn add_nchar(self, max_chars: u32) -> Self {
        let capacity = max_chars.saturating_mul(4).saturating_add(VAR_DATA_OFFSET);
        self.push(BindField::new(TypeCode::NChar).with_capacity(capacity))
    }

    pub fn add_decimal64(self, precision: u8, scale: u8) -> Self {
        self.push(BindField::new(TypeCode::Decimal64).with_decimal(precision, scale))
    }

    pub fn add_decimal(self, precision: u8, scale: u8) -> Self {
        self.push(BindField::new(TypeCode::Decimal).with_decimal(precision, scale))
    }
}

/// Result-set column metadata as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub ty: TypeCode,
    pub length: i64,
    /// Decimal precision; 0 for other types.
    pub precision: u8,
    /// Decimal scale; 0 for other types.
    pub scale: u8,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, ty: TypeCode) -> Self {
        let length = ty.info().fixed_width().unwrap_or(0) as i64;
        Self {
            name: name.into(),
            ty,
            length,
            precision: 0,
            scale: 0,
        }
    }

    pub fn with_decimal(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }
}
