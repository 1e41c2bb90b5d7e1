use crate::schema::TypeCode;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unsupported column type code: {0}")]
    UnsupportedType(u8),

    #[error("bind batch must have at least one column")]
    EmptyBatch,

    #[error("row count mismatch: expected {expected}, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("data and type length not match, data length: {actual}, type length: {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("data type error in column {column}: expect {expected:?}, but got {actual}")]
    TypeMismatch {
        column: usize,
        expected: TypeCode,
        actual: &'static str,
    },

    #[error("value in column {column} is too large: {len} bytes")]
    ValueTooLarge { column: usize, len: usize },

    #[error("{0}")]
    InvalidBinding(String),

    #[error("[0x{code:x}] {message}")]
    Protocol { code: i32, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("result set is closed")]
    ResultSetClosed,

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
