//! Call envelope and message bodies exchanged with the server.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One message on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

pub const QUERY: &str = "query";
pub const FETCH: &str = "fetch";
pub const FETCH_BLOCK: &str = "fetch_block";
pub const FREE_RESULT: &str = "free_result";
pub const STMT_INIT: &str = "init";
pub const STMT_PREPARE: &str = "prepare";
pub const STMT_SET_TABLE_NAME: &str = "set_table_name";
pub const STMT_GET_COL_FIELDS: &str = "get_col_fields";
pub const STMT_GET_TAG_FIELDS: &str = "get_tag_fields";
pub const STMT_ADD_BATCH: &str = "add_batch";
pub const STMT_EXEC: &str = "exec";
pub const STMT_USE_RESULT: &str = "use_result";
pub const STMT_CLOSE: &str = "close";

/// Bytes in front of every fetched block. Bytes 8..16 hold the request id.
pub const BLOCK_PREFIX_LEN: usize = 16;
pub const BLOCK_REQ_ID_OFFSET: usize = 8;

/// Binary statement messages: `req_id | stmt_id | action | raw block`.
pub const STMT_BINARY_HEADER_LEN: usize = 24;
pub const STMT_SET_TAGS_MESSAGE: u64 = 1;
pub const STMT_BIND_MESSAGE: u64 = 2;

#[derive(Debug, Serialize)]
pub struct Action<'a, A> {
    pub action: &'a str,
    pub args: A,
}

#[derive(Debug, Serialize)]
pub struct QueryReq<'a> {
    pub req_id: u64,
    pub sql: &'a str,
}

/// Shared by fetch, fetch_block and free_result.
#[derive(Debug, Serialize)]
pub struct ResultReq {
    pub req_id: u64,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct StmtInitReq {
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct StmtReq {
    pub req_id: u64,
    pub stmt_id: u64,
}

#[derive(Debug, Serialize)]
pub struct StmtPrepareReq<'a> {
    pub req_id: u64,
    pub stmt_id: u64,
    pub sql: &'a str,
}

#[derive(Debug, Serialize)]
pub struct StmtSetTableNameReq<'a> {
    pub req_id: u64,
    pub stmt_id: u64,
    pub name: &'a str,
}

/// Fields common to every text response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Status {
    pub code: i32,
    pub message: String,
    pub req_id: u64,
}

impl Status {
    pub fn check(&self) -> Result<()> {
        if self.code == 0 {
            Ok(())
        } else {
            Err(Error::Protocol {
                code: self.code,
                message: self.message.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryResp {
    #[serde(alias = "result_id")]
    pub id: u64,
    pub is_update: bool,
    pub affected_rows: i64,
    pub fields_count: usize,
    pub fields_names: Vec<String>,
    pub fields_types: Vec<u8>,
    pub fields_lengths: Vec<i64>,
    pub fields_precisions: Vec<i64>,
    pub fields_scales: Vec<i64>,
    pub precision: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FetchResp {
    pub id: u64,
    pub completed: bool,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StmtInitResp {
    pub stmt_id: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StmtPrepareResp {
    pub stmt_id: u64,
    pub is_insert: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StmtField {
    pub name: String,
    pub field_type: u8,
    pub precision: u8,
    pub scale: u8,
    pub bytes: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StmtFieldsResp {
    pub fields: Vec<StmtField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StmtExecResp {
    pub affected: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReqIdOnly {
    req_id: u64,
}

/// Request id a response frame answers, if it carries one.
pub fn response_req_id(frame: &Frame) -> Option<u64> {
    match frame {
        Frame::Text(text) => serde_json::from_str::<ReqIdOnly>(text)
            .ok()
            .map(|r| r.req_id),
        Frame::Binary(bytes) => {
            let raw = bytes.get(BLOCK_REQ_ID_OFFSET..BLOCK_PREFIX_LEN)?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(raw);
            Some(u64::from_le_bytes(arr))
        }
    }
}
