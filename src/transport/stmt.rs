use tracing::{debug, warn};

use crate::batch::{BoundBatch, StatementKind, StmtBindData, bind_stmt};
use crate::codec::exports::encode_into;
use crate::schema::{BindField, Precision, TypeCode};
use crate::transport::connection::{Connection, parse_text_response};
use crate::transport::protocol::{
    Frame, STMT_ADD_BATCH, STMT_BIND_MESSAGE, STMT_CLOSE, STMT_EXEC, STMT_GET_COL_FIELDS,
    STMT_GET_TAG_FIELDS, STMT_PREPARE, STMT_SET_TABLE_NAME, STMT_SET_TAGS_MESSAGE,
    STMT_USE_RESULT, Status, StmtExecResp, StmtField, StmtFieldsResp, StmtPrepareReq,
    StmtPrepareResp, StmtReq, StmtSetTableNameReq,
};
use crate::transport::result_set::ResultSet;
use crate::{Error, Result};

/// Prepared-statement session: binds encoded parameter blocks and executes
/// them on the server.
#[derive(Debug)]
pub struct Stmt {
    conn: Connection,
    stmt_id: u64,
    kind: Option<StatementKind>,
    col_fields: Option<Vec<BindField>>,
    tag_fields: Option<Vec<BindField>>,
    closed: bool,
}

fn to_bind_field(f: &StmtField) -> Result<BindField> {
    let ty = TypeCode::from_u8(f.field_type)?;
    let mut field = BindField::new(ty);
    if ty == TypeCode::Timestamp {
        field = field.with_precision(Precision::from_code(f.precision as i32)?);
    }
    if ty.is_decimal() {
        field = field.with_decimal(f.precision, f.scale);
    }
    if ty.info().is_variable() {
        field = field.with_capacity(f.bytes.max(0) as u32);
    }
    Ok(field)
}

impl Stmt {
    pub(crate) fn new(conn: Connection, stmt_id: u64) -> Self {
        Self {
            conn,
            stmt_id,
            kind: None,
            col_fields: None,
            tag_fields: None,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.stmt_id
    }

    /// Kind reported by the last `prepare`, if any.
    pub fn kind(&self) -> Option<StatementKind> {
        self.kind
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::InvalidBinding("statement is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn req(&self) -> (u64, StmtReq) {
        let req_id = self.conn.next_req_id();
        (req_id, StmtReq {
            req_id,
            stmt_id: self.stmt_id,
        })
    }

    async fn simple_call(&self, action: &str) -> Result<()> {
        self.ensure_open()?;
        let (req_id, req) = self.req();
        let _: Status = self.conn.call_json(action, req_id, &req).await?;
        Ok(())
    }

    pub async fn prepare(&mut self, sql: &str) -> Result<StatementKind> {
        self.ensure_open()?;
        let req_id = self.conn.next_req_id();
        let resp: StmtPrepareResp = self
            .conn
            .call_json(STMT_PREPARE, req_id, &StmtPrepareReq {
                req_id,
                stmt_id: self.stmt_id,
                sql,
            })
            .await?;
        let kind = if resp.is_insert {
            StatementKind::Insert
        } else {
            StatementKind::Query
        };
        self.kind = Some(kind);
        self.col_fields = None;
        self.tag_fields = None;
        Ok(kind)
    }

    async fn fetch_fields(&self, action: &str) -> Result<Vec<BindField>> {
        self.ensure_open()?;
        let (req_id, req) = self.req();
        let resp: StmtFieldsResp = self.conn.call_json(action, req_id, &req).await?;
        resp.fields.iter().map(to_bind_field).collect()
    }

    pub async fn col_fields(&mut self) -> Result<&[BindField]> {
        if self.col_fields.is_none() {
            self.col_fields = Some(self.fetch_fields(STMT_GET_COL_FIELDS).await?);
        }
        Ok(self.col_fields.as_deref().unwrap_or_default())
    }

    pub async fn tag_fields(&mut self) -> Result<&[BindField]> {
        if self.tag_fields.is_none() {
            self.tag_fields = Some(self.fetch_fields(STMT_GET_TAG_FIELDS).await?);
        }
        Ok(self.tag_fields.as_deref().unwrap_or_default())
    }

    pub async fn set_table_name(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let req_id = self.conn.next_req_id();
        let _: Status = self
            .conn
            .call_json(STMT_SET_TABLE_NAME, req_id, &StmtSetTableNameReq {
                req_id,
                stmt_id: self.stmt_id,
                name,
            })
            .await?;
        Ok(())
    }

    pub async fn set_tags(&self, tags: &BoundBatch) -> Result<()> {
        self.send_block(STMT_SET_TAGS_MESSAGE, tags).await
    }

    pub async fn bind(&self, cols: &BoundBatch) -> Result<()> {
        self.send_block(STMT_BIND_MESSAGE, cols).await
    }

    async fn send_block(&self, message: u64, batch: &BoundBatch) -> Result<()> {
        self.ensure_open()?;
        let req_id = self.conn.next_req_id();
        let frame = {
            let pool = self.conn.buffers();
            let mut block = pool.checkout();
            encode_into(batch, &mut block)?;
            let mut msg = pool.checkout();
            msg.extend_from_slice(&req_id.to_le_bytes());
            msg.extend_from_slice(&self.stmt_id.to_le_bytes());
            msg.extend_from_slice(&message.to_le_bytes());
            msg.extend_from_slice(&block);
            Frame::Binary(msg.to_vec())
        };
        let resp = self.conn.round_trip(req_id, frame).await?;
        let _: Status = parse_text_response(resp)?;
        Ok(())
    }

    pub async fn add_batch(&self) -> Result<()> {
        self.simple_call(STMT_ADD_BATCH).await
    }

    /// Validates `units` against the prepared statement and sends each one:
    /// table name, tags, columns, then `add_batch`.
    pub async fn bind_params(&mut self, units: Vec<StmtBindData>) -> Result<()> {
        let kind = self.kind.ok_or_else(|| {
            Error::InvalidBinding("statement must be prepared before binding".to_string())
        })?;
        let (col_fields, tag_fields) = match kind {
            StatementKind::Insert => {
                let cols = self.col_fields().await?.to_vec();
                let needs_tags = units.iter().any(|u| !u.tags.is_empty());
                let tags = if needs_tags {
                    self.tag_fields().await?.to_vec()
                } else {
                    Vec::new()
                };
                (cols, tags)
            }
            StatementKind::Query => (Vec::new(), Vec::new()),
        };

        let bindings = bind_stmt(kind, units, &col_fields, &tag_fields)?;
        debug!(stmt_id = self.stmt_id, units = bindings.len(), "binding statement");
        for binding in &bindings {
            if let Some(name) = &binding.table_name {
                self.set_table_name(name).await?;
            }
            if let Some(tags) = &binding.tags {
                self.set_tags(tags).await?;
            }
            if let Some(cols) = &binding.cols {
                self.bind(cols).await?;
            }
            self.add_batch().await?;
        }
        Ok(())
    }

    /// Executes the bound batches, returning the affected row count.
    pub async fn exec(&self) -> Result<i64> {
        self.ensure_open()?;
        let (req_id, req) = self.req();
        let resp: StmtExecResp = self.conn.call_json(STMT_EXEC, req_id, &req).await?;
        Ok(resp.affected)
    }

    pub async fn use_result(&self) -> Result<ResultSet> {
        self.ensure_open()?;
        let (req_id, req) = self.req();
        let resp = self.conn.call_json(STMT_USE_RESULT, req_id, &req).await?;
        ResultSet::from_response(self.conn.clone(), resp)
    }

    /// Fire-and-forget release of the server-side statement. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let (_, req) = self.req();
        let sent = self
            .conn
            .text_frame(STMT_CLOSE, &req)
            .and_then(|frame| self.conn.send_without_response(frame));
        if let Err(e) = sent {
            warn!(stmt_id = self.stmt_id, error = %e, "failed to close statement");
        }
    }
}

impl Drop for Stmt {
    fn drop(&mut self) {
        self.close();
    }
}
