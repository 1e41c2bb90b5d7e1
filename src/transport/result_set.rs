use tracing::{debug, warn};

use crate::block_view::{Row, RowCursor};
use crate::schema::{FieldMeta, Precision, TypeCode};
use crate::transport::connection::Connection;
use crate::transport::protocol::{
    BLOCK_PREFIX_LEN, FETCH, FETCH_BLOCK, FREE_RESULT, FetchResp, QueryResp, ResultReq,
};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    Open,
    Fetching,
    Exhausted,
    Closed,
}

/// Server-side result consumed block by block.
///
/// Fetches are sequential: `next_row` takes `&mut self`, so a second fetch
/// cannot start before the first completes. Dropping an unclosed result set
/// still sends the release call.
#[derive(Debug)]
pub struct ResultSet {
    conn: Connection,
    result_id: u64,
    fields: Vec<FieldMeta>,
    precision: Precision,
    affected_rows: i64,
    state: ResultState,
    cursor: Option<RowCursor>,
}

fn decimal_meta(values: &[i64], i: usize, what: &str) -> Result<u8> {
    let v = values.get(i).copied().unwrap_or(0);
    u8::try_from(v).map_err(|_| Error::Other(format!("invalid decimal {what} for column {i}: {v}")))
}

impl ResultSet {
    pub(crate) fn from_response(conn: Connection, resp: QueryResp) -> Result<Self> {
        let count = resp.fields_types.len();
        if resp.fields_names.len() != count || resp.fields_lengths.len() != count {
            return Err(Error::Other("inconsistent field metadata".to_string()));
        }
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let ty = TypeCode::from_u8(resp.fields_types[i])?;
            let (precision, scale) = if ty.is_decimal() {
                (
                    decimal_meta(&resp.fields_precisions, i, "precision")?,
                    decimal_meta(&resp.fields_scales, i, "scale")?,
                )
            } else {
                (0, 0)
            };
            fields.push(FieldMeta {
                name: resp.fields_names[i].clone(),
                ty,
                length: resp.fields_lengths[i],
                precision,
                scale,
            });
        }
        let state = if resp.is_update || fields.is_empty() {
            ResultState::Exhausted
        } else {
            ResultState::Open
        };
        Ok(Self {
            conn,
            result_id: resp.id,
            fields,
            precision: Precision::from_code(resp.precision)?,
            affected_rows: resp.affected_rows,
            state,
            cursor: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.result_id
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field_type(&self, i: usize) -> Option<TypeCode> {
        self.fields.get(i).map(|f| f.ty)
    }

    pub fn type_name(&self, i: usize) -> Option<&'static str> {
        self.field_type(i).map(TypeCode::name)
    }

    pub fn field_length(&self, i: usize) -> Option<i64> {
        self.fields.get(i).map(|f| f.length)
    }

    /// Precision and scale, for decimal columns only.
    pub fn precision_scale(&self, i: usize) -> Option<(u8, u8)> {
        self.fields
            .get(i)
            .filter(|f| f.ty.is_decimal())
            .map(|f| (f.precision, f.scale))
    }

    /// Time precision of timestamp columns.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn affected_rows(&self) -> i64 {
        self.affected_rows
    }

    /// Next row in server order, or `None` at end of data.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            match self.state {
                ResultState::Closed => return Err(Error::ResultSetClosed),
                ResultState::Exhausted => return Ok(None),
                ResultState::Open | ResultState::Fetching => {}
            }
            if let Some(cursor) = self.cursor.as_mut() {
                if let Some(row) = cursor.next_row()? {
                    return Ok(Some(row));
                }
            }
            self.fetch_block().await?;
        }
    }

    async fn fetch_block(&mut self) -> Result<()> {
        self.state = ResultState::Fetching;
        self.cursor = None;

        let req_id = self.conn.next_req_id();
        let probe: FetchResp = self
            .conn
            .call_json(FETCH, req_id, &ResultReq {
                req_id,
                id: self.result_id,
            })
            .await?;
        if probe.completed {
            debug!(result_id = self.result_id, "result set exhausted");
            self.state = ResultState::Exhausted;
            return Ok(());
        }

        let req_id = self.conn.next_req_id();
        let bytes = self
            .conn
            .call_binary(FETCH_BLOCK, req_id, &ResultReq {
                req_id,
                id: self.result_id,
            })
            .await?;
        let cursor = RowCursor::open(bytes, BLOCK_PREFIX_LEN, &self.fields, self.precision)?;
        if cursor.row_count() != probe.rows {
            debug!(
                result_id = self.result_id,
                announced = probe.rows,
                actual = cursor.row_count(),
                "block row count differs from fetch probe"
            );
        }
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Releases the server-side result. Idempotent; a release that cannot be
    /// sent is logged and does not fail the close.
    pub async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if self.state == ResultState::Closed {
            return;
        }
        self.state = ResultState::Closed;
        self.cursor = None;

        let req_id = self.conn.next_req_id();
        let sent = self
            .conn
            .text_frame(FREE_RESULT, &ResultReq {
                req_id,
                id: self.result_id,
            })
            .and_then(|frame| self.conn.send_without_response(frame));
        if let Err(e) = sent {
            warn!(result_id = self.result_id, error = %e, "failed to release result");
        }
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        self.release();
    }
}
