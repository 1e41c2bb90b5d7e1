use crate::Result;
use crate::batch::BoundBatch;
use crate::block_view::{RowCursor, open_block};
use crate::codec::raw_block::{encode_raw_block, encode_raw_block_into};
use crate::schema::{FieldMeta, Precision};

pub fn encode(batch: &BoundBatch) -> Result<Vec<u8>> {
    encode_raw_block(batch, 0)
}

pub fn encode_into(batch: &BoundBatch, out: &mut Vec<u8>) -> Result<()> {
    encode_raw_block_into(batch, 0, out)
}

pub fn encode_group_into(batch: &BoundBatch, group_id: u64, out: &mut Vec<u8>) -> Result<()> {
    encode_raw_block_into(batch, group_id, out)
}

pub fn decode(bytes: Vec<u8>, fields: &[FieldMeta], precision: Precision) -> Result<RowCursor> {
    open_block(bytes, fields, precision)
}
