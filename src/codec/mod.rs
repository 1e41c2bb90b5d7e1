pub mod exports;
pub mod raw_block;
pub mod reader;
