pub mod batch;
pub mod block_view;
pub mod codec;
pub mod config;
pub mod error;
pub mod schema;
pub mod transport;
pub mod value;

pub use crate::error::{Error, Result};

#[cfg(test)]
mod tests;
