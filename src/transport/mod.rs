pub mod connection;
pub mod pool;
pub mod protocol;
pub mod result_set;
pub mod stmt;

pub use connection::Connection;
pub use protocol::Frame;
pub use result_set::{ResultSet, ResultState};
pub use stmt::Stmt;
