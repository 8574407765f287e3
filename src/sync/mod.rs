//! Synchronous PostgreSQL connection.

mod conn;
mod stream;

pub use conn::Conn;
