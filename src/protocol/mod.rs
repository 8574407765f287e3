//! PostgreSQL wire protocol, extended-query subset.
//!
//! Only the messages needed to run a named statement through a named portal
//! are implemented. Startup and authentication happen before a stream is
//! handed to this crate.
//!
//! # Structure
//!
//! - `backend`: Server → Client messages (parsing)
//! - `frontend`: Client → Server messages (encoding)
//! - `codec`: Low-level encoding/decoding primitives
//! - `types`: Common protocol types (FormatCode, Oid, TransactionStatus)

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use backend::RawMessage;
pub use types::{FormatCode, Oid, TransactionStatus};
