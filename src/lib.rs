//! Named-parameter prepared statements for PostgreSQL.
//!
//! Commands are written with named placeholders (`:id`, `@name`) and rewritten
//! once into the positional form the server expects (`$1`, `$2::int4`).
//! Parameters are handles: keep a clone, change its value, execute again.
//!
//! # Features
//!
//! - **Quote-aware rewriting**: placeholders inside `'...'` literals are left alone
//! - **Sans-I/O state machines**: Protocol logic is separated from I/O
//! - **Lazy row fetching**: with `fetch_size` set, rows arrive in batches from a suspended portal
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpStream;
//!
//! use zero_pgstmt::sync::Conn;
//! use zero_pgstmt::{Opts, Parameter};
//!
//! fn main() -> zero_pgstmt::Result<()> {
//!     // startup and authentication happen before the stream is handed over
//!     let stream = TcpStream::connect("localhost:5432")?;
//!     let mut conn = Conn::from_stream(stream, Opts::try_from("postgres://localhost/app")?);
//!
//!     let min_age = Parameter::with_type(":min_age", "int4", 18);
//!     let mut stmt = conn.prepare(
//!         "select name from users where age >= :min_age and status <> ':min_age'",
//!         &[min_age.clone()],
//!     )?;
//!     assert_eq!(
//!         stmt.actual_command(),
//!         "select name from users where age >= $1::int4 and status <> ':min_age'"
//!     );
//!
//!     let mut rows = stmt.query(&mut conn)?;
//!     while let Some(row) = rows.next_row()? {
//!         let (name,): (String,) = row.decode()?;
//!         println!("{name}");
//!     }
//!     rows.close()?;
//!     drop(rows);
//!
//!     min_age.set_value(65);
//!     let mut first = (String::new(),);
//!     if stmt.scan(&mut conn, &mut first)? {
//!         println!("first senior: {}", first.0);
//!     }
//!
//!     stmt.close(&mut conn)?;
//!     conn.close()
//! }
//! ```

pub mod buffer_set;
pub mod connection;
pub mod conversion;
pub mod error;
pub mod opts;
pub mod parameter;
pub mod protocol;
pub mod result_set;
pub mod rewrite;
pub mod row;
pub mod state;
pub mod statement;
pub mod value;

#[cfg(feature = "sync")]
pub mod sync;

pub use buffer_set::BufferSet;
pub use connection::{Connection, ResourceKind};
pub use conversion::{FromRow, FromValue};
pub use error::{Error, ErrorFields, Result};
pub use opts::Opts;
pub use parameter::Parameter;
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use result_set::{ResultBuffer, ResultSet};
pub use rewrite::rewrite;
pub use row::{Column, Row};
pub use statement::Statement;
pub use value::Value;
