//! The connection seam used by [`Statement`].
//!
//! A [`Connection`] owns the wire session. The statement layer only asks it to
//! allocate resource ids, run a statement into a [`ResultBuffer`], pull more
//! rows from a suspended portal, and release named server resources.
//! [`crate::sync::Conn`] is the implementation over a PostgreSQL stream.

use crate::error::Result;
use crate::result_set::ResultBuffer;
use crate::statement::Statement;

/// Kind of a named server-side resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A prepared statement created by Parse
    Statement,
    /// A portal created by Bind
    Portal,
}

impl ResourceKind {
    /// Byte used for this kind in Close and Describe messages.
    pub fn as_byte(self) -> u8 {
        match self {
            ResourceKind::Statement => b'S',
            ResourceKind::Portal => b'P',
        }
    }
}

/// A session able to run prepared statements.
///
/// Implementations are used from one logical thread at a time. A
/// [`ResultSet`](crate::ResultSet) borrows the connection mutably for as long
/// as it is open, so no other command can be issued until it is dropped or
/// closed.
pub trait Connection {
    /// Allocate the next prepared-statement id.
    ///
    /// Ids start at 0 and are never reused for the life of the connection.
    fn next_statement_id(&mut self) -> u64;

    /// Allocate the next portal id.
    ///
    /// Ids start at 0 and are never reused for the life of the connection.
    fn next_portal_id(&mut self) -> u64;

    /// Run `statement` with the current values of its parameters.
    ///
    /// Binds the values positionally to the statement's portal, describes it
    /// and executes it, feeding columns and rows into `rows`. Returns once the
    /// first batch has arrived; when the portal is left suspended `rows` says
    /// so and the rest is pulled with [`Connection::fetch`].
    fn execute(&mut self, statement: &Statement, rows: &mut ResultBuffer) -> Result<()>;

    /// Pull the next batch of rows from a suspended portal.
    fn fetch(&mut self, portal: &str, rows: &mut ResultBuffer) -> Result<()>;

    /// Release a named server resource.
    fn close_resource(&mut self, kind: ResourceKind, name: &str) -> Result<()>;
}
