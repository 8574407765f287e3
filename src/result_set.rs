//! Result sets returned by [`Statement::query`](crate::Statement::query).

use std::collections::VecDeque;
use std::sync::Arc;

use crate::connection::{Connection, ResourceKind};
use crate::conversion::FromRow;
use crate::error::Result;
use crate::protocol::backend::query::rows_affected_from_tag;
use crate::row::{Column, Row};
use crate::statement::Statement;

/// Sink a [`Connection`] fills while running a portal.
///
/// Callback order for one execution:
/// - rows: `set_columns` → `push_row*` → `finish` (or `suspend` when the row
///   limit is hit; the next `fetch` continues with `push_row*`)
/// - commands without rows: `finish` only
#[derive(Debug)]
pub struct ResultBuffer {
    columns: Arc<[Column]>,
    rows: VecDeque<Row>,
    tag: Option<String>,
    rows_affected: Option<u64>,
    suspended: bool,
    complete: bool,
}

impl ResultBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            rows: VecDeque::new(),
            tag: None,
            rows_affected: None,
            suspended: false,
            complete: false,
        }
    }

    /// Record the column layout of the rows that follow.
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns.into();
    }

    /// Append a row of text values; `None` is NULL.
    pub fn push_row(&mut self, values: Vec<Option<Vec<u8>>>) {
        self.rows.push_back(Row::new(Arc::clone(&self.columns), values));
    }

    /// The portal ran to completion; `tag` is the CommandComplete tag, absent
    /// for an empty query.
    pub fn finish(&mut self, tag: Option<&str>) {
        self.rows_affected = tag.and_then(rows_affected_from_tag);
        self.tag = tag.map(str::to_string);
        self.suspended = false;
        self.complete = true;
    }

    /// The row limit was reached with rows left in the portal.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Returns true while the portal holds rows not yet fetched.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Returns true once the command completed on the server.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Column descriptions; empty for commands that return no rows.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Command tag, e.g. `INSERT 0 3`.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Rows affected as reported by the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    /// Number of rows received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.rows.len()
    }

    fn pop_row(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    fn resume(&mut self) {
        self.suspended = false;
    }
}

impl Default for ResultBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Row cursor over one execution of a statement.
///
/// Holds the connection mutably until closed or dropped, which keeps the
/// connection free of interleaved commands. Rows beyond the first batch are
/// fetched on demand. Dropping an open result set closes it and logs any
/// failure.
///
/// # Example
///
/// ```ignore
/// let mut rs = stmt.query(&mut conn)?;
/// while let Some(row) = rs.next_row()? {
///     let (id, name): (i32, String) = row.decode()?;
///     println!("{id}: {name}");
/// }
/// rs.close()?;
/// ```
pub struct ResultSet<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    portal: String,
    buffer: ResultBuffer,
    closed: bool,
}

impl<'c, C: Connection + ?Sized> ResultSet<'c, C> {
    pub(crate) fn new(conn: &'c mut C, portal: &str) -> Self {
        Self {
            conn,
            portal: portal.to_string(),
            buffer: ResultBuffer::new(),
            closed: false,
        }
    }

    /// Run the statement's synchronous part into this result set.
    pub(crate) fn start(&mut self, statement: &Statement) -> Result<()> {
        self.conn.execute(statement, &mut self.buffer)
    }

    /// Name of the portal the rows come from.
    pub fn portal(&self) -> &str {
        &self.portal
    }

    /// Column descriptions.
    pub fn columns(&self) -> &[Column] {
        self.buffer.columns()
    }

    /// Returns true once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Rows affected, known once the command completed.
    pub fn rows_affected(&self) -> Option<u64> {
        self.buffer.rows_affected()
    }

    /// Command tag, known once the command completed.
    pub fn tag(&self) -> Option<&str> {
        self.buffer.tag()
    }

    /// Next row, fetching another batch from the portal when needed.
    ///
    /// Returns `Ok(None)` when the rows are exhausted or the set is closed.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_row() {
                return Ok(Some(row));
            }
            if self.closed || !self.buffer.is_suspended() {
                return Ok(None);
            }
            self.buffer.resume();
            self.conn.fetch(&self.portal, &mut self.buffer)?;
        }
    }

    /// Decode the next row into `out`.
    ///
    /// Returns `Ok(false)` and leaves `out` untouched when no row is left.
    pub fn scan_next<T: for<'a> FromRow<'a>>(&mut self, out: &mut T) -> Result<bool> {
        match self.next_row()? {
            Some(row) => {
                *out = row.decode()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Release the portal and discard unread rows.
    ///
    /// A portal that already ran to completion needs no round trip. Closing
    /// twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.rows.clear();

        if self.buffer.is_suspended() {
            self.buffer.resume();
            self.conn.close_resource(ResourceKind::Portal, &self.portal)?;
        }
        Ok(())
    }
}

impl<C: Connection + ?Sized> Iterator for ResultSet<'_, C> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl<C: Connection + ?Sized> Drop for ResultSet<'_, C> {
    fn drop(&mut self) {
        if self.closed || !self.buffer.is_suspended() {
            return;
        }
        tracing::debug!(portal = %self.portal, "closing suspended portal on drop");
        if let Err(e) = self.close() {
            tracing::warn!(portal = %self.portal, error = %e, "failed to close result set");
        }
    }
}
