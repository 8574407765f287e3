//! Result rows.

use std::sync::Arc;

use crate::conversion::{FromRow, FromValue};
use crate::error::{Error, Result};
use crate::protocol::backend::FieldDescription;
use crate::protocol::types::Oid;

/// Column metadata from a RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name (or alias)
    pub name: String,
    /// Data type OID
    pub type_oid: Oid,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
}

impl Column {
    /// Create a column description.
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
            table_oid: 0,
        }
    }
}

impl From<&FieldDescription<'_>> for Column {
    fn from(field: &FieldDescription<'_>) -> Self {
        Self {
            name: field.name.to_string(),
            type_oid: field.type_oid(),
            table_oid: field.table_oid(),
        }
    }
}

/// A single row in text format.
///
/// Rows share their column list with the result set they came from.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Option<Vec<u8>>>,
}

impl Row {
    /// Create a row; `None` entries are NULL.
    pub fn new(columns: Arc<[Column]>, values: Vec<Option<Vec<u8>>>) -> Self {
        Self { columns, values }
    }

    /// Number of values in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column descriptions.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Raw text bytes of a column: `None` if out of range, `Some(None)` for NULL.
    pub fn raw(&self, index: usize) -> Option<Option<&[u8]>> {
        self.values.get(index).map(Option::as_deref)
    }

    /// Decode the column at `index`.
    pub fn get<'a, T: FromValue<'a>>(&'a self, index: usize) -> Result<T> {
        let value = self.raw(index).ok_or_else(|| {
            Error::Decode(format!(
                "column index {} out of range for row of {}",
                index,
                self.len()
            ))
        })?;
        let oid = self.columns.get(index).map_or(0, |c| c.type_oid);
        match value {
            None => T::from_null(),
            Some(bytes) => T::from_text(oid, bytes),
        }
    }

    /// Decode the first column called `name`.
    pub fn get_by_name<'a, T: FromValue<'a>>(&'a self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::Decode(format!("no column named '{}'", name)))?;
        self.get(index)
    }

    /// Decode the whole row.
    pub fn decode<'a, T: FromRow<'a>>(&'a self) -> Result<T> {
        T::from_row(self)
    }
}
