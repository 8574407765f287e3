//! Result-related backend messages.

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_cstr, read_u16};
use crate::protocol::types::Oid;

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub column_id: I16BE,
    /// Data type OID
    pub type_oid: U32BE,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: I16BE,
    /// Type modifier (type-specific)
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: U16BE,
}

/// Field description within a RowDescription.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescription<'a> {
    /// Field name
    pub name: &'a str,
    /// Fixed-size metadata
    pub tail: &'a FieldDescriptionTail,
}

impl FieldDescription<'_> {
    /// Table OID (0 if not a table column)
    pub fn table_oid(&self) -> Oid {
        self.tail.table_oid.get()
    }

    /// Data type OID
    pub fn type_oid(&self) -> Oid {
        self.tail.type_oid.get()
    }
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_fields, mut data) = read_u16(payload)?;
        let mut fields = Vec::with_capacity(num_fields as usize);

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (tail, rest) = FieldDescriptionTail::ref_from_prefix(rest)
                .map_err(|e| Error::Protocol(format!("FieldDescription tail: {e:?}")))?;
            fields.push(FieldDescription { name, tail });
            data = rest;
        }

        Ok(Self { fields })
    }

    /// Get field descriptions.
    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_columns, columns_data) = read_u16(payload)?;
        Ok(Self {
            num_columns,
            columns_data,
        })
    }

    /// Collect every column into owned buffers, `None` for NULL.
    ///
    /// Fails when the payload is shorter than its column headers claim.
    pub fn to_values(&self) -> Result<Vec<Option<Vec<u8>>>> {
        let mut values = Vec::with_capacity(self.num_columns as usize);
        let mut data = self.columns_data;

        for idx in 0..self.num_columns {
            let (len, rest) = I32BE::read_from_prefix(data)
                .map_err(|e| Error::Protocol(format!("DataRow: column {idx} header: {e:?}")))?;
            let len = len.get();
            if len < 0 {
                values.push(None);
                data = rest;
                continue;
            }
            let (value, rest) = rest
                .split_at_checked(len as usize)
                .ok_or_else(|| Error::Protocol(format!("DataRow: column {idx} truncated")))?;
            values.push(Some(value.to_vec()));
            data = rest;
        }

        Ok(values)
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }
}

/// Extract the row count from a command tag such as `INSERT 0 3` or `UPDATE 10`.
pub fn rows_affected_from_tag(tag: &str) -> Option<u64> {
    let parts: Vec<&str> = tag.split_whitespace().collect();

    match parts.as_slice() {
        ["INSERT", _oid, count] => count.parse().ok(),
        ["SELECT" | "UPDATE" | "DELETE" | "MERGE" | "COPY" | "MOVE" | "FETCH", count] => {
            count.parse().ok()
        }
        _ => None,
    }
}
