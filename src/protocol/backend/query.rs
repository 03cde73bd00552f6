//! Query-related backend messages.

use bytes::Bytes;
use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::DecodeError;
use crate::protocol::codec::{read_cstr, read_i32, read_u16};
use crate::protocol::types::{FormatCode, Oid};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct FieldDescriptionTail {
    table_oid: U32BE,
    column_id: I16BE,
    type_oid: U32BE,
    type_size: I16BE,
    type_modifier: I32BE,
    format: U16BE,
}

/// Column metadata from a RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code (0=text, 1=binary)
    pub format: FormatCode,
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowDescription {
    /// Fields in column order
    pub fields: Vec<FieldDescription>,
}

impl RowDescription {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let (num_fields, mut data) = read_u16(payload, "field count")?;
        let mut fields = Vec::with_capacity(num_fields as usize);

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data, "field name")?;
            let (tail, rest) = FieldDescriptionTail::read_from_prefix(rest)
                .map_err(|_| DecodeError::Truncated("field description"))?;

            fields.push(FieldDescription {
                name: name.to_string(),
                table_oid: tail.table_oid.get(),
                column_id: tail.column_id.get(),
                type_oid: tail.type_oid.get(),
                type_size: tail.type_size.get(),
                type_modifier: tail.type_modifier.get(),
                format: FormatCode::from_u16(tail.format.get())?,
            });

            data = rest;
        }

        Ok(Self { fields })
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One non-NULL column value as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Text-format value
    Text(String),
    /// Binary-format value, left opaque
    Binary(Bytes),
}

impl RawValue {
    /// Text form, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the value in either format.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawValue::Text(s) => s.as_bytes(),
            RawValue::Binary(b) => b,
        }
    }
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataRow {
    /// Column values in order; `None` is SQL NULL
    pub values: Vec<Option<RawValue>>,
}

impl DataRow {
    /// Parse a DataRow message.
    ///
    /// `format` is the decode mode carried over from the most recent
    /// RowDescription. Binary values share the payload's allocation.
    pub fn parse(payload: &Bytes, format: FormatCode) -> Result<Self, DecodeError> {
        let (num_columns, mut data) = read_u16(payload, "column count")?;
        let mut values = Vec::with_capacity(num_columns as usize);

        for _ in 0..num_columns {
            let (len, rest) = read_i32(data, "column length")?;
            if len == -1 {
                values.push(None);
                data = rest;
                continue;
            }

            let len = usize::try_from(len).map_err(|_| DecodeError::Truncated("column value"))?;
            if rest.len() < len {
                return Err(DecodeError::Truncated("column value"));
            }

            let value = match format {
                FormatCode::Text => {
                    let s = simdutf8::basic::from_utf8(&rest[..len])
                        .map_err(|_| DecodeError::InvalidUtf8("column value"))?;
                    RawValue::Text(s.to_string())
                }
                FormatCode::Binary => {
                    let start = payload.len() - rest.len();
                    RawValue::Binary(payload.slice(start..start + len))
                }
            };
            values.push(Some(value));
            data = &rest[len..];
        }

        Ok(Self { values })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: String,
}

impl CommandComplete {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let (tag, _) = read_cstr(payload, "command tag")?;
        Ok(Self {
            tag: tag.to_string(),
        })
    }

    /// Parse the number of rows affected from the command tag.
    ///
    /// Returns `Some(count)` for commands like SELECT, INSERT, UPDATE, DELETE.
    /// Returns `None` for other commands or parse failures.
    pub fn rows_affected(&self) -> Option<u64> {
        rows_affected(&self.tag)
    }

    /// Get the command name from the tag.
    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }
}

/// Row count from a command tag such as `"INSERT 0 1"` or `"UPDATE 10"`.
pub fn rows_affected(tag: &str) -> Option<u64> {
    let parts: Vec<&str> = tag.split_whitespace().collect();

    match parts.as_slice() {
        ["INSERT", _oid, count] => count.parse().ok(),
        ["SELECT" | "UPDATE" | "DELETE" | "COPY" | "MOVE" | "FETCH" | "MERGE", count] => {
            count.parse().ok()
        }
        _ => None,
    }
}
