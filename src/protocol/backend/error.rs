//! Error and notice response messages.

use crate::error::{DecodeError, ErrorFields};
use crate::protocol::codec::{read_cstr, read_u8};

/// Error field type codes from PostgreSQL protocol.
pub mod field_type {
    /// Severity (localized)
    pub const SEVERITY: u8 = b'S';
    /// Severity (non-localized, PostgreSQL 9.6+)
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    /// SQLSTATE code
    pub const CODE: u8 = b'C';
    /// Message
    pub const MESSAGE: u8 = b'M';
    /// Detail
    pub const DETAIL: u8 = b'D';
    /// Hint
    pub const HINT: u8 = b'H';
    /// Position in query
    pub const POSITION: u8 = b'P';
    /// Internal position
    pub const INTERNAL_POSITION: u8 = b'p';
    /// Internal query
    pub const INTERNAL_QUERY: u8 = b'q';
    /// Where (context)
    pub const WHERE: u8 = b'W';
    /// Schema name
    pub const SCHEMA: u8 = b's';
    /// Table name
    pub const TABLE: u8 = b't';
    /// Column name
    pub const COLUMN: u8 = b'c';
    /// Data type name
    pub const DATA_TYPE: u8 = b'd';
    /// Constraint name
    pub const CONSTRAINT: u8 = b'n';
    /// File name
    pub const FILE: u8 = b'F';
    /// Line number
    pub const LINE: u8 = b'L';
    /// Routine name
    pub const ROUTINE: u8 = b'R';
}

/// Parse the (type, value) field list shared by ErrorResponse and NoticeResponse.
///
/// The list ends at a zero type byte. Unknown field types are skipped.
pub fn parse_fields(payload: &[u8]) -> Result<ErrorFields, DecodeError> {
    let mut fields = ErrorFields::default();
    let mut data = payload;

    loop {
        let (field_type, rest) = read_u8(data, "error field type")?;
        if field_type == 0 {
            break;
        }

        let (value, rest) = read_cstr(rest, "error field value")?;
        data = rest;

        let slot = match field_type {
            field_type::SEVERITY => &mut fields.severity,
            field_type::SEVERITY_NON_LOCALIZED => &mut fields.severity_non_localized,
            field_type::CODE => &mut fields.code,
            field_type::MESSAGE => &mut fields.message,
            field_type::DETAIL => &mut fields.detail,
            field_type::HINT => &mut fields.hint,
            field_type::INTERNAL_QUERY => &mut fields.internal_query,
            field_type::WHERE => &mut fields.where_,
            field_type::SCHEMA => &mut fields.schema,
            field_type::TABLE => &mut fields.table,
            field_type::COLUMN => &mut fields.column,
            field_type::DATA_TYPE => &mut fields.data_type,
            field_type::CONSTRAINT => &mut fields.constraint,
            field_type::FILE => &mut fields.file,
            field_type::ROUTINE => &mut fields.routine,
            field_type::POSITION => {
                fields.position = value.parse().ok();
                continue;
            }
            field_type::INTERNAL_POSITION => {
                fields.internal_position = value.parse().ok();
                continue;
            }
            field_type::LINE => {
                fields.line = value.parse().ok();
                continue;
            }
            other => {
                tracing::debug!("Unknown error field type: {}", other as char);
                continue;
            }
        };
        *slot = Some(value.to_string());
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_fields() {
        let payload = b"SERROR\0VERROR\0C42601\0Msyntax error at or near \"SELEC\"\0P1\0Fscan.l\0L1176\0Rscanner_yyerror\0\0";
        let fields = parse_fields(payload).unwrap();
        assert_eq!(fields.severity(), Some("ERROR"));
        assert_eq!(fields.code(), Some("42601"));
        assert_eq!(fields.message(), "syntax error at or near \"SELEC\"");
        assert_eq!(fields.position, Some(1));
        assert_eq!(fields.file.as_deref(), Some("scan.l"));
        assert_eq!(fields.line, Some(1176));
        assert_eq!(fields.routine.as_deref(), Some("scanner_yyerror"));
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let fields = parse_fields(b"Xwhatever\0Mboom\0\0").unwrap();
        assert_eq!(fields.message(), "boom");
    }

    #[test]
    fn test_missing_terminator() {
        assert_eq!(
            parse_fields(b"Mboom\0"),
            Err(DecodeError::Truncated("error field type"))
        );
    }
}
