//! Common PostgreSQL wire protocol types.

use crate::error::DecodeError;

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// Type OIDs of the built-in types this crate knows how to decode.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const JSON_ARRAY: Oid = 199;
    pub const POINT: Oid = 600;
    pub const CIDR_ARRAY: Oid = 651;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const MONEY_ARRAY: Oid = 791;
    pub const BOOL_ARRAY: Oid = 1000;
    pub const INT2_ARRAY: Oid = 1005;
    pub const INT4_ARRAY: Oid = 1007;
    pub const REGPROC_ARRAY: Oid = 1008;
    pub const TEXT_ARRAY: Oid = 1009;
    pub const BPCHAR_ARRAY: Oid = 1014;
    pub const VARCHAR_ARRAY: Oid = 1015;
    pub const INT8_ARRAY: Oid = 1016;
    pub const POINT_ARRAY: Oid = 1017;
    pub const FLOAT4_ARRAY: Oid = 1021;
    pub const FLOAT8_ARRAY: Oid = 1022;
    pub const OID_ARRAY: Oid = 1028;
    pub const MACADDR_ARRAY: Oid = 1040;
    pub const INET_ARRAY: Oid = 1041;
    pub const DATE: Oid = 1082;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMP_ARRAY: Oid = 1115;
    pub const DATE_ARRAY: Oid = 1182;
    pub const TIME_ARRAY: Oid = 1183;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
    pub const NUMERIC_ARRAY: Oid = 1231;
    pub const TIMETZ_ARRAY: Oid = 1270;
    pub const UUID_ARRAY: Oid = 2951;
    pub const JSONB: Oid = 3802;
    pub const JSONB_ARRAY: Oid = 3807;
    pub const NUMRANGE_ARRAY: Oid = 3907;
}

/// Data format code in PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    /// Text format (human-readable)
    #[default]
    Text = 0,
    /// Binary format (type-specific packed representation)
    Binary = 1,
}

impl FormatCode {
    /// Create a FormatCode from a raw u16 value.
    pub fn from_u16(value: u16) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(FormatCode::Text),
            1 => Ok(FormatCode::Binary),
            other => Err(DecodeError::UnknownFormatCode(other)),
        }
    }
}

impl TryFrom<u16> for FormatCode {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_u16(value)
    }
}

/// Transaction status indicator from ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Idle (not in transaction block)
    #[default]
    Idle = b'I',
    /// In transaction block
    InTransaction = b'T',
    /// In failed transaction block (queries will be rejected until rollback)
    FailedTransaction = b'E',
}

impl TransactionStatus {
    /// Create a TransactionStatus from the ReadyForQuery status byte.
    pub fn from_byte(value: u8) -> Result<Self, DecodeError> {
        match value {
            b'I' => Ok(TransactionStatus::Idle),
            b'T' => Ok(TransactionStatus::InTransaction),
            b'E' => Ok(TransactionStatus::FailedTransaction),
            other => Err(DecodeError::UnknownTransactionStatus(char::from(other))),
        }
    }

    /// Returns true if currently in a transaction (either active or failed).
    pub fn in_transaction(self) -> bool {
        matches!(
            self,
            TransactionStatus::InTransaction | TransactionStatus::FailedTransaction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_status() {
        assert_eq!(TransactionStatus::from_byte(b'I'), Ok(TransactionStatus::Idle));
        assert_eq!(
            TransactionStatus::from_byte(b'E'),
            Ok(TransactionStatus::FailedTransaction)
        );
        assert!(TransactionStatus::InTransaction.in_transaction());
        assert_eq!(
            TransactionStatus::from_byte(b'Q'),
            Err(DecodeError::UnknownTransactionStatus('Q'))
        );
    }

    #[test]
    fn test_format_code() {
        assert_eq!(FormatCode::from_u16(1), Ok(FormatCode::Binary));
        assert_eq!(FormatCode::try_from(2), Err(DecodeError::UnknownFormatCode(2)));
    }
}
