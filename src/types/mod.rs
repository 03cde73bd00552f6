//! Value decoder table: converts text-format column values into [`Value`]s.
//!
//! The table maps a type OID to a conversion function. Types without an
//! entry are returned as [`Value::Text`]. A table is read-only once built
//! and can be shared across connections.

mod array;
mod datetime;

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::protocol::backend::RawValue;
use crate::protocol::types::{Oid, oid};

pub use array::parse_array;
pub use datetime::{decode_date, decode_timestamp, decode_timestamptz};

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// `bool`
    Bool(bool),
    /// `int2`, `int4`, `int8`, `oid`
    Int(i64),
    /// `float4`, `float8`
    Float(f64),
    /// Any type without a registered decoder
    Text(String),
    /// `json`, `jsonb`
    Json(serde_json::Value),
    /// `date`
    Date(NaiveDate),
    /// `timestamp` as the literal wall-clock time
    Timestamp(NaiveDateTime),
    /// `timestamptz` with the offset the server reported
    TimestampTz(DateTime<FixedOffset>),
    /// `point`
    Point { x: f64, y: f64 },
    /// One- or multi-dimensional array
    Array(Vec<Value>),
    /// Binary-format column, left opaque
    Bytes(Bytes),
}

impl Value {
    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, if this is `Value::Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if this is `Value::Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Conversion from the text form of one type.
pub type DecodeFn = Box<dyn Fn(&str) -> Result<Value> + Send + Sync>;

/// Map from type OID to conversion function.
pub struct ValueDecoderTable {
    decoders: HashMap<Oid, DecodeFn>,
}

impl ValueDecoderTable {
    /// A table with no entries; every value decodes to `Value::Text`.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Add or replace the decoder for `type_oid`.
    pub fn register<F>(&mut self, type_oid: Oid, decode: F)
    where
        F: Fn(&str) -> Result<Value> + Send + Sync + 'static,
    {
        self.decoders.insert(type_oid, Box::new(decode));
    }

    /// Add or replace an array decoder whose elements use `element`.
    pub fn register_array(&mut self, type_oid: Oid, element: fn(&str) -> Result<Value>) {
        self.register(type_oid, move |s| parse_array(s, &element));
    }

    /// True if `type_oid` has a decoder.
    pub fn contains(&self, type_oid: Oid) -> bool {
        self.decoders.contains_key(&type_oid)
    }

    /// Convert the text form of a value of type `type_oid`.
    pub fn decode_text(&self, type_oid: Oid, text: &str) -> Result<Value> {
        match self.decoders.get(&type_oid) {
            Some(decode) => decode(text),
            None => Ok(Value::Text(text.to_string())),
        }
    }

    /// Convert a column value as delivered in a row.
    pub fn decode(&self, type_oid: Oid, value: Option<&RawValue>) -> Result<Value> {
        match value {
            None => Ok(Value::Null),
            Some(RawValue::Text(text)) => self.decode_text(type_oid, text),
            Some(RawValue::Binary(bytes)) => Ok(Value::Bytes(bytes.clone())),
        }
    }
}

impl Default for ValueDecoderTable {
    fn default() -> Self {
        let mut table = Self::empty();

        table.register(oid::BOOL, decode_bool);
        for type_oid in [oid::INT8, oid::INT2, oid::INT4, oid::OID] {
            table.register(type_oid, decode_int);
        }
        for type_oid in [oid::FLOAT4, oid::FLOAT8] {
            table.register(type_oid, decode_float);
        }
        for type_oid in [oid::JSON, oid::JSONB] {
            table.register(type_oid, decode_json);
        }
        table.register(oid::POINT, decode_point);
        table.register(oid::DATE, decode_date);
        table.register(oid::TIMESTAMP, decode_timestamp);
        table.register(oid::TIMESTAMPTZ, decode_timestamptz);

        table.register_array(oid::BOOL_ARRAY, decode_bool);
        for type_oid in [oid::INT2_ARRAY, oid::INT4_ARRAY, oid::INT8_ARRAY, oid::OID_ARRAY] {
            table.register_array(type_oid, decode_int);
        }
        for type_oid in [oid::FLOAT4_ARRAY, oid::FLOAT8_ARRAY] {
            table.register_array(type_oid, decode_float);
        }
        for type_oid in [oid::JSON_ARRAY, oid::JSONB_ARRAY] {
            table.register_array(type_oid, decode_json);
        }
        table.register_array(oid::POINT_ARRAY, decode_point);
        table.register_array(oid::DATE_ARRAY, decode_date);
        table.register_array(oid::TIMESTAMP_ARRAY, decode_timestamp);
        table.register_array(oid::TIMESTAMPTZ_ARRAY, decode_timestamptz);
        for type_oid in [
            oid::CIDR_ARRAY,
            oid::MONEY_ARRAY,
            oid::REGPROC_ARRAY,
            oid::TEXT_ARRAY,
            oid::BPCHAR_ARRAY,
            oid::VARCHAR_ARRAY,
            oid::MACADDR_ARRAY,
            oid::INET_ARRAY,
            oid::TIME_ARRAY,
            oid::NUMERIC_ARRAY,
            oid::TIMETZ_ARRAY,
            oid::UUID_ARRAY,
            oid::NUMRANGE_ARRAY,
        ] {
            table.register_array(type_oid, decode_text);
        }

        table
    }
}

impl std::fmt::Debug for ValueDecoderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut oids: Vec<&Oid> = self.decoders.keys().collect();
        oids.sort_unstable();
        f.debug_struct("ValueDecoderTable").field("oids", &oids).finish()
    }
}

/// `bool`: `TRUE`, `t`, `true`, `y`, `yes`, `on` and `1` are true, anything else false.
pub fn decode_bool(s: &str) -> Result<Value> {
    Ok(Value::Bool(matches!(
        s,
        "TRUE" | "t" | "true" | "y" | "yes" | "on" | "1"
    )))
}

/// `int2`, `int4`, `int8`, `oid`
pub fn decode_int(s: &str) -> Result<Value> {
    s.parse()
        .map(Value::Int)
        .map_err(|e| Error::Value(format!("invalid integer {:?}: {}", s, e)))
}

/// `float4`, `float8`, including `NaN` and `Infinity`
pub fn decode_float(s: &str) -> Result<Value> {
    s.parse()
        .map(Value::Float)
        .map_err(|e| Error::Value(format!("invalid float {:?}: {}", s, e)))
}

/// `json`, `jsonb`
pub fn decode_json(s: &str) -> Result<Value> {
    serde_json::from_str(s)
        .map(Value::Json)
        .map_err(|e| Error::Value(format!("invalid json: {}", e)))
}

/// `point`: `(x,y)`. Anything not starting with `(` is NULL.
pub fn decode_point(s: &str) -> Result<Value> {
    let Some(inner) = s.strip_prefix('(') else {
        return Ok(Value::Null);
    };
    let inner = inner.strip_suffix(')').unwrap_or(inner);
    let (x, y) = inner
        .split_once(',')
        .ok_or_else(|| Error::Value(format!("invalid point {:?}", s)))?;
    let coord = |c: &str| {
        c.trim()
            .parse::<f64>()
            .map_err(|e| Error::Value(format!("invalid point {:?}: {}", s, e)))
    };
    Ok(Value::Point {
        x: coord(x)?,
        y: coord(y)?,
    })
}

/// Element decoder for arrays of types without a native mapping.
pub fn decode_text(s: &str) -> Result<Value> {
    Ok(Value::Text(s.to_string()))
}
