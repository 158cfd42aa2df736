//! Runtime values as they cross the boundary between the host program and
//! the database: parameter bindings, literal constants embedded in
//! expression trees, and cells of result rows.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// A single database value.
///
/// `CommitTimestamp` is not a value the host can produce; it is the
/// placeholder for a column the backend fills in at commit time. The SQL
/// renderer turns it into `PENDING_COMMIT_TIMESTAMP()` and the mutation
/// path passes it through for the backend to resolve.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Numeric(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Array(Vec<Value>),
    CommitTimestamp,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::Int64(_) => "INT64",
            Value::Float64(_) => "FLOAT64",
            Value::Numeric(_) => "NUMERIC",
            Value::String(_) => "STRING",
            Value::Bytes(_) => "BYTES",
            Value::Uuid(_) => "STRING", // GUIDs are stored as STRING columns
            Value::Date(_) => "DATE",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
            Value::CommitTimestamp => "TIMESTAMP",
        }
    }
}

// Constants inside expression trees must support structural equality and
// hashing so translated trees can serve as cache keys. Floats compare by
// bit pattern here: two nodes are the same node exactly when they render
// the same SQL, which is an identity question, not an IEEE one.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (Numeric(a), Numeric(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (CommitTimestamp, CommitTimestamp) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null | CommitTimestamp => {}
            Bool(b) => b.hash(state),
            Int64(i) => i.hash(state),
            Float64(f) => f.to_bits().hash(state),
            Numeric(d) => d.hash(state),
            String(s) => s.hash(state),
            Bytes(b) => b.hash(state),
            Uuid(u) => u.hash(state),
            Date(d) => d.hash(state),
            Timestamp(t) => t.hash(state),
            // serde_json::Value is not Hash; the canonical rendering is.
            Json(j) => j.to_string().hash(state),
            Array(vs) => vs.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// Failure to narrow a database value into the host-side type a column is
/// declared with. The wide store types (INT64, FLOAT64) cover several host
/// widths; reading back a row is where a mismatch surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },
    #[error("expected {expected}, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("NULL where a non-null {target} was required")]
    UnexpectedNull { target: &'static str },
}

impl Value {
    fn int64_for(&self, target: &'static str) -> Result<i64, ConversionError> {
        match self {
            Value::Int64(i) => Ok(*i),
            Value::Null => Err(ConversionError::UnexpectedNull { target }),
            other => Err(ConversionError::WrongKind {
                expected: "INT64",
                found: other.kind(),
            }),
        }
    }

    pub fn to_i64(&self) -> Result<i64, ConversionError> {
        self.int64_for("i64")
    }

    pub fn to_i32(&self) -> Result<i32, ConversionError> {
        let i = self.int64_for("i32")?;
        i32::try_from(i).map_err(|_| ConversionError::OutOfRange {
            value: i.to_string(),
            target: "i32",
        })
    }

    pub fn to_i16(&self) -> Result<i16, ConversionError> {
        let i = self.int64_for("i16")?;
        i16::try_from(i).map_err(|_| ConversionError::OutOfRange {
            value: i.to_string(),
            target: "i16",
        })
    }

    pub fn to_i8(&self) -> Result<i8, ConversionError> {
        let i = self.int64_for("i8")?;
        i8::try_from(i).map_err(|_| ConversionError::OutOfRange {
            value: i.to_string(),
            target: "i8",
        })
    }

    pub fn to_u8(&self) -> Result<u8, ConversionError> {
        let i = self.int64_for("u8")?;
        u8::try_from(i).map_err(|_| ConversionError::OutOfRange {
            value: i.to_string(),
            target: "u8",
        })
    }

    pub fn to_f64(&self) -> Result<f64, ConversionError> {
        match self {
            Value::Float64(f) => Ok(*f),
            Value::Int64(i) => Ok(*i as f64),
            Value::Null => Err(ConversionError::UnexpectedNull { target: "f64" }),
            other => Err(ConversionError::WrongKind {
                expected: "FLOAT64",
                found: other.kind(),
            }),
        }
    }

    /// FLOAT64 to f32 follows IEEE narrowing: out-of-range magnitudes
    /// saturate to infinity rather than erroring.
    pub fn to_f32(&self) -> Result<f32, ConversionError> {
        Ok(self.to_f64()? as f32)
    }

    pub fn to_numeric(&self) -> Result<Decimal, ConversionError> {
        match self {
            Value::Numeric(d) => Ok(*d),
            Value::Int64(i) => Ok(Decimal::from(*i)),
            Value::Float64(f) => {
                Decimal::try_from(*f).map_err(|_| ConversionError::OutOfRange {
                    value: f.to_string(),
                    target: "NUMERIC",
                })
            }
            Value::Null => Err(ConversionError::UnexpectedNull { target: "NUMERIC" }),
            other => Err(ConversionError::WrongKind {
                expected: "NUMERIC",
                found: other.kind(),
            }),
        }
    }

    pub fn to_bool(&self) -> Result<bool, ConversionError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Null => Err(ConversionError::UnexpectedNull { target: "bool" }),
            other => Err(ConversionError::WrongKind {
                expected: "BOOL",
                found: other.kind(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, ConversionError> {
        match self {
            Value::String(s) => Ok(s),
            Value::Null => Err(ConversionError::UnexpectedNull { target: "str" }),
            other => Err(ConversionError::WrongKind {
                expected: "STRING",
                found: other.kind(),
            }),
        }
    }

    pub fn to_timestamp(&self) -> Result<DateTime<Utc>, ConversionError> {
        match self {
            Value::Timestamp(t) => Ok(*t),
            Value::Null => Err(ConversionError::UnexpectedNull { target: "timestamp" }),
            other => Err(ConversionError::WrongKind {
                expected: "TIMESTAMP",
                found: other.kind(),
            }),
        }
    }

    pub fn to_date(&self) -> Result<NaiveDate, ConversionError> {
        match self {
            Value::Date(d) => Ok(*d),
            Value::Null => Err(ConversionError::UnexpectedNull { target: "date" }),
            other => Err(ConversionError::WrongKind {
                expected: "DATE",
                found: other.kind(),
            }),
        }
    }
}
