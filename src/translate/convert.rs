//! Conversion translation: ToString over the scalar allow-list, and
//! nullable defaulting via COALESCE.

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::ast::Method;
use crate::sql::{SqlExpr, StoreType};
use crate::translate::MethodTranslator;
use crate::value::Value;

pub struct ConvertMethods;

impl MethodTranslator for ConvertMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        let r = receiver?;
        match (method, args) {
            (Method::ToString, []) => to_string(r),
            (Method::GetValueOrDefault, []) => {
                let zero = zero_for(&r.store_type()?)?;
                Some(coalesce(r, zero.into()))
            }
            (Method::GetValueOrDefault, [default]) => Some(coalesce(r, default.clone())),
            _ => None,
        }
    }
}

fn to_string(r: &SqlExpr) -> Option<SqlExpr> {
    match r.store_type()? {
        // RFC 3339 with unpadded fractional seconds, always UTC, matching
        // how the host renders a round-tripped timestamp.
        StoreType::Timestamp => Some(SqlExpr::func(
            "FORMAT_TIMESTAMP",
            vec!["%FT%H:%M:%E*SZ".into(), r.clone(), "UTC".into()],
            Some(StoreType::String),
        )),
        StoreType::Bool
        | StoreType::Int64
        | StoreType::Float64
        | StoreType::Numeric
        | StoreType::Bytes
        | StoreType::Date
        | StoreType::String => Some(SqlExpr::cast(r.clone(), StoreType::String)),
        StoreType::Json | StoreType::Array(_) => None,
    }
}

fn coalesce(value: &SqlExpr, default: SqlExpr) -> SqlExpr {
    let default_is_set = matches!(&default, SqlExpr::Constant(v, _) if !v.is_null());
    SqlExpr::func_with_nullability(
        "COALESCE",
        vec![value.clone(), default],
        !default_is_set,
        vec![false, false],
        value.store_type(),
    )
}

/// The host's default value for each defaultable store type.
fn zero_for(ty: &StoreType) -> Option<Value> {
    Some(match ty {
        StoreType::Bool => Value::Bool(false),
        StoreType::Int64 => Value::Int64(0),
        StoreType::Float64 => Value::Float64(0.0),
        StoreType::Numeric => Value::Numeric(Decimal::ZERO),
        StoreType::Date => Value::Date(NaiveDate::from_ymd_opt(1, 1, 1)?),
        StoreType::Timestamp => {
            Value::Timestamp(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).single()?)
        }
        _ => return None,
    })
}
