//! Reference evaluation of translated trees over an in-memory row.
//!
//! Mirrors what the printed GoogleSQL computes, so semantic laws (index
//! conversions, day-of-week numbering, extraction round-trips) can be
//! checked without a backend. Only the functions the translators emit are
//! implemented; anything else is an error, never a silent guess.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc};
use regex::Regex;
use rust_decimal::Decimal;

use crate::sql::{
    BinaryOp, DatePart, ExtractExpr, FunctionExpr, IntervalUnit, SqlExpr, StoreType, UnaryOp,
};
use crate::value::Value;

/// Resolves both column names and parameter names.
pub type RowGetter<'a> = &'a dyn Fn(&str) -> Option<Value>;

impl SqlExpr {
    pub fn evaluate(&self, get: RowGetter) -> Result<Value, String> {
        match self {
            SqlExpr::Constant(value, _) => Ok(value.clone()),

            SqlExpr::Parameter { name, .. } => {
                get(name).ok_or_else(|| format!("parameter '@{name}' not bound"))
            }

            SqlExpr::Column { name, .. } => {
                get(name).ok_or_else(|| format!("column '{name}' not found in row"))
            }

            SqlExpr::Unary { op, operand } => {
                let value = operand.evaluate(get)?;
                match (op, value) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int64(n)) => Ok(Value::Int64(-n)),
                    (UnaryOp::Neg, Value::Float64(n)) => Ok(Value::Float64(-n)),
                    (op, value) => Err(format!("invalid unary operation {op:?} on {value:?}")),
                }
            }

            SqlExpr::Binary { op, left, right } => {
                let lhs = left.evaluate(get)?;
                let rhs = right.evaluate(get)?;
                eval_binary_op(*op, lhs, rhs)
            }

            SqlExpr::Cast { value, to } => eval_cast(value.evaluate(get)?, to),

            SqlExpr::Case { branches, r#else } => {
                for when in branches {
                    // Only a TRUE condition takes the branch.
                    if when.condition.evaluate(get)? == Value::Bool(true) {
                        return when.result.evaluate(get);
                    }
                }
                match r#else {
                    Some(e) => e.evaluate(get),
                    None => Ok(Value::Null),
                }
            }

            SqlExpr::IsNull { value, negated } => {
                let is_null = value.evaluate(get)?.is_null();
                Ok(Value::Bool(is_null != *negated))
            }

            SqlExpr::Interval(_) => {
                Err("INTERVAL only evaluates as a date arithmetic argument".to_string())
            }

            SqlExpr::Extract(e) => eval_extract(e, get),

            SqlExpr::Contains(c) => {
                let item = c.item.evaluate(get)?;
                let values = c.values.evaluate(get)?;
                eval_contains(item, values, c.negated)
            }

            SqlExpr::Fragment(sql) => Err(format!("cannot evaluate opaque SQL: {sql}")),

            SqlExpr::Function(f) => eval_function(f, get),
        }
    }
}

fn eval_function(f: &FunctionExpr, get: RowGetter) -> Result<Value, String> {
    let name = f.name.as_str();

    // Date arithmetic needs its INTERVAL argument structurally, before
    // generic argument evaluation.
    if name == "DATE_ADD" || name == "TIMESTAMP_ADD" {
        return eval_date_add(f, get);
    }

    let args: Vec<Value> = f
        .args
        .iter()
        .map(|arg| arg.evaluate(get))
        .collect::<Result<_, _>>()?;

    if name == "COALESCE" {
        return Ok(args
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null));
    }

    // Everything else propagates NULL.
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    match (name, &args[..]) {
        ("STRPOS", [Value::String(haystack), Value::String(needle)]) => {
            // 1-based, counted in characters, 0 when absent.
            let position = match haystack.find(needle.as_str()) {
                Some(byte) => haystack[..byte].chars().count() as i64 + 1,
                None => 0,
            };
            Ok(Value::Int64(position))
        }

        ("STARTS_WITH", [Value::String(s), Value::String(prefix)]) => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }

        ("ENDS_WITH", [Value::String(s), Value::String(suffix)]) => {
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }

        ("SUBSTR", [Value::String(s), Value::Int64(start)]) => {
            Ok(Value::String(substr(s, *start, None)))
        }

        ("SUBSTR", [Value::String(s), Value::Int64(start), Value::Int64(length)]) => {
            Ok(Value::String(substr(s, *start, Some(*length))))
        }

        ("REPLACE", [Value::String(s), Value::String(from), Value::String(to)]) => {
            Ok(Value::String(s.replace(from.as_str(), to)))
        }

        ("UPPER", [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
        ("LOWER", [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),

        ("TRIM", [Value::String(s)]) => Ok(Value::String(s.trim().to_string())),
        ("TRIM", [Value::String(s), Value::String(set)]) => {
            Ok(Value::String(s.trim_matches(|c| set.contains(c)).to_string()))
        }
        ("LTRIM", [Value::String(s)]) => Ok(Value::String(s.trim_start().to_string())),
        ("LTRIM", [Value::String(s), Value::String(set)]) => Ok(Value::String(
            s.trim_start_matches(|c| set.contains(c)).to_string(),
        )),
        ("RTRIM", [Value::String(s)]) => Ok(Value::String(s.trim_end().to_string())),
        ("RTRIM", [Value::String(s), Value::String(set)]) => Ok(Value::String(
            s.trim_end_matches(|c| set.contains(c)).to_string(),
        )),

        ("LPAD", [Value::String(s), Value::Int64(length)]) => pad(s, *length, " ", true),
        ("LPAD", [Value::String(s), Value::Int64(length), Value::String(fill)]) => {
            pad(s, *length, fill, true)
        }
        ("RPAD", [Value::String(s), Value::Int64(length)]) => pad(s, *length, " ", false),
        ("RPAD", [Value::String(s), Value::Int64(length), Value::String(fill)]) => {
            pad(s, *length, fill, false)
        }

        ("CONCAT", parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    Value::String(s) => out.push_str(s),
                    other => return Err(format!("CONCAT expects strings, got {other:?}")),
                }
            }
            Ok(Value::String(out))
        }

        ("ARRAY_TO_STRING", [Value::Array(items), Value::String(sep)]) => {
            array_to_string(items, sep, None)
        }
        ("ARRAY_TO_STRING", [Value::Array(items), Value::String(sep), Value::String(null_text)]) => {
            array_to_string(items, sep, Some(null_text))
        }

        ("ARRAY_LENGTH", [Value::Array(items)]) => Ok(Value::Int64(items.len() as i64)),

        ("REGEXP_CONTAINS", [Value::String(s), Value::String(pattern)]) => {
            let re = Regex::new(pattern).map_err(|e| format!("bad pattern: {e}"))?;
            Ok(Value::Bool(re.is_match(s)))
        }

        ("REGEXP_REPLACE", [Value::String(s), Value::String(pattern), Value::String(rewrite)]) => {
            let re = Regex::new(pattern).map_err(|e| format!("bad pattern: {e}"))?;
            Ok(Value::String(re.replace_all(s, rewrite.as_str()).into_owned()))
        }

        ("ABS", [Value::Int64(n)]) => Ok(Value::Int64(n.abs())),
        ("ABS", [Value::Float64(n)]) => Ok(Value::Float64(n.abs())),

        ("CEIL", [Value::Int64(n)]) => Ok(Value::Int64(*n)),
        ("CEIL", [Value::Float64(n)]) => Ok(Value::Float64(n.ceil())),
        ("FLOOR", [Value::Int64(n)]) => Ok(Value::Int64(*n)),
        ("FLOOR", [Value::Float64(n)]) => Ok(Value::Float64(n.floor())),

        ("ROUND", [Value::Int64(n)]) => Ok(Value::Int64(*n)),
        // Ties round away from zero, matching the backend.
        ("ROUND", [Value::Float64(n)]) => Ok(Value::Float64(n.round())),
        ("ROUND", [Value::Float64(n), Value::Int64(digits)]) => {
            let scale = 10f64.powi(*digits as i32);
            Ok(Value::Float64((n * scale).round() / scale))
        }

        ("GREATEST", values) => extremum(values, Ordering::Greater),
        ("LEAST", values) => extremum(values, Ordering::Less),

        // The printed SQL wraps these in a NaN guard, so non-positive
        // inputs yield NaN here as well.
        ("LN", [x]) => {
            let x = number(x)?;
            Ok(Value::Float64(if x <= 0.0 { f64::NAN } else { x.ln() }))
        }
        ("LOG", [x]) => {
            let x = number(x)?;
            Ok(Value::Float64(if x <= 0.0 { f64::NAN } else { x.ln() }))
        }
        ("LOG", [x, base]) => {
            let x = number(x)?;
            let base = number(base)?;
            Ok(Value::Float64(if x <= 0.0 { f64::NAN } else { x.log(base) }))
        }
        ("LOG10", [x]) => {
            let x = number(x)?;
            Ok(Value::Float64(if x <= 0.0 { f64::NAN } else { x.log10() }))
        }

        ("FORMAT_TIMESTAMP", [Value::String(fmt), Value::Timestamp(t), Value::String(zone)]) => {
            if fmt != "%FT%H:%M:%E*SZ" || zone != "UTC" {
                return Err(format!("unsupported FORMAT_TIMESTAMP('{fmt}', …, '{zone}')"));
            }
            Ok(Value::String(format_timestamp_iso(t)))
        }

        ("JSON_VALUE", [Value::Json(doc), Value::String(path)]) => json_value(doc, path),

        (name, args) => Err(format!(
            "cannot evaluate {name} with {} argument(s)",
            args.len()
        )),
    }
}

fn eval_binary_op(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    match op {
        // Logical operators are three-valued and must see nulls.
        BinaryOp::And | BinaryOp::Or => logical(op, left, right),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => arithmetic(op, left, right),
        BinaryOp::Div => {
            // `/` promotes INT64 operands to FLOAT64 in this dialect.
            let denominator = number(&right)?;
            if denominator == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float64(number(&left)? / denominator))
        }
        BinaryOp::Concat => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (a, b) => Err(format!("cannot concatenate {a:?} and {b:?}")),
        },
        BinaryOp::Eq => Ok(Value::Bool(compare(&left, &right)? == Ordering::Equal)),
        BinaryOp::Ne => Ok(Value::Bool(compare(&left, &right)? != Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(&left, &right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(&left, &right)? != Ordering::Less)),
    }
}

fn logical(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    let a = truth(&left)?;
    let b = truth(&right)?;
    let result = if op == BinaryOp::And {
        match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }
    } else {
        match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        }
    };
    Ok(result.map_or(Value::Null, Value::Bool))
}

fn truth(value: &Value) -> Result<Option<bool>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(format!("expected a boolean, got {other:?}")),
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    match (left, right) {
        (Value::Int64(a), Value::Int64(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            result
                .map(Value::Int64)
                .ok_or_else(|| "INT64 overflow".to_string())
        }
        (a, b) => {
            let a = number(&a)?;
            let b = number(&b)?;
            Ok(Value::Float64(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            }))
        }
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, String> {
    match (left, right) {
        (Value::Int64(a), Value::Int64(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
        (Value::Numeric(a), Value::Numeric(b)) => Ok(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a.cmp(b)),
        _ => {
            let a = number(left)?;
            let b = number(right)?;
            a.partial_cmp(&b)
                .ok_or_else(|| "NaN is not comparable".to_string())
        }
    }
}

fn number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Int64(n) => Ok(*n as f64),
        Value::Float64(n) => Ok(*n),
        other => Err(format!("expected a number, got {other:?}")),
    }
}

fn eval_cast(value: Value, to: &StoreType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (value, to) {
        (value, StoreType::String) => cast_to_string(value),
        (Value::Int64(n), StoreType::Int64) => Ok(Value::Int64(n)),
        (Value::Float64(n), StoreType::Int64) => {
            if !n.is_finite() || n < i64::MIN as f64 || n > i64::MAX as f64 {
                return Err(format!("{n} is out of INT64 range"));
            }
            // Halfway cases round away from zero.
            Ok(Value::Int64(n.round() as i64))
        }
        (Value::String(s), StoreType::Int64) => s
            .trim()
            .parse()
            .map(Value::Int64)
            .map_err(|e| format!("cannot parse '{s}' as INT64: {e}")),
        (Value::Int64(n), StoreType::Float64) => Ok(Value::Float64(n as f64)),
        (Value::Float64(n), StoreType::Float64) => Ok(Value::Float64(n)),
        (Value::String(s), StoreType::Float64) => match s.as_str() {
            "NaN" => Ok(Value::Float64(f64::NAN)),
            "inf" => Ok(Value::Float64(f64::INFINITY)),
            "-inf" => Ok(Value::Float64(f64::NEG_INFINITY)),
            _ => s
                .trim()
                .parse()
                .map(Value::Float64)
                .map_err(|e| format!("cannot parse '{s}' as FLOAT64: {e}")),
        },
        (Value::Numeric(d), StoreType::Numeric) => Ok(Value::Numeric(d)),
        (Value::Int64(n), StoreType::Numeric) => Ok(Value::Numeric(Decimal::from(n))),
        (Value::String(s), StoreType::Date) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| format!("cannot parse '{s}' as DATE: {e}")),
        (Value::Date(d), StoreType::Date) => Ok(Value::Date(d)),
        (Value::Timestamp(t), StoreType::Timestamp) => Ok(Value::Timestamp(t)),
        (Value::Date(d), StoreType::Timestamp) => {
            Ok(Value::Timestamp(d.and_time(NaiveTime::MIN).and_utc()))
        }
        (Value::Bool(b), StoreType::Bool) => Ok(Value::Bool(b)),
        (value, to) => Err(format!("cannot cast {value:?} to {}", to.sql_name())),
    }
}

fn cast_to_string(value: Value) -> Result<Value, String> {
    let text = match value {
        Value::Bool(b) => b.to_string(),
        Value::Int64(n) => n.to_string(),
        Value::Float64(n) => {
            if n.is_nan() {
                "NaN".to_string()
            } else if n.is_infinite() {
                if n > 0.0 { "inf" } else { "-inf" }.to_string()
            } else {
                n.to_string()
            }
        }
        Value::Numeric(d) => d.to_string(),
        Value::String(s) => s,
        Value::Uuid(u) => u.to_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Timestamp(t) => format_timestamp_iso(&t),
        other => return Err(format!("cannot cast {other:?} to STRING")),
    };
    Ok(Value::String(text))
}

fn eval_extract(extract: &ExtractExpr, get: RowGetter) -> Result<Value, String> {
    if let Some(zone) = &extract.at_time_zone {
        // Translated trees always pin UTC.
        if zone != "+0" {
            return Err(format!("unsupported time zone '{zone}'"));
        }
    }
    let value = extract.value.evaluate(get)?;
    let (date, time) = match value {
        Value::Null => return Ok(Value::Null),
        Value::Date(d) => (d, None),
        Value::Timestamp(t) => (t.date_naive(), Some(t.time())),
        other => return Err(format!("EXTRACT expects a date or timestamp, got {other:?}")),
    };
    let part = match extract.part {
        DatePart::Year => date.year() as i64,
        DatePart::Month => date.month() as i64,
        DatePart::Day => date.day() as i64,
        DatePart::DayOfYear => date.ordinal() as i64,
        // The dialect numbers Sunday as 1.
        DatePart::DayOfWeek => date.weekday().num_days_from_sunday() as i64 + 1,
        DatePart::Date => return Ok(Value::Date(date)),
        DatePart::Hour | DatePart::Minute | DatePart::Second | DatePart::Millisecond => {
            let Some(time) = time else {
                return Err(format!(
                    "EXTRACT({}) needs a timestamp",
                    extract.part.sql_name()
                ));
            };
            match extract.part {
                DatePart::Hour => time.hour() as i64,
                DatePart::Minute => time.minute() as i64,
                DatePart::Second => time.second() as i64,
                _ => (time.nanosecond() / 1_000_000) as i64,
            }
        }
    };
    Ok(Value::Int64(part))
}

fn eval_contains(item: Value, values: Value, negated: bool) -> Result<Value, String> {
    let items = match values {
        // IN UNNEST(NULL) scans an empty array.
        Value::Null => return Ok(Value::Bool(negated)),
        Value::Array(items) => items,
        other => return Err(format!("IN UNNEST expects an array, got {other:?}")),
    };
    if item.is_null() {
        return Ok(Value::Null);
    }
    let mut saw_null = false;
    for candidate in &items {
        if candidate.is_null() {
            saw_null = true;
        } else if *candidate == item {
            return Ok(Value::Bool(!negated));
        }
    }
    if saw_null {
        Ok(Value::Null)
    } else {
        Ok(Value::Bool(negated))
    }
}

fn eval_date_add(f: &FunctionExpr, get: RowGetter) -> Result<Value, String> {
    let [value_arg, interval_arg] = &f.args[..] else {
        return Err(format!("{} expects a value and an INTERVAL", f.name));
    };
    let SqlExpr::Interval(interval) = interval_arg else {
        return Err(format!("{} expects an INTERVAL argument", f.name));
    };
    let count = match interval.count.evaluate(get)? {
        Value::Null => return Ok(Value::Null),
        Value::Int64(n) => n,
        other => return Err(format!("INTERVAL count must be INT64, got {other:?}")),
    };
    match value_arg.evaluate(get)? {
        Value::Null => Ok(Value::Null),
        Value::Date(date) => date_add(date, count, interval.unit).map(Value::Date),
        Value::Timestamp(ts) => timestamp_add(ts, count, interval.unit).map(Value::Timestamp),
        other => Err(format!(
            "{} expects a date or timestamp, got {other:?}",
            f.name
        )),
    }
}

fn date_add(date: NaiveDate, count: i64, unit: IntervalUnit) -> Result<NaiveDate, String> {
    match unit {
        IntervalUnit::Year => {
            let months = count.checked_mul(12).ok_or("interval out of range")?;
            shift_months(date, months)
        }
        IntervalUnit::Month => shift_months(date, count),
        IntervalUnit::Day => {
            let days = Days::new(count.unsigned_abs());
            let shifted = if count >= 0 {
                date.checked_add_days(days)
            } else {
                date.checked_sub_days(days)
            };
            shifted.ok_or_else(|| "date arithmetic out of range".to_string())
        }
        other => Err(format!(
            "DATE_ADD does not support {} intervals",
            other.sql_name()
        )),
    }
}

fn shift_months(date: NaiveDate, months: i64) -> Result<NaiveDate, String> {
    let magnitude =
        u32::try_from(months.unsigned_abs()).map_err(|_| "interval out of range".to_string())?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(magnitude))
    } else {
        date.checked_sub_months(Months::new(magnitude))
    };
    shifted.ok_or_else(|| "date arithmetic out of range".to_string())
}

fn timestamp_add(
    ts: DateTime<Utc>,
    count: i64,
    unit: IntervalUnit,
) -> Result<DateTime<Utc>, String> {
    let duration = match unit {
        IntervalUnit::Day => Duration::try_days(count),
        IntervalUnit::Hour => Duration::try_hours(count),
        IntervalUnit::Minute => Duration::try_minutes(count),
        IntervalUnit::Second => Duration::try_seconds(count),
        IntervalUnit::Millisecond => Duration::try_milliseconds(count),
        IntervalUnit::Nanosecond => Some(Duration::nanoseconds(count)),
        other => {
            return Err(format!(
                "TIMESTAMP_ADD does not support {} intervals",
                other.sql_name()
            ));
        }
    };
    let Some(duration) = duration else {
        return Err("interval out of range".to_string());
    };
    ts.checked_add_signed(duration)
        .ok_or_else(|| "timestamp arithmetic out of range".to_string())
}

/// 1-based character substring; negative starts count from the end.
fn substr(s: &str, start: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let begin = if start < 0 {
        (len + start).max(0)
    } else {
        // Zero behaves like one.
        (start - 1).max(0)
    };
    let count = length.unwrap_or(len).clamp(0, len) as usize;
    chars.into_iter().skip(begin as usize).take(count).collect()
}

fn pad(s: &str, target: i64, fill: &str, left: bool) -> Result<Value, String> {
    if target < 0 {
        return Err("pad length must not be negative".to_string());
    }
    let target = target as usize;
    let chars: Vec<char> = s.chars().collect();
    if chars.len() >= target {
        // Padding to a shorter length truncates.
        return Ok(Value::String(chars.into_iter().take(target).collect()));
    }
    if fill.is_empty() {
        return Err("pad fill must not be empty".to_string());
    }
    let padding: String = fill.chars().cycle().take(target - chars.len()).collect();
    let body: String = chars.into_iter().collect();
    Ok(Value::String(if left {
        padding + &body
    } else {
        body + &padding
    }))
}

fn array_to_string(items: &[Value], sep: &str, null_text: Option<&str>) -> Result<Value, String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Null => {
                if let Some(text) = null_text {
                    parts.push(text.to_string());
                }
            }
            Value::String(s) => parts.push(s.clone()),
            other => return Err(format!("ARRAY_TO_STRING expects strings, got {other:?}")),
        }
    }
    Ok(Value::String(parts.join(sep)))
}

fn extremum(values: &[Value], keep: Ordering) -> Result<Value, String> {
    let mut best: Option<&Value> = None;
    for value in values {
        let replace = match best {
            None => true,
            Some(current) => compare(value, current)? == keep,
        };
        if replace {
            best = Some(value);
        }
    }
    best.cloned()
        .ok_or_else(|| "GREATEST/LEAST need at least one argument".to_string())
}

/// ISO-8601 UTC with minimal fractional digits, matching `%E*S`.
fn format_timestamp_iso(t: &DateTime<Utc>) -> String {
    let mut out = t.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = t.timestamp_subsec_nanos();
    if nanos != 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('Z');
    out
}

fn json_value(doc: &serde_json::Value, path: &str) -> Result<Value, String> {
    let mut rest = path
        .strip_prefix('$')
        .ok_or_else(|| format!("JSON path must start with '$': {path}"))?;
    let mut current = doc;
    while !rest.is_empty() {
        let (name, remaining) = parse_path_segment(rest)?;
        match current {
            serde_json::Value::Object(map) => match map.get(&name) {
                Some(next) => current = next,
                None => return Ok(Value::Null),
            },
            _ => return Ok(Value::Null),
        }
        rest = remaining;
    }
    Ok(match current {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::String(b.to_string()),
        serde_json::Value::Number(n) => Value::String(n.to_string()),
        serde_json::Value::String(s) => Value::String(s.clone()),
        // JSON_VALUE only returns scalars.
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Null,
    })
}

/// One `.name` or `["name"]` segment; bracket names carry backslash
/// escapes.
fn parse_path_segment(input: &str) -> Result<(String, &str), String> {
    if let Some(rest) = input.strip_prefix('.') {
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        if end == 0 {
            return Err(format!("empty JSON path segment in '{input}'"));
        }
        Ok((rest[..end].to_string(), &rest[end..]))
    } else if let Some(rest) = input.strip_prefix("[\"") {
        let mut name = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => name.push(escaped),
                    None => return Err("unterminated escape in JSON path".to_string()),
                },
                '"' => {
                    let after = rest[i + 1..]
                        .strip_prefix(']')
                        .ok_or_else(|| "JSON path segment must close with ']'".to_string())?;
                    return Ok((name, after));
                }
                other => name.push(other),
            }
        }
        Err("unterminated JSON path segment".to_string())
    } else {
        Err(format!("malformed JSON path segment '{input}'"))
    }
}
