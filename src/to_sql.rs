//! Rendering of expression trees to GoogleSQL text.
//!
//! The printer is deterministic: the same tree always produces the same
//! string, which is what makes translated trees usable as cache keys.
//! Dialect quirks live here and nowhere else: LIMIT must precede OFFSET
//! and is forced when only OFFSET was requested, timestamp EXTRACT pins a
//! zone, and the logarithm functions are wrapped so non-positive inputs
//! produce NaN instead of a runtime error.

use std::fmt::{Display, Formatter, Result};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::sql::{BinaryOp, Delete, Insert, Select, SqlExpr, UnaryOp, Update};
use crate::value::Value;

/// LIMIT to force when the query has an OFFSET but no user limit.
const MAX_LIMIT: &str = "9223372036854775807";

/// Functions that error on non-positive input where the host returns NaN.
const NAN_GUARDED: [&str; 3] = ["LN", "LOG", "LOG10"];

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Prefix for named parameters.
    pub parameter_prefix: char,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            parameter_prefix: '@',
        }
    }
}

pub struct Printer<T> {
    tree: T,
    config: PrinterConfig,
}

impl<T> Printer<T> {
    pub fn new(tree: T, config: PrinterConfig) -> Self {
        Self { tree, config }
    }
}

pub trait ToSql {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result;
}

impl<T> ToSql for Box<T>
where
    T: ToSql,
{
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        self.as_ref().to_sql(out, conf)
    }
}

impl<T> ToSql for &T
where
    T: ToSql + ?Sized,
{
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        (*self).to_sql(out, conf)
    }
}

impl<T> Display for Printer<T>
where
    T: ToSql,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        self.tree.to_sql(f, &self.config)
    }
}

/// Render with the default configuration.
pub fn sql_string<T: ToSql>(tree: T) -> String {
    Printer::new(tree, PrinterConfig::default()).to_string()
}

impl ToSql for SqlExpr {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        match self {
            SqlExpr::Constant(value, _) => write_value(out, value),
            SqlExpr::Parameter { name, .. } => {
                write!(out, "{}{name}", conf.parameter_prefix)
            }
            SqlExpr::Column { table, name, .. } => match table {
                Some(t) => write!(out, "{t}.{name}"),
                None => write!(out, "{name}"),
            },
            SqlExpr::Function(f) => {
                if NAN_GUARDED.contains(&f.name.as_str()) && !f.args.is_empty() {
                    // The dialect's AND does not short-circuit, so the
                    // guard has to be an IF around the whole call.
                    write!(out, "IF(")?;
                    f.args[0].to_sql(out, conf)?;
                    write!(out, " <= 0, CAST('NaN' AS FLOAT64), ")?;
                    write_call(out, conf, &f.name, &f.args)?;
                    return write!(out, ")");
                }
                write_call(out, conf, &f.name, &f.args)
            }
            SqlExpr::Binary { op, left, right } => {
                write_operand(out, conf, *op, left)?;
                write!(out, " {} ", op.sql_symbol())?;
                write_operand(out, conf, *op, right)
            }
            SqlExpr::Unary { op, operand } => {
                match op {
                    UnaryOp::Not => write!(out, "NOT ")?,
                    UnaryOp::Neg => write!(out, "-")?,
                }
                if is_compound(operand) {
                    write!(out, "(")?;
                    operand.to_sql(out, conf)?;
                    write!(out, ")")
                } else {
                    operand.to_sql(out, conf)
                }
            }
            SqlExpr::Cast { value, to } => {
                write!(out, "CAST(")?;
                value.to_sql(out, conf)?;
                write!(out, " AS {})", to.sql_name())
            }
            SqlExpr::Case { branches, r#else } => {
                write!(out, "CASE")?;
                for when in branches {
                    write!(out, " WHEN ")?;
                    when.condition.to_sql(out, conf)?;
                    write!(out, " THEN ")?;
                    when.result.to_sql(out, conf)?;
                }
                if let Some(e) = r#else {
                    write!(out, " ELSE ")?;
                    e.to_sql(out, conf)?;
                }
                write!(out, " END")
            }
            SqlExpr::IsNull { value, negated } => {
                if is_compound(value) {
                    write!(out, "(")?;
                    value.to_sql(out, conf)?;
                    write!(out, ")")?;
                } else {
                    value.to_sql(out, conf)?;
                }
                if *negated {
                    write!(out, " IS NOT NULL")
                } else {
                    write!(out, " IS NULL")
                }
            }
            SqlExpr::Interval(i) => {
                write!(out, "INTERVAL ")?;
                i.count.to_sql(out, conf)?;
                write!(out, " {}", i.unit.sql_name())
            }
            SqlExpr::Extract(e) => {
                write!(out, "EXTRACT({} FROM ", e.part.sql_name())?;
                match &e.at_time_zone {
                    Some(zone) => {
                        write!(out, "CAST(")?;
                        e.value.to_sql(out, conf)?;
                        write!(out, " AS TIMESTAMP) AT TIME ZONE '{}'", escape_single_quotes(zone))?;
                    }
                    None => e.value.to_sql(out, conf)?,
                }
                write!(out, ")")
            }
            SqlExpr::Contains(c) => {
                if is_compound(&c.item) {
                    write!(out, "(")?;
                    c.item.to_sql(out, conf)?;
                    write!(out, ")")?;
                } else {
                    c.item.to_sql(out, conf)?;
                }
                if c.negated {
                    write!(out, " NOT IN UNNEST(")?;
                } else {
                    write!(out, " IN UNNEST(")?;
                }
                c.values.to_sql(out, conf)?;
                write!(out, ")")
            }
            SqlExpr::Fragment(sql) => out.write_str(sql),
        }
    }
}

impl ToSql for Select {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "SELECT ")?;
        if self.projection.is_empty() {
            write!(out, "*")?;
        } else {
            for (i, p) in self.projection.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                p.expr.to_sql(out, conf)?;
                if let Some(alias) = &p.alias {
                    write!(out, " AS {alias}")?;
                }
            }
        }
        if let Some(from) = &self.from {
            write!(out, " FROM {}", from.name)?;
            if let Some(alias) = &from.alias {
                write!(out, " AS {alias}")?;
            }
        }
        if let Some(predicate) = &self.predicate {
            write!(out, " WHERE ")?;
            predicate.to_sql(out, conf)?;
        }
        if !self.order_by.is_empty() {
            write!(out, " ORDER BY ")?;
            for (i, term) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                term.expr.to_sql(out, conf)?;
                if term.descending {
                    write!(out, " DESC")?;
                }
            }
        }
        // LIMIT must come first, and OFFSET cannot stand alone.
        match (&self.limit, &self.offset) {
            (Some(limit), offset) => {
                write!(out, " LIMIT ")?;
                limit.to_sql(out, conf)?;
                if let Some(offset) = offset {
                    write!(out, " OFFSET ")?;
                    offset.to_sql(out, conf)?;
                }
            }
            (None, Some(offset)) => {
                write!(out, " LIMIT {MAX_LIMIT} OFFSET ")?;
                offset.to_sql(out, conf)?;
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl ToSql for Insert {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "INSERT INTO {} (", self.table)?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{column}")?;
        }
        write!(out, ") VALUES (")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            value.to_sql(out, conf)?;
        }
        write!(out, ")")
    }
}

impl ToSql for Update {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "UPDATE {} SET ", self.table)?;
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{column} = ")?;
            value.to_sql(out, conf)?;
        }
        write!(out, " WHERE ")?;
        self.predicate.to_sql(out, conf)
    }
}

impl ToSql for Delete {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "DELETE FROM {} WHERE ", self.table)?;
        self.predicate.to_sql(out, conf)
    }
}

fn write_call(out: &mut Formatter, conf: &PrinterConfig, name: &str, args: &[SqlExpr]) -> Result {
    write!(out, "{name}(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        arg.to_sql(out, conf)?;
    }
    write!(out, ")")
}

/// Operands wrap in parentheses unless they are atomic, a chain of the
/// same associative operator, or a comparison directly under AND/OR.
fn write_operand(
    out: &mut Formatter,
    conf: &PrinterConfig,
    parent: BinaryOp,
    operand: &SqlExpr,
) -> Result {
    let parens = match operand {
        SqlExpr::Binary { op, .. } => needs_parens(parent, *op),
        SqlExpr::Unary { .. } | SqlExpr::Contains(_) | SqlExpr::Case { .. } => true,
        _ => false,
    };
    if parens {
        write!(out, "(")?;
        operand.to_sql(out, conf)?;
        write!(out, ")")
    } else {
        operand.to_sql(out, conf)
    }
}

fn needs_parens(parent: BinaryOp, child: BinaryOp) -> bool {
    if child == parent {
        return !is_associative(parent);
    }
    // Comparisons bind tighter than the boolean connectives, so key
    // predicates read `Id = @p0 AND Version = @p1`.
    if matches!(parent, BinaryOp::And | BinaryOp::Or) && child.is_comparison() {
        return false;
    }
    true
}

fn is_associative(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Concat
    )
}

fn is_compound(expr: &SqlExpr) -> bool {
    matches!(
        expr,
        SqlExpr::Binary { .. } | SqlExpr::Unary { .. } | SqlExpr::Contains(_) | SqlExpr::Case { .. }
    )
}

fn write_value(out: &mut Formatter, value: &Value) -> Result {
    match value {
        Value::Null => write!(out, "NULL"),
        Value::Bool(v) => write!(out, "{}", if *v { "TRUE" } else { "FALSE" }),
        Value::Int64(v) => write!(out, "{v}"),
        Value::Float64(v) => {
            if v.is_nan() {
                write!(out, "CAST('NaN' AS FLOAT64)")
            } else if v.is_infinite() {
                let s = if *v > 0.0 { "inf" } else { "-inf" };
                write!(out, "CAST('{s}' AS FLOAT64)")
            } else {
                // Debug keeps a decimal point on integral values, so the
                // literal stays FLOAT64 typed.
                write!(out, "{v:?}")
            }
        }
        Value::Numeric(v) => write!(out, "NUMERIC '{v}'"),
        Value::String(v) => write!(out, "'{}'", escape_single_quotes(v)),
        Value::Bytes(v) => write!(out, "FROM_BASE64('{}')", BASE64.encode(v)),
        Value::Uuid(v) => write!(out, "'{v}'"),
        Value::Date(v) => write!(out, "DATE '{}'", v.format("%Y-%m-%d")),
        Value::Timestamp(v) => {
            if v.timestamp_subsec_nanos() == 0 {
                write!(out, "TIMESTAMP '{}'", v.format("%Y-%m-%dT%H:%M:%SZ"))
            } else {
                write!(out, "TIMESTAMP '{}'", v.format("%Y-%m-%dT%H:%M:%S%.fZ"))
            }
        }
        Value::Json(v) => write!(out, "JSON '{}'", escape_single_quotes(&v.to_string())),
        Value::Array(items) => {
            write!(out, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write_value(out, item)?;
            }
            write!(out, "]")
        }
        Value::CommitTimestamp => write!(out, "PENDING_COMMIT_TIMESTAMP()"),
    }
}

fn escape_single_quotes(s: &str) -> String {
    let mut res = String::new();
    res.reserve(s.len());

    let mut is_escaped = false;
    for c in s.chars() {
        is_escaped = c == '\\' && !is_escaped;

        if c == '\'' && !is_escaped {
            res.push('\\');
        }

        res.push(c);
    }
    res
}
