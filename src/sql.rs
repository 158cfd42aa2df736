//! The translated expression tree.
//!
//! Nodes are immutable and compare structurally, so a translated tree can
//! serve as a cache key for generated SQL. Construction happens in
//! [`crate::translate`], rendering in [`crate::to_sql`], nullability
//! analysis in [`crate::nullability`].

use crate::value::Value;

/// Storage-side type of an expression or column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreType {
    Bool,
    Int64,
    Float64,
    Numeric,
    String,
    Bytes,
    Date,
    Timestamp,
    Json,
    Array(Box<StoreType>),
}

impl StoreType {
    /// Name as it appears in a CAST type fragment.
    pub fn sql_name(&self) -> String {
        match self {
            StoreType::Bool => "BOOL".into(),
            StoreType::Int64 => "INT64".into(),
            StoreType::Float64 => "FLOAT64".into(),
            StoreType::Numeric => "NUMERIC".into(),
            StoreType::String => "STRING".into(),
            StoreType::Bytes => "BYTES".into(),
            StoreType::Date => "DATE".into(),
            StoreType::Timestamp => "TIMESTAMP".into(),
            StoreType::Json => "JSON".into(),
            StoreType::Array(inner) => format!("ARRAY<{}>", inner.sql_name()),
        }
    }

    /// Store type a [`Value`] naturally maps to, if any.
    pub fn of(value: &Value) -> Option<StoreType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(StoreType::Bool),
            Value::Int64(_) => Some(StoreType::Int64),
            Value::Float64(_) => Some(StoreType::Float64),
            Value::Numeric(_) => Some(StoreType::Numeric),
            Value::String(_) | Value::Uuid(_) => Some(StoreType::String),
            Value::Bytes(_) => Some(StoreType::Bytes),
            Value::Date(_) => Some(StoreType::Date),
            Value::Timestamp(_) | Value::CommitTimestamp => Some(StoreType::Timestamp),
            Value::Json(_) => Some(StoreType::Json),
            Value::Array(items) => {
                let inner = items.iter().find_map(StoreType::of)?;
                Some(StoreType::Array(Box::new(inner)))
            }
        }
    }
}

/// Date or timestamp part accepted by EXTRACT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
    DayOfYear,
    DayOfWeek,
    Hour,
    Minute,
    Second,
    Millisecond,
    Date,
}

impl DatePart {
    pub fn sql_name(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::DayOfYear => "DAYOFYEAR",
            DatePart::DayOfWeek => "DAYOFWEEK",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
            DatePart::Millisecond => "MILLISECOND",
            DatePart::Date => "DATE",
        }
    }
}

/// Unit of an INTERVAL argument to DATE_ADD / TIMESTAMP_ADD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Nanosecond,
}

impl IntervalUnit {
    pub fn sql_name(self) -> &'static str {
        match self {
            IntervalUnit::Year => "YEAR",
            IntervalUnit::Month => "MONTH",
            IntervalUnit::Day => "DAY",
            IntervalUnit::Hour => "HOUR",
            IntervalUnit::Minute => "MINUTE",
            IntervalUnit::Second => "SECOND",
            IntervalUnit::Millisecond => "MILLISECOND",
            IntervalUnit::Nanosecond => "NANOSECOND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
}

impl BinaryOp {
    pub fn sql_symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Ordinary function call. `nullable` covers the function's own ability to
/// return NULL; `args_propagate_null` marks the arguments whose NULL makes
/// the whole call NULL regardless.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionExpr {
    pub name: String,
    pub args: Vec<SqlExpr>,
    pub nullable: bool,
    pub args_propagate_null: Vec<bool>,
    pub return_type: Option<StoreType>,
}

/// `INTERVAL <count> <unit>`, only valid as an argument of the date
/// arithmetic functions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntervalExpr {
    pub count: Box<SqlExpr>,
    pub unit: IntervalUnit,
}

/// `EXTRACT(<part> FROM <value> [AT TIME ZONE <zone>])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractExpr {
    pub part: DatePart,
    pub value: Box<SqlExpr>,
    /// When set, the value is cast to TIMESTAMP and evaluated at this
    /// zone, so results do not depend on server defaults.
    pub at_time_zone: Option<String>,
}

/// `<item> [NOT] IN UNNEST(<values>)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainsExpr {
    pub item: Box<SqlExpr>,
    pub values: Box<SqlExpr>,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseWhen {
    pub condition: SqlExpr,
    pub result: SqlExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSource {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Projection {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderingTerm {
    pub expr: SqlExpr,
    pub descending: bool,
}

/// Minimal SELECT shape: a translated predicate plus the row-limiting
/// clauses, whose rendering has dialect rules of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Select {
    pub projection: Vec<Projection>,
    pub from: Option<TableSource>,
    pub predicate: Option<SqlExpr>,
    pub order_by: Vec<OrderingTerm>,
    pub limit: Option<SqlExpr>,
    pub offset: Option<SqlExpr>,
}

impl Select {
    pub fn from_table(name: impl Into<String>) -> Self {
        Select {
            projection: Vec::new(),
            from: Some(TableSource {
                name: name.into(),
                alias: None,
            }),
            predicate: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

/// `INSERT INTO table (columns) VALUES (values)`, one row per statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<SqlExpr>,
}

/// `UPDATE table SET ... WHERE predicate`. The dialect rejects updates
/// without a WHERE clause, so the predicate is not optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, SqlExpr)>,
    pub predicate: SqlExpr,
}

/// `DELETE FROM table WHERE predicate`. Same WHERE rule as [`Update`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delete {
    pub table: String,
    pub predicate: SqlExpr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlExpr {
    Constant(Value, Option<StoreType>),
    /// Named query parameter, rendered as `@name`. The bound value lives
    /// with the statement, not in the tree.
    Parameter {
        name: String,
        store_type: Option<StoreType>,
    },
    Column {
        table: Option<String>,
        name: String,
        store_type: StoreType,
        nullable: bool,
    },
    Function(FunctionExpr),
    Binary {
        op: BinaryOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<SqlExpr>,
    },
    Cast {
        value: Box<SqlExpr>,
        to: StoreType,
    },
    Case {
        branches: Vec<CaseWhen>,
        r#else: Option<Box<SqlExpr>>,
    },
    IsNull {
        value: Box<SqlExpr>,
        negated: bool,
    },
    Interval(IntervalExpr),
    Extract(ExtractExpr),
    Contains(ContainsExpr),
    /// Verbatim SQL. Escape hatch for callers; the analyses treat it as
    /// opaque and nullable.
    Fragment(String),
}

impl SqlExpr {
    /// Function call that is NULL exactly when one of its arguments is
    /// NULL, never on its own. The common case.
    pub fn func(
        name: impl Into<String>,
        args: Vec<SqlExpr>,
        return_type: Option<StoreType>,
    ) -> SqlExpr {
        let propagate = vec![true; args.len()];
        SqlExpr::Function(FunctionExpr {
            name: name.into(),
            args,
            nullable: false,
            args_propagate_null: propagate,
            return_type,
        })
    }

    /// Function call with explicit nullability flags.
    pub fn func_with_nullability(
        name: impl Into<String>,
        args: Vec<SqlExpr>,
        nullable: bool,
        args_propagate_null: Vec<bool>,
        return_type: Option<StoreType>,
    ) -> SqlExpr {
        debug_assert_eq!(args.len(), args_propagate_null.len());
        SqlExpr::Function(FunctionExpr {
            name: name.into(),
            args,
            nullable,
            args_propagate_null,
            return_type,
        })
    }

    pub fn binary(op: BinaryOp, left: SqlExpr, right: SqlExpr) -> SqlExpr {
        SqlExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cast(value: SqlExpr, to: StoreType) -> SqlExpr {
        SqlExpr::Cast {
            value: Box::new(value),
            to,
        }
    }

    pub fn null() -> SqlExpr {
        SqlExpr::Constant(Value::Null, None)
    }

    /// Nodes that decorate a single value expression hand that child out
    /// here. Analyses that only care about the value (nullability, most
    /// prominently) recurse into the child instead of special-casing each
    /// node kind.
    pub fn value_child(&self) -> Option<&SqlExpr> {
        match self {
            SqlExpr::Interval(i) => Some(&i.count),
            SqlExpr::Extract(e) => Some(&e.value),
            _ => None,
        }
    }

    /// Best-effort store type of this expression.
    pub fn store_type(&self) -> Option<StoreType> {
        match self {
            SqlExpr::Constant(value, declared) => declared.clone().or_else(|| StoreType::of(value)),
            SqlExpr::Parameter { store_type, .. } => store_type.clone(),
            SqlExpr::Column { store_type, .. } => Some(store_type.clone()),
            SqlExpr::Function(f) => f.return_type.clone(),
            SqlExpr::Binary { op, left, right } => {
                if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
                    Some(StoreType::Bool)
                } else {
                    left.store_type().or_else(|| right.store_type())
                }
            }
            SqlExpr::Unary { op, operand } => match op {
                UnaryOp::Not => Some(StoreType::Bool),
                UnaryOp::Neg => operand.store_type(),
            },
            SqlExpr::Cast { to, .. } => Some(to.clone()),
            SqlExpr::Case { branches, r#else } => branches
                .iter()
                .find_map(|b| b.result.store_type())
                .or_else(|| r#else.as_ref().and_then(|e| e.store_type())),
            SqlExpr::IsNull { .. } => Some(StoreType::Bool),
            SqlExpr::Interval(_) => None,
            SqlExpr::Extract(e) => match e.part {
                DatePart::Date => Some(StoreType::Date),
                _ => Some(StoreType::Int64),
            },
            SqlExpr::Contains(_) => Some(StoreType::Bool),
            SqlExpr::Fragment(_) => None,
        }
    }
}

// These From implementations keep the translator tables readable.
impl From<&str> for SqlExpr {
    fn from(v: &str) -> Self {
        SqlExpr::Constant(Value::String(v.to_owned()), Some(StoreType::String))
    }
}

impl From<String> for SqlExpr {
    fn from(v: String) -> Self {
        SqlExpr::Constant(Value::String(v), Some(StoreType::String))
    }
}

impl From<i64> for SqlExpr {
    fn from(v: i64) -> Self {
        SqlExpr::Constant(Value::Int64(v), Some(StoreType::Int64))
    }
}

impl From<bool> for SqlExpr {
    fn from(v: bool) -> Self {
        SqlExpr::Constant(Value::Bool(v), Some(StoreType::Bool))
    }
}

impl From<Value> for SqlExpr {
    fn from(v: Value) -> Self {
        let ty = StoreType::of(&v);
        SqlExpr::Constant(v, ty)
    }
}
