//! Host-side query expressions, the input of translation.
//!
//! The host ORM hands us a bound expression tree: constants carry their
//! values, columns carry their store types, and method calls are already
//! resolved to the symbolic [`Method`] they invoke. Nothing here is SQL
//! yet; [`crate::translate`] decides what each node becomes.

use crate::sql::StoreType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Methods the host language can call inside a query. Instance methods
/// keep their receiver separate from the arguments; static methods have
/// no receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    // Strings
    Contains,
    StartsWith,
    EndsWith,
    IndexOf,
    Substring,
    Replace,
    ToUpper,
    ToLower,
    Trim,
    TrimStart,
    TrimEnd,
    PadLeft,
    PadRight,
    Concat,
    Join,
    Format,
    // Regular expressions. The instance forms carry the pattern as the
    // receiver; the static forms take it as an argument.
    RegexIsMatch,
    RegexReplace,
    // Math
    Abs,
    Ceiling,
    Floor,
    Log,
    Log10,
    Max,
    Min,
    Round,
    /// Round overload that takes a midpoint-rounding mode as its last
    /// argument.
    RoundWithMode,
    // Date and time arithmetic
    AddYears,
    AddMonths,
    AddDays,
    AddHours,
    AddMinutes,
    AddSeconds,
    AddMilliseconds,
    AddTicks,
    // Nullable scalars
    GetValueOrDefault,
    // Conversions
    ToString,
    // Collections
    CollectionContains,
    // JSON
    GetJsonProperty,
}

/// Property accesses the host language can perform inside a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Year,
    Month,
    Day,
    DayOfYear,
    DayOfWeek,
    Hour,
    Minute,
    Second,
    Millisecond,
    /// Calendar date of a timestamp.
    Date,
    /// Element count of an array or list.
    Count,
    /// Named property of a JSON value, with the store type the host
    /// declares for it (if any).
    Json {
        name: String,
        store_type: Option<StoreType>,
    },
}

/// Host midpoint-rounding modes as they appear in constant arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    ToEven = 0,
    AwayFromZero = 1,
    ToZero = 2,
    ToNegativeInfinity = 3,
    ToPositiveInfinity = 4,
}

impl RoundingMode {
    pub fn from_ordinal(ordinal: i64) -> Option<RoundingMode> {
        match ordinal {
            0 => Some(RoundingMode::ToEven),
            1 => Some(RoundingMode::AwayFromZero),
            2 => Some(RoundingMode::ToZero),
            3 => Some(RoundingMode::ToNegativeInfinity),
            4 => Some(RoundingMode::ToPositiveInfinity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    Constant(Value, Option<StoreType>),
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
    MethodCall {
        receiver: Option<Box<QueryExpr>>,
        method: Method,
        args: Vec<QueryExpr>,
    },
    MemberAccess {
        receiver: Box<QueryExpr>,
        member: Member,
    },
    BinaryOperator(Box<QueryExpr>, BinaryOp, Box<QueryExpr>),
    UnaryOperator(UnaryOp, Box<QueryExpr>),
}

impl QueryExpr {
    pub fn constant(value: impl Into<Value>) -> QueryExpr {
        let value = value.into();
        let ty = StoreType::of(&value);
        QueryExpr::Constant(value, ty)
    }

    pub fn parameter(name: impl Into<String>, store_type: Option<StoreType>) -> QueryExpr {
        QueryExpr::Parameter {
            name: name.into(),
            store_type,
        }
    }

    pub fn column(name: impl Into<String>, store_type: StoreType, nullable: bool) -> QueryExpr {
        QueryExpr::Column {
            table: None,
            name: name.into(),
            store_type,
            nullable,
        }
    }

    pub fn call(receiver: QueryExpr, method: Method, args: Vec<QueryExpr>) -> QueryExpr {
        QueryExpr::MethodCall {
            receiver: Some(Box::new(receiver)),
            method,
            args,
        }
    }

    pub fn call_static(method: Method, args: Vec<QueryExpr>) -> QueryExpr {
        QueryExpr::MethodCall {
            receiver: None,
            method,
            args,
        }
    }

    pub fn member(receiver: QueryExpr, member: Member) -> QueryExpr {
        QueryExpr::MemberAccess {
            receiver: Box::new(receiver),
            member,
        }
    }

    pub fn binary(left: QueryExpr, op: BinaryOp, right: QueryExpr) -> QueryExpr {
        QueryExpr::BinaryOperator(Box::new(left), op, Box::new(right))
    }

    pub fn not(operand: QueryExpr) -> QueryExpr {
        QueryExpr::UnaryOperator(UnaryOp::Not, Box::new(operand))
    }
}
