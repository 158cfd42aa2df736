//! Translation from host query expressions to SQL expression trees.
//!
//! The walker recurses bottom-up: children are translated first, then the
//! registered matchers are offered the node. Matchers are side-effect-free
//! and queried in registration order; the first one that returns `Some`
//! wins. A matcher that does not recognize a call declines with `None`,
//! which is not an error -- only when every matcher has declined does the
//! walker report the expression as untranslatable.

use thiserror::Error;
use tracing::trace;

use crate::ast::{self, Member, Method, QueryExpr};
use crate::sql::{BinaryOp, ContainsExpr, SqlExpr, UnaryOp};

pub mod arrays;
pub mod convert;
pub mod datetime;
pub mod json;
pub mod math;
pub mod regexp;
pub mod strings;

/// Date used when a NULL date must collapse to a default.
pub const COALESCE_DATE: &str = "0001-01-01";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expression cannot be translated: {reason}")]
pub struct TranslateError {
    pub reason: String,
}

impl TranslateError {
    pub fn unsupported(reason: impl Into<String>) -> TranslateError {
        TranslateError {
            reason: reason.into(),
        }
    }
}

pub type Result = std::result::Result<SqlExpr, TranslateError>;

/// One pattern matcher for method calls. Receives the already-translated
/// receiver and arguments; the untranslated form is never exposed.
pub trait MethodTranslator {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr>;
}

/// One pattern matcher for member (property) accesses.
pub trait MemberTranslator {
    fn translate(&self, receiver: &SqlExpr, member: &Member) -> Option<SqlExpr>;
}

/// The dialect translator: a fixed battery of matchers plus the generic
/// walker. Callers with their own SQL functions can prepend matchers:
///
/// ```rust
/// use spanner_expr::ast::{Method, QueryExpr};
/// use spanner_expr::sql::{SqlExpr, StoreType};
/// use spanner_expr::translate::{MethodTranslator, Translator};
///
/// struct Soundex;
///
/// impl MethodTranslator for Soundex {
///     fn translate(
///         &self,
///         receiver: Option<&SqlExpr>,
///         method: Method,
///         args: &[SqlExpr],
///     ) -> Option<SqlExpr> {
///         // Steal ToUpper for demonstration purposes; everything else
///         // falls through to the stock battery.
///         match (receiver, method, args) {
///             (Some(r), Method::ToUpper, []) => Some(SqlExpr::func(
///                 "SOUNDEX",
///                 vec![r.clone()],
///                 Some(StoreType::String),
///             )),
///             _ => None,
///         }
///     }
/// }
///
/// let mut translator = Translator::new();
/// translator.methods.insert(0, Box::new(Soundex));
///
/// let expr = QueryExpr::call(
///     QueryExpr::column("Name", StoreType::String, false),
///     Method::ToUpper,
///     vec![],
/// );
/// let sql = translator.translate(&expr).unwrap();
/// assert_eq!(spanner_expr::to_sql::sql_string(&sql), "SOUNDEX(Name)");
/// ```
pub struct Translator {
    pub methods: Vec<Box<dyn MethodTranslator>>,
    pub members: Vec<Box<dyn MemberTranslator>>,
}

impl Default for Translator {
    fn default() -> Self {
        Translator {
            methods: vec![
                Box::new(strings::StringMethods),
                Box::new(regexp::RegexMethods),
                Box::new(math::MathMethods),
                Box::new(datetime::DateTimeMethods),
                Box::new(arrays::ArrayMethods),
                Box::new(convert::ConvertMethods),
                Box::new(json::JsonMethods),
            ],
            members: vec![
                Box::new(datetime::DateTimeMembers),
                Box::new(arrays::ArrayMembers),
                Box::new(json::JsonMembers),
            ],
        }
    }
}

impl Translator {
    pub fn new() -> Translator {
        Translator::default()
    }

    pub fn translate(&self, source: &QueryExpr) -> Result {
        match source {
            QueryExpr::Constant(value, ty) => Ok(SqlExpr::Constant(value.clone(), ty.clone())),
            QueryExpr::Parameter { name, store_type } => Ok(SqlExpr::Parameter {
                name: name.clone(),
                store_type: store_type.clone(),
            }),
            QueryExpr::Column {
                table,
                name,
                store_type,
                nullable,
            } => Ok(SqlExpr::Column {
                table: table.clone(),
                name: name.clone(),
                store_type: store_type.clone(),
                nullable: *nullable,
            }),
            QueryExpr::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = match receiver {
                    Some(r) => Some(self.translate(r)?),
                    None => None,
                };
                let args = args
                    .iter()
                    .map(|a| self.translate(a))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for matcher in &self.methods {
                    if let Some(out) = matcher.translate(receiver.as_ref(), *method, &args) {
                        return Ok(out);
                    }
                }
                trace!(?method, arity = args.len(), "no method translator matched");
                Err(TranslateError::unsupported(format!(
                    "method {method:?} with {} argument(s)",
                    args.len()
                )))
            }
            QueryExpr::MemberAccess { receiver, member } => {
                let receiver = self.translate(receiver)?;
                for matcher in &self.members {
                    if let Some(out) = matcher.translate(&receiver, member) {
                        return Ok(out);
                    }
                }
                trace!(?member, "no member translator matched");
                Err(TranslateError::unsupported(format!(
                    "member {member:?}"
                )))
            }
            QueryExpr::BinaryOperator(l, op, r) => {
                let l = self.translate(l)?;
                let r = self.translate(r)?;
                Ok(SqlExpr::binary(translate_binary_op(*op), l, r))
            }
            QueryExpr::UnaryOperator(op, operand) => {
                let operand = self.translate(operand)?;
                Ok(match op {
                    ast::UnaryOp::Not => negate(operand),
                    ast::UnaryOp::Neg => SqlExpr::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                })
            }
        }
    }
}

fn translate_binary_op(op: ast::BinaryOp) -> BinaryOp {
    match op {
        ast::BinaryOp::Add => BinaryOp::Add,
        ast::BinaryOp::Sub => BinaryOp::Sub,
        ast::BinaryOp::Mul => BinaryOp::Mul,
        ast::BinaryOp::Div => BinaryOp::Div,
        ast::BinaryOp::Eq => BinaryOp::Eq,
        ast::BinaryOp::Ne => BinaryOp::Ne,
        ast::BinaryOp::Lt => BinaryOp::Lt,
        ast::BinaryOp::Le => BinaryOp::Le,
        ast::BinaryOp::Gt => BinaryOp::Gt,
        ast::BinaryOp::Ge => BinaryOp::Ge,
        ast::BinaryOp::And => BinaryOp::And,
        ast::BinaryOp::Or => BinaryOp::Or,
    }
}

/// Logical negation, pushed into nodes that carry their own negated form.
fn negate(operand: SqlExpr) -> SqlExpr {
    match operand {
        SqlExpr::Contains(ContainsExpr {
            item,
            values,
            negated,
        }) => SqlExpr::Contains(ContainsExpr {
            item,
            values,
            negated: !negated,
        }),
        SqlExpr::IsNull { value, negated } => SqlExpr::IsNull {
            value,
            negated: !negated,
        },
        other => SqlExpr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(other),
        },
    }
}

/// A constant INT64 argument, or decline.
pub(crate) fn int_const(expr: &SqlExpr) -> Option<i64> {
    match expr {
        SqlExpr::Constant(crate::value::Value::Int64(i), _) => Some(*i),
        _ => None,
    }
}

/// A constant STRING argument, or decline.
pub(crate) fn str_const(expr: &SqlExpr) -> Option<&str> {
    match expr {
        SqlExpr::Constant(crate::value::Value::String(s), _) => Some(s),
        _ => None,
    }
}
