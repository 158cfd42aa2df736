//! Parameter-based nullability analysis.
//!
//! Runs once per query compilation, after translation, with the current
//! parameter values in hand. The pass rewrites null-sensitive shapes
//! (`x = @p` with a NULL parameter becomes `x IS NULL`, null checks on
//! non-nullable columns collapse to constants) and computes whether the
//! whole expression can evaluate to NULL. The set of parameters observed
//! NULL is reported back to the caller: generated SQL is only reusable
//! for executions with the same null configuration, so that set belongs
//! in the statement-cache key.

use std::collections::{BTreeSet, HashSet};

use crate::sql::{
    BinaryOp, CaseWhen, ContainsExpr, ExtractExpr, FunctionExpr, IntervalExpr, SqlExpr,
};
use crate::value::Value;

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedExpr {
    pub expr: SqlExpr,
    /// Whether the rewritten expression can still evaluate to NULL.
    pub nullable: bool,
    /// Parameters that were NULL at processing time, in stable order.
    pub null_parameters: BTreeSet<String>,
}

/// Process `expr` against the set of parameter names currently bound to
/// NULL.
pub fn process(expr: &SqlExpr, null_params: &HashSet<String>) -> ProcessedExpr {
    let mut pass = Pass {
        null_params,
        seen_null: BTreeSet::new(),
    };
    let (expr, nullable) = pass.visit(expr);
    ProcessedExpr {
        expr,
        nullable,
        null_parameters: pass.seen_null,
    }
}

struct Pass<'a> {
    null_params: &'a HashSet<String>,
    seen_null: BTreeSet<String>,
}

impl Pass<'_> {
    fn visit(&mut self, expr: &SqlExpr) -> (SqlExpr, bool) {
        // Decorator nodes expose the value they wrap; their nullability is
        // the child's, and the wrapper survives the rewrite untouched.
        if expr.value_child().is_some() {
            return self.visit_decorator(expr);
        }
        match expr {
            SqlExpr::Constant(value, _) => (expr.clone(), value.is_null()),
            SqlExpr::Parameter { name, .. } => {
                if self.null_params.contains(name) {
                    self.seen_null.insert(name.clone());
                    // Inline the NULL so the comparison rewrites below can
                    // see it; the recorded name keys the cached statement.
                    (SqlExpr::null(), true)
                } else {
                    (expr.clone(), false)
                }
            }
            SqlExpr::Column { nullable, .. } => (expr.clone(), *nullable),
            SqlExpr::Function(f) => self.visit_function(f),
            SqlExpr::Binary { op, left, right } => self.visit_binary(*op, left, right),
            SqlExpr::Unary { op, operand } => {
                let (operand, nullable) = self.visit(operand);
                (
                    SqlExpr::Unary {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    nullable,
                )
            }
            SqlExpr::Cast { value, to } => {
                let (value, nullable) = self.visit(value);
                (
                    SqlExpr::Cast {
                        value: Box::new(value),
                        to: to.clone(),
                    },
                    nullable,
                )
            }
            SqlExpr::Case { branches, r#else } => {
                let mut nullable = false;
                let branches = branches
                    .iter()
                    .map(|b| {
                        let (condition, _) = self.visit(&b.condition);
                        let (result, n) = self.visit(&b.result);
                        nullable |= n;
                        CaseWhen { condition, result }
                    })
                    .collect();
                let r#else = match r#else {
                    Some(e) => {
                        let (e, n) = self.visit(e);
                        nullable |= n;
                        Some(Box::new(e))
                    }
                    // A missing ELSE yields NULL.
                    None => {
                        nullable = true;
                        None
                    }
                };
                (SqlExpr::Case { branches, r#else }, nullable)
            }
            SqlExpr::IsNull { value, negated } => {
                let (value, nullable) = self.visit(value);
                is_null_of(value, nullable, *negated)
            }
            SqlExpr::Contains(c) => {
                let (item, item_n) = self.visit(&c.item);
                let (values, values_n) = self.visit(&c.values);
                (
                    SqlExpr::Contains(ContainsExpr {
                        item: Box::new(item),
                        values: Box::new(values),
                        negated: c.negated,
                    }),
                    item_n || values_n,
                )
            }
            // Opaque SQL: assume the worst.
            SqlExpr::Fragment(_) => (expr.clone(), true),
            // Already routed to visit_decorator by the value_child gate.
            SqlExpr::Interval(_) | SqlExpr::Extract(_) => self.visit_decorator(expr),
        }
    }

    fn visit_decorator(&mut self, expr: &SqlExpr) -> (SqlExpr, bool) {
        match expr {
            SqlExpr::Interval(i) => {
                let (count, nullable) = self.visit(&i.count);
                (
                    SqlExpr::Interval(IntervalExpr {
                        count: Box::new(count),
                        unit: i.unit,
                    }),
                    nullable,
                )
            }
            SqlExpr::Extract(e) => {
                let (value, nullable) = self.visit(&e.value);
                (
                    SqlExpr::Extract(ExtractExpr {
                        part: e.part,
                        value: Box::new(value),
                        at_time_zone: e.at_time_zone.clone(),
                    }),
                    nullable,
                )
            }
            other => (other.clone(), true),
        }
    }

    fn visit_function(&mut self, f: &FunctionExpr) -> (SqlExpr, bool) {
        let mut nullable = f.nullable;
        let args: Vec<SqlExpr> = f
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let (a, n) = self.visit(a);
                if n && f.args_propagate_null.get(i).copied().unwrap_or(true) {
                    nullable = true;
                }
                a
            })
            .collect();
        (
            SqlExpr::Function(FunctionExpr {
                name: f.name.clone(),
                args,
                nullable: f.nullable,
                args_propagate_null: f.args_propagate_null.clone(),
                return_type: f.return_type.clone(),
            }),
            nullable,
        )
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &SqlExpr, right: &SqlExpr) -> (SqlExpr, bool) {
        let (left, left_n) = self.visit(left);
        let (right, right_n) = self.visit(right);

        if op.is_comparison() {
            let left_null = definitely_null(&left);
            let right_null = definitely_null(&right);
            match (op, left_null, right_null) {
                (BinaryOp::Eq, true, true) => return (true.into(), false),
                (BinaryOp::Ne, true, true) => return (false.into(), false),
                (BinaryOp::Eq, false, true) => return is_null_of(left, left_n, false),
                (BinaryOp::Eq, true, false) => return is_null_of(right, right_n, false),
                (BinaryOp::Ne, false, true) => return is_null_of(left, left_n, true),
                (BinaryOp::Ne, true, false) => return is_null_of(right, right_n, true),
                // Ordering against NULL is never satisfied.
                (_, true, _) | (_, _, true) => return (false.into(), false),
                _ => {}
            }
            return (SqlExpr::binary(op, left, right), left_n || right_n);
        }

        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            match (bool_const(&left), bool_const(&right)) {
                (Some(l), _) if absorbs(op, l) => return (l.into(), false),
                (_, Some(r)) if absorbs(op, r) => return (r.into(), false),
                (Some(_), _) => return (right, right_n),
                (_, Some(_)) => return (left, left_n),
                _ => {}
            }
        }

        (SqlExpr::binary(op, left, right), left_n || right_n)
    }
}

/// Build `value IS [NOT] NULL`, collapsing when the answer is static.
fn is_null_of(value: SqlExpr, value_nullable: bool, negated: bool) -> (SqlExpr, bool) {
    if definitely_null(&value) {
        return ((!negated).into(), false);
    }
    if !value_nullable {
        return (negated.into(), false);
    }
    (
        SqlExpr::IsNull {
            value: Box::new(value),
            negated,
        },
        false,
    )
}

fn definitely_null(expr: &SqlExpr) -> bool {
    matches!(expr, SqlExpr::Constant(Value::Null, _))
}

fn bool_const(expr: &SqlExpr) -> Option<bool> {
    match expr {
        SqlExpr::Constant(Value::Bool(b), _) => Some(*b),
        _ => None,
    }
}

/// TRUE absorbs OR, FALSE absorbs AND.
fn absorbs(op: BinaryOp, value: bool) -> bool {
    match op {
        BinaryOp::And => !value,
        BinaryOp::Or => value,
        _ => false,
    }
}
