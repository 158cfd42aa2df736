//! Query translation and change saving for a GoogleSQL backend.
//!
//! One half turns host query expressions ([`ast::QueryExpr`]) into SQL
//! trees ([`sql::SqlExpr`]) and renders them as GoogleSQL; the other
//! half ([`save`]) plans tracked row changes as mutations or DML and
//! applies them with transparent retry of aborted transactions.

pub mod ast;
pub mod evaluate;
pub mod executor;
pub mod nullability;
pub mod options;
pub mod save;
pub mod schema;
pub mod sql;
pub mod to_sql;
pub mod translate;
pub mod value;

#[cfg(test)]
mod tests;
