//! The backend seam: everything the save orchestration needs from the
//! database client, and nothing more.
//!
//! The client behind these traits owns sessions, the wire protocol and
//! retaining of result streams; this crate only hands it SQL text with
//! bound parameters (or structured mutations) and consumes rows, counts
//! and typed errors back. The error taxonomy matters: [`BackendError::Aborted`]
//! is the one signal the retry machinery in [`crate::save`] acts on.

use async_trait::async_trait;
use thiserror::Error;

use crate::sql::StoreType;
use crate::value::Value;

/// One bound statement parameter. The declared store type lets the
/// backend pick the wire encoding without sniffing the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub store_type: Option<StoreType>,
}

/// SQL text plus its parameter bindings, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Parameter>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Statement {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Statement {
        let value_type = StoreType::of(&value);
        self.params.push(Parameter {
            name: name.into(),
            value,
            store_type: value_type,
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// A structured row write, buffered by the transaction and applied
/// atomically at commit. Deletes carry the key columns only.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

/// One result row. Values are addressed by column name; the backend
/// preserves the projection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Row {
        debug_assert_eq!(columns.len(), values.len());
        Row { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Row {
        let (columns, values) = iter.into_iter().unzip();
        Row { columns, values }
    }
}

/// Errors the backend reports. `Aborted` is transient and drives the
/// retry state machine; everything else is surfaced as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("transaction aborted by the backend: {0}")]
    Aborted(String),
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("session lost: {0}")]
    Session(String),
    #[error("backend transport: {0}")]
    Io(String),
}

impl BackendError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, BackendError::Aborted(_))
    }
}

/// The database client as the orchestration layer sees it.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    /// Run a read outside any transaction (a single-use read-only snapshot).
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, BackendError>;

    /// Begin a read-write transaction.
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>, BackendError>;
}

/// An open read-write transaction.
///
/// Dropping a transaction that was neither committed nor rolled back
/// must release its backend resources; the retry loop in [`crate::save`]
/// relies on that for cancellation safety.
#[async_trait]
pub trait BackendTransaction: Send {
    /// Execute one DML statement, returning the affected-row count.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, BackendError>;

    /// Run a query inside this transaction. Sees earlier DML from the
    /// same transaction, but never mutations buffered via [`Self::buffer`].
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, BackendError>;

    /// Buffer a mutation for atomic application at commit. Buffering is
    /// local; nothing is sent until [`Self::commit`].
    fn buffer(&mut self, mutation: Mutation);

    async fn commit(self: Box<Self>) -> Result<(), BackendError>;

    async fn rollback(self: Box<Self>) -> Result<(), BackendError>;
}
