//! Save-changes orchestration.
//!
//! One save call is one unit of work. The pending row changes are planned
//! once into buffered mutations or parameterized DML, executed inside a
//! transaction, and the whole prepare/execute/commit unit is retried with
//! backoff when the backend aborts it. Every retry restarts from the
//! original snapshot, since an abort guarantees no partial effect. After
//! an implicit commit, server-generated columns (commit timestamps,
//! computed columns) are read back with a side SELECT and merged into the
//! rows still being tracked.
//!
//! Mutations are cheaper than DML but invisible to reads inside their own
//! transaction, and they cannot carry a WHERE clause. Both limitations
//! shape the plan: saves that must read generated values inside an
//! explicit transaction are forced onto DML, and version-column checks in
//! mutation mode become a preceding SELECT instead of an UPDATE predicate.
//!
//! All retry and error classification lives here; the translation layer
//! and the SQL printer never catch or retry anything.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::executor::{
    BackendError, BackendExecutor, BackendTransaction, Mutation, MutationKind, Parameter, Row,
    Statement,
};
use crate::options::{MutationPolicy, SaveOptions};
use crate::schema::{Catalog, ColumnSchema, TableSchema};
use crate::sql::{BinaryOp, Delete, Insert, Projection, Select, SqlExpr, StoreType, Update};
use crate::to_sql::{ToSql, sql_string};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum SaveError {
    /// The backend kept aborting past the retry budget. Carries the last
    /// abort as the source.
    #[error("transaction aborted and not recovered after {attempts} attempt(s)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },
    /// An expected-version check matched zero rows.
    #[error("optimistic concurrency check failed for table `{table}`")]
    ConcurrencyConflict { table: String },
    /// Replaying an aborted explicit transaction observed different
    /// results than the first run; the data moved underneath the caller.
    #[error("aborted transaction could not be replayed: results diverged")]
    RetryDiverged {
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("invalid change set: {0}")]
    InvalidChangeSet(String),
}

/// Tracking state of one row, before and after a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
    Unchanged,
    Detached,
}

/// One tracked row with its pending change.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub table: String,
    pub state: EntityState,
    /// Current column values, key columns included.
    pub values: HashMap<String, Value>,
    /// Columns with pending writes; only meaningful for `Modified`.
    pub modified: Vec<String>,
}

impl RowChange {
    pub fn added(
        table: impl Into<String>,
        values: impl IntoIterator<Item = (impl Into<String>, Value)>,
    ) -> RowChange {
        RowChange {
            table: table.into(),
            state: EntityState::Added,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            modified: Vec::new(),
        }
    }

    pub fn modified(
        table: impl Into<String>,
        values: impl IntoIterator<Item = (impl Into<String>, Value)>,
        modified: impl IntoIterator<Item = impl Into<String>>,
    ) -> RowChange {
        RowChange {
            table: table.into(),
            state: EntityState::Modified,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            modified: modified.into_iter().map(Into::into).collect(),
        }
    }

    pub fn deleted(
        table: impl Into<String>,
        values: impl IntoIterator<Item = (impl Into<String>, Value)>,
    ) -> RowChange {
        RowChange {
            table: table.into(),
            state: EntityState::Deleted,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            modified: Vec::new(),
        }
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Snapshot of pending changes, in change-tracker dependency order
/// (inserts before dependents, deletes in reverse). The order is the
/// caller's; it is preserved verbatim.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub rows: Vec<RowChange>,
}

impl ChangeSet {
    pub fn new() -> ChangeSet {
        ChangeSet::default()
    }

    pub fn push(&mut self, row: RowChange) {
        self.rows.push(row);
    }

    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|r| {
            matches!(
                r.state,
                EntityState::Added | EntityState::Modified | EntityState::Deleted
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveResult {
    /// Rows written. Buffered mutations count one row each, since their
    /// real counts only exist backend-side after commit.
    pub rows_affected: u64,
    /// Backend transactions begun to land this save; 1 means no retries.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Dml,
    Mutations,
}

enum PlannedWrite {
    Dml {
        table: String,
        statement: Statement,
        /// Zero affected rows means the expected-version predicate
        /// matched nothing.
        versioned: bool,
    },
    Mutation {
        table: String,
        mutation: Mutation,
        /// SELECT that must match a row before the mutation may be
        /// buffered; mutations cannot carry the version predicate.
        version_check: Option<Statement>,
    },
}

struct ReadBack {
    row: usize,
    /// Runs outside the transaction after an implicit commit and
    /// refreshes every server-generated column.
    after_commit: Statement,
    columns: Vec<String>,
    /// Runs inside an explicit transaction: computed columns only, since
    /// a commit timestamp does not exist before commit.
    in_transaction: Option<Statement>,
    in_transaction_columns: Vec<String>,
}

/// What one save call sends. Built once from the snapshot and replayed
/// verbatim on every retry.
struct WritePlan {
    mode: WriteMode,
    writes: Vec<PlannedWrite>,
    read_back: Vec<ReadBack>,
}

/// Owns mode selection, transaction boundaries, retries and read-back
/// for save calls. Stateless between calls and cheap to clone; the
/// executor is the only shared resource.
#[derive(Clone)]
pub struct Orchestrator {
    executor: Arc<dyn BackendExecutor>,
    catalog: Catalog,
    options: SaveOptions,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn BackendExecutor>, catalog: Catalog, options: SaveOptions) -> Self {
        Orchestrator {
            executor,
            catalog,
            options,
        }
    }

    /// Save under an implicit transaction this call owns. The whole unit
    /// restarts from the original snapshot whenever the backend aborts,
    /// up to [`SaveOptions::max_retries`] retries; exhaustion surfaces
    /// the last abort inside [`SaveError::RetriesExhausted`].
    pub async fn save_changes(&self, changes: &mut ChangeSet) -> Result<SaveResult, SaveError> {
        let plan = self.plan(changes, false)?;
        if plan.writes.is_empty() {
            return Ok(SaveResult {
                rows_affected: 0,
                attempts: 0,
            });
        }
        debug!(mode = ?plan.mode, writes = plan.writes.len(), "saving changes");
        let mut attempts = 0;
        let rows_affected = loop {
            attempts += 1;
            match self.attempt(&plan).await {
                Ok(count) => break count,
                Err(SaveError::Backend(err)) if err.is_aborted() => {
                    if attempts > self.options.max_retries {
                        warn!(attempts, error = %err, "retry budget exhausted");
                        return Err(SaveError::RetriesExhausted {
                            attempts,
                            source: err,
                        });
                    }
                    let delay = self.options.retry_delay(attempts);
                    debug!(
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transaction aborted, restarting save"
                    );
                    sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        };
        self.refresh_after_commit(&plan, changes).await?;
        accept(changes);
        Ok(SaveResult {
            rows_affected,
            attempts,
        })
    }

    /// Begin a caller-managed transaction.
    pub async fn begin(&self) -> Result<Transaction, SaveError> {
        let backend = self.executor.begin().await?;
        Ok(Transaction {
            executor: Arc::clone(&self.executor),
            options: self.options.clone(),
            backend: Some(backend),
            log: Vec::new(),
            internal_retries: true,
            attempts: 1,
        })
    }

    /// Save into a caller-managed transaction. Nothing commits here; the
    /// caller decides. Computed columns are refreshed through the open
    /// transaction, while commit-timestamp read-back is skipped entirely
    /// because the value does not exist before commit.
    pub async fn save_changes_in(
        &self,
        tx: &mut Transaction,
        changes: &mut ChangeSet,
    ) -> Result<SaveResult, SaveError> {
        let plan = self.plan(changes, true)?;
        debug!(
            mode = ?plan.mode,
            writes = plan.writes.len(),
            "saving changes in caller transaction"
        );
        let mut rows_affected = 0;
        for write in &plan.writes {
            match write {
                PlannedWrite::Dml {
                    table,
                    statement,
                    versioned,
                } => {
                    let count = tx.execute(statement).await?;
                    if *versioned && count == 0 {
                        return Err(SaveError::ConcurrencyConflict {
                            table: table.clone(),
                        });
                    }
                    rows_affected += count;
                }
                PlannedWrite::Mutation {
                    table,
                    mutation,
                    version_check,
                } => {
                    if let Some(check) = version_check {
                        if tx.query(check).await?.is_empty() {
                            return Err(SaveError::ConcurrencyConflict {
                                table: table.clone(),
                            });
                        }
                    }
                    tx.buffer(mutation.clone())?;
                    rows_affected += 1;
                }
            }
        }
        for read_back in &plan.read_back {
            let Some(statement) = &read_back.in_transaction else {
                continue;
            };
            let row = &mut changes.rows[read_back.row];
            if row.state == EntityState::Detached {
                continue;
            }
            let rows = tx.query(statement).await?;
            let Some(fetched) = rows.first() else {
                return Err(SaveError::Backend(BackendError::NotFound(format!(
                    "row written to `{}` vanished before read-back",
                    row.table
                ))));
            };
            merge(row, fetched, &read_back.in_transaction_columns);
        }
        accept(changes);
        Ok(SaveResult {
            rows_affected,
            attempts: tx.attempts,
        })
    }

    async fn attempt(&self, plan: &WritePlan) -> Result<u64, SaveError> {
        let mut tx = self.executor.begin().await?;
        match self.run_writes(tx.as_mut(), plan).await {
            Ok(count) => {
                tx.commit().await?;
                Ok(count)
            }
            Err(err) => {
                // Return the session now instead of waiting for the drop.
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed save attempt failed");
                }
                Err(err)
            }
        }
    }

    async fn run_writes(
        &self,
        tx: &mut dyn BackendTransaction,
        plan: &WritePlan,
    ) -> Result<u64, SaveError> {
        let mut affected = 0;
        for write in &plan.writes {
            match write {
                PlannedWrite::Dml {
                    table,
                    statement,
                    versioned,
                } => {
                    let count = tx.execute(statement).await?;
                    if *versioned && count == 0 {
                        return Err(SaveError::ConcurrencyConflict {
                            table: table.clone(),
                        });
                    }
                    affected += count;
                }
                PlannedWrite::Mutation {
                    table,
                    mutation,
                    version_check,
                } => {
                    if let Some(check) = version_check {
                        if tx.query(check).await?.is_empty() {
                            return Err(SaveError::ConcurrencyConflict {
                                table: table.clone(),
                            });
                        }
                    }
                    tx.buffer(mutation.clone());
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    /// Deferred read-back: one SELECT per refreshed row, outside the
    /// just-committed transaction, merged only into rows still tracked.
    async fn refresh_after_commit(
        &self,
        plan: &WritePlan,
        changes: &mut ChangeSet,
    ) -> Result<(), SaveError> {
        for read_back in &plan.read_back {
            let row = &mut changes.rows[read_back.row];
            if row.state == EntityState::Detached {
                continue;
            }
            let rows = self.executor.query(&read_back.after_commit).await?;
            let Some(fetched) = rows.first() else {
                return Err(SaveError::Backend(BackendError::NotFound(format!(
                    "row written to `{}` vanished before read-back",
                    row.table
                ))));
            };
            merge(row, fetched, &read_back.columns);
        }
        Ok(())
    }

    fn plan(&self, changes: &ChangeSet, explicit: bool) -> Result<WritePlan, SaveError> {
        let mut needs_read_back = false;
        for row in &changes.rows {
            if matches!(row.state, EntityState::Added | EntityState::Modified)
                && self.table(&row.table)?.read_back_columns().next().is_some()
            {
                needs_read_back = true;
            }
        }
        let mode = match self.options.mutation_policy {
            MutationPolicy::Never => WriteMode::Dml,
            MutationPolicy::ImplicitTransactionsOnly => {
                if explicit {
                    WriteMode::Dml
                } else {
                    WriteMode::Mutations
                }
            }
            MutationPolicy::Always => {
                // Mutations are unreadable before commit, so a save that
                // must read generated values inside an explicit
                // transaction has to go through DML.
                if explicit && needs_read_back {
                    WriteMode::Dml
                } else {
                    WriteMode::Mutations
                }
            }
        };

        let mut writes = Vec::new();
        let mut read_back = Vec::new();
        for (index, row) in changes.rows.iter().enumerate() {
            if matches!(row.state, EntityState::Unchanged | EntityState::Detached) {
                continue;
            }
            let table = self.table(&row.table)?;
            let write = match (row.state, mode) {
                (EntityState::Added, WriteMode::Dml) => plan_insert_dml(table, row)?,
                (EntityState::Added, WriteMode::Mutations) => plan_insert_mutation(table, row)?,
                (EntityState::Modified, WriteMode::Dml) => plan_update_dml(table, row)?,
                (EntityState::Modified, WriteMode::Mutations) => plan_update_mutation(table, row)?,
                (EntityState::Deleted, WriteMode::Dml) => plan_delete_dml(table, row)?,
                (EntityState::Deleted, WriteMode::Mutations) => plan_delete_mutation(table, row)?,
                _ => continue,
            };
            writes.push(write);
            if matches!(row.state, EntityState::Added | EntityState::Modified)
                && table.read_back_columns().next().is_some()
            {
                read_back.push(plan_read_back(index, table, row)?);
            }
        }
        Ok(WritePlan {
            mode,
            writes,
            read_back,
        })
    }

    fn table(&self, name: &str) -> Result<&TableSchema, SaveError> {
        self.catalog
            .table(name)
            .ok_or_else(|| SaveError::InvalidChangeSet(format!("unknown table `{name}`")))
    }
}

/// A caller-managed transaction. Saves inside it never commit; the
/// caller decides when to commit or roll back. When the backend aborts,
/// the recorded work is replayed into a fresh backend transaction and
/// checked against the results the caller already observed, unless the
/// caller opted out with [`Transaction::disable_internal_retries`].
///
/// Dropping an unfinished `Transaction` drops the backend handle, which
/// releases the transaction's resources per the [`BackendTransaction`]
/// contract. That drop is the release path for cancellation.
pub struct Transaction {
    executor: Arc<dyn BackendExecutor>,
    options: SaveOptions,
    backend: Option<Box<dyn BackendTransaction>>,
    /// Everything applied so far, with the results the caller observed.
    log: Vec<ReplayOp>,
    internal_retries: bool,
    attempts: u32,
}

#[derive(Debug, Clone)]
enum ReplayOp {
    /// DML plus the affected count seen on first execution.
    Execute(Statement, u64),
    /// In-transaction query plus the row count seen on first run.
    Query(Statement, usize),
    Buffer(Mutation),
}

enum ReplayOutcome {
    Aborted(BackendError),
    Diverged,
    Backend(BackendError),
}

impl Transaction {
    /// Stop replaying aborts inside this transaction; the next abort
    /// surfaces immediately and recovery becomes the caller's problem.
    pub fn disable_internal_retries(&mut self) {
        self.internal_retries = false;
    }

    /// Backend transactions begun for this logical transaction.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Commit. A commit-time abort is recovered like any other: replay
    /// into a fresh transaction, then commit that one.
    pub async fn commit(mut self) -> Result<(), SaveError> {
        loop {
            match self.backend.take() {
                None => {
                    return Err(SaveError::Backend(BackendError::Session(
                        "transaction already completed".into(),
                    )));
                }
                Some(backend) => match backend.commit().await {
                    Ok(()) => return Ok(()),
                    Err(err) if err.is_aborted() => self.recover(err).await?,
                    Err(err) => return Err(err.into()),
                },
            }
        }
    }

    pub async fn rollback(mut self) -> Result<(), SaveError> {
        match self.backend.take() {
            Some(backend) => Ok(backend.rollback().await?),
            None => Ok(()),
        }
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, SaveError> {
        loop {
            let backend = self.backend_mut()?;
            match backend.execute(statement).await {
                Ok(count) => {
                    self.log.push(ReplayOp::Execute(statement.clone(), count));
                    return Ok(count);
                }
                Err(err) if err.is_aborted() => self.recover(err).await?,
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, SaveError> {
        loop {
            let backend = self.backend_mut()?;
            match backend.query(statement).await {
                Ok(rows) => {
                    self.log.push(ReplayOp::Query(statement.clone(), rows.len()));
                    return Ok(rows);
                }
                Err(err) if err.is_aborted() => self.recover(err).await?,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn buffer(&mut self, mutation: Mutation) -> Result<(), SaveError> {
        self.backend_mut()?.buffer(mutation.clone());
        self.log.push(ReplayOp::Buffer(mutation));
        Ok(())
    }

    fn backend_mut(&mut self) -> Result<&mut dyn BackendTransaction, SaveError> {
        match self.backend.as_mut() {
            Some(backend) => Ok(backend.as_mut()),
            None => Err(SaveError::Backend(BackendError::Session(
                "transaction already completed".into(),
            ))),
        }
    }

    /// Replace an aborted backend transaction with a fresh one and replay
    /// the recorded work into it.
    async fn recover(&mut self, cause: BackendError) -> Result<(), SaveError> {
        if !self.internal_retries {
            return Err(SaveError::Backend(cause));
        }
        let mut cause = cause;
        loop {
            if self.attempts > self.options.max_retries {
                warn!(attempts = self.attempts, error = %cause, "replay budget exhausted");
                return Err(SaveError::RetriesExhausted {
                    attempts: self.attempts,
                    source: cause,
                });
            }
            let delay = self.options.retry_delay(self.attempts);
            debug!(
                attempt = self.attempts + 1,
                delay_ms = delay.as_millis() as u64,
                "transaction aborted, replaying into a fresh one"
            );
            sleep(delay).await;
            self.attempts += 1;
            if let Some(stale) = self.backend.take() {
                if let Err(err) = stale.rollback().await {
                    debug!(error = %err, "rollback of aborted transaction failed");
                }
            }
            let mut fresh = self.executor.begin().await?;
            match replay(fresh.as_mut(), &self.log).await {
                Ok(()) => {
                    self.backend = Some(fresh);
                    return Ok(());
                }
                Err(ReplayOutcome::Aborted(err)) => {
                    self.backend = Some(fresh);
                    cause = err;
                }
                Err(ReplayOutcome::Diverged) => {
                    if let Err(err) = fresh.rollback().await {
                        debug!(error = %err, "rollback of diverged replay failed");
                    }
                    return Err(SaveError::RetryDiverged { source: cause });
                }
                Err(ReplayOutcome::Backend(err)) => return Err(SaveError::Backend(err)),
            }
        }
    }
}

async fn replay(tx: &mut dyn BackendTransaction, log: &[ReplayOp]) -> Result<(), ReplayOutcome> {
    for op in log {
        match op {
            ReplayOp::Execute(statement, expected) => {
                let count = tx.execute(statement).await.map_err(classify)?;
                if count != *expected {
                    return Err(ReplayOutcome::Diverged);
                }
            }
            ReplayOp::Query(statement, expected) => {
                let rows = tx.query(statement).await.map_err(classify)?;
                if rows.len() != *expected {
                    return Err(ReplayOutcome::Diverged);
                }
            }
            ReplayOp::Buffer(mutation) => tx.buffer(mutation.clone()),
        }
    }
    Ok(())
}

fn classify(err: BackendError) -> ReplayOutcome {
    if err.is_aborted() {
        ReplayOutcome::Aborted(err)
    } else {
        ReplayOutcome::Backend(err)
    }
}

fn merge(row: &mut RowChange, fetched: &Row, columns: &[String]) {
    for column in columns {
        if let Some(value) = fetched.get(column) {
            row.values.insert(column.clone(), value.clone());
        }
    }
}

fn accept(changes: &mut ChangeSet) {
    for row in &mut changes.rows {
        row.state = match row.state {
            EntityState::Added | EntityState::Modified | EntityState::Unchanged => {
                EntityState::Unchanged
            }
            EntityState::Deleted | EntityState::Detached => EntityState::Detached,
        };
    }
}

#[derive(Default)]
struct StatementBuilder {
    params: Vec<Parameter>,
}

impl StatementBuilder {
    fn bind(&mut self, value: Value, store_type: &StoreType) -> SqlExpr {
        let name = format!("p{}", self.params.len());
        self.params.push(Parameter {
            name: name.clone(),
            value,
            store_type: Some(store_type.clone()),
        });
        SqlExpr::Parameter {
            name,
            store_type: Some(store_type.clone()),
        }
    }

    fn finish<T: ToSql>(self, tree: &T) -> Statement {
        Statement {
            sql: sql_string(tree),
            params: self.params,
        }
    }
}

fn column_expr(column: &ColumnSchema) -> SqlExpr {
    SqlExpr::Column {
        table: None,
        name: column.name.clone(),
        store_type: column.store_type.clone(),
        nullable: column.nullable,
    }
}

fn key_predicate(
    table: &TableSchema,
    row: &RowChange,
    builder: &mut StatementBuilder,
) -> Result<SqlExpr, SaveError> {
    let mut predicate: Option<SqlExpr> = None;
    for key in table.key_columns() {
        let value = row.values.get(&key.name).cloned().ok_or_else(|| {
            SaveError::InvalidChangeSet(format!(
                "row for `{}` is missing key column `{}`",
                table.name, key.name
            ))
        })?;
        let clause = SqlExpr::binary(
            BinaryOp::Eq,
            column_expr(key),
            builder.bind(value, &key.store_type),
        );
        predicate = Some(match predicate {
            Some(existing) => SqlExpr::binary(BinaryOp::And, existing, clause),
            None => clause,
        });
    }
    predicate.ok_or_else(|| {
        SaveError::InvalidChangeSet(format!("table `{}` declares no primary key", table.name))
    })
}

fn expected_version(
    table: &TableSchema,
    column: &ColumnSchema,
    row: &RowChange,
) -> Result<i64, SaveError> {
    let value = row.values.get(&column.name).ok_or_else(|| {
        SaveError::InvalidChangeSet(format!(
            "row for `{}` is missing its version column `{}`",
            table.name, column.name
        ))
    })?;
    value.to_i64().map_err(|_| {
        SaveError::InvalidChangeSet(format!(
            "version column `{}` of `{}` must hold an INT64",
            column.name, table.name
        ))
    })
}

fn plan_insert_dml(table: &TableSchema, row: &RowChange) -> Result<PlannedWrite, SaveError> {
    let mut builder = StatementBuilder::default();
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in &table.columns {
        if column.computed {
            continue;
        }
        if column.commit_timestamp {
            columns.push(column.name.clone());
            values.push(SqlExpr::from(Value::CommitTimestamp));
        } else if let Some(value) = row.values.get(&column.name) {
            columns.push(column.name.clone());
            values.push(builder.bind(value.clone(), &column.store_type));
        }
    }
    if columns.is_empty() {
        return Err(SaveError::InvalidChangeSet(format!(
            "insert into `{}` writes no columns",
            table.name
        )));
    }
    let insert = Insert {
        table: table.name.clone(),
        columns,
        values,
    };
    Ok(PlannedWrite::Dml {
        table: table.name.clone(),
        statement: builder.finish(&insert),
        versioned: false,
    })
}

fn plan_update_dml(table: &TableSchema, row: &RowChange) -> Result<PlannedWrite, SaveError> {
    let mut builder = StatementBuilder::default();
    let version = table.version_column();
    let mut assignments = Vec::new();
    for column in &table.columns {
        if column.computed || column.primary_key {
            continue;
        }
        if column.commit_timestamp {
            assignments.push((column.name.clone(), SqlExpr::from(Value::CommitTimestamp)));
        } else if column.version {
            let expected = expected_version(table, column, row)?;
            assignments.push((
                column.name.clone(),
                builder.bind(Value::Int64(expected + 1), &column.store_type),
            ));
        } else if row.modified.iter().any(|m| m == &column.name) {
            let value = row.values.get(&column.name).cloned().ok_or_else(|| {
                SaveError::InvalidChangeSet(format!(
                    "modified column `{}` of `{}` has no value",
                    column.name, table.name
                ))
            })?;
            assignments.push((column.name.clone(), builder.bind(value, &column.store_type)));
        }
    }
    if assignments.is_empty() {
        return Err(SaveError::InvalidChangeSet(format!(
            "update of `{}` writes no columns",
            table.name
        )));
    }
    let mut predicate = key_predicate(table, row, &mut builder)?;
    if let Some(column) = version {
        let expected = expected_version(table, column, row)?;
        predicate = SqlExpr::binary(
            BinaryOp::And,
            predicate,
            SqlExpr::binary(
                BinaryOp::Eq,
                column_expr(column),
                builder.bind(Value::Int64(expected), &column.store_type),
            ),
        );
    }
    let update = Update {
        table: table.name.clone(),
        assignments,
        predicate,
    };
    Ok(PlannedWrite::Dml {
        table: table.name.clone(),
        statement: builder.finish(&update),
        versioned: version.is_some(),
    })
}

fn plan_delete_dml(table: &TableSchema, row: &RowChange) -> Result<PlannedWrite, SaveError> {
    let mut builder = StatementBuilder::default();
    let version = table.version_column();
    let mut predicate = key_predicate(table, row, &mut builder)?;
    if let Some(column) = version {
        let expected = expected_version(table, column, row)?;
        predicate = SqlExpr::binary(
            BinaryOp::And,
            predicate,
            SqlExpr::binary(
                BinaryOp::Eq,
                column_expr(column),
                builder.bind(Value::Int64(expected), &column.store_type),
            ),
        );
    }
    let delete = Delete {
        table: table.name.clone(),
        predicate,
    };
    Ok(PlannedWrite::Dml {
        table: table.name.clone(),
        statement: builder.finish(&delete),
        versioned: version.is_some(),
    })
}

fn plan_insert_mutation(table: &TableSchema, row: &RowChange) -> Result<PlannedWrite, SaveError> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in &table.columns {
        if column.computed {
            continue;
        }
        if column.commit_timestamp {
            columns.push(column.name.clone());
            values.push(Value::CommitTimestamp);
        } else if let Some(value) = row.values.get(&column.name) {
            columns.push(column.name.clone());
            values.push(value.clone());
        }
    }
    if columns.is_empty() {
        return Err(SaveError::InvalidChangeSet(format!(
            "insert into `{}` writes no columns",
            table.name
        )));
    }
    Ok(PlannedWrite::Mutation {
        table: table.name.clone(),
        mutation: Mutation {
            kind: MutationKind::Insert,
            table: table.name.clone(),
            columns,
            values,
        },
        version_check: None,
    })
}

fn plan_update_mutation(table: &TableSchema, row: &RowChange) -> Result<PlannedWrite, SaveError> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in &table.columns {
        if !column.primary_key {
            continue;
        }
        let value = row.values.get(&column.name).cloned().ok_or_else(|| {
            SaveError::InvalidChangeSet(format!(
                "row for `{}` is missing key column `{}`",
                table.name, column.name
            ))
        })?;
        columns.push(column.name.clone());
        values.push(value);
    }
    for column in &table.columns {
        if column.computed || column.primary_key {
            continue;
        }
        if column.commit_timestamp {
            columns.push(column.name.clone());
            values.push(Value::CommitTimestamp);
        } else if column.version {
            let expected = expected_version(table, column, row)?;
            columns.push(column.name.clone());
            values.push(Value::Int64(expected + 1));
        } else if row.modified.iter().any(|m| m == &column.name) {
            let value = row.values.get(&column.name).cloned().ok_or_else(|| {
                SaveError::InvalidChangeSet(format!(
                    "modified column `{}` of `{}` has no value",
                    column.name, table.name
                ))
            })?;
            columns.push(column.name.clone());
            values.push(value);
        }
    }
    Ok(PlannedWrite::Mutation {
        table: table.name.clone(),
        mutation: Mutation {
            kind: MutationKind::Update,
            table: table.name.clone(),
            columns,
            values,
        },
        version_check: version_check(table, row)?,
    })
}

fn plan_delete_mutation(table: &TableSchema, row: &RowChange) -> Result<PlannedWrite, SaveError> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for column in &table.columns {
        if !column.primary_key {
            continue;
        }
        let value = row.values.get(&column.name).cloned().ok_or_else(|| {
            SaveError::InvalidChangeSet(format!(
                "row for `{}` is missing key column `{}`",
                table.name, column.name
            ))
        })?;
        columns.push(column.name.clone());
        values.push(value);
    }
    if columns.is_empty() {
        return Err(SaveError::InvalidChangeSet(format!(
            "table `{}` declares no primary key",
            table.name
        )));
    }
    Ok(PlannedWrite::Mutation {
        table: table.name.clone(),
        mutation: Mutation {
            kind: MutationKind::Delete,
            table: table.name.clone(),
            columns,
            values,
        },
        version_check: version_check(table, row)?,
    })
}

/// Expected-version existence check preceding a mutation, since mutation
/// records have no WHERE clause to carry the predicate.
fn version_check(table: &TableSchema, row: &RowChange) -> Result<Option<Statement>, SaveError> {
    let Some(column) = table.version_column() else {
        return Ok(None);
    };
    let mut builder = StatementBuilder::default();
    let mut select = Select::from_table(table.name.as_str());
    select.projection.push(Projection {
        expr: column_expr(column),
        alias: None,
    });
    let mut predicate = key_predicate(table, row, &mut builder)?;
    let expected = expected_version(table, column, row)?;
    predicate = SqlExpr::binary(
        BinaryOp::And,
        predicate,
        SqlExpr::binary(
            BinaryOp::Eq,
            column_expr(column),
            builder.bind(Value::Int64(expected), &column.store_type),
        ),
    );
    select.predicate = Some(predicate);
    Ok(Some(builder.finish(&select)))
}

fn plan_read_back(index: usize, table: &TableSchema, row: &RowChange) -> Result<ReadBack, SaveError> {
    let columns: Vec<String> = table.read_back_columns().map(|c| c.name.clone()).collect();
    let in_transaction_columns: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.computed)
        .map(|c| c.name.clone())
        .collect();
    let after_commit = read_back_select(table, row, |c| c.commit_timestamp || c.computed)?;
    let in_transaction = if in_transaction_columns.is_empty() {
        None
    } else {
        Some(read_back_select(table, row, |c| c.computed)?)
    };
    Ok(ReadBack {
        row: index,
        after_commit,
        columns,
        in_transaction,
        in_transaction_columns,
    })
}

fn read_back_select(
    table: &TableSchema,
    row: &RowChange,
    pick: impl Fn(&ColumnSchema) -> bool,
) -> Result<Statement, SaveError> {
    let mut builder = StatementBuilder::default();
    let mut select = Select::from_table(table.name.as_str());
    for column in table.columns.iter().filter(|c| pick(c)) {
        select.projection.push(Projection {
            expr: column_expr(column),
            alias: None,
        });
    }
    select.predicate = Some(key_predicate(table, row, &mut builder)?);
    Ok(builder.finish(&select))
}
