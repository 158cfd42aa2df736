//! Shared test support: a scripted in-memory backend implementing the
//! executor traits, plus the schema fixtures the save tests run against.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use crate::ast::{self, Member, Method, QueryExpr};
use crate::executor::{
    BackendError, BackendExecutor, BackendTransaction, Mutation, Row, Statement,
};
use crate::options::{MutationPolicy, SaveOptions};
use crate::save::{ChangeSet, EntityState, Orchestrator, RowChange, SaveError};
use crate::schema::{Catalog, ColumnSchema, TableSchema};
use crate::sql::StoreType;
use crate::to_sql::sql_string;
use crate::translate::Translator;
use crate::value::Value;

/// Everything observable the scripted backend did, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin,
    Execute(String),
    Query(String),
    Buffer(Mutation),
    Commit,
    CommitAborted,
    Rollback,
    /// A transaction went away without commit or rollback.
    Drop,
}

#[derive(Default)]
struct ScriptedState {
    /// Commits left to fail with `Aborted`.
    abort_commits: u32,
    /// DML executions left to fail with `Aborted`.
    abort_executes: u32,
    /// When set, every DML execution parks forever after recording its
    /// event. Lets tests cancel a save mid-flight.
    stall_executes: bool,
    /// Affected-row counts handed out by DML, front first; 1 when empty.
    affected: VecDeque<u64>,
    /// Result sets handed out by queries, front first; no rows when empty.
    results: VecDeque<Vec<Row>>,
    events: Vec<Event>,
    open: u32,
}

/// Backend double that follows a script instead of talking to a server.
/// Clone the `Arc` handed to the orchestrator and keep one for assertions.
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedBackend {
    pub fn new() -> ScriptedBackend {
        ScriptedBackend {
            state: Arc::new(Mutex::new(ScriptedState::default())),
        }
    }

    pub fn abort_next_commits(&self, n: u32) {
        self.state.lock().unwrap().abort_commits = n;
    }

    pub fn abort_next_executes(&self, n: u32) {
        self.state.lock().unwrap().abort_executes = n;
    }

    pub fn stall_executes(&self) {
        self.state.lock().unwrap().stall_executes = true;
    }

    pub fn push_affected(&self, n: u64) {
        self.state.lock().unwrap().affected.push_back(n);
    }

    pub fn push_result(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().results.push_back(rows);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Transactions begun and not yet committed, rolled back, or dropped.
    pub fn open_transactions(&self) -> u32 {
        self.state.lock().unwrap().open
    }
}

#[async_trait]
impl BackendExecutor for ScriptedBackend {
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Query(statement.sql.clone()));
        Ok(state.results.pop_front().unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn BackendTransaction>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Begin);
        state.open += 1;
        drop(state);
        Ok(Box::new(ScriptedTransaction {
            state: Arc::clone(&self.state),
            finished: false,
        }))
    }
}

struct ScriptedTransaction {
    state: Arc<Mutex<ScriptedState>>,
    finished: bool,
}

#[async_trait]
impl BackendTransaction for ScriptedTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, BackendError> {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state.events.push(Event::Execute(statement.sql.clone()));
            if state.abort_executes > 0 {
                state.abort_executes -= 1;
                return Err(BackendError::Aborted("scripted execute abort".into()));
            }
            state.stall_executes
        };
        if stall {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        Ok(state.affected.pop_front().unwrap_or(1))
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Query(statement.sql.clone()));
        Ok(state.results.pop_front().unwrap_or_default())
    }

    fn buffer(&mut self, mutation: Mutation) {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Buffer(mutation));
    }

    async fn commit(mut self: Box<Self>) -> Result<(), BackendError> {
        self.finished = true;
        let mut state = self.state.lock().unwrap();
        // An aborted commit still closes the server-side transaction.
        state.open -= 1;
        if state.abort_commits > 0 {
            state.abort_commits -= 1;
            state.events.push(Event::CommitAborted);
            return Err(BackendError::Aborted("scripted commit abort".into()));
        }
        state.events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), BackendError> {
        self.finished = true;
        let mut state = self.state.lock().unwrap();
        state.open -= 1;
        state.events.push(Event::Rollback);
        Ok(())
    }
}

impl Drop for ScriptedTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.state.lock().unwrap();
            state.open -= 1;
            state.events.push(Event::Drop);
        }
    }
}

/// Singers carries both generated-column flavors, Albums carries a
/// version column, Venues is plain.
pub fn catalog() -> Catalog {
    Catalog::new([
        TableSchema::new(
            "Singers",
            vec![
                ColumnSchema::new("Id", StoreType::Int64).primary_key(),
                ColumnSchema::new("FirstName", StoreType::String),
                ColumnSchema::new("LastName", StoreType::String),
                ColumnSchema::new("FullName", StoreType::String).computed(),
                ColumnSchema::new("LastUpdated", StoreType::Timestamp).commit_timestamp(),
            ],
        ),
        TableSchema::new(
            "Albums",
            vec![
                ColumnSchema::new("Id", StoreType::Int64).primary_key(),
                ColumnSchema::new("Title", StoreType::String),
                ColumnSchema::new("Version", StoreType::Int64).version(),
                ColumnSchema::new("ReleaseDate", StoreType::Date).nullable(),
            ],
        ),
        TableSchema::new(
            "Venues",
            vec![
                ColumnSchema::new("Code", StoreType::String).primary_key(),
                ColumnSchema::new("Active", StoreType::Bool),
            ],
        ),
    ])
}

pub fn singer_insert(id: i64, first: &str, last: &str) -> RowChange {
    RowChange::added(
        "Singers",
        [
            ("Id", Value::Int64(id)),
            ("FirstName", Value::String(first.into())),
            ("LastName", Value::String(last.into())),
        ],
    )
}

pub fn album_update(id: i64, version: i64, title: &str) -> RowChange {
    RowChange::modified(
        "Albums",
        [
            ("Id", Value::Int64(id)),
            ("Title", Value::String(title.into())),
            ("Version", Value::Int64(version)),
        ],
        ["Title"],
    )
}

fn dml_only() -> SaveOptions {
    SaveOptions {
        mutation_policy: MutationPolicy::Never,
        ..SaveOptions::default()
    }
}

fn begins(events: &[Event]) -> usize {
    events.iter().filter(|e| **e == Event::Begin).count()
}

fn executed(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Execute(sql) => Some(sql.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn aborted_implicit_saves_retry_from_the_snapshot() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.abort_next_executes(1);
    let orch = Orchestrator::new(backend.clone(), catalog(), dml_only());

    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    let result = orch.save_changes(&mut changes).await.unwrap();

    assert_eq!(result.attempts, 2);
    assert_eq!(result.rows_affected, 1);
    let events = backend.events();
    assert_eq!(begins(&events), 2);
    // The second attempt re-sends the same statement.
    let statements = executed(&events);
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0], statements[1]);
    assert_eq!(changes.rows[0].state, EntityState::Unchanged);
    assert_eq!(backend.open_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_reports_attempts() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.abort_next_executes(10);
    let options = SaveOptions {
        max_retries: 2,
        ..dml_only()
    };
    let orch = Orchestrator::new(backend.clone(), catalog(), options);

    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    let err = orch.save_changes(&mut changes).await.unwrap_err();

    let SaveError::RetriesExhausted { attempts, source } = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(attempts, 3);
    assert!(source.is_aborted());
    // The failed save leaves the snapshot intact for a later retry.
    assert_eq!(changes.rows[0].state, EntityState::Modified);
    assert_eq!(backend.open_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn explicit_commit_abort_replays_recorded_work() {
    let backend = Arc::new(ScriptedBackend::new());
    let orch = Orchestrator::new(backend.clone(), catalog(), dml_only());

    let mut tx = orch.begin().await.unwrap();
    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    orch.save_changes_in(&mut tx, &mut changes).await.unwrap();

    backend.abort_next_commits(1);
    tx.commit().await.unwrap();

    let events = backend.events();
    assert_eq!(begins(&events), 2);
    let statements = executed(&events);
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0], statements[1]);
    assert!(events.contains(&Event::CommitAborted));
    assert_eq!(events.last(), Some(&Event::Commit));
    assert_eq!(backend.open_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn divergent_replay_surfaces_instead_of_committing() {
    let backend = Arc::new(ScriptedBackend::new());
    let orch = Orchestrator::new(backend.clone(), catalog(), dml_only());

    let mut tx = orch.begin().await.unwrap();
    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    orch.save_changes_in(&mut tx, &mut changes).await.unwrap();

    backend.abort_next_commits(1);
    // The replayed UPDATE now matches nothing: someone else won.
    backend.push_affected(0);
    let err = tx.commit().await.unwrap_err();

    assert!(matches!(err, SaveError::RetryDiverged { .. }));
    let events = backend.events();
    assert_eq!(events.last(), Some(&Event::Rollback));
    assert_eq!(backend.open_transactions(), 0);
}

#[tokio::test]
async fn internal_retries_can_be_disabled() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.abort_next_executes(1);
    let orch = Orchestrator::new(backend.clone(), catalog(), dml_only());

    let mut tx = orch.begin().await.unwrap();
    tx.disable_internal_retries();
    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    let err = orch.save_changes_in(&mut tx, &mut changes).await.unwrap_err();

    assert!(matches!(err, SaveError::Backend(BackendError::Aborted(_))));
    assert_eq!(begins(&backend.events()), 1);
    tx.rollback().await.unwrap();
    assert_eq!(backend.open_transactions(), 0);
}

#[tokio::test]
async fn generated_columns_read_back_after_implicit_commit() {
    let backend = Arc::new(ScriptedBackend::new());
    let committed = Utc.with_ymd_and_hms(2021, 7, 1, 10, 0, 0).unwrap();
    backend.push_result(vec![Row::new(
        vec!["FullName".into(), "LastUpdated".into()],
        vec![
            Value::String("Alice Smith".into()),
            Value::Timestamp(committed),
        ],
    )]);
    let orch = Orchestrator::new(backend.clone(), catalog(), SaveOptions::default());

    let mut changes = ChangeSet::new();
    changes.push(singer_insert(1, "Alice", "Smith"));
    let result = orch.save_changes(&mut changes).await.unwrap();
    assert_eq!(result.rows_affected, 1);

    let events = backend.events();
    let commit = events.iter().position(|e| *e == Event::Commit).unwrap();
    let query = events
        .iter()
        .position(|e| matches!(e, Event::Query(_)))
        .unwrap();
    assert!(commit < query, "read-back must follow the commit: {events:?}");

    let row = &changes.rows[0];
    assert_eq!(
        row.value("FullName"),
        Some(&Value::String("Alice Smith".into()))
    );
    assert_eq!(row.value("LastUpdated"), Some(&Value::Timestamp(committed)));
    assert_eq!(row.state, EntityState::Unchanged);
}

#[tokio::test]
async fn explicit_transactions_fetch_computed_but_not_commit_timestamps() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push_result(vec![Row::new(
        vec!["FullName".into()],
        vec![Value::String("Alice Smith".into())],
    )]);
    let orch = Orchestrator::new(backend.clone(), catalog(), SaveOptions::default());

    let mut tx = orch.begin().await.unwrap();
    let mut changes = ChangeSet::new();
    changes.push(singer_insert(1, "Alice", "Smith"));
    orch.save_changes_in(&mut tx, &mut changes).await.unwrap();
    tx.commit().await.unwrap();

    let queried: Vec<_> = backend
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Query(sql) => Some(sql.clone()),
            _ => None,
        })
        .collect();
    // The commit timestamp does not exist until commit, so inside the
    // transaction only the computed column can be fetched.
    assert_eq!(queried, ["SELECT FullName FROM Singers WHERE Id = @p0"]);
    let row = &changes.rows[0];
    assert_eq!(
        row.value("FullName"),
        Some(&Value::String("Alice Smith".into()))
    );
    assert_eq!(row.value("LastUpdated"), None);
}

#[tokio::test]
async fn version_conflicts_surface_and_do_not_retry() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push_affected(0);
    let orch = Orchestrator::new(backend.clone(), catalog(), dml_only());

    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    let err = orch.save_changes(&mut changes).await.unwrap_err();

    assert!(matches!(
        err,
        SaveError::ConcurrencyConflict { ref table } if table == "Albums"
    ));
    // One attempt only: a lost version race is not transient.
    assert_eq!(begins(&backend.events()), 1);
    assert_eq!(backend.events().last(), Some(&Event::Rollback));

    // With the version the row actually has, the same change lands.
    let mut refreshed = ChangeSet::new();
    refreshed.push(album_update(7, 6, "Blue Train"));
    let result = orch.save_changes(&mut refreshed).await.unwrap();
    assert_eq!(result.rows_affected, 1);
}

#[tokio::test]
async fn mutation_mode_version_checks_precede_the_buffer() {
    let backend = Arc::new(ScriptedBackend::new());
    // No scripted result: the version SELECT comes back empty.
    let orch = Orchestrator::new(backend.clone(), catalog(), SaveOptions::default());

    let mut changes = ChangeSet::new();
    changes.push(album_update(7, 5, "Blue Train"));
    let err = orch.save_changes(&mut changes).await.unwrap_err();

    assert!(matches!(err, SaveError::ConcurrencyConflict { .. }));
    let events = backend.events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Query(sql) if sql == "SELECT Version FROM Albums WHERE Id = @p0 AND Version = @p1"
    )));
    assert!(!events.iter().any(|e| matches!(e, Event::Buffer(_))));
    assert_eq!(events.last(), Some(&Event::Rollback));
}

#[tokio::test]
async fn a_cancelled_save_still_releases_its_transaction() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.stall_executes();
    let orch = Orchestrator::new(backend.clone(), catalog(), dml_only());

    let worker = tokio::spawn(async move {
        let mut changes = ChangeSet::new();
        changes.push(album_update(7, 5, "Blue Train"));
        orch.save_changes(&mut changes).await.map(|r| r.rows_affected)
    });
    while !backend
        .events()
        .iter()
        .any(|e| matches!(e, Event::Execute(_)))
    {
        tokio::task::yield_now().await;
    }
    worker.abort();

    assert!(worker.await.unwrap_err().is_cancelled());
    assert_eq!(backend.open_transactions(), 0);
    assert_eq!(backend.events().last(), Some(&Event::Drop));
}

#[tokio::test(start_paused = true)]
async fn buffering_into_a_completed_transaction_errors() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push_result(vec![Row::new(
        vec!["FullName".into()],
        vec![Value::String("Alice Smith".into())],
    )]);
    let orch = Orchestrator::new(
        backend.clone(),
        catalog(),
        SaveOptions {
            mutation_policy: MutationPolicy::Always,
            ..SaveOptions::default()
        },
    );

    let mut tx = orch.begin().await.unwrap();
    let mut first = ChangeSet::new();
    first.push(singer_insert(1, "Alice", "Smith"));
    orch.save_changes_in(&mut tx, &mut first).await.unwrap();

    // The next save aborts and its replay diverges, which kills the
    // backend handle without consuming the `Transaction`.
    backend.abort_next_executes(1);
    backend.push_affected(0);
    let mut second = ChangeSet::new();
    second.push(singer_insert(2, "Bob", "Stone"));
    let err = orch.save_changes_in(&mut tx, &mut second).await.unwrap_err();
    assert!(matches!(err, SaveError::RetryDiverged { .. }));

    // A mutation-mode save on the dead handle must surface the error
    // instead of silently dropping the buffered write.
    let mut third = ChangeSet::new();
    third.push(RowChange::added(
        "Venues",
        [
            ("Code", Value::String("V1".into())),
            ("Active", Value::Bool(true)),
        ],
    ));
    let err = orch.save_changes_in(&mut tx, &mut third).await.unwrap_err();
    assert!(matches!(err, SaveError::Backend(BackendError::Session(_))));
    assert_eq!(third.rows[0].state, EntityState::Added);
    assert!(!backend.events().iter().any(|e| matches!(e, Event::Buffer(_))));
    assert_eq!(backend.open_transactions(), 0);
}

fn translated(expr: &QueryExpr) -> crate::sql::SqlExpr {
    Translator::new().translate(expr).unwrap()
}

#[test]
fn index_and_substring_translations_match_host_semantics() {
    let get = |col: &str| (col == "Name").then(|| Value::String("immortal".into()));
    let name = QueryExpr::column("Name", StoreType::String, false);

    // Host IndexOf is zero-based: "immortal".IndexOf("mort") == 2.
    let index_of = translated(&QueryExpr::call(
        name.clone(),
        Method::IndexOf,
        vec![QueryExpr::constant("mort")],
    ));
    assert_eq!(index_of.evaluate(&get).unwrap(), Value::Int64(2));

    let absent = translated(&QueryExpr::call(
        name.clone(),
        Method::IndexOf,
        vec![QueryExpr::constant("zzz")],
    ));
    assert_eq!(absent.evaluate(&get).unwrap(), Value::Int64(-1));

    // Host Substring(2, 4) == "mort"; SUBSTR counts from 1.
    let substring = translated(&QueryExpr::call(
        name,
        Method::Substring,
        vec![QueryExpr::constant(2i64), QueryExpr::constant(4i64)],
    ));
    assert_eq!(
        substring.evaluate(&get).unwrap(),
        Value::String("mort".into())
    );
}

#[test]
fn day_of_week_numbering_matches_the_host() {
    let expr = translated(&QueryExpr::member(
        QueryExpr::column("Birthday", StoreType::Date, false),
        Member::DayOfWeek,
    ));

    // 2024-01-07 was a Sunday; the host counts Sunday as 0.
    let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
    let get = move |col: &str| (col == "Birthday").then(|| Value::Date(sunday));
    assert_eq!(expr.evaluate(&get).unwrap(), Value::Int64(0));

    let wednesday = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    let get = move |col: &str| (col == "Birthday").then(|| Value::Date(wednesday));
    assert_eq!(expr.evaluate(&get).unwrap(), Value::Int64(3));
}

#[test]
fn timestamp_members_extract_in_utc() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 6, 23, 30, 5).unwrap()
        + chrono::Duration::milliseconds(250);
    let get = move |col: &str| (col == "CreatedAt").then(|| Value::Timestamp(ts));
    let created = || QueryExpr::column("CreatedAt", StoreType::Timestamp, false);

    let date = translated(&QueryExpr::member(created(), Member::Date));
    assert_eq!(
        date.evaluate(&get).unwrap(),
        Value::Date(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap())
    );
    let hour = translated(&QueryExpr::member(created(), Member::Hour));
    assert_eq!(hour.evaluate(&get).unwrap(), Value::Int64(23));
    let millisecond = translated(&QueryExpr::member(created(), Member::Millisecond));
    assert_eq!(millisecond.evaluate(&get).unwrap(), Value::Int64(250));
}

#[test]
fn date_arithmetic_round_trips_through_the_interval_node() {
    let get = |col: &str| {
        (col == "Birthday").then(|| Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()))
    };
    let tree = translated(&QueryExpr::call(
        QueryExpr::column("Birthday", StoreType::Date, false),
        Method::AddMonths,
        vec![QueryExpr::constant(1i64)],
    ));
    assert_eq!(sql_string(&tree), "DATE_ADD(Birthday, INTERVAL 1 MONTH)");
    assert_eq!(
        tree.evaluate(&get).unwrap(),
        Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
    );
}

#[test]
fn log_guard_agrees_between_sql_and_evaluation() {
    let tree = translated(&QueryExpr::call_static(
        Method::Log,
        vec![QueryExpr::column("Price", StoreType::Float64, false)],
    ));
    assert_eq!(
        sql_string(&tree),
        "IF(Price <= 0, CAST('NaN' AS FLOAT64), LN(Price))"
    );

    let get = |col: &str| (col == "Price").then(|| Value::Float64(-3.0));
    let Value::Float64(v) = tree.evaluate(&get).unwrap() else {
        panic!("expected FLOAT64");
    };
    assert!(v.is_nan());
}

#[test]
fn json_member_paths_survive_quoting() {
    let doc = serde_json::json!({ "it's": "blue", "plain": 7 });
    let get = move |col: &str| (col == "Attrs").then(|| Value::Json(doc.clone()));
    let attrs = || QueryExpr::column("Attrs", StoreType::Json, true);

    let awkward = translated(&QueryExpr::member(
        attrs(),
        Member::Json {
            name: "it's".into(),
            store_type: Some(StoreType::String),
        },
    ));
    assert_eq!(sql_string(&awkward), r#"JSON_VALUE(Attrs, '$["it\'s"]')"#);
    assert_eq!(awkward.evaluate(&get).unwrap(), Value::String("blue".into()));

    let plain = translated(&QueryExpr::member(
        attrs(),
        Member::Json {
            name: "plain".into(),
            store_type: None,
        },
    ));
    assert_eq!(plain.evaluate(&get).unwrap(), Value::String("7".into()));
}

#[test]
fn anchored_regex_matches_whole_strings() {
    let tree = translated(&QueryExpr::call_static(
        Method::RegexIsMatch,
        vec![
            QueryExpr::column("Name", StoreType::String, false),
            QueryExpr::constant("[0-9]+"),
        ],
    ));
    let hit = |col: &str| (col == "Name").then(|| Value::String("123".into()));
    let miss = |col: &str| (col == "Name").then(|| Value::String("a123".into()));
    assert_eq!(tree.evaluate(&hit).unwrap(), Value::Bool(true));
    assert_eq!(tree.evaluate(&miss).unwrap(), Value::Bool(false));
}

#[test]
fn repeated_translation_yields_identical_trees() {
    let expr = QueryExpr::binary(
        QueryExpr::call(
            QueryExpr::column("Name", StoreType::String, true),
            Method::ToUpper,
            vec![],
        ),
        ast::BinaryOp::Eq,
        QueryExpr::parameter("name", Some(StoreType::String)),
    );
    let translator = Translator::new();
    let a = translator.translate(&expr).unwrap();
    let b = translator.translate(&expr).unwrap();
    assert_eq!(a, b);
    assert_eq!(sql_string(&a), sql_string(&b));
}
