//! Connections, prepared statements and cursors.
//!
//! A [`Connection`] owns one engine handle and a statement cache keyed by SQL
//! text. Preparing the same text twice yields the same [`StatementId`] and the
//! same engine statement; cached statements live until the connection closes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{CachedStatement, OpenFlags};
use tracing::{debug, info, trace};

use crate::config::{SqliteConfig, TransactionBehavior};
use crate::error::{Error, Result};
use crate::row::{FromRow, Row};
use crate::schema::Schema;
use crate::statement::Render;
use crate::value::{FromValue, Value};

const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Stable identity of a cached statement within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(u64);

/// Effect of a data-changing statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteResult {
    /// Rows inserted, updated or deleted.
    pub changes: u64,
    pub last_insert_rowid: i64,
}

/// A single database connection.
///
/// `Connection` is `Send` but not `Sync`: it may be moved to another thread,
/// but only one thread can use it at a time.
pub struct Connection {
    inner: rusqlite::Connection,
    statements: RefCell<HashMap<String, StatementId>>,
    cache_capacity: Cell<usize>,
    changes: Cell<u64>,
    last_insert_rowid: Cell<i64>,
    savepoints: Cell<u64>,
    transaction_behavior: TransactionBehavior,
}

impl Connection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = rusqlite::Connection::open(path)?;
        info!("opened sqlite database at {}", path.display());
        Ok(Self::from_inner(inner, DEFAULT_CACHE_CAPACITY, TransactionBehavior::Deferred))
    }

    pub fn open_in_memory() -> Result<Self> {
        let inner = rusqlite::Connection::open_in_memory()?;
        debug!("opened in-memory sqlite database");
        Ok(Self::from_inner(inner, DEFAULT_CACHE_CAPACITY, TransactionBehavior::Deferred))
    }

    /// Opens the database described by `config`, applies its pragmas, then
    /// creates every table and index of its schema that does not exist yet.
    pub fn open_with_config(config: &SqliteConfig) -> Result<Self> {
        let inner = if config.read_only {
            rusqlite::Connection::open_with_flags(
                &config.db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            rusqlite::Connection::open(&config.db_path)?
        };
        info!(
            path = %config.db_path,
            read_only = config.read_only,
            "opened sqlite database"
        );

        let capacity = config.statement_cache_capacity.max(1);
        let conn = Self::from_inner(inner, capacity, config.transaction_behavior);
        conn.set_busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.inner
            .pragma_update(None, "foreign_keys", config.foreign_keys)?;
        if let Some(mode) = config.journal_mode {
            let applied: String = conn.inner.pragma_update_and_check(
                None,
                "journal_mode",
                mode.as_sql(),
                |row| row.get(0),
            )?;
            if config.is_in_memory() {
                debug!("journal mode for in-memory database is {applied}");
            } else {
                debug!("journal mode set to {applied}");
            }
        }

        if config.read_only {
            if !config.schema.tables.is_empty() {
                debug!("read-only connection, schema not applied");
            }
        } else {
            conn.apply_schema(&config.schema)?;
        }
        Ok(conn)
    }

    fn from_inner(
        inner: rusqlite::Connection,
        capacity: usize,
        transaction_behavior: TransactionBehavior,
    ) -> Self {
        inner.set_prepared_statement_cache_capacity(capacity);
        Self {
            inner,
            statements: RefCell::new(HashMap::new()),
            cache_capacity: Cell::new(capacity),
            changes: Cell::new(0),
            last_insert_rowid: Cell::new(0),
            savepoints: Cell::new(0),
            transaction_behavior,
        }
    }

    /// Creates every table and index in `schema` that does not exist yet,
    /// inside one transaction.
    pub fn apply_schema(&self, schema: &Schema) -> Result<()> {
        let statements = schema.statements()?;
        if statements.is_empty() {
            return Ok(());
        }
        self.transaction(|tx| {
            for statement in &statements {
                tx.execute(statement)?;
            }
            Ok::<_, Error>(())
        })?;
        info!(tables = schema.tables.len(), "schema applied");
        Ok(())
    }

    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.inner.busy_timeout(timeout)?;
        Ok(())
    }

    /// Prepares `sql`, or returns the cached statement for the same text.
    pub fn prepare(&self, sql: &str) -> Result<Prepared<'_>> {
        let known = self.statements.borrow().get(sql).copied();
        let id = match known {
            Some(id) => {
                trace!(sql, "statement cache hit");
                id
            }
            None => {
                debug!(sql, "preparing statement");
                // Grow the engine cache ahead of the new entry so no
                // registered statement is ever evicted.
                let needed = self.statements.borrow().len() + 1;
                if needed > self.cache_capacity.get() {
                    let capacity = needed.max(self.cache_capacity.get() * 2);
                    self.inner.set_prepared_statement_cache_capacity(capacity);
                    self.cache_capacity.set(capacity);
                }
                StatementId(needed as u64 - 1)
            }
        };

        let stmt = self.inner.prepare_cached(sql)?;
        if known.is_none() {
            self.statements.borrow_mut().insert(sql.to_string(), id);
        }
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(Prepared {
            conn: self,
            stmt,
            id,
            columns,
            state: State::Ready,
        })
    }

    /// Renders, binds and runs a statement, discarding any rows it produces.
    pub fn execute<R: Render>(&self, statement: R) -> Result<ExecuteResult> {
        let statement = statement.render()?;
        let mut prepared = self.prepare(statement.sql())?;
        prepared.bind(statement.params())?;
        prepared.execute()
    }

    pub fn fetch_all<T: FromRow, R: Render>(&self, query: R) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.for_each(query, |row| {
            out.push(T::from_row(row)?);
            Ok(())
        })?;
        Ok(out)
    }

    /// The first row, or [`Error::NoRows`].
    pub fn fetch_one<T: FromRow, R: Render>(&self, query: R) -> Result<T> {
        self.fetch_optional(query)?.ok_or(Error::NoRows)
    }

    pub fn fetch_optional<T: FromRow, R: Render>(&self, query: R) -> Result<Option<T>> {
        let statement = query.render()?;
        let mut prepared = self.prepare(statement.sql())?;
        prepared.bind(statement.params())?;
        let mut cursor = prepared.query()?;
        if let StepResult::Row(row) = cursor.step()? {
            return Ok(Some(T::from_row(&row)?));
        }
        Ok(None)
    }

    /// Streams rows to `f` one at a time. Stops at the first error.
    pub fn for_each<R, F>(&self, query: R, mut f: F) -> Result<()>
    where
        R: Render,
        F: FnMut(&Row<'_>) -> Result<()>,
    {
        let statement = query.render()?;
        let mut prepared = self.prepare(statement.sql())?;
        prepared.bind(statement.params())?;
        let mut cursor = prepared.query()?;
        while let StepResult::Row(row) = cursor.step()? {
            f(&row)?;
        }
        Ok(())
    }

    /// The first column of the first row.
    pub fn scalar<T: FromValue, R: Render>(&self, query: R) -> Result<T> {
        let statement = query.render()?;
        let mut prepared = self.prepare(statement.sql())?;
        prepared.bind(statement.params())?;
        let mut cursor = prepared.query()?;
        if let StepResult::Row(row) = cursor.step()? {
            return row.get(0);
        }
        Err(Error::NoRows)
    }

    /// Runs one or more semicolon-separated statements without parameters
    /// and without going through the statement cache.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let before = self.total_changes()?;
        self.inner.execute_batch(sql)?;
        // Transaction control and DDL leave the counters alone.
        if self.total_changes()? != before {
            self.record_changes();
        }
        Ok(())
    }

    /// Rows changed by the most recent data-changing statement.
    pub fn changes(&self) -> u64 {
        self.changes.get()
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.last_insert_rowid.get()
    }

    /// Number of distinct statement texts prepared on this connection.
    pub fn cached_statement_count(&self) -> usize {
        self.statements.borrow().len()
    }

    /// `false` while a transaction is open.
    pub fn is_autocommit(&self) -> bool {
        self.inner.is_autocommit()
    }

    /// Finalizes every cached statement and closes the engine handle.
    pub fn close(self) -> Result<()> {
        let cached = self.statements.borrow().len();
        self.inner.flush_prepared_statement_cache();
        self.inner.close().map_err(|(_, err)| Error::from(err))?;
        info!(cached, "closed sqlite database");
        Ok(())
    }

    pub(crate) fn transaction_behavior(&self) -> TransactionBehavior {
        self.transaction_behavior
    }

    pub(crate) fn next_savepoint(&self) -> String {
        let next = self.savepoints.get() + 1;
        self.savepoints.set(next);
        format!("sp_{next}")
    }

    /// Rows changed by every statement since the connection opened.
    fn total_changes(&self) -> Result<i64> {
        Ok(self
            .inner
            .query_row("SELECT total_changes()", [], |row| row.get(0))?)
    }

    fn record_changes(&self) {
        self.changes.set(self.inner.changes() as u64);
        self.last_insert_rowid.set(self.inner.last_insert_rowid());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Bound,
    Executed,
}

/// A prepared statement borrowed from the connection's cache.
///
/// Values are bound with [`bind`](Prepared::bind), the statement runs with
/// [`query`](Prepared::query) or [`execute`](Prepared::execute), and
/// [`reset`](Prepared::reset) makes it ready for the next set of values.
pub struct Prepared<'c> {
    conn: &'c Connection,
    stmt: CachedStatement<'c>,
    id: StatementId,
    columns: Arc<[String]>,
    state: State,
}

impl<'c> Prepared<'c> {
    pub fn id(&self) -> StatementId {
        self.id
    }

    pub fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Binds `params` to the placeholders in order. The count must match
    /// exactly, and a statement that already ran must be reset first.
    pub fn bind(&mut self, params: &[Value]) -> Result<()> {
        if self.state == State::Executed {
            return Err(Error::Misuse(
                "statement already executed; reset it before binding new values".to_string(),
            ));
        }
        let expected = self.stmt.parameter_count();
        if params.len() != expected {
            return Err(Error::Bind {
                expected,
                given: params.len(),
            });
        }
        for (i, value) in params.iter().enumerate() {
            self.stmt.raw_bind_parameter(i + 1, value)?;
        }
        self.state = State::Bound;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            State::Executed => Err(Error::Misuse(
                "statement already executed; reset it before running it again".to_string(),
            )),
            State::Ready if self.stmt.parameter_count() > 0 => Err(Error::Bind {
                expected: self.stmt.parameter_count(),
                given: 0,
            }),
            _ => {
                self.state = State::Executed;
                Ok(())
            }
        }
    }

    /// Starts the statement and returns a cursor over its rows.
    pub fn query(&mut self) -> Result<Cursor<'_>> {
        self.start()?;
        Ok(Cursor {
            rows: self.stmt.raw_query(),
            columns: self.columns.clone(),
        })
    }

    /// Runs the statement to completion, discarding rows.
    pub fn execute(&mut self) -> Result<ExecuteResult> {
        self.start()?;
        let writes = !self.stmt.readonly();
        let before = if writes { self.conn.total_changes()? } else { 0 };
        {
            let mut rows = self.stmt.raw_query();
            while rows.next()?.is_some() {}
        }
        if writes {
            // The engine keeps the previous count across DDL, so only trust it
            // when this statement moved the running total.
            if self.conn.total_changes()? != before {
                self.conn.record_changes();
            } else {
                self.conn.changes.set(0);
            }
            return Ok(ExecuteResult {
                changes: self.conn.changes(),
                last_insert_rowid: self.conn.last_insert_rowid(),
            });
        }
        Ok(ExecuteResult {
            changes: 0,
            last_insert_rowid: self.conn.last_insert_rowid(),
        })
    }

    /// Makes the statement runnable again. Bound values are discarded.
    pub fn reset(&mut self) {
        self.stmt.clear_bindings();
        self.state = State::Ready;
    }
}

/// Outcome of one [`Cursor::step`].
pub enum StepResult<'a> {
    Row(Row<'a>),
    Done,
}

/// Forward-only iteration over the rows of a running statement.
pub struct Cursor<'s> {
    rows: rusqlite::Rows<'s>,
    columns: Arc<[String]>,
}

impl<'s> Cursor<'s> {
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Advances to the next row. The returned row is valid until the next
    /// call.
    pub fn step(&mut self) -> Result<StepResult<'_>> {
        match self.rows.next()? {
            Some(row) => Ok(StepResult::Row(Row::new(row, &self.columns))),
            None => Ok(StepResult::Done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_raw("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn same_text_reuses_statement() {
        let conn = conn();
        let first = conn.prepare("SELECT v FROM kv WHERE k = ?").unwrap().id();
        let second = conn.prepare("SELECT v FROM kv WHERE k = ?").unwrap().id();
        let other = conn.prepare("SELECT k FROM kv").unwrap().id();
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(conn.cached_statement_count(), 2);
    }

    #[test]
    fn cache_grows_instead_of_evicting() {
        let conn = Connection::open_in_memory().unwrap();
        let ids: Vec<StatementId> = (0..40)
            .map(|i| conn.prepare(&format!("SELECT {i}")).unwrap().id())
            .collect();
        assert_eq!(conn.cached_statement_count(), 40);
        assert_eq!(conn.prepare("SELECT 0").unwrap().id(), ids[0]);
        assert_eq!(conn.cached_statement_count(), 40);
    }

    #[test]
    fn failed_prepare_is_not_registered() {
        let conn = conn();
        let err = conn.prepare("SELEC nonsense").err().unwrap();
        assert!(matches!(err, Error::Engine { code, .. } if code & 0xff == 1));
        assert_eq!(conn.cached_statement_count(), 0);
    }

    #[test]
    fn bind_checks_arity() {
        let conn = conn();
        let mut stmt = conn.prepare("INSERT INTO kv (k, v) VALUES (?, ?)").unwrap();
        assert_eq!(stmt.parameter_count(), 2);
        let err = stmt.bind(&[Value::Text("a".into())]).unwrap_err();
        assert!(matches!(err, Error::Bind { expected: 2, given: 1 }));
        let err = stmt.execute().unwrap_err();
        assert!(matches!(err, Error::Bind { expected: 2, given: 0 }));
    }

    #[test]
    fn rebinding_requires_reset() {
        let conn = conn();
        let mut stmt = conn.prepare("INSERT INTO kv (k, v) VALUES (?, ?)").unwrap();
        stmt.bind(&[Value::Text("a".into()), Value::Integer(1)]).unwrap();
        let result = stmt.execute().unwrap();
        assert_eq!(result.changes, 1);

        let err = stmt
            .bind(&[Value::Text("b".into()), Value::Integer(2)])
            .unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));

        stmt.reset();
        stmt.bind(&[Value::Text("b".into()), Value::Integer(2)]).unwrap();
        stmt.execute().unwrap();
        drop(stmt);

        let count: i64 = conn
            .scalar(Statement::raw("SELECT count(*) FROM kv", Vec::new()))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn cursor_steps_until_done() {
        let conn = conn();
        conn.execute_raw("INSERT INTO kv VALUES ('a', 1), ('b', 2)").unwrap();
        let mut stmt = conn.prepare("SELECT k, v FROM kv ORDER BY k").unwrap();
        stmt.bind(&[]).unwrap();
        assert_eq!(stmt.column_names(), ["k", "v"]);
        let mut cursor = stmt.query().unwrap();
        let mut seen = Vec::new();
        while let StepResult::Row(row) = cursor.step().unwrap() {
            seen.push((row.get::<String>(0).unwrap(), row.get_by_name::<i64>("v").unwrap()));
        }
        assert!(matches!(cursor.step().unwrap(), StepResult::Done));
        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn reads_do_not_touch_change_counters() {
        let conn = conn();
        let result = conn
            .execute(Statement::raw(
                "INSERT INTO kv (k, v) VALUES (?, ?)",
                vec![Value::Text("a".into()), Value::Integer(1)],
            ))
            .unwrap();
        assert_eq!(result, ExecuteResult { changes: 1, last_insert_rowid: 1 });

        let read = conn
            .execute(Statement::raw("SELECT * FROM kv", Vec::new()))
            .unwrap();
        assert_eq!(read.changes, 0);
        assert_eq!(conn.changes(), 1);
        assert_eq!(conn.last_insert_rowid(), 1);
    }

    #[test]
    fn schema_changes_report_no_rows() {
        let conn = conn();
        let insert = conn
            .execute(Statement::raw(
                "INSERT INTO kv (k, v) VALUES (?, ?)",
                vec![Value::Text("a".into()), Value::Integer(1)],
            ))
            .unwrap();
        assert_eq!(insert.changes, 1);

        let create = conn
            .execute(Statement::raw("CREATE TABLE extra (x INTEGER)", Vec::new()))
            .unwrap();
        assert_eq!(create.changes, 0);
        assert_eq!(conn.changes(), 0);
        assert_eq!(create.last_insert_rowid, 1);

        conn.execute_raw("INSERT INTO kv VALUES ('b', 2), ('c', 3)").unwrap();
        assert_eq!(conn.changes(), 2);
        conn.execute_raw("BEGIN; COMMIT").unwrap();
        assert_eq!(conn.changes(), 2);
    }

    #[test]
    fn reset_discards_bound_values() {
        let conn = conn();
        let mut stmt = conn.prepare("SELECT ?").unwrap();
        stmt.bind(&[Value::Integer(7)]).unwrap();
        stmt.reset();
        let err = stmt.execute().unwrap_err();
        assert!(matches!(err, Error::Bind { expected: 1, given: 0 }));
    }

    #[test]
    fn connection_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Connection>();
    }
}
