//! In-memory backend.
//!
//! `MemoryConnection` answers statements from scripted result sets and
//! records everything it is asked to do, which makes it the driver of choice
//! for unit tests and local development. A [`MemoryProbe`] obtained before
//! the connection is handed to a lock manager keeps read access to the
//! recorded activity.
//!
//! # Example
//! ```
//! use omp_rust::db::{Cursor, MemoryConnection, OmpError, OmpLock, ResultSet, Value};
//!
//! let conn = MemoryConnection::new().respond(
//!     "FROM omp.ompobs",
//!     ResultSet::new(&["target"], vec![vec![Value::from("NORAD25544")]]),
//! );
//! let probe = conn.probe();
//! let lock = OmpLock::new(conn, false);
//!
//! let rows = lock
//!     .transaction(false, |c: &mut dyn Cursor| {
//!         c.execute("SELECT DISTINCT target FROM omp.ompobs", &[])?;
//!         c.fetch_all()
//!     })
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(probe.commits(), 0);
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::db::connection::{Connection, CursorState, Transactional};
use crate::db::dialect::Dialect;
use crate::db::value::{Column, Row, Value};

/// Error raised by the in-memory driver.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct MemoryError(pub String);

/// Scripted answer to a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
    affected: Option<u64>,
}

impl ResultSet {
    /// A result set with the given column names and rows.
    pub fn new(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            columns: columns.iter().map(|c| Column::new(*c)).collect(),
            rows,
            affected: None,
        }
    }

    /// Outcome of a data-modifying statement that changed `count` rows.
    pub fn affected(count: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected: Some(count),
        }
    }

    fn has_rows(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// A statement as it reached the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub statement: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct MemoryState {
    responses: Vec<(String, ResultSet)>,
    failures: Vec<(String, String)>,
    begin_failure: Option<String>,
    commit_failure: Option<String>,
    rollback_failure: Option<String>,
    close_failure: Option<String>,
    execute_delay: Option<Duration>,

    executed: Vec<ExecutedStatement>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    cursors_opened: usize,
    cursors_closed: usize,
    open_cursors: usize,
    max_open_cursors: usize,
    closed: bool,
}

/// Cursor handle of the in-memory driver.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    columns: Option<Vec<Column>>,
    rows: VecDeque<Row>,
    row_count: Option<u64>,
}

impl MemoryCursor {
    fn load(&mut self, result: Option<ResultSet>) {
        self.rows.clear();
        match result {
            Some(set) if set.has_rows() => {
                self.row_count = set.affected.or(Some(set.rows.len() as u64));
                self.columns = Some(set.columns);
                self.rows = set.rows.into();
            }
            Some(set) => {
                self.columns = None;
                self.row_count = set.affected;
            }
            None => {
                self.columns = None;
                self.row_count = None;
            }
        }
    }
}

impl CursorState for MemoryCursor {
    fn description(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }
}

/// Scripted, instrumented in-memory connection.
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    dialect: Dialect,
    guard_statements: bool,
}

impl MemoryConnection {
    /// Empty connection using the Postgres dialect, with the read-only
    /// statement guard enabled.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            dialect: Dialect::Postgres,
            guard_statements: true,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_statement_guard(mut self, enabled: bool) -> Self {
        self.guard_statements = enabled;
        self
    }

    /// Answer statements containing `fragment` with `result`. The first
    /// matching registration wins.
    pub fn respond(self, fragment: &str, result: ResultSet) -> Self {
        self.state
            .lock()
            .responses
            .push((fragment.to_string(), result));
        self
    }

    /// Fail statements containing `fragment` with a driver error.
    pub fn fail_on(self, fragment: &str, message: &str) -> Self {
        self.state
            .lock()
            .failures
            .push((fragment.to_string(), message.to_string()));
        self
    }

    pub fn fail_begin(self, message: &str) -> Self {
        self.state.lock().begin_failure = Some(message.to_string());
        self
    }

    pub fn fail_commit(self, message: &str) -> Self {
        self.state.lock().commit_failure = Some(message.to_string());
        self
    }

    pub fn fail_rollback(self, message: &str) -> Self {
        self.state.lock().rollback_failure = Some(message.to_string());
        self
    }

    /// Make every cursor close fail.
    pub fn fail_cursor_close(self, message: &str) -> Self {
        self.state.lock().close_failure = Some(message.to_string());
        self
    }

    /// Sleep inside every execute, to widen race windows in tests.
    pub fn with_execute_delay(self, delay: Duration) -> Self {
        self.state.lock().execute_delay = Some(delay);
        self
    }

    pub fn probe(&self) -> MemoryProbe {
        MemoryProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer `SELECT <integer>` without a scripted response.
fn literal_select(statement: &str) -> Option<ResultSet> {
    let trimmed = statement.trim();
    let head = trimmed.get(..6)?;
    if !head.eq_ignore_ascii_case("select") {
        return None;
    }
    let value: i64 = trimmed[6..].trim().parse().ok()?;
    Some(ResultSet::new(&["?column?"], vec![vec![Value::Int(value)]]))
}

impl Connection for MemoryConnection {
    type Error = MemoryError;
    type Cursor = MemoryCursor;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn guards_read_only(&self) -> bool {
        self.guard_statements
    }

    fn open_cursor(&mut self) -> Result<MemoryCursor, MemoryError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MemoryError("connection is closed".to_string()));
        }
        state.cursors_opened += 1;
        state.open_cursors += 1;
        state.max_open_cursors = state.max_open_cursors.max(state.open_cursors);
        Ok(MemoryCursor::default())
    }

    fn execute(
        &mut self,
        cursor: &mut MemoryCursor,
        statement: &str,
        params: &[Value],
    ) -> Result<(), MemoryError> {
        let delay = self.state.lock().execute_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.executed.push(ExecutedStatement {
            statement: statement.to_string(),
            params: params.to_vec(),
        });

        if let Some((_, message)) = state
            .failures
            .iter()
            .find(|(fragment, _)| statement.contains(fragment.as_str()))
        {
            return Err(MemoryError(message.clone()));
        }

        let result = state
            .responses
            .iter()
            .find(|(fragment, _)| statement.contains(fragment.as_str()))
            .map(|(_, set)| set.clone())
            .or_else(|| literal_select(statement));
        cursor.load(result);
        Ok(())
    }

    fn fetch_one(&mut self, cursor: &mut MemoryCursor) -> Result<Option<Row>, MemoryError> {
        if cursor.columns.is_none() {
            return Err(MemoryError("no result set to fetch from".to_string()));
        }
        Ok(cursor.rows.pop_front())
    }

    fn fetch_all(&mut self, cursor: &mut MemoryCursor) -> Result<Vec<Row>, MemoryError> {
        if cursor.columns.is_none() {
            return Err(MemoryError("no result set to fetch from".to_string()));
        }
        Ok(cursor.rows.drain(..).collect())
    }

    fn close_cursor(&mut self, _cursor: MemoryCursor) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        state.open_cursors = state.open_cursors.saturating_sub(1);
        if let Some(message) = &state.close_failure {
            return Err(MemoryError(message.clone()));
        }
        state.cursors_closed += 1;
        Ok(())
    }

    fn close(self) -> Result<(), MemoryError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

impl Transactional for MemoryConnection {
    fn begin(&mut self) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.begin_failure {
            return Err(MemoryError(message.clone()));
        }
        state.begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.commit_failure {
            return Err(MemoryError(message.clone()));
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        state.rollbacks += 1;
        match &state.rollback_failure {
            Some(message) => Err(MemoryError(message.clone())),
            None => Ok(()),
        }
    }
}

/// Read access to the activity recorded by a [`MemoryConnection`].
#[derive(Clone)]
pub struct MemoryProbe {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProbe {
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.lock().executed.clone()
    }

    pub fn execute_count(&self) -> usize {
        self.state.lock().executed.len()
    }

    pub fn last_executed(&self) -> Option<ExecutedStatement> {
        self.state.lock().executed.last().cloned()
    }

    pub fn begins(&self) -> usize {
        self.state.lock().begins
    }

    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Rollback attempts, including failed ones.
    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    pub fn cursors_opened(&self) -> usize {
        self.state.lock().cursors_opened
    }

    /// Successful cursor closes.
    pub fn cursors_closed(&self) -> usize {
        self.state.lock().cursors_closed
    }

    pub fn open_cursors(&self) -> usize {
        self.state.lock().open_cursors
    }

    /// Highest number of cursors that were open at the same time.
    pub fn max_open_cursors(&self) -> usize {
        self.state.lock().max_open_cursors
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_select() {
        let set = literal_select("  select 42 ").unwrap();
        assert_eq!(set.rows, vec![vec![Value::Int(42)]]);
        assert!(literal_select("SELECT obsid FROM jcmt.COMMON").is_none());
        assert!(literal_select("UPDATE x SET y=1").is_none());
    }

    #[test]
    fn test_scripted_response_and_fetch() {
        let mut conn = MemoryConnection::new().respond(
            "FROM jcmt.COMMON",
            ResultSet::new(&["obsid"], vec![vec![Value::from("a")], vec![Value::from("b")]]),
        );
        let mut cursor = conn.open_cursor().unwrap();
        conn.execute(&mut cursor, "SELECT obsid FROM jcmt.COMMON", &[])
            .unwrap();

        assert_eq!(cursor.description().unwrap()[0].name, "obsid");
        assert_eq!(cursor.row_count(), Some(2));
        assert_eq!(
            conn.fetch_one(&mut cursor).unwrap(),
            Some(vec![Value::from("a")])
        );
        assert_eq!(conn.fetch_all(&mut cursor).unwrap().len(), 1);
        assert_eq!(conn.fetch_one(&mut cursor).unwrap(), None);
        conn.close_cursor(cursor).unwrap();
    }

    #[test]
    fn test_fetch_without_result_set_fails() {
        let mut conn = MemoryConnection::new();
        let mut cursor = conn.open_cursor().unwrap();
        conn.execute(&mut cursor, "UPDATE x SET y=1", &[]).unwrap();
        assert_eq!(cursor.row_count(), None);
        assert!(conn.fetch_all(&mut cursor).is_err());
    }

    #[test]
    fn test_injected_failure_is_recorded() {
        let mut conn = MemoryConnection::new().fail_on("UPDATE", "Lock wait timeout exceeded");
        let probe = conn.probe();
        let mut cursor = conn.open_cursor().unwrap();

        let err = conn
            .execute(&mut cursor, "UPDATE x SET y=1", &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Lock wait timeout exceeded");
        assert_eq!(probe.execute_count(), 1);
    }

    #[test]
    fn test_closed_connection_refuses_cursors() {
        let conn = MemoryConnection::new();
        let probe = conn.probe();
        conn.close().unwrap();
        assert!(probe.is_closed());
    }
}
