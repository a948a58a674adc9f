//! Cursor implementations handed to transaction scopes.

use super::connection::{Connection, Cursor, CursorState};
use super::value::{Column, Row, Value};
use crate::error::{OmpError, OmpResult};

/// Whether `statement` starts with `SELECT`, ignoring case and surrounding
/// whitespace. Only the literal prefix is inspected.
pub fn is_select(statement: &str) -> bool {
    statement
        .trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"))
}

/// A driver cursor bound to its (locked) connection.
///
/// Native driver errors are translated to [`OmpError::Database`] as they
/// surface. The message of the most recent failing operation is kept so the
/// scope can tell a driver failure from an error raised by the caller.
pub(crate) struct DriverCursor<'c, C: Connection> {
    conn: &'c mut C,
    cursor: C::Cursor,
    failure: Option<String>,
}

impl<'c, C: Connection> DriverCursor<'c, C> {
    pub(crate) fn new(conn: &'c mut C, cursor: C::Cursor) -> Self {
        Self {
            conn,
            cursor,
            failure: None,
        }
    }

    /// Release the connection borrow, returning the driver cursor and the
    /// pending driver failure, if the last operation failed.
    pub(crate) fn into_parts(self) -> (C::Cursor, Option<String>) {
        (self.cursor, self.failure)
    }

    fn track<T>(&mut self, result: Result<T, C::Error>) -> OmpResult<T> {
        match result {
            Ok(value) => {
                self.failure = None;
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                self.failure = Some(message.clone());
                Err(OmpError::Database(message))
            }
        }
    }
}

impl<C: Connection> Cursor for DriverCursor<'_, C> {
    fn execute(&mut self, statement: &str, params: &[Value]) -> OmpResult<()> {
        let result = self.conn.execute(&mut self.cursor, statement, params);
        self.track(result)
    }

    fn fetch_one(&mut self) -> OmpResult<Option<Row>> {
        let result = self.conn.fetch_one(&mut self.cursor);
        self.track(result)
    }

    fn fetch_all(&mut self) -> OmpResult<Vec<Row>> {
        let result = self.conn.fetch_all(&mut self.cursor);
        self.track(result)
    }

    fn description(&self) -> Option<&[Column]> {
        self.cursor.description()
    }

    fn row_count(&self) -> Option<u64> {
        self.cursor.row_count()
    }
}

/// Cursor decorator that refuses anything other than SELECT statements.
///
/// This is a guard against accidental writes through a read-only scope, not
/// a security boundary.
pub struct ReadOnlyCursor<'a> {
    inner: &'a mut dyn Cursor,
}

impl<'a> ReadOnlyCursor<'a> {
    pub fn new(inner: &'a mut dyn Cursor) -> Self {
        Self { inner }
    }
}

impl Cursor for ReadOnlyCursor<'_> {
    fn execute(&mut self, statement: &str, params: &[Value]) -> OmpResult<()> {
        if !is_select(statement) {
            return Err(OmpError::PolicyViolation(
                "non-select query in read-only transaction".to_string(),
            ));
        }
        self.inner.execute(statement, params)
    }

    fn fetch_one(&mut self) -> OmpResult<Option<Row>> {
        self.inner.fetch_one()
    }

    fn fetch_all(&mut self) -> OmpResult<Vec<Row>> {
        self.inner.fetch_all()
    }

    fn description(&self) -> Option<&[Column]> {
        self.inner.description()
    }

    fn row_count(&self) -> Option<u64> {
        self.inner.row_count()
    }
}
