//! Driver seam and cursor capability traits.
//!
//! [`Connection`] is implemented once per backend and is only ever driven by
//! the lock managers in [`crate::db::lock`]; nothing outside a manager holds
//! a connection. [`Cursor`] is the capability handed to callers for the
//! duration of one unit of work.

use super::dialect::Dialect;
use super::value::{Column, Row, Value};
use crate::error::OmpResult;

/// State of one driver cursor, as exposed to callers.
pub trait CursorState: Send {
    /// Column descriptions of the most recent result set, if any.
    fn description(&self) -> Option<&[Column]>;

    /// Rows affected by the most recent statement, when the driver reports it.
    fn row_count(&self) -> Option<u64>;
}

/// A live link to a database server.
pub trait Connection: Send {
    /// Native error type of the underlying client library.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Driver cursor handle.
    type Cursor: CursorState;

    /// Statement dialect expected by this backend.
    fn dialect(&self) -> Dialect;

    /// Whether read-only scopes on this backend should reject non-SELECT
    /// statements before they reach the driver.
    fn guards_read_only(&self) -> bool {
        false
    }

    fn open_cursor(&mut self) -> Result<Self::Cursor, Self::Error>;

    fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &str,
        params: &[Value],
    ) -> Result<(), Self::Error>;

    fn fetch_one(&mut self, cursor: &mut Self::Cursor) -> Result<Option<Row>, Self::Error>;

    fn fetch_all(&mut self, cursor: &mut Self::Cursor) -> Result<Vec<Row>, Self::Error>;

    fn close_cursor(&mut self, cursor: Self::Cursor) -> Result<(), Self::Error>;

    /// Close the connection itself.
    fn close(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}

/// A connection whose driver supports explicit commit and rollback.
pub trait Transactional: Connection {
    /// Start a write transaction. Drivers that are always inside a
    /// transaction (autocommit off) keep the default no-op.
    fn begin(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Self::Error>;

    fn rollback(&mut self) -> Result<(), Self::Error>;
}

/// Cursor capability available inside a transaction scope.
pub trait Cursor {
    /// Submit one statement with positional parameters.
    fn execute(&mut self, statement: &str, params: &[Value]) -> OmpResult<()>;

    /// Next row of the current result set, or `None` once exhausted.
    fn fetch_one(&mut self) -> OmpResult<Option<Row>>;

    /// All remaining rows of the current result set.
    fn fetch_all(&mut self) -> OmpResult<Vec<Row>>;

    fn description(&self) -> Option<&[Column]>;

    fn row_count(&self) -> Option<u64>;
}
