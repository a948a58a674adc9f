//! Lock and cursor management for a single shared database connection.
//!
//! Each manager exclusively owns one [`Connection`] behind a mutex. The only
//! way to reach the connection is a transaction scope: the caller supplies a
//! block of work which receives a [`Cursor`], and the manager takes care of
//! locking, commit or rollback, error translation, cursor cleanup and
//! unlocking.
//!
//! ```text
//! Idle ─policy─▶ LockHeld ─▶ CursorOpen ─▶ [caller block]
//!                                   │
//!            ┌──────────────────────┼──────────────────────┐
//!            ▼                      ▼                      ▼
//!       Committing             RollingBack               NoOp
//!            └──────────────────────┼──────────────────────┘
//!                                   ▼
//!                               Closing ─▶ LockReleased
//! ```
//!
//! The lock is a guard value, so `LockReleased` is reached from every state,
//! including panics inside the caller's block.
//!
//! # Example
//!
//! ```
//! use omp_rust::db::{Cursor, MemoryConnection, OmpError, OmpLock, Value};
//!
//! let lock = OmpLock::new(MemoryConnection::new(), true);
//! let rows = lock
//!     .transaction(false, |cursor: &mut dyn Cursor| {
//!         cursor.execute("SELECT 1", &[])?;
//!         cursor.fetch_all()
//!     })
//!     .unwrap();
//! assert_eq!(rows, vec![vec![Value::Int(1)]]);
//!
//! let denied = lock.transaction(true, |_: &mut dyn Cursor| Ok::<_, OmpError>(()));
//! assert!(matches!(denied, Err(OmpError::PolicyViolation(_))));
//! ```

use log::{debug, warn};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::connection::{Connection, Cursor, Transactional};
use super::cursor::{DriverCursor, ReadOnlyCursor};
use super::dialect::Dialect;
use crate::error::{OmpError, OmpResult};

/// Backend-agnostic access to transaction scopes.
///
/// Query layers are written against this trait so they run unchanged on
/// either manager variant.
pub trait Transact {
    /// Run `f` with a cursor while holding the connection lock.
    ///
    /// With `read_write` set, the work is committed if `f` succeeds and
    /// rolled back if it fails.
    fn transaction<T, E, F>(&self, read_write: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>;

    /// Dialect of the managed connection.
    fn dialect(&self) -> Dialect;
}

/// How the caller's block ended.
enum Outcome<T, E> {
    Success(T),
    /// The commit failed; carries the driver's message.
    DriverFailure(String),
    /// The block returned an error. `driver` is the message of the failed
    /// driver call that preceded it, if any; the error itself is returned
    /// to the caller unchanged.
    Failed { error: E, driver: Option<String> },
    Panicked(Box<dyn Any + Send>),
}

impl<T, E> Outcome<T, E> {
    fn classify(
        result: Result<Result<T, E>, Box<dyn Any + Send>>,
        driver_failure: Option<String>,
    ) -> Self {
        match result {
            Ok(Ok(value)) => Outcome::Success(value),
            Ok(Err(error)) => Outcome::Failed {
                error,
                driver: driver_failure,
            },
            Err(payload) => Outcome::Panicked(payload),
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Commit and rollback hooks of a read-write scope.
struct Finish<C: Connection> {
    begin: fn(&mut C) -> Result<(), C::Error>,
    commit: fn(&mut C) -> Result<(), C::Error>,
    rollback: fn(&mut C) -> Result<(), C::Error>,
}

impl<C: Transactional> Finish<C> {
    fn of() -> Self {
        Self {
            begin: C::begin,
            commit: C::commit,
            rollback: C::rollback,
        }
    }
}

/// Connection plus the mutual-exclusion guard serializing its use.
struct Guarded<C: Connection> {
    conn: Mutex<C>,
    dialect: Dialect,
    guard_statements: bool,
}

impl<C: Connection> Guarded<C> {
    fn new(conn: C) -> Self {
        let dialect = conn.dialect();
        let guard_statements = conn.guards_read_only();
        Self {
            conn: Mutex::new(conn),
            dialect,
            guard_statements,
        }
    }

    /// Lock, run `f` on a fresh cursor, commit or roll back, close the
    /// cursor and unlock. `finish` is present exactly when the scope is
    /// read-write.
    fn scope<T, E, F>(&self, finish: Option<Finish<C>>, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>,
    {
        let read_write = finish.is_some();
        let mut conn = self.conn.lock();
        debug!("Transaction scope entered (read_write={})", read_write);

        let state = conn
            .open_cursor()
            .map_err(|e| E::from(OmpError::Database(e.to_string())))?;

        if let Some(finish) = &finish {
            if let Err(e) = (finish.begin)(&mut *conn) {
                if let Err(close_err) = conn.close_cursor(state) {
                    warn!("Ignoring cursor close failure after failed begin: {}", close_err);
                }
                return Err(E::from(OmpError::Database(e.to_string())));
            }
        }

        let guard_statements = self.guard_statements && !read_write;
        let mut cursor = DriverCursor::new(&mut *conn, state);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            if guard_statements {
                f(&mut ReadOnlyCursor::new(&mut cursor))
            } else {
                f(&mut cursor)
            }
        }));
        let (state, driver_failure) = cursor.into_parts();
        let mut outcome = Outcome::classify(result, driver_failure);
        if let Outcome::Failed {
            driver: Some(message),
            ..
        } = &outcome
        {
            debug!("Transaction block failed after driver error: {}", message);
        }

        if let Some(finish) = &finish {
            outcome = match outcome {
                Outcome::Success(value) => match (finish.commit)(&mut *conn) {
                    Ok(()) => {
                        debug!("Transaction committed");
                        Outcome::Success(value)
                    }
                    Err(e) => {
                        let message = e.to_string();
                        roll_back(&mut *conn, finish);
                        Outcome::DriverFailure(message)
                    }
                },
                failed => {
                    roll_back(&mut *conn, finish);
                    failed
                }
            };
        }

        let close_result = conn.close_cursor(state);
        let result = match (outcome, close_result) {
            (Outcome::Success(value), Ok(())) => Ok(value),
            (Outcome::Success(_), Err(e)) => Err(E::from(OmpError::CursorClose(e.to_string()))),
            (failed, Err(e)) => {
                warn!("Ignoring cursor close failure while handling an error: {}", e);
                finish_failed(failed)
            }
            (failed, Ok(())) => finish_failed(failed),
        };

        drop(conn);
        debug!("Transaction scope released (read_write={})", read_write);
        result
    }

    fn is_locked(&self) -> bool {
        self.conn.is_locked()
    }

    fn close(self) -> OmpResult<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|e| OmpError::Database(e.to_string()))
    }
}

fn roll_back<C: Connection>(conn: &mut C, finish: &Finish<C>) {
    match (finish.rollback)(conn) {
        Ok(()) => debug!("Transaction rolled back"),
        Err(e) => warn!("Rollback failed while handling an error: {}", e),
    }
}

fn finish_failed<T, E: From<OmpError>>(outcome: Outcome<T, E>) -> Result<T, E> {
    debug_assert!(!outcome.is_success());
    match outcome {
        Outcome::DriverFailure(message) => Err(E::from(OmpError::Database(message))),
        Outcome::Failed { error, .. } => Err(error),
        Outcome::Panicked(payload) => panic::resume_unwind(payload),
        Outcome::Success(value) => Ok(value),
    }
}

/// Lock manager for backends with commit and rollback.
///
/// A manager built with `read_only` refuses every read-write scope before
/// the lock is touched.
pub struct OmpLock<C: Transactional> {
    inner: Guarded<C>,
    read_only: bool,
}

impl<C: Transactional> OmpLock<C> {
    pub fn new(conn: C, read_only: bool) -> Self {
        Self {
            inner: Guarded::new(conn),
            read_only,
        }
    }

    /// Run `f` inside a transaction scope.
    ///
    /// Read-write scopes commit when `f` returns `Ok` and roll back when it
    /// returns `Err` or panics. Read-only scopes reject non-SELECT statements
    /// if the backend asks for it.
    ///
    /// # Errors
    /// - [`OmpError::PolicyViolation`] if `read_write` is requested on a
    ///   read-only manager.
    /// - [`OmpError::Database`] if a driver call (or the commit) failed; the
    ///   driver's message is preserved.
    /// - [`OmpError::CursorClose`] if `f` succeeded but the cursor could not
    ///   be closed.
    /// - Any other error returned by `f`, unchanged.
    pub fn transaction<T, E, F>(&self, read_write: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>,
    {
        if read_write && self.read_only {
            return Err(E::from(OmpError::PolicyViolation(
                "attempt to open read_write transaction on read_only object".to_string(),
            )));
        }

        let finish = read_write.then(Finish::of);
        self.inner.scope(finish, f)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether a scope currently holds the connection.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Close the underlying connection.
    pub fn close(self) -> OmpResult<()> {
        self.inner.close()
    }
}

impl<C: Transactional> Transact for OmpLock<C> {
    fn transaction<T, E, F>(&self, read_write: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>,
    {
        OmpLock::transaction(self, read_write, f)
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect
    }
}

/// Lock manager for read-mostly backends without usable commit/rollback.
///
/// Scopes never commit or roll back; cleanup and error translation follow
/// the same rules as [`OmpLock`].
pub struct OmpReadLock<C: Connection> {
    inner: Guarded<C>,
}

impl<C: Connection> OmpReadLock<C> {
    pub fn new(conn: C) -> Self {
        Self {
            inner: Guarded::new(conn),
        }
    }

    /// Run `f` inside a read-only scope.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>,
    {
        self.inner.scope(None, f)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn close(self) -> OmpResult<()> {
        self.inner.close()
    }
}

impl<C: Connection> Transact for OmpReadLock<C> {
    fn transaction<T, E, F>(&self, read_write: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>,
    {
        if read_write {
            return Err(E::from(OmpError::PolicyViolation(
                "attempt to open read_write transaction on read-only backend".to_string(),
            )));
        }
        OmpReadLock::transaction(self, f)
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod lock_tests;
