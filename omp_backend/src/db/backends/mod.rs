//! Backend adapters implementing the [`Connection`](crate::db::Connection) seam.
//!
//! The in-memory backend is always compiled. Real database drivers are
//! opt-in through cargo features:
//!
//! | Feature    | Adapter                | Lock variant   |
//! |------------|------------------------|----------------|
//! | `postgres` | [`postgres`] (Diesel)  | `OmpLock`      |
//! | `tds`      | [`tds`] (Tiberius)     | `OmpReadLock`  |

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "tds")]
pub mod tds;

pub use memory::{ExecutedStatement, MemoryConnection, MemoryError, MemoryProbe, ResultSet};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnection, PostgresError};

#[cfg(feature = "tds")]
pub use tds::{TdsConnection, TdsError, TdsSettings};
