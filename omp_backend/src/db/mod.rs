//! Database access for the OMP and JCMT header databases.
//!
//! All traffic goes through a single long-lived connection per backend,
//! owned by a lock manager that serializes access and wraps every unit of
//! work in a transaction scope.
//!
//! # Architecture
//!
//! The database module follows a layered architecture:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Tools (omp-tle, ingestion scripts)                     │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Query Layer (omp.rs, tle.rs) - Statements              │
//! │  - Dialect-aware placeholders and table names           │
//! │  - One transaction scope per operation                  │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Lock Managers (lock.rs) - Transact trait               │
//! │  - OmpLock: transactional, optional read-only policy    │
//! │  - OmpReadLock: read-only backends                      │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼─────────────────┐
//!     │               │                 │
//! ┌───▼────────┐ ┌────▼─────────┐ ┌─────▼──────────┐
//! │ PostgreSQL │ │ TDS (Sybase) │ │ Memory         │
//! │ (diesel)   │ │ (tiberius)   │ │ (tests)        │
//! └────────────┘ └──────────────┘ └────────────────┘
//! ```
//!
//! # Modules
//! - `lock`: the lock managers and the [`Transact`] trait
//! - `connection`: driver traits implemented by each backend
//! - `cursor`: cursors handed to transaction blocks
//! - `backends`: driver implementations
//! - `factory`: opens the backend named in the site configuration
//! - `omp`, `tle`: statements for the OMP and JCMT tables
//!
//! # Recommended Usage
//!
//! ```no_run
//! use omp_rust::config::SiteConfig;
//! use omp_rust::db::{OmpBackend, OmpDb};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SiteConfig::load()?;
//!     let db = OmpDb::new(OmpBackend::open(config.database()?)?);
//!     let state = db.get_obsid_status("scuba2_00012_20140401T081422")?;
//!     println!("{:?}", state);
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod factory;
pub mod lock;
pub mod omp;
pub mod tle;
pub mod value;

pub use backends::{ExecutedStatement, MemoryConnection, MemoryError, MemoryProbe, ResultSet};
pub use connection::{Connection, Cursor, CursorState, Transactional};
pub use cursor::{is_select, ReadOnlyCursor};
pub use dialect::{Dialect, Params};
pub use factory::{BackendType, OmpBackend};
pub use lock::{OmpLock, OmpReadLock, Transact};
pub use omp::{IngestionQuery, OmpDb};
pub use tle::{TleDb, AUTO_TLE};
pub use value::{Column, Record, Row, Value};

#[cfg(feature = "postgres")]
pub use backends::{PostgresConnection, PostgresError};
#[cfg(feature = "tds")]
pub use backends::{TdsConnection, TdsError, TdsSettings};

// Re-export error types for convenience
pub use crate::error::{OmpError, OmpResult};
