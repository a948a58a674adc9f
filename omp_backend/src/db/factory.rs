//! Backend factory.
//!
//! Opens the lock manager matching a [`DatabaseSettings`] entry of the site
//! configuration, so tools can stay agnostic of the driver in use.

use log::info;
use std::str::FromStr;

use super::backends::MemoryConnection;
use super::connection::Cursor;
use super::dialect::Dialect;
use super::lock::{OmpLock, Transact};
use crate::config::DatabaseSettings;
use crate::error::{OmpError, OmpResult};

#[cfg(feature = "postgres")]
use super::backends::PostgresConnection;
#[cfg(feature = "tds")]
use super::backends::{TdsConnection, TdsSettings};
#[cfg(feature = "tds")]
use super::lock::OmpReadLock;

/// Backend type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// PostgreSQL, transactional.
    Postgres,
    /// Sybase ASE or SQL Server over TDS, read-mostly.
    Tds,
    /// In-memory backend for tests and local development.
    Memory,
}

impl FromStr for BackendType {
    type Err = String;

    /// Parse a backend type from its configured driver name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "tds" | "sybase" | "mssql" | "sqlserver" => Ok(Self::Tds),
            "memory" | "test" => Ok(Self::Memory),
            _ => Err(format!("Unknown database driver: {}", s)),
        }
    }
}

impl BackendType {
    /// Whether support for this backend was compiled in.
    pub fn is_available(self) -> bool {
        match self {
            BackendType::Memory => true,
            BackendType::Postgres => cfg!(feature = "postgres"),
            BackendType::Tds => cfg!(feature = "tds"),
        }
    }
}

/// An opened lock manager over one of the compiled backends.
pub enum OmpBackend {
    Memory(OmpLock<MemoryConnection>),
    #[cfg(feature = "postgres")]
    Postgres(OmpLock<PostgresConnection>),
    #[cfg(feature = "tds")]
    Tds(OmpReadLock<TdsConnection>),
}

impl OmpBackend {
    /// Open the backend described by `settings`.
    ///
    /// # Errors
    /// - [`OmpError::Configuration`] if the settings are incomplete or name
    ///   a backend that was not compiled in.
    /// - [`OmpError::Connection`] if the server cannot be reached.
    pub fn open(settings: &DatabaseSettings) -> OmpResult<Self> {
        let backend_type = settings.backend_type()?;
        if !backend_type.is_available() {
            return Err(OmpError::Configuration(format!(
                "{:?} backend is not available in this build",
                backend_type
            )));
        }
        settings.validate("database")?;

        match backend_type {
            BackendType::Memory => Ok(Self::memory(settings)),
            BackendType::Postgres => Self::open_postgres(settings),
            BackendType::Tds => Self::open_tds(settings),
        }
    }

    fn memory(settings: &DatabaseSettings) -> Self {
        info!("Opening in-memory database");
        let conn = MemoryConnection::new().with_statement_guard(settings.guard_statements());
        OmpBackend::Memory(OmpLock::new(conn, settings.read_only))
    }

    #[cfg(feature = "postgres")]
    fn open_postgres(settings: &DatabaseSettings) -> OmpResult<Self> {
        info!("Connecting to Postgres database '{}'", settings.database);
        let conn = PostgresConnection::establish(&settings.postgres_url())
            .map_err(|e| OmpError::Connection(e.to_string()))?
            .with_statement_guard(settings.guard_statements());
        Ok(OmpBackend::Postgres(OmpLock::new(conn, settings.read_only)))
    }

    #[cfg(not(feature = "postgres"))]
    fn open_postgres(_settings: &DatabaseSettings) -> OmpResult<Self> {
        Err(OmpError::Configuration(
            "Postgres backend is not available in this build".to_string(),
        ))
    }

    #[cfg(feature = "tds")]
    fn open_tds(settings: &DatabaseSettings) -> OmpResult<Self> {
        info!("Connecting to TDS server {}", settings.server);
        let tds = TdsSettings {
            server: settings.server.clone(),
            port: settings.port_or_default(),
            database: (!settings.database.is_empty()).then(|| settings.database.clone()),
            user: settings.user.clone(),
            password: settings.password.clone(),
            trust_cert: settings.trust_cert,
        };
        let conn = TdsConnection::connect(&tds)
            .map_err(|e| OmpError::Connection(e.to_string()))?
            .with_statement_guard(settings.guard_statements());
        Ok(OmpBackend::Tds(OmpReadLock::new(conn)))
    }

    #[cfg(not(feature = "tds"))]
    fn open_tds(_settings: &DatabaseSettings) -> OmpResult<Self> {
        Err(OmpError::Configuration(
            "Tds backend is not available in this build".to_string(),
        ))
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            OmpBackend::Memory(_) => BackendType::Memory,
            #[cfg(feature = "postgres")]
            OmpBackend::Postgres(_) => BackendType::Postgres,
            #[cfg(feature = "tds")]
            OmpBackend::Tds(_) => BackendType::Tds,
        }
    }

    /// Whether read-write transactions are refused.
    pub fn is_read_only(&self) -> bool {
        match self {
            OmpBackend::Memory(lock) => lock.is_read_only(),
            #[cfg(feature = "postgres")]
            OmpBackend::Postgres(lock) => lock.is_read_only(),
            #[cfg(feature = "tds")]
            OmpBackend::Tds(_) => true,
        }
    }

    /// Fail early, before any other work, when the backend refuses
    /// read-write transactions.
    pub fn ensure_writable(&self) -> OmpResult<()> {
        if self.is_read_only() {
            return Err(OmpError::PolicyViolation(format!(
                "{:?} database is read-only; read-write access is required",
                self.backend_type()
            )));
        }
        Ok(())
    }

    /// Close the underlying connection.
    pub fn close(self) -> OmpResult<()> {
        match self {
            OmpBackend::Memory(lock) => lock.close(),
            #[cfg(feature = "postgres")]
            OmpBackend::Postgres(lock) => lock.close(),
            #[cfg(feature = "tds")]
            OmpBackend::Tds(lock) => lock.close(),
        }
    }
}

impl Transact for OmpBackend {
    fn transaction<T, E, F>(&self, read_write: bool, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Cursor) -> Result<T, E>,
        E: From<OmpError>,
    {
        match self {
            OmpBackend::Memory(lock) => lock.transaction(read_write, f),
            #[cfg(feature = "postgres")]
            OmpBackend::Postgres(lock) => lock.transaction(read_write, f),
            #[cfg(feature = "tds")]
            OmpBackend::Tds(lock) => Transact::transaction(lock, read_write, f),
        }
    }

    fn dialect(&self) -> Dialect {
        match self {
            OmpBackend::Memory(lock) => lock.dialect(),
            #[cfg(feature = "postgres")]
            OmpBackend::Postgres(lock) => lock.dialect(),
            #[cfg(feature = "tds")]
            OmpBackend::Tds(lock) => lock.dialect(),
        }
    }
}
