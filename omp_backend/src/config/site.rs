//! Site configuration file support.
//!
//! The site file is TOML with one table per resource:
//!
//! ```toml
//! [database]
//! driver = "postgres"
//! server = "omp-db.example"
//! database = "omp"
//! user = "staff"
//! password = "..."
//!
//! [hdr_database]
//! driver = "tds"
//! server = "sybase.example"
//! port = 5000
//! user = "reader"
//! password = "..."
//! read_only = true
//!
//! [spacetrack]
//! user = "someone@example.org"
//! password = "..."
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::factory::BackendType;
use crate::error::{OmpError, OmpResult};

/// Environment variable naming the site configuration file.
pub const SITE_CONFIG_ENV: &str = "OMP_SITE_CONFIG";

/// Site configuration file used when [`SITE_CONFIG_ENV`] is not set.
pub const DEFAULT_SITE_CONFIG: &str = "/jac_sw/etc/ompsite.toml";

/// Parsed site configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// The OMP database.
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    /// The header (archive) database.
    #[serde(default)]
    pub hdr_database: Option<DatabaseSettings>,
    #[serde(default)]
    pub spacetrack: Option<SpaceTrackSettings>,
}

/// Connection settings for one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Backend driver name, e.g. `postgres`, `tds` or `memory`.
    pub driver: String,
    #[serde(default)]
    pub server: String,
    /// Server port; the driver's default port when absent.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Full connection URL. Overrides the individual Postgres settings.
    #[serde(default)]
    pub url: Option<String>,
    /// Refuse read-write transactions on this database.
    #[serde(default)]
    pub read_only: bool,
    /// Accept the server's TLS certificate without verification (TDS).
    #[serde(default)]
    pub trust_cert: bool,
    /// Reject non-SELECT statements in read-only transactions before they
    /// reach the server. Defaults to on.
    #[serde(default)]
    pub guard_statements: Option<bool>,
}

/// Credentials for space-track.org.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SpaceTrackSettings {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for SpaceTrackSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceTrackSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SiteConfig {
    /// Parse a site configuration from TOML text.
    ///
    /// Errors name the offending key, e.g. `database.port`.
    pub fn parse(content: &str) -> OmpResult<Self> {
        let deserializer = toml::Deserializer::new(content);
        serde_path_to_error::deserialize(deserializer).map_err(|e| {
            OmpError::Configuration(format!(
                "Failed to parse site config at '{}': {}",
                e.path(),
                e.inner()
            ))
        })
    }

    /// Load a site configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> OmpResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            OmpError::Configuration(format!(
                "Failed to read site config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Path of the site configuration file: `$OMP_SITE_CONFIG` or the
    /// default location.
    pub fn location() -> PathBuf {
        std::env::var_os(SITE_CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SITE_CONFIG))
    }

    /// Load the site configuration from [`SiteConfig::location`].
    pub fn load() -> OmpResult<Self> {
        Self::from_file(Self::location())
    }

    /// Validated settings of the OMP database.
    pub fn database(&self) -> OmpResult<&DatabaseSettings> {
        section(self.database.as_ref(), "database")
    }

    /// Validated settings of the header database.
    pub fn hdr_database(&self) -> OmpResult<&DatabaseSettings> {
        section(self.hdr_database.as_ref(), "hdr_database")
    }

    pub fn spacetrack(&self) -> OmpResult<&SpaceTrackSettings> {
        let settings = self.spacetrack.as_ref().ok_or_else(|| {
            OmpError::Configuration("site config has no [spacetrack] section".to_string())
        })?;
        if settings.user.is_empty() || settings.password.is_empty() {
            return Err(OmpError::Configuration(
                "[spacetrack] requires 'user' and 'password'".to_string(),
            ));
        }
        Ok(settings)
    }
}

fn section<'a>(
    settings: Option<&'a DatabaseSettings>,
    name: &str,
) -> OmpResult<&'a DatabaseSettings> {
    let settings = settings.ok_or_else(|| {
        OmpError::Configuration(format!("site config has no [{}] section", name))
    })?;
    settings.validate(name)?;
    Ok(settings)
}

impl DatabaseSettings {
    /// Settings for an in-memory database.
    pub fn memory() -> Self {
        Self {
            driver: "memory".to_string(),
            ..Self::default()
        }
    }

    pub fn backend_type(&self) -> OmpResult<BackendType> {
        self.driver
            .parse::<BackendType>()
            .map_err(OmpError::Configuration)
    }

    /// Check that the fields required by the configured driver are present.
    /// `section` names the table in error messages.
    pub fn validate(&self, section: &str) -> OmpResult<()> {
        let require = |value: &str, key: &str| {
            if value.is_empty() {
                Err(OmpError::Configuration(format!(
                    "{} backend requires '{}.{}'",
                    self.driver, section, key
                )))
            } else {
                Ok(())
            }
        };

        match self.backend_type()? {
            BackendType::Memory => Ok(()),
            BackendType::Postgres => {
                if self.url.as_deref().is_some_and(|url| !url.is_empty()) {
                    return Ok(());
                }
                require(&self.server, "server")?;
                require(&self.database, "database")?;
                require(&self.user, "user")
            }
            BackendType::Tds => {
                require(&self.server, "server")?;
                require(&self.user, "user")
            }
        }
    }

    /// Port to connect to, falling back to the driver's default.
    pub fn port_or_default(&self) -> u16 {
        match (self.port, self.backend_type()) {
            (Some(port), _) => port,
            (None, Ok(BackendType::Tds)) => 5000,
            (None, _) => 5432,
        }
    }

    /// Postgres connection URL: `url` when configured, otherwise built
    /// from the individual settings. Passwords containing URL-reserved
    /// characters must be given through `url`.
    pub fn postgres_url(&self) -> String {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user,
                self.password,
                self.server,
                self.port_or_default(),
                self.database
            ),
        }
    }

    pub fn guard_statements(&self) -> bool {
        self.guard_statements.unwrap_or(true)
    }
}
