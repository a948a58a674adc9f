//! Site configuration.
//!
//! The OMP tools read a single TOML site file describing the databases they
//! connect to and the credentials for external services. See [`SiteConfig`].

mod site;

pub use site::{
    DatabaseSettings, SiteConfig, SpaceTrackSettings, DEFAULT_SITE_CONFIG, SITE_CONFIG_ENV,
};
