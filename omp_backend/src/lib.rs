//! OMP database access layer.
//!
//! Serialized, transactional access to the OMP and JCMT databases through
//! a single shared connection, plus the TLE tooling built on top of it.

pub mod config;
pub mod db;
pub mod error;
pub mod obs;
pub mod tle;

pub use error::{OmpError, OmpResult};
