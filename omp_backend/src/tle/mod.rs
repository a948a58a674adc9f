//! Two-line element sets for artificial satellites.
//!
//! [`TleParser`] decodes the NORAD two-line format into a [`Tle`] and the
//! eight orbital elements stored by the OMP ([`TleElements`]).
//! [`SpaceTrack`] collects catalogue numbers and fetches current element
//! sets from space-track.org.

mod parse;
mod space_track;

pub use parse::{Tle, TleElements, TleParser, DEFAULT_PREFIX};
pub use space_track::{SpaceTrack, LOGIN_URL, MAX_REQUEST, QUERY_URL, REQUEST_DELAY};

/// Errors raised while handling TLE data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TleError {
    /// A line is too short to hold a TLE.
    #[error("unparseable TLE")]
    Unparseable,

    #[error("invalid identifier {0}")]
    InvalidIdentifier(String),

    #[error("identifier {0} out of range")]
    IdentifierOutOfRange(i64),

    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },

    /// Catalogue numbers have at most five digits.
    #[error("invalid NORAD catalogue id '{0}'")]
    InvalidCatalogueId(String),
}
