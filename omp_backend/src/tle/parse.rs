//! NORAD two-line element set parsing.

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::TleError;

/// Target name prefix for NORAD catalogue objects.
pub const DEFAULT_PREFIX: &str = "NORAD";

/// A decoded two-line element set.
///
/// Angles are in radians and the epoch in seconds since 1970-01-01 UTC.
/// Fields the OMP does not use are kept as their raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tle {
    /// Prefixed, zero-padded catalogue number, e.g. `NORAD25544`.
    pub target: String,
    pub classification: String,
    pub intl_designator: String,
    pub epoch: f64,
    pub first_derivative: String,
    pub second_derivative: String,
    pub bstar: f64,
    pub elset_type: String,
    pub element_number: String,
    pub inclination: f64,
    pub ra_ascending_node: f64,
    pub eccentricity: f64,
    pub perigee: f64,
    pub mean_anomaly: f64,
    pub mean_motion: f64,
    pub rev_at_epoch: String,
}

/// Orbital elements in the layout of the OMP `omptle` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TleElements {
    pub target: String,
    /// Epoch (s since 1970-01-01).
    pub el1: f64,
    /// B* drag term.
    pub el2: f64,
    /// Inclination (rad).
    pub el3: f64,
    /// Right ascension of the ascending node (rad).
    pub el4: f64,
    /// Eccentricity.
    pub el5: f64,
    /// Argument of perigee (rad).
    pub el6: f64,
    /// Mean anomaly (rad).
    pub el7: f64,
    /// Mean motion (rev/day).
    pub el8: f64,
}

impl Tle {
    /// The elements stored by the OMP.
    pub fn export_omp(&self) -> TleElements {
        TleElements {
            target: self.target.clone(),
            el1: self.epoch,
            el2: self.bstar,
            el3: self.inclination,
            el4: self.ra_ascending_node,
            el5: self.eccentricity,
            el6: self.perigee,
            el7: self.mean_anomaly,
            el8: self.mean_motion,
        }
    }
}

/// Parser for two-line element sets.
#[derive(Debug, Clone)]
pub struct TleParser {
    prefix: String,
}

impl Default for TleParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Columns `range` of `line`, truncated to the line length.
fn column(line: &str, range: Range<usize>) -> &str {
    let end = range.end.min(line.len());
    let start = range.start.min(end);
    line.get(start..end).unwrap_or("")
}

fn float_field(field: &'static str, text: &str) -> Result<f64, TleError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| TleError::InvalidField {
            field,
            value: text.to_string(),
        })
}

impl TleParser {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Parser naming targets with a different catalogue prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Catalogue number of a target name produced by this parser.
    pub fn catalogue_id<'a>(&self, target: &'a str) -> Option<&'a str> {
        target
            .strip_prefix(self.prefix.as_str())
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Parse one element set.
    ///
    /// # Errors
    /// - [`TleError::Unparseable`] if line 1 is shorter than 62 characters
    ///   or line 2 shorter than 69.
    /// - [`TleError::InvalidIdentifier`] / [`TleError::IdentifierOutOfRange`]
    ///   for a catalogue number that is not an integer in `0..=99999`.
    /// - [`TleError::InvalidField`] for any other malformed number.
    pub fn parse_tle(&self, line1: &str, line2: &str) -> Result<Tle, TleError> {
        debug!("Parsing TLE, line 1: {}", line1);
        debug!("Parsing TLE, line 2: {}", line2);

        if line1.len() < 62 || line2.len() < 69 {
            return Err(TleError::Unparseable);
        }

        let id_text = column(line1, 2..7);
        let id: i64 = id_text
            .trim()
            .parse()
            .map_err(|_| TleError::InvalidIdentifier(id_text.to_string()))?;
        if !(0..=99_999).contains(&id) {
            return Err(TleError::IdentifierOutOfRange(id));
        }

        Ok(Tle {
            target: format!("{}{:05}", self.prefix, id),
            classification: column(line1, 7..8).to_string(),
            intl_designator: column(line1, 9..17).to_string(),
            epoch: Self::convert_epoch(column(line1, 18..32))?,
            first_derivative: column(line1, 33..43).to_string(),
            second_derivative: column(line1, 44..52).to_string(),
            bstar: Self::parse_decimal_rhs(column(line1, 53..61))?,
            elset_type: column(line1, 62..63).to_string(),
            element_number: column(line1, 64..68).to_string(),
            inclination: float_field("inclination", column(line2, 8..16))?.to_radians(),
            ra_ascending_node: float_field("ascending node", column(line2, 17..25))?
                .to_radians(),
            eccentricity: float_field("eccentricity", &format!("0.{}", column(line2, 26..33)))?,
            perigee: float_field("perigee", column(line2, 34..42))?.to_radians(),
            mean_anomaly: float_field("mean anomaly", column(line2, 43..51))?.to_radians(),
            mean_motion: float_field("mean motion", column(line2, 52..63))?,
            rev_at_epoch: column(line2, 63..68).to_string(),
        })
    }

    /// Convert a TLE epoch (`YYDDD.dddddddd`, two-digit year in the 2000s,
    /// day of year with fraction) into seconds since 1970-01-01 UTC.
    pub fn convert_epoch(epoch: &str) -> Result<f64, TleError> {
        let invalid = || TleError::InvalidField {
            field: "epoch",
            value: epoch.to_string(),
        };

        let epoch = epoch.trim();
        let (whole, fraction) = match epoch.find('.') {
            Some(dot) => (&epoch[..dot], &epoch[dot + 1..]),
            None => (epoch, ""),
        };
        let year: i32 = whole
            .get(..2)
            .and_then(|y| y.parse().ok())
            .ok_or_else(invalid)?;
        let day: u32 = whole
            .get(2..)
            .and_then(|d| d.parse().ok())
            .ok_or_else(invalid)?;
        let fraction: f64 = if fraction.is_empty() {
            0.0
        } else {
            format!("0.{}", fraction).parse().map_err(|_| invalid())?
        };

        let date = NaiveDate::from_yo_opt(2000 + year, day).ok_or_else(invalid)?;
        // NaiveDate::default() is 1970-01-01.
        let days = (date - NaiveDate::default()).num_days();
        Ok((fraction + days as f64) * 24.0 * 3600.0)
    }

    /// Parse a TLE-style truncated decimal (the digits after an implied
    /// leading decimal point, with an optional sign and exponent), e.g.
    /// `-91404-4` is -0.91404e-4.
    pub fn parse_decimal_rhs(decimal: &str) -> Result<f64, TleError> {
        let (sign, digits) = match decimal.as_bytes().first() {
            Some(b'-') => (-1.0, &decimal[1..]),
            Some(b'+') => (1.0, &decimal[1..]),
            _ => (1.0, decimal),
        };

        let mantissa = if digits.contains('-') {
            digits.replace('-', "E-")
        } else {
            digits.replace('+', "E+")
        };

        let value: f64 = format!("0.{}", mantissa.trim())
            .parse()
            .map_err(|_| TleError::InvalidField {
                field: "decimal",
                value: decimal.to_string(),
            })?;
        Ok(sign * value)
    }
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod parse_tests;
