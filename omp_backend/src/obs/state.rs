//! OMP observation states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OmpError, OmpResult};

/// Quality state assigned to an observation in the OMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i64)]
pub enum ObsState {
    Good = 0,
    Questionable = 1,
    Bad = 2,
    Rejected = 3,
    Junk = 4,
}

impl ObsState {
    /// Every state, in code order.
    pub const ALL: [ObsState; 5] = [
        ObsState::Good,
        ObsState::Questionable,
        ObsState::Bad,
        ObsState::Rejected,
        ObsState::Junk,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Human-readable name of the state.
    pub fn name(self) -> &'static str {
        match self {
            ObsState::Good => "Good",
            ObsState::Questionable => "Questionable",
            ObsState::Bad => "Bad",
            ObsState::Rejected => "Rejected",
            ObsState::Junk => "Junk",
        }
    }

    pub fn from_code(code: i64) -> OmpResult<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.code() == code)
            .ok_or(OmpError::UnknownState(code))
    }

    /// Name of the state with the given code.
    pub fn name_of(code: i64) -> OmpResult<&'static str> {
        Self::from_code(code).map(Self::name)
    }

    pub fn is_valid(code: i64) -> bool {
        Self::from_code(code).is_ok()
    }

    /// Whether observations in this state are left out of co-adds.
    pub fn is_no_coadd(self) -> bool {
        matches!(self, ObsState::Junk | ObsState::Bad)
    }
}

impl fmt::Display for ObsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i64> for ObsState {
    type Error = OmpError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(ObsState::name_of(0).unwrap(), "Good");
        assert_eq!(ObsState::name_of(1).unwrap(), "Questionable");
        assert_eq!(ObsState::name_of(2).unwrap(), "Bad");
        assert_eq!(ObsState::name_of(3).unwrap(), "Rejected");
        assert_eq!(ObsState::name_of(4).unwrap(), "Junk");

        let err = ObsState::name_of(999).unwrap_err();
        assert!(matches!(err, OmpError::UnknownState(999)));
        assert_eq!(err.to_string(), "Unknown OMP state code 999");
    }

    #[test]
    fn test_is_valid() {
        assert!(!ObsState::is_valid(-1));
        assert!(ObsState::is_valid(0));
        assert!(ObsState::is_valid(4));
        assert!(!ObsState::is_valid(5));
    }

    #[test]
    fn test_no_coadd() {
        let no_coadd: Vec<_> = ObsState::ALL
            .into_iter()
            .filter(|s| s.is_no_coadd())
            .collect();
        assert_eq!(no_coadd, vec![ObsState::Bad, ObsState::Junk]);
    }

    #[test]
    fn test_codes_round_trip() {
        for state in ObsState::ALL {
            assert_eq!(ObsState::try_from(state.code()).unwrap(), state);
        }
    }
}
