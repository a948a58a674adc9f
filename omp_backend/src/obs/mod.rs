//! Observation metadata.

mod state;

pub use state::ObsState;
