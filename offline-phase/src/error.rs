//! Error types for the offline phase
use std::{error::Error, fmt::Display};

use spdz_mpc::error::MpcError;

/// The error types for the offline phase
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DealerError {
    /// The dealer was asked for material it cannot produce
    InvalidParameters(String),
    /// Dealing a piece of material failed
    Dealing(MpcError),
    /// The supplier service thread could not be started
    SpawnError(String),
}

impl Display for DealerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DealerError::InvalidParameters(e) => write!(f, "invalid dealer parameters: {e}"),
            DealerError::Dealing(e) => write!(f, "error dealing material: {e}"),
            DealerError::SpawnError(e) => write!(f, "error starting supplier service: {e}"),
        }
    }
}
impl Error for DealerError {}

impl From<MpcError> for DealerError {
    fn from(err: MpcError) -> Self {
        DealerError::Dealing(err)
    }
}

impl From<DealerError> for MpcError {
    fn from(err: DealerError) -> Self {
        match err {
            DealerError::Dealing(e) => e,
            e => MpcError::ConfigurationError(e.to_string()),
        }
    }
}
