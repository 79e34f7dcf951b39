//! The native protocols of the SPDZ suite
//!
//! Every protocol here is a round state machine driven by the evaluator.
//! Inputs are handles read in round 0, so a protocol may consume the output
//! of any protocol evaluated before it

mod conversion;
mod input;
mod mac_check;
mod multiply;
mod open;
mod opened_values;
mod random;

pub use conversion::*;
pub use input::*;
pub use mac_check::*;
pub use multiply::*;
pub use open::*;
pub use opened_values::*;
pub use random::*;

use std::sync::Arc;

use crate::{
    algebra::{Modulus, Scalar},
    error::MpcError,
};

/// Fail with a configuration error unless the modulus supports the boolean
/// representation
pub(crate) fn require_boolean(modulus: &Arc<Modulus>, op: &str) -> Result<(), MpcError> {
    if !modulus.supports_boolean() {
        return Err(MpcError::ConfigurationError(format!(
            "{op} requires a power of two ring, the computation runs over {modulus}"
        )));
    }

    Ok(())
}

/// Sum the elements each party sent, one element per message
pub(crate) fn sum_elements(
    messages: &[Vec<u8>],
    modulus: &Arc<Modulus>,
) -> Result<Scalar, MpcError> {
    messages.iter().try_fold(Scalar::zero(modulus), |acc, msg| {
        Ok(acc + Scalar::from_be_bytes(msg, modulus)?)
    })
}
