//! Defines algebraic MPC types and operations on them

mod macros;
mod modulus;
mod scalar;

pub use modulus::*;
pub use scalar::*;

/// Abstracts the process of binary serialization, used for commitments and
/// broadcast digests
pub trait ToBytes {
    /// Serialize the value to bytes
    fn to_bytes(&self) -> Vec<u8>;
}

impl ToBytes for u8 {
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self]
    }
}
