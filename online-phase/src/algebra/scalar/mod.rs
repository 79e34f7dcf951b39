//! Scalar type arithmetic with shared authenticated and plaintext types, in
//! both the arithmetic and the boolean representation
#![allow(clippy::module_inception)]

mod bit_share;
mod scalar;
mod share;

pub use bit_share::*;
pub use scalar::*;
pub use share::*;

use super::ToBytes;

impl ToBytes for Scalar {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_be()
    }
}

impl ToBytes for ScalarShare {
    fn to_bytes(&self) -> Vec<u8> {
        ScalarShare::to_bytes(self)
    }
}

impl<T: ToBytes> ToBytes for [T] {
    fn to_bytes(&self) -> Vec<u8> {
        self.iter().flat_map(ToBytes::to_bytes).collect()
    }
}
