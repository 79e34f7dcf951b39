//! The numeric vocabulary application code composes computations with
//!
//! Each capability is a small trait implemented by the protocol builder;
//! the derived operations in [`advanced`] are free functions over these
//! traits, so any builder that provides the primitives gets them as well

pub mod advanced;
mod spdz;

use std::sync::Arc;

use crate::{
    algebra::{Modulus, Scalar},
    error::MpcError,
    fabric::{
        AuthenticatedBitResult, AuthenticatedScalarResult, Deferred, GateContext, OpenedResult,
        ResultHandle, ScalarResult,
    },
    network::PartyId,
    offline_prep::TruncationPair,
};

/// Composition of sub-computations and local gates
pub trait Compose: Sized + 'static {
    /// Append a sub-computation whose steps run one after the other
    fn seq<D, F>(&mut self, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut Self) -> D + Send + 'static;

    /// Append a sub-computation whose steps are independent and share rounds
    fn par<D, F>(&mut self, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut Self) -> D + Send + 'static;

    /// Append a local computation over resolved handles
    fn gate<T, F>(&mut self, f: F) -> ResultHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&GateContext) -> Result<T, MpcError> + Send + 'static;
}

/// Arithmetic over authenticated shares
///
/// Every operation appends one step to the builder and reads its operands
/// when that step is evaluated
pub trait Numeric {
    /// The modulus of the computation
    fn modulus(&self) -> Arc<Modulus>;

    /// Add two shared values
    fn add(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &AuthenticatedScalarResult,
    ) -> AuthenticatedScalarResult;
    /// Add a public value to a shared value
    fn add_public(&mut self, a: &AuthenticatedScalarResult, b: &ScalarResult)
        -> AuthenticatedScalarResult;
    /// Subtract two shared values
    fn sub(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &AuthenticatedScalarResult,
    ) -> AuthenticatedScalarResult;
    /// Subtract a public value from a shared value
    fn sub_public(&mut self, a: &AuthenticatedScalarResult, b: &ScalarResult)
        -> AuthenticatedScalarResult;
    /// Negate a shared value
    fn negate(&mut self, a: &AuthenticatedScalarResult) -> AuthenticatedScalarResult;
    /// Multiply two shared values, consuming one triple
    fn mult(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &AuthenticatedScalarResult,
    ) -> AuthenticatedScalarResult;
    /// Multiply a shared value by a public value
    fn mult_public(&mut self, a: &AuthenticatedScalarResult, b: &ScalarResult)
        -> AuthenticatedScalarResult;

    /// A trivial sharing of a public constant
    fn known(&mut self, value: Scalar) -> AuthenticatedScalarResult;
    /// Share a private value of `party`; only that party passes `Some`
    fn input(&mut self, value: Option<Scalar>, party: PartyId) -> AuthenticatedScalarResult;
    /// Open a shared value to every party
    fn open(&mut self, a: &AuthenticatedScalarResult) -> ScalarResult;
    /// Open a shared value to `party` only
    fn open_to(&mut self, a: &AuthenticatedScalarResult, party: PartyId) -> OpenedResult;

    /// A shared random bit as an arithmetic `0` or `1`
    fn random_bit(&mut self) -> AuthenticatedScalarResult;
    /// A shared uniformly random element
    fn random_element(&mut self) -> AuthenticatedScalarResult;
}

/// Boolean operations over bit shares
///
/// Only available in power of two rings; over a field every operation fails
/// with a configuration error when evaluated
pub trait Logical {
    /// A trivial sharing of a public bit
    fn known_bit(&mut self, bit: bool) -> AuthenticatedBitResult;
    /// XOR two shared bits
    fn xor(&mut self, a: &AuthenticatedBitResult, b: &AuthenticatedBitResult)
        -> AuthenticatedBitResult;
    /// XOR a shared bit with a public bit
    fn xor_known(&mut self, a: &AuthenticatedBitResult, bit: bool) -> AuthenticatedBitResult;
    /// AND two shared bits, consuming one bit triple
    fn and(&mut self, a: &AuthenticatedBitResult, b: &AuthenticatedBitResult)
        -> AuthenticatedBitResult;
    /// AND a shared bit with a public bit
    fn and_known(&mut self, a: &AuthenticatedBitResult, bit: bool) -> AuthenticatedBitResult;
    /// Negate a shared bit
    fn not(&mut self, a: &AuthenticatedBitResult) -> AuthenticatedBitResult;
    /// Open a shared bit to every party
    fn open_bit(&mut self, a: &AuthenticatedBitResult) -> ResultHandle<bool>;

    /// Reinterpret the low bit of a shared element as a bit share
    fn to_boolean(&mut self, a: &AuthenticatedScalarResult) -> AuthenticatedBitResult;
    /// Convert a bit share to an arithmetic `0` or `1`
    fn to_arithmetic(&mut self, a: &AuthenticatedBitResult) -> AuthenticatedScalarResult;
    /// A shared random bit in the boolean representation
    fn random_bit_share(&mut self) -> AuthenticatedBitResult;
}

/// Access to the masks used for truncation
pub trait Truncation {
    /// A pair of masks for truncating by `d` bits
    fn truncation_pair(&mut self, d: u32) -> ResultHandle<TruncationPair>;
}

/// Fail unless a public value lives in the computation's modulus
pub(crate) fn check_public(value: &Scalar, modulus: &Arc<Modulus>) -> Result<(), MpcError> {
    if value.modulus() != modulus {
        return Err(MpcError::InvalidInput(format!(
            "public value over {} used in a computation over {modulus}",
            value.modulus()
        )));
    }

    Ok(())
}
