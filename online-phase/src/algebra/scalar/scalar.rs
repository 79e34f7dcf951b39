//! Defines the ring/field element type that shares and opened values are
//! built from

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    sync::Arc,
};

use itertools::Itertools;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};

use crate::{
    algebra::{
        macros::{forward_binop, forward_unop},
        Modulus,
    },
    error::{MpcError, MpcNetworkError},
};

/// Error message when two elements from different moduli are combined
const ERR_MODULUS_MISMATCH: &str = "operands belong to different moduli";

// -----------
// | Scalars |
// -----------

/// An element of a prime field or a `2^k` ring
///
/// Elements are immutable values; every operation returns a new element in
/// canonical form `[0, m)` of the storage modulus. Reducing to `Z_{2^k}` is a
/// ring homomorphism, so ring arithmetic on stored values agrees with the
/// plaintext arithmetic after [`Scalar::to_plaintext`]
#[derive(Clone, PartialEq, Eq)]
pub struct Scalar {
    /// The canonical representative of the element
    value: BigUint,
    /// The modulus the element is reduced by
    modulus: Arc<Modulus>,
}

impl Scalar {
    /// Construct an element, reducing the given integer
    pub fn new(value: BigUint, modulus: &Arc<Modulus>) -> Self {
        Self { value: modulus.reduce(value), modulus: modulus.clone() }
    }

    /// The additive identity
    pub fn zero(modulus: &Arc<Modulus>) -> Self {
        Self { value: BigUint::zero(), modulus: modulus.clone() }
    }

    /// The multiplicative identity
    pub fn one(modulus: &Arc<Modulus>) -> Self {
        Self::new(BigUint::one(), modulus)
    }

    /// Construct an element from a `u64`
    pub fn from_u64(value: u64, modulus: &Arc<Modulus>) -> Self {
        Self::new(BigUint::from(value), modulus)
    }

    /// Construct the element `0` or `1` from a bit
    pub fn from_bit(bit: bool, modulus: &Arc<Modulus>) -> Self {
        if bit {
            Self::one(modulus)
        } else {
            Self::zero(modulus)
        }
    }

    /// Sample a uniformly random element
    pub fn random<R: RngCore + CryptoRng>(modulus: &Arc<Modulus>, rng: &mut R) -> Self {
        Self { value: rng.gen_biguint_below(modulus.value()), modulus: modulus.clone() }
    }

    /// Sample a uniformly random non-zero element
    pub fn random_nonzero<R: RngCore + CryptoRng>(modulus: &Arc<Modulus>, rng: &mut R) -> Self {
        loop {
            let candidate = Self::random(modulus, rng);
            if !candidate.is_zero() {
                return candidate;
            }
        }
    }

    /// The canonical representative of the element
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// The plaintext the element encodes
    ///
    /// Ring elements drop the bits above the plaintext width, field elements
    /// are returned as they are
    pub fn to_plaintext(&self) -> Self {
        Self { value: self.modulus.to_plaintext(&self.value), modulus: self.modulus.clone() }
    }

    /// The modulus of the element
    pub fn modulus(&self) -> &Arc<Modulus> {
        &self.modulus
    }

    /// Whether the element is zero
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// The low bit of the canonical representative
    ///
    /// For boolean-represented elements this is the encoded bit
    pub fn bit_value(&self) -> bool {
        self.value.bit(0)
    }

    /// The element `0` or `1` holding only the low bit, clearing the bits
    /// above it
    pub fn to_bit(&self) -> Self {
        Self::from_bit(self.bit_value(), &self.modulus)
    }

    /// Shift the canonical representative right by `bits`
    pub fn shr(&self, bits: u32) -> Self {
        Self { value: &self.value >> bits, modulus: self.modulus.clone() }
    }

    /// Compute the multiplicative inverse
    ///
    /// Defined for every non-zero field element, and for the odd elements of
    /// a `2^k` ring
    pub fn inverse(&self) -> Result<Self, MpcError> {
        self.value
            .modinv(self.modulus.value())
            .map(|value| Self { value, modulus: self.modulus.clone() })
            .ok_or_else(|| {
                MpcError::ArithmeticError(format!("{self} is not invertible in {}", self.modulus))
            })
    }

    /// Divide by another element
    pub fn div(&self, rhs: &Scalar) -> Result<Self, MpcError> {
        Ok(self * rhs.inverse()?)
    }

    /// Raise the element to the given power
    pub fn pow(&self, exp: u64) -> Self {
        let value = self.value.modpow(&BigUint::from(exp), self.modulus.value());
        Self { value, modulus: self.modulus.clone() }
    }

    /// Check that two elements share a modulus
    fn assert_same_modulus(&self, rhs: &Scalar) {
        assert!(
            Arc::ptr_eq(&self.modulus, &rhs.modulus) || self.modulus == rhs.modulus,
            "{}",
            ERR_MODULUS_MISMATCH
        );
    }
}

// ------------------
// | Serialization |
// ------------------

impl Scalar {
    /// Convert to a fixed width big-endian byte buffer, zero padded on the left
    pub fn to_bytes_be(&self) -> Vec<u8> {
        let n_bytes = self.modulus.n_bytes();
        let bytes = self.value.to_bytes_be();

        let mut res = vec![0u8; n_bytes];
        if !self.is_zero() {
            res[n_bytes - bytes.len()..].copy_from_slice(&bytes);
        }

        res
    }

    /// Construct an element from big-endian bytes of any length, reducing
    /// modulo the modulus
    pub fn from_be_bytes_mod_order(bytes: &[u8], modulus: &Arc<Modulus>) -> Self {
        Self::new(BigUint::from_bytes_be(bytes), modulus)
    }

    /// Construct an element from a buffer of exactly the serialized width
    ///
    /// Any buffer of the correct width is accepted and reduced
    pub fn from_be_bytes(bytes: &[u8], modulus: &Arc<Modulus>) -> Result<Self, MpcError> {
        if bytes.len() != modulus.n_bytes() {
            return Err(MpcNetworkError::SerializationError(format!(
                "expected {} bytes for an element, got {}",
                modulus.n_bytes(),
                bytes.len()
            ))
            .into());
        }

        Ok(Self::from_be_bytes_mod_order(bytes, modulus))
    }

    /// Serialize a batch of elements as a concatenation of fixed width buffers
    pub fn batch_to_bytes_be(values: &[Scalar]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_bytes_be()).collect_vec()
    }

    /// Deserialize a concatenation of fixed width buffers
    pub fn batch_from_be_bytes(
        bytes: &[u8],
        modulus: &Arc<Modulus>,
    ) -> Result<Vec<Self>, MpcError> {
        let n_bytes = modulus.n_bytes();
        if bytes.len() % n_bytes != 0 {
            return Err(MpcNetworkError::SerializationError(format!(
                "{} bytes is not a whole number of {n_bytes} byte elements",
                bytes.len()
            ))
            .into());
        }

        Ok(bytes
            .chunks_exact(n_bytes)
            .map(|chunk| Self::from_be_bytes_mod_order(chunk, modulus))
            .collect())
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.value)
    }
}

impl Debug for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Scalar({} mod {})", self.value, self.modulus)
    }
}

// --------------
// | Arithmetic |
// --------------

// === Addition === //

impl Add<&Scalar> for &Scalar {
    type Output = Scalar;

    fn add(self, rhs: &Scalar) -> Self::Output {
        self.assert_same_modulus(rhs);
        Scalar::new(&self.value + &rhs.value, &self.modulus)
    }
}
forward_binop!(Scalar, Add, add, +, Scalar);

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Scalar) {
        *self = &*self + rhs;
    }
}

// === Subtraction === //

impl Sub<&Scalar> for &Scalar {
    type Output = Scalar;

    fn sub(self, rhs: &Scalar) -> Self::Output {
        self + (-rhs)
    }
}
forward_binop!(Scalar, Sub, sub, -, Scalar);

impl SubAssign for Scalar {
    fn sub_assign(&mut self, rhs: Scalar) {
        *self = &*self - rhs;
    }
}

// === Multiplication === //

impl Mul<&Scalar> for &Scalar {
    type Output = Scalar;

    fn mul(self, rhs: &Scalar) -> Self::Output {
        self.assert_same_modulus(rhs);
        Scalar::new(&self.value * &rhs.value, &self.modulus)
    }
}
forward_binop!(Scalar, Mul, mul, *, Scalar);

// === Negation === //

impl Neg for &Scalar {
    type Output = Scalar;

    fn neg(self) -> Self::Output {
        if self.is_zero() {
            return self.clone();
        }

        Scalar { value: self.modulus.value() - &self.value, modulus: self.modulus.clone() }
    }
}
forward_unop!(Scalar, Neg, neg, -);
