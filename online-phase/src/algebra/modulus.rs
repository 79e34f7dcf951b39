//! Defines the runtime descriptor of the ring or field that elements live in

use std::fmt::{Display, Formatter, Result as FmtResult};

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::MpcError;

/// The bases used as Miller-Rabin witnesses when validating a prime modulus
///
/// These are deterministic for all moduli below 2^64 and give an error
/// probability below 4^-20 above that
const MILLER_RABIN_BASES: [u32; 20] =
    [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71];

/// The number of bits a ring element carries above its plaintext width
///
/// Shares, MACs and the MAC key of `Z_{2^k}` live in `Z_{2^(k + s)}` for this
/// `s`, so that an additive error reaching the plaintext bits survives
/// multiplication by the key and the check coefficients
pub const RING_SECURITY_BITS: u32 = 64;

/// The structure of the modulus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModulusKind {
    /// A prime field `Z_p`
    Prime,
    /// The ring `Z_{2^k}` with the given plaintext width `k`
    PowerOfTwo(u32),
}

/// A ring or field modulus, threaded through every element explicitly
///
/// For a ring `Z_{2^k}` elements are stored modulo `2^(k + s)` with `s` the
/// [`RING_SECURITY_BITS`]; the plaintext is the stored value modulo `2^k`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modulus {
    /// The modulus elements are stored and computed under
    value: BigUint,
    /// Whether the modulus is a prime or a power of two
    kind: ModulusKind,
    /// The fixed width of a serialized element
    n_bytes: usize,
}

impl Modulus {
    /// Construct a prime field modulus, validating primality
    pub fn prime(value: BigUint) -> Result<Self, MpcError> {
        if !is_probable_prime(&value) {
            return Err(MpcError::ConfigurationError(format!("modulus {value} is not prime")));
        }

        Ok(Self::new_unchecked(value, ModulusKind::Prime))
    }

    /// Construct the ring `Z_{2^k}`
    ///
    /// At least two bits are required so that boolean values can be masked
    /// above their low bit
    pub fn power_of_two(bits: u32) -> Result<Self, MpcError> {
        if bits < 2 {
            return Err(MpcError::ConfigurationError(format!(
                "ring of {bits} bits is too small, at least 2 are required"
            )));
        }

        let storage = BigUint::one() << (bits + RING_SECURITY_BITS);
        Ok(Self::new_unchecked(storage, ModulusKind::PowerOfTwo(bits)))
    }

    /// Build the descriptor without validation
    fn new_unchecked(value: BigUint, kind: ModulusKind) -> Self {
        let max_element = &value - 1u32;
        let n_bytes = ((max_element.bits() as usize) + 7) / 8;

        Self { value, kind, n_bytes: n_bytes.max(1) }
    }

    /// The modulus elements are stored and computed under
    ///
    /// This is `p` for a field and `2^(k + s)` for a ring `Z_{2^k}`
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// The structure of the modulus
    pub fn kind(&self) -> ModulusKind {
        self.kind
    }

    /// Whether the modulus describes a field
    pub fn is_field(&self) -> bool {
        self.kind == ModulusKind::Prime
    }

    /// Whether boolean values may be packed into the low bit of an element
    pub fn supports_boolean(&self) -> bool {
        matches!(self.kind, ModulusKind::PowerOfTwo(_))
    }

    /// The number of bits in the plaintext domain
    ///
    /// This is `k` for a ring `Z_{2^k}`, and the bit length of `p - 1` for a
    /// field
    pub fn bit_length(&self) -> u64 {
        match self.kind {
            ModulusKind::PowerOfTwo(bits) => u64::from(bits),
            ModulusKind::Prime => (&self.value - 1u32).bits(),
        }
    }

    /// Reduce a stored representative to its plaintext
    ///
    /// Clears the bits of a ring element above `k`, fields are unchanged
    pub fn to_plaintext(&self, value: &BigUint) -> BigUint {
        match self.kind {
            ModulusKind::PowerOfTwo(bits) => value & ((BigUint::one() << bits) - 1u32),
            ModulusKind::Prime => value.clone(),
        }
    }

    /// The number of bytes in a serialized element
    pub fn n_bytes(&self) -> usize {
        self.n_bytes
    }

    /// Reduce an integer into the canonical range `[0, m)`
    pub fn reduce(&self, value: BigUint) -> BigUint {
        if value < self.value {
            return value;
        }

        match self.kind {
            ModulusKind::PowerOfTwo(_) => value & (&self.value - 1u32),
            ModulusKind::Prime => value % &self.value,
        }
    }
}

impl Display for Modulus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            ModulusKind::Prime => write!(f, "Z_{}", self.value),
            ModulusKind::PowerOfTwo(bits) => write!(f, "Z_2^{bits}"),
        }
    }
}

/// Miller-Rabin primality test over a fixed set of witnesses
pub(crate) fn is_probable_prime(n: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }

    for base in MILLER_RABIN_BASES {
        let base = BigUint::from(base);
        if n == &base {
            return true;
        }
        if (n % &base).is_zero() {
            return false;
        }
    }

    // Write n - 1 = d * 2^s with d odd
    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for base in MILLER_RABIN_BASES {
        let mut x = BigUint::from(base).modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }

        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use num_bigint::BigUint;

    use super::{is_probable_prime, Modulus, ModulusKind, RING_SECURITY_BITS};

    /// Tests primality checks against known primes and composites
    #[test]
    fn test_primality() {
        for p in [2u64, 3, 251, 65521, (1 << 61) - 1] {
            assert!(is_probable_prime(&BigUint::from(p)), "{p} is prime");
        }

        // 561 is a Carmichael number
        for c in [0u64, 1, 4, 561, 65535, 1 << 61] {
            assert!(!is_probable_prime(&BigUint::from(c)), "{c} is composite");
        }

        let m127 = (BigUint::from(1u8) << 127u32) - 1u32;
        assert!(is_probable_prime(&m127));
    }

    /// Tests the byte width of various moduli
    #[test]
    fn test_byte_width() {
        let m = Modulus::prime(BigUint::from(251u32)).unwrap();
        assert_eq!(m.n_bytes(), 1);

        let m = Modulus::prime(BigUint::from(65521u32)).unwrap();
        assert_eq!(m.n_bytes(), 2);

        // 2^16 + 1 needs a third byte for its largest element
        let m = Modulus::prime(BigUint::from(65537u32)).unwrap();
        assert_eq!(m.n_bytes(), 3);

        // Ring elements carry the security bits on the wire
        let m = Modulus::power_of_two(64).unwrap();
        assert_eq!(m.n_bytes(), 16);
        assert_eq!(m.bit_length(), 64);
        assert_eq!(m.kind(), ModulusKind::PowerOfTwo(64));
        assert!(m.supports_boolean());

        let bn254 = BigUint::from_str(
            "21888242871839275222246405745257275088548364400416034343698204186575808495617",
        )
        .unwrap();
        let m = Modulus::prime(bn254).unwrap();
        assert_eq!(m.n_bytes(), 32);
        assert!(!m.supports_boolean());
    }

    /// Tests that a ring element reduces to its low `k` bits
    #[test]
    fn test_ring_plaintext() {
        let m = Modulus::power_of_two(8).unwrap();
        assert_eq!(m.value(), &(BigUint::from(1u8) << (8 + RING_SECURITY_BITS)));

        let stored = (BigUint::from(0xabu32) << 8u32) + 0x17u32;
        assert_eq!(m.to_plaintext(&stored), BigUint::from(0x17u32));

        let p = Modulus::prime(BigUint::from(251u32)).unwrap();
        assert_eq!(p.to_plaintext(&BigUint::from(250u32)), BigUint::from(250u32));
    }

    /// Tests that invalid moduli are rejected
    #[test]
    fn test_invalid_modulus() {
        assert!(Modulus::prime(BigUint::from(250u32)).is_err());
        assert!(Modulus::power_of_two(1).is_err());
    }
}
