//! Defines the maliciously secure secret sharing primitive for the `Scalar`
//! type

use std::{
    ops::{Add, Mul, Neg, Sub},
    sync::Arc,
};

use itertools::Itertools;
use rand::{CryptoRng, RngCore};

use crate::{
    algebra::{
        macros::{forward_binop, forward_unop},
        Modulus,
    },
    error::{MpcError, MpcNetworkError},
    network::PartyId,
    PARTY1,
};

use super::Scalar;

// ------------
// | ShareMac |
// ------------

/// A type holding both a share and a MAC
///
/// Summed over all parties, the shares reconstruct a value `x` and the MACs
/// reconstruct `x * alpha` for the global MAC key `alpha`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarShare {
    /// The share
    pub(crate) share: Scalar,
    /// The mac
    pub(crate) mac: Scalar,
}

impl ScalarShare {
    /// Constructor
    pub fn new(share: Scalar, mac: Scalar) -> Self {
        Self { share, mac }
    }

    /// The zero sharing, valid for every party without interaction
    pub fn zero(modulus: &Arc<Modulus>) -> Self {
        Self::new(Scalar::zero(modulus), Scalar::zero(modulus))
    }

    /// The local party's sharing of a public constant
    pub fn from_public(value: &Scalar, mac_key_share: &Scalar, party_id: PartyId) -> Self {
        Self::zero(value.modulus()).add_public(value, mac_key_share, party_id)
    }

    /// Get the share
    pub fn share(&self) -> Scalar {
        self.share.clone()
    }

    /// Get the mac
    pub fn mac(&self) -> Scalar {
        self.mac.clone()
    }

    /// The modulus of the shared value
    pub fn modulus(&self) -> &Arc<Modulus> {
        self.share.modulus()
    }
}

// --------------
// | Arithmetic |
// --------------

// === Addition === //

impl ScalarShare {
    /// Add a public value to a scalar share
    ///
    /// Only the first party adjusts its share, every party adjusts its MAC
    /// by its share of the key times the constant
    pub fn add_public(&self, rhs: &Scalar, mac_key_share: &Scalar, party_id: PartyId) -> Self {
        let share = if party_id == PARTY1 { &self.share + rhs } else { self.share.clone() };
        ScalarShare::new(share, &self.mac + mac_key_share * rhs)
    }

    /// Subtract a public value from the share
    pub fn sub_public(&self, rhs: &Scalar, mac_key_share: &Scalar, party_id: PartyId) -> Self {
        self.add_public(&-rhs, mac_key_share, party_id)
    }
}

impl Add for &ScalarShare {
    type Output = ScalarShare;

    fn add(self, rhs: Self) -> Self::Output {
        ScalarShare::new(&self.share + &rhs.share, &self.mac + &rhs.mac)
    }
}
forward_binop!(ScalarShare, Add, add, +, ScalarShare);

// === Subtraction === //

impl Sub for &ScalarShare {
    type Output = ScalarShare;

    fn sub(self, rhs: Self) -> Self::Output {
        ScalarShare::new(&self.share - &rhs.share, &self.mac - &rhs.mac)
    }
}
forward_binop!(ScalarShare, Sub, sub, -, ScalarShare);

// === Negation === //

impl Neg for &ScalarShare {
    type Output = ScalarShare;

    fn neg(self) -> Self::Output {
        ScalarShare::new(-&self.share, -&self.mac)
    }
}
forward_unop!(ScalarShare, Neg, neg, -);

// === Multiplication == //

impl Mul<&Scalar> for &ScalarShare {
    type Output = ScalarShare;

    fn mul(self, rhs: &Scalar) -> Self::Output {
        ScalarShare::new(&self.share * rhs, &self.mac * rhs)
    }
}
forward_binop!(ScalarShare, Mul, mul, *, Scalar, commutative);

// -----------------
// | Serialization |
// -----------------

impl ScalarShare {
    /// Serialize as `share || mac`, each at the element width
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.share.to_bytes_be();
        bytes.extend(self.mac.to_bytes_be());
        bytes
    }

    /// Deserialize from `share || mac`
    pub fn from_bytes(bytes: &[u8], modulus: &Arc<Modulus>) -> Result<Self, MpcError> {
        let n_bytes = modulus.n_bytes();
        if bytes.len() != 2 * n_bytes {
            return Err(MpcNetworkError::SerializationError(format!(
                "expected {} bytes for a share, got {}",
                2 * n_bytes,
                bytes.len()
            ))
            .into());
        }

        let (share, mac) = bytes.split_at(n_bytes);
        Ok(Self::new(Scalar::from_be_bytes(share, modulus)?, Scalar::from_be_bytes(mac, modulus)?))
    }
}

// -----------
// | Dealing |
// -----------

/// Split a value into `n_parties` authenticated additive shares under the
/// given global MAC key
///
/// The share at index `i` belongs to party `i + 1`
pub fn share_value<R: RngCore + CryptoRng>(
    value: &Scalar,
    mac_key: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Vec<ScalarShare> {
    assert!(n_parties > 0, "cannot share among zero parties");
    let modulus = value.modulus();
    let mac = value * mac_key;

    let mut shares = (0..n_parties - 1).map(|_| Scalar::random(modulus, rng)).collect_vec();
    let mut macs = (0..n_parties - 1).map(|_| Scalar::random(modulus, rng)).collect_vec();

    let share_sum = shares.iter().fold(Scalar::zero(modulus), |acc, s| acc + s);
    let mac_sum = macs.iter().fold(Scalar::zero(modulus), |acc, m| acc + m);
    shares.push(value - share_sum);
    macs.push(mac - mac_sum);

    shares.into_iter().zip(macs).map(|(share, mac)| ScalarShare::new(share, mac)).collect_vec()
}

/// Split a value into `n_parties` additive shares without authentication
pub fn share_plain<R: RngCore + CryptoRng>(
    value: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Vec<Scalar> {
    assert!(n_parties > 0, "cannot share among zero parties");
    let modulus = value.modulus();

    let mut shares = (0..n_parties - 1).map(|_| Scalar::random(modulus, rng)).collect_vec();
    let sum = shares.iter().fold(Scalar::zero(modulus), |acc, s| acc + s);
    shares.push(value - sum);
    shares
}

/// Recombine all parties' shares into the value and its MAC
pub fn reconstruct(shares: &[ScalarShare]) -> (Scalar, Scalar) {
    assert!(!shares.is_empty(), "cannot reconstruct from zero shares");
    let modulus = shares[0].modulus();

    shares.iter().fold((Scalar::zero(modulus), Scalar::zero(modulus)), |(value, mac), share| {
        (value + &share.share, mac + &share.mac)
    })
}
