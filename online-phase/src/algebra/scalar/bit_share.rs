//! Defines the boolean representation of a shared value
//!
//! A bit is packed into the low bit of a `2^k` ring element; the bits above
//! it carry no meaning. Because carries only propagate upwards, adding two
//! ring elements XORs their low bits, so XOR and NOT are local operations

use std::sync::Arc;

use crate::{algebra::Modulus, network::PartyId};

use super::{Scalar, ScalarShare};

/// An authenticated share of a single bit packed into a ring element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitShare(pub(crate) ScalarShare);

impl BitShare {
    /// Reinterpret an arithmetic share as a boolean share of its low bit
    ///
    /// This is the local, lossy half of the domain conversion
    pub fn from_arithmetic(share: ScalarShare) -> Self {
        Self(share)
    }

    /// The local party's sharing of a public bit
    pub fn from_public(bit: bool, mac_key_share: &Scalar, party_id: PartyId) -> Self {
        let modulus = mac_key_share.modulus();
        Self(ScalarShare::from_public(&Scalar::from_bit(bit, modulus), mac_key_share, party_id))
    }

    /// The underlying ring element share
    pub fn inner(&self) -> &ScalarShare {
        &self.0
    }

    /// The modulus of the underlying ring
    pub fn modulus(&self) -> &Arc<Modulus> {
        self.0.modulus()
    }

    /// XOR two shared bits
    pub fn xor(&self, rhs: &BitShare) -> Self {
        Self(&self.0 + &rhs.0)
    }

    /// XOR a shared bit with a public bit
    pub fn xor_public(&self, bit: bool, mac_key_share: &Scalar, party_id: PartyId) -> Self {
        let rhs = Scalar::from_bit(bit, self.modulus());
        Self(self.0.add_public(&rhs, mac_key_share, party_id))
    }

    /// AND a shared bit with a public bit
    pub fn and_public(&self, bit: bool) -> Self {
        if bit {
            self.clone()
        } else {
            Self(ScalarShare::zero(self.modulus()))
        }
    }

    /// Negate a shared bit
    pub fn not(&self, mac_key_share: &Scalar, party_id: PartyId) -> Self {
        self.xor_public(true, mac_key_share, party_id)
    }
}
