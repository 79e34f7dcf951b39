//! Defines hash commitments used to commit to a value before opening it
//!
//! A commitment is `SHA3-256(blinder || value)` for a fresh 32 byte blinder

use rand::{CryptoRng, RngCore};
use sha3::{Digest, Sha3_256};

use crate::{algebra::ToBytes, error::MpcError, network::PartyId};

/// The number of bytes in a commitment blinder
pub const BLINDER_BYTES: usize = 32;
/// The number of bytes in a commitment
pub const COMMITMENT_BYTES: usize = 32;

/// A handle on a hash commitment, including the committed secret
#[derive(Clone, Debug)]
pub struct HashCommitment {
    /// The committed value
    value: Vec<u8>,
    /// The commitment blinder
    blinder: [u8; BLINDER_BYTES],
    /// The value of the commitment
    commitment: [u8; COMMITMENT_BYTES],
}

impl HashCommitment {
    /// Commit to the serialization of a value
    pub fn commit<T: ToBytes + ?Sized, R: RngCore + CryptoRng>(value: &T, rng: &mut R) -> Self {
        let mut blinder = [0u8; BLINDER_BYTES];
        rng.fill_bytes(&mut blinder);

        let value = value.to_bytes();
        let commitment = hash_opening(&blinder, &value);
        Self { value, blinder, commitment }
    }

    /// The commitment to send before the opening
    pub fn commitment(&self) -> [u8; COMMITMENT_BYTES] {
        self.commitment
    }

    /// The opening to send after all commitments are received, of the form
    /// `blinder || value`
    pub fn opening(&self) -> Vec<u8> {
        let mut opening = self.blinder.to_vec();
        opening.extend_from_slice(&self.value);
        opening
    }

    /// Verify that the given commitment is valid
    pub fn verify(&self) -> bool {
        hash_opening(&self.blinder, &self.value) == self.commitment
    }

    /// Check a peer's opening against its commitment, returning the
    /// committed value
    pub fn verify_opening(
        party: PartyId,
        commitment: &[u8],
        opening: &[u8],
    ) -> Result<Vec<u8>, MpcError> {
        if opening.len() < BLINDER_BYTES {
            return Err(MpcError::InvalidCommitment(party));
        }

        let (blinder, value) = opening.split_at(BLINDER_BYTES);
        if hash_opening(blinder, value).as_slice() != commitment {
            return Err(MpcError::InvalidCommitment(party));
        }

        Ok(value.to_vec())
    }
}

/// Hash a blinder and value into a commitment
fn hash_opening(blinder: &[u8], value: &[u8]) -> [u8; COMMITMENT_BYTES] {
    let mut hasher = Sha3_256::new();
    hasher.update(blinder);
    hasher.update(value);
    hasher.finalize().into()
}
