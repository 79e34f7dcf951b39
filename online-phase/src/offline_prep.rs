//! Defines the interface through which the online phase consumes correlated
//! randomness, the dealing functions that produce consistent material for
//! every party, and a seeded dummy supplier for testing

use std::sync::Arc;

use itertools::Itertools;
use num_bigint::RandBigInt;
use rand::{CryptoRng, RngCore};

use crate::{
    algebra::{share_value, Modulus, Scalar, ScalarShare},
    error::MpcError,
    network::PartyId,
};

// ---------
// | Types |
// ---------

/// A Beaver triple `(a, b, c)` with `a * b = c`
///
/// For boolean triples the relation holds on the low bits only and the bits
/// above are uniformly random
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triple {
    /// The share of `a`
    pub left: ScalarShare,
    /// The share of `b`
    pub right: ScalarShare,
    /// The share of `c`
    pub product: ScalarShare,
}

/// A mask used to secret share an input
///
/// Only the party providing the input learns the value of the mask
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputMask {
    /// The local share of the mask
    pub mask_share: ScalarShare,
    /// The mask in the clear, present only for the inputting party
    pub open_value: Option<Scalar>,
}

/// A pair of shared values `(r', r)` with `r = floor(r' / 2^d)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TruncationPair {
    /// The share of the full width mask `r'`
    pub r_prime: ScalarShare,
    /// The share of the truncated mask `r`
    pub r: ScalarShare,
}

// ---------
// | Trait |
// ---------

/// PreprocessingPhase implements both the functionality for:
///     1. Input authentication and sharing
///     2. Shared values from the pre-processing phase
///
/// Every draw consumes the material it returns; running out is a fatal error
/// for the computation in progress
pub trait PreprocessingPhase: Send {
    /// The ring or field the material is shared over
    fn modulus(&self) -> Arc<Modulus>;
    /// Get the local party's share of the mac key
    fn mac_key_share(&self) -> Scalar;

    // === Input Authentication === //
    /// Get the next input mask for values provided by `party`
    fn next_input_mask(&mut self, party: PartyId) -> Result<InputMask, MpcError>;
    /// Get a batch of input masks for values provided by `party`
    fn next_input_mask_batch(
        &mut self,
        party: PartyId,
        num_values: usize,
    ) -> Result<Vec<InputMask>, MpcError> {
        (0..num_values).map(|_| self.next_input_mask(party)).collect()
    }

    // === Shared Values === //
    /// Fetch the next shared random element
    fn next_random_element(&mut self) -> Result<ScalarShare, MpcError>;
    /// Fetch a batch of shared random elements
    fn next_random_element_batch(
        &mut self,
        num_values: usize,
    ) -> Result<Vec<ScalarShare>, MpcError> {
        (0..num_values).map(|_| self.next_random_element()).collect()
    }
    /// Fetch the next shared bit, as an arithmetic `0` or `1`
    fn next_bit(&mut self) -> Result<ScalarShare, MpcError>;
    /// Fetch a batch of shared bits
    fn next_bit_batch(&mut self, num_values: usize) -> Result<Vec<ScalarShare>, MpcError> {
        (0..num_values).map(|_| self.next_bit()).collect()
    }
    /// Fetch the next pair of masks for truncating by `d` bits
    fn next_truncation_pair(&mut self, d: u32) -> Result<TruncationPair, MpcError>;

    // === Triples === //
    /// Fetch the next beaver triple
    fn next_triple(&mut self) -> Result<Triple, MpcError>;
    /// Fetch a batch of beaver triples
    fn next_triple_batch(&mut self, num_triples: usize) -> Result<Vec<Triple>, MpcError> {
        (0..num_triples).map(|_| self.next_triple()).collect()
    }
    /// Fetch the next boolean beaver triple
    fn next_bit_triple(&mut self) -> Result<Triple, MpcError>;
}

// -----------
// | Dealing |
// -----------

/// Deal one arithmetic triple to every party
pub fn deal_triple<R: RngCore + CryptoRng>(
    mac_key: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Vec<Triple> {
    let modulus = mac_key.modulus();
    let a = Scalar::random(modulus, rng);
    let b = Scalar::random(modulus, rng);
    let c = &a * &b;

    deal_triple_values(&a, &b, &c, mac_key, n_parties, rng)
}

/// Deal one boolean triple to every party
///
/// The low bits satisfy `c_0 = a_0 AND b_0`, every higher bit is uniformly
/// random so that opening `x - a` hides the high bits of `x`
pub fn deal_bit_triple<R: RngCore + CryptoRng>(
    mac_key: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Result<Vec<Triple>, MpcError> {
    let modulus = mac_key.modulus();
    if !modulus.supports_boolean() {
        return Err(MpcError::ConfigurationError(format!(
            "boolean triples require a power of two ring, got {modulus}"
        )));
    }

    let a = Scalar::random(modulus, rng);
    let b = Scalar::random(modulus, rng);
    let pad = Scalar::random(modulus, rng) * Scalar::from_u64(2, modulus);
    let c = pad + Scalar::from_bit(a.bit_value() && b.bit_value(), modulus);

    Ok(deal_triple_values(&a, &b, &c, mac_key, n_parties, rng))
}

/// Share the components of a triple
fn deal_triple_values<R: RngCore + CryptoRng>(
    a: &Scalar,
    b: &Scalar,
    c: &Scalar,
    mac_key: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Vec<Triple> {
    let a_shares = share_value(a, mac_key, n_parties, rng);
    let b_shares = share_value(b, mac_key, n_parties, rng);
    let c_shares = share_value(c, mac_key, n_parties, rng);

    a_shares
        .into_iter()
        .zip(b_shares)
        .zip(c_shares)
        .map(|((left, right), product)| Triple { left, right, product })
        .collect_vec()
}

/// Deal one input mask for values provided by `input_party`
pub fn deal_input_mask<R: RngCore + CryptoRng>(
    mac_key: &Scalar,
    n_parties: usize,
    input_party: PartyId,
    rng: &mut R,
) -> Vec<InputMask> {
    let mask = Scalar::random(mac_key.modulus(), rng);
    share_value(&mask, mac_key, n_parties, rng)
        .into_iter()
        .enumerate()
        .map(|(idx, mask_share)| {
            let open_value = (party_id_of(idx) == input_party).then(|| mask.clone());
            InputMask { mask_share, open_value }
        })
        .collect_vec()
}

/// Deal one shared random element
pub fn deal_random_element<R: RngCore + CryptoRng>(
    mac_key: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Vec<ScalarShare> {
    let value = Scalar::random(mac_key.modulus(), rng);
    share_value(&value, mac_key, n_parties, rng)
}

/// Deal one shared random bit, encoded as an arithmetic `0` or `1`
pub fn deal_bit<R: RngCore + CryptoRng>(
    mac_key: &Scalar,
    n_parties: usize,
    rng: &mut R,
) -> Vec<ScalarShare> {
    let bit = Scalar::from_bit(rng.next_u32() & 1 == 1, mac_key.modulus());
    share_value(&bit, mac_key, n_parties, rng)
}

/// Deal one truncation pair for shifts of `d` bits
///
/// The mask `r'` is drawn below `2^(l - 2)` for an `l` bit plaintext domain
/// so that `x + r'` does not wrap for any `x < 2^(l - 2)`
pub fn deal_truncation_pair<R: RngCore + CryptoRng>(
    mac_key: &Scalar,
    n_parties: usize,
    d: u32,
    rng: &mut R,
) -> Result<Vec<TruncationPair>, MpcError> {
    let modulus = mac_key.modulus();
    let mask_bits = modulus.bit_length().saturating_sub(2);
    if u64::from(d) >= mask_bits {
        return Err(MpcError::InvalidInput(format!(
            "cannot truncate by {d} bits in a {} bit modulus",
            modulus.bit_length()
        )));
    }

    let r_high = rng.gen_biguint(mask_bits - u64::from(d));
    let r_low = rng.gen_biguint(u64::from(d));
    let r_prime = Scalar::new((&r_high << d) + r_low, modulus);
    let r = Scalar::new(r_high, modulus);

    let r_prime_shares = share_value(&r_prime, mac_key, n_parties, rng);
    let r_shares = share_value(&r, mac_key, n_parties, rng);

    Ok(r_prime_shares
        .into_iter()
        .zip(r_shares)
        .map(|(r_prime, r)| TruncationPair { r_prime, r })
        .collect_vec())
}

/// The party that owns the share at `idx` of a dealt vector
fn party_id_of(idx: usize) -> PartyId {
    idx as PartyId + 1
}

/// The index of a party's share in a dealt vector
pub(crate) fn party_index(party_id: PartyId) -> usize {
    (party_id - 1) as usize
}

/// Sample a global MAC key
///
/// The key is non-zero so that the MAC check rejects every incorrect
/// opening with the probability bound of the coefficient space. Ring keys are
/// drawn from the full storage width, security bits included
pub fn random_mac_key<R: RngCore + CryptoRng>(modulus: &Arc<Modulus>, rng: &mut R) -> Scalar {
    Scalar::random_nonzero(modulus, rng)
}

// ----------------------
// | Dummy Data Source |
// ----------------------

#[cfg(any(feature = "test_helpers", test))]
pub use dummy::DummyDataSupplier;

#[cfg(any(feature = "test_helpers", test))]
mod dummy {
    //! A supplier that derives every party's material from a shared seed

    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};
    use rustc_hash::FxHashMap;
    use sha3::{Digest, Sha3_256};

    use crate::{
        algebra::{share_plain, Modulus, Scalar, ScalarShare},
        error::MpcError,
        network::PartyId,
    };

    use super::{
        deal_bit, deal_bit_triple, deal_input_mask, deal_random_element, deal_triple,
        deal_truncation_pair, party_index, random_mac_key, InputMask, PreprocessingPhase,
        Triple, TruncationPair,
    };

    /// A supplier in which every party deals all material from a common seed
    /// and keeps its own share
    ///
    /// Each kind of material is drawn from its own stream, so parties stay
    /// consistent regardless of the order in which kinds are requested.
    /// This is insecure and for testing only
    pub struct DummyDataSupplier {
        /// The local party
        party_id: PartyId,
        /// The number of parties
        n_parties: usize,
        /// The seed all streams are derived from
        seed: [u8; 32],
        /// The modulus
        modulus: Arc<Modulus>,
        /// The global mac key
        mac_key: Scalar,
        /// The local share of the mac key
        mac_key_share: Scalar,
        /// The stream of arithmetic triples
        triples: StdRng,
        /// The stream of boolean triples
        bit_triples: StdRng,
        /// The stream of random elements
        random_elements: StdRng,
        /// The stream of random bits
        bits: StdRng,
        /// The streams of input masks, keyed by inputting party
        input_masks: FxHashMap<PartyId, StdRng>,
        /// The streams of truncation pairs, keyed by shift
        truncation_pairs: FxHashMap<u32, StdRng>,
    }

    impl DummyDataSupplier {
        /// Create a supplier for `party_id`; all parties must share the seed
        pub fn new(party_id: PartyId, n_parties: usize, modulus: Arc<Modulus>, seed: u64) -> Self {
            assert!(party_id >= 1 && party_id as usize <= n_parties, "invalid party id");

            let mut seed_bytes = [0u8; 32];
            seed_bytes[..8].copy_from_slice(&seed.to_be_bytes());

            let mut key_stream = derive_stream(&seed_bytes, b"mac-key");
            let mac_key = random_mac_key(&modulus, &mut key_stream);
            let key_shares = share_plain(&mac_key, n_parties, &mut key_stream);
            let mac_key_share = key_shares[party_index(party_id)].clone();

            Self {
                party_id,
                n_parties,
                seed: seed_bytes,
                modulus,
                mac_key,
                mac_key_share,
                triples: derive_stream(&seed_bytes, b"triples"),
                bit_triples: derive_stream(&seed_bytes, b"bit-triples"),
                random_elements: derive_stream(&seed_bytes, b"random-elements"),
                bits: derive_stream(&seed_bytes, b"bits"),
                input_masks: FxHashMap::default(),
                truncation_pairs: FxHashMap::default(),
            }
        }

        /// The global mac key, exposed for test assertions
        pub fn mac_key(&self) -> Scalar {
            self.mac_key.clone()
        }

        /// Keep the local party's entry of a dealt vector
        fn take_local<T>(&self, mut dealt: Vec<T>) -> T {
            dealt.swap_remove(party_index(self.party_id))
        }
    }

    /// Derive an independent stream from the seed and a domain tag
    fn derive_stream(seed: &[u8; 32], tag: &[u8]) -> StdRng {
        let mut hasher = Sha3_256::new();
        hasher.update(seed);
        hasher.update(tag);
        StdRng::from_seed(hasher.finalize().into())
    }

    impl PreprocessingPhase for DummyDataSupplier {
        fn modulus(&self) -> Arc<Modulus> {
            self.modulus.clone()
        }

        fn mac_key_share(&self) -> Scalar {
            self.mac_key_share.clone()
        }

        fn next_input_mask(&mut self, party: PartyId) -> Result<InputMask, MpcError> {
            if party == 0 || party as usize > self.n_parties {
                return Err(MpcError::InvalidInput(format!("no input masks for party {party}")));
            }

            let seed = self.seed;
            let rng = self.input_masks.entry(party).or_insert_with(|| {
                let mut tag = b"input-masks-".to_vec();
                tag.extend(party.to_be_bytes());
                derive_stream(&seed, &tag)
            });

            let dealt = deal_input_mask(&self.mac_key, self.n_parties, party, rng);
            Ok(self.take_local(dealt))
        }

        fn next_random_element(&mut self) -> Result<ScalarShare, MpcError> {
            let dealt =
                deal_random_element(&self.mac_key, self.n_parties, &mut self.random_elements);
            Ok(self.take_local(dealt))
        }

        fn next_bit(&mut self) -> Result<ScalarShare, MpcError> {
            let dealt = deal_bit(&self.mac_key, self.n_parties, &mut self.bits);
            Ok(self.take_local(dealt))
        }

        fn next_truncation_pair(&mut self, d: u32) -> Result<TruncationPair, MpcError> {
            let seed = self.seed;
            let rng = self.truncation_pairs.entry(d).or_insert_with(|| {
                let mut tag = b"truncation-pairs-".to_vec();
                tag.extend(d.to_be_bytes());
                derive_stream(&seed, &tag)
            });

            let dealt = deal_truncation_pair(&self.mac_key, self.n_parties, d, rng)?;
            Ok(self.take_local(dealt))
        }

        fn next_triple(&mut self) -> Result<Triple, MpcError> {
            let dealt = deal_triple(&self.mac_key, self.n_parties, &mut self.triples);
            Ok(self.take_local(dealt))
        }

        fn next_bit_triple(&mut self) -> Result<Triple, MpcError> {
            let dealt = deal_bit_triple(&self.mac_key, self.n_parties, &mut self.bit_triples)?;
            Ok(self.take_local(dealt))
        }
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use num_bigint::BigUint;
    use rand::thread_rng;

    use crate::{
        algebra::{reconstruct, Scalar, ScalarShare},
        test_helpers::{test_modulus, test_ring},
    };

    use super::{
        deal_bit, deal_bit_triple, deal_input_mask, deal_triple, deal_truncation_pair,
        DummyDataSupplier, PreprocessingPhase,
    };

    /// Check that a dealt sharing is authenticated under the key
    fn open_checked(shares: &[ScalarShare], key: &Scalar) -> Scalar {
        let (value, mac) = reconstruct(shares);
        assert_eq!(mac, &value * key);
        value
    }

    /// Tests that dealt triples are consistent and authenticated
    #[test]
    fn test_dealt_triples() {
        let mut rng = thread_rng();
        let m = test_modulus();
        let key = Scalar::random(&m, &mut rng);

        let triples = deal_triple(&key, 3, &mut rng);
        let a = open_checked(&triples.iter().map(|t| t.left.clone()).collect_vec(), &key);
        let b = open_checked(&triples.iter().map(|t| t.right.clone()).collect_vec(), &key);
        let c = open_checked(&triples.iter().map(|t| t.product.clone()).collect_vec(), &key);
        assert_eq!(a * b, c);

        // Boolean triples are rejected outside of a ring
        assert!(deal_bit_triple(&key, 3, &mut rng).is_err());
    }

    /// Tests that boolean triples satisfy the relation on their low bits
    #[test]
    fn test_dealt_bit_triples() {
        let mut rng = thread_rng();
        let ring = test_ring();
        let key = Scalar::random(&ring, &mut rng);

        for _ in 0..20 {
            let triples = deal_bit_triple(&key, 2, &mut rng).unwrap();
            let a = open_checked(&triples.iter().map(|t| t.left.clone()).collect_vec(), &key);
            let b = open_checked(&triples.iter().map(|t| t.right.clone()).collect_vec(), &key);
            let c = open_checked(&triples.iter().map(|t| t.product.clone()).collect_vec(), &key);
            assert_eq!(c.bit_value(), a.bit_value() && b.bit_value());
        }
    }

    /// Tests that only the inputting party learns an input mask
    #[test]
    fn test_dealt_input_masks() {
        let mut rng = thread_rng();
        let m = test_modulus();
        let key = Scalar::random(&m, &mut rng);

        let masks = deal_input_mask(&key, 3, 2, &mut rng);
        let value = open_checked(&masks.iter().map(|m| m.mask_share.clone()).collect_vec(), &key);
        assert!(masks[0].open_value.is_none());
        assert_eq!(masks[1].open_value, Some(value));
        assert!(masks[2].open_value.is_none());
    }

    /// Tests bits and truncation pairs
    #[test]
    fn test_dealt_bits_and_truncation_pairs() {
        let mut rng = thread_rng();
        let m = test_modulus();
        let key = Scalar::random(&m, &mut rng);

        for _ in 0..20 {
            let bit = open_checked(&deal_bit(&key, 2, &mut rng), &key);
            assert!(bit.is_zero() || bit == Scalar::one(&m));
        }

        let pairs = deal_truncation_pair(&key, 2, 16, &mut rng).unwrap();
        let r_prime = open_checked(&pairs.iter().map(|p| p.r_prime.clone()).collect_vec(), &key);
        let r = open_checked(&pairs.iter().map(|p| p.r.clone()).collect_vec(), &key);
        assert_eq!(r_prime.value() >> 16u32, r.value().clone());
        assert!(r_prime.value() < &(BigUint::from(1u8) << (m.bit_length() - 2)));

        assert!(deal_truncation_pair(&key, 2, 200, &mut rng).is_err());
    }

    /// Tests that dummy suppliers seeded alike produce consistent shares
    /// regardless of the order material is requested in
    #[test]
    fn test_dummy_supplier_consistency() {
        let m = test_modulus();
        let mut p1 = DummyDataSupplier::new(1, 2, m.clone(), 42);
        let mut p2 = DummyDataSupplier::new(2, 2, m.clone(), 42);
        let key = p1.mac_key();

        let key_shares = vec![p1.mac_key_share(), p2.mac_key_share()];
        assert_eq!(key_shares[0].clone() + key_shares[1].clone(), key);

        // Request in different orders
        let bit1 = p1.next_bit().unwrap();
        let triple1 = p1.next_triple().unwrap();
        let triple2 = p2.next_triple().unwrap();
        let bit2 = p2.next_bit().unwrap();

        let a = open_checked(&[triple1.left, triple2.left], &key);
        let b = open_checked(&[triple1.right, triple2.right], &key);
        let c = open_checked(&[triple1.product, triple2.product], &key);
        assert_eq!(a * b, c);

        let bit = open_checked(&[bit1, bit2], &key);
        assert!(bit.is_zero() || bit == Scalar::one(&m));

        let mask1 = p1.next_input_mask(1).unwrap();
        let mask2 = p2.next_input_mask(1).unwrap();
        let mask = open_checked(&[mask1.mask_share, mask2.mask_share], &key);
        assert_eq!(mask1.open_value, Some(mask));
        assert!(mask2.open_value.is_none());
        assert!(p1.next_input_mask(3).is_err());
    }
}
