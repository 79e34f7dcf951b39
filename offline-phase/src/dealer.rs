//! Defines a trusted dealer that produces consistent preprocessing material
//! for every party, and a supplier that serves one party's share of a dealt
//! batch
//!
//! The dealer knows the global MAC key and every sharing it produces, so it
//! stands in for the generation protocol and must be trusted by all parties

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use itertools::Itertools;
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use spdz_mpc::{
    algebra::{share_plain, Modulus, Scalar, ScalarShare},
    error::MpcError,
    network::PartyId,
    offline_prep::{
        deal_bit, deal_bit_triple, deal_input_mask, deal_random_element, deal_triple,
        deal_truncation_pair, random_mac_key, InputMask, PreprocessingPhase, Triple,
        TruncationPair,
    },
};
use tracing::log;

use crate::error::DealerError;

// ----------
// | Counts |
// ----------

/// The amount of each kind of material to deal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingCounts {
    /// The number of arithmetic triples
    pub triples: usize,
    /// The number of boolean triples
    pub bit_triples: usize,
    /// The number of input masks for each inputting party
    pub input_masks: usize,
    /// The number of random elements
    pub random_elements: usize,
    /// The number of random bits
    pub bits: usize,
    /// The number of truncation pairs, keyed by shift
    pub truncation_pairs: BTreeMap<u32, usize>,
}

// ----------
// | Dealer |
// ----------

/// A dealer holding the global MAC key and its sharing
pub struct TrustedDealer<R: RngCore + CryptoRng = StdRng> {
    /// The number of parties
    n_parties: usize,
    /// The global MAC key
    mac_key: Scalar,
    /// The additive sharing of the MAC key, indexed by party id - 1
    key_shares: Vec<Scalar>,
    /// The randomness every sharing is drawn from
    rng: R,
}

impl TrustedDealer<StdRng> {
    /// A dealer seeded from the operating system
    pub fn from_entropy(n_parties: usize, modulus: Arc<Modulus>) -> Result<Self, DealerError> {
        Self::new(n_parties, modulus, StdRng::from_entropy())
    }
}

impl<R: RngCore + CryptoRng> TrustedDealer<R> {
    /// Sample a MAC key and share it between `n_parties`
    pub fn new(n_parties: usize, modulus: Arc<Modulus>, mut rng: R) -> Result<Self, DealerError> {
        if n_parties < 2 {
            return Err(DealerError::InvalidParameters(format!(
                "dealing requires at least 2 parties, got {n_parties}"
            )));
        }

        let mac_key = random_mac_key(&modulus, &mut rng);
        let key_shares = share_plain(&mac_key, n_parties, &mut rng);
        Ok(Self { n_parties, mac_key, key_shares, rng })
    }

    /// The number of parties
    pub fn n_parties(&self) -> usize {
        self.n_parties
    }

    /// The modulus the material is shared over
    pub fn modulus(&self) -> &Arc<Modulus> {
        self.mac_key.modulus()
    }

    /// The global MAC key
    pub fn mac_key(&self) -> &Scalar {
        &self.mac_key
    }

    /// The sharing of the MAC key, indexed by party id - 1
    pub fn mac_key_shares(&self) -> &[Scalar] {
        &self.key_shares
    }

    /// Deal one arithmetic triple
    pub fn triple(&mut self) -> Vec<Triple> {
        deal_triple(&self.mac_key, self.n_parties, &mut self.rng)
    }

    /// Deal one boolean triple; only defined over power of two rings
    pub fn bit_triple(&mut self) -> Result<Vec<Triple>, DealerError> {
        Ok(deal_bit_triple(&self.mac_key, self.n_parties, &mut self.rng)?)
    }

    /// Deal one input mask for values provided by `party`
    pub fn input_mask(&mut self, party: PartyId) -> Result<Vec<InputMask>, DealerError> {
        if party == 0 || party as usize > self.n_parties {
            return Err(DealerError::InvalidParameters(format!(
                "party {party} outside of 1..={}",
                self.n_parties
            )));
        }

        Ok(deal_input_mask(&self.mac_key, self.n_parties, party, &mut self.rng))
    }

    /// Deal one shared random element
    pub fn random_element(&mut self) -> Vec<ScalarShare> {
        deal_random_element(&self.mac_key, self.n_parties, &mut self.rng)
    }

    /// Deal one shared random bit
    pub fn bit(&mut self) -> Vec<ScalarShare> {
        deal_bit(&self.mac_key, self.n_parties, &mut self.rng)
    }

    /// Deal one truncation pair for shifts of `d` bits
    pub fn truncation_pair(&mut self, d: u32) -> Result<Vec<TruncationPair>, DealerError> {
        Ok(deal_truncation_pair(&self.mac_key, self.n_parties, d, &mut self.rng)?)
    }

    /// Deal a batch of material, returning one supplier per party ordered by
    /// party id
    pub fn deal(
        &mut self,
        counts: &PreprocessingCounts,
    ) -> Result<Vec<PreprocessedSupplier>, DealerError> {
        let modulus = self.modulus().clone();
        let mut suppliers = self
            .key_shares
            .iter()
            .enumerate()
            .map(|(idx, key_share)| {
                PreprocessedSupplier::empty(idx as PartyId + 1, modulus.clone(), key_share.clone())
            })
            .collect_vec();

        for _ in 0..counts.triples {
            distribute(&mut suppliers, self.triple(), |s| &mut s.triples);
        }
        for _ in 0..counts.bit_triples {
            distribute(&mut suppliers, self.bit_triple()?, |s| &mut s.bit_triples);
        }
        for _ in 0..counts.random_elements {
            distribute(&mut suppliers, self.random_element(), |s| &mut s.random_elements);
        }
        for _ in 0..counts.bits {
            distribute(&mut suppliers, self.bit(), |s| &mut s.bits);
        }
        for party in 1..=self.n_parties as PartyId {
            for _ in 0..counts.input_masks {
                let dealt = self.input_mask(party)?;
                distribute(&mut suppliers, dealt, |s| s.input_masks.entry(party).or_default());
            }
        }
        for (&d, &count) in counts.truncation_pairs.iter() {
            for _ in 0..count {
                let dealt = self.truncation_pair(d)?;
                distribute(&mut suppliers, dealt, |s| s.truncation_pairs.entry(d).or_default());
            }
        }

        log::debug!("dealt {counts:?} to {} parties", self.n_parties);
        Ok(suppliers)
    }
}

/// Hand each party its entry of a dealt vector
fn distribute<T, F>(suppliers: &mut [PreprocessedSupplier], dealt: Vec<T>, mut queue: F)
where
    F: FnMut(&mut PreprocessedSupplier) -> &mut VecDeque<T>,
{
    for (supplier, item) in suppliers.iter_mut().zip(dealt) {
        queue(supplier).push_back(item);
    }
}

// ------------
// | Supplier |
// ------------

/// One party's share of a dealt batch of material
#[derive(Clone, Debug)]
pub struct PreprocessedSupplier {
    /// The party the material belongs to
    party_id: PartyId,
    /// The modulus the material is shared over
    modulus: Arc<Modulus>,
    /// The party's share of the MAC key
    mac_key_share: Scalar,
    /// The arithmetic triples
    triples: VecDeque<Triple>,
    /// The boolean triples
    bit_triples: VecDeque<Triple>,
    /// The input masks, keyed by inputting party
    input_masks: BTreeMap<PartyId, VecDeque<InputMask>>,
    /// The random elements
    random_elements: VecDeque<ScalarShare>,
    /// The random bits
    bits: VecDeque<ScalarShare>,
    /// The truncation pairs, keyed by shift
    truncation_pairs: BTreeMap<u32, VecDeque<TruncationPair>>,
}

impl PreprocessedSupplier {
    /// A supplier holding no material
    fn empty(party_id: PartyId, modulus: Arc<Modulus>, mac_key_share: Scalar) -> Self {
        Self {
            party_id,
            modulus,
            mac_key_share,
            triples: VecDeque::new(),
            bit_triples: VecDeque::new(),
            input_masks: BTreeMap::new(),
            random_elements: VecDeque::new(),
            bits: VecDeque::new(),
            truncation_pairs: BTreeMap::new(),
        }
    }

    /// The party the material belongs to
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    /// The material left in the supplier
    ///
    /// Input masks are counted for the party with the fewest left
    pub fn remaining(&self) -> PreprocessingCounts {
        PreprocessingCounts {
            triples: self.triples.len(),
            bit_triples: self.bit_triples.len(),
            input_masks: self.input_masks.values().map(VecDeque::len).min().unwrap_or(0),
            random_elements: self.random_elements.len(),
            bits: self.bits.len(),
            truncation_pairs: self
                .truncation_pairs
                .iter()
                .map(|(d, pairs)| (*d, pairs.len()))
                .collect(),
        }
    }
}

/// Pop the next item of a queue, failing if the queue is missing or empty
fn pop<T>(queue: Option<&mut VecDeque<T>>, kind: &str) -> Result<T, MpcError> {
    queue
        .and_then(VecDeque::pop_front)
        .ok_or_else(|| MpcError::SupplierExhausted(kind.to_string()))
}

impl PreprocessingPhase for PreprocessedSupplier {
    fn modulus(&self) -> Arc<Modulus> {
        self.modulus.clone()
    }

    fn mac_key_share(&self) -> Scalar {
        self.mac_key_share.clone()
    }

    fn next_input_mask(&mut self, party: PartyId) -> Result<InputMask, MpcError> {
        pop(self.input_masks.get_mut(&party), &format!("input masks of party {party}"))
    }

    fn next_random_element(&mut self) -> Result<ScalarShare, MpcError> {
        pop(Some(&mut self.random_elements), "random elements")
    }

    fn next_bit(&mut self) -> Result<ScalarShare, MpcError> {
        pop(Some(&mut self.bits), "random bits")
    }

    fn next_truncation_pair(&mut self, d: u32) -> Result<TruncationPair, MpcError> {
        pop(self.truncation_pairs.get_mut(&d), &format!("truncation pairs of width {d}"))
    }

    fn next_triple(&mut self) -> Result<Triple, MpcError> {
        pop(Some(&mut self.triples), "triples")
    }

    fn next_bit_triple(&mut self) -> Result<Triple, MpcError> {
        pop(Some(&mut self.bit_triples), "bit triples")
    }
}
