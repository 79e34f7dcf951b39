//! Defines the per-party resources native protocols draw on during evaluation

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    algebra::{Modulus, Scalar},
    network::PartyId,
    offline_prep::PreprocessingPhase,
    protocols::OpenedValueStore,
};

/// The resources of the local party
///
/// Mutated only by the evaluation driving the protocol graph, so no locking
/// is needed
pub struct ResourcePool {
    /// The local party
    party_id: PartyId,
    /// The number of parties
    n_parties: usize,
    /// The modulus every value lives in
    modulus: Arc<Modulus>,
    /// The local share of the global MAC key
    mac_key_share: Scalar,
    /// The source of correlated randomness
    supplier: Box<dyn PreprocessingPhase>,
    /// Values opened since the last MAC check
    opened_values: OpenedValueStore,
    /// Local randomness for commitments and coin tossing
    rng: StdRng,
}

impl ResourcePool {
    /// Constructor
    pub fn new(party_id: PartyId, n_parties: usize, supplier: Box<dyn PreprocessingPhase>) -> Self {
        let modulus = supplier.modulus();
        let mac_key_share = supplier.mac_key_share();

        Self {
            party_id,
            n_parties,
            modulus,
            mac_key_share,
            supplier,
            opened_values: OpenedValueStore::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// The local party
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    /// The number of parties
    pub fn num_parties(&self) -> usize {
        self.n_parties
    }

    /// The modulus every value lives in
    pub fn modulus(&self) -> &Arc<Modulus> {
        &self.modulus
    }

    /// The local share of the global MAC key
    pub fn mac_key_share(&self) -> &Scalar {
        &self.mac_key_share
    }

    /// The source of correlated randomness
    pub fn supplier(&mut self) -> &mut dyn PreprocessingPhase {
        self.supplier.as_mut()
    }

    /// Values opened since the last MAC check
    pub fn opened_values(&mut self) -> &mut OpenedValueStore {
        &mut self.opened_values
    }

    /// Local randomness
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
