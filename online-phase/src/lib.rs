#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

//! Defines an N party SPDZ style MPC implementation over prime fields and
//! power of two rings
//!
//! A computation is composed with a `ProtocolBuilder` out of native
//! protocols, which the fabric evaluates in rounds. Independent protocols are
//! batched so that they share network rounds, and every value opened during
//! the computation is authenticated by a batched MAC check before the output
//! is released

pub mod algebra;
pub mod commitment;
pub mod config;
pub mod error;
pub mod fabric;
pub mod network;
pub mod numeric;
pub mod offline_prep;
pub mod protocols;

pub use config::FabricConfig;
pub use fabric::{Deferred, MpcFabric, ProtocolBuilder, ResultHandle};

use network::PartyId;

// -------------
// | Constants |
// -------------

/// The first party
pub const PARTY1: PartyId = 1;
/// The second party
pub const PARTY2: PartyId = 2;

#[cfg(any(test, feature = "test_helpers"))]
pub mod test_helpers {
    //! Defines test helpers for use in unit and integration tests, as well as
    //! benchmarks
    use std::sync::Arc;

    use futures::{future, Future};
    use itertools::Itertools;
    use num_bigint::BigUint;
    use num_traits::One;
    use rand::{thread_rng, RngCore};

    use crate::{
        algebra::Modulus,
        config::FabricConfig,
        network::{MockNetwork, MpcNetwork, PartyId},
        offline_prep::{DummyDataSupplier, PreprocessingPhase},
        MpcFabric,
    };

    /// The Mersenne prime `2^127 - 1`, used as the field in tests
    pub fn test_modulus() -> Arc<Modulus> {
        let p = (BigUint::one() << 127u32) - BigUint::one();
        Arc::new(Modulus::prime(p).expect("2^127 - 1 is prime"))
    }

    /// The ring `Z_{2^64}`, used for boolean and truncation tests
    pub fn test_ring() -> Arc<Modulus> {
        Arc::new(Modulus::power_of_two(64).expect("64 bits is a valid ring"))
    }

    /// Run a mock MPC between `n_parties` connected by an in-memory mesh
    ///
    /// This will spawn one task per party to execute its side of the MPC
    ///
    /// Returns the outputs of the parties, ordered by party id
    pub async fn execute_mock_mpc<T, S, F>(n_parties: usize, modulus: Arc<Modulus>, f: F) -> Vec<T>
    where
        T: Send + 'static,
        S: Future<Output = T> + Send + 'static,
        F: FnMut(MpcFabric) -> S,
    {
        execute_mock_mpc_with_config(n_parties, modulus, |_| {}, f).await
    }

    /// Run a mock MPC after adjusting each party's configuration
    pub async fn execute_mock_mpc_with_config<T, S, C, F>(
        n_parties: usize,
        modulus: Arc<Modulus>,
        configure: C,
        f: F,
    ) -> Vec<T>
    where
        T: Send + 'static,
        S: Future<Output = T> + Send + 'static,
        C: Fn(&mut FabricConfig),
        F: FnMut(MpcFabric) -> S,
    {
        let seed = thread_rng().next_u64();
        let suppliers = (1..=n_parties as PartyId)
            .map(|party| DummyDataSupplier::new(party, n_parties, modulus.clone(), seed))
            .collect_vec();

        execute_mock_mpc_with_suppliers(suppliers, configure, f).await
    }

    /// Run a mock MPC with one supplier per party, ordered by party id
    pub async fn execute_mock_mpc_with_suppliers<P, T, S, C, F>(
        suppliers: Vec<P>,
        configure: C,
        mut f: F,
    ) -> Vec<T>
    where
        P: PreprocessingPhase + 'static,
        T: Send + 'static,
        S: Future<Output = T> + Send + 'static,
        C: Fn(&mut FabricConfig),
        F: FnMut(MpcFabric) -> S,
    {
        let n_parties = suppliers.len();
        let tasks = MockNetwork::new_mesh(n_parties)
            .into_iter()
            .zip(suppliers)
            .map(|(network, supplier)| {
                let modulus = supplier.modulus();
                let mut config = FabricConfig::new(network.party_id(), n_parties, &modulus);
                configure(&mut config);

                let fabric =
                    MpcFabric::new(config, network, supplier).expect("invalid mock fabric setup");
                tokio::spawn(f(fabric))
            })
            .collect_vec();

        future::join_all(tasks)
            .await
            .into_iter()
            .map(|res| res.expect("party task panicked"))
            .collect()
    }
}
