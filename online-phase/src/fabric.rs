//! Defines an MPC fabric for the protocol
//!
//! The fabric essentially acts as a dependency injection layer. That is, the
//! MpcFabric creates and manages dependencies needed to evaluate a computation
//! (the preprocessing supplier, the batched network, the opened value store)
//! and hands the application a builder to compose the computation with.
//!
//! Computations are evaluated in batches of independent native protocols;
//! between batches the round synchronizer decides whether the values opened
//! so far must be authenticated

mod builder;
mod executor;
mod native;
mod producer;
mod resource_pool;
mod result;
mod sync;

use std::sync::Arc;

pub use builder::ProtocolBuilder;
pub(crate) use builder::BuilderContext;
pub use executor::{EvaluationStrategy, DEFAULT_MAX_BATCH_SIZE};
pub use native::{EvaluationStatus, GateContext, NativeProtocol};
pub(crate) use native::ERR_PROTOCOL_NOT_DONE;
pub use resource_pool::ResourcePool;
pub use result::*;
pub use sync::{MacCheckPolicy, DEFAULT_OPENED_VALUE_THRESHOLD};

use tracing::log;

use crate::{
    algebra::{Modulus, Scalar},
    config::FabricConfig,
    error::MpcError,
    network::{BatchedNetwork, MpcNetwork, NetworkStats, PartyId},
    offline_prep::PreprocessingPhase,
};

use self::{executor::ProtocolEvaluator, sync::SpdzRoundSynchronizer};

/// A fabric for the MPC protocol, defines a dependency injection layer that
/// dynamically schedules the native protocols of a computation and manages
/// the resources they draw on
pub struct MpcFabric {
    /// The configuration the fabric was built with
    config: FabricConfig,
    /// The resources native protocols draw on
    pool: ResourcePool,
    /// The network native protocols communicate through
    network: BatchedNetwork,
    /// The evaluator driving computations
    evaluator: ProtocolEvaluator,
    /// Whether a previous computation failed
    aborted: bool,
}

impl MpcFabric {
    /// Constructor
    ///
    /// Fails if the configuration is inconsistent with itself, with the
    /// network, or with the supplier
    pub fn new<N, S>(config: FabricConfig, network: N, supplier: S) -> Result<Self, MpcError>
    where
        N: MpcNetwork + 'static,
        S: PreprocessingPhase + 'static,
    {
        config.validate()?;
        if network.party_id() != config.party_id || network.num_parties() != config.num_parties {
            return Err(MpcError::ConfigurationError(format!(
                "network is party {} of {}, configuration expects party {} of {}",
                network.party_id(),
                network.num_parties(),
                config.party_id,
                config.num_parties
            )));
        }

        let modulus = config.modulus.build()?;
        let supplier_modulus = supplier.modulus();
        if supplier_modulus != modulus {
            return Err(MpcError::ConfigurationError(format!(
                "supplier provides material over {supplier_modulus}, configuration expects \
                 {modulus}"
            )));
        }

        let pool = ResourcePool::new(config.party_id, config.num_parties, Box::new(supplier));
        let evaluator = ProtocolEvaluator::new(
            config.evaluation.strategy,
            config.evaluation.max_batch_size,
            Box::new(SpdzRoundSynchronizer::new(config.mac_check.clone())),
        );

        log::debug!(
            "party {} of {} initialized fabric over {modulus}",
            config.party_id,
            config.num_parties
        );
        Ok(Self { config, pool, network: BatchedNetwork::new(network), evaluator, aborted: false })
    }

    /// The local party
    pub fn party_id(&self) -> PartyId {
        self.pool.party_id()
    }

    /// The number of parties
    pub fn num_parties(&self) -> usize {
        self.pool.num_parties()
    }

    /// The modulus computations run over
    pub fn modulus(&self) -> Arc<Modulus> {
        self.pool.modulus().clone()
    }

    /// The local share of the global MAC key
    pub fn mac_key_share(&self) -> Scalar {
        self.pool.mac_key_share().clone()
    }

    /// The configuration the fabric was built with
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// The traffic counters of the fabric's network
    pub fn stats(&self) -> Arc<NetworkStats> {
        self.network.stats()
    }

    /// The number of MAC checks run so far
    pub fn mac_checks_run(&self) -> usize {
        self.evaluator.mac_checks_run()
    }

    /// Whether a previous computation failed, after which the fabric refuses
    /// to evaluate further computations
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Build a computation with `app` and evaluate it
    ///
    /// Every party must build the same computation. The output is returned
    /// only after every value opened by the computation has passed a MAC
    /// check
    pub async fn run<D, F>(&mut self, app: F) -> Result<D::Output, MpcError>
    where
        D: Deferred,
        F: FnOnce(&mut ProtocolBuilder) -> D,
    {
        if self.aborted {
            return Err(MpcError::Aborted);
        }

        let ctx = BuilderContext {
            party_id: self.pool.party_id(),
            n_parties: self.pool.num_parties(),
            modulus: self.pool.modulus().clone(),
        };
        let mut root = ProtocolBuilder::sequential(ctx);
        let output = app(&mut root);

        let producer = root.into_producer();
        if let Err(e) = self.evaluator.eval(producer, &mut self.pool, &mut self.network).await {
            log::error!("party {} aborting computation: {e}", self.party_id());
            self.aborted = true;
            return Err(e);
        }

        output.try_read().ok_or_else(|| {
            MpcError::InvalidInput("the output is not produced by the computation".into())
        })
    }

    /// Close the network, consuming the fabric
    pub async fn shutdown(mut self) -> Result<(), MpcError> {
        log::debug!("shutting down fabric for party {}", self.party_id());
        self.network.close().await
    }
}
