//! Defines the round synchronizer, which decides when the values opened
//! during evaluation are authenticated
//!
//! The evaluator consults the synchronizer at three points: before a batch,
//! after a batch, and once the whole computation has been evaluated

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::log;

use crate::{error::MpcError, network::BatchedNetwork, protocols::MacCheckProtocol};

use super::{executor::evaluate_to_completion, ResourcePool};

/// The default number of opened values that triggers a MAC check
pub const DEFAULT_OPENED_VALUE_THRESHOLD: usize = 10_000;

/// When MAC checks run
///
/// A check always runs at the end of an evaluation if any opened value is
/// unchecked; this policy only controls the additional checks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacCheckPolicy {
    /// Check after any batch that leaves at least this many unchecked values
    pub opened_value_threshold: usize,
    /// Check before any batch containing a protocol that reveals output
    pub check_before_output: bool,
}

impl Default for MacCheckPolicy {
    fn default() -> Self {
        Self { opened_value_threshold: DEFAULT_OPENED_VALUE_THRESHOLD, check_before_output: true }
    }
}

/// Hooks the evaluator calls around batches
#[async_trait]
pub(crate) trait RoundSynchronizer: Send {
    /// Called before a batch is evaluated
    async fn before_batch(
        &mut self,
        reveals_output: bool,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError>;

    /// Called after a batch is evaluated
    async fn finished_batch(
        &mut self,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError>;

    /// Called once every batch has been evaluated
    async fn finished_eval(
        &mut self,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError>;

    /// The number of MAC checks run so far
    fn checks_run(&self) -> usize;
}

/// Runs the batched SPDZ MAC check according to a `MacCheckPolicy`
pub(crate) struct SpdzRoundSynchronizer {
    /// The trigger policy
    policy: MacCheckPolicy,
    /// The number of checks run
    checks_run: usize,
}

impl SpdzRoundSynchronizer {
    /// Constructor
    pub(crate) fn new(policy: MacCheckPolicy) -> Self {
        Self { policy, checks_run: 0 }
    }

    /// Drain the opened value store and check it
    async fn run_check(
        &mut self,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError> {
        let (shares, values) = pool.opened_values().pop_values();
        log::debug!("party {} checking {} opened values", pool.party_id(), shares.len());

        self.checks_run += 1;
        let protocol = MacCheckProtocol::new(shares, values);
        if let Err(e) = evaluate_to_completion(protocol, pool, network).await {
            log::error!("MAC check failed: {e}");
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl RoundSynchronizer for SpdzRoundSynchronizer {
    async fn before_batch(
        &mut self,
        reveals_output: bool,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError> {
        if reveals_output
            && self.policy.check_before_output
            && pool.opened_values().has_pending_values()
        {
            self.run_check(pool, network).await?;
        }

        Ok(())
    }

    async fn finished_batch(
        &mut self,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError> {
        if pool.opened_values().exceeds_threshold(self.policy.opened_value_threshold.max(1)) {
            self.run_check(pool, network).await?;
        }

        Ok(())
    }

    async fn finished_eval(
        &mut self,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError> {
        if pool.opened_values().has_pending_values() {
            self.run_check(pool, network).await?;
        }

        Ok(())
    }

    fn checks_run(&self) -> usize {
        self.checks_run
    }
}
