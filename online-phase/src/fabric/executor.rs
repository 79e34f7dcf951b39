//! The executor drives native protocols round by round
//!
//! Protocols are pulled from the producer tree in batches. Every protocol in
//! a batch runs round `r` before any runs round `r + 1`, and the network is
//! flushed between rounds, so a batch of independent protocols costs as many
//! network round trips as its longest member

use serde::{Deserialize, Serialize};
use tracing::log;

use crate::{
    error::{MpcError, MpcNetworkError},
    network::BatchedNetwork,
};

use super::{
    native::{EvaluationStatus, Evaluable, NativeNode, NativeProtocol},
    producer::{ProtocolCollection, ProtocolProducer},
    sync::RoundSynchronizer,
    ResourcePool, ResultHandle,
};

/// The default maximum number of protocols in a batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 4096;

/// How the protocols of a batch are scheduled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationStrategy {
    /// Run each protocol of a batch to completion before the next
    Sequential,
    /// Interleave the rounds of every protocol in a batch
    #[default]
    Batched,
}

/// Drives a producer tree to completion
pub(crate) struct ProtocolEvaluator {
    /// How batches are scheduled
    strategy: EvaluationStrategy,
    /// The maximum number of protocols in a batch
    max_batch_size: usize,
    /// Decides when opened values are authenticated
    sync: Box<dyn RoundSynchronizer>,
}

impl ProtocolEvaluator {
    /// Constructor
    pub(crate) fn new(
        strategy: EvaluationStrategy,
        max_batch_size: usize,
        sync: Box<dyn RoundSynchronizer>,
    ) -> Self {
        Self { strategy, max_batch_size, sync }
    }

    /// The number of MAC checks run so far
    pub(crate) fn mac_checks_run(&self) -> usize {
        self.sync.checks_run()
    }

    /// Evaluate every protocol the producer yields, then run the final
    /// synchronization
    pub(crate) async fn eval(
        &mut self,
        mut producer: Box<dyn ProtocolProducer>,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError> {
        let mut n_batches = 0usize;
        while producer.has_next_protocols() {
            let mut collection = ProtocolCollection::new(self.max_batch_size);
            producer.next_protocols(&mut collection);

            self.sync.before_batch(collection.requires_mac_check(), pool, network).await?;
            log::trace!("evaluating batch {n_batches} of {} protocols", collection.len());
            match self.strategy {
                EvaluationStrategy::Sequential => {
                    for protocol in collection.into_protocols() {
                        evaluate_batch(vec![protocol], pool, network).await?;
                    }
                },
                EvaluationStrategy::Batched => {
                    evaluate_batch(collection.into_protocols(), pool, network).await?;
                },
            }

            let unread = network.unconsumed_messages();
            if unread > 0 {
                log::error!("batch {n_batches} left {unread} messages unconsumed");
                return Err(MpcNetworkError::UnconsumedMessages(unread).into());
            }

            self.sync.finished_batch(pool, network).await?;
            n_batches += 1;
        }

        log::debug!("evaluated {n_batches} batches");
        self.sync.finished_eval(pool, network).await
    }
}

/// Run a batch of protocols side by side until all are done
pub(crate) async fn evaluate_batch(
    mut protocols: Vec<Box<dyn Evaluable>>,
    pool: &mut ResourcePool,
    network: &mut BatchedNetwork,
) -> Result<(), MpcError> {
    let mut round = 0;
    while !protocols.is_empty() {
        let mut pending = Vec::with_capacity(protocols.len());
        for mut protocol in protocols.into_iter() {
            if protocol.evaluate(round, pool, network).await? == EvaluationStatus::HasMoreRounds {
                pending.push(protocol);
            }
        }

        network.flush().await?;
        protocols = pending;
        round += 1;
    }

    Ok(())
}

/// Run a single native protocol to completion outside of any producer tree
///
/// Used for protocols the fabric itself schedules, such as MAC checks
pub(crate) async fn evaluate_to_completion<P: NativeProtocol + 'static>(
    protocol: P,
    pool: &mut ResourcePool,
    network: &mut BatchedNetwork,
) -> Result<P::Output, MpcError> {
    let handle = ResultHandle::new();
    let node = NativeNode::new(protocol, handle.clone());
    evaluate_batch(vec![Box::new(node)], pool, network).await?;

    Ok(handle.get())
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;

    use crate::{
        error::{MpcError, MpcNetworkError},
        fabric::{EvaluationStatus, NativeProtocol, ResourcePool},
        network::BatchedNetwork,
        test_helpers::{execute_mock_mpc, test_modulus},
    };

    /// Broadcasts two messages in round 0 but reads only one in round 1
    struct OverSend;

    #[async_trait]
    impl NativeProtocol for OverSend {
        type Output = ();

        async fn evaluate(
            &mut self,
            round: usize,
            _pool: &mut ResourcePool,
            network: &mut BatchedNetwork,
        ) -> Result<EvaluationStatus, MpcError> {
            if round == 0 {
                network.send_to_all(vec![1]);
                network.send_to_all(vec![2]);
                return Ok(EvaluationStatus::HasMoreRounds);
            }

            network.receive_from_all().await?;
            Ok(EvaluationStatus::IsDone)
        }

        fn out(&self) {}
    }

    /// Tests that a batch leaving messages unread fails the computation and
    /// aborts the fabric
    #[tokio::test]
    async fn test_unconsumed_messages_fail() {
        let res = execute_mock_mpc(3, test_modulus(), |mut fabric| async move {
            let res = fabric.run(|b| b.append(OverSend)).await;
            (res, fabric.is_aborted())
        })
        .await;

        for (res, aborted) in res {
            assert_eq!(res, Err(MpcError::NetworkError(MpcNetworkError::UnconsumedMessages(3))));
            assert!(aborted);
        }
    }
}
