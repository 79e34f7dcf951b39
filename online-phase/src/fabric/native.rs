//! Defines the native protocol state machine, the atomic unit of evaluation
//!
//! A native protocol is driven through rounds `0, 1, ...` by repeated calls
//! to `evaluate`. Within a round it may buffer messages and receive the
//! messages peers buffered in the previous round; the evaluator flushes the
//! network between rounds

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    algebra::{Modulus, Scalar},
    error::MpcError,
    network::{BatchedNetwork, PartyId},
};

use super::{ResourcePool, ResultHandle};

/// Error message when a protocol's output is read before it finished
pub(crate) const ERR_PROTOCOL_NOT_DONE: &str = "protocol output read before it finished";
/// Error message when a protocol is evaluated after it finished
const ERR_PROTOCOL_DONE: &str = "protocol evaluated after it finished";

/// The state of a native protocol after a round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// The protocol must be evaluated again in the next round
    HasMoreRounds,
    /// The protocol is done and its output is readable
    IsDone,
}

/// A protocol evaluated round by round against the local resources and the
/// network
#[async_trait]
pub trait NativeProtocol: Send {
    /// The result of the protocol
    type Output: Clone + Send + Sync + 'static;

    /// Evaluate round `round` of the protocol
    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError>;

    /// The output of the protocol
    ///
    /// Panics if called before `evaluate` returned `IsDone`
    fn out(&self) -> Self::Output;

    /// Whether the protocol reveals output, so that values opened before it
    /// must be checked first
    fn requires_mac_check(&self) -> bool {
        false
    }
}

// -----------------------
// | Type Erased Nodes |
// -----------------------

/// A native protocol bound to the handle its output resolves
#[async_trait]
pub(crate) trait Evaluable: Send {
    /// Evaluate the next round
    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError>;

    /// Whether the protocol reveals output
    fn requires_mac_check(&self) -> bool;
}

/// A native protocol and the handle it resolves when done
pub(crate) struct NativeNode<P: NativeProtocol> {
    /// The protocol
    protocol: P,
    /// The handle resolved with the protocol's output
    handle: ResultHandle<P::Output>,
    /// Whether the protocol has terminated
    done: bool,
}

impl<P: NativeProtocol> NativeNode<P> {
    /// Constructor
    pub(crate) fn new(protocol: P, handle: ResultHandle<P::Output>) -> Self {
        Self { protocol, handle, done: false }
    }
}

#[async_trait]
impl<P: NativeProtocol> Evaluable for NativeNode<P> {
    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        assert!(!self.done, "{}", ERR_PROTOCOL_DONE);

        let status = self.protocol.evaluate(round, pool, network).await?;
        if status == EvaluationStatus::IsDone {
            self.done = true;
            self.handle.resolve(self.protocol.out());
        }

        Ok(status)
    }

    fn requires_mac_check(&self) -> bool {
        self.protocol.requires_mac_check()
    }
}

// ---------
// | Gates |
// ---------

/// The local context a gate computes in
pub struct GateContext<'a> {
    /// The local party
    pub party_id: PartyId,
    /// The number of parties
    pub n_parties: usize,
    /// The local share of the global MAC key
    pub mac_key_share: &'a Scalar,
    /// The modulus
    pub modulus: &'a Arc<Modulus>,
}

/// The boxed body of a gate
pub(crate) type GateFn<T> = Box<dyn FnOnce(&GateContext) -> Result<T, MpcError> + Send>;

/// A protocol that runs a local computation in round 0 without touching the
/// network
///
/// Gates implement the linear operations on shares and every other local
/// combinator; their inputs must be resolved when they are evaluated
pub(crate) struct GateProtocol<T> {
    /// The computation, consumed on evaluation
    gate: Option<GateFn<T>>,
    /// The output of the computation
    output: Option<T>,
}

impl<T> GateProtocol<T> {
    /// Constructor
    pub(crate) fn new(gate: GateFn<T>) -> Self {
        Self { gate: Some(gate), output: None }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> NativeProtocol for GateProtocol<T> {
    type Output = T;

    async fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        let gate = self.gate.take().expect(ERR_PROTOCOL_DONE);
        let ctx = GateContext {
            party_id: pool.party_id(),
            n_parties: pool.num_parties(),
            mac_key_share: pool.mac_key_share(),
            modulus: pool.modulus(),
        };

        self.output = Some(gate(&ctx)?);
        Ok(EvaluationStatus::IsDone)
    }

    fn out(&self) -> T {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }
}
