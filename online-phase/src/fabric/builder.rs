//! Defines the protocol builder, which composes native protocols into a
//! computation and hands out handles to their results
//!
//! A builder is either sequential, in which case its children are evaluated
//! strictly one after the other and each may read the results of those
//! before it, or parallel, in which case its children share batches and must
//! not depend on one another

use std::sync::Arc;

use crate::{algebra::Modulus, error::MpcError, network::PartyId};

use super::{
    native::{GateContext, GateProtocol, NativeNode, NativeProtocol},
    producer::{
        LazyProducer, NativeProducer, ParallelProducer, ProtocolProducer, SequentialProducer,
    },
    Deferred, ResultHandle,
};

/// The parameters of the local party a builder composes for
#[derive(Clone, Debug)]
pub(crate) struct BuilderContext {
    /// The local party
    pub(crate) party_id: PartyId,
    /// The number of parties
    pub(crate) n_parties: usize,
    /// The modulus
    pub(crate) modulus: Arc<Modulus>,
}

/// How a builder composes its children
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Composition {
    /// One child at a time, in order
    Sequential,
    /// All children side by side
    Parallel,
}

/// Composes native protocols and local gates into a computation
pub struct ProtocolBuilder {
    /// How the children are composed
    composition: Composition,
    /// The local party's parameters
    ctx: BuilderContext,
    /// The producers of the children, in the order they were added
    children: Vec<Box<dyn ProtocolProducer>>,
}

impl ProtocolBuilder {
    /// A sequential builder
    pub(crate) fn sequential(ctx: BuilderContext) -> Self {
        Self { composition: Composition::Sequential, ctx, children: Vec::new() }
    }

    /// A parallel builder
    pub(crate) fn parallel(ctx: BuilderContext) -> Self {
        Self { composition: Composition::Parallel, ctx, children: Vec::new() }
    }

    /// The local party
    pub fn party_id(&self) -> PartyId {
        self.ctx.party_id
    }

    /// The number of parties
    pub fn num_parties(&self) -> usize {
        self.ctx.n_parties
    }

    /// The modulus of the computation
    pub fn modulus(&self) -> Arc<Modulus> {
        self.ctx.modulus.clone()
    }

    /// Whether the children of this builder share batches
    pub fn is_parallel(&self) -> bool {
        self.composition == Composition::Parallel
    }

    /// Append a native protocol, returning a handle to its output
    pub fn append<P: NativeProtocol + 'static>(&mut self, protocol: P) -> ResultHandle<P::Output> {
        let handle = ResultHandle::new();
        self.append_with_handle(protocol, handle.clone());
        handle
    }

    /// Append a native protocol that resolves the given handle
    fn append_with_handle<P: NativeProtocol + 'static>(
        &mut self,
        protocol: P,
        handle: ResultHandle<P::Output>,
    ) {
        let node = NativeNode::new(protocol, handle);
        self.children.push(Box::new(NativeProducer::new(Box::new(node))));
    }

    /// Append a local computation
    ///
    /// The computation runs when the gate is evaluated; every handle it reads
    /// must be produced by an earlier step of a sequential composition
    pub fn gate<T, F>(&mut self, f: F) -> ResultHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&GateContext) -> Result<T, MpcError> + Send + 'static,
    {
        self.append(GateProtocol::new(Box::new(f)))
    }

    /// Gather handles into a single handle once they are resolved
    ///
    /// This appends a gate, so in a parallel composition the handles must be
    /// produced before the composition; return the handles from the closure
    /// of `par` instead to gather the results of its children
    pub fn collect<D: Deferred>(&mut self, handles: D) -> ResultHandle<D::Output> {
        self.gate(move |_| Ok(handles.read()))
    }

    /// Append a sub-computation built when everything before it is evaluated
    fn lazy<D, F>(&mut self, composition: Composition, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut ProtocolBuilder) -> D + Send + 'static,
    {
        let out = ResultHandle::new();
        let out_clone = out.clone();
        let ctx = self.ctx.clone();

        self.children.push(Box::new(LazyProducer::new(Box::new(move || {
            let mut inner = match composition {
                Composition::Sequential => ProtocolBuilder::sequential(ctx.clone()),
                Composition::Parallel => ProtocolBuilder::parallel(ctx.clone()),
            };
            let inner_out = f(&mut inner);

            // Forward the inner result once the whole sub-computation is done
            let mut wrapper = ProtocolBuilder::sequential(ctx);
            wrapper.children.push(inner.into_producer());
            let forward = GateProtocol::new(Box::new(move |_| Ok(inner_out.read())));
            wrapper.append_with_handle(forward, out_clone);
            wrapper
        }))));

        out
    }

    /// Append a sequential sub-computation
    ///
    /// The closure runs once everything appended before it has been
    /// evaluated, so it may read earlier results; the returned handle
    /// resolves to the closure's result when the sub-computation is done
    pub fn seq<D, F>(&mut self, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut ProtocolBuilder) -> D + Send + 'static,
    {
        self.lazy(Composition::Sequential, f)
    }

    /// Append a parallel sub-computation
    ///
    /// The protocols appended inside the closure share batches and must not
    /// read one another's results
    pub fn par<D, F>(&mut self, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut ProtocolBuilder) -> D + Send + 'static,
    {
        self.lazy(Composition::Parallel, f)
    }

    /// Convert the builder into the producer the evaluator consumes
    pub(crate) fn into_producer(self) -> Box<dyn ProtocolProducer> {
        match self.composition {
            Composition::Sequential => Box::new(SequentialProducer::new(self.children)),
            Composition::Parallel => Box::new(ParallelProducer::new(self.children)),
        }
    }
}
