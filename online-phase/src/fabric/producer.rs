//! Defines the producers that hand native protocols to the evaluator in
//! batches
//!
//! A producer tree mirrors the composition of a computation: sequential nodes
//! release their children one at a time, parallel nodes release every child
//! at once, and lazy nodes build their subtree only once everything before
//! them has been evaluated

use super::{builder::ProtocolBuilder, native::Evaluable};

/// A batch of native protocols that the evaluator runs side by side
pub(crate) struct ProtocolCollection {
    /// The protocols in the batch
    protocols: Vec<Box<dyn Evaluable>>,
    /// The maximum number of protocols in the batch
    capacity: usize,
}

impl ProtocolCollection {
    /// Constructor
    pub(crate) fn new(capacity: usize) -> Self {
        Self { protocols: Vec::new(), capacity: capacity.max(1) }
    }

    /// Whether another protocol fits in the batch
    pub(crate) fn has_free_capacity(&self) -> bool {
        self.protocols.len() < self.capacity
    }

    /// Add a protocol to the batch
    pub(crate) fn add(&mut self, protocol: Box<dyn Evaluable>) {
        self.protocols.push(protocol);
    }

    /// The number of protocols in the batch
    pub(crate) fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Whether any protocol in the batch reveals output
    pub(crate) fn requires_mac_check(&self) -> bool {
        self.protocols.iter().any(|p| p.requires_mac_check())
    }

    /// Take the protocols out of the batch
    pub(crate) fn into_protocols(self) -> Vec<Box<dyn Evaluable>> {
        self.protocols
    }
}

/// A source of native protocols
pub(crate) trait ProtocolProducer: Send {
    /// Add the next protocols that may run in the same batch
    fn next_protocols(&mut self, collection: &mut ProtocolCollection);
    /// Whether the producer has protocols left
    fn has_next_protocols(&mut self) -> bool;
}

/// Produces a single native protocol
pub(crate) struct NativeProducer {
    /// The protocol, taken when produced
    protocol: Option<Box<dyn Evaluable>>,
}

impl NativeProducer {
    /// Constructor
    pub(crate) fn new(protocol: Box<dyn Evaluable>) -> Self {
        Self { protocol: Some(protocol) }
    }
}

impl ProtocolProducer for NativeProducer {
    fn next_protocols(&mut self, collection: &mut ProtocolCollection) {
        if let Some(protocol) = self.protocol.take() {
            collection.add(protocol);
        }
    }

    fn has_next_protocols(&mut self) -> bool {
        self.protocol.is_some()
    }
}

/// Produces the protocols of its children in order, never releasing a child
/// before the previous child is exhausted
pub(crate) struct SequentialProducer {
    /// The remaining children
    children: Vec<Box<dyn ProtocolProducer>>,
    /// The index of the current child
    cursor: usize,
}

impl SequentialProducer {
    /// Constructor
    pub(crate) fn new(children: Vec<Box<dyn ProtocolProducer>>) -> Self {
        Self { children, cursor: 0 }
    }
}

impl ProtocolProducer for SequentialProducer {
    fn next_protocols(&mut self, collection: &mut ProtocolCollection) {
        while self.cursor < self.children.len() && collection.has_free_capacity() {
            let child = &mut self.children[self.cursor];
            if child.has_next_protocols() {
                child.next_protocols(collection);
                return;
            }

            self.cursor += 1;
        }
    }

    fn has_next_protocols(&mut self) -> bool {
        while self.cursor < self.children.len() {
            if self.children[self.cursor].has_next_protocols() {
                return true;
            }

            // Drop exhausted children eagerly to release their state
            self.children[self.cursor] = Box::new(ExhaustedProducer);
            self.cursor += 1;
        }

        false
    }
}

/// Produces the protocols of all its children side by side
pub(crate) struct ParallelProducer {
    /// The children that still have protocols
    children: Vec<Box<dyn ProtocolProducer>>,
}

impl ParallelProducer {
    /// Constructor
    pub(crate) fn new(children: Vec<Box<dyn ProtocolProducer>>) -> Self {
        Self { children }
    }
}

impl ProtocolProducer for ParallelProducer {
    fn next_protocols(&mut self, collection: &mut ProtocolCollection) {
        for child in self.children.iter_mut() {
            if !collection.has_free_capacity() {
                break;
            }

            if child.has_next_protocols() {
                child.next_protocols(collection);
            }
        }
    }

    fn has_next_protocols(&mut self) -> bool {
        self.children.retain_mut(|child| child.has_next_protocols());
        !self.children.is_empty()
    }
}

/// The deferred body of a lazy producer
pub(crate) type LazyBody = Box<dyn FnOnce() -> ProtocolBuilder + Send>;

/// Builds its subtree the first time it is asked for protocols
///
/// Placed in a sequential producer, this defers building until every earlier
/// sibling has been evaluated, so the body may read their results
pub(crate) struct LazyProducer {
    /// The body, consumed when materialized
    body: Option<LazyBody>,
    /// The materialized subtree
    inner: Option<Box<dyn ProtocolProducer>>,
}

impl LazyProducer {
    /// Constructor
    pub(crate) fn new(body: LazyBody) -> Self {
        Self { body: Some(body), inner: None }
    }

    /// Build the subtree if it has not been built yet
    fn materialize(&mut self) -> &mut Box<dyn ProtocolProducer> {
        if let Some(body) = self.body.take() {
            self.inner = Some(body().into_producer());
        }

        self.inner.as_mut().expect("lazy producer body consumed without a subtree")
    }
}

impl ProtocolProducer for LazyProducer {
    fn next_protocols(&mut self, collection: &mut ProtocolCollection) {
        self.materialize().next_protocols(collection);
    }

    fn has_next_protocols(&mut self) -> bool {
        self.materialize().has_next_protocols()
    }
}

/// A placeholder for a child that has been fully produced
struct ExhaustedProducer;

impl ProtocolProducer for ExhaustedProducer {
    fn next_protocols(&mut self, _collection: &mut ProtocolCollection) {}

    fn has_next_protocols(&mut self) -> bool {
        false
    }
}
