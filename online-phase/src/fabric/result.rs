//! Defines the abstractions over the result of an MPC operation, this can be a
//! simple local computation, a network operation, or a more complex operation
//! like a Beaver multiplication
//!
//! A `ResultHandle` is a single-assignment cell: the evaluator writes it
//! exactly once, when the native protocol producing it terminates, and it may
//! be read any number of times afterwards

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, RwLock},
};

use crate::{
    algebra::{BitShare, Scalar, ScalarShare},
    error::MpcError,
};

/// A type alias representing a shared reference to a value
pub(crate) type Shared<T> = Arc<RwLock<T>>;

/// Error message when a result buffer lock is poisoned
pub(crate) const ERR_RESULT_BUFFER_POISONED: &str = "result buffer lock poisoned";
/// Error message when a result is read before its protocol has finished
const ERR_RESULT_NOT_READY: &str = "result read before the protocol producing it finished";
/// Error message when a result is written twice
const ERR_RESULT_ALREADY_RESOLVED: &str = "result resolved twice";

// -----------
// | Aliases |
// -----------

/// A handle on an authenticated share of an arithmetic value
pub type AuthenticatedScalarResult = ResultHandle<ScalarShare>;
/// A handle on a public value
pub type ScalarResult = ResultHandle<Scalar>;
/// A handle on an authenticated share of a boolean value
pub type AuthenticatedBitResult = ResultHandle<BitShare>;
/// A handle on a value opened to a single party, present only at that party
pub type OpenedResult = ResultHandle<Option<Scalar>>;

// ---------------
// | Handle Type |
// ---------------

/// A handle to the result of a native protocol in a computation
///
/// This handle acts as a pointer to a possibly incomplete result; it becomes
/// readable once the evaluator has run the producing protocol to completion
pub struct ResultHandle<T> {
    /// The buffer that the result will be written to when it becomes available
    result_buffer: Shared<Option<T>>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self { result_buffer: self.result_buffer.clone() }
    }
}

impl<T: Debug> Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let locked = self.result_buffer.read().expect(ERR_RESULT_BUFFER_POISONED);
        f.debug_tuple("ResultHandle").field(&*locked).finish()
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Constructor, an unresolved handle
    pub(crate) fn new() -> Self {
        Self { result_buffer: Arc::new(RwLock::new(None)) }
    }

    /// A handle that is already resolved to the given value
    pub fn ready(value: T) -> Self {
        Self { result_buffer: Arc::new(RwLock::new(Some(value))) }
    }

    /// Whether the producing protocol has finished
    pub fn is_resolved(&self) -> bool {
        self.result_buffer.read().expect(ERR_RESULT_BUFFER_POISONED).is_some()
    }

    /// Read the result
    ///
    /// Panics if the producing protocol has not finished; reading a result
    /// early is a composition error, not a runtime condition
    pub fn get(&self) -> T {
        self.try_get().expect(ERR_RESULT_NOT_READY)
    }

    /// Read the result if it is available
    pub fn try_get(&self) -> Option<T> {
        self.result_buffer.read().expect(ERR_RESULT_BUFFER_POISONED).clone()
    }

    /// Write the result
    ///
    /// Panics if the result was already written
    pub(crate) fn resolve(&self, value: T) {
        let mut locked = self.result_buffer.write().expect(ERR_RESULT_BUFFER_POISONED);
        assert!(locked.is_none(), "{}", ERR_RESULT_ALREADY_RESOLVED);
        *locked = Some(value);
    }
}

impl<T: Clone> ResultHandle<Vec<T>> {
    /// Read the `i`th element of a resolved batch
    ///
    /// Panics if the producing protocol has not finished, as [`Self::get`]
    /// does. An index past the end of the batch is an error
    pub fn get_index(&self, i: usize) -> Result<T, MpcError> {
        let locked = self.result_buffer.read().expect(ERR_RESULT_BUFFER_POISONED);
        let batch = locked.as_ref().expect(ERR_RESULT_NOT_READY);
        batch.get(i).cloned().ok_or_else(|| {
            MpcError::InvalidInput(format!("index {i} out of range for a batch of {}", batch.len()))
        })
    }
}

// ------------
// | Deferred |
// ------------

/// A handle, or a composite of handles, that becomes readable once every
/// handle in it is resolved
///
/// Sub-computations return a `Deferred`, which is read only after the whole
/// sub-computation has been evaluated
pub trait Deferred: Send + 'static {
    /// The value read from the resolved handles
    type Output: Clone + Send + Sync + 'static;

    /// Read the value if every handle is resolved
    fn try_read(&self) -> Option<Self::Output>;

    /// Read the value
    ///
    /// Panics if any handle is unresolved
    fn read(&self) -> Self::Output {
        self.try_read().expect(ERR_RESULT_NOT_READY)
    }
}

impl<T: Clone + Send + Sync + 'static> Deferred for ResultHandle<T> {
    type Output = T;

    fn try_read(&self) -> Option<T> {
        self.try_get()
    }
}

impl<D: Deferred> Deferred for Vec<D> {
    type Output = Vec<D::Output>;

    fn try_read(&self) -> Option<Self::Output> {
        self.iter().map(Deferred::try_read).collect()
    }
}

impl<A: Deferred, B: Deferred> Deferred for (A, B) {
    type Output = (A::Output, B::Output);

    fn try_read(&self) -> Option<Self::Output> {
        Some((self.0.try_read()?, self.1.try_read()?))
    }
}
