//! Defines the protocols that draw shared randomness from the preprocessing
//! supplier
//!
//! These complete in round 0 without touching the network; they exist as
//! protocols so that draws happen in evaluation order, which every party
//! shares

use async_trait::async_trait;

use crate::{
    algebra::{BitShare, ScalarShare},
    error::MpcError,
    fabric::{EvaluationStatus, NativeProtocol, ResourcePool, ERR_PROTOCOL_NOT_DONE},
    network::BatchedNetwork,
    offline_prep::TruncationPair,
};

use super::require_boolean;

/// The boxed body of a supplier draw
type DrawFn<T> = Box<dyn FnOnce(&mut ResourcePool) -> Result<T, MpcError> + Send>;

/// Draws one item from the supplier
pub struct SupplierDraw<T> {
    /// The draw, consumed on evaluation
    draw: Option<DrawFn<T>>,
    /// The drawn item
    output: Option<T>,
}

impl<T> SupplierDraw<T> {
    /// Wrap a draw
    fn new(draw: DrawFn<T>) -> Self {
        Self { draw: Some(draw), output: None }
    }
}

impl SupplierDraw<ScalarShare> {
    /// Draw a shared random element
    pub fn random_element() -> Self {
        Self::new(Box::new(|pool| pool.supplier().next_random_element()))
    }

    /// Draw a shared random bit as an arithmetic `0` or `1`
    pub fn random_bit() -> Self {
        Self::new(Box::new(|pool| pool.supplier().next_bit()))
    }
}

impl SupplierDraw<BitShare> {
    /// Draw a shared random bit in the boolean representation
    pub fn random_bit_share() -> Self {
        Self::new(Box::new(|pool| {
            require_boolean(pool.modulus(), "a boolean random bit")?;
            pool.supplier().next_bit().map(BitShare::from_arithmetic)
        }))
    }
}

impl SupplierDraw<TruncationPair> {
    /// Draw a pair of masks for truncating by `d` bits
    pub fn truncation_pair(d: u32) -> Self {
        Self::new(Box::new(move |pool| pool.supplier().next_truncation_pair(d)))
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> NativeProtocol for SupplierDraw<T> {
    type Output = T;

    async fn evaluate(
        &mut self,
        _round: usize,
        pool: &mut ResourcePool,
        _network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        let draw = self.draw.take().expect(ERR_PROTOCOL_NOT_DONE);
        self.output = Some(draw(pool)?);
        Ok(EvaluationStatus::IsDone)
    }

    fn out(&self) -> T {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }
}
