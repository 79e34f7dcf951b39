//! Defines the conversion of a boolean share into an arithmetic share of the
//! same bit
//!
//! The parties open `c = x + r + 2R` for a shared random bit `r` and a shared
//! random element `R`. The low bit of `c` is `x_0 XOR r`, so the arithmetic
//! bit is `r` when it is zero and `1 - r` otherwise

use async_trait::async_trait;

use crate::{
    algebra::{Scalar, ScalarShare},
    error::MpcError,
    fabric::{
        AuthenticatedBitResult, EvaluationStatus, NativeProtocol, ResourcePool,
        ERR_PROTOCOL_NOT_DONE,
    },
    network::BatchedNetwork,
};

use super::{open::mask_high_bits, require_boolean, sum_elements};

/// Converts a boolean share to an arithmetic `0` or `1`
pub struct ToArithmetic {
    /// The bit to convert
    input: AuthenticatedBitResult,
    /// The random bit `r` and the masked share, set in round 0
    state: Option<(ScalarShare, ScalarShare)>,
    /// The arithmetic share of the bit
    output: Option<ScalarShare>,
}

impl ToArithmetic {
    /// Constructor
    pub fn new(input: AuthenticatedBitResult) -> Self {
        Self { input, state: None, output: None }
    }
}

#[async_trait]
impl NativeProtocol for ToArithmetic {
    type Output = ScalarShare;

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        if round == 0 {
            require_boolean(pool.modulus(), "boolean to arithmetic conversion")?;

            let r = pool.supplier().next_bit()?;
            let masked = mask_high_bits(&self.input.get(), pool)? + &r;
            network.send_to_all(masked.share.to_bytes_be());

            self.state = Some((r, masked));
            return Ok(EvaluationStatus::HasMoreRounds);
        }

        let opened = sum_elements(&network.receive_from_all().await?, pool.modulus())?;
        let (r, masked) = self.state.take().expect(ERR_PROTOCOL_NOT_DONE);
        pool.opened_values().push(masked, opened.clone());

        let output = if opened.bit_value() {
            let one = Scalar::one(pool.modulus());
            (-r).add_public(&one, pool.mac_key_share(), pool.party_id())
        } else {
            r
        };
        self.output = Some(output);

        Ok(EvaluationStatus::IsDone)
    }

    fn out(&self) -> ScalarShare {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }
}
