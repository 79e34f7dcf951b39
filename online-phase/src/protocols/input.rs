//! Defines the protocol through which a party secret shares a private input
//!
//! The input party holds the opening of a preprocessed mask `r` and
//! broadcasts `x - r`; every party adds the broadcast to its share of `r`.
//! With more than two parties the broadcast is echoed as a digest so that an
//! input party cannot send different values to different peers

use async_trait::async_trait;
use sha3::{Digest, Sha3_256};
use tracing::log;

use crate::{
    algebra::{Scalar, ScalarShare},
    error::MpcError,
    fabric::{EvaluationStatus, NativeProtocol, ResourcePool, ERR_PROTOCOL_NOT_DONE},
    network::{BatchedNetwork, PartyId},
    offline_prep::InputMask,
};

/// Secret shares a value provided by a single party
pub struct InputProtocol {
    /// The value, only meaningful at the input party
    value: Option<Scalar>,
    /// The party providing the value
    input_party: PartyId,
    /// The preprocessed mask, drawn in round 0
    mask: Option<InputMask>,
    /// The digest of the received broadcast, kept for echo validation
    broadcast_digest: Option<[u8; 32]>,
    /// The resulting share
    output: Option<ScalarShare>,
}

impl InputProtocol {
    /// Constructor
    ///
    /// Parties other than `input_party` may pass `None`; any value they pass
    /// is ignored
    pub fn new(value: Option<Scalar>, input_party: PartyId) -> Self {
        Self { value, input_party, mask: None, broadcast_digest: None, output: None }
    }

    /// Draw the mask and, at the input party, broadcast the masked value
    fn send_masked_input(
        &mut self,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<(), MpcError> {
        if self.input_party == 0 || self.input_party as usize > pool.num_parties() {
            return Err(MpcError::InvalidInput(format!(
                "input from unknown party {}",
                self.input_party
            )));
        }

        let mask = pool.supplier().next_input_mask(self.input_party)?;
        if pool.party_id() == self.input_party {
            let value = self.value.take().ok_or_else(|| {
                MpcError::InvalidInput("input party did not provide a value".to_string())
            })?;
            if value.modulus() != pool.modulus() {
                return Err(MpcError::InvalidInput(format!(
                    "input lives in {}, the computation runs over {}",
                    value.modulus(),
                    pool.modulus()
                )));
            }

            let r = mask.open_value.as_ref().ok_or_else(|| {
                MpcError::SupplierExhausted("input mask without its opening".to_string())
            })?;
            network.send_to_all((value - r).to_bytes_be());
        }

        self.mask = Some(mask);
        Ok(())
    }
}

#[async_trait]
impl NativeProtocol for InputProtocol {
    type Output = ScalarShare;

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        match round {
            0 => {
                self.send_masked_input(pool, network)?;
                Ok(EvaluationStatus::HasMoreRounds)
            },
            1 => {
                let payload = network.receive(self.input_party).await?;
                let masked = Scalar::from_be_bytes(&payload, pool.modulus())?;

                let mask = self.mask.take().expect(ERR_PROTOCOL_NOT_DONE);
                let share = mask.mask_share.add_public(
                    &masked,
                    pool.mac_key_share(),
                    pool.party_id(),
                );
                self.output = Some(share);

                if pool.num_parties() <= 2 {
                    return Ok(EvaluationStatus::IsDone);
                }

                let digest: [u8; 32] = Sha3_256::digest(&payload).into();
                network.send_to_all(digest.to_vec());
                self.broadcast_digest = Some(digest);
                Ok(EvaluationStatus::HasMoreRounds)
            },
            _ => {
                let own = self.broadcast_digest.expect(ERR_PROTOCOL_NOT_DONE);
                for (idx, digest) in network.receive_from_all().await?.into_iter().enumerate() {
                    if digest != own {
                        let party = idx as PartyId + 1;
                        let sender = self.input_party;
                        log::error!("party {party} saw a different broadcast from {sender}");
                        return Err(MpcError::BroadcastMismatch(party));
                    }
                }

                Ok(EvaluationStatus::IsDone)
            },
        }
    }

    fn out(&self) -> ScalarShare {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        algebra::Scalar,
        error::MpcError,
        fabric::ResultHandle,
        protocols::{InputProtocol, OpenToAll},
        test_helpers::{execute_mock_mpc, test_modulus},
    };

    /// Tests that each party can input a value that all parties then open
    #[tokio::test]
    async fn test_input_open() {
        for n_parties in [2, 3, 4] {
            let m = test_modulus();
            let m_clone = m.clone();
            let res = execute_mock_mpc(n_parties, m.clone(), move |mut fabric| {
                let m = m_clone.clone();
                async move {
                    let me = fabric.party_id();
                    fabric
                        .run(move |b| {
                            let opened = (1..=n_parties as u64)
                                .map(|party| {
                                    let value = Scalar::from_u64(100 + party, &m);
                                    let share = b.append(InputProtocol::new(
                                        (party == me).then_some(value),
                                        party,
                                    ));
                                    b.append(OpenToAll::new(share))
                                })
                                .collect::<Vec<ResultHandle<Scalar>>>();
                            b.collect(opened)
                        })
                        .await
                }
            })
            .await;

            let expected =
                (1..=n_parties as u64).map(|p| Scalar::from_u64(100 + p, &m)).collect::<Vec<_>>();
            for party_res in res {
                assert_eq!(party_res.unwrap(), expected);
            }
        }
    }

    /// Tests that the input party must provide a value
    #[tokio::test]
    async fn test_missing_input() {
        let res = execute_mock_mpc(2, test_modulus(), |mut fabric| async move {
            fabric.run(|b| b.append(InputProtocol::new(None, 1))).await
        })
        .await;

        assert!(matches!(res[0], Err(MpcError::InvalidInput(_))));
    }
}
