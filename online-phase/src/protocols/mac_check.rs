//! Defines the batched MAC check over the values opened since the last check
//!
//! The parties jointly toss a seed with hash commitments, expand it into one
//! non-zero coefficient per opened value, and each computes
//! `sigma_i = sum(r_j * mac_ij) - key_i * sum(r_j * v_j)`. The sigmas are
//! committed before they are opened so that no party can choose its sigma
//! after seeing the others; they sum to zero exactly when every opened value
//! matches its MAC
//!
//! Over a ring the check runs on the stored values modulo `2^(k + s)`. An
//! error below bit `k` keeps a set bit below `2^(k + s)` after being scaled
//! by the key and a coefficient, except with probability about `2^-s`

use async_trait::async_trait;
use digest::{ExtendableOutput, Update, XofReader};
use rand::RngCore;
use sha3::Shake256;
use tracing::log;

use crate::{
    algebra::{Scalar, ScalarShare},
    commitment::{HashCommitment, COMMITMENT_BYTES},
    error::MpcError,
    fabric::{EvaluationStatus, NativeProtocol, ResourcePool},
    network::{BatchedNetwork, PartyId},
};

/// The number of bytes in each party's seed share
const SEED_BYTES: usize = 32;
/// The number of bytes drawn beyond the element width for each coefficient,
/// so that reduction leaves no meaningful bias
const COEFFICIENT_EXTRA_BYTES: usize = 16;

/// Checks the MACs of a batch of opened values
pub struct MacCheckProtocol {
    /// The local shares of the opened values
    shares: Vec<ScalarShare>,
    /// The opened values
    values: Vec<Scalar>,
    /// The commitment to the local seed share
    seed_commitment: Option<HashCommitment>,
    /// The commitment to the local sigma
    sigma_commitment: Option<HashCommitment>,
    /// The commitments received in the previous round, ordered by party
    peer_commitments: Vec<Vec<u8>>,
}

impl MacCheckProtocol {
    /// Constructor
    pub fn new(shares: Vec<ScalarShare>, values: Vec<Scalar>) -> Self {
        assert_eq!(shares.len(), values.len(), "each opened share needs a plaintext");
        Self {
            shares,
            values,
            seed_commitment: None,
            sigma_commitment: None,
            peer_commitments: Vec::new(),
        }
    }

    /// Receive one commitment from every party
    async fn receive_commitments(network: &mut BatchedNetwork) -> Result<Vec<Vec<u8>>, MpcError> {
        let commitments = network.receive_from_all().await?;
        if let Some(idx) = commitments.iter().position(|c| c.len() != COMMITMENT_BYTES) {
            return Err(MpcError::InvalidCommitment(idx as PartyId + 1));
        }

        Ok(commitments)
    }

    /// Receive one opening from every party and check it against the
    /// commitments received earlier
    async fn receive_openings(
        &self,
        network: &mut BatchedNetwork,
    ) -> Result<Vec<Vec<u8>>, MpcError> {
        let openings = network.receive_from_all().await?;
        openings
            .iter()
            .zip(self.peer_commitments.iter())
            .enumerate()
            .map(|(idx, (opening, commitment))| {
                HashCommitment::verify_opening(idx as PartyId + 1, commitment, opening)
            })
            .collect()
    }

    /// Compute the local sigma under the coefficients derived from the
    /// joint seed
    fn compute_sigma(&self, seeds: &[Vec<u8>], pool: &ResourcePool) -> Scalar {
        let modulus = pool.modulus();
        let mut xof = Shake256::default();
        for seed in seeds.iter() {
            xof.update(seed);
        }
        let mut reader = xof.finalize_xof();

        let mut buf = vec![0u8; modulus.n_bytes() + COEFFICIENT_EXTRA_BYTES];
        let mut next_coefficient = || loop {
            reader.read(&mut buf);
            let coeff = Scalar::from_be_bytes_mod_order(&buf, modulus);
            if !coeff.is_zero() {
                return coeff;
            }
        };

        let mut mac_sum = Scalar::zero(modulus);
        let mut value_sum = Scalar::zero(modulus);
        for (share, value) in self.shares.iter().zip(self.values.iter()) {
            let coeff = next_coefficient();
            mac_sum += &share.mac * &coeff;
            value_sum += value * &coeff;
        }

        mac_sum - pool.mac_key_share() * &value_sum
    }
}

#[async_trait]
impl NativeProtocol for MacCheckProtocol {
    type Output = ();

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        match round {
            // Commit to a share of the seed
            0 => {
                let mut seed = [0u8; SEED_BYTES];
                pool.rng().fill_bytes(&mut seed);

                let commitment = HashCommitment::commit(&seed[..], pool.rng());
                network.send_to_all(commitment.commitment().to_vec());
                self.seed_commitment = Some(commitment);
            },

            // Open the seed share once every party has committed
            1 => {
                self.peer_commitments = Self::receive_commitments(network).await?;
                let commitment = self.seed_commitment.take().expect("seed committed in round 0");
                network.send_to_all(commitment.opening());
            },

            // Derive the coefficients and commit to sigma
            2 => {
                let seeds = self.receive_openings(network).await?;
                if let Some(idx) = seeds.iter().position(|s| s.len() != SEED_BYTES) {
                    return Err(MpcError::InvalidCommitment(idx as PartyId + 1));
                }

                let sigma = self.compute_sigma(&seeds, pool);
                let commitment = HashCommitment::commit(&sigma, pool.rng());
                network.send_to_all(commitment.commitment().to_vec());
                self.sigma_commitment = Some(commitment);
            },

            // Open sigma once every party has committed
            3 => {
                self.peer_commitments = Self::receive_commitments(network).await?;
                let commitment = self.sigma_commitment.take().expect("sigma committed in round 2");
                network.send_to_all(commitment.opening());
            },

            // Check that the sigmas sum to zero
            _ => {
                let sigmas = self
                    .receive_openings(network)
                    .await?
                    .iter()
                    .map(|bytes| Scalar::from_be_bytes(bytes, pool.modulus()))
                    .collect::<Result<Vec<_>, _>>()?;
                let total =
                    sigmas.into_iter().fold(Scalar::zero(pool.modulus()), |acc, s| acc + s);

                if !total.is_zero() {
                    log::error!(
                        "party {} MAC check over {} values failed",
                        pool.party_id(),
                        self.values.len()
                    );
                    return Err(MpcError::AuthenticationError);
                }

                log::debug!("MAC check over {} values passed", self.values.len());
                return Ok(EvaluationStatus::IsDone);
            },
        }

        Ok(EvaluationStatus::HasMoreRounds)
    }

    fn out(&self) {}
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use itertools::Itertools;
    use num_bigint::BigUint;
    use num_traits::One;
    use rand::thread_rng;

    use crate::{
        algebra::{share_plain, share_value, Modulus, Scalar, ScalarShare},
        error::MpcError,
        protocols::{InputProtocol, OpenToAll},
        test_helpers::{execute_mock_mpc, test_modulus, test_ring},
        PARTY1,
    };

    /// Input 17 from the first party, add `delta` to the first party's share
    /// without touching its MAC, and open the result
    async fn open_corrupted(
        n_parties: usize,
        modulus: Arc<Modulus>,
        delta: Scalar,
    ) -> Vec<Result<Scalar, MpcError>> {
        execute_mock_mpc(n_parties, modulus.clone(), move |mut fabric| {
            let (m, delta) = (modulus.clone(), delta.clone());
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let value = Scalar::from_u64(17, &m);
                        let x = b.append(InputProtocol::new(Some(value), PARTY1));
                        let corrupted = b.gate(move |_| {
                            let mut share = x.get();
                            if me == PARTY1 {
                                share.share = &share.share + &delta;
                            }
                            Ok(share)
                        });
                        b.append(OpenToAll::new(corrupted))
                    })
                    .await
            }
        })
        .await
    }

    /// Sum the sigmas every party computes for a batch under fixed coefficients
    fn sigma_sum(
        shares: &[Vec<ScalarShare>],
        values: &[Scalar],
        key_shares: &[Scalar],
        coefficients: &[Scalar],
    ) -> Scalar {
        let modulus = values[0].modulus();
        shares
            .iter()
            .zip(key_shares.iter())
            .map(|(party_shares, key)| {
                let mac_sum = party_shares
                    .iter()
                    .zip(coefficients.iter())
                    .fold(Scalar::zero(modulus), |acc, (s, c)| acc + &s.mac * c);
                let value_sum = values
                    .iter()
                    .zip(coefficients.iter())
                    .fold(Scalar::zero(modulus), |acc, (v, c)| acc + v * c);
                mac_sum - key * value_sum
            })
            .fold(Scalar::zero(modulus), |acc, s| acc + s)
    }

    /// Tests the sigma relation directly: honest batches sum to zero, a
    /// batch with one shifted share does not
    #[test]
    fn test_sigma_relation() {
        let mut rng = thread_rng();
        let m = test_modulus();
        let key = Scalar::random_nonzero(&m, &mut rng);
        let key_shares = share_plain(&key, 3, &mut rng);

        let values = (0..5).map(|_| Scalar::random(&m, &mut rng)).collect_vec();
        let coefficients = (0..5).map(|_| Scalar::random_nonzero(&m, &mut rng)).collect_vec();
        let sharings = values.iter().map(|v| share_value(v, &key, 3, &mut rng)).collect_vec();

        // Transpose to per-party shares
        let per_party =
            (0..3).map(|p| sharings.iter().map(|s| s[p].clone()).collect_vec()).collect_vec();
        assert!(sigma_sum(&per_party, &values, &key_shares, &coefficients).is_zero());

        let mut tampered = values.clone();
        tampered[2] = &tampered[2] + Scalar::one(&m);
        assert!(!sigma_sum(&per_party, &tampered, &key_shares, &coefficients).is_zero());
    }

    /// Tests that corrupting one party's share, but not its MAC, fails the
    /// check deterministically
    #[tokio::test]
    async fn test_corrupted_share_fails() {
        let m = test_modulus();
        for _ in 0..5 {
            let res = open_corrupted(2, m.clone(), Scalar::one(&m)).await;
            for party_res in res {
                assert_eq!(party_res, Err(MpcError::AuthenticationError));
            }
        }
    }

    /// Tests that flipping the top plaintext bit of a ring share is caught on
    /// every run, although the key and coefficients may be even
    #[tokio::test]
    async fn test_ring_top_bit_corruption_fails() {
        let ring = test_ring();
        let top_bit = BigUint::one() << (ring.bit_length() - 1);
        let delta = Scalar::new(top_bit, &ring);

        for _ in 0..20 {
            let res = open_corrupted(2, ring.clone(), delta.clone()).await;
            for party_res in res {
                assert_eq!(party_res, Err(MpcError::AuthenticationError));
            }
        }
    }
}
