//! Defines Beaver triple multiplication of two shared values
//!
//! Given a triple `(a, b, c = a * b)`, the parties open `e = x - a` and
//! `d = y - b` and compute `z = c + b * e + a * d + e * d` locally. The
//! boolean variant runs over a bit triple and keeps only the low bits of the
//! opened values, so the product is the AND of the low bits

use async_trait::async_trait;

use crate::{
    algebra::{BitShare, Scalar, ScalarShare},
    error::MpcError,
    fabric::{EvaluationStatus, NativeProtocol, ResourcePool, ResultHandle, ERR_PROTOCOL_NOT_DONE},
    network::BatchedNetwork,
    offline_prep::Triple,
};

use super::require_boolean;

/// A value that can be multiplied with a Beaver triple
pub trait Multiplicand: Clone + Send + Sync + 'static {
    /// Whether the value is a boolean share
    const BOOLEAN: bool;

    /// The underlying ring element share
    fn into_share(self) -> ScalarShare;
    /// Wrap a ring element share
    fn from_share(share: ScalarShare) -> Self;
}

impl Multiplicand for ScalarShare {
    const BOOLEAN: bool = false;

    fn into_share(self) -> ScalarShare {
        self
    }

    fn from_share(share: ScalarShare) -> Self {
        share
    }
}

impl Multiplicand for BitShare {
    const BOOLEAN: bool = true;

    fn into_share(self) -> ScalarShare {
        self.0
    }

    fn from_share(share: ScalarShare) -> Self {
        BitShare(share)
    }
}

/// Multiplies two shared values, consuming one triple
pub struct MultiplyProtocol<S: Multiplicand> {
    /// The left operand
    left: ResultHandle<S>,
    /// The right operand
    right: ResultHandle<S>,
    /// The triple and the shares of `e` and `d`, set in round 0
    state: Option<(Triple, ScalarShare, ScalarShare)>,
    /// The product
    output: Option<S>,
}

impl<S: Multiplicand> MultiplyProtocol<S> {
    /// Constructor
    pub fn new(left: ResultHandle<S>, right: ResultHandle<S>) -> Self {
        Self { left, right, state: None, output: None }
    }
}

#[async_trait]
impl<S: Multiplicand> NativeProtocol for MultiplyProtocol<S> {
    type Output = S;

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        if round == 0 {
            let triple = if S::BOOLEAN {
                require_boolean(pool.modulus(), "boolean multiplication")?;
                pool.supplier().next_bit_triple()?
            } else {
                pool.supplier().next_triple()?
            };

            let e_share = self.left.get().into_share() - &triple.left;
            let d_share = self.right.get().into_share() - &triple.right;

            let mut payload = e_share.share.to_bytes_be();
            payload.extend(d_share.share.to_bytes_be());
            network.send_to_all(payload);

            self.state = Some((triple, e_share, d_share));
            return Ok(EvaluationStatus::HasMoreRounds);
        }

        let modulus = pool.modulus().clone();
        let (mut e, mut d) = (Scalar::zero(&modulus), Scalar::zero(&modulus));
        for msg in network.receive_from_all().await? {
            let elems = Scalar::batch_from_be_bytes(&msg, &modulus)?;
            if elems.len() != 2 {
                return Err(MpcError::InvalidInput(format!(
                    "expected 2 elements in a multiplication message, got {}",
                    elems.len()
                )));
            }

            e += elems[0].clone();
            d += elems[1].clone();
        }

        let (triple, e_share, d_share) = self.state.take().expect(ERR_PROTOCOL_NOT_DONE);
        pool.opened_values().push(e_share, e.clone());
        pool.opened_values().push(d_share, d.clone());

        if S::BOOLEAN {
            e = e.to_bit();
            d = d.to_bit();
        }

        let z = triple.product + &triple.right * &e + &triple.left * &d;
        let z = z.add_public(&(&e * &d), pool.mac_key_share(), pool.party_id());
        self.output = Some(S::from_share(z));

        Ok(EvaluationStatus::IsDone)
    }

    fn out(&self) -> S {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use itertools::Itertools;
    use rand::{thread_rng, Rng};

    use crate::{
        algebra::{reconstruct, BitShare, Modulus, Scalar, ScalarShare},
        error::MpcError,
        fabric::ResultHandle,
        network::PartyId,
        offline_prep::{InputMask, PreprocessingPhase, Triple, TruncationPair},
        protocols::{InputProtocol, MultiplyProtocol, OpenBit, OpenToAll},
        test_helpers::{
            execute_mock_mpc, execute_mock_mpc_with_suppliers, test_modulus, test_ring,
        },
        PARTY1, PARTY2,
    };

    /// Tests that products of random inputs open to the product of the
    /// inputs, and that the product is authenticated
    #[tokio::test]
    async fn test_mult_correctness() {
        let mut rng = thread_rng();
        for m in [test_modulus(), test_ring()] {
            let a = Scalar::random(&m, &mut rng);
            let b = Scalar::random(&m, &mut rng);
            let expected = &a * &b;
            let expected_plain = expected.to_plaintext();

            let res = execute_mock_mpc(3, m.clone(), move |mut fabric| {
                let (a, b) = (a.clone(), b.clone());
                async move {
                    fabric
                        .run(move |builder| {
                            let a = builder.append(InputProtocol::new(Some(a), PARTY1));
                            let b = builder.append(InputProtocol::new(Some(b), PARTY2));
                            let prod = builder.append(MultiplyProtocol::new(a, b));
                            let open = builder.append(OpenToAll::new(prod.clone()));
                            builder.gate(move |_| Ok((prod.get(), open.get())))
                        })
                        .await
                }
            })
            .await;

            let res = res.into_iter().map(Result::unwrap).collect_vec();
            assert!(res.iter().all(|(_, open)| open == &expected_plain));

            let shares = res.iter().map(|(share, _)| share.clone()).collect_vec();
            let (value, _) = reconstruct(&shares);
            assert_eq!(value, expected);
        }
    }

    /// Tests AND over bit triples, with garbage in the high bits of the
    /// operands
    #[tokio::test]
    async fn test_boolean_mult() {
        let mut rng = thread_rng();
        let ring = test_ring();

        for _ in 0..4 {
            let (x, y): (bool, bool) = (rng.gen(), rng.gen());
            let pad_x = Scalar::random(&ring, &mut rng) * Scalar::from_u64(2, &ring);
            let pad_y = Scalar::random(&ring, &mut rng) * Scalar::from_u64(2, &ring);
            let x_val = Scalar::from_bit(x, &ring) + pad_x;
            let y_val = Scalar::from_bit(y, &ring) + pad_y;

            let res = execute_mock_mpc(2, ring.clone(), move |mut fabric| {
                let (x_val, y_val) = (x_val.clone(), y_val.clone());
                async move {
                    fabric
                        .run(move |b| {
                            let x = b.append(InputProtocol::new(Some(x_val), PARTY1));
                            let y = b.append(InputProtocol::new(Some(y_val), PARTY2));
                            let x_bit = b.gate(move |_| Ok(BitShare::from_arithmetic(x.get())));
                            let y_bit = b.gate(move |_| Ok(BitShare::from_arithmetic(y.get())));
                            let and = b.append(MultiplyProtocol::new(x_bit, y_bit));
                            b.append(OpenBit::new(and))
                        })
                        .await
                }
            })
            .await;

            for party_res in res {
                assert_eq!(party_res.unwrap(), x && y);
            }
        }
    }

    /// A supplier returning fixed material, used to replay a hand computed
    /// multiplication
    struct FixedSupplier {
        /// The modulus
        modulus: Arc<Modulus>,
        /// The local key share
        key_share: Scalar,
        /// The triple handed out
        triple: Triple,
    }

    impl PreprocessingPhase for FixedSupplier {
        fn modulus(&self) -> Arc<Modulus> {
            self.modulus.clone()
        }

        fn mac_key_share(&self) -> Scalar {
            self.key_share.clone()
        }

        fn next_input_mask(&mut self, _party: PartyId) -> Result<InputMask, MpcError> {
            Err(MpcError::SupplierExhausted("input masks".to_string()))
        }

        fn next_random_element(&mut self) -> Result<ScalarShare, MpcError> {
            Err(MpcError::SupplierExhausted("random elements".to_string()))
        }

        fn next_bit(&mut self) -> Result<ScalarShare, MpcError> {
            Err(MpcError::SupplierExhausted("bits".to_string()))
        }

        fn next_truncation_pair(&mut self, _d: u32) -> Result<TruncationPair, MpcError> {
            Err(MpcError::SupplierExhausted("truncation pairs".to_string()))
        }

        fn next_triple(&mut self) -> Result<Triple, MpcError> {
            Ok(self.triple.clone())
        }

        fn next_bit_triple(&mut self) -> Result<Triple, MpcError> {
            Err(MpcError::SupplierExhausted("bit triples".to_string()))
        }
    }

    /// Replays the two party multiplication of `10 * 5` modulo 251 under the
    /// MAC key `7 = 3 + 4` with the triple `a = b = c = 1`
    #[tokio::test]
    async fn test_mult_mod_251() {
        let m = Arc::new(Modulus::prime(251u32.into()).unwrap());
        let s = |v: u64| Scalar::from_u64(v, &m);
        let share = |v: u64, mac: u64| ScalarShare::new(s(v), s(mac));

        // x = 10 with mac 70, y = 5 with mac 35, a = b = c = 1 with mac 7
        let x_shares = [share(2, 14), share(8, 56)];
        let y_shares = [share(1, 5), share(4, 30)];
        let triple_shares = [share(1, 3), share(0, 4)];

        let suppliers = (0..2)
            .map(|i| FixedSupplier {
                modulus: m.clone(),
                key_share: s(3 + i as u64),
                triple: Triple {
                    left: triple_shares[i].clone(),
                    right: triple_shares[i].clone(),
                    product: triple_shares[i].clone(),
                },
            })
            .collect_vec();

        let res = execute_mock_mpc_with_suppliers(suppliers, |_| {}, move |mut fabric| {
            let idx = (fabric.party_id() - 1) as usize;
            let (x, y) = (x_shares[idx].clone(), y_shares[idx].clone());
            async move {
                let (x, y) = (ResultHandle::ready(x), ResultHandle::ready(y));
                fabric.run(move |b| b.append(MultiplyProtocol::new(x, y))).await
            }
        })
        .await;

        let z = res.into_iter().map(Result::unwrap).collect_vec();
        assert_eq!(z[0], share(50, 150));
        assert_eq!(z[1], share(0, 200));

        let (value, mac) = reconstruct(&z);
        assert_eq!(value, s(50));
        assert_eq!(mac, s(50 * 7 % 251));
    }
}
