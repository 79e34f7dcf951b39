//! Implements the numeric vocabulary on the protocol builder with the SPDZ
//! native protocols
//!
//! Linear operations are local gates, everything that touches the network or
//! the supplier is a native protocol

use std::sync::Arc;

use crate::{
    algebra::{BitShare, Modulus, Scalar, ScalarShare},
    error::MpcError,
    fabric::{
        AuthenticatedBitResult, AuthenticatedScalarResult, Deferred, GateContext, OpenedResult,
        ProtocolBuilder, ResultHandle, ScalarResult,
    },
    network::PartyId,
    offline_prep::TruncationPair,
    protocols::{
        require_boolean, InputProtocol, MultiplyProtocol, OpenBit, OpenToAll, OpenToParty,
        SupplierDraw, ToArithmetic,
    },
};

use super::{check_public, Compose, Logical, Numeric, Truncation};

/// Fail unless the computation supports bit shares
fn check_boolean(ctx: &GateContext, op: &str) -> Result<(), MpcError> {
    require_boolean(ctx.modulus, op)
}

impl Compose for ProtocolBuilder {
    fn seq<D, F>(&mut self, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut Self) -> D + Send + 'static,
    {
        ProtocolBuilder::seq(self, f)
    }

    fn par<D, F>(&mut self, f: F) -> ResultHandle<D::Output>
    where
        D: Deferred,
        F: FnOnce(&mut Self) -> D + Send + 'static,
    {
        ProtocolBuilder::par(self, f)
    }

    fn gate<T, F>(&mut self, f: F) -> ResultHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&GateContext) -> Result<T, MpcError> + Send + 'static,
    {
        ProtocolBuilder::gate(self, f)
    }
}

impl Numeric for ProtocolBuilder {
    fn modulus(&self) -> Arc<Modulus> {
        ProtocolBuilder::modulus(self)
    }

    fn add(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &AuthenticatedScalarResult,
    ) -> AuthenticatedScalarResult {
        let (a, b) = (a.clone(), b.clone());
        self.gate(move |_| Ok(a.get() + b.get()))
    }

    fn add_public(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &ScalarResult,
    ) -> AuthenticatedScalarResult {
        let (a, b) = (a.clone(), b.clone());
        self.gate(move |ctx| {
            let b = b.get();
            check_public(&b, ctx.modulus)?;
            Ok(a.get().add_public(&b, ctx.mac_key_share, ctx.party_id))
        })
    }

    fn sub(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &AuthenticatedScalarResult,
    ) -> AuthenticatedScalarResult {
        let (a, b) = (a.clone(), b.clone());
        self.gate(move |_| Ok(a.get() - b.get()))
    }

    fn sub_public(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &ScalarResult,
    ) -> AuthenticatedScalarResult {
        let (a, b) = (a.clone(), b.clone());
        self.gate(move |ctx| {
            let b = b.get();
            check_public(&b, ctx.modulus)?;
            Ok(a.get().sub_public(&b, ctx.mac_key_share, ctx.party_id))
        })
    }

    fn negate(&mut self, a: &AuthenticatedScalarResult) -> AuthenticatedScalarResult {
        let a = a.clone();
        self.gate(move |_| Ok(-a.get()))
    }

    fn mult(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &AuthenticatedScalarResult,
    ) -> AuthenticatedScalarResult {
        self.append(MultiplyProtocol::new(a.clone(), b.clone()))
    }

    fn mult_public(
        &mut self,
        a: &AuthenticatedScalarResult,
        b: &ScalarResult,
    ) -> AuthenticatedScalarResult {
        let (a, b) = (a.clone(), b.clone());
        self.gate(move |ctx| {
            let b = b.get();
            check_public(&b, ctx.modulus)?;
            Ok(a.get() * b)
        })
    }

    fn known(&mut self, value: Scalar) -> AuthenticatedScalarResult {
        self.gate(move |ctx| {
            check_public(&value, ctx.modulus)?;
            Ok(ScalarShare::from_public(&value, ctx.mac_key_share, ctx.party_id))
        })
    }

    fn input(&mut self, value: Option<Scalar>, party: PartyId) -> AuthenticatedScalarResult {
        self.append(InputProtocol::new(value, party))
    }

    fn open(&mut self, a: &AuthenticatedScalarResult) -> ScalarResult {
        self.append(OpenToAll::new(a.clone()))
    }

    fn open_to(&mut self, a: &AuthenticatedScalarResult, party: PartyId) -> OpenedResult {
        self.append(OpenToParty::new(a.clone(), party))
    }

    fn random_bit(&mut self) -> AuthenticatedScalarResult {
        self.append(SupplierDraw::random_bit())
    }

    fn random_element(&mut self) -> AuthenticatedScalarResult {
        self.append(SupplierDraw::random_element())
    }
}

impl Logical for ProtocolBuilder {
    fn known_bit(&mut self, bit: bool) -> AuthenticatedBitResult {
        self.gate(move |ctx| {
            check_boolean(ctx, "a public bit")?;
            Ok(BitShare::from_public(bit, ctx.mac_key_share, ctx.party_id))
        })
    }

    fn xor(
        &mut self,
        a: &AuthenticatedBitResult,
        b: &AuthenticatedBitResult,
    ) -> AuthenticatedBitResult {
        let (a, b) = (a.clone(), b.clone());
        self.gate(move |ctx| {
            check_boolean(ctx, "xor")?;
            Ok(a.get().xor(&b.get()))
        })
    }

    fn xor_known(&mut self, a: &AuthenticatedBitResult, bit: bool) -> AuthenticatedBitResult {
        let a = a.clone();
        self.gate(move |ctx| {
            check_boolean(ctx, "xor")?;
            Ok(a.get().xor_public(bit, ctx.mac_key_share, ctx.party_id))
        })
    }

    fn and(
        &mut self,
        a: &AuthenticatedBitResult,
        b: &AuthenticatedBitResult,
    ) -> AuthenticatedBitResult {
        self.append(MultiplyProtocol::new(a.clone(), b.clone()))
    }

    fn and_known(&mut self, a: &AuthenticatedBitResult, bit: bool) -> AuthenticatedBitResult {
        let a = a.clone();
        self.gate(move |ctx| {
            check_boolean(ctx, "and")?;
            Ok(a.get().and_public(bit))
        })
    }

    fn not(&mut self, a: &AuthenticatedBitResult) -> AuthenticatedBitResult {
        let a = a.clone();
        self.gate(move |ctx| {
            check_boolean(ctx, "not")?;
            Ok(a.get().not(ctx.mac_key_share, ctx.party_id))
        })
    }

    fn open_bit(&mut self, a: &AuthenticatedBitResult) -> ResultHandle<bool> {
        self.append(OpenBit::new(a.clone()))
    }

    fn to_boolean(&mut self, a: &AuthenticatedScalarResult) -> AuthenticatedBitResult {
        let a = a.clone();
        self.gate(move |ctx| {
            check_boolean(ctx, "arithmetic to boolean conversion")?;
            Ok(BitShare::from_arithmetic(a.get()))
        })
    }

    fn to_arithmetic(&mut self, a: &AuthenticatedBitResult) -> AuthenticatedScalarResult {
        self.append(ToArithmetic::new(a.clone()))
    }

    fn random_bit_share(&mut self) -> AuthenticatedBitResult {
        self.append(SupplierDraw::random_bit_share())
    }
}

impl Truncation for ProtocolBuilder {
    fn truncation_pair(&mut self, d: u32) -> ResultHandle<TruncationPair> {
        self.append(SupplierDraw::truncation_pair(d))
    }
}

#[cfg(test)]
mod test {
    use rand::{thread_rng, Rng};

    use crate::{
        algebra::Scalar,
        error::MpcError,
        fabric::ResultHandle,
        numeric::{Logical, Numeric},
        test_helpers::{execute_mock_mpc, test_modulus, test_ring},
        PARTY1, PARTY2,
    };

    /// Tests the linear operations and multiplication against plaintext
    /// arithmetic
    #[tokio::test]
    async fn test_arithmetic() {
        let mut rng = thread_rng();
        let m = test_modulus();
        let x = Scalar::random(&m, &mut rng);
        let y = Scalar::random(&m, &mut rng);
        let c = Scalar::random(&m, &mut rng);

        let expected = vec![
            &x + &y,
            &x - &y,
            -&x,
            &x * &y,
            &x + &c,
            &x - &c,
            &x * &c,
            c.clone(),
        ];

        let res = execute_mock_mpc(3, m.clone(), move |mut fabric| {
            let (x, y, c) = (x.clone(), y.clone(), c.clone());
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let x = b.input((me == PARTY1).then_some(x), PARTY1);
                        let y = b.input((me == PARTY2).then_some(y), PARTY2);
                        let c_pub = ResultHandle::ready(c.clone());

                        let results = vec![
                            b.add(&x, &y),
                            b.sub(&x, &y),
                            b.negate(&x),
                            b.mult(&x, &y),
                            b.add_public(&x, &c_pub),
                            b.sub_public(&x, &c_pub),
                            b.mult_public(&x, &c_pub),
                            b.known(c),
                        ];
                        results.iter().map(|r| b.open(r)).collect::<Vec<_>>()
                    })
                    .await
            }
        })
        .await;

        for party_res in res {
            assert_eq!(party_res.unwrap(), expected);
        }
    }

    /// Tests that a public value from another modulus is rejected
    #[tokio::test]
    async fn test_foreign_public_value() {
        let res = execute_mock_mpc(2, test_modulus(), |mut fabric| async move {
            fabric.run(|b| b.known(Scalar::one(&test_ring()))).await
        })
        .await;

        for party_res in res {
            assert!(matches!(party_res, Err(MpcError::InvalidInput(_))));
        }
    }

    /// Tests the boolean operations over random bits
    #[tokio::test]
    async fn test_logical() {
        let mut rng = thread_rng();
        let ring = test_ring();
        let (x, y, k): (bool, bool, bool) = (rng.gen(), rng.gen(), rng.gen());
        let expected = vec![x ^ y, x ^ k, x && y, x && k, !x, k];

        let res = execute_mock_mpc(2, ring.clone(), move |mut fabric| {
            let ring = ring.clone();
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let x_val = (me == PARTY1).then(|| Scalar::from_bit(x, &ring));
                        let y_val = (me == PARTY2).then(|| Scalar::from_bit(y, &ring));
                        let x_arith = b.input(x_val, PARTY1);
                        let y_arith = b.input(y_val, PARTY2);
                        let x = b.to_boolean(&x_arith);
                        let y = b.to_boolean(&y_arith);

                        let results = vec![
                            b.xor(&x, &y),
                            b.xor_known(&x, k),
                            b.and(&x, &y),
                            b.and_known(&x, k),
                            b.not(&x),
                            b.known_bit(k),
                        ];
                        results.iter().map(|r| b.open_bit(r)).collect::<Vec<_>>()
                    })
                    .await
            }
        })
        .await;

        for party_res in res {
            assert_eq!(party_res.unwrap(), expected);
        }
    }

    /// Tests that boolean operations fail over a field
    #[tokio::test]
    async fn test_logical_in_field() {
        let res = execute_mock_mpc(2, test_modulus(), |mut fabric| async move {
            fabric
                .run(|b| {
                    let r = b.random_element();
                    b.to_boolean(&r)
                })
                .await
        })
        .await;

        for party_res in res {
            assert!(matches!(party_res, Err(MpcError::ConfigurationError(_))));
        }
    }

    /// Tests that random bits are bits in both domains
    #[tokio::test]
    async fn test_random_bits() {
        let res = execute_mock_mpc(2, test_ring(), |mut fabric| async move {
            fabric
                .run(|b| {
                    let arith = b.random_bit();
                    let boolean = b.random_bit_share();
                    let as_arith = b.to_arithmetic(&boolean);
                    (b.open(&arith), b.open(&as_arith))
                })
                .await
        })
        .await;

        let ring = test_ring();
        let bits = [Scalar::zero(&ring), Scalar::one(&ring)];
        for party_res in res {
            let (arith, boolean) = party_res.unwrap();
            assert!(bits.contains(&arith));
            assert!(bits.contains(&boolean));
        }
    }
}
