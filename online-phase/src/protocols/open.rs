//! Defines the protocols that reconstruct shared values
//!
//! Every opening records the opened share and plaintext in the opened value
//! store; the plaintext is only trustworthy once a MAC check over the store
//! has passed
//!
//! Over a ring the bits above the plaintext width are masked with `2^k * R`
//! before a value is opened, and the opening is reduced to its plaintext

use async_trait::async_trait;
use num_bigint::BigUint;
use num_traits::One;

use crate::{
    algebra::{BitShare, ModulusKind, Scalar, ScalarShare},
    error::MpcError,
    fabric::{
        AuthenticatedBitResult, AuthenticatedScalarResult, EvaluationStatus, NativeProtocol,
        ResourcePool, ERR_PROTOCOL_NOT_DONE,
    },
    network::{BatchedNetwork, PartyId},
};

use super::{require_boolean, sum_elements};

/// Broadcast the share of a value in round 0, or sum the broadcasts and record
/// the opening in round 1
async fn open_round(
    round: usize,
    share: &ScalarShare,
    pool: &mut ResourcePool,
    network: &mut BatchedNetwork,
) -> Result<Option<Scalar>, MpcError> {
    if round == 0 {
        network.send_to_all(share.share.to_bytes_be());
        return Ok(None);
    }

    let messages = network.receive_from_all().await?;
    let value = sum_elements(&messages, pool.modulus())?;
    pool.opened_values().push(share.clone(), value.clone());

    Ok(Some(value))
}

/// Mask the bits of a ring share above the plaintext width with `2^k * R`
/// for a fresh shared random element `R`
///
/// Field shares are returned unchanged
pub(crate) fn mask_storage_bits(
    share: ScalarShare,
    pool: &mut ResourcePool,
) -> Result<ScalarShare, MpcError> {
    let bits = match pool.modulus().kind() {
        ModulusKind::PowerOfTwo(bits) => bits,
        ModulusKind::Prime => return Ok(share),
    };

    let r = pool.supplier().next_random_element()?;
    let shift = Scalar::new(BigUint::one() << bits, pool.modulus());
    Ok(share + r * shift)
}

// ---------------
// | Open to All |
// ---------------

/// Opens a shared value to every party
pub struct OpenToAll {
    /// The value to open
    input: AuthenticatedScalarResult,
    /// The share read in round 0
    share: Option<ScalarShare>,
    /// The opened value
    output: Option<Scalar>,
}

impl OpenToAll {
    /// Constructor
    pub fn new(input: AuthenticatedScalarResult) -> Self {
        Self { input, share: None, output: None }
    }
}

#[async_trait]
impl NativeProtocol for OpenToAll {
    type Output = Scalar;

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        if round == 0 {
            self.share = Some(mask_storage_bits(self.input.get(), pool)?);
        }

        let share = self.share.as_ref().expect(ERR_PROTOCOL_NOT_DONE);
        match open_round(round, share, pool, network).await? {
            None => Ok(EvaluationStatus::HasMoreRounds),
            Some(value) => {
                self.output = Some(value.to_plaintext());
                Ok(EvaluationStatus::IsDone)
            },
        }
    }

    fn out(&self) -> Scalar {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }

    fn requires_mac_check(&self) -> bool {
        true
    }
}

// ----------------
// | Open to Party |
// ----------------

/// Opens a shared value to a single party
///
/// The value is masked with an input mask of the receiving party, the masked
/// value is opened to all, and only the receiver can remove the mask
pub struct OpenToParty {
    /// The value to open
    input: AuthenticatedScalarResult,
    /// The party learning the value
    receiver: PartyId,
    /// The masked share and, at the receiver, the mask
    masked: Option<(ScalarShare, Option<Scalar>)>,
    /// The opened value, `Some` only at the receiver
    output: Option<Option<Scalar>>,
}

impl OpenToParty {
    /// Constructor
    pub fn new(input: AuthenticatedScalarResult, receiver: PartyId) -> Self {
        Self { input, receiver, masked: None, output: None }
    }
}

#[async_trait]
impl NativeProtocol for OpenToParty {
    type Output = Option<Scalar>;

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        if round == 0 {
            if self.receiver == 0 || self.receiver as usize > pool.num_parties() {
                return Err(MpcError::InvalidInput(format!(
                    "cannot open to unknown party {}",
                    self.receiver
                )));
            }

            let mask = pool.supplier().next_input_mask(self.receiver)?;
            if pool.party_id() == self.receiver && mask.open_value.is_none() {
                return Err(MpcError::SupplierExhausted("input mask without its opening".into()));
            }

            let masked = mask_storage_bits(self.input.get(), pool)? - &mask.mask_share;
            self.masked = Some((masked, mask.open_value));
        }

        let (masked, mask) = self.masked.as_ref().expect(ERR_PROTOCOL_NOT_DONE);
        match open_round(round, masked, pool, network).await? {
            None => Ok(EvaluationStatus::HasMoreRounds),
            Some(value) => {
                self.output = Some(mask.as_ref().map(|r| (value + r).to_plaintext()));
                Ok(EvaluationStatus::IsDone)
            },
        }
    }

    fn out(&self) -> Option<Scalar> {
        self.output.clone().expect(ERR_PROTOCOL_NOT_DONE)
    }

    fn requires_mac_check(&self) -> bool {
        true
    }
}

// ------------
// | Open Bit |
// ------------

/// Opens a shared bit to every party
///
/// The bits above the low bit are hidden by adding `2 * R` for a fresh shared
/// random element `R` before opening
pub struct OpenBit {
    /// The bit to open
    input: AuthenticatedBitResult,
    /// The masked share read in round 0
    masked: Option<ScalarShare>,
    /// The opened bit
    output: Option<bool>,
}

impl OpenBit {
    /// Constructor
    pub fn new(input: AuthenticatedBitResult) -> Self {
        Self { input, masked: None, output: None }
    }
}

/// Mask the bits above the low bit of a boolean share with `2 * R`
pub(crate) fn mask_high_bits(
    bit: &BitShare,
    pool: &mut ResourcePool,
) -> Result<ScalarShare, MpcError> {
    let r = pool.supplier().next_random_element()?;
    let two = Scalar::from_u64(2, pool.modulus());
    Ok(bit.inner() + r * two)
}

#[async_trait]
impl NativeProtocol for OpenBit {
    type Output = bool;

    async fn evaluate(
        &mut self,
        round: usize,
        pool: &mut ResourcePool,
        network: &mut BatchedNetwork,
    ) -> Result<EvaluationStatus, MpcError> {
        if round == 0 {
            require_boolean(pool.modulus(), "opening a bit")?;
            self.masked = Some(mask_high_bits(&self.input.get(), pool)?);
        }

        let masked = self.masked.as_ref().expect(ERR_PROTOCOL_NOT_DONE);
        match open_round(round, masked, pool, network).await? {
            None => Ok(EvaluationStatus::HasMoreRounds),
            Some(value) => {
                self.output = Some(value.bit_value());
                Ok(EvaluationStatus::IsDone)
            },
        }
    }

    fn out(&self) -> bool {
        self.output.expect(ERR_PROTOCOL_NOT_DONE)
    }

    fn requires_mac_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use crate::{
        algebra::{BitShare, Scalar, ScalarShare},
        error::MpcError,
        fabric::ResultHandle,
        protocols::{InputProtocol, OpenBit, OpenToAll, OpenToParty},
        test_helpers::{execute_mock_mpc, test_modulus, test_ring},
        PARTY1, PARTY2,
    };

    /// Tests that a value opened to one party is hidden from the others
    #[tokio::test]
    async fn test_open_to_party() {
        let m = test_modulus();
        let value = Scalar::from_u64(42, &m);
        let value_clone = value.clone();

        let res = execute_mock_mpc(3, m, move |mut fabric| {
            let value = value_clone.clone();
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let share = b.append(InputProtocol::new((me == 1).then_some(value), 1));
                        b.append(OpenToParty::new(share, PARTY2))
                    })
                    .await
            }
        })
        .await;

        assert_eq!(res[0], Ok(None));
        assert_eq!(res[1], Ok(Some(value)));
        assert_eq!(res[2], Ok(None));
    }

    /// Tests that opening a bit over a prime field is a configuration error
    #[tokio::test]
    async fn test_open_bit_in_field() {
        let m = test_modulus();
        let res = execute_mock_mpc(2, m.clone(), move |mut fabric| {
            let m = m.clone();
            async move {
                fabric
                    .run(move |b| {
                        let one = Scalar::one(&m);
                        let share = b.append(InputProtocol::new(Some(one), PARTY1));
                        let bit = b.gate(move |_| Ok(BitShare::from_arithmetic(share.get())));
                        b.append(OpenBit::new(bit))
                    })
                    .await
            }
        })
        .await;

        for party_res in res {
            assert!(matches!(party_res, Err(MpcError::ConfigurationError(_))));
        }
    }

    /// Tests that a handle built outside the fabric can be opened
    #[tokio::test]
    async fn test_open_ready_share() {
        let m = test_modulus();
        let res = execute_mock_mpc(2, m.clone(), move |mut fabric| {
            let m = m.clone();
            async move {
                let key_share = fabric.mac_key_share();
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let known = ScalarShare::from_public(
                            &Scalar::from_u64(9, &m),
                            &key_share,
                            me,
                        );
                        b.append(OpenToAll::new(ResultHandle::ready(known)))
                    })
                    .await
            }
        })
        .await;

        for party_res in res {
            assert_eq!(party_res.unwrap(), Scalar::from_u64(9, &test_modulus()));
        }
    }

    /// Tests that ring openings return the plaintext modulo 2^k, both to all
    /// parties and to one party
    #[tokio::test]
    async fn test_open_ring_plaintext() {
        let ring = test_ring();
        let value = -Scalar::from_u64(5, &ring);
        let expected = Scalar::from_u64(u64::MAX - 4, &ring);

        let res = execute_mock_mpc(3, ring, move |mut fabric| {
            let value = value.clone();
            async move {
                let me = fabric.party_id();
                fabric
                    .run(move |b| {
                        let share = b.append(InputProtocol::new((me == 1).then_some(value), 1));
                        let to_all = b.append(OpenToAll::new(share.clone()));
                        let to_party = b.append(OpenToParty::new(share, PARTY2));
                        (to_all, to_party)
                    })
                    .await
            }
        })
        .await;

        for (idx, party_res) in res.into_iter().enumerate() {
            let (to_all, to_party) = party_res.unwrap();
            assert_eq!(to_all, expected);
            assert_eq!(to_party, (idx == 1).then(|| expected.clone()));
        }
    }
}
