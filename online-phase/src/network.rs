//! The `network` module defines abstractions of the transport used to
//! communicate during the course of an MPC
mod batched;
mod mock;

pub use batched::*;
#[cfg(any(feature = "test_helpers", feature = "benchmarks", test))]
pub use mock::MockNetwork;

use async_trait::async_trait;

use crate::error::MpcNetworkError;

/// A type alias of the id of a party in an MPC for readability
///
/// Parties are numbered from 1
pub type PartyId = u64;

// ---------
// | Trait |
// ---------

/// The `MpcNetwork` trait defines shared functionality for a network
/// implementing reliable, authenticated point-to-point channels between the
/// parties of an MPC
///
/// Messages are opaque byte buffers; a party may address itself, in which
/// case the message is looped back
#[async_trait]
pub trait MpcNetwork: Send {
    /// Get the party ID of the local party in the MPC
    fn party_id(&self) -> PartyId;
    /// Get the number of parties in the MPC
    fn num_parties(&self) -> usize;

    /// Send a message to a single party
    async fn send(&mut self, to: PartyId, payload: Vec<u8>) -> Result<(), MpcNetworkError>;
    /// Receive the next message from a single party
    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, MpcNetworkError>;

    /// Send the same message to every party, including the local party
    async fn send_to_all(&mut self, payload: Vec<u8>) -> Result<(), MpcNetworkError> {
        for party in 1..=self.num_parties() as PartyId {
            self.send(party, payload.clone()).await?;
        }

        Ok(())
    }

    /// Receive the next message from every party, including the local party,
    /// ordered by party id
    async fn receive_from_all(&mut self) -> Result<Vec<Vec<u8>>, MpcNetworkError> {
        let mut messages = Vec::with_capacity(self.num_parties());
        for party in 1..=self.num_parties() as PartyId {
            messages.push(self.receive(party).await?);
        }

        Ok(messages)
    }

    /// Closes the connections opened in the handshake phase
    async fn close(&mut self) -> Result<(), MpcNetworkError>;
}
