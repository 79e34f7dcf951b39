//! Defines a mock network for unit tests

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::MpcNetworkError;

use super::{MpcNetwork, PartyId};

/// A dummy network implementation used for unit testing
///
/// Connects every pair of parties, and each party to itself, with an
/// unbounded in-memory channel
pub struct MockNetwork {
    /// The ID of the local party
    party_id: PartyId,
    /// The send side of the channel to each party, indexed by party id - 1
    outbound: Vec<UnboundedSender<Vec<u8>>>,
    /// The receive side of the channel from each party, indexed by party id -
    /// 1
    inbound: Vec<UnboundedReceiver<Vec<u8>>>,
}

impl MockNetwork {
    /// Create a fully connected mesh of `n_parties` mock networks
    ///
    /// The network at index `i` belongs to party `i + 1`
    pub fn new_mesh(n_parties: usize) -> Vec<Self> {
        // channels[from][to]
        let mut senders: Vec<Vec<UnboundedSender<Vec<u8>>>> = vec![Vec::new(); n_parties];
        let mut receivers: Vec<Vec<UnboundedReceiver<Vec<u8>>>> =
            (0..n_parties).map(|_| Vec::with_capacity(n_parties)).collect();

        for from in 0..n_parties {
            for to_receivers in receivers.iter_mut() {
                let (send, recv) = unbounded_channel();
                senders[from].push(send);
                to_receivers.push(recv);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(idx, (outbound, inbound))| Self {
                party_id: idx as PartyId + 1,
                outbound,
                inbound,
            })
            .collect()
    }

    /// Map a party id to its channel index
    fn index(&self, party: PartyId) -> Result<usize, MpcNetworkError> {
        if party == 0 || party as usize > self.outbound.len() {
            return Err(MpcNetworkError::InvalidParty(party));
        }

        Ok((party - 1) as usize)
    }
}

#[async_trait]
impl MpcNetwork for MockNetwork {
    fn party_id(&self) -> PartyId {
        self.party_id
    }

    fn num_parties(&self) -> usize {
        self.outbound.len()
    }

    async fn send(&mut self, to: PartyId, payload: Vec<u8>) -> Result<(), MpcNetworkError> {
        let idx = self.index(to)?;
        self.outbound[idx].send(payload).map_err(|e| MpcNetworkError::SendError(e.to_string()))
    }

    async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, MpcNetworkError> {
        let idx = self.index(from)?;
        self.inbound[idx]
            .recv()
            .await
            .ok_or_else(|| MpcNetworkError::RecvError(format!("party {from} hung up")))
    }

    async fn close(&mut self) -> Result<(), MpcNetworkError> {
        self.inbound.iter_mut().for_each(|recv| recv.close());
        Ok(())
    }
}
