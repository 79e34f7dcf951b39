//! Defines the batching layer native protocols communicate through
//!
//! Sends are buffered per recipient and flushed once per round as a single
//! framed transport message. Receives pull the next frame from a peer lazily
//! and hand out its logical messages in order

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::log;

use crate::error::{MpcError, MpcNetworkError};

use super::{MpcNetwork, PartyId};

/// The number of bytes in a frame's length prefixes
const LENGTH_PREFIX_BYTES: usize = 4;

// ---------
// | Stats |
// ---------

/// The network stats structs
#[derive(Debug, Default)]
pub struct NetworkStats {
    /// The number of bytes sent
    pub bytes_sent: AtomicUsize,
    /// The number of bytes received
    pub bytes_received: AtomicUsize,
    /// The number of transport messages sent
    pub messages_sent: AtomicUsize,
    /// The number of transport messages received
    pub messages_received: AtomicUsize,
    /// The number of rounds flushed
    pub rounds: AtomicUsize,
}

impl NetworkStats {
    /// Increment the number of bytes sent
    pub fn increment_bytes_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Increment the number of bytes received
    pub fn increment_bytes_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Increment the number of messages sent
    pub fn increment_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::SeqCst);
    }

    /// Increment the number of messages received
    pub fn increment_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::SeqCst);
    }

    /// Increment the number of flushed rounds
    pub fn increment_rounds(&self) {
        self.rounds.fetch_add(1, Ordering::SeqCst);
    }
}

// -------------
// | Framing |
// -------------

/// Encode a batch of logical messages into one transport frame
///
/// The frame is a `u32` message count followed by a `u32` length and the
/// bytes of each message
pub(crate) fn encode_frame(messages: &[Vec<u8>]) -> Vec<u8> {
    let body_len: usize = messages.iter().map(|m| m.len() + LENGTH_PREFIX_BYTES).sum();
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + body_len);

    buf.put_u32(messages.len() as u32);
    for msg in messages.iter() {
        buf.put_u32(msg.len() as u32);
        buf.put_slice(msg);
    }

    buf.to_vec()
}

/// Decode a transport frame into its logical messages
pub(crate) fn decode_frame(frame: Vec<u8>) -> Result<Vec<Vec<u8>>, MpcNetworkError> {
    let mut buf = Bytes::from(frame);
    let truncated = || MpcNetworkError::SerializationError("truncated frame".to_string());

    if buf.remaining() < LENGTH_PREFIX_BYTES {
        return Err(truncated());
    }
    let count = buf.get_u32() as usize;

    let mut messages = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < LENGTH_PREFIX_BYTES {
            return Err(truncated());
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(truncated());
        }
        messages.push(buf.split_to(len).to_vec());
    }

    if buf.has_remaining() {
        return Err(MpcNetworkError::SerializationError(format!(
            "{} trailing bytes in frame",
            buf.remaining()
        )));
    }

    Ok(messages)
}

// ---------------------
// | Batched Network |
// ---------------------

/// The network handle native protocols see during evaluation
pub struct BatchedNetwork {
    /// The underlying transport
    network: Box<dyn MpcNetwork>,
    /// The local party
    party_id: PartyId,
    /// The number of parties
    n_parties: usize,
    /// Logical messages buffered for each party, indexed by party id - 1
    outgoing: Vec<Vec<Vec<u8>>>,
    /// Logical messages received from each party but not yet consumed
    incoming: Vec<VecDeque<Vec<u8>>>,
    /// Traffic counters
    stats: Arc<NetworkStats>,
}

impl BatchedNetwork {
    /// Wrap a transport
    pub fn new<N: MpcNetwork + 'static>(network: N) -> Self {
        let party_id = network.party_id();
        let n_parties = network.num_parties();

        Self {
            network: Box::new(network),
            party_id,
            n_parties,
            outgoing: vec![Vec::new(); n_parties],
            incoming: vec![VecDeque::new(); n_parties],
            stats: Arc::new(NetworkStats::default()),
        }
    }

    /// The local party
    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    /// The number of parties
    pub fn num_parties(&self) -> usize {
        self.n_parties
    }

    /// The traffic counters of this network
    pub fn stats(&self) -> Arc<NetworkStats> {
        self.stats.clone()
    }

    /// Map a party id to its buffer index
    fn index(&self, party: PartyId) -> Result<usize, MpcNetworkError> {
        if party == 0 || party as usize > self.n_parties {
            return Err(MpcNetworkError::InvalidParty(party));
        }

        Ok((party - 1) as usize)
    }

    /// Buffer a message for a single party, delivered at the next flush
    ///
    /// Messages to the local party are delivered immediately
    pub fn send(&mut self, to: PartyId, payload: Vec<u8>) -> Result<(), MpcError> {
        let idx = self.index(to)?;
        if to == self.party_id {
            self.incoming[idx].push_back(payload);
        } else {
            self.outgoing[idx].push(payload);
        }

        Ok(())
    }

    /// Buffer a message for every party, including the local party
    pub fn send_to_all(&mut self, payload: Vec<u8>) {
        for idx in 0..self.n_parties {
            if idx as PartyId + 1 == self.party_id {
                self.incoming[idx].push_back(payload.clone());
            } else {
                self.outgoing[idx].push(payload.clone());
            }
        }
    }

    /// Receive the next logical message from a party
    pub async fn receive(&mut self, from: PartyId) -> Result<Vec<u8>, MpcError> {
        let idx = self.index(from)?;
        if let Some(msg) = self.incoming[idx].pop_front() {
            return Ok(msg);
        }

        if from == self.party_id {
            return Err(MpcNetworkError::RecvError(
                "no message buffered for the local party".to_string(),
            )
            .into());
        }

        // Pull the next frame from the peer
        let frame = self.network.receive(from).await?;
        self.stats.increment_bytes_received(frame.len());
        self.stats.increment_messages_received();

        let mut messages: VecDeque<_> = decode_frame(frame)?.into();
        let next = messages.pop_front().ok_or_else(|| {
            MpcNetworkError::SerializationError(format!("empty frame from party {from}"))
        })?;
        self.incoming[idx] = messages;

        Ok(next)
    }

    /// Receive the next logical message from every party, ordered by party id
    pub async fn receive_from_all(&mut self) -> Result<Vec<Vec<u8>>, MpcError> {
        let mut messages = Vec::with_capacity(self.n_parties);
        for party in 1..=self.n_parties as PartyId {
            messages.push(self.receive(party).await?);
        }

        Ok(messages)
    }

    /// Send every buffered message, one frame per recipient
    ///
    /// Recipients with nothing buffered are not sent a frame
    pub async fn flush(&mut self) -> Result<(), MpcError> {
        let mut sent_any = false;
        for idx in 0..self.n_parties {
            if self.outgoing[idx].is_empty() {
                continue;
            }

            let messages = std::mem::take(&mut self.outgoing[idx]);
            let frame = encode_frame(&messages);
            self.stats.increment_bytes_sent(frame.len());
            self.stats.increment_messages_sent();

            self.network.send(idx as PartyId + 1, frame).await?;
            sent_any = true;
        }

        if sent_any {
            self.stats.increment_rounds();
        }
        Ok(())
    }

    /// The number of received messages not yet consumed
    pub fn unconsumed_messages(&self) -> usize {
        self.incoming.iter().map(VecDeque::len).sum()
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<(), MpcError> {
        log::debug!("closing network for party {}: {:?}", self.party_id, self.stats);
        self.network.close().await.map_err(MpcError::from)
    }
}
