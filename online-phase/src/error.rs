//! Errors defined across the MPC implementation
use std::{error::Error, fmt::Display};

use crate::network::PartyId;

/// An error raised while evaluating an MPC computation
///
/// Every variant is fatal for the computation that raised it; the fabric
/// that observes one refuses to evaluate further computations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MpcError {
    /// An error occurred on the underlying transport
    NetworkError(MpcNetworkError),
    /// The batched MAC check over the opened values failed
    AuthenticationError,
    /// A party opened a commitment to a value that does not match it
    InvalidCommitment(PartyId),
    /// The parties disagree on the value of a broadcast
    BroadcastMismatch(PartyId),
    /// The preprocessing supplier ran out of the requested material
    SupplierExhausted(String),
    /// The fabric was configured inconsistently
    ConfigurationError(String),
    /// An arithmetic operation was undefined, e.g. inverting zero
    ArithmeticError(String),
    /// An operation was given input it cannot consume
    InvalidInput(String),
    /// The fabric aborted a previous computation and may not be reused
    Aborted,
}

impl Display for MpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MpcError::NetworkError(e) => write!(f, "network error: {e}"),
            MpcError::AuthenticationError => write!(f, "MAC check failed on opened values"),
            MpcError::InvalidCommitment(party) => {
                write!(f, "party {party} opened an invalid commitment")
            },
            MpcError::BroadcastMismatch(party) => {
                write!(f, "party {party} received an inconsistent broadcast")
            },
            MpcError::SupplierExhausted(kind) => write!(f, "preprocessing exhausted: {kind}"),
            MpcError::ConfigurationError(e) => write!(f, "configuration error: {e}"),
            MpcError::ArithmeticError(e) => write!(f, "arithmetic error: {e}"),
            MpcError::InvalidInput(e) => write!(f, "invalid input: {e}"),
            MpcError::Aborted => write!(f, "fabric aborted by a previous failure"),
        }
    }
}
impl Error for MpcError {}

impl From<MpcNetworkError> for MpcError {
    fn from(err: MpcNetworkError) -> Self {
        MpcError::NetworkError(err)
    }
}

/// An error on the transport between parties
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MpcNetworkError {
    /// Error sending a message to a peer
    SendError(String),
    /// Error receiving a message from a peer
    RecvError(String),
    /// A message could not be decoded, usually due to a malformed length
    SerializationError(String),
    /// A message was addressed to or expected from an unknown party
    InvalidParty(PartyId),
    /// A batch finished with the given number of received messages unread,
    /// so the parties disagree on the computation
    UnconsumedMessages(usize),
    /// Error tearing down the connections
    ConnectionTeardownError,
}

impl Display for MpcNetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MpcNetworkError::SendError(e) => write!(f, "error sending message: {e}"),
            MpcNetworkError::RecvError(e) => write!(f, "error receiving message: {e}"),
            MpcNetworkError::SerializationError(e) => write!(f, "malformed message: {e}"),
            MpcNetworkError::InvalidParty(party) => write!(f, "unknown party {party}"),
            MpcNetworkError::UnconsumedMessages(n) => {
                write!(f, "{n} received messages were never consumed")
            },
            MpcNetworkError::ConnectionTeardownError => write!(f, "error closing connections"),
        }
    }
}
impl Error for MpcNetworkError {}
