//! The `offline-phase` produces the correlated randomness the online phase
//! consumes: Beaver triples, input masks, shared random elements and bits,
//! and truncation pairs, all authenticated under a shared MAC key
//!
//! Material is produced by a trusted dealer, either in batches handed to
//! each party up front or streamed continuously from a background service

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod dealer;
pub mod error;
pub mod service;

pub use dealer::{PreprocessedSupplier, PreprocessingCounts, TrustedDealer};
pub use error::DealerError;
pub use service::{ChannelSupplier, SupplierService, SupplierServiceConfig};
