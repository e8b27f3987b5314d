//! Ledger integration.
//!
//! The ledger is the source of truth for conversation identity and message
//! ordering. This module provides:
//! - Trait seams for the signer, the RPC and the domain transport
//! - The binary snapshot codec and event payload decoding
//! - `ChainTransport`, the network-backed transport
//! - Mock-friendly in-memory doubles for testing

pub mod codec;
pub mod events;
pub mod mock;
pub mod traits;
pub mod transport;

#[cfg(test)]
mod proptests;

pub use codec::CodecError;
pub use mock::{MockChain, MockLedgerTransport};
pub use traits::{LedgerRpc, LedgerTransport, SendRequest, Transaction, TransactionSigner};
pub use transport::ChainTransport;
