//! Duet - two-party encrypted messaging over a ledger
//!
//! A client library for private conversations between exactly two
//! identities. Ciphertext lives on the ledger, keys stay with an encryption
//! policy service, and attachments go to a content-addressed blob store.
//!
//! Key principles:
//! - Ledger as source of truth (sequence numbers are never computed locally)
//! - No key material in the client (encrypt and decrypt by policy id)
//! - Local cache is disposable (refresh replaces, never merges)
//!
//! Every collaborator sits behind a trait with a network-backed
//! implementation and an in-memory double:
//! - [`ledger::LedgerTransport`]: [`ledger::ChainTransport`], [`ledger::MockLedgerTransport`]
//! - [`policy::PolicyAdapter`]: [`policy::HttpPolicyAdapter`], [`policy::MemoryPolicyAdapter`]
//! - [`blob::BlobAdapter`]: [`blob::HttpBlobAdapter`], [`blob::MemoryBlobAdapter`]

pub mod blob;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod types;

pub use client::MessagingClient;
pub use config::{ConfigResolution, MessagingConfig};
pub use error::{MessagingError, MessagingResult};
