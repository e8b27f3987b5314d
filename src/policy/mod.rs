//! Encryption policy adapters.
//!
//! A policy is a key-management handle scoped to a participant pair. The
//! client never sees key material; it asks the adapter to encrypt and decrypt
//! under a policy id.

pub mod http;
pub mod memory;

#[cfg(test)]
mod proptests;

pub use http::HttpPolicyAdapter;
pub use memory::MemoryPolicyAdapter;

use crate::error::MessagingResult;
use crate::types::{EncryptedPayload, ParticipantPair, PolicyDescriptor, PolicyId};
use async_trait::async_trait;

/// Policy service abstraction.
#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    /// Return the policy for a pair, issuing one if none is known.
    ///
    /// `ParticipantPair` is sorted, so (A, B) and (B, A) resolve to the same
    /// policy. `existing` is passed through for continuity with a policy the
    /// ledger already records for the pair.
    async fn ensure_conversation_policy(
        &self,
        participants: &ParticipantPair,
        existing: Option<&PolicyId>,
    ) -> MessagingResult<PolicyDescriptor>;

    async fn encrypt_message(
        &self,
        policy_id: &PolicyId,
        plaintext: &[u8],
    ) -> MessagingResult<EncryptedPayload>;

    async fn decrypt_message(
        &self,
        policy_id: &PolicyId,
        ciphertext: &[u8],
    ) -> MessagingResult<Vec<u8>>;
}
