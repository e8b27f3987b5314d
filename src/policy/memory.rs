//! In-memory policy adapter for tests.
//!
//! Encryption is an XOR with a SHA-256 keystream derived from the policy id.
//! It is deterministic and reversible so client tests are reproducible, and
//! it is NOT a security boundary: anyone who knows the policy id can decrypt.

use super::http::{DECRYPT_PATH, ENCRYPT_PATH, ENSURE_PATH};
use super::PolicyAdapter;
use crate::error::{MessagingError, MessagingResult};
use crate::types::{EncryptedPayload, ParticipantPair, PolicyDescriptor, PolicyId};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const POLICY_DOMAIN: &[u8] = b"duet-memory-policy";
const KEYSTREAM_DOMAIN: &[u8] = b"duet-memory-keystream";

/// Mock policy adapter.
#[derive(Clone, Default)]
pub struct MemoryPolicyAdapter {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    known: HashMap<String, PolicyDescriptor>,
    issued: usize,
    ensure_calls: usize,
    unavailable: bool,
}

/// XOR `data` with the keystream for `policy_id`.
fn apply_keystream(policy_id: &PolicyId, data: &[u8]) -> Vec<u8> {
    data.chunks(32)
        .enumerate()
        .flat_map(|(block, chunk)| {
            let pad = Sha256::new()
                .chain_update(KEYSTREAM_DOMAIN)
                .chain_update(policy_id.as_str().as_bytes())
                .chain_update((block as u64).to_le_bytes())
                .finalize();
            chunk
                .iter()
                .zip(pad)
                .map(|(byte, key)| byte ^ key)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Deterministic policy id for a pair.
fn derive_policy_id(participants: &ParticipantPair) -> PolicyId {
    let hash = Sha256::new()
        .chain_update(POLICY_DOMAIN)
        .chain_update(participants.key().as_bytes())
        .finalize();
    PolicyId::new(format!("0x{}", hex::encode(hash)))
}

impl MemoryPolicyAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every call with `SealUnavailable` (status 503) while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Number of policies minted (not reused).
    pub fn issued(&self) -> usize {
        self.state().issued
    }

    pub fn ensure_calls(&self) -> usize {
        self.state().ensure_calls
    }

    fn check_available(&self, path: &str) -> MessagingResult<()> {
        if self.state().unavailable {
            return Err(MessagingError::SealUnavailable {
                status: 503,
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyAdapter for MemoryPolicyAdapter {
    async fn ensure_conversation_policy(
        &self,
        participants: &ParticipantPair,
        existing: Option<&PolicyId>,
    ) -> MessagingResult<PolicyDescriptor> {
        self.check_available(ENSURE_PATH)?;

        let mut state = self.state();
        state.ensure_calls += 1;
        let key = participants.key();
        if let Some(known) = state.known.get(&key) {
            return Ok(known.clone());
        }

        let policy_id = match existing {
            Some(id) => id.clone(),
            None => {
                state.issued += 1;
                derive_policy_id(participants)
            }
        };
        let descriptor = PolicyDescriptor {
            policy_id,
            expires_at: None,
        };
        state.known.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    async fn encrypt_message(
        &self,
        policy_id: &PolicyId,
        plaintext: &[u8],
    ) -> MessagingResult<EncryptedPayload> {
        self.check_available(ENCRYPT_PATH)?;
        Ok(EncryptedPayload {
            ciphertext: apply_keystream(policy_id, plaintext),
            nonce: None,
        })
    }

    async fn decrypt_message(
        &self,
        policy_id: &PolicyId,
        ciphertext: &[u8],
    ) -> MessagingResult<Vec<u8>> {
        self.check_available(DECRYPT_PATH)?;
        Ok(apply_keystream(policy_id, ciphertext))
    }
}
