//! Property-based tests for policy adapters
//!
//! Tests for:
//! - Keystream: roundtrip, length preservation, policy isolation
//! - Policy issuance: pair order independence, reuse of existing ids

use super::{MemoryPolicyAdapter, PolicyAdapter};
use crate::types::{Address, ParticipantPair, PolicyId};
use futures::executor::block_on;
use proptest::prelude::*;

fn address_strategy() -> impl Strategy<Value = Address> {
    prop::array::uniform32(any::<u8>()).prop_map(|bytes| Address::from_bytes(&bytes))
}

// ============================================================================
// KEYSTREAM PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: decrypt(encrypt(m)) == m for every policy id and message
    #[test]
    fn keystream_roundtrip_preserves_data(
        policy in "[a-z0-9-]{1,40}",
        data in prop::collection::vec(any::<u8>(), 0..2_000),
    ) {
        let adapter = MemoryPolicyAdapter::new();
        let policy = PolicyId::new(policy);

        let encrypted = block_on(adapter.encrypt_message(&policy, &data)).unwrap();
        prop_assert_eq!(encrypted.ciphertext.len(), data.len());
        prop_assert!(encrypted.nonce.is_none());

        let decrypted = block_on(adapter.decrypt_message(&policy, &encrypted.ciphertext)).unwrap();
        prop_assert_eq!(decrypted, data);
    }

    /// Property: ciphertext under one policy does not decrypt under another
    #[test]
    fn keystream_policy_isolation(
        data in prop::collection::vec(any::<u8>(), 16..256),
        a in "[a-z]{4,12}",
        b in "[a-z]{4,12}",
    ) {
        prop_assume!(a != b);
        let adapter = MemoryPolicyAdapter::new();

        let encrypted = block_on(adapter.encrypt_message(&PolicyId::new(a), &data)).unwrap();
        let wrong = block_on(adapter.decrypt_message(&PolicyId::new(b), &encrypted.ciphertext)).unwrap();
        prop_assert_ne!(wrong, data);
    }
}

// ============================================================================
// ISSUANCE PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: (A, B) and (B, A) resolve to the same policy
    #[test]
    fn issuance_is_order_independent(a in address_strategy(), b in address_strategy()) {
        prop_assume!(a != b);

        let forward = MemoryPolicyAdapter::new();
        let reverse = MemoryPolicyAdapter::new();
        let ab = ParticipantPair::new(a.clone(), b.clone()).unwrap();
        let ba = ParticipantPair::new(b, a).unwrap();

        let first = block_on(forward.ensure_conversation_policy(&ab, None)).unwrap();
        let second = block_on(reverse.ensure_conversation_policy(&ba, None)).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Property: an existing id is adopted for an unknown pair and sticks
    #[test]
    fn existing_policy_is_adopted(
        a in address_strategy(),
        b in address_strategy(),
        existing in "[a-z0-9]{8,32}",
    ) {
        prop_assume!(a != b);
        let adapter = MemoryPolicyAdapter::new();
        let pair = ParticipantPair::new(a, b).unwrap();
        let existing = PolicyId::new(existing);

        let adopted = block_on(adapter.ensure_conversation_policy(&pair, Some(&existing))).unwrap();
        let again = block_on(adapter.ensure_conversation_policy(&pair, None)).unwrap();

        prop_assert_eq!(&adopted.policy_id, &existing);
        prop_assert_eq!(again.policy_id, existing);
        prop_assert_eq!(adapter.issued(), 0);
    }
}
