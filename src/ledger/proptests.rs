//! Property-based tests for ledger decoding
//!
//! Tests for:
//! - Snapshot codec: truncation and arbitrary input never panic, optional encodings
//! - Event payloads: every optional encoding resolves to the same value

use super::codec::{decode_snapshot, encode_snapshot};
use super::events::{json_option, json_u64};
use crate::types::{Address, ConversationId, MessageEnvelope};
use proptest::prelude::*;
use serde_json::json;

fn envelope_strategy() -> impl Strategy<Value = MessageEnvelope> {
    (
        any::<u64>(),
        prop::collection::vec(any::<u8>(), 0..300),
        prop::option::of("[a-z0-9-]{1,20}"),
        any::<u64>(),
        prop::option::of(any::<u64>()),
    )
        .prop_map(|(sequence, ciphertext, attachment, created_at, read_at)| MessageEnvelope {
            conversation_id: ConversationId::new("0xc0"),
            sequence,
            sender: Address::new("0xabc"),
            recipient: Address::new("0xdef"),
            ciphertext,
            meta: vec![],
            policy_id: b"policy".to_vec(),
            attachment,
            created_at,
            read_at,
            ciphertext_digest: vec![1; 32],
            meta_digest: vec![2; 32],
        })
}

// ============================================================================
// SNAPSHOT CODEC PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: optional fields survive the sequence encoding in both states
    #[test]
    fn snapshot_optionals_preserved(envelope in envelope_strategy()) {
        let bytes = encode_snapshot(&envelope).unwrap();
        let decoded = decode_snapshot(&envelope.conversation_id, &bytes).unwrap();

        prop_assert_eq!(decoded.read_at, envelope.read_at);
        prop_assert_eq!(decoded.attachment, envelope.attachment);
    }

    /// Property: every strict prefix of a snapshot is rejected
    #[test]
    fn truncated_snapshot_rejected(envelope in envelope_strategy(), cut in any::<prop::sample::Index>()) {
        let bytes = encode_snapshot(&envelope).unwrap();
        let cut = cut.index(bytes.len());

        prop_assert!(decode_snapshot(&envelope.conversation_id, &bytes[..cut]).is_err());
    }

    /// Property: arbitrary bytes never panic the decoder
    #[test]
    fn arbitrary_bytes_do_not_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_snapshot(&ConversationId::new("0xc0"), &bytes);
    }
}

// ============================================================================
// EVENT PAYLOAD PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: bare, sequence-wrapped and vec-wrapped optionals agree
    #[test]
    fn optional_encodings_agree(value in any::<u64>()) {
        let encodings = [
            json!(value),
            json!(value.to_string()),
            json!([value]),
            json!({ "vec": [value.to_string()] }),
        ];

        for encoded in &encodings {
            let inner = json_option(encoded, "read_at").unwrap();
            prop_assert!(inner.is_some());
            prop_assert_eq!(json_u64(inner.unwrap(), "read_at").unwrap(), value);
        }
    }

    /// Property: sequences longer than one element are rejected
    #[test]
    fn long_optional_rejected(items in prop::collection::vec(any::<u64>(), 2..6)) {
        prop_assert!(json_option(&json!(items), "read_at").is_err());
    }
}
