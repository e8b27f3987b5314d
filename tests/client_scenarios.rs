//! Messaging Client Scenarios
//!
//! End-to-end client behavior over the in-memory doubles:
//! 1. Open, cache and re-read a conversation
//! 2. Send without attachment
//! 3. Ledger-driven sequence ordering
//! 4. Cache semantics (refresh, write-through listing, no eviction)
//! 5. Attachments (publish before submit, nothing submitted on failure)
//! 6. Not-found and malformed-participant failures
//!
//! Uses MockLedgerTransport + MemoryPolicyAdapter + MemoryBlobAdapter.

use duet::blob::MemoryBlobAdapter;
use duet::ledger::MockLedgerTransport;
use duet::policy::{MemoryPolicyAdapter, PolicyAdapter};
use duet::types::*;
use duet::{MessagingClient, MessagingError};

type TestClient = MessagingClient<MockLedgerTransport, MemoryPolicyAdapter, MemoryBlobAdapter>;

struct Harness {
    client: TestClient,
    transport: MockLedgerTransport,
    policy: MemoryPolicyAdapter,
    blob: MemoryBlobAdapter,
}

fn harness(me: &str) -> Harness {
    let transport = MockLedgerTransport::new(Address::new(me));
    let policy = MemoryPolicyAdapter::new();
    let blob = MemoryBlobAdapter::new();
    let client = MessagingClient::new(
        Address::new(me),
        transport.clone(),
        policy.clone(),
        blob.clone(),
    );
    Harness {
        client,
        transport,
        policy,
        blob,
    }
}

async fn open_convo(h: &Harness) -> ConversationSummary {
    h.transport.script_open("0xdigest", "0xconvo");
    h.client
        .open_conversation(&Address::new("0xdef"), OpenConversationOptions::default())
        .await
        .unwrap()
}

/// Scenario A: open between 0xabc and 0xdef, then read it back from cache
#[tokio::test]
async fn test_scenario_a_open_then_get_from_cache() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;

    assert_eq!(summary.id, ConversationId::new("0xconvo"));
    assert_eq!(
        summary.participants.to_vec(),
        vec![Address::new("0xabc"), Address::new("0xdef")]
    );
    assert_eq!(h.transport.fetch_calls(), 1);

    let opened = h.transport.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, Address::new("0xdef"));
    assert_eq!(opened[0].1, summary.policy_id);

    let cached = h
        .client
        .get_conversation(&summary.id, GetConversationOptions::default())
        .await
        .unwrap();
    assert_eq!(cached, summary);
    assert_eq!(h.transport.fetch_calls(), 1, "cache hit must not fetch");
}

/// Scenario B: one send, no attachment, ledger-assigned sequence
#[tokio::test]
async fn test_scenario_b_send_without_attachment() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;
    h.transport.script_send_digest("0xmsg");

    let sent = h
        .client
        .send_message(&summary.id, &[1, 2, 3], SendMessageOptions::default())
        .await
        .unwrap();

    assert_eq!(
        sent,
        SentMessage {
            digest: TransactionDigest("0xmsg".to_string()),
            sequence: 1
        }
    );

    let sends = h.transport.sent();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].recipient, Address::new("0xdef"));
    assert!(!sends[0].ciphertext.is_empty());
    assert_ne!(sends[0].ciphertext, vec![1, 2, 3]);
    assert!(sends[0].meta.is_empty());
    assert_eq!(sends[0].attachment, None);
    assert_eq!(sends[0].policy_id, summary.policy_id);
    assert_eq!(h.blob.published_count(), 0);
}

#[tokio::test]
async fn test_sequences_strictly_increase() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;

    let mut last = 0;
    for i in 0..5u8 {
        let sent = h
            .client
            .send_message(&summary.id, &[i], SendMessageOptions::default())
            .await
            .unwrap();
        assert!(sent.sequence > last);
        last = sent.sequence;
    }
    assert_eq!(last, 5);
}

#[tokio::test]
async fn test_open_reuses_existing_policy() {
    let h = harness("0xabc");
    let existing = PolicyId::new("ledger-issued-policy");

    let summary = h
        .client
        .open_conversation(
            &Address::new("0xdef"),
            OpenConversationOptions {
                existing_policy_id: Some(existing.clone()),
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.policy_id, existing);
    assert_eq!(h.policy.issued(), 0);
}

#[tokio::test]
async fn test_policy_is_pair_scoped_across_directions() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;

    let reverse = ParticipantPair::new(Address::new("0xdef"), Address::new("0xabc")).unwrap();
    let descriptor = h
        .policy
        .ensure_conversation_policy(&reverse, None)
        .await
        .unwrap();
    assert_eq!(descriptor.policy_id, summary.policy_id);
}

#[tokio::test]
async fn test_get_with_refresh_always_fetches() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;
    let before = h.transport.fetch_calls();

    for _ in 0..2 {
        h.client
            .get_conversation(&summary.id, GetConversationOptions { refresh: true })
            .await
            .unwrap();
    }
    assert_eq!(h.transport.fetch_calls(), before + 2);
}

#[tokio::test]
async fn test_refresh_replaces_cache_entry() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;
    h.client
        .send_message(&summary.id, b"bump", SendMessageOptions::default())
        .await
        .unwrap();

    let stale = h.client.cached_conversation(&summary.id).unwrap();
    let fresh = h
        .client
        .get_conversation(&summary.id, GetConversationOptions { refresh: true })
        .await
        .unwrap();

    assert!(fresh.last_message_at > stale.last_message_at);
    assert_eq!(h.client.cached_conversation(&summary.id), Some(fresh));
}

#[tokio::test]
async fn test_list_conversations_is_write_through_without_eviction() {
    let h = harness("0xabc");
    let first = open_convo(&h).await;
    let second = h
        .client
        .open_conversation(&Address::new("0x123"), OpenConversationOptions::default())
        .await
        .unwrap();

    h.transport.remove_conversation(&first.id);
    let listed = h.client.list_conversations(None).await.unwrap();

    assert_eq!(listed, vec![second.clone()]);
    assert_eq!(h.client.cached_conversation(&first.id), Some(first));
    assert_eq!(h.client.cached_conversation(&second.id), Some(second));
}

#[tokio::test]
async fn test_list_conversations_for_other_address() {
    let h = harness("0xabc");
    open_convo(&h).await;

    let for_def = h
        .client
        .list_conversations(Some(&Address::new("0xdef")))
        .await
        .unwrap();
    let for_stranger = h
        .client
        .list_conversations(Some(&Address::new("0x999")))
        .await
        .unwrap();

    assert_eq!(for_def.len(), 1);
    assert!(for_stranger.is_empty());
}

#[tokio::test]
async fn test_attachment_published_before_send() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;
    let fetches = h.transport.fetch_calls();

    let upload = AttachmentUpload::new(b"%PDF".to_vec(), "application/pdf").with_filename("a.pdf");
    h.client
        .send_message(
            &summary.id,
            b"see attached",
            SendMessageOptions {
                attachment: Some(upload),
                meta: Some(b"{\"v\":1}".to_vec()),
            },
        )
        .await
        .unwrap();

    assert_eq!(h.transport.fetch_calls(), fetches + 1, "attachment forces refresh");
    let sends = h.transport.sent();
    assert_eq!(sends[0].attachment.as_deref(), Some("blob-1"));
    assert_eq!(sends[0].meta, b"{\"v\":1}".to_vec());
    assert_eq!(h.blob.get("blob-1"), Some(b"%PDF".to_vec()));
    assert_eq!(
        h.blob.upload("blob-1").unwrap().filename.as_deref(),
        Some("a.pdf")
    );
}

#[tokio::test]
async fn test_attachment_failure_submits_nothing() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;
    h.blob.set_unavailable(true);

    let err = h
        .client
        .send_message(
            &summary.id,
            b"lost",
            SendMessageOptions {
                attachment: Some(AttachmentUpload::new(vec![0; 8], "image/png")),
                meta: None,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind().as_deref(), Some("http_status"));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn test_open_without_readable_object_is_not_found() {
    let h = harness("0xabc");
    h.transport.set_skip_objects(true);
    h.transport.script_open("0xdigest", "0xghost");

    let err = h
        .client
        .open_conversation(&Address::new("0xdef"), OpenConversationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        MessagingError::ConversationNotFound {
            conversation_id: ConversationId::new("0xghost")
        }
    );
    assert_eq!(h.transport.opened().len(), 1, "open is not retried");
    assert_eq!(h.client.cached_conversation(&ConversationId::new("0xghost")), None);
}

#[tokio::test]
async fn test_get_unknown_conversation_is_not_found() {
    let h = harness("0xabc");
    let err = h
        .client
        .get_conversation(&ConversationId::new("0xnope"), GetConversationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::ConversationNotFound { .. }));
}

#[tokio::test]
async fn test_list_messages_fails_fast_for_unknown_conversation() {
    let h = harness("0xabc");
    let err = h
        .client
        .list_messages(&ConversationId::new("0xnope"), ListMessagesOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::ConversationNotFound { .. }));
    assert_eq!(h.transport.list_message_calls(), 0);
}

#[tokio::test]
async fn test_list_messages_pages_and_decrypt() {
    let h = harness("0xabc");
    let summary = open_convo(&h).await;
    for text in ["one", "two", "three"] {
        h.client
            .send_message(&summary.id, text.as_bytes(), SendMessageOptions::default())
            .await
            .unwrap();
    }

    let first = h
        .client
        .list_messages(
            &summary.id,
            ListMessagesOptions {
                cursor: None,
                limit: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(first.messages.len(), 1);
    assert_eq!(first.messages[0].sequence, 1);

    let second = h
        .client
        .list_messages(
            &summary.id,
            ListMessagesOptions {
                cursor: first.next_cursor.clone(),
                limit: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(second.messages.len(), 1);
    assert_eq!(second.messages[0].sequence, 2);
    assert!(second.next_cursor.is_some());
    assert_eq!(
        h.client.decrypt_message(&second.messages[0]).await.unwrap(),
        b"two"
    );

    let rest = h
        .client
        .list_messages(
            &summary.id,
            ListMessagesOptions {
                cursor: second.next_cursor,
                limit: None,
            },
        )
        .await
        .unwrap();
    let sequences: Vec<u64> = rest.messages.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![3]);
    assert_eq!(rest.next_cursor, None);
}

#[tokio::test]
async fn test_policy_outage_propagates_unchanged() {
    let h = harness("0xabc");
    h.policy.set_unavailable(true);

    let err = h
        .client
        .open_conversation(&Address::new("0xdef"), OpenConversationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        MessagingError::SealUnavailable {
            status: 503,
            path: "/policies/ensure".to_string()
        }
    );
    assert!(h.transport.opened().is_empty());
}

#[tokio::test]
async fn test_send_in_foreign_conversation_is_malformed() {
    let h = harness("0xabc");
    let id = ConversationId::new("0xforeign");
    h.transport.put_conversation(ConversationSummary {
        id: id.clone(),
        participants: ParticipantPair::new(Address::new("0x111"), Address::new("0x222")).unwrap(),
        policy_id: PolicyId::new("p"),
        created_at: 1,
        last_message_at: 1,
    });

    let err = h
        .client
        .send_message(&id, b"x", SendMessageOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind().as_deref(), Some("malformed_participants"));
    assert_eq!(
        err.context().get("conversation_id").map(String::as_str),
        Some(id.as_str())
    );
}
