//! Shared domain types.
//!
//! Identifiers are string newtypes so ledger ids, test fixtures like `0xabc`
//! and policy-service ids all flow through the same types.

use crate::error::{MessagingError, MessagingResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a ledger address in bytes.
pub const ADDRESS_LENGTH: usize = 32;

/// Lowercase, and left-pad `0x` hex ids to the full address width so short
/// and long forms of the same id compare equal. Other strings are only
/// lowercased.
fn normalize_id(value: &str) -> String {
    let lowered = value.trim().to_ascii_lowercase();
    match lowered.strip_prefix("0x") {
        Some(digits)
            if !digits.is_empty()
                && digits.len() <= ADDRESS_LENGTH * 2
                && digits.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            format!("0x{digits:0>width$}", width = ADDRESS_LENGTH * 2)
        }
        _ => lowered,
    }
}

/// Ledger account address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(normalize_id(value.as_ref()))
    }

    /// Address from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(format!("0x{}", hex::encode(bytes)))
    }

    /// Fixed-width bytes, when the address is hex.
    pub fn to_bytes(&self) -> Option<[u8; ADDRESS_LENGTH]> {
        let digits = self.0.strip_prefix("0x")?;
        let mut out = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(digits, &mut out).ok()?;
        Some(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-ledger conversation object id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ConversationId(String);

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<ConversationId> for String {
    fn from(value: ConversationId) -> Self {
        value.0
    }
}

impl ConversationId {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(normalize_id(value.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encryption policy identifier issued by the policy service.
///
/// Carried on the ledger as the UTF-8 bytes of its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Policy id from ledger bytes. Non-UTF-8 ids are rendered as `0x` hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self(text.to_string()),
            Err(_) => Self(format!("0x{}", hex::encode(bytes))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionDigest(pub String);

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque event-query pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCursor(pub String);

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two distinct participants, stored in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantPair {
    first: Address,
    second: Address,
}

impl ParticipantPair {
    /// Build a sorted pair. Fails when both sides are the same identity.
    pub fn new(a: Address, b: Address) -> MessagingResult<Self> {
        if a == b {
            return Err(MessagingError::new(format!(
                "A conversation needs two distinct participants, got {a} twice"
            ))
            .with_context("kind", "malformed_participants")
            .with_context("participant", &a));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    /// Build from an arbitrary participant list, which must hold exactly two
    /// distinct identities.
    pub fn from_slice(participants: &[Address]) -> MessagingResult<Self> {
        match participants {
            [a, b] => Self::new(a.clone(), b.clone()),
            other => Err(MessagingError::new(format!(
                "A conversation needs exactly two participants, got {}",
                other.len()
            ))
            .with_context("kind", "malformed_participants")
            .with_context("count", other.len())),
        }
    }

    pub fn first(&self) -> &Address {
        &self.first
    }

    pub fn second(&self) -> &Address {
        &self.second
    }

    pub fn to_vec(&self) -> Vec<Address> {
        vec![self.first.clone(), self.second.clone()]
    }

    pub fn contains(&self, address: &Address) -> bool {
        &self.first == address || &self.second == address
    }

    /// The participant that is not `me`, if `me` is a participant.
    pub fn counterpart(&self, me: &Address) -> Option<&Address> {
        if &self.first == me {
            Some(&self.second)
        } else if &self.second == me {
            Some(&self.first)
        } else {
            None
        }
    }

    /// Stable pairwise lookup key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }
}

/// Live state of a conversation object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub participants: ParticipantPair,
    pub policy_id: PolicyId,
    /// Creation epoch (ms).
    pub created_at: u64,
    /// Epoch (ms) of the most recent message, advanced by the ledger.
    pub last_message_at: u64,
}

/// Full on-ledger state of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub conversation_id: ConversationId,
    pub sequence: u64,
    pub sender: Address,
    pub recipient: Address,
    pub ciphertext: Vec<u8>,
    pub meta: Vec<u8>,
    pub policy_id: Vec<u8>,
    pub attachment: Option<String>,
    pub created_at: u64,
    pub read_at: Option<u64>,
    pub ciphertext_digest: Vec<u8>,
    pub meta_digest: Vec<u8>,
}

impl MessageEnvelope {
    pub fn policy(&self) -> PolicyId {
        PolicyId::from_bytes(&self.policy_id)
    }
}

/// Attachment bytes to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: Option<String>,
    /// Requested retention in storage epochs.
    pub retention: Option<u32>,
}

impl AttachmentUpload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            filename: None,
            retention: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_retention(mut self, epochs: u32) -> Self {
        self.retention = Some(epochs);
        self
    }
}

/// Published attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentReference {
    pub blob_id: String,
    pub url: String,
    /// Granted retention in storage epochs.
    pub retention: u32,
}

/// Policy handle for a participant pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    pub policy_id: PolicyId,
    pub expires_at: Option<u64>,
}

/// Output of an encryption call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenConversationOptions {
    /// Policy already issued for this pair, reused instead of minting a new one.
    pub existing_policy_id: Option<PolicyId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetConversationOptions {
    pub refresh: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SendMessageOptions {
    pub attachment: Option<AttachmentUpload>,
    /// Opaque metadata; empty when not supplied.
    pub meta: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMessagesOptions {
    /// Resume point from a previous page's `next_cursor`.
    pub cursor: Option<EventCursor>,
    pub limit: Option<usize>,
}

/// One page of a conversation's messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<MessageEnvelope>,
    /// Set when `limit` cut the listing short. The following page may be empty.
    pub next_cursor: Option<EventCursor>,
}

/// Confirmed conversation-open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedConversation {
    pub digest: TransactionDigest,
    pub conversation_id: ConversationId,
}

/// Confirmed message-send transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub digest: TransactionDigest,
    pub sequence: u64,
}
