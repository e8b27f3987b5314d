//! Trait abstractions for ledger operations.
//!
//! Three seams:
//! - [`TransactionSigner`]: the externally supplied signing capability
//! - [`LedgerRpc`]: receipts, event queries, object reads and read-only simulation
//! - [`LedgerTransport`]: domain-level conversation and message operations
//!
//! `ChainTransport` implements `LedgerTransport` on top of the first two;
//! `MockLedgerTransport` implements it directly for client tests.

use crate::error::MessagingResult;
use crate::types::{
    Address, ConversationId, ConversationSummary, EventCursor, ListMessagesOptions,
    MessagePage, OpenedConversation, PolicyId, SentMessage, TransactionDigest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Shared on-ledger clock object passed to entrypoints that stamp epochs.
pub const CLOCK_OBJECT_ID: &str = "0x6";

/// Argument to a ledger entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    /// Object reference by id.
    Object(String),
    Address(Address),
    U64(u64),
    Bytes(Vec<u8>),
    /// Nullable string.
    OptionString(Option<String>),
}

/// A single entrypoint invocation, handed to the signer for serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// `package::module::function`
    pub target: String,
    pub arguments: Vec<CallArg>,
}

impl Transaction {
    pub fn call(target: impl Into<String>, arguments: Vec<CallArg>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }

    /// Function name part of the target.
    pub fn function(&self) -> &str {
        self.target.rsplit("::").next().unwrap_or(&self.target)
    }
}

/// Event emitted during transaction execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Position in the event log. Querying with this as the cursor resumes
    /// after the event.
    pub id: EventCursor,
    /// Fully qualified event type, e.g. `0xpkg::messaging::MessageSent`.
    pub event_type: String,
    pub tx_digest: TransactionDigest,
    /// Decoded event fields.
    pub payload: serde_json::Value,
}

/// Confirmed transaction with its events.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub digest: TransactionDigest,
    pub events: Vec<LedgerEvent>,
}

/// One page of an event query.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub events: Vec<LedgerEvent>,
    /// Id of the last event in the page.
    pub next_cursor: Option<EventCursor>,
    pub has_next_page: bool,
}

/// Live object state.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerObject {
    pub object_id: String,
    /// Fully qualified object type.
    pub type_tag: String,
    pub fields: serde_json::Value,
}

/// Typed binary value returned by read-only simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedValue {
    pub type_tag: String,
    pub bytes: Vec<u8>,
}

/// Signing capability supplied by the session layer.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign and submit a transaction, returning its digest.
    async fn execute(
        &self,
        transaction: &Transaction,
        description: &str,
    ) -> MessagingResult<TransactionDigest>;
}

/// Ledger RPC operations consumed by [`ChainTransport`](super::ChainTransport).
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Wait for a submitted transaction to be confirmed and return its events.
    async fn wait_for_transaction(
        &self,
        digest: &TransactionDigest,
    ) -> MessagingResult<TransactionReceipt>;

    /// Query historical events of one type, oldest first, strictly after
    /// `cursor`.
    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventCursor>,
        limit: Option<usize>,
    ) -> MessagingResult<EventPage>;

    /// Read live object state. `None` when the object does not exist.
    async fn get_object(&self, object_id: &str) -> MessagingResult<Option<LedgerObject>>;

    /// Execute a view function without submitting a transaction.
    async fn simulate(
        &self,
        sender: &Address,
        transaction: &Transaction,
    ) -> MessagingResult<Vec<SimulatedValue>>;
}

/// Parameters of a message-send transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub conversation_id: ConversationId,
    pub recipient: Address,
    pub ciphertext: Vec<u8>,
    pub meta: Vec<u8>,
    pub policy_id: PolicyId,
    pub attachment: Option<String>,
}

/// Domain-level ledger operations.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Open a conversation with `counterparty` under `policy_id`.
    ///
    /// A confirmed transaction without a creation event is an error; callers
    /// must re-query rather than resubmit.
    async fn open_conversation(
        &self,
        counterparty: &Address,
        policy_id: &PolicyId,
    ) -> MessagingResult<OpenedConversation>;

    /// Submit a message. The returned sequence is assigned by the ledger.
    async fn send_message(&self, request: &SendRequest) -> MessagingResult<SentMessage>;

    /// Read live conversation state. Absence is `Ok(None)`.
    async fn fetch_conversation(
        &self,
        id: &ConversationId,
    ) -> MessagingResult<Option<ConversationSummary>>;

    /// All conversations that include `address`.
    async fn list_conversations(
        &self,
        address: &Address,
    ) -> MessagingResult<Vec<ConversationSummary>>;

    /// Messages of one conversation, in ledger order.
    ///
    /// The cursor is opaque: pass back a `next_cursor` this transport
    /// returned to continue after the last message of that page.
    async fn list_messages(
        &self,
        id: &ConversationId,
        options: &ListMessagesOptions,
    ) -> MessagingResult<MessagePage>;
}
