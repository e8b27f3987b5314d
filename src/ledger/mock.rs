//! In-memory ledger doubles for testing.
//!
//! - [`MockLedgerTransport`] replaces the whole transport under `MessagingClient`
//!   and records every call for assertions.
//! - [`MockChain`] emulates the ledger behind [`LedgerRpc`] and
//!   [`TransactionSigner`], so `ChainTransport`'s encoding, event and
//!   simulation logic runs against realistic payloads.
//!
//! Neither double is a ledger: sequences and ids are assigned from counters.
//! Both number every open and send in one event log, and message cursors
//! are positions in that log.

use super::codec::encode_snapshot;
use super::traits::*;
use super::transport::{
    CONVERSATION_CREATED_EVENT, CONVERSATION_TYPE, GET_MESSAGE_FUNCTION, MESSAGE_SENT_EVENT,
    MESSAGE_TYPE, OPEN_FUNCTION, SEND_FUNCTION,
};
use crate::config::LedgerConfig;
use crate::error::{MessagingError, MessagingResult};
use crate::types::*;
use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Epoch step between ledger clock ticks (ms).
const CLOCK_STEP_MS: u64 = 1_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn aborted(reason: impl Into<String>) -> MessagingError {
    let reason = reason.into();
    MessagingError::new(format!("Transaction aborted: {reason}"))
        .with_context("kind", "abort")
        .with_context("reason", reason)
}

fn digest_of(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

/// Cursors in both doubles are event-log positions.
fn parse_cursor(cursor: &EventCursor) -> MessagingResult<usize> {
    cursor.0.parse::<usize>().map_err(|_| {
        MessagingError::new("Invalid cursor")
            .with_context("kind", "cursor")
            .with_context("cursor", cursor)
    })
}

// ============================================================================
// MockLedgerTransport
// ============================================================================

/// Mock transport for client tests.
#[derive(Clone)]
pub struct MockLedgerTransport {
    self_address: Address,
    state: Arc<Mutex<TransportState>>,
}

#[derive(Default)]
struct TransportState {
    conversations: HashMap<ConversationId, ConversationSummary>,
    messages: HashMap<ConversationId, Vec<MessageEnvelope>>,
    /// One entry per open (`None`) or send.
    log: Vec<Option<(ConversationId, u64)>>,
    scripted_opens: VecDeque<(TransactionDigest, ConversationId)>,
    scripted_send_digests: VecDeque<TransactionDigest>,
    opens: Vec<(Address, PolicyId)>,
    sends: Vec<SendRequest>,
    fetch_calls: usize,
    list_conversation_calls: usize,
    list_message_calls: usize,
    skip_objects: bool,
    counter: u64,
    clock: u64,
}

impl TransportState {
    fn tick(&mut self) -> u64 {
        self.clock += CLOCK_STEP_MS;
        self.clock
    }

    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

impl MockLedgerTransport {
    /// Create a transport whose transactions are signed by `self_address`.
    pub fn new(self_address: Address) -> Self {
        Self {
            self_address,
            state: Arc::new(Mutex::new(TransportState::default())),
        }
    }

    /// Digest and conversation id returned by the next open.
    pub fn script_open(&self, digest: &str, conversation_id: &str) {
        lock(&self.state).scripted_opens.push_back((
            TransactionDigest(digest.to_string()),
            ConversationId::new(conversation_id),
        ));
    }

    /// Digest returned by the next send.
    pub fn script_send_digest(&self, digest: &str) {
        lock(&self.state)
            .scripted_send_digests
            .push_back(TransactionDigest(digest.to_string()));
    }

    /// Confirm opens without the conversation object becoming readable.
    pub fn set_skip_objects(&self, skip: bool) {
        lock(&self.state).skip_objects = skip;
    }

    /// Put a conversation object (for test setup).
    pub fn put_conversation(&self, summary: ConversationSummary) {
        lock(&self.state)
            .conversations
            .insert(summary.id.clone(), summary);
    }

    pub fn remove_conversation(&self, id: &ConversationId) {
        lock(&self.state).conversations.remove(id);
    }

    /// Open requests received, as (counterparty, policy).
    pub fn opened(&self) -> Vec<(Address, PolicyId)> {
        lock(&self.state).opens.clone()
    }

    /// Send requests received.
    pub fn sent(&self) -> Vec<SendRequest> {
        lock(&self.state).sends.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        lock(&self.state).fetch_calls
    }

    pub fn list_conversation_calls(&self) -> usize {
        lock(&self.state).list_conversation_calls
    }

    pub fn list_message_calls(&self) -> usize {
        lock(&self.state).list_message_calls
    }
}

#[async_trait]
impl LedgerTransport for MockLedgerTransport {
    async fn open_conversation(
        &self,
        counterparty: &Address,
        policy_id: &PolicyId,
    ) -> MessagingResult<OpenedConversation> {
        let participants = ParticipantPair::new(self.self_address.clone(), counterparty.clone())?;

        let mut state = lock(&self.state);
        state.opens.push((counterparty.clone(), policy_id.clone()));

        state.log.push(None);
        let (digest, conversation_id) = match state.scripted_opens.pop_front() {
            Some(scripted) => scripted,
            None => {
                let n = state.next_id();
                (
                    TransactionDigest(format!("0xopen{n}")),
                    ConversationId::new(format!("0xc{n:x}")),
                )
            }
        };

        if !state.skip_objects {
            let now = state.tick();
            state.conversations.insert(
                conversation_id.clone(),
                ConversationSummary {
                    id: conversation_id.clone(),
                    participants,
                    policy_id: policy_id.clone(),
                    created_at: now,
                    last_message_at: now,
                },
            );
        }

        Ok(OpenedConversation {
            digest,
            conversation_id,
        })
    }

    async fn send_message(&self, request: &SendRequest) -> MessagingResult<SentMessage> {
        let mut state = lock(&self.state);
        state.sends.push(request.clone());

        if !state.conversations.contains_key(&request.conversation_id) {
            return Err(aborted(format!(
                "conversation {} does not exist",
                request.conversation_id
            )));
        }

        let now = state.tick();
        let sequence = state
            .messages
            .get(&request.conversation_id)
            .map_or(0, Vec::len) as u64
            + 1;
        let envelope = MessageEnvelope {
            conversation_id: request.conversation_id.clone(),
            sequence,
            sender: self.self_address.clone(),
            recipient: request.recipient.clone(),
            ciphertext: request.ciphertext.clone(),
            meta: request.meta.clone(),
            policy_id: request.policy_id.to_bytes(),
            attachment: request.attachment.clone(),
            created_at: now,
            read_at: None,
            ciphertext_digest: digest_of(&request.ciphertext),
            meta_digest: digest_of(&request.meta),
        };
        state
            .messages
            .entry(request.conversation_id.clone())
            .or_default()
            .push(envelope);
        state
            .log
            .push(Some((request.conversation_id.clone(), sequence)));
        if let Some(summary) = state.conversations.get_mut(&request.conversation_id) {
            summary.last_message_at = now;
        }

        let digest = match state.scripted_send_digests.pop_front() {
            Some(digest) => digest,
            None => {
                let n = state.next_id();
                TransactionDigest(format!("0xsend{n}"))
            }
        };
        Ok(SentMessage { digest, sequence })
    }

    async fn fetch_conversation(
        &self,
        id: &ConversationId,
    ) -> MessagingResult<Option<ConversationSummary>> {
        let mut state = lock(&self.state);
        state.fetch_calls += 1;
        Ok(state.conversations.get(id).cloned())
    }

    async fn list_conversations(
        &self,
        address: &Address,
    ) -> MessagingResult<Vec<ConversationSummary>> {
        let mut state = lock(&self.state);
        state.list_conversation_calls += 1;
        let mut found: Vec<_> = state
            .conversations
            .values()
            .filter(|c| c.participants.contains(address))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.created_at);
        Ok(found)
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        options: &ListMessagesOptions,
    ) -> MessagingResult<MessagePage> {
        let after = options.cursor.as_ref().map(parse_cursor).transpose()?;
        let limit = options.limit.unwrap_or(usize::MAX);

        let mut state = lock(&self.state);
        state.list_message_calls += 1;
        if limit == 0 {
            return Ok(MessagePage {
                messages: Vec::new(),
                next_cursor: options.cursor.clone(),
            });
        }

        let mut positions = Vec::new();
        for (position, entry) in state.log.iter().enumerate() {
            if after.is_some_and(|after| position <= after) {
                continue;
            }
            if let Some((conversation, sequence)) = entry {
                if conversation == id {
                    positions.push((position, *sequence));
                    if positions.len() == limit {
                        break;
                    }
                }
            }
        }

        let all = state.messages.get(id);
        let messages = positions
            .iter()
            .filter_map(|(_, sequence)| {
                all.and_then(|all| all.iter().find(|m| m.sequence == *sequence))
            })
            .cloned()
            .collect();
        let next_cursor = if positions.len() == limit {
            positions
                .last()
                .map(|(position, _)| EventCursor(position.to_string()))
        } else {
            None
        };
        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }
}

// ============================================================================
// MockChain
// ============================================================================

/// In-memory ledger implementing both [`LedgerRpc`] and [`TransactionSigner`].
///
/// Clone it to hand the same ledger to a transport as RPC and as signer.
#[derive(Clone)]
pub struct MockChain {
    ledger: LedgerConfig,
    signer_address: Address,
    state: Arc<Mutex<ChainState>>,
}

struct ChainState {
    conversations: HashMap<ConversationId, ConversationSummary>,
    messages: HashMap<ConversationId, Vec<MessageEnvelope>>,
    events: Vec<LedgerEvent>,
    receipts: HashMap<TransactionDigest, TransactionReceipt>,
    executed: Vec<(Transaction, String)>,
    page_size: usize,
    withhold_receipt_events: bool,
    snapshot_type_override: Option<String>,
    simulations: usize,
    counter: u64,
    clock: u64,
}

impl MockChain {
    /// Ledger for the configured package; transactions are signed by the
    /// configured self address.
    pub fn new(ledger: LedgerConfig) -> Self {
        let signer_address = Address::new(&ledger.self_address);
        Self {
            ledger,
            signer_address,
            state: Arc::new(Mutex::new(ChainState {
                conversations: HashMap::new(),
                messages: HashMap::new(),
                events: Vec::new(),
                receipts: HashMap::new(),
                executed: Vec::new(),
                page_size: 50,
                withhold_receipt_events: false,
                snapshot_type_override: None,
                simulations: 0,
                counter: 0,
                clock: 0,
            })),
        }
    }

    /// Same ledger state, signing as a different address.
    pub fn signing_as(&self, address: Address) -> Self {
        Self {
            ledger: self.ledger.clone(),
            signer_address: address,
            state: Arc::clone(&self.state),
        }
    }

    /// Maximum events per query page.
    pub fn set_page_size(&self, size: usize) {
        lock(&self.state).page_size = size.max(1);
    }

    /// Confirm transactions with receipts that carry no events, as when the
    /// event index lags behind execution. State and the event log still change.
    pub fn withhold_receipt_events(&self, withhold: bool) {
        lock(&self.state).withhold_receipt_events = withhold;
    }

    /// Report simulated message records under a different type tag.
    pub fn override_snapshot_type(&self, type_tag: Option<String>) {
        lock(&self.state).snapshot_type_override = type_tag;
    }

    /// Stamp a read epoch on a message, as the recipient's own client would.
    pub fn mark_read(&self, id: &ConversationId, sequence: u64, epoch: u64) {
        let mut state = lock(&self.state);
        if let Some(message) = state
            .messages
            .get_mut(id)
            .and_then(|all| all.iter_mut().find(|m| m.sequence == sequence))
        {
            message.read_at = Some(epoch);
        }
    }

    /// Delete a conversation object while keeping its events.
    pub fn remove_object(&self, id: &ConversationId) {
        lock(&self.state).conversations.remove(id);
    }

    /// Append an event to the log without executing anything, e.g. one
    /// emitted by a different package version.
    pub fn push_raw_event(&self, event_type: &str, payload: serde_json::Value) {
        let mut state = lock(&self.state);
        state.counter += 1;
        let event = LedgerEvent {
            id: EventCursor(state.events.len().to_string()),
            event_type: event_type.to_string(),
            tx_digest: TransactionDigest(format!("0xtx{}", state.counter)),
            payload,
        };
        state.events.push(event);
    }

    /// Transactions executed, with their descriptions.
    pub fn executed(&self) -> Vec<(Transaction, String)> {
        lock(&self.state).executed.clone()
    }

    pub fn simulation_count(&self) -> usize {
        lock(&self.state).simulations
    }

    fn execute_open(
        &self,
        state: &mut ChainState,
        args: &[CallArg],
    ) -> MessagingResult<Vec<LedgerEvent>> {
        let [CallArg::Object(registry), CallArg::Address(counterparty), CallArg::Bytes(policy), CallArg::Object(_clock)] =
            args
        else {
            return Err(aborted("open_conversation: unexpected arguments"));
        };
        if registry != &self.ledger.registry_id {
            return Err(aborted(format!("unknown registry {registry}")));
        }
        let participants = ParticipantPair::new(self.signer_address.clone(), counterparty.clone())
            .map_err(|_| aborted("cannot open a conversation with yourself"))?;

        state.counter += 1;
        state.clock += CLOCK_STEP_MS;
        let id = ConversationId::new(format!("0xc0{:x}", state.counter));
        let summary = ConversationSummary {
            id: id.clone(),
            participants,
            policy_id: PolicyId::from_bytes(policy),
            created_at: state.clock,
            last_message_at: state.clock,
        };
        state.conversations.insert(id.clone(), summary);

        Ok(vec![LedgerEvent {
            id: EventCursor(String::new()),
            event_type: self.ledger.target(CONVERSATION_CREATED_EVENT),
            tx_digest: TransactionDigest(String::new()),
            payload: json!({
                "conversation_id": id.as_str(),
                "participants": [self.signer_address.as_str(), counterparty.as_str()],
                "policy_id": policy,
                "created_at": state.clock.to_string(),
            }),
        }])
    }

    fn execute_send(
        &self,
        state: &mut ChainState,
        args: &[CallArg],
    ) -> MessagingResult<Vec<LedgerEvent>> {
        let [CallArg::Object(conversation), CallArg::Address(recipient), CallArg::Bytes(ciphertext), CallArg::Bytes(meta), CallArg::Bytes(policy), CallArg::OptionString(attachment), CallArg::Object(_clock)] =
            args
        else {
            return Err(aborted("send_message: unexpected arguments"));
        };
        let id = ConversationId::new(conversation);
        let summary = state
            .conversations
            .get_mut(&id)
            .ok_or_else(|| aborted(format!("conversation {id} does not exist")))?;
        if summary.participants.counterpart(&self.signer_address) != Some(recipient) {
            return Err(aborted("recipient is not the sender's counterpart"));
        }

        state.clock += CLOCK_STEP_MS;
        let now = state.clock;
        summary.last_message_at = now;

        let messages = state.messages.entry(id.clone()).or_default();
        let sequence = messages.len() as u64 + 1;
        messages.push(MessageEnvelope {
            conversation_id: id.clone(),
            sequence,
            sender: self.signer_address.clone(),
            recipient: recipient.clone(),
            ciphertext: ciphertext.clone(),
            meta: meta.clone(),
            policy_id: policy.clone(),
            attachment: attachment.clone(),
            created_at: now,
            read_at: None,
            ciphertext_digest: digest_of(ciphertext),
            meta_digest: digest_of(meta),
        });

        Ok(vec![LedgerEvent {
            id: EventCursor(String::new()),
            event_type: self.ledger.target(MESSAGE_SENT_EVENT),
            tx_digest: TransactionDigest(String::new()),
            payload: json!({
                "conversation_id": id.as_str(),
                "sequence": sequence.to_string(),
                "sender": self.signer_address.as_str(),
                "recipient": recipient.as_str(),
            }),
        }])
    }
}

#[async_trait]
impl TransactionSigner for MockChain {
    async fn execute(
        &self,
        transaction: &Transaction,
        description: &str,
    ) -> MessagingResult<TransactionDigest> {
        let prefix = format!("{}::{}::", self.ledger.package_id, self.ledger.module_name);
        let mut state = lock(&self.state);
        state
            .executed
            .push((transaction.clone(), description.to_string()));

        let function = transaction
            .target
            .strip_prefix(&prefix)
            .ok_or_else(|| aborted(format!("unknown package in {}", transaction.target)))?;
        let mut events = match function {
            OPEN_FUNCTION => self.execute_open(&mut state, &transaction.arguments)?,
            SEND_FUNCTION => self.execute_send(&mut state, &transaction.arguments)?,
            other => return Err(aborted(format!("unknown entrypoint {other}"))),
        };

        state.counter += 1;
        let digest = TransactionDigest(format!("0xtx{}", state.counter));
        for (offset, event) in events.iter_mut().enumerate() {
            event.id = EventCursor((state.events.len() + offset).to_string());
            event.tx_digest = digest.clone();
        }
        state.events.extend(events.iter().cloned());

        let receipt_events = if state.withhold_receipt_events {
            Vec::new()
        } else {
            events
        };
        state.receipts.insert(
            digest.clone(),
            TransactionReceipt {
                digest: digest.clone(),
                events: receipt_events,
            },
        );
        Ok(digest)
    }
}

#[async_trait]
impl LedgerRpc for MockChain {
    async fn wait_for_transaction(
        &self,
        digest: &TransactionDigest,
    ) -> MessagingResult<TransactionReceipt> {
        lock(&self.state)
            .receipts
            .get(digest)
            .cloned()
            .ok_or_else(|| MessagingError::new(format!("Unknown transaction {digest}")))
    }

    /// Event ids are positions in the full event log.
    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventCursor>,
        limit: Option<usize>,
    ) -> MessagingResult<EventPage> {
        let after = cursor.map(parse_cursor).transpose()?;

        let state = lock(&self.state);
        let page_size = limit.unwrap_or(state.page_size).min(state.page_size);
        let mut matching = state
            .events
            .iter()
            .enumerate()
            .filter(|(position, e)| {
                e.event_type == event_type && after.map_or(true, |after| *position > after)
            })
            .map(|(_, e)| e);

        let events: Vec<LedgerEvent> = matching.by_ref().take(page_size).cloned().collect();
        let has_next_page = matching.next().is_some();
        Ok(EventPage {
            next_cursor: events.last().map(|e| e.id.clone()),
            events,
            has_next_page,
        })
    }

    async fn get_object(&self, object_id: &str) -> MessagingResult<Option<LedgerObject>> {
        let state = lock(&self.state);
        Ok(state
            .conversations
            .get(&ConversationId::new(object_id))
            .map(|c| LedgerObject {
                object_id: c.id.to_string(),
                type_tag: self.ledger.target(CONVERSATION_TYPE),
                fields: json!({
                    "id": { "id": c.id.as_str() },
                    "participants": [c.participants.first().as_str(), c.participants.second().as_str()],
                    "policy_id": format!("0x{}", hex::encode(c.policy_id.to_bytes())),
                    "created_at": c.created_at.to_string(),
                    "last_message_at": { "vec": [c.last_message_at.to_string()] },
                }),
            }))
    }

    async fn simulate(
        &self,
        _sender: &Address,
        transaction: &Transaction,
    ) -> MessagingResult<Vec<SimulatedValue>> {
        if transaction.target != self.ledger.target(GET_MESSAGE_FUNCTION) {
            return Err(aborted(format!("unknown view {}", transaction.target)));
        }
        let [CallArg::Object(conversation), CallArg::U64(sequence)] =
            transaction.arguments.as_slice()
        else {
            return Err(aborted("get_message: unexpected arguments"));
        };

        let mut state = lock(&self.state);
        state.simulations += 1;
        let id = ConversationId::new(conversation);
        let message = state
            .messages
            .get(&id)
            .and_then(|all| all.iter().find(|m| m.sequence == *sequence))
            .ok_or_else(|| aborted(format!("no message {sequence} in {id}")))?;

        Ok(vec![SimulatedValue {
            type_tag: state
                .snapshot_type_override
                .clone()
                .unwrap_or_else(|| self.ledger.target(MESSAGE_TYPE)),
            bytes: encode_snapshot(message)?,
        }])
    }
}
