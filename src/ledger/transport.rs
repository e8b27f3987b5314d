//! Ledger transport over an injected RPC and signer.
//!
//! Bridges event-log visibility and live state:
//! - writes go through the signer, then the receipt's events yield the ids
//!   the ledger assigned (conversation id, message sequence)
//! - conversation listings come from creation events, followed by a fresh
//!   object read because events only carry creation-time data
//! - message listings come from send events, followed by a read-only
//!   simulation per sequence because events do not carry the full record

use crate::config::LedgerConfig;
use crate::error::{MessagingError, MessagingResult};
use crate::ledger::codec::{decode_simulated_snapshot, CodecError};
use crate::ledger::events::{conversation_from_fields, ConversationCreated, MessageSentEvent};
use crate::ledger::traits::{
    CallArg, LedgerEvent, LedgerRpc, LedgerTransport, SendRequest, Transaction,
    TransactionSigner, CLOCK_OBJECT_ID,
};
use crate::types::{
    Address, ConversationId, ConversationSummary, EventCursor, ListMessagesOptions,
    MessageEnvelope, MessagePage, OpenedConversation, PolicyId, SentMessage,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Entrypoint opening a conversation in the registry.
pub const OPEN_FUNCTION: &str = "open_conversation";
/// Entrypoint appending a message.
pub const SEND_FUNCTION: &str = "send_message";
/// View function returning one message record.
pub const GET_MESSAGE_FUNCTION: &str = "get_message";

pub const CONVERSATION_CREATED_EVENT: &str = "ConversationCreated";
pub const MESSAGE_SENT_EVENT: &str = "MessageSent";
/// Type of the live conversation object.
pub const CONVERSATION_TYPE: &str = "Conversation";
/// Type of the message record returned by simulation.
pub const MESSAGE_TYPE: &str = "Message";

/// Network-backed [`LedgerTransport`].
pub struct ChainTransport<R: LedgerRpc, S: TransactionSigner> {
    rpc: R,
    signer: S,
    ledger: LedgerConfig,
    self_address: Address,
}

impl<R: LedgerRpc, S: TransactionSigner> ChainTransport<R, S> {
    pub fn new(ledger: LedgerConfig, rpc: R, signer: S) -> Self {
        let self_address = Address::new(&ledger.self_address);
        Self {
            rpc,
            signer,
            ledger,
            self_address,
        }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    fn event_type(&self, name: &str) -> String {
        self.ledger.target(name)
    }

    /// Follow the event cursor from `start` until the ledger reports no
    /// further pages or `visit` returns `false`.
    ///
    /// Returns the id of the event `visit` stopped at, or `None` when the
    /// log was exhausted.
    async fn scan_events<F>(
        &self,
        event_type: &str,
        start: Option<EventCursor>,
        mut visit: F,
    ) -> MessagingResult<Option<EventCursor>>
    where
        F: FnMut(&LedgerEvent) -> MessagingResult<bool> + Send,
    {
        let mut cursor = start;
        loop {
            let page = self
                .rpc
                .query_events(event_type, cursor.as_ref(), None)
                .await?;
            debug!(
                event_type,
                count = page.events.len(),
                has_next_page = page.has_next_page,
                "event page"
            );

            for event in &page.events {
                if event.event_type != event_type {
                    continue;
                }
                if !visit(event)? {
                    return Ok(Some(event.id.clone()));
                }
            }

            match (page.has_next_page, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => return Ok(None),
            }
        }
    }

    async fn fetch_snapshot(
        &self,
        id: &ConversationId,
        sequence: u64,
    ) -> MessagingResult<MessageEnvelope> {
        let tx = Transaction::call(
            self.ledger.target(GET_MESSAGE_FUNCTION),
            vec![CallArg::Object(id.to_string()), CallArg::U64(sequence)],
        );
        let values = self.rpc.simulate(&self.self_address, &tx).await?;
        let envelope =
            decode_simulated_snapshot(id, &values, &self.ledger.target(MESSAGE_TYPE))?;

        if envelope.sequence != sequence {
            return Err(CodecError::InvalidField {
                field: "sequence".to_string(),
                reason: format!("requested {sequence}, snapshot holds {}", envelope.sequence),
            }
            .into());
        }
        Ok(envelope)
    }
}

#[async_trait]
impl<R: LedgerRpc, S: TransactionSigner> LedgerTransport for ChainTransport<R, S> {
    async fn open_conversation(
        &self,
        counterparty: &Address,
        policy_id: &PolicyId,
    ) -> MessagingResult<OpenedConversation> {
        let tx = Transaction::call(
            self.ledger.target(OPEN_FUNCTION),
            vec![
                CallArg::Object(self.ledger.registry_id.clone()),
                CallArg::Address(counterparty.clone()),
                CallArg::Bytes(policy_id.to_bytes()),
                CallArg::Object(CLOCK_OBJECT_ID.to_string()),
            ],
        );

        let digest = self.signer.execute(&tx, "Open conversation").await?;
        let receipt = self.rpc.wait_for_transaction(&digest).await?;

        let created_type = self.event_type(CONVERSATION_CREATED_EVENT);
        let event = receipt
            .events
            .iter()
            .find(|e| e.event_type == created_type)
            .ok_or_else(|| MessagingError::missing_event(&created_type, &digest.0))?;
        let created = ConversationCreated::from_payload(&event.payload)?;

        info!(
            conversation = %created.conversation_id,
            counterparty = %counterparty,
            digest = %digest,
            "conversation opened"
        );
        Ok(OpenedConversation {
            digest,
            conversation_id: created.conversation_id,
        })
    }

    async fn send_message(&self, request: &SendRequest) -> MessagingResult<SentMessage> {
        let tx = Transaction::call(
            self.ledger.target(SEND_FUNCTION),
            vec![
                CallArg::Object(request.conversation_id.to_string()),
                CallArg::Address(request.recipient.clone()),
                CallArg::Bytes(request.ciphertext.clone()),
                CallArg::Bytes(request.meta.clone()),
                CallArg::Bytes(request.policy_id.to_bytes()),
                CallArg::OptionString(request.attachment.clone()),
                CallArg::Object(CLOCK_OBJECT_ID.to_string()),
            ],
        );

        let digest = self.signer.execute(&tx, "Send message").await?;
        let receipt = self.rpc.wait_for_transaction(&digest).await?;

        let sent_type = self.event_type(MESSAGE_SENT_EVENT);
        let mut sent = None;
        for event in receipt.events.iter().filter(|e| e.event_type == sent_type) {
            let parsed = MessageSentEvent::from_payload(&event.payload)?;
            if parsed.conversation_id == request.conversation_id {
                sent = Some(parsed);
                break;
            }
        }
        let sent = sent.ok_or_else(|| MessagingError::missing_event(&sent_type, &digest.0))?;

        info!(
            conversation = %request.conversation_id,
            sequence = sent.sequence,
            digest = %digest,
            "message sent"
        );
        Ok(SentMessage {
            digest,
            sequence: sent.sequence,
        })
    }

    async fn fetch_conversation(
        &self,
        id: &ConversationId,
    ) -> MessagingResult<Option<ConversationSummary>> {
        let Some(object) = self.rpc.get_object(id.as_str()).await? else {
            debug!(conversation = %id, "conversation object not found");
            return Ok(None);
        };

        let expected = self.ledger.target(CONVERSATION_TYPE);
        if object.type_tag != expected {
            return Err(CodecError::TypeMismatch {
                expected,
                actual: object.type_tag,
            }
            .into());
        }
        conversation_from_fields(&object.fields).map(Some)
    }

    async fn list_conversations(
        &self,
        address: &Address,
    ) -> MessagingResult<Vec<ConversationSummary>> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        self.scan_events(&self.event_type(CONVERSATION_CREATED_EVENT), None, |event| {
            let created = match ConversationCreated::from_payload(&event.payload) {
                Ok(created) => created,
                Err(err) => {
                    warn!(
                        event = %event.id,
                        digest = %event.tx_digest,
                        error = %err,
                        "skipping undecodable creation event"
                    );
                    return Ok(true);
                }
            };
            if created.participants.contains(address) && seen.insert(created.conversation_id.clone())
            {
                matches.push(created.conversation_id);
            }
            Ok(true)
        })
        .await?;

        let fetched = try_join_all(matches.iter().map(|id| self.fetch_conversation(id))).await?;

        let mut summaries = Vec::with_capacity(fetched.len());
        for (id, summary) in matches.iter().zip(fetched) {
            match summary {
                Some(summary) => summaries.push(summary),
                None => warn!(conversation = %id, "created conversation no longer readable"),
            }
        }
        Ok(summaries)
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        options: &ListMessagesOptions,
    ) -> MessagingResult<MessagePage> {
        let limit = options.limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(MessagePage {
                messages: Vec::new(),
                next_cursor: options.cursor.clone(),
            });
        }

        let mut seen = HashSet::new();
        let mut sequences = Vec::new();
        let next_cursor = self
            .scan_events(
                &self.event_type(MESSAGE_SENT_EVENT),
                options.cursor.clone(),
                |event| {
                    let sent = MessageSentEvent::from_payload(&event.payload)?;
                    if &sent.conversation_id == id && seen.insert(sent.sequence) {
                        sequences.push(sent.sequence);
                    }
                    Ok(sequences.len() < limit)
                },
            )
            .await?;

        let messages =
            try_join_all(sequences.iter().map(|&seq| self.fetch_snapshot(id, seq))).await?;
        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }
}
