//! Messaging client.
//!
//! Orchestrates the policy service, the blob store and the ledger for one
//! identity. The ledger is authoritative; the client keeps a write-through
//! cache of conversation summaries that a refresh replaces wholesale.

use crate::blob::BlobAdapter;
use crate::error::{MessagingError, MessagingResult};
use crate::ledger::{LedgerTransport, SendRequest};
use crate::policy::PolicyAdapter;
use crate::types::*;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Two-party encrypted messaging over a ledger.
pub struct MessagingClient<T: LedgerTransport, P: PolicyAdapter, B: BlobAdapter> {
    self_address: Address,
    transport: T,
    policy: P,
    blob: B,
    cache: Mutex<HashMap<ConversationId, ConversationSummary>>,
}

impl<T: LedgerTransport, P: PolicyAdapter, B: BlobAdapter> MessagingClient<T, P, B> {
    pub fn new(self_address: Address, transport: T, policy: P, blob: B) -> Self {
        Self {
            self_address,
            transport,
            policy,
            blob,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    /// Cached summary, without touching the ledger.
    pub fn cached_conversation(&self, id: &ConversationId) -> Option<ConversationSummary> {
        self.cache().get(id).cloned()
    }

    // Guard must be dropped before any await.
    fn cache(&self) -> MutexGuard<'_, HashMap<ConversationId, ConversationSummary>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, summary: &ConversationSummary) {
        self.cache().insert(summary.id.clone(), summary.clone());
    }

    /// Open a conversation with `recipient`.
    ///
    /// The returned summary is read back from the ledger after confirmation.
    /// If the object is not readable yet this fails with
    /// `ConversationNotFound`; the open itself is not retried.
    pub async fn open_conversation(
        &self,
        recipient: &Address,
        options: OpenConversationOptions,
    ) -> MessagingResult<ConversationSummary> {
        let participants = ParticipantPair::new(self.self_address.clone(), recipient.clone())?;
        let policy = self
            .policy
            .ensure_conversation_policy(&participants, options.existing_policy_id.as_ref())
            .await?;

        let opened = self
            .transport
            .open_conversation(recipient, &policy.policy_id)
            .await?;
        info!(
            conversation_id = %opened.conversation_id,
            digest = %opened.digest,
            "conversation opened"
        );

        let summary = self
            .transport
            .fetch_conversation(&opened.conversation_id)
            .await?
            .ok_or_else(|| MessagingError::ConversationNotFound {
                conversation_id: opened.conversation_id.clone(),
            })?;
        self.remember(&summary);
        Ok(summary)
    }

    /// Conversations involving `address` (default: this identity).
    ///
    /// Matching cache entries are overwritten; entries missing from the
    /// result are kept.
    pub async fn list_conversations(
        &self,
        address: Option<&Address>,
    ) -> MessagingResult<Vec<ConversationSummary>> {
        let address = address.unwrap_or(&self.self_address);
        let conversations = self.transport.list_conversations(address).await?;

        let mut cache = self.cache();
        for summary in &conversations {
            cache.insert(summary.id.clone(), summary.clone());
        }
        debug!(%address, count = conversations.len(), "conversations listed");
        Ok(conversations)
    }

    pub async fn get_conversation(
        &self,
        id: &ConversationId,
        options: GetConversationOptions,
    ) -> MessagingResult<ConversationSummary> {
        if !options.refresh {
            if let Some(cached) = self.cached_conversation(id) {
                return Ok(cached);
            }
        }

        let summary = self
            .transport
            .fetch_conversation(id)
            .await?
            .ok_or_else(|| MessagingError::ConversationNotFound {
                conversation_id: id.clone(),
            })?;
        self.remember(&summary);
        Ok(summary)
    }

    /// Encrypt and send `plaintext` to the other participant.
    ///
    /// An attachment forces a conversation refresh and is published before
    /// the transaction is built. If publishing fails nothing is submitted.
    pub async fn send_message(
        &self,
        id: &ConversationId,
        plaintext: &[u8],
        options: SendMessageOptions,
    ) -> MessagingResult<SentMessage> {
        let conversation = self
            .get_conversation(
                id,
                GetConversationOptions {
                    refresh: options.attachment.is_some(),
                },
            )
            .await?;

        let recipient = conversation
            .participants
            .counterpart(&self.self_address)
            .cloned()
            .ok_or_else(|| MessagingError::malformed_participants(id))?;

        let policy = self
            .policy
            .ensure_conversation_policy(&conversation.participants, Some(&conversation.policy_id))
            .await?;
        let encrypted = self
            .policy
            .encrypt_message(&policy.policy_id, plaintext)
            .await?;
        if encrypted.nonce.is_some() {
            debug!(conversation_id = %id, "policy service returned a nonce; not recorded on ledger");
        }

        let attachment = match &options.attachment {
            Some(upload) => {
                let published = self.blob.publish_attachment(upload).await.map_err(|e| {
                    warn!(conversation_id = %id, error = %e, "attachment publish failed, message not sent");
                    e
                })?;
                Some(published.blob_id)
            }
            None => None,
        };

        let request = SendRequest {
            conversation_id: id.clone(),
            recipient,
            ciphertext: encrypted.ciphertext,
            meta: options.meta.unwrap_or_default(),
            policy_id: policy.policy_id,
            attachment,
        };
        let sent = self.transport.send_message(&request).await?;
        info!(
            conversation_id = %id,
            sequence = sent.sequence,
            digest = %sent.digest,
            "message sent"
        );
        Ok(sent)
    }

    /// One page of messages of a known conversation. Fails fast with
    /// `ConversationNotFound` before querying events.
    pub async fn list_messages(
        &self,
        id: &ConversationId,
        options: ListMessagesOptions,
    ) -> MessagingResult<MessagePage> {
        self.get_conversation(id, GetConversationOptions::default())
            .await?;
        self.transport.list_messages(id, &options).await
    }

    pub async fn decrypt_message(&self, envelope: &MessageEnvelope) -> MessagingResult<Vec<u8>> {
        self.policy
            .decrypt_message(&envelope.policy(), &envelope.ciphertext)
            .await
    }
}
