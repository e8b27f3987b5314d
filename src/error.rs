//! Messaging error taxonomy.
//!
//! Every public operation of the crate fails with exactly one of these kinds.
//! Lower layers keep their own narrower error enums (`CodecError`,
//! `ConfigError`) and convert into [`MessagingError::Messaging`] with a
//! diagnostic context map.

use crate::types::ConversationId;
use std::collections::BTreeMap;

/// Result type for messaging operations.
pub type MessagingResult<T> = Result<T, MessagingError>;

/// Diagnostic context attached to an error.
pub type ErrorContext = BTreeMap<String, String>;

/// Messaging errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    /// Base messaging failure with arbitrary diagnostic context.
    #[error("{message}")]
    Messaging {
        message: String,
        context: ErrorContext,
    },

    /// The encryption-policy service answered with a non-success status.
    #[error("Policy service unavailable: HTTP {status} from {path}")]
    SealUnavailable { status: u16, path: String },

    /// The conversation object does not exist on the ledger.
    #[error("Conversation not found: {conversation_id}")]
    ConversationNotFound { conversation_id: ConversationId },

    /// Reserved for attachment validation; no code path raises it yet.
    #[error("Unsupported attachment: {reason}")]
    UnsupportedAttachment { reason: String },
}

impl MessagingError {
    /// Base error with an empty context map.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Messaging {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Attach a context entry. No-op for kinds whose context is fixed.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        if let Self::Messaging { context, .. } = &mut self {
            context.insert(key.into(), value.to_string());
        }
        self
    }

    /// Non-success HTTP status from a collaborator other than the policy service.
    pub fn http_status(service: &str, status: u16) -> Self {
        Self::new(format!("{service} request failed with HTTP {status}"))
            .with_context("kind", "http_status")
            .with_context("service", service)
            .with_context("status", status)
    }

    /// Transport-level failure (connection refused, malformed body, ...).
    pub fn network(service: &str, detail: impl ToString) -> Self {
        let detail = detail.to_string();
        Self::new(format!("{service} request failed: {detail}"))
            .with_context("kind", "network")
            .with_context("service", service)
            .with_context("detail", detail)
    }

    /// A conversation whose participants are not two distinct identities, or
    /// which does not include the caller.
    pub fn malformed_participants(conversation_id: &ConversationId) -> Self {
        Self::new(format!(
            "Conversation {conversation_id} has malformed participants"
        ))
        .with_context("kind", "malformed_participants")
        .with_context("conversation_id", conversation_id)
    }

    /// Expected event missing from a confirmed transaction receipt.
    pub fn missing_event(event: &str, digest: &str) -> Self {
        Self::new(format!(
            "Transaction {digest} confirmed without a {event} event"
        ))
        .with_context("kind", "missing_event")
        .with_context("event", event)
        .with_context("digest", digest)
    }

    /// Diagnostic context for any kind.
    pub fn context(&self) -> ErrorContext {
        match self {
            Self::Messaging { context, .. } => context.clone(),
            Self::SealUnavailable { status, path } => ErrorContext::from([
                ("status".to_string(), status.to_string()),
                ("path".to_string(), path.clone()),
            ]),
            Self::ConversationNotFound { conversation_id } => ErrorContext::from([(
                "conversation_id".to_string(),
                conversation_id.to_string(),
            )]),
            Self::UnsupportedAttachment { reason } => {
                ErrorContext::from([("reason".to_string(), reason.clone())])
            }
        }
    }

    /// The `kind` context entry of a base error, if any.
    pub fn kind(&self) -> Option<String> {
        match self {
            Self::Messaging { context, .. } => context.get("kind").cloned(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Malformed JSON payload: {err}"))
            .with_context("kind", "json")
            .with_context("detail", err)
    }
}
