//! Typed views over ledger event payloads and conversation objects.
//!
//! Event and object fields arrive as decoded JSON whose shapes vary across
//! RPC versions: u64 as numbers or decimal strings, byte vectors as number
//! arrays or `0x` hex, optionals as `null`, `[]`, `[v]` or `{"vec": [...]}`.
//! Helpers here accept each of those forms.

use crate::error::MessagingResult;
use crate::ledger::codec::CodecError;
use crate::types::{Address, ConversationId, ConversationSummary, ParticipantPair, PolicyId};
use serde_json::Value;

fn invalid(field: &str, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

pub fn field<'a>(payload: &'a Value, name: &str) -> Result<&'a Value, CodecError> {
    payload.get(name).ok_or_else(|| CodecError::MissingField {
        field: name.to_string(),
    })
}

pub fn json_u64(value: &Value, name: &str) -> Result<u64, CodecError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(name, "not an unsigned integer")),
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|e| invalid(name, format!("not an unsigned integer: {e}"))),
        other => Err(invalid(name, format!("expected integer, got {other}"))),
    }
}

pub fn json_string(value: &Value, name: &str) -> Result<String, CodecError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(name, format!("expected string, got {value}")))
}

pub fn json_bytes(value: &Value, name: &str) -> Result<Vec<u8>, CodecError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| invalid(name, format!("byte out of range: {item}")))
            })
            .collect(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(digits) => hex::decode(digits).map_err(|e| invalid(name, e.to_string())),
            None => Ok(s.as_bytes().to_vec()),
        },
        other => Err(invalid(name, format!("expected bytes, got {other}"))),
    }
}

/// Optional value in any of its encodings.
///
/// `null` and the empty sequence are absent; a one-element sequence is
/// present; a `{"vec": [...]}` wrapper is unwrapped first. A bare non-null,
/// non-sequence value counts as present.
pub fn json_option<'a>(value: &'a Value, name: &str) -> Result<Option<&'a Value>, CodecError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => match items.as_slice() {
            [] => Ok(None),
            [inner] => Ok(Some(inner)),
            more => Err(invalid(
                name,
                format!("optional with {} elements, expected 0 or 1", more.len()),
            )),
        },
        Value::Object(map) if map.len() == 1 && map.contains_key("vec") => {
            json_option(&map["vec"], name)
        }
        other => Ok(Some(other)),
    }
}

/// Object id, either bare or wrapped as `{"id": "0x..."}`.
pub fn json_object_id(value: &Value, name: &str) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => map
            .get("id")
            .ok_or_else(|| invalid(name, "object without id"))
            .and_then(|inner| json_object_id(inner, name)),
        other => Err(invalid(name, format!("expected object id, got {other}"))),
    }
}

fn json_participants(value: &Value) -> MessagingResult<ParticipantPair> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid("participants", "expected a list"))?;
    let addresses = items
        .iter()
        .map(|item| json_string(item, "participants").map(Address::new))
        .collect::<Result<Vec<_>, _>>()?;
    ParticipantPair::from_slice(&addresses)
}

/// `ConversationCreated` event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationCreated {
    pub conversation_id: ConversationId,
    pub participants: ParticipantPair,
    pub policy_id: PolicyId,
    pub created_at: u64,
}

impl ConversationCreated {
    pub fn from_payload(payload: &Value) -> MessagingResult<Self> {
        Ok(Self {
            conversation_id: ConversationId::new(json_object_id(
                field(payload, "conversation_id")?,
                "conversation_id",
            )?),
            participants: json_participants(field(payload, "participants")?)?,
            policy_id: PolicyId::from_bytes(&json_bytes(field(payload, "policy_id")?, "policy_id")?),
            created_at: json_u64(field(payload, "created_at")?, "created_at")?,
        })
    }
}

/// `MessageSent` event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSentEvent {
    pub conversation_id: ConversationId,
    pub sequence: u64,
    pub sender: Address,
    pub recipient: Address,
}

impl MessageSentEvent {
    pub fn from_payload(payload: &Value) -> MessagingResult<Self> {
        Ok(Self {
            conversation_id: ConversationId::new(json_object_id(
                field(payload, "conversation_id")?,
                "conversation_id",
            )?),
            sequence: json_u64(field(payload, "sequence")?, "sequence")?,
            sender: Address::new(json_string(field(payload, "sender")?, "sender")?),
            recipient: Address::new(json_string(field(payload, "recipient")?, "recipient")?),
        })
    }
}

/// Conversation summary from live object fields.
///
/// `last_message_at` is optional on the object; a conversation with no
/// messages reports its creation epoch.
pub fn conversation_from_fields(fields: &Value) -> MessagingResult<ConversationSummary> {
    let created_at = json_u64(field(fields, "created_at")?, "created_at")?;
    let last_message_at = match fields.get("last_message_at") {
        Some(value) => match json_option(value, "last_message_at")? {
            Some(inner) => json_u64(inner, "last_message_at")?,
            None => created_at,
        },
        None => created_at,
    };

    Ok(ConversationSummary {
        id: ConversationId::new(json_object_id(field(fields, "id")?, "id")?),
        participants: json_participants(field(fields, "participants")?)?,
        policy_id: PolicyId::from_bytes(&json_bytes(field(fields, "policy_id")?, "policy_id")?),
        created_at,
        last_message_at,
    })
}
