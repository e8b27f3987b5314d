//! Binary message snapshot codec.
//!
//! Snapshots come back from read-only simulation as canonical binary values:
//! little-endian fixed-width integers, 32-byte addresses, and ULEB128
//! length-prefixed sequences. Field order is fixed:
//!
//! ```text
//! sequence          u64
//! sender            address
//! recipient         address
//! ciphertext        vector<u8>
//! meta              vector<u8>
//! policy_id         vector<u8>
//! attachment        option<string>
//! created_at        u64
//! read_at           option<u64>
//! ciphertext_digest vector<u8>
//! meta_digest       vector<u8>
//! ```
//!
//! Optional values are sequences of zero or one element. Both the empty
//! sequence and the one-element sequence go through [`SnapshotReader::read_option`].

use crate::error::MessagingError;
use crate::ledger::traits::SimulatedValue;
use crate::types::{Address, ConversationId, MessageEnvelope, ADDRESS_LENGTH};
use thiserror::Error;

/// Largest sequence length accepted from the wire.
const MAX_SEQUENCE_LEN: u64 = u32::MAX as u64;

/// Decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unexpected end of input reading {field}: needed {needed} bytes, {remaining} left")]
    UnexpectedEof {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("Malformed length prefix for {field}")]
    InvalidLength { field: &'static str },

    #[error("Optional {field} has {len} elements, expected 0 or 1")]
    InvalidOption { field: &'static str, len: u64 },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("{remaining} trailing bytes after snapshot")]
    TrailingBytes { remaining: usize },

    #[error("Type tag mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Simulation returned no values")]
    MissingReturnValue,

    #[error("Missing field {field}")]
    MissingField { field: String },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl From<CodecError> for MessagingError {
    fn from(err: CodecError) -> Self {
        MessagingError::new(format!("Failed to decode ledger value: {err}"))
            .with_context("kind", "decode")
            .with_context("detail", err)
    }
}

/// Cursor over a canonical binary value.
pub struct SnapshotReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, field: &'static str, needed: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < needed {
            return Err(CodecError::UnexpectedEof {
                field,
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(field, 1)?[0])
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(field, 8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// ULEB128 length prefix.
    pub fn read_uleb128(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.read_u8(field)?;
            let digit = u64::from(byte & 0x7f);
            if shift == 63 && digit > 1 {
                return Err(CodecError::InvalidLength { field });
            }
            value |= digit << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::InvalidLength { field })
    }

    fn read_len(&mut self, field: &'static str) -> Result<usize, CodecError> {
        let len = self.read_uleb128(field)?;
        if len > MAX_SEQUENCE_LEN {
            return Err(CodecError::InvalidLength { field });
        }
        usize::try_from(len).map_err(|_| CodecError::InvalidLength { field })
    }

    pub fn read_address(&mut self, field: &'static str) -> Result<Address, CodecError> {
        Ok(Address::from_bytes(self.take(field, ADDRESS_LENGTH)?))
    }

    pub fn read_bytes(&mut self, field: &'static str) -> Result<Vec<u8>, CodecError> {
        let len = self.read_len(field)?;
        Ok(self.take(field, len)?.to_vec())
    }

    pub fn read_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let bytes = self.read_bytes(field)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    /// Optional value encoded as a sequence of zero or one element.
    ///
    /// An empty sequence is absent; a one-element sequence is present. Any
    /// other length is rejected rather than truncated.
    pub fn read_option<T, F>(&mut self, field: &'static str, read: F) -> Result<Option<T>, CodecError>
    where
        F: FnOnce(&mut Self) -> Result<T, CodecError>,
    {
        match self.read_uleb128(field)? {
            0 => Ok(None),
            1 => read(self).map(Some),
            len => Err(CodecError::InvalidOption { field, len }),
        }
    }

    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(CodecError::TrailingBytes { remaining }),
        }
    }
}

/// Decode one message snapshot.
pub fn decode_snapshot(
    conversation_id: &ConversationId,
    bytes: &[u8],
) -> Result<MessageEnvelope, CodecError> {
    let mut reader = SnapshotReader::new(bytes);

    let envelope = MessageEnvelope {
        conversation_id: conversation_id.clone(),
        sequence: reader.read_u64("sequence")?,
        sender: reader.read_address("sender")?,
        recipient: reader.read_address("recipient")?,
        ciphertext: reader.read_bytes("ciphertext")?,
        meta: reader.read_bytes("meta")?,
        policy_id: reader.read_bytes("policy_id")?,
        attachment: reader.read_option("attachment", |r| r.read_string("attachment"))?,
        created_at: reader.read_u64("created_at")?,
        read_at: reader.read_option("read_at", |r| r.read_u64("read_at"))?,
        ciphertext_digest: reader.read_bytes("ciphertext_digest")?,
        meta_digest: reader.read_bytes("meta_digest")?,
    };

    reader.finish()?;
    Ok(envelope)
}

/// Decode the first value of a simulation result, which must carry exactly
/// the expected type tag.
pub fn decode_simulated_snapshot(
    conversation_id: &ConversationId,
    values: &[SimulatedValue],
    expected_type: &str,
) -> Result<MessageEnvelope, CodecError> {
    let value = values.first().ok_or(CodecError::MissingReturnValue)?;
    if value.type_tag != expected_type {
        return Err(CodecError::TypeMismatch {
            expected: expected_type.to_string(),
            actual: value.type_tag.clone(),
        });
    }
    decode_snapshot(conversation_id, &value.bytes)
}

/// Writer for the same layout. Used by the in-memory ledger and the CLI's
/// fixtures.
#[derive(Default)]
pub struct SnapshotWriter {
    bytes: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_uleb128(&mut self, mut value: u64) -> &mut Self {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return self;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    pub fn write_address(&mut self, address: &Address) -> Result<&mut Self, CodecError> {
        let raw = address.to_bytes().ok_or_else(|| CodecError::InvalidField {
            field: "address".to_string(),
            reason: format!("{address} is not a hex address"),
        })?;
        self.bytes.extend_from_slice(&raw);
        Ok(self)
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.write_uleb128(value.len() as u64);
        self.bytes.extend_from_slice(value);
        self
    }

    pub fn write_option<T, F>(&mut self, value: Option<T>, write: F) -> &mut Self
    where
        F: FnOnce(&mut Self, T),
    {
        match value {
            None => {
                self.write_uleb128(0);
            }
            Some(inner) => {
                self.write_uleb128(1);
                write(self, inner);
            }
        }
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encode a message snapshot in the canonical layout.
pub fn encode_snapshot(envelope: &MessageEnvelope) -> Result<Vec<u8>, CodecError> {
    let mut w = SnapshotWriter::new();
    w.write_u64(envelope.sequence);
    w.write_address(&envelope.sender)?;
    w.write_address(&envelope.recipient)?;
    w.write_bytes(&envelope.ciphertext)
        .write_bytes(&envelope.meta)
        .write_bytes(&envelope.policy_id)
        .write_option(envelope.attachment.as_deref(), |w, s| {
            w.write_bytes(s.as_bytes());
        })
        .write_u64(envelope.created_at)
        .write_option(envelope.read_at, |w, v| {
            w.write_u64(v);
        })
        .write_bytes(&envelope.ciphertext_digest)
        .write_bytes(&envelope.meta_digest);
    Ok(w.into_bytes())
}
