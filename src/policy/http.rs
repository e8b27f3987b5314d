//! Policy service HTTP client.
//!
//! Endpoints (all `POST`, JSON bodies, binary fields base64):
//! - `/policies/ensure`  `{participants, existingPolicyId?}` -> `{policyId, expiresAt?}`
//! - `/messages/encrypt` `{policyId, plaintext}` -> `{ciphertext, nonce?}`
//! - `/messages/decrypt` `{policyId, ciphertext}` -> `{plaintext}`
//!
//! Any non-success status is `SealUnavailable { status, path }`. No retries.

use super::PolicyAdapter;
use crate::config::PolicyServiceConfig;
use crate::error::{MessagingError, MessagingResult};
use crate::types::{EncryptedPayload, ParticipantPair, PolicyDescriptor, PolicyId};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub const ENSURE_PATH: &str = "/policies/ensure";
pub const ENCRYPT_PATH: &str = "/messages/encrypt";
pub const DECRYPT_PATH: &str = "/messages/decrypt";

const SERVICE: &str = "policy service";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnsureRequest<'a> {
    participants: [&'a str; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_policy_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnsureResponse {
    policy_id: String,
    #[serde(default)]
    expires_at: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptRequest<'a> {
    policy_id: &'a str,
    plaintext: String,
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
    #[serde(default)]
    nonce: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest<'a> {
    policy_id: &'a str,
    ciphertext: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

fn decode_base64(field: &str, value: &str) -> MessagingResult<Vec<u8>> {
    BASE64.decode(value).map_err(|e| {
        MessagingError::new(format!("Policy service returned invalid base64 {field}"))
            .with_context("kind", "decode")
            .with_context("field", field)
            .with_context("detail", e)
    })
}

/// Network-backed policy adapter.
pub struct HttpPolicyAdapter {
    client: reqwest::Client,
    base_url: String,
    /// Descriptors already issued, by sorted pair key.
    known: Mutex<HashMap<String, PolicyDescriptor>>,
}

impl HttpPolicyAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn from_config(config: &PolicyServiceConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            known: Mutex::new(HashMap::new()),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> MessagingResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MessagingError::network(SERVICE, e).with_context("path", path))?;

        let status = response.status();
        debug!(path, status = status.as_u16(), "policy service response");
        if !status.is_success() {
            return Err(MessagingError::SealUnavailable {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| MessagingError::network(SERVICE, e).with_context("path", path))
    }
}

#[async_trait]
impl PolicyAdapter for HttpPolicyAdapter {
    async fn ensure_conversation_policy(
        &self,
        participants: &ParticipantPair,
        existing: Option<&PolicyId>,
    ) -> MessagingResult<PolicyDescriptor> {
        let key = participants.key();
        let known = self
            .known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(known) = known {
            return Ok(known);
        }

        let request = EnsureRequest {
            participants: [participants.first().as_str(), participants.second().as_str()],
            existing_policy_id: existing.map(PolicyId::as_str),
        };
        let response: EnsureResponse = self.post(ENSURE_PATH, &request).await?;
        let descriptor = PolicyDescriptor {
            policy_id: PolicyId::new(response.policy_id),
            expires_at: response.expires_at,
        };

        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, descriptor.clone());
        Ok(descriptor)
    }

    async fn encrypt_message(
        &self,
        policy_id: &PolicyId,
        plaintext: &[u8],
    ) -> MessagingResult<EncryptedPayload> {
        let request = EncryptRequest {
            policy_id: policy_id.as_str(),
            plaintext: BASE64.encode(plaintext),
        };
        let response: EncryptResponse = self.post(ENCRYPT_PATH, &request).await?;

        Ok(EncryptedPayload {
            ciphertext: decode_base64("ciphertext", &response.ciphertext)?,
            nonce: response
                .nonce
                .as_deref()
                .map(|nonce| decode_base64("nonce", nonce))
                .transpose()?,
        })
    }

    async fn decrypt_message(
        &self,
        policy_id: &PolicyId,
        ciphertext: &[u8],
    ) -> MessagingResult<Vec<u8>> {
        let request = DecryptRequest {
            policy_id: policy_id.as_str(),
            ciphertext: BASE64.encode(ciphertext),
        };
        let response: DecryptResponse = self.post(DECRYPT_PATH, &request).await?;
        decode_base64("plaintext", &response.plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    #[test]
    fn test_ensure_request_shape() {
        let pair = ParticipantPair::new(Address::new("0xdef"), Address::new("0xabc")).unwrap();
        let request = EnsureRequest {
            participants: [pair.first().as_str(), pair.second().as_str()],
            existing_policy_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["participants"][0], pair.first().as_str());
        assert!(json.get("existingPolicyId").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let adapter = HttpPolicyAdapter::new("https://policy.example/");
        assert_eq!(adapter.base_url, "https://policy.example");
    }

    #[test]
    fn test_from_config_uses_base_url() {
        let config = PolicyServiceConfig {
            base_url: "https://policy.example/v2/".to_string(),
        };
        let adapter = HttpPolicyAdapter::from_config(&config);
        assert_eq!(adapter.base_url, "https://policy.example/v2");
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let err = decode_base64("ciphertext", "***").unwrap_err();
        assert_eq!(err.kind().as_deref(), Some("decode"));
    }
}
