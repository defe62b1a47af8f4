//! Policy signature verification.
//!
//! A signed policy ships with an adjacent JSON envelope carrying the KMS
//! key id, the signing algorithm, and a `sha256:<hex>` digest of the YAML
//! bytes. Verification is two-stage: the digest is recomputed and compared
//! first, then the asymmetric signature is checked against KMS. Both must
//! pass; a single flipped bit in the YAML fails the digest comparison
//! before KMS is ever consulted.

use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{MessageType, SigningAlgorithmSpec};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PolicyError;

/// The only algorithm Sentinel signs policies with.
pub const SIGNING_ALGORITHM: &str = "RSASSA_PSS_SHA_256";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureEnvelope {
    /// Base64 of the raw RSASSA-PSS signature bytes.
    pub signature: String,
    pub metadata: SignatureMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureMetadata {
    pub key_id: String,
    pub algorithm: String,
    pub signed_at: jiff::Timestamp,
    /// `sha256:<hex>` digest of the signed YAML bytes.
    pub policy_hash: String,
}

impl SignatureEnvelope {
    pub fn from_json(raw: &str, path: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(raw).map_err(|e| PolicyError::SignatureEnvelope {
            path: path.to_string(),
            problem: e.to_string(),
        })
    }
}

/// Recompute the SHA-256 of `yaml` and require it to match the envelope's
/// `policy_hash`. Returns the digest for the subsequent KMS call.
pub fn check_policy_hash(
    yaml: &[u8],
    envelope: &SignatureEnvelope,
    path: &str,
) -> Result<[u8; 32], PolicyError> {
    let digest: [u8; 32] = Sha256::digest(yaml).into();

    let expected = envelope
        .metadata
        .policy_hash
        .strip_prefix("sha256:")
        .ok_or_else(|| PolicyError::SignatureEnvelope {
            path: path.to_string(),
            problem: "policy_hash must start with sha256:".to_string(),
        })?;

    if !expected.eq_ignore_ascii_case(&hex::encode(digest)) {
        return Err(PolicyError::HashMismatch {
            path: path.to_string(),
        });
    }
    Ok(digest)
}

/// Full verification: digest comparison, then KMS `Verify` over the digest.
pub async fn verify(
    kms: &aws_sdk_kms::Client,
    yaml: &[u8],
    envelope: &SignatureEnvelope,
    path: &str,
) -> Result<(), PolicyError> {
    if envelope.metadata.algorithm != SIGNING_ALGORITHM {
        return Err(PolicyError::SignatureEnvelope {
            path: path.to_string(),
            problem: format!(
                "unsupported algorithm {:?} (expected {SIGNING_ALGORITHM})",
                envelope.metadata.algorithm
            ),
        });
    }

    let digest = check_policy_hash(yaml, envelope, path)?;

    let sig_bytes = BASE64
        .decode(&envelope.signature)
        .map_err(|e| PolicyError::SignatureEnvelope {
            path: path.to_string(),
            problem: format!("signature is not valid base64: {e}"),
        })?;

    let resp = kms
        .verify()
        .key_id(&envelope.metadata.key_id)
        .message(Blob::new(digest.to_vec()))
        .message_type(MessageType::Digest)
        .signing_algorithm(SigningAlgorithmSpec::RsassaPssSha256)
        .signature(Blob::new(sig_bytes))
        .send()
        .await
        .map_err(|e| {
            let err = e.into_service_error();
            if err.is_kms_invalid_signature_exception() {
                PolicyError::SignatureMismatch {
                    path: path.to_string(),
                }
            } else {
                PolicyError::Kms {
                    path: path.to_string(),
                    message: err.to_string(),
                }
            }
        })?;

    if !resp.signature_valid() {
        return Err(PolicyError::SignatureMismatch {
            path: path.to_string(),
        });
    }

    tracing::debug!(
        path = path,
        key_id = %envelope.metadata.key_id,
        "policy signature verified"
    );
    Ok(())
}
