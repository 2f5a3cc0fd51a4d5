//! Token issuance and Ed25519 signature verification.

use crate::error::{CredentialError, CredentialResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tollgate_types::{ClientId, Clock, ModuleId, Session, SessionId, SystemClock, Topic};

/// The signed claims (matches the token JSON structure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Signing key id.
    pub kid: String,
    /// Session id.
    pub sid: SessionId,
    /// Client id.
    pub sub: ClientId,
    /// Client fingerprint.
    pub fpr: String,
    /// Hub topic the session may subscribe to.
    pub topic: Topic,
    /// Permission snapshot.
    pub perms: BTreeSet<ModuleId>,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

/// What a successfully verified token asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub session_id: SessionId,
    pub client_id: ClientId,
    pub fingerprint: String,
    pub topic: Topic,
    pub permissions: BTreeSet<ModuleId>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Derives the key id of a public key: base64url of the first 8 bytes of
/// its SHA-256.
#[must_use]
pub fn key_id(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..8])
}

/// Issues and verifies session tokens.
///
/// A codec built with [`CredentialCodec::verify_only`] holds no signing key
/// and is what clients embed.
#[derive(Clone)]
pub struct CredentialCodec {
    signer: Option<(String, SigningKey)>,
    verifiers: HashMap<String, VerifyingKey>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("signing_kid", &self.signer.as_ref().map(|(kid, _)| kid))
            .field("verifiers", &self.verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialCodec {
    /// Creates a codec that signs with `signing_key` and verifies its own tokens.
    #[must_use]
    pub fn new(signing_key: SigningKey) -> Self {
        Self::with_clock(signing_key, Arc::new(SystemClock))
    }

    /// Creates a signing codec reading time from `clock`.
    #[must_use]
    pub fn with_clock(signing_key: SigningKey, clock: Arc<dyn Clock>) -> Self {
        let verifying = signing_key.verifying_key();
        let kid = key_id(&verifying);
        let mut verifiers = HashMap::new();
        verifiers.insert(kid.clone(), verifying);
        Self {
            signer: Some((kid, signing_key)),
            verifiers,
            clock,
        }
    }

    /// Creates a codec that can only verify tokens.
    pub fn verify_only(
        keys: impl IntoIterator<Item = VerifyingKey>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let verifiers = keys.into_iter().map(|k| (key_id(&k), k)).collect();
        Self {
            signer: None,
            verifiers,
            clock,
        }
    }

    /// Creates a verify-only codec from raw 32-byte public keys.
    pub fn verify_only_from_bytes(
        keys: &[[u8; 32]],
        clock: Arc<dyn Clock>,
    ) -> CredentialResult<Self> {
        let keys = keys
            .iter()
            .map(|bytes| {
                VerifyingKey::from_bytes(bytes)
                    .map_err(|_| CredentialError::Invalid("invalid public key".to_string()))
            })
            .collect::<CredentialResult<Vec<_>>>()?;
        Ok(Self::verify_only(keys, clock))
    }

    /// Accepts tokens signed by `key` as well (e.g. the previous key during
    /// a rotation).
    #[must_use]
    pub fn accepting(mut self, key: VerifyingKey) -> Self {
        self.verifiers.insert(key_id(&key), key);
        self
    }

    /// Returns the id of the signing key, if any.
    #[must_use]
    pub fn signing_key_id(&self) -> Option<&str> {
        self.signer.as_ref().map(|(kid, _)| kid.as_str())
    }

    /// Returns every public key this codec accepts.
    #[must_use]
    pub fn verifying_keys(&self) -> Vec<VerifyingKey> {
        self.verifiers.values().copied().collect()
    }

    /// Returns a verify-only copy of this codec.
    #[must_use]
    pub fn to_verifier(&self) -> Self {
        Self {
            signer: None,
            verifiers: self.verifiers.clone(),
            clock: self.clock.clone(),
        }
    }

    /// Mints a token for `session`.
    ///
    /// # Errors
    ///
    /// Returns `NoSigningKey` for a verify-only codec.
    pub fn issue(&self, session: &Session) -> CredentialResult<String> {
        let (kid, signing_key) = self.signer.as_ref().ok_or(CredentialError::NoSigningKey)?;
        let claims = Claims {
            kid: kid.clone(),
            sid: session.session_id,
            sub: session.client_id.clone(),
            fpr: session.fingerprint.clone(),
            topic: session.topic.clone(),
            perms: session.permissions.clone(),
            iat: session.created_at.timestamp(),
            exp: session.expires_at.timestamp(),
        };
        let payload_json = serde_json::to_vec(&claims)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature = signing_key.sign(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        Ok(format!("{payload_b64}.{sig_b64}"))
    }

    /// Verifies `token` against the current time.
    pub fn verify(&self, token: &str) -> CredentialResult<VerifiedCredential> {
        self.verify_at(token, self.clock.now())
    }

    /// Verifies `token` as of `now`.
    ///
    /// Every structural, key or signature failure is `Invalid`. `Expired` is
    /// returned only after the signature has verified.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> CredentialResult<VerifiedCredential> {
        let token = token.trim();

        let (payload_b64, signature_b64) = match token.split('.').collect::<Vec<_>>()[..] {
            [payload, signature] => (payload, signature),
            _ => {
                return Err(CredentialError::Invalid(
                    "token must have exactly two parts separated by a dot".to_string(),
                ));
            }
        };

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| CredentialError::Invalid(format!("invalid signature base64: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|_| CredentialError::Invalid("invalid signature length".to_string()))?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| CredentialError::Invalid(format!("invalid payload base64: {e}")))?;
        let claims: Claims = serde_json::from_slice(&payload_json)
            .map_err(|e| CredentialError::Invalid(format!("invalid claims JSON: {e}")))?;

        let verifying_key = self
            .verifiers
            .get(&claims.kid)
            .ok_or_else(|| CredentialError::Invalid(format!("unknown key id {}", claims.kid)))?;

        verifying_key
            .verify(payload_b64.as_bytes(), &signature)
            .map_err(|_| CredentialError::Invalid("signature mismatch".to_string()))?;

        let issued_at = timestamp(claims.iat)?;
        let expires_at = timestamp(claims.exp)?;
        if now >= expires_at {
            return Err(CredentialError::Expired { expired_at: expires_at });
        }

        Ok(VerifiedCredential {
            session_id: claims.sid,
            client_id: claims.sub,
            fingerprint: claims.fpr,
            topic: claims.topic,
            permissions: claims.perms,
            issued_at,
            expires_at,
        })
    }
}

fn timestamp(secs: i64) -> CredentialResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CredentialError::Invalid(format!("timestamp out of range: {secs}")))
}
