//! Signed session credentials for Tollgate.
//!
//! Tokens are self-contained: anyone holding the issuer's public key can
//! check signature and expiry without a store lookup. Each token carries the
//! session id so a caller may additionally consult a revocation set.
//!
//! # Token Format
//!
//! Tokens are formatted as: `base64url(claims).base64url(signature)`
//! The claims are a JSON object signed with Ed25519; the signature covers
//! the base64url-encoded claims string. Claims name the signing key (`kid`)
//! so verifiers can hold several public keys across a rotation.

mod codec;
mod error;

pub use codec::{key_id, Claims, CredentialCodec, VerifiedCredential};
pub use error::{CredentialError, CredentialResult};
