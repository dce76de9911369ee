//! Local identity: signing keypair and the user id derived from it
//!
//! Every participant is identified by the base58 encoding of their Ed25519
//! verifying key, rendered as `babel:{base58}`. Binding the id to the key
//! means any signed payload can be checked against the id it claims to come
//! from without a key registry.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Prefix for rendered user ids
const USER_ID_PREFIX: &str = "babel:";

/// Ed25519 signing keypair for the local user.
///
/// Signs invite credentials and friend tokens. Invites are ephemeral
/// (expire within hours), so a single classical scheme is sufficient here.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("Failed to get random bytes");
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Restore a keypair from its 32-byte seed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChatError> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChatError::Identity("Keypair seed must be 32 bytes".to_string()))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Serialize the keypair seed for persistence
    pub fn to_bytes(&self) -> Vec<u8> {
        self.signing.to_bytes().to_vec()
    }

    /// Get the verifying key for this keypair
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// The user id derived from this keypair's verifying key
    pub fn user_id(&self) -> UserId {
        UserId::from_verifying_key(&self.verifying_key())
    }

    /// Sign a message, returning the 64-byte Ed25519 signature
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("user_id", &self.user_id())
            .finish()
    }
}

/// User identifier bound to an Ed25519 verifying key.
///
/// Rendered as `babel:{base58(verifying_key)}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Derive a user id from a verifying key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let encoded = bs58::encode(key.as_bytes()).into_string();
        Self(format!("{}{}", USER_ID_PREFIX, encoded))
    }

    /// Parse a rendered user id, validating prefix and key encoding
    pub fn parse(s: &str) -> Result<Self, ChatError> {
        let encoded = s.strip_prefix(USER_ID_PREFIX).ok_or_else(|| {
            ChatError::Identity(format!("Invalid user id prefix: {}", s))
        })?;

        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| ChatError::Identity(format!("Invalid user id encoding: {}", e)))?;

        if bytes.len() != 32 {
            return Err(ChatError::Identity(format!(
                "Invalid user id key length: {}",
                bytes.len()
            )));
        }

        Ok(Self(s.to_string()))
    }

    /// The rendered string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Verify a detached signature against a raw 32-byte verifying key.
///
/// Returns `false` for malformed keys or signatures rather than erroring;
/// callers treat any failure the same way.
pub fn verify_detached(key_bytes: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(key_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

/// Check that a rendered user id is the one derived from a raw verifying key
pub fn user_id_matches_key(user_id: &UserId, key_bytes: &[u8; 32]) -> bool {
    match VerifyingKey::from_bytes(key_bytes) {
        Ok(key) => UserId::from_verifying_key(&key) == *user_id,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_key_roundtrip() {
        let keypair = Keypair::generate();
        let user_id = keypair.user_id();

        assert!(user_id.as_str().starts_with(USER_ID_PREFIX));

        let parsed = UserId::parse(user_id.as_str()).unwrap();
        assert_eq!(parsed, user_id);
    }

    #[test]
    fn test_user_id_invalid_prefix() {
        let result = UserId::parse("wrong:abc123");
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }

    #[test]
    fn test_user_id_invalid_encoding() {
        let result = UserId::parse("babel:not-valid-base58!!!");
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }

    #[test]
    fn test_user_id_wrong_key_length() {
        let short = bs58::encode(&[1u8; 16]).into_string();
        let result = UserId::parse(&format!("babel:{}", short));
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        let key_bytes = keypair.verifying_key().to_bytes();
        assert!(verify_detached(&key_bytes, message, &signature.to_bytes()));
        assert!(!verify_detached(&key_bytes, b"tampered", &signature.to_bytes()));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        let wrong_key = other.verifying_key().to_bytes();
        assert!(!verify_detached(&wrong_key, message, &signature.to_bytes()));
    }

    #[test]
    fn test_verify_rejects_malformed_signature() {
        let keypair = Keypair::generate();
        let key_bytes = keypair.verifying_key().to_bytes();
        assert!(!verify_detached(&key_bytes, b"msg", &[0u8; 10]));
    }

    #[test]
    fn test_user_id_matches_key() {
        let keypair = Keypair::generate();
        let user_id = keypair.user_id();
        let key_bytes = keypair.verifying_key().to_bytes();

        assert!(user_id_matches_key(&user_id, &key_bytes));

        let other = Keypair::generate();
        assert!(!user_id_matches_key(
            &user_id,
            &other.verifying_key().to_bytes()
        ));
    }

    #[test]
    fn test_keypair_persistence_roundtrip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_bytes(&keypair.to_bytes()).unwrap();
        assert_eq!(keypair.user_id(), restored.user_id());
    }

    #[test]
    fn test_keypair_from_short_bytes() {
        let result = Keypair::from_bytes(&[0u8; 16]);
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }
}
