//! Invite credentials and friend tokens
//!
//! An invite credential is a signed, time-limited claim set the host shares
//! out-of-band (link or QR). It carries everything a guest needs to reach
//! the host and open a translated chat: host identity and address, the
//! language pinned for each side, and an expiry. Credentials are encoded as
//! `babel-invite:{base58}` strings for easy sharing.
//!
//! A friend token is the smaller signed claim each side presents in-band
//! during the identity exchange and keeps afterwards as a reusable proof of
//! who the friend is. Encoded as `babel-friend:{base58}`.
//!
//! Payload fields are not confidential (they travel in a public link);
//! only integrity matters, so both formats are signed but not encrypted.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};
use crate::identity::{self, Keypair, UserId};
use crate::transport::PeerAddr;
use crate::types::{Language, UserProfile};

/// Prefix for encoded invite credentials
const INVITE_PREFIX: &str = "babel-invite:";

/// Prefix for encoded friend tokens
const TOKEN_PREFIX: &str = "babel-friend:";

/// Current credential format version
const CREDENTIAL_VERSION: u8 = 1;

/// A signed, time-limited invite to chat.
///
/// Created by the host, consumed once by a guest. Never mutated after
/// issuance; validity is `now < expires_at` plus an intact signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCredential {
    /// Format version
    pub version: u8,
    /// Unique id, used to correlate the exchange reply to this invite
    pub credential_id: [u8; 16],
    /// Host user id (bound to `host_key`)
    pub host_id: UserId,
    /// Host's Ed25519 verifying key
    pub host_key: [u8; 32],
    /// Host display name, shown on the guest's invite screen
    pub host_nickname: String,
    /// Language the host chats in
    pub host_language: Language,
    /// Language offered to the guest
    pub guest_language: Language,
    /// Network address the guest dials
    pub host_addr: PeerAddr,
    /// Unix timestamp of issuance
    pub issued_at: i64,
    /// Unix timestamp after which the credential is dead
    pub expires_at: i64,
    /// Ed25519 signature over all preceding fields
    pub signature: Vec<u8>,
}

impl InviteCredential {
    /// Generate a random credential id
    pub fn generate_credential_id() -> [u8; 16] {
        let mut id = [0u8; 16];
        rand::rng().fill_bytes(&mut id);
        id
    }

    /// Issue a new signed credential for the given host identity.
    ///
    /// `ttl_secs` is how long the invite stays valid from now.
    pub fn issue(
        keypair: &Keypair,
        profile: &UserProfile,
        guest_language: Language,
        host_addr: PeerAddr,
        ttl_secs: i64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();

        let mut credential = Self {
            version: CREDENTIAL_VERSION,
            credential_id: Self::generate_credential_id(),
            host_id: keypair.user_id(),
            host_key: keypair.verifying_key().to_bytes(),
            host_nickname: profile.nickname.clone(),
            host_language: profile.language,
            guest_language,
            host_addr,
            issued_at: now,
            expires_at: now + ttl_secs,
            signature: vec![],
        };

        credential.signature = keypair.sign(&credential.signable_bytes()).to_bytes().to_vec();
        credential
    }

    /// Encode as a `babel-invite:{base58}` string
    pub fn encode(&self) -> ChatResult<String> {
        let bytes = postcard::to_stdvec(self)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode credential: {}", e)))?;
        Ok(format!("{}{}", INVITE_PREFIX, bs58::encode(&bytes).into_string()))
    }

    /// Decode and verify a `babel-invite:{base58}` string.
    ///
    /// Checks prefix, encoding, structure, the host-id/key binding, and the
    /// signature. Expiry is NOT checked here; callers compare against their
    /// own clock with [`InviteCredential::is_expired`].
    pub fn decode(s: &str) -> ChatResult<Self> {
        let data = s.strip_prefix(INVITE_PREFIX).ok_or_else(|| {
            ChatError::InvalidCredential(format!(
                "Invalid prefix: expected '{}', got '{}'",
                INVITE_PREFIX,
                s.chars().take(16).collect::<String>()
            ))
        })?;

        let bytes = bs58::decode(data)
            .into_vec()
            .map_err(|e| ChatError::InvalidCredential(format!("Invalid base58: {}", e)))?;

        let credential: InviteCredential = postcard::from_bytes(&bytes)
            .map_err(|e| ChatError::InvalidCredential(format!("Invalid credential data: {}", e)))?;

        if credential.version != CREDENTIAL_VERSION {
            return Err(ChatError::InvalidCredential(format!(
                "Unsupported credential version: {}",
                credential.version
            )));
        }

        if !identity::user_id_matches_key(&credential.host_id, &credential.host_key) {
            return Err(ChatError::InvalidCredential(
                "Host id does not match host key".to_string(),
            ));
        }

        if !identity::verify_detached(
            &credential.host_key,
            &credential.signable_bytes(),
            &credential.signature,
        ) {
            return Err(ChatError::InvalidCredential(
                "Signature verification failed".to_string(),
            ));
        }

        Ok(credential)
    }

    /// Whether the credential is expired at `now`.
    ///
    /// The boundary instant `now == expires_at` counts as expired.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Seconds of validity remaining at `now`, if any
    pub fn remaining_secs(&self, now: i64) -> Option<i64> {
        let remaining = self.expires_at - now;
        (remaining > 0).then_some(remaining)
    }

    fn signable_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(self.version);
        data.extend_from_slice(&self.credential_id);
        data.extend_from_slice(self.host_id.as_str().as_bytes());
        data.extend_from_slice(&self.host_key);
        data.extend_from_slice(self.host_nickname.as_bytes());
        data.push(self.host_language as u8);
        data.push(self.guest_language as u8);

        // PeerAddr is structured; serialize it rather than concatenating
        let addr_bytes = postcard::to_stdvec(&self.host_addr).unwrap_or_default();
        data.extend_from_slice(&addr_bytes);

        data.extend_from_slice(&self.issued_at.to_le_bytes());
        data.extend_from_slice(&self.expires_at.to_le_bytes());
        data
    }
}

/// A signed identity claim presented during the exchange and stored with
/// the friend record for future authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendToken {
    /// Format version
    pub version: u8,
    /// Subject user id (bound to `user_key`)
    pub user_id: UserId,
    /// Subject's Ed25519 verifying key
    pub user_key: [u8; 32],
    /// Display name at minting time
    pub nickname: String,
    /// Language the subject chats in
    pub language: Language,
    /// True when minted by a guest account (no social login)
    pub is_guest: bool,
    /// Unix timestamp of minting
    pub issued_at: i64,
    /// Ed25519 signature over all preceding fields
    pub signature: Vec<u8>,
}

impl FriendToken {
    /// Mint a token for the local identity
    pub fn mint(keypair: &Keypair, profile: &UserProfile, is_guest: bool) -> Self {
        let mut token = Self {
            version: CREDENTIAL_VERSION,
            user_id: keypair.user_id(),
            user_key: keypair.verifying_key().to_bytes(),
            nickname: profile.nickname.clone(),
            language: profile.language,
            is_guest,
            issued_at: chrono::Utc::now().timestamp(),
            signature: vec![],
        };

        token.signature = keypair.sign(&token.signable_bytes()).to_bytes().to_vec();
        token
    }

    /// Encode as a `babel-friend:{base58}` string
    pub fn encode(&self) -> ChatResult<String> {
        let bytes = postcard::to_stdvec(self)
            .map_err(|e| ChatError::Serialization(format!("Failed to encode token: {}", e)))?;
        Ok(format!("{}{}", TOKEN_PREFIX, bs58::encode(&bytes).into_string()))
    }

    /// Decode and verify a `babel-friend:{base58}` string.
    ///
    /// A token is valid when its user id is derived from the embedded key
    /// and the signature verifies against that key: proof of possession,
    /// not third-party endorsement.
    pub fn decode(s: &str) -> ChatResult<Self> {
        let data = s.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
            ChatError::Identity(format!("Invalid token prefix: {}", s.chars().take(16).collect::<String>()))
        })?;

        let bytes = bs58::decode(data)
            .into_vec()
            .map_err(|e| ChatError::Identity(format!("Invalid token base58: {}", e)))?;

        let token: FriendToken = postcard::from_bytes(&bytes)
            .map_err(|e| ChatError::Identity(format!("Invalid token data: {}", e)))?;

        if !identity::user_id_matches_key(&token.user_id, &token.user_key) {
            return Err(ChatError::Identity(
                "Token user id does not match key".to_string(),
            ));
        }

        if !identity::verify_detached(&token.user_key, &token.signable_bytes(), &token.signature) {
            return Err(ChatError::Identity(
                "Token signature verification failed".to_string(),
            ));
        }

        Ok(token)
    }

    fn signable_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(self.version);
        data.extend_from_slice(self.user_id.as_str().as_bytes());
        data.extend_from_slice(&self.user_key);
        data.extend_from_slice(self.nickname.as_bytes());
        data.push(self.language as u8);
        data.push(self.is_guest as u8);
        data.extend_from_slice(&self.issued_at.to_le_bytes());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keypair() -> Keypair {
        Keypair::generate()
    }

    fn test_profile() -> UserProfile {
        UserProfile::new("Haeun", Language::Korean)
    }

    fn test_addr() -> PeerAddr {
        PeerAddr::new([7u8; 32])
            .with_relay("https://relay.example.com")
            .with_address("192.168.1.1:4433")
    }

    #[test]
    fn test_credential_encode_decode_roundtrip() {
        let keypair = test_keypair();
        let credential = InviteCredential::issue(
            &keypair,
            &test_profile(),
            Language::English,
            test_addr(),
            300,
        );

        let encoded = credential.encode().expect("Failed to encode");
        assert!(encoded.starts_with(INVITE_PREFIX));

        let decoded = InviteCredential::decode(&encoded).expect("Failed to decode");
        assert_eq!(decoded, credential);
    }

    #[test]
    fn test_credential_expiry_boundary() {
        let keypair = test_keypair();
        let credential = InviteCredential::issue(
            &keypair,
            &test_profile(),
            Language::English,
            test_addr(),
            300,
        );

        let exp = credential.expires_at;
        assert!(!credential.is_expired(exp - 1));
        // The boundary instant itself counts as expired
        assert!(credential.is_expired(exp));
        assert!(credential.is_expired(exp + 1));
    }

    #[test]
    fn test_credential_remaining_secs() {
        let keypair = test_keypair();
        let credential = InviteCredential::issue(
            &keypair,
            &test_profile(),
            Language::Japanese,
            test_addr(),
            300,
        );

        let issued = credential.issued_at;
        assert_eq!(credential.remaining_secs(issued), Some(300));
        assert_eq!(credential.remaining_secs(issued + 300), None);
        assert_eq!(credential.remaining_secs(issued + 400), None);
    }

    #[test]
    fn test_decode_succeeds_for_expired_credential() {
        // Decode validates integrity only; expiry is the caller's check.
        let keypair = test_keypair();
        let credential = InviteCredential::issue(
            &keypair,
            &test_profile(),
            Language::English,
            test_addr(),
            -100,
        );

        let encoded = credential.encode().unwrap();
        let decoded = InviteCredential::decode(&encoded).expect("Decode should not check expiry");
        assert!(decoded.is_expired(chrono::Utc::now().timestamp()));
    }

    #[test]
    fn test_credential_tampered_field_rejected() {
        let keypair = test_keypair();
        let mut credential = InviteCredential::issue(
            &keypair,
            &test_profile(),
            Language::English,
            test_addr(),
            300,
        );

        // Stretch the expiry without re-signing
        credential.expires_at += 3600;
        let encoded = credential.encode().unwrap();

        let result = InviteCredential::decode(&encoded);
        assert!(matches!(result, Err(ChatError::InvalidCredential(_))));
    }

    #[test]
    fn test_credential_host_id_key_mismatch_rejected() {
        let keypair = test_keypair();
        let other = test_keypair();
        let mut credential = InviteCredential::issue(
            &keypair,
            &test_profile(),
            Language::English,
            test_addr(),
            300,
        );

        // Claim a different host id than the embedded key derives to
        credential.host_id = other.user_id();
        let encoded = credential.encode().unwrap();

        let result = InviteCredential::decode(&encoded);
        assert!(matches!(result, Err(ChatError::InvalidCredential(_))));
    }

    #[test]
    fn test_credential_invalid_format() {
        for raw in ["", "babel-invite:not-valid-base58!!!", "babel-invite:3mJr7AoU"] {
            let result = InviteCredential::decode(raw);
            assert!(
                matches!(result, Err(ChatError::InvalidCredential(_))),
                "expected InvalidCredential for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_credential_wrong_prefix() {
        let result = InviteCredential::decode("wrong-prefix:abc123");
        let err = result.unwrap_err();
        assert!(matches!(err, ChatError::InvalidCredential(_)));
        assert!(format!("{}", err).contains("Invalid prefix"));
    }

    #[test]
    fn test_credential_id_is_random() {
        let keypair = test_keypair();
        let a = InviteCredential::issue(&keypair, &test_profile(), Language::English, test_addr(), 300);
        let b = InviteCredential::issue(&keypair, &test_profile(), Language::English, test_addr(), 300);
        assert_ne!(a.credential_id, b.credential_id);
    }

    #[test]
    fn test_friend_token_roundtrip() {
        let keypair = test_keypair();
        let token = FriendToken::mint(&keypair, &test_profile(), false);

        let encoded = token.encode().unwrap();
        assert!(encoded.starts_with(TOKEN_PREFIX));

        let decoded = FriendToken::decode(&encoded).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(decoded.user_id, keypair.user_id());
    }

    #[test]
    fn test_friend_token_tampered_nickname_rejected() {
        let keypair = test_keypair();
        let mut token = FriendToken::mint(&keypair, &test_profile(), true);

        token.nickname = "Impostor".to_string();
        let encoded = token.encode().unwrap();

        let result = FriendToken::decode(&encoded);
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }

    #[test]
    fn test_friend_token_wrong_key_rejected() {
        let keypair = test_keypair();
        let other = test_keypair();
        let mut token = FriendToken::mint(&keypair, &test_profile(), false);

        // Swap in a different key; the id/key binding breaks
        token.user_key = other.verifying_key().to_bytes();
        let encoded = token.encode().unwrap();

        let result = FriendToken::decode(&encoded);
        assert!(matches!(result, Err(ChatError::Identity(_))));
    }
}
