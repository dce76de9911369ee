//! Wire messages for the identity exchange
//!
//! Exactly two message kinds cross the channel, correlated by the invite's
//! credential id. Matching is exhaustive; anything that fails to decode is
//! not an exchange message and gets ignored by both sides.

use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::types::UserProfile;

/// ALPN protocol identifier for the friend exchange
pub const FRIEND_ALPN: &[u8] = b"/babel/friend/1";

/// Identity exchange messages.
///
/// The guest opens with `IdentityRequest`; the host answers with
/// `IdentityReply`. `sender_token` is the encoded signed friend token each
/// side keeps for future authentication with the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeMessage {
    /// Guest to host: present the invite's credential id and the guest identity
    IdentityRequest {
        /// Credential id from the invite, used for reply correlation
        credential_id: [u8; 16],
        /// Guest user id
        sender_id: UserId,
        /// Encoded signed friend token proving the guest identity
        sender_token: String,
        /// Guest profile for the host's friend record
        profile: UserProfile,
    },

    /// Host to guest: accept the request and hand over the host identity
    IdentityReply {
        /// Credential id the reply correlates to
        credential_id: [u8; 16],
        /// Host user id
        sender_id: UserId,
        /// Encoded signed friend token proving the host identity
        sender_token: String,
        /// Host profile for the guest's friend record
        profile: UserProfile,
    },
}

impl ExchangeMessage {
    /// Encode message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// The credential id this message correlates to
    pub fn credential_id(&self) -> &[u8; 16] {
        match self {
            Self::IdentityRequest { credential_id, .. } => credential_id,
            Self::IdentityReply { credential_id, .. } => credential_id,
        }
    }
}
