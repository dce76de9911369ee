//! Events emitted during invite issuance and handshakes
//!
//! Broadcast to the surrounding UI layer, which owns user notification and
//! any retry decisions. The core never retries on its own.

use crate::types::{FriendRecord, UserProfile};

/// Event emitted by the handshake components for UI notifications
#[derive(Debug, Clone)]
pub enum HandshakeEvent {
    /// The host issued a new invite credential
    InviteIssued {
        credential_id: [u8; 16],
        expires_at: i64,
    },
    /// The host received a valid identity request for one of its invites
    RequestReceived {
        credential_id: [u8; 16],
        from: UserProfile,
    },
    /// A handshake completed and the friend record was persisted
    FriendAdded { record: FriendRecord },
    /// The expiry timer fired before the handshake completed
    HandshakeExpired { credential_id: [u8; 16] },
    /// A handshake attempt ended in a terminal failure
    HandshakeFailed {
        credential_id: Option<[u8; 16]>,
        reason: String,
    },
}
