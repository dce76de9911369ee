//! Guest side of the invite handshake
//!
//! A one-shot state machine per invite:
//!
//! ```text
//! AwaitingCredential → Connecting → AwaitingReply → Completed
//!                                                 | Expired
//!                                                 | Rejected
//! ```
//!
//! The credential's expiry timer runs alongside every suspension point and
//! preempts an in-flight connect or reply wait. Inbound frames that are not
//! the awaited reply (wrong kind, wrong credential id, undecodable) are
//! ignored rather than treated as fatal. All failures are terminal for the
//! attempt; the UI layer owns any retry with a fresh invite.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::expiry::ExpiryTimer;
use crate::handshake::events::HandshakeEvent;
use crate::handshake::protocol::ExchangeMessage;
use crate::invite::{FriendToken, InviteCredential};
use crate::session::SessionContext;
use crate::storage::Storage;
use crate::transport::{PeerChannel, PeerTransport};
use crate::types::FriendRecord;

/// Phase of one guest handshake attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// No credential consumed yet
    AwaitingCredential,
    /// Channel to the host is being established
    Connecting,
    /// Request sent, waiting for the correlated reply
    AwaitingReply,
    /// Friend record persisted on this side
    Completed,
    /// Expiry timer fired before completion
    Expired,
    /// Terminal failure (bad credential, unauthorized, transport, storage)
    Rejected,
}

impl std::fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingCredential => "Awaiting Credential",
            Self::Connecting => "Connecting",
            Self::AwaitingReply => "Awaiting Reply",
            Self::Completed => "Completed",
            Self::Expired => "Expired",
            Self::Rejected => "Rejected",
        };
        write!(f, "{}", s)
    }
}

/// Drives one invite credential through the exchange to a friend record.
///
/// Owns the lifecycle of exactly one handshake attempt: one credential, one
/// correlation id, one channel.
pub struct GuestHandshake {
    transport: Arc<PeerTransport>,
    session: SessionContext,
    storage: Storage,
    event_tx: broadcast::Sender<HandshakeEvent>,
    phase: HandshakePhase,
}

impl GuestHandshake {
    /// Create a handshake attempt ready to consume a credential
    pub fn new(
        transport: Arc<PeerTransport>,
        session: SessionContext,
        storage: Storage,
        event_tx: broadcast::Sender<HandshakeEvent>,
    ) -> Self {
        Self {
            transport,
            session,
            storage,
            event_tx,
            phase: HandshakePhase::AwaitingCredential,
        }
    }

    /// Current phase of the attempt
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Run the handshake for a raw encoded credential.
    ///
    /// Terminal in all outcomes; a second call on the same instance is an
    /// error. On success the friend record has already been persisted.
    pub async fn run(&mut self, raw_invite: &str) -> ChatResult<FriendRecord> {
        if self.phase != HandshakePhase::AwaitingCredential {
            return Err(ChatError::InvalidOperation(format!(
                "Handshake already ran (phase: {})",
                self.phase
            )));
        }

        let credential = match InviteCredential::decode(raw_invite) {
            Ok(credential) => credential,
            Err(e) => {
                self.phase = HandshakePhase::Rejected;
                let _ = self.event_tx.send(HandshakeEvent::HandshakeFailed {
                    credential_id: None,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let credential_id = credential.credential_id;
        let result = self.exchange(&credential).await;

        match &result {
            Ok(record) => {
                self.phase = HandshakePhase::Completed;
                info!(
                    credential_id = ?credential_id,
                    friend = %record.user_id,
                    "Handshake completed"
                );
                let _ = self.event_tx.send(HandshakeEvent::FriendAdded {
                    record: record.clone(),
                });
            }
            Err(ChatError::HandshakeExpired(_)) => {
                self.phase = HandshakePhase::Expired;
                let _ = self
                    .event_tx
                    .send(HandshakeEvent::HandshakeExpired { credential_id });
            }
            Err(e) => {
                self.phase = HandshakePhase::Rejected;
                let _ = self.event_tx.send(HandshakeEvent::HandshakeFailed {
                    credential_id: Some(credential_id),
                    reason: e.to_string(),
                });
            }
        }

        result
    }

    async fn exchange(&mut self, credential: &InviteCredential) -> ChatResult<FriendRecord> {
        let now = chrono::Utc::now().timestamp();
        if credential.is_expired(now) {
            return Err(ChatError::ExpiredCredential(format!(
                "Credential expired at {}",
                credential.expires_at
            )));
        }

        // No self-connect: a host scanning its own invite goes nowhere
        if credential.host_id == self.session.user_id() {
            return Err(ChatError::Unauthorized(
                "Cannot accept an invite issued by this user".to_string(),
            ));
        }

        // The expiry timer is the sole cancellation trigger for the attempt;
        // it preempts the connect and every wait below.
        let expired = CancellationToken::new();
        let trigger = expired.clone();
        let timer = ExpiryTimer::start(credential.expires_at, move || trigger.cancel());

        let result = self.exchange_inner(credential, &expired).await;

        // Safe after firing; releases the timer task for other outcomes
        timer.cancel();
        result
    }

    async fn exchange_inner(
        &mut self,
        credential: &InviteCredential,
        expired: &CancellationToken,
    ) -> ChatResult<FriendRecord> {
        self.phase = HandshakePhase::Connecting;

        let mut channel = tokio::select! {
            biased;
            _ = expired.cancelled() => {
                return Err(ChatError::HandshakeExpired(
                    "Credential expired while connecting".to_string(),
                ));
            }
            result = self.transport.connect(&credential.host_addr) => result?,
        };

        let sender_token = self.session.mint_friend_token().encode()?;
        let request = ExchangeMessage::IdentityRequest {
            credential_id: credential.credential_id,
            sender_id: self.session.user_id(),
            sender_token,
            profile: self.session.profile().clone(),
        };
        let frame = request
            .encode()
            .map_err(|e| ChatError::Serialization(format!("Failed to encode request: {}", e)))?;

        tokio::select! {
            biased;
            _ = expired.cancelled() => {
                channel.close().await;
                return Err(ChatError::HandshakeExpired(
                    "Credential expired while sending request".to_string(),
                ));
            }
            result = channel.send(Bytes::from(frame)) => {
                if let Err(e) = result {
                    channel.close().await;
                    return Err(e);
                }
            }
        }

        self.phase = HandshakePhase::AwaitingReply;
        debug!(credential_id = ?credential.credential_id, "Request sent, awaiting reply");

        let result = self.await_reply(credential, expired, &mut channel).await;
        channel.close().await;
        result
    }

    async fn await_reply(
        &mut self,
        credential: &InviteCredential,
        expired: &CancellationToken,
        channel: &mut PeerChannel,
    ) -> ChatResult<FriendRecord> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = expired.cancelled() => {
                    return Err(ChatError::HandshakeExpired(
                        "Credential expired while awaiting reply".to_string(),
                    ));
                }
                frame = channel.recv() => frame?,
            };

            let Some(frame) = frame else {
                return Err(ChatError::Send(
                    "Channel closed before the reply arrived".to_string(),
                ));
            };

            let Ok(message) = ExchangeMessage::decode(&frame) else {
                debug!("Ignoring undecodable frame");
                continue;
            };

            match message {
                ExchangeMessage::IdentityReply {
                    credential_id,
                    sender_id,
                    sender_token,
                    profile,
                } if credential_id == credential.credential_id => {
                    if sender_id == self.session.user_id() {
                        return Err(ChatError::Unauthorized(
                            "Reply claims the local user id".to_string(),
                        ));
                    }

                    let token = FriendToken::decode(&sender_token)
                        .map_err(|e| ChatError::Unauthorized(format!("Bad reply token: {}", e)))?;

                    // The reply must come from the identity the invite named
                    if token.user_id != sender_id
                        || sender_id != credential.host_id
                        || token.user_key != credential.host_key
                    {
                        return Err(ChatError::Unauthorized(
                            "Reply identity does not match the invite host".to_string(),
                        ));
                    }

                    let record = FriendRecord {
                        user_id: sender_id,
                        friend_token: sender_token,
                        profile,
                        added_at: chrono::Utc::now().timestamp(),
                    };

                    // Not completed until the record is durably stored
                    self.storage.put_friend(&record)?;
                    return Ok(record);
                }
                other => {
                    debug!(
                        credential_id = ?other.credential_id(),
                        "Ignoring message that does not match the awaited reply"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Language, UserProfile};
    use tempfile::tempdir;

    async fn test_setup() -> (GuestHandshake, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        let session = SessionContext::new(
            crate::identity::Keypair::generate(),
            UserProfile::new("Guest", Language::English),
        );
        let transport = Arc::new(PeerTransport::bind(None, None).await.unwrap());
        let (event_tx, _) = broadcast::channel(16);

        (
            GuestHandshake::new(transport, session, storage, event_tx),
            temp_dir,
        )
    }

    #[tokio::test]
    async fn test_malformed_credential_rejected_without_connecting() {
        let (mut handshake, _temp) = test_setup().await;
        let registry = handshake.transport.registry();

        let result = handshake.run("babel-invite:garbage!!!").await;

        assert!(matches!(result, Err(ChatError::InvalidCredential(_))));
        assert_eq!(handshake.phase(), HandshakePhase::Rejected);
        // No channel was ever opened
        assert_eq!(registry.open_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_credential_rejected_without_connecting() {
        let (mut handshake, _temp) = test_setup().await;
        let registry = handshake.transport.registry();

        let host = SessionContext::new(
            crate::identity::Keypair::generate(),
            UserProfile::new("Host", Language::Korean),
        );
        let credential = host.issue_invite(
            Language::English,
            crate::transport::PeerAddr::new([1u8; 32]),
            -10,
        );

        let result = handshake.run(&credential.encode().unwrap()).await;

        assert!(matches!(result, Err(ChatError::ExpiredCredential(_))));
        assert_eq!(handshake.phase(), HandshakePhase::Rejected);
        assert_eq!(registry.open_count(), 0);
    }

    #[tokio::test]
    async fn test_own_invite_is_unauthorized() {
        let (mut handshake, _temp) = test_setup().await;

        // Credential issued by the same identity that tries to join
        let credential = handshake.session.issue_invite(
            Language::English,
            crate::transport::PeerAddr::new([1u8; 32]),
            300,
        );

        let result = handshake.run(&credential.encode().unwrap()).await;

        assert!(matches!(result, Err(ChatError::Unauthorized(_))));
        assert_eq!(handshake.phase(), HandshakePhase::Rejected);
        assert!(handshake.storage.list_friends().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_runs_once() {
        let (mut handshake, _temp) = test_setup().await;

        let _ = handshake.run("babel-invite:garbage!!!").await;
        let second = handshake.run("babel-invite:garbage!!!").await;

        assert!(matches!(second, Err(ChatError::InvalidOperation(_))));
    }
}
