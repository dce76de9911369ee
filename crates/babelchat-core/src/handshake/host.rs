//! Host side of the invite handshake
//!
//! Registered with the router for the session's stable peer id, so one
//! listener serves every outstanding invite this host has issued. Each
//! inbound connection gets its own task; a request is honored only when its
//! credential id is one this host issued, still unexpired, and the sender
//! is not the host itself. Every mismatch is ignored without touching the
//! connection, so unrelated concurrent invites never interfere.

use std::sync::Arc;

use bytes::Bytes;
use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::handshake::events::HandshakeEvent;
use crate::handshake::protocol::{ExchangeMessage, FRIEND_ALPN};
use crate::identity::UserId;
use crate::invite::FriendToken;
use crate::session::SessionContext;
use crate::storage::Storage;
use crate::transport::{ConnectionRegistry, PeerChannel};
use crate::types::FriendRecord;

/// Protocol handler for inbound friend exchanges.
///
/// Validates identity requests against the issued-invite table, answers
/// with the host identity, and persists the resulting friend record.
#[derive(Clone)]
pub struct FriendRequestHandler {
    session: SessionContext,
    storage: Storage,
    event_tx: broadcast::Sender<HandshakeEvent>,
    registry: Arc<ConnectionRegistry>,
}

impl std::fmt::Debug for FriendRequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FriendRequestHandler")
            .field("host", &self.session.user_id())
            .finish()
    }
}

impl FriendRequestHandler {
    /// Create a handler bound to the host session, storage, and registry
    pub fn new(
        session: SessionContext,
        storage: Storage,
        event_tx: broadcast::Sender<HandshakeEvent>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            session,
            storage,
            event_tx,
            registry,
        }
    }

    /// Get the ALPN identifier for this protocol
    pub const fn alpn() -> &'static [u8] {
        FRIEND_ALPN
    }

    /// Serve one inbound channel until the peer hangs up.
    ///
    /// Connection-terminated errors from the remote end the loop normally;
    /// only local failures (sending the reply, storage) propagate.
    async fn serve_channel(
        channel: &mut PeerChannel,
        session: &SessionContext,
        storage: &Storage,
        event_tx: &broadcast::Sender<HandshakeEvent>,
    ) -> ChatResult<()> {
        loop {
            let frame = match channel.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!(peer = %channel.remote_id(), error = %e, "Connection ended");
                    break;
                }
            };

            let Ok(message) = ExchangeMessage::decode(&frame) else {
                debug!("Ignoring undecodable frame");
                continue;
            };

            match message {
                ExchangeMessage::IdentityRequest {
                    credential_id,
                    sender_id,
                    sender_token,
                    profile,
                } => {
                    if !Self::request_is_valid(session, storage, &credential_id, &sender_id, &sender_token)? {
                        continue;
                    }

                    info!(
                        credential_id = ?credential_id,
                        guest = %sender_id,
                        "Valid identity request received"
                    );
                    let _ = event_tx.send(HandshakeEvent::RequestReceived {
                        credential_id,
                        from: profile.clone(),
                    });

                    let reply = ExchangeMessage::IdentityReply {
                        credential_id,
                        sender_id: session.user_id(),
                        sender_token: session.mint_friend_token().encode()?,
                        profile: session.profile().clone(),
                    };
                    let bytes = reply.encode().map_err(|e| {
                        ChatError::Serialization(format!("Failed to encode reply: {}", e))
                    })?;
                    channel.send(Bytes::from(bytes)).await?;

                    // Completed only once the record is durably stored
                    let record = FriendRecord {
                        user_id: sender_id,
                        friend_token: sender_token,
                        profile,
                        added_at: chrono::Utc::now().timestamp(),
                    };
                    storage.put_friend(&record)?;

                    info!(
                        credential_id = ?credential_id,
                        friend = %record.user_id,
                        "Friend record persisted"
                    );
                    let _ = event_tx.send(HandshakeEvent::FriendAdded { record });

                    // The exchange for this credential is done; keep reading
                    // until the guest hangs up so the reply drains first.
                }
                ExchangeMessage::IdentityReply { .. } => {
                    debug!("Ignoring identity reply on the listening side");
                }
            }
        }

        Ok(())
    }

    /// Whether an identity request should be honored.
    ///
    /// Unknown or expired credential ids, self-connects, and bad tokens are
    /// all ignored silently (logged for diagnostics only). Storage failures
    /// propagate.
    fn request_is_valid(
        session: &SessionContext,
        storage: &Storage,
        credential_id: &[u8; 16],
        sender_id: &UserId,
        sender_token: &str,
    ) -> ChatResult<bool> {
        let Some(issued) = storage.load_issued_invite(credential_id)? else {
            debug!(credential_id = ?credential_id, "Request for a credential this host never issued");
            return Ok(false);
        };

        let now = chrono::Utc::now().timestamp();
        if issued.is_expired(now) {
            debug!(credential_id = ?credential_id, "Request for an expired credential");
            return Ok(false);
        }

        if *sender_id == session.user_id() {
            warn!(credential_id = ?credential_id, "Self-connect attempt rejected");
            return Ok(false);
        }

        match FriendToken::decode(sender_token) {
            Ok(token) if token.user_id == *sender_id => Ok(true),
            Ok(token) => {
                debug!(
                    claimed = %sender_id,
                    subject = %token.user_id,
                    "Token subject does not match the request sender"
                );
                Ok(false)
            }
            Err(e) => {
                debug!(error = %e, "Request carried an unverifiable token");
                Ok(false)
            }
        }
    }
}

impl ProtocolHandler for FriendRequestHandler {
    fn accept(
        &self,
        conn: Connection,
    ) -> impl std::future::Future<Output = Result<(), AcceptError>> + Send {
        let session = self.session.clone();
        let storage = self.storage.clone();
        let event_tx = self.event_tx.clone();
        let registry = self.registry.clone();

        async move {
            debug!(peer = %conn.remote_id(), "Accepting friend exchange connection");

            let mut channel = PeerChannel::accept(conn, registry)
                .await
                .map_err(AcceptError::from_err)?;

            let result = Self::serve_channel(&mut channel, &session, &storage, &event_tx).await;
            channel.close().await;

            result.map_err(|e| {
                error!(error = ?e, "Failed to serve friend exchange connection");
                AcceptError::from_err(e)
            })
        }
    }
}
