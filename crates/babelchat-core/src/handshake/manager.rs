//! Handshake orchestration for one signed-in user
//!
//! Wires the session, storage, transport, and event channel together:
//! hosts issue invites here, guests join through here, and the UI layer
//! subscribes to events here. One manager per signed-in user per process.

use std::sync::Arc;

use iroh::SecretKey;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::ChatResult;
use crate::handshake::events::HandshakeEvent;
use crate::handshake::guest::GuestHandshake;
use crate::invite::InviteCredential;
use crate::session::SessionContext;
use crate::storage::{IssuedInvite, Storage};
use crate::transport::{PeerAddr, PeerTransport};
use crate::types::{FriendRecord, Language};

/// Capacity of the handshake event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Orchestrates invite issuance and handshakes for the local user.
pub struct HandshakeManager {
    transport: Arc<PeerTransport>,
    session: SessionContext,
    storage: Storage,
    event_tx: broadcast::Sender<HandshakeEvent>,
}

impl HandshakeManager {
    /// Bind a transport for the session and start listening for inbound
    /// friend requests.
    ///
    /// Pass a secret key to keep the peer id stable across restarts; the
    /// invite links a host hands out embed the address of this endpoint.
    pub async fn start(
        session: SessionContext,
        storage: Storage,
        secret_key: Option<SecretKey>,
    ) -> ChatResult<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let transport = PeerTransport::bind(
            secret_key,
            Some((session.clone(), storage.clone(), event_tx.clone())),
        )
        .await?;

        info!(user = %session.user_id(), peer = %transport.endpoint_id(), "Handshake manager started");

        Ok(Self {
            transport: Arc::new(transport),
            session,
            storage,
            event_tx,
        })
    }

    /// The transport this manager listens and dials on
    pub fn transport(&self) -> Arc<PeerTransport> {
        self.transport.clone()
    }

    /// The local session
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// The backing storage
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Subscribe to handshake events
    pub fn subscribe_events(&self) -> broadcast::Receiver<HandshakeEvent> {
        self.event_tx.subscribe()
    }

    /// Issue a signed invite credential for a guest speaking `guest_language`.
    ///
    /// Records the credential id so the listening side honors the matching
    /// identity request, and embeds this endpoint's current address.
    pub fn issue_invite(
        &self,
        guest_language: Language,
        ttl_secs: i64,
    ) -> ChatResult<InviteCredential> {
        let host_addr = PeerAddr::from_endpoint_addr(&self.transport.endpoint_addr());
        let credential = self.session.issue_invite(guest_language, host_addr, ttl_secs);

        self.storage
            .record_issued_invite(&IssuedInvite::from_credential(&credential))?;

        info!(
            credential_id = ?credential.credential_id,
            guest_language = %guest_language,
            expires_at = credential.expires_at,
            "Invite issued"
        );
        let _ = self.event_tx.send(HandshakeEvent::InviteIssued {
            credential_id: credential.credential_id,
            expires_at: credential.expires_at,
        });

        Ok(credential)
    }

    /// Join a chat as a guest using a raw encoded credential.
    ///
    /// Runs one full handshake attempt; on success the friend record is
    /// already persisted locally.
    pub async fn join(&self, raw_invite: &str) -> ChatResult<FriendRecord> {
        let mut handshake = GuestHandshake::new(
            self.transport.clone(),
            self.session.clone(),
            self.storage.clone(),
            self.event_tx.clone(),
        );
        handshake.run(raw_invite).await
    }

    /// List persisted friends in insertion order
    pub fn list_friends(&self) -> ChatResult<Vec<FriendRecord>> {
        self.storage.list_friends()
    }

    /// Shut down the transport
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::types::UserProfile;
    use tempfile::tempdir;

    async fn test_manager(nickname: &str) -> (HandshakeManager, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        let session = SessionContext::new(
            Keypair::generate(),
            UserProfile::new(nickname, Language::Korean),
        );
        let manager = HandshakeManager::start(session, storage, None).await.unwrap();
        (manager, temp_dir)
    }

    #[tokio::test]
    async fn test_issue_invite_records_credential() {
        let (manager, _temp) = test_manager("Haeun").await;

        let credential = manager.issue_invite(Language::English, 300).unwrap();

        let issued = manager
            .storage()
            .load_issued_invite(&credential.credential_id)
            .unwrap()
            .expect("Issued invite must be recorded");
        assert_eq!(issued.expires_at, credential.expires_at);
        assert_eq!(issued.guest_language, Language::English);
    }

    #[tokio::test]
    async fn test_issue_invite_embeds_endpoint_identity() {
        let (manager, _temp) = test_manager("Haeun").await;

        let credential = manager.issue_invite(Language::Japanese, 300).unwrap();

        assert_eq!(credential.host_id, manager.session().user_id());
        assert_eq!(
            credential.host_addr.peer_id,
            *manager.transport().endpoint_id().as_bytes()
        );

        // The encoded form decodes back to the same credential
        let decoded = InviteCredential::decode(&credential.encode().unwrap()).unwrap();
        assert_eq!(decoded, credential);
    }

    #[tokio::test]
    async fn test_issue_invite_emits_event() {
        let (manager, _temp) = test_manager("Haeun").await;
        let mut events = manager.subscribe_events();

        let credential = manager.issue_invite(Language::English, 300).unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_millis(100), events.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Event channel closed");

        match event {
            HandshakeEvent::InviteIssued { credential_id, .. } => {
                assert_eq!(credential_id, credential.credential_id);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
