//! Direct peer-to-peer transport over iroh QUIC
//!
//! Provides the point-to-point channel the handshake runs on: connect to a
//! remote peer by its published address, exchange length-delimited frames on
//! a single bi-directional stream, close. Delivery is at-most-once; neither
//! connect nor send retries on failure. Retry policy belongs to the caller.
//!
//! Channel lifecycle is tracked in a [`ConnectionRegistry`] owned by the
//! transport. The registry keeps at most one entry per remote peer id;
//! reconnect attempts replace the tracked entry rather than duplicating it.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use iroh::endpoint::{Connection, RecvStream, SendStream};
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, PublicKey, RelayUrl, SecretKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::handshake::events::HandshakeEvent;
use crate::handshake::host::FriendRequestHandler;
use crate::handshake::protocol::FRIEND_ALPN;
use crate::session::SessionContext;
use crate::storage::Storage;

/// Maximum size of a single exchange frame (profile images travel inline)
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Serializable representation of a peer's network address.
///
/// Portable enough to embed in an invite credential: node id, optional
/// relay URL for NAT traversal, and any known direct socket addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr {
    /// Peer's public key (32 bytes)
    pub peer_id: [u8; 32],
    /// Optional relay URL for NAT traversal
    pub relay_url: Option<String>,
    /// Direct socket addresses as strings (e.g. "192.168.1.1:4433")
    pub direct_addresses: Vec<String>,
}

impl PeerAddr {
    /// Create a new PeerAddr with just a peer id
    pub fn new(peer_id: [u8; 32]) -> Self {
        Self {
            peer_id,
            relay_url: None,
            direct_addresses: Vec::new(),
        }
    }

    /// Set a relay URL (builder pattern)
    pub fn with_relay(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = Some(relay_url.into());
        self
    }

    /// Add a direct address (builder pattern)
    pub fn with_address(mut self, addr: impl Into<String>) -> Self {
        self.direct_addresses.push(addr.into());
        self
    }

    /// Capture the current address of an iroh endpoint
    pub fn from_endpoint_addr(addr: &EndpointAddr) -> Self {
        Self {
            peer_id: addr.id.as_bytes().to_owned(),
            relay_url: addr.relay_urls().next().map(|url| url.to_string()),
            direct_addresses: addr.ip_addrs().map(|a| a.to_string()).collect(),
        }
    }

    /// Convert back to an iroh EndpointAddr for dialing
    pub fn to_endpoint_addr(&self) -> ChatResult<EndpointAddr> {
        let public_key = PublicKey::from_bytes(&self.peer_id)
            .map_err(|e| ChatError::InvalidCredential(format!("Invalid peer key: {}", e)))?;

        let mut addr = EndpointAddr::new(public_key);

        if let Some(ref relay_str) = self.relay_url {
            let relay_url: RelayUrl = relay_str
                .parse()
                .map_err(|e| ChatError::InvalidCredential(format!("Invalid relay URL: {}", e)))?;
            addr = addr.with_relay_url(relay_url);
        }

        for addr_str in &self.direct_addresses {
            let socket_addr: std::net::SocketAddr = addr_str.parse().map_err(|e| {
                ChatError::InvalidCredential(format!("Invalid socket address: {}", e))
            })?;
            addr = addr.with_ip_addr(socket_addr);
        }

        Ok(addr)
    }

    /// The peer id as an iroh PublicKey
    pub fn public_key(&self) -> ChatResult<PublicKey> {
        PublicKey::from_bytes(&self.peer_id)
            .map_err(|e| ChatError::Identity(format!("Invalid peer key: {}", e)))
    }
}

/// Lifecycle state of a tracked channel to one remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Registry of channel states keyed by remote peer id.
///
/// Owned by the transport; only the transport and the channels it hands out
/// write to it. Readers get a point-in-time snapshot of one peer's state.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<PublicKey, ChannelState>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a remote peer; `Idle` when never tracked
    pub fn state(&self, peer: &PublicKey) -> ChannelState {
        self.entries
            .lock()
            .get(peer)
            .copied()
            .unwrap_or(ChannelState::Idle)
    }

    /// Number of channels currently in the `Open` state
    pub fn open_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|s| **s == ChannelState::Open)
            .count()
    }

    pub(crate) fn set(&self, peer: PublicKey, state: ChannelState) {
        self.entries.lock().insert(peer, state);
    }
}

/// P2P transport bound to one local endpoint.
///
/// Outbound: [`PeerTransport::connect`] opens a channel to a remote peer.
/// Inbound: when constructed with a [`FriendRequestHandler`], a router
/// accepts friend-exchange connections on the session's stable peer id,
/// system-wide rather than per-invite.
#[derive(Debug)]
pub struct PeerTransport {
    endpoint: Endpoint,
    router: Option<Router>,
    registry: Arc<ConnectionRegistry>,
}

impl PeerTransport {
    /// Bind a local endpoint, optionally accepting inbound friend requests.
    ///
    /// Pass a secret key to keep a stable peer id across restarts; `None`
    /// generates an ephemeral identity. When handler dependencies are
    /// provided, a [`FriendRequestHandler`] is registered with the router
    /// and inbound exchanges share this transport's connection registry.
    pub async fn bind(
        secret_key: Option<SecretKey>,
        friend_handler_deps: Option<(SessionContext, Storage, broadcast::Sender<HandshakeEvent>)>,
    ) -> ChatResult<Self> {
        let secret_key = secret_key.unwrap_or_else(|| SecretKey::generate(&mut rand::rng()));
        let registry = Arc::new(ConnectionRegistry::new());

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![FRIEND_ALPN.to_vec()])
            .bind()
            .await
            .map_err(|e| ChatError::Connect(format!("Failed to bind endpoint: {}", e)))?;

        let endpoint_id = endpoint.id();
        info!(%endpoint_id, "Endpoint bound");

        let router = friend_handler_deps.map(|(session, storage, event_tx)| {
            let handler = FriendRequestHandler::new(session, storage, event_tx, registry.clone());
            let router = Router::builder(endpoint.clone())
                .accept(FRIEND_ALPN, handler)
                .spawn();
            info!("Friend request handler registered");
            router
        });

        Ok(Self {
            endpoint,
            router,
            registry,
        })
    }

    /// This endpoint's current address, shareable with other peers
    pub fn endpoint_addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    /// This endpoint's stable peer id
    pub fn endpoint_id(&self) -> PublicKey {
        self.endpoint.id()
    }

    /// The registry tracking channel states per remote peer
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Open a channel to a remote peer.
    ///
    /// Suspends until the connection and its stream are open, or fails with
    /// [`ChatError::Connect`]. No automatic retry.
    pub async fn connect(&self, addr: &PeerAddr) -> ChatResult<PeerChannel> {
        let endpoint_addr = addr.to_endpoint_addr()?;
        let remote = endpoint_addr.id;

        self.registry.set(remote, ChannelState::Connecting);
        debug!(peer = %remote, "Connecting");

        let connection = match self.endpoint.connect(endpoint_addr, FRIEND_ALPN).await {
            Ok(conn) => conn,
            Err(e) => {
                self.registry.set(remote, ChannelState::Failed);
                return Err(ChatError::Connect(format!(
                    "Failed to connect to {}: {}",
                    remote, e
                )));
            }
        };

        let (send, recv) = match connection.open_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                self.registry.set(remote, ChannelState::Failed);
                return Err(ChatError::Connect(format!(
                    "Failed to open stream to {}: {}",
                    remote, e
                )));
            }
        };

        self.registry.set(remote, ChannelState::Open);
        info!(peer = %remote, "Channel open");

        Ok(PeerChannel::new(
            connection,
            send,
            recv,
            self.registry.clone(),
        ))
    }

    /// Shut down the router (if any) and close the endpoint
    pub async fn shutdown(&self) {
        if let Some(router) = &self.router {
            if let Err(e) = router.shutdown().await {
                warn!(error = ?e, "Router shutdown failed");
            }
        }
        self.endpoint.close().await;
    }
}

/// One open bi-directional channel to a remote peer.
///
/// Frames are length-delimited; inbound frames arrive in order. `close` is
/// idempotent and safe on an already-closed channel.
pub struct PeerChannel {
    remote: PublicKey,
    connection: Connection,
    send: FramedWrite<SendStream, LengthDelimitedCodec>,
    recv: FramedRead<RecvStream, LengthDelimitedCodec>,
    registry: Arc<ConnectionRegistry>,
    closed: bool,
}

impl PeerChannel {
    fn codec() -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_SIZE)
            .new_codec()
    }

    fn new(
        connection: Connection,
        send: SendStream,
        recv: RecvStream,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let remote = connection.remote_id();
        Self {
            remote,
            connection,
            send: FramedWrite::new(send, Self::codec()),
            recv: FramedRead::new(recv, Self::codec()),
            registry,
            closed: false,
        }
    }

    /// Wrap an inbound connection by accepting its first bi stream.
    ///
    /// Used by the host side; the accepted connection is tracked in the
    /// registry like an outbound one.
    pub(crate) async fn accept(
        connection: Connection,
        registry: Arc<ConnectionRegistry>,
    ) -> ChatResult<Self> {
        let remote = connection.remote_id();
        let (send, recv) = connection
            .accept_bi()
            .await
            .map_err(|e| ChatError::Connect(format!("Failed to accept stream: {}", e)))?;

        registry.set(remote, ChannelState::Open);
        Ok(Self::new(connection, send, recv, registry))
    }

    /// The remote peer's id
    pub fn remote_id(&self) -> PublicKey {
        self.remote
    }

    /// Send one frame. At-most-once: a failure surfaces immediately and the
    /// frame is not resent.
    pub async fn send(&mut self, frame: Bytes) -> ChatResult<()> {
        if self.closed {
            return Err(ChatError::Send("Channel is closed".to_string()));
        }
        self.send
            .send(frame)
            .await
            .map_err(|e| ChatError::Send(format!("Failed to send frame: {}", e)))
    }

    /// Receive the next frame, in arrival order.
    ///
    /// Returns `None` when the remote side finished the stream cleanly.
    pub async fn recv(&mut self) -> ChatResult<Option<BytesMut>> {
        match self.recv.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(ChatError::Send(format!("Stream error: {}", e))),
            None => Ok(None),
        }
    }

    /// Close the channel. Idempotent; updates the registry on first call.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Flush any buffered frame and signal end-of-stream before closing
        // the connection, so the peer sees a clean finish.
        let _ = self.send.flush().await;
        let _ = self.send.get_mut().finish();
        self.connection.close(0u32.into(), b"done");
        self.registry.set(self.remote, ChannelState::Closed);
        debug!(peer = %self.remote, "Channel closed");
    }
}

impl std::fmt::Debug for PeerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerChannel")
            .field("remote", &self.remote)
            .field("closed", &self.closed)
            .finish()
    }
}
