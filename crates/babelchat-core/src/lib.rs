//! Babelchat Core Library
//!
//! The connection core of a peer-to-peer translated chat: hosts issue
//! signed, time-limited invite credentials (shared as links or QR codes),
//! guests open a direct QUIC channel with the credential, both sides
//! exchange identity and profile, and a persisted friend relationship comes
//! out the other end.
//!
//! ## Overview
//!
//! - **Invites**: self-contained signed credentials carrying host identity,
//!   address, language pairing, and expiry
//! - **Handshake**: one request/reply identity exchange over a direct
//!   channel, correlated by credential id and bounded by an expiry timer
//! - **Friends**: idempotent local directory of exchanged identities,
//!   each with a reusable signed friend token
//!
//! ## Quick Start
//!
//! ```ignore
//! use babelchat_core::{HandshakeManager, Language, SessionContext, Storage, UserProfile};
//! use babelchat_core::identity::Keypair;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Storage::new("~/.babelchat/data.db")?;
//!     let session = SessionContext::new(
//!         Keypair::generate(),
//!         UserProfile::new("Haeun", Language::Korean),
//!     );
//!
//!     let manager = HandshakeManager::start(session, storage, None).await?;
//!
//!     // Host: share this as a link or QR code
//!     let credential = manager.issue_invite(Language::English, 300)?;
//!     println!("{}", credential.encode()?);
//!
//!     // Guest (other device): turn the invite into a friend
//!     // let friend = manager.join(&invite_string).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod expiry;
pub mod handshake;
pub mod identity;
pub mod invite;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;

// Re-exports
pub use error::{ChatError, ChatResult};
pub use expiry::{ExpiryHandle, ExpiryTimer};
pub use handshake::{
    ExchangeMessage, FriendRequestHandler, GuestHandshake, HandshakeEvent, HandshakeManager,
    HandshakePhase, FRIEND_ALPN,
};
pub use identity::{Keypair, UserId};
pub use invite::{FriendToken, InviteCredential};
pub use session::SessionContext;
pub use storage::{IssuedInvite, Storage};
pub use transport::{ChannelState, ConnectionRegistry, PeerAddr, PeerChannel, PeerTransport};
pub use types::*;
