//! Invite handshake: turning a shared credential into a friend record
//!
//! The handshake converts an out-of-band invite (link or QR) into a
//! persisted friend relationship via one in-band exchange over a direct
//! channel:
//!
//! ```text
//! Host                                Guest
//!   |                                   |
//!   |--- invite credential (QR/URL) --->|   out-of-band
//!   |                                   |
//!   |<-- IdentityRequest ---------------|   in-band, direct channel
//!   |    (credential id, token, profile)|
//!   |                                   |
//!   |--- IdentityReply ---------------->|
//!   |    (token, profile)               |
//!   |                                   |
//!   |  put friend record                |  put friend record
//! ```
//!
//! The host listens on its stable peer id system-wide, multiplexing every
//! outstanding invite over one identity; each inbound connection is served
//! by its own task that ends when the exchange reaches a terminal state.
//! The guest drives a one-shot state machine bounded by the credential's
//! expiry timer.

pub mod events;
pub mod guest;
pub mod host;
pub mod manager;
pub mod protocol;

pub use events::HandshakeEvent;
pub use guest::{GuestHandshake, HandshakePhase};
pub use host::FriendRequestHandler;
pub use manager::HandshakeManager;
pub use protocol::{ExchangeMessage, FRIEND_ALPN};
