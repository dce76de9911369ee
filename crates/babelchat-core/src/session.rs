//! The authenticated local session
//!
//! Supplies the identity, profile, and language the protocol reads when
//! populating outgoing exchange payloads. The protocol never writes to it.

use std::sync::Arc;

use crate::identity::{Keypair, UserId};
use crate::invite::{FriendToken, InviteCredential};
use crate::transport::PeerAddr;
use crate::types::{Language, UserProfile};

/// Identity and profile of the signed-in user.
#[derive(Debug, Clone)]
pub struct SessionContext {
    keypair: Arc<Keypair>,
    profile: UserProfile,
    is_guest: bool,
}

impl SessionContext {
    /// Create a session for a fully signed-in user
    pub fn new(keypair: Keypair, profile: UserProfile) -> Self {
        Self {
            keypair: Arc::new(keypair),
            profile,
            is_guest: false,
        }
    }

    /// Create a session for a guest account (no social login)
    pub fn guest(keypair: Keypair, profile: UserProfile) -> Self {
        Self {
            keypair: Arc::new(keypair),
            profile,
            is_guest: true,
        }
    }

    /// The local user id
    pub fn user_id(&self) -> UserId {
        self.keypair.user_id()
    }

    /// The local signing keypair
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The local profile
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Whether this session belongs to a guest account
    pub fn is_guest(&self) -> bool {
        self.is_guest
    }

    /// Mint a signed friend token for the local identity
    pub fn mint_friend_token(&self) -> FriendToken {
        FriendToken::mint(&self.keypair, &self.profile, self.is_guest)
    }

    /// Issue a signed invite credential for a guest speaking `guest_language`
    pub fn issue_invite(
        &self,
        guest_language: Language,
        host_addr: PeerAddr,
        ttl_secs: i64,
    ) -> InviteCredential {
        InviteCredential::issue(
            &self.keypair,
            &self.profile,
            guest_language,
            host_addr,
            ttl_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_user_id_stable() {
        let keypair = Keypair::generate();
        let expected = keypair.user_id();
        let session = SessionContext::new(keypair, UserProfile::new("Haeun", Language::Korean));

        assert_eq!(session.user_id(), expected);
        assert!(!session.is_guest());
    }

    #[test]
    fn test_session_mints_verifiable_token() {
        let session = SessionContext::guest(
            Keypair::generate(),
            UserProfile::new("Visitor", Language::English),
        );

        let token = session.mint_friend_token();
        assert!(token.is_guest);
        assert_eq!(token.user_id, session.user_id());

        let decoded = FriendToken::decode(&token.encode().unwrap()).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_session_issues_credential_with_own_languages() {
        let session = SessionContext::new(
            Keypair::generate(),
            UserProfile::new("Haeun", Language::Korean),
        );

        let credential =
            session.issue_invite(Language::Japanese, PeerAddr::new([1u8; 32]), 300);

        assert_eq!(credential.host_id, session.user_id());
        assert_eq!(credential.host_language, Language::Korean);
        assert_eq!(credential.guest_language, Language::Japanese);
        assert_eq!(credential.host_nickname, "Haeun");
    }
}
