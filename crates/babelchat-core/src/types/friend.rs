//! Friend records persisted after a completed handshake

use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::types::profile::UserProfile;

/// A persisted friend relationship.
///
/// Created exactly once per successful handshake by whichever side receives
/// the final valid exchange message. Keyed uniquely by `user_id`; rewriting
/// the same id overwrites rather than duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRecord {
    /// The friend's user id (storage key)
    pub user_id: UserId,
    /// Encoded signed friend token, reusable for future authentication
    pub friend_token: String,
    /// Profile snapshot taken at handshake time
    pub profile: UserProfile,
    /// Unix timestamp of first insertion; preserved across overwrites
    pub added_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::types::Language;

    #[test]
    fn test_friend_record_serialization() {
        let record = FriendRecord {
            user_id: Keypair::generate().user_id(),
            friend_token: "babel-friend:abc".to_string(),
            profile: UserProfile::new("Mina", Language::Korean),
            added_at: 1_700_000_000,
        };

        let encoded = postcard::to_allocvec(&record).expect("Failed to encode");
        let decoded: FriendRecord = postcard::from_bytes(&encoded).expect("Failed to decode");

        assert_eq!(record, decoded);
    }
}
