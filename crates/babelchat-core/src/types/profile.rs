//! User profile carried through invites and identity exchange

use serde::{Deserialize, Serialize};

use crate::types::Language;

/// Profile information shown to the other side of a chat.
///
/// Exchanged in both directions during the handshake and cached in the
/// friend record as a snapshot taken at acceptance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name shown in chat
    pub nickname: String,
    /// Language this user reads and writes in
    pub language: Language,
    /// Optional reference to a profile image (data URL or blob id)
    pub profile_image: Option<String>,
}

impl UserProfile {
    /// Create a profile with no image
    pub fn new(nickname: impl Into<String>, language: Language) -> Self {
        Self {
            nickname: nickname.into(),
            language,
            profile_image: None,
        }
    }

    /// Attach a profile image reference (builder pattern)
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.profile_image = Some(image.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_builder() {
        let profile = UserProfile::new("Haeun", Language::Korean).with_image("data:image/png;...");

        assert_eq!(profile.nickname, "Haeun");
        assert_eq!(profile.language, Language::Korean);
        assert!(profile.profile_image.is_some());
    }

    #[test]
    fn test_profile_serialization() {
        let profile = UserProfile::new("Alex", Language::English);

        let encoded = postcard::to_allocvec(&profile).expect("Failed to encode");
        let decoded: UserProfile = postcard::from_bytes(&encoded).expect("Failed to decode");

        assert_eq!(profile, decoded);
    }
}
