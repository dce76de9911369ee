//! Chat languages supported for translation pairing
//!
//! The invite credential pins a language for each side of the conversation
//! so either peer can request translation of inbound messages.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Languages a user can chat in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Korean,
    English,
    Japanese,
    Chinese,
    Thai,
    Vietnamese,
}

impl Language {
    /// IETF language tag, as used in invite URLs
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Korean => "ko",
            Self::English => "en",
            Self::Japanese => "ja",
            Self::Chinese => "zh",
            Self::Thai => "th",
            Self::Vietnamese => "vi",
        }
    }

    /// All supported languages
    pub fn all() -> &'static [Language] {
        &[
            Self::Korean,
            Self::English,
            Self::Japanese,
            Self::Chinese,
            Self::Thai,
            Self::Vietnamese,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl std::str::FromStr for Language {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ko" | "korean" => Ok(Self::Korean),
            "en" | "english" => Ok(Self::English),
            "ja" | "japanese" => Ok(Self::Japanese),
            "zh" | "chinese" => Ok(Self::Chinese),
            "th" | "thai" => Ok(Self::Thai),
            "vi" | "vietnamese" => Ok(Self::Vietnamese),
            other => Err(ChatError::InvalidOperation(format!(
                "Unknown language: {}",
                other
            ))),
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::English
    }
}
