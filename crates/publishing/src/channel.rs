//! Channel names.
//!
//! Channels are an open enumeration: any non-empty name is accepted so a new
//! adapter can be registered without a schema change. Comparisons ignore case.

use serde::{Deserialize, Serialize};

use marquee_core::DomainError;

const MAX_CHANNEL_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    pub const MANUAL: &'static str = "Manual";
    pub const INSTAGRAM: &'static str = "Instagram";
    pub const FACEBOOK: &'static str = "Facebook";
    pub const TIKTOK: &'static str = "TikTok";

    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("channel must not be empty"));
        }
        if trimmed.len() > MAX_CHANNEL_LEN {
            return Err(DomainError::validation(format!(
                "channel must be at most {MAX_CHANNEL_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn manual() -> Self {
        Self(Self::MANUAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }

    pub fn is_manual(&self) -> bool {
        self.is(Self::MANUAL)
    }

    /// Registry lookup key.
    pub(crate) fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.is(&other.0)
    }
}

impl Eq for Channel {}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_compared_case_insensitively() {
        let c = Channel::new("  instagram ").unwrap();
        assert_eq!(c.as_str(), "instagram");
        assert!(c.is(Channel::INSTAGRAM));
        assert_eq!(c, Channel::new("INSTAGRAM").unwrap());
    }

    #[test]
    fn empty_and_oversized_names_are_rejected() {
        assert!(matches!(Channel::new("   "), Err(DomainError::Validation(_))));
        assert!(matches!(Channel::new("x".repeat(65)), Err(DomainError::Validation(_))));
    }
}
