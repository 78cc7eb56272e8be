//! Generated copy variants and channel-aware selection.

use serde::{Deserialize, Serialize};

use marquee_core::{CopyId, MarketingPackId};

use crate::channel::Channel;

/// Length class of a generated copy variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyFormat {
    Short,
    Medium,
    Long,
    #[serde(other)]
    Unspecified,
}

/// One generated copy variant of a marketing pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyVariant {
    pub id: CopyId,
    pub pack_id: MarketingPackId,
    pub format: CopyFormat,
    pub text: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl CopyVariant {
    /// A variant with no text cannot be published.
    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Copy length each known channel prefers.
pub fn preferred_format(channel: &Channel) -> Option<CopyFormat> {
    if channel.is(Channel::INSTAGRAM) {
        Some(CopyFormat::Short)
    } else if channel.is(Channel::FACEBOOK) {
        Some(CopyFormat::Medium)
    } else if channel.is(Channel::TIKTOK) {
        Some(CopyFormat::Long)
    } else {
        None
    }
}

/// Pick the copy for `channel`: the first usable variant of the preferred
/// length, else the first usable variant. `None` when nothing is usable.
pub fn select_copy<'a>(channel: &Channel, copies: &'a [CopyVariant]) -> Option<&'a CopyVariant> {
    if let Some(format) = preferred_format(channel)
        && let Some(hit) = copies.iter().find(|c| c.is_usable() && c.format == format)
    {
        return Some(hit);
    }

    copies.iter().find(|c| c.is_usable())
}
