//! Value objects exchanged with channel adapters.
//!
//! Field names are camelCase on the wire. [`PublishingPackage`] is the
//! downloadable artifact clients parse, so its JSON shape is fixed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marquee_core::{CampaignId, MarketingPackId, ValueObject};

/// What must be published: the frozen input to a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishingPayload {
    pub copy: String,
    pub hashtags: Vec<String>,
    pub media_urls: Vec<String>,
    pub campaign_id: Option<CampaignId>,
    pub marketing_pack_id: Option<MarketingPackId>,
    /// Traceability metadata (pack id, copy id, content id, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ValueObject for PublishingPayload {}

impl PublishingPayload {
    pub fn new(copy: impl Into<String>, hashtags: Vec<String>) -> Self {
        Self {
            copy: copy.into(),
            hashtags,
            media_urls: Vec::new(),
            campaign_id: None,
            marketing_pack_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media_urls.push(url.into());
        self
    }

    pub fn with_campaign(mut self, campaign_id: CampaignId) -> Self {
        self.campaign_id = Some(campaign_id);
        self
    }

    pub fn with_pack(mut self, pack_id: MarketingPackId) -> Self {
        self.marketing_pack_id = Some(pack_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Package metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub campaign_id: Option<CampaignId>,
    pub pack_id: Option<MarketingPackId>,
    pub generated_at: DateTime<Utc>,
    pub format: String,
}

/// Output of the approval path: everything a human needs to publish by hand.
///
/// Serialized for download, never executed automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishingPackage {
    pub copy: String,
    pub hashtags: Vec<String>,
    pub media_urls: Vec<String>,
    /// Step key → instruction. Keys sort in step order.
    pub checklist: BTreeMap<String, String>,
    pub metadata: PackageMetadata,
}

impl ValueObject for PublishingPackage {}

/// Output of the automated path.
///
/// `is_transient_error` is the only input to the retry decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishingResult {
    pub success: bool,
    pub published_url: Option<String>,
    pub external_post_id: Option<String>,
    pub error_message: Option<String>,
    pub is_transient_error: bool,
}

impl ValueObject for PublishingResult {}

impl PublishingResult {
    pub fn published(url: Option<String>, external_post_id: Option<String>) -> Self {
        Self {
            success: true,
            published_url: url,
            external_post_id,
            error_message: None,
            is_transient_error: false,
        }
    }

    /// Failure expected to succeed on retry (rate limit, timeout, 5xx).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            success: false,
            published_url: None,
            external_post_id: None,
            error_message: Some(message.into()),
            is_transient_error: true,
        }
    }

    /// Failure that will not succeed on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            success: false,
            published_url: None,
            external_post_id: None,
            error_message: Some(message.into()),
            is_transient_error: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn package_json_shape_is_stable() {
        let campaign = CampaignId::new();
        let pack = MarketingPackId::new();
        let generated_at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut checklist = BTreeMap::new();
        checklist.insert("1_copy".to_string(), "Paste the copy".to_string());

        let package = PublishingPackage {
            copy: "Hello".to_string(),
            hashtags: vec!["#launch".to_string()],
            media_urls: vec!["https://cdn/x.png".to_string()],
            checklist,
            metadata: PackageMetadata {
                campaign_id: Some(campaign),
                pack_id: Some(pack),
                generated_at,
                format: "manual_package_v1".to_string(),
            },
        };

        let value = serde_json::to_value(&package).unwrap();
        assert_eq!(
            value,
            json!({
                "copy": "Hello",
                "hashtags": ["#launch"],
                "mediaUrls": ["https://cdn/x.png"],
                "checklist": {"1_copy": "Paste the copy"},
                "metadata": {
                    "campaignId": campaign.to_string(),
                    "packId": pack.to_string(),
                    "generatedAt": "2026-01-02T03:04:05Z",
                    "format": "manual_package_v1"
                }
            })
        );
    }

    #[test]
    fn payload_without_metadata_still_parses() {
        let payload: PublishingPayload = serde_json::from_value(json!({
            "copy": "c",
            "hashtags": [],
            "mediaUrls": [],
            "campaignId": null,
            "marketingPackId": null
        }))
        .unwrap();
        assert!(payload.metadata.is_empty());
    }

    #[test]
    fn result_constructors_set_the_retry_flag() {
        assert!(PublishingResult::transient("rate limited").is_transient_error);
        assert!(!PublishingResult::permanent("bad media").is_transient_error);
        assert!(PublishingResult::published(None, None).success);
    }
}
