//! Manual channel: packages content for a human, never publishes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::adapter::{AdapterError, ChannelAdapter};
use crate::channel::Channel;
use crate::payload::{PackageMetadata, PublishingPackage, PublishingPayload, PublishingResult};

/// Format tag written into every manual package.
pub const PACKAGE_FORMAT: &str = "manual_package_v1";

/// Error returned by [`ManualAdapter::publish`].
pub const REQUIRES_MANUAL_APPROVAL: &str = "Manual channel requires manual approval";

const CHECKLIST: [(&str, &str); 5] = [
    ("1_copy", "Copy the post text into the target platform's composer"),
    ("2_hashtags", "Append the hashtags below the copy"),
    ("3_media", "Download and attach every media file in order"),
    ("4_schedule", "Publish now or schedule for the planned time"),
    ("5_review", "Review the live post, then confirm it here with the post URL"),
];

/// Always-available fallback adapter.
///
/// `publish` always fails permanently so a manual job can never be
/// auto-published by accident.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualAdapter;

impl ManualAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn package_at(&self, payload: &PublishingPayload, generated_at: DateTime<Utc>) -> PublishingPackage {
        let checklist: BTreeMap<String, String> = CHECKLIST
            .iter()
            .map(|(step, instruction)| (step.to_string(), instruction.to_string()))
            .collect();

        PublishingPackage {
            copy: payload.copy.clone(),
            hashtags: payload.hashtags.clone(),
            media_urls: payload.media_urls.clone(),
            checklist,
            metadata: PackageMetadata {
                campaign_id: payload.campaign_id,
                pack_id: payload.marketing_pack_id,
                generated_at,
                format: PACKAGE_FORMAT.to_string(),
            },
        }
    }
}

impl ChannelAdapter for ManualAdapter {
    fn channel(&self) -> &str {
        Channel::MANUAL
    }

    fn can_publish(&self) -> bool {
        true
    }

    fn generate_package(&self, payload: &PublishingPayload) -> Result<PublishingPackage, AdapterError> {
        Ok(self.package_at(payload, Utc::now()))
    }

    fn publish(
        &self,
        _payload: &PublishingPayload,
        _scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<PublishingResult, AdapterError> {
        Ok(PublishingResult::permanent(REQUIRES_MANUAL_APPROVAL))
    }
}
