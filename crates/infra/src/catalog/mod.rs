//! Content/Campaign/Copy catalog collaborator.
//!
//! The catalog owns campaigns, marketing packs, copy variants and content
//! items. The publishing core only reads from it, at job build time.

mod tenant_map;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use marquee_core::{AssetPromptId, CampaignId, ContentId, MarketingPackId, TenantId};
use marquee_publishing::CopyVariant;

use tenant_map::TenantMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRecord {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketingPackRecord {
    pub id: MarketingPackId,
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    #[serde(default)]
    pub content_id: Option<ContentId>,
    #[serde(default)]
    pub asset_prompt_id: Option<AssetPromptId>,
}

/// A media item a pack can point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: ContentId,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog storage error: {0}")]
    Storage(String),
}

/// Read access to the catalog, always tenant-scoped.
pub trait CampaignCatalog: Send + Sync {
    fn campaign(&self, tenant_id: TenantId, id: CampaignId) -> Result<Option<CampaignRecord>, CatalogError>;

    fn marketing_pack(
        &self,
        tenant_id: TenantId,
        id: MarketingPackId,
    ) -> Result<Option<MarketingPackRecord>, CatalogError>;

    /// Copy variants generated for a pack, in generation order.
    fn copies_for_pack(&self, tenant_id: TenantId, pack_id: MarketingPackId) -> Result<Vec<CopyVariant>, CatalogError>;

    fn content(&self, tenant_id: TenantId, id: ContentId) -> Result<Option<ContentRecord>, CatalogError>;
}

impl<C> CampaignCatalog for Arc<C>
where
    C: CampaignCatalog + ?Sized,
{
    fn campaign(&self, tenant_id: TenantId, id: CampaignId) -> Result<Option<CampaignRecord>, CatalogError> {
        (**self).campaign(tenant_id, id)
    }

    fn marketing_pack(
        &self,
        tenant_id: TenantId,
        id: MarketingPackId,
    ) -> Result<Option<MarketingPackRecord>, CatalogError> {
        (**self).marketing_pack(tenant_id, id)
    }

    fn copies_for_pack(&self, tenant_id: TenantId, pack_id: MarketingPackId) -> Result<Vec<CopyVariant>, CatalogError> {
        (**self).copies_for_pack(tenant_id, pack_id)
    }

    fn content(&self, tenant_id: TenantId, id: ContentId) -> Result<Option<ContentRecord>, CatalogError> {
        (**self).content(tenant_id, id)
    }
}

/// Catalog contents in loadable form (dev seed files, tests).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub campaigns: Vec<CampaignRecord>,
    #[serde(default)]
    pub packs: Vec<MarketingPackRecord>,
    /// Copies carry their pack id but not a tenant, so they are grouped here.
    #[serde(default)]
    pub copies: Vec<SeedCopy>,
    #[serde(default)]
    pub contents: Vec<ContentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCopy {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub copy: CopyVariant,
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    campaigns: TenantMap<CampaignId, CampaignRecord>,
    packs: TenantMap<MarketingPackId, MarketingPackRecord>,
    copies: TenantMap<MarketingPackId, Vec<CopyVariant>>,
    contents: TenantMap<ContentId, ContentRecord>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for campaign in seed.campaigns {
            catalog.put_campaign(campaign);
        }
        for pack in seed.packs {
            catalog.put_pack(pack);
        }
        for SeedCopy { tenant_id, copy } in seed.copies {
            catalog.put_copy(tenant_id, copy);
        }
        for content in seed.contents {
            catalog.put_content(content);
        }
        catalog
    }

    pub fn put_campaign(&self, campaign: CampaignRecord) {
        self.campaigns.upsert(campaign.tenant_id, campaign.id, campaign);
    }

    pub fn put_pack(&self, pack: MarketingPackRecord) {
        self.packs.upsert(pack.tenant_id, pack.id, pack);
    }

    /// Append a copy to its pack, or replace the variant with the same id.
    pub fn put_copy(&self, tenant_id: TenantId, copy: CopyVariant) {
        self.copies.modify(tenant_id, copy.pack_id, |copies| {
            match copies.iter_mut().find(|c| c.id == copy.id) {
                Some(existing) => *existing = copy,
                None => copies.push(copy),
            }
        });
    }

    pub fn put_content(&self, content: ContentRecord) {
        self.contents.upsert(content.tenant_id, content.id, content);
    }
}

impl CampaignCatalog for InMemoryCatalog {
    fn campaign(&self, tenant_id: TenantId, id: CampaignId) -> Result<Option<CampaignRecord>, CatalogError> {
        Ok(self.campaigns.get(tenant_id, &id))
    }

    fn marketing_pack(
        &self,
        tenant_id: TenantId,
        id: MarketingPackId,
    ) -> Result<Option<MarketingPackRecord>, CatalogError> {
        Ok(self.packs.get(tenant_id, &id))
    }

    fn copies_for_pack(&self, tenant_id: TenantId, pack_id: MarketingPackId) -> Result<Vec<CopyVariant>, CatalogError> {
        Ok(self.copies.get(tenant_id, &pack_id).unwrap_or_default())
    }

    fn content(&self, tenant_id: TenantId, id: ContentId) -> Result<Option<ContentRecord>, CatalogError> {
        Ok(self.contents.get(tenant_id, &id))
    }
}
