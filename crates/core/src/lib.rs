//! `marquee-core`: shared domain primitives.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AssetPromptId, CampaignId, ContentId, CopyId, MarketingPackId, TenantId, UserId};
pub use value_object::ValueObject;
