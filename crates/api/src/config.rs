//! API process configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use marquee_auth::{Role, TenantMembership};
use marquee_core::{TenantId, UserId};
use marquee_infra::{CatalogSeed, OrchestratorConfig};

pub const ENV_BIND_ADDR: &str = "MARQUEE_BIND_ADDR";
pub const ENV_JWT_SECRET: &str = "JWT_SECRET";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_SEED_FILE: &str = "MARQUEE_SEED_FILE";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-insecure-secret-change-me";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error(transparent)]
    Orchestrator(#[from] marquee_infra::ConfigError),

    #[error("seed file {path}: {source}")]
    SeedIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seed file {path}: {source}")]
    SeedFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Selects the Postgres job store when set.
    pub database_url: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = non_blank(lookup(ENV_BIND_ADDR)).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            var: ENV_BIND_ADDR,
            value: bind_raw.clone(),
        })?;

        let jwt_secret = match non_blank(lookup(ENV_JWT_SECRET)) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: non_blank(lookup(ENV_DATABASE_URL)),
            seed_file: non_blank(lookup(ENV_SEED_FILE)).map(PathBuf::from),
            orchestrator: OrchestratorConfig::from_lookup(&lookup)?,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Development seed: catalog contents plus directory entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedFile {
    #[serde(flatten)]
    pub catalog: CatalogSeed,
    #[serde(default)]
    pub memberships: Vec<SeedMembership>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMembership {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl From<SeedMembership> for TenantMembership {
    fn from(seed: SeedMembership) -> Self {
        TenantMembership::with_roles(seed.tenant_id, seed.user_id, seed.roles)
    }
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::SeedIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::SeedFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}
