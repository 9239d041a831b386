//! Synchronizer configuration.
//!
//! Loaded from an optional TOML file layered with `GRANT_SYNC__*`
//! environment variables. Every field has a default.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::network::{NetworkOverride, NetworkParams};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chain to sync (`testnet`, `mainnet`, ...).
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Local cache file shared by all chains.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Remote whitelist (`{ "<chainId>": [grant ids] }`). Unset disables filtering.
    #[serde(default)]
    pub whitelist_url: Option<String>,
    /// Serve the cached snapshot when every source fails.
    #[serde(default = "default_allow_stale")]
    pub allow_stale: bool,
    /// Items requested per subgraph page / events per RPC page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Per-chain overrides of the built-in network table.
    #[serde(default)]
    pub networks: HashMap<String, NetworkOverride>,
}

fn default_chain_id() -> String {
    "testnet".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("grant-sync-cache.json")
}

fn default_allow_stale() -> bool {
    true
}

fn default_page_size() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            cache_path: default_cache_path(),
            whitelist_url: None,
            allow_stale: default_allow_stale(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            networks: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (required when given) or from
    /// `grant-sync.toml` in the working directory when present.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("grant-sync").required(false)),
        };
        let config = builder
            .add_source(
                config::Environment::with_prefix("GRANT_SYNC")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(SyncError::Config("chain_id must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(SyncError::Config("page_size must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Network parameters for the configured chain with overrides applied.
    pub fn network(&self) -> Result<NetworkParams> {
        NetworkParams::resolve(&self.chain_id, self.networks.get(&self.chain_id)).ok_or_else(
            || {
                SyncError::Config(format!(
                    "unknown chain `{}` and no rpc_url override",
                    self.chain_id
                ))
            },
        )
    }
}
