//! Round whitelist: which grant ids are shown for each chain.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::cache::GrantCache;
use crate::error::{Result, SyncError};
use crate::grant::GrantMap;

/// Chain id to whitelisted grant ids.
pub type Whitelist = BTreeMap<String, BTreeSet<u32>>;

#[async_trait]
pub trait WhitelistFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Whitelist>;
}

/// Fetches `{ "<chainId>": [ids...] }` with a plain GET.
pub struct HttpWhitelist {
    client: reqwest::Client,
    url: String,
}

impl HttpWhitelist {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: crate::source::http_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl WhitelistFetcher for HttpWhitelist {
    async fn fetch(&self) -> Result<Whitelist> {
        let bytes = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| SyncError::http(&self.url, err))?
            .bytes()
            .await
            .map_err(|err| SyncError::http(&self.url, err))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Resolves the whitelist for `chain_id`: remote first, cached copy on
/// failure. A successful fetch refreshes the cache.
pub async fn resolve(
    fetcher: &dyn WhitelistFetcher,
    cache: &GrantCache,
    chain_id: &str,
) -> Option<BTreeSet<u32>> {
    match fetcher.fetch().await {
        Ok(mut whitelist) => {
            let ids = whitelist.remove(chain_id).unwrap_or_default();
            if let Err(err) = cache.store_whitelist(chain_id, &ids) {
                tracing::warn!(chain_id, error = %err, "failed to cache whitelist");
            }
            Some(ids)
        }
        Err(err) => {
            let cached = cache.load(chain_id).whitelist;
            tracing::warn!(
                chain_id,
                error = %err,
                cached = cached.is_some(),
                "whitelist fetch failed; using cached copy"
            );
            cached
        }
    }
}

/// Keeps only whitelisted grants. `None` means no whitelist could be
/// obtained and every grant passes.
pub fn filter(grants: &GrantMap, whitelist: Option<&BTreeSet<u32>>) -> GrantMap {
    match whitelist {
        Some(ids) => grants
            .iter()
            .filter(|(id, _)| ids.contains(*id))
            .map(|(id, grant)| (*id, grant.clone()))
            .collect(),
        None => {
            tracing::warn!("no whitelist available; grants are unfiltered");
            grants.clone()
        }
    }
}
