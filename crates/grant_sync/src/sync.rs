//! Cache-then-fetch-then-merge grant synchronization.

use std::collections::BTreeSet;

use crate::cache::GrantCache;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::grant::{merge, GrantMap, SyncSnapshot};
use crate::source::{GrantSource, RpcSource, SubgraphSource};
use crate::whitelist::{self, HttpWhitelist, WhitelistFetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub snapshot: SyncSnapshot,
    /// Source that answered, `None` when serving the cached snapshot.
    pub source: Option<&'static str>,
    /// Grant ids added or replaced by this run.
    pub changed: usize,
}

impl SyncOutcome {
    pub fn is_stale(&self) -> bool {
        self.source.is_none()
    }
}

pub struct Synchronizer {
    chain_id: String,
    cache: GrantCache,
    /// Tried in order; later sources are fallbacks.
    sources: Vec<Box<dyn GrantSource>>,
    whitelist: Option<Box<dyn WhitelistFetcher>>,
    allow_stale: bool,
}

impl Synchronizer {
    pub fn new(chain_id: impl Into<String>, cache: GrantCache) -> Self {
        Self {
            chain_id: chain_id.into(),
            cache,
            sources: Vec::new(),
            whitelist: None,
            allow_stale: true,
        }
    }

    pub fn with_source(mut self, source: Box<dyn GrantSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_whitelist(mut self, fetcher: Box<dyn WhitelistFetcher>) -> Self {
        self.whitelist = Some(fetcher);
        self
    }

    pub fn allow_stale(mut self, allow_stale: bool) -> Self {
        self.allow_stale = allow_stale;
        self
    }

    /// Wires the subgraph (preferred) and RPC (fallback) sources for the
    /// configured chain.
    pub fn from_config(config: &Config) -> Result<Self> {
        let network = config.network()?;
        let timeout = config.request_timeout();
        let mut sync = Synchronizer::new(&config.chain_id, GrantCache::new(&config.cache_path))
            .allow_stale(config.allow_stale);

        if let Some(url) = &network.subgraph_url {
            sync = sync.with_source(Box::new(SubgraphSource::new(
                url.clone(),
                config.page_size,
                timeout,
            )?));
        }
        if !network.registry_contract.is_empty() {
            sync = sync.with_source(Box::new(RpcSource::new(
                &network,
                config.page_size,
                timeout,
            )?));
        }
        if let Some(url) = &config.whitelist_url {
            sync = sync.with_whitelist(Box::new(HttpWhitelist::new(url.clone(), timeout)?));
        }

        if sync.sources.is_empty() {
            return Err(SyncError::NoSource {
                chain_id: config.chain_id.clone(),
            });
        }
        Ok(sync)
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Brings the cached snapshot up to date from the first source that
    /// answers and persists the result.
    #[tracing::instrument(skip(self), fields(chain_id = %self.chain_id))]
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let mut snapshot = self.cache.load(&self.chain_id).snapshot;
        let mut last_error = None;

        for source in &self.sources {
            let fetched = match source.fetch_since(&snapshot).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    tracing::warn!(source = source.name(), error = %err, "grant source failed");
                    last_error = Some(err);
                    continue;
                }
            };

            let changed = merge(&mut snapshot.grants, fetched.grants);
            snapshot.last_ledger = snapshot.last_ledger.max(fetched.latest_ledger);
            if let Err(err) = self.cache.store_snapshot(&self.chain_id, &snapshot) {
                tracing::warn!(error = %err, "failed to persist grant cache");
            }
            tracing::info!(
                source = source.name(),
                changed,
                total = snapshot.grants.len(),
                last_ledger = snapshot.last_ledger,
                "grants synced"
            );
            return Ok(SyncOutcome {
                snapshot,
                source: Some(source.name()),
                changed,
            });
        }

        let Some(err) = last_error else {
            return Err(SyncError::NoSource {
                chain_id: self.chain_id.clone(),
            });
        };
        if !self.allow_stale {
            return Err(err);
        }
        tracing::warn!(
            total = snapshot.grants.len(),
            last_ledger = snapshot.last_ledger,
            "all grant sources failed; serving cached grants"
        );
        Ok(SyncOutcome {
            snapshot,
            source: None,
            changed: 0,
        })
    }

    /// Whitelisted ids for this chain; `None` when filtering is disabled or
    /// no whitelist could be obtained.
    pub async fn whitelist(&self) -> Option<BTreeSet<u32>> {
        let fetcher = self.whitelist.as_deref()?;
        whitelist::resolve(fetcher, &self.cache, &self.chain_id).await
    }

    /// Syncs, then applies the whitelist. Without one every grant passes.
    pub async fn grants(&self) -> Result<GrantMap> {
        let outcome = self.sync().await?;
        let ids = self.whitelist().await;
        Ok(whitelist::filter(&outcome.snapshot.grants, ids.as_ref()))
    }
}
