//! Local JSON cache of synced grants and the last good whitelist.
//!
//! The cache is advisory: an unreadable file is logged and treated as empty.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grant::SyncSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainCache {
    #[serde(default)]
    pub snapshot: SyncSnapshot,
    /// Whitelisted grant ids from the last successful fetch.
    #[serde(default)]
    pub whitelist: Option<BTreeSet<u32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    chains: BTreeMap<String, ChainCache>,
}

#[derive(Debug, Clone)]
pub struct GrantCache {
    path: PathBuf,
}

impl GrantCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> CacheFile {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return CacheFile::default(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "cache unreadable; starting empty");
                return CacheFile::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!(path = %self.path.display(), error = %err, "cache corrupt; starting empty");
            CacheFile::default()
        })
    }

    fn write_file(&self, file: &CacheFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(file)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Cached state for one chain; empty when nothing was stored yet.
    pub fn load(&self, chain_id: &str) -> ChainCache {
        self.read_file()
            .chains
            .remove(chain_id)
            .unwrap_or_default()
    }

    pub fn store_snapshot(&self, chain_id: &str, snapshot: &SyncSnapshot) -> Result<()> {
        let mut file = self.read_file();
        file.chains.entry(chain_id.to_string()).or_default().snapshot = snapshot.clone();
        self.write_file(&file)
    }

    pub fn store_whitelist(&self, chain_id: &str, whitelist: &BTreeSet<u32>) -> Result<()> {
        let mut file = self.read_file();
        file.chains.entry(chain_id.to_string()).or_default().whitelist = Some(whitelist.clone());
        self.write_file(&file)
    }
}
