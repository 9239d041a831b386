//! Off-chain mirror of the registry's grant record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pointer to off-chain grant metadata (`protocol` 1 = IPFS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPtr {
    pub protocol: u32,
    pub pointer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: u32,
    /// Strkey of the owning account.
    pub owner: String,
    /// Strkey of the account receiving payouts.
    pub payee: String,
    pub meta_ptr: MetaPtr,
    pub created_at: u64,
    pub last_updated: u64,
}

pub type GrantMap = BTreeMap<u32, Grant>;

/// Merged grant state plus the highest ledger it reflects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub grants: GrantMap,
    pub last_ledger: u32,
}

impl SyncSnapshot {
    /// Newest `last_updated` across all grants, 0 when empty.
    pub fn latest_update(&self) -> u64 {
        self.grants
            .values()
            .map(|grant| grant.last_updated)
            .max()
            .unwrap_or(0)
    }
}

/// Folds `incoming` into `grants`, keeping the most recently updated record
/// per id. On equal timestamps the incoming record replaces the stored one,
/// so later events within one ledger win. Returns the number of ids changed.
pub fn merge<I>(grants: &mut GrantMap, incoming: I) -> usize
where
    I: IntoIterator<Item = Grant>,
{
    let mut changed = 0;
    for grant in incoming {
        match grants.get(&grant.id) {
            Some(existing) if existing.last_updated > grant.last_updated => {}
            Some(existing) if *existing == grant => {}
            _ => {
                grants.insert(grant.id, grant);
                changed += 1;
            }
        }
    }
    changed
}
