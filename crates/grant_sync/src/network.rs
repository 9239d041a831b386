//! Known networks and their default endpoints.

use serde::{Deserialize, Serialize};

/// Connection parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub chain_id: String,
    pub rpc_url: String,
    /// GraphQL indexer for the grant registry, if one is deployed.
    #[serde(default)]
    pub subgraph_url: Option<String>,
    /// Grant registry contract id (`C...` strkey). Empty until deployed.
    #[serde(default)]
    pub registry_contract: String,
    /// Ledger the registry was deployed in; RPC scans never start earlier.
    #[serde(default)]
    pub start_ledger: u32,
}

/// Optional per-field overrides layered over [`NetworkParams`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkOverride {
    pub rpc_url: Option<String>,
    pub subgraph_url: Option<String>,
    pub registry_contract: Option<String>,
    pub start_ledger: Option<u32>,
}

struct KnownNetwork {
    chain_id: &'static str,
    rpc_url: &'static str,
}

const KNOWN_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        chain_id: "mainnet",
        rpc_url: "https://mainnet.sorobanrpc.com",
    },
    KnownNetwork {
        chain_id: "testnet",
        rpc_url: "https://soroban-testnet.stellar.org",
    },
    KnownNetwork {
        chain_id: "futurenet",
        rpc_url: "https://rpc-futurenet.stellar.org",
    },
    KnownNetwork {
        chain_id: "standalone",
        rpc_url: "http://localhost:8000/soroban/rpc",
    },
];

pub fn known_chain_ids() -> impl Iterator<Item = &'static str> {
    KNOWN_NETWORKS.iter().map(|network| network.chain_id)
}

/// Default parameters for a known chain id.
pub fn lookup(chain_id: &str) -> Option<NetworkParams> {
    KNOWN_NETWORKS
        .iter()
        .find(|network| network.chain_id == chain_id)
        .map(|network| NetworkParams {
            chain_id: network.chain_id.to_string(),
            rpc_url: network.rpc_url.to_string(),
            subgraph_url: None,
            registry_contract: String::new(),
            start_ledger: 0,
        })
}

impl NetworkParams {
    /// Builds parameters for `chain_id`, starting from the built-in table when
    /// the chain is known. Unknown chains need at least an `rpc_url` override.
    pub fn resolve(chain_id: &str, overrides: Option<&NetworkOverride>) -> Option<Self> {
        let mut params = match lookup(chain_id) {
            Some(params) => params,
            None => NetworkParams {
                chain_id: chain_id.to_string(),
                rpc_url: overrides?.rpc_url.clone()?,
                subgraph_url: None,
                registry_contract: String::new(),
                start_ledger: 0,
            },
        };
        if let Some(overrides) = overrides {
            params.apply(overrides);
        }
        Some(params)
    }

    fn apply(&mut self, overrides: &NetworkOverride) {
        if let Some(rpc_url) = &overrides.rpc_url {
            self.rpc_url = rpc_url.clone();
        }
        if overrides.subgraph_url.is_some() {
            self.subgraph_url = overrides.subgraph_url.clone();
        }
        if let Some(registry_contract) = &overrides.registry_contract {
            self.registry_contract = registry_contract.clone();
        }
        if let Some(start_ledger) = overrides.start_ledger {
            self.start_ledger = start_ledger;
        }
    }
}
