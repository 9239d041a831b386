//! Remote sources of grant records.

mod rpc;
mod subgraph;

use async_trait::async_trait;
use serde_json::Value;

pub use rpc::{decode_grant_event, RpcEvent, RpcSource};
pub use subgraph::SubgraphSource;

use crate::error::{Result, SyncError};
use crate::grant::{Grant, SyncSnapshot};

/// Grants changed since a snapshot, and the ledger the answer reflects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub grants: Vec<Grant>,
    pub latest_ledger: u32,
}

#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Fetches grants created or updated after `since`.
    async fn fetch_since(&self, since: &SyncSnapshot) -> Result<FetchResult>;
}

/// POSTs a JSON body and hands back the raw response body.
#[async_trait]
pub(crate) trait JsonTransport: Send + Sync {
    async fn post(&self, url: &str, body: &Value) -> Result<Vec<u8>>;
}

pub(crate) struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub(crate) fn new(timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| SyncError::http(url, err))?
            .bytes()
            .await
            .map_err(|err| SyncError::http(url, err))?;
        Ok(bytes.to_vec())
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| SyncError::Config(format!("http client: {err}")))
}
