use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{FetchResult, GrantSource, HttpTransport, JsonTransport};
use crate::error::{Result, SyncError};
use crate::grant::{Grant, MetaPtr, SyncSnapshot};

const GRANTS_QUERY: &str = r#"
query Grants($first: Int!, $skip: Int!, $since: BigInt!) {
  _meta { block { number } }
  grants(first: $first, skip: $skip, orderBy: id, orderDirection: asc, where: { lastUpdated_gte: $since }) {
    id
    owner
    payee
    metaPtr { protocol pointer }
    createdAt
    lastUpdated
  }
}
"#;

/// Indexers encode ids and big integers as strings; accept either form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    Text(String),
}

impl Numeric {
    fn parse<T: TryFrom<u64>>(&self, field: &str) -> Result<T> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s
                .parse::<u64>()
                .map_err(|_| SyncError::GraphQl(format!("{field}: `{s}` is not an integer")))?,
        };
        T::try_from(value).map_err(|_| SyncError::GraphQl(format!("{field}: {value} out of range")))
    }
}

#[derive(Debug, Deserialize)]
struct SubgraphMetaPtr {
    protocol: Numeric,
    pointer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubgraphGrant {
    id: Numeric,
    owner: String,
    payee: String,
    meta_ptr: SubgraphMetaPtr,
    created_at: Numeric,
    last_updated: Numeric,
}

impl SubgraphGrant {
    fn into_grant(self) -> Result<Grant> {
        Ok(Grant {
            id: self.id.parse("id")?,
            owner: self.owner,
            payee: self.payee,
            meta_ptr: MetaPtr {
                protocol: self.meta_ptr.protocol.parse("metaPtr.protocol")?,
                pointer: self.meta_ptr.pointer,
            },
            created_at: self.created_at.parse("createdAt")?,
            last_updated: self.last_updated.parse("lastUpdated")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MetaBlock {
    number: Numeric,
}

#[derive(Debug, Deserialize)]
struct Meta {
    block: MetaBlock,
}

#[derive(Debug, Deserialize)]
struct GrantsData {
    #[serde(rename = "_meta")]
    meta: Option<Meta>,
    #[serde(default)]
    grants: Vec<SubgraphGrant>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GrantsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, PartialEq, Eq)]
struct GrantsPage {
    grants: Vec<Grant>,
    indexed_ledger: Option<u32>,
}

fn parse_page(body: &[u8]) -> Result<GrantsPage> {
    let response: GraphQlResponse = serde_json::from_slice(body)?;
    if !response.errors.is_empty() {
        let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(SyncError::GraphQl(messages.join("; ")));
    }
    let data = response
        .data
        .ok_or_else(|| SyncError::GraphQl("response has no data".into()))?;
    let indexed_ledger = data
        .meta
        .map(|meta| meta.block.number.parse("_meta.block.number"))
        .transpose()?;
    let grants = data
        .grants
        .into_iter()
        .map(SubgraphGrant::into_grant)
        .collect::<Result<Vec<_>>>()?;
    Ok(GrantsPage {
        grants,
        indexed_ledger,
    })
}

/// Grant source backed by a GraphQL indexer of the registry events.
pub struct SubgraphSource {
    transport: Box<dyn JsonTransport>,
    url: String,
    page_size: u32,
}

impl SubgraphSource {
    pub fn new(url: impl Into<String>, page_size: u32, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            transport: Box::new(HttpTransport::new(timeout)?),
            url: url.into(),
            page_size,
        })
    }

    async fn fetch_page(&self, skip: u32, since: u64) -> Result<GrantsPage> {
        let body = json!({
            "query": GRANTS_QUERY,
            "variables": {
                "first": self.page_size,
                "skip": skip,
                "since": since.to_string(),
            },
        });
        let bytes = self.transport.post(&self.url, &body).await?;
        parse_page(&bytes)
    }
}

#[async_trait]
impl GrantSource for SubgraphSource {
    fn name(&self) -> &'static str {
        "subgraph"
    }

    async fn fetch_since(&self, since: &SyncSnapshot) -> Result<FetchResult> {
        let since_ts = since.latest_update();
        let mut result = FetchResult {
            grants: Vec::new(),
            latest_ledger: since.last_ledger,
        };
        let mut skip = 0u32;
        loop {
            let page = self.fetch_page(skip, since_ts).await?;
            if let Some(ledger) = page.indexed_ledger {
                result.latest_ledger = result.latest_ledger.max(ledger);
            }
            let count = page.grants.len();
            tracing::debug!(skip, count, "subgraph page");
            result.grants.extend(page.grants);
            if count < self.page_size as usize {
                break;
            }
            skip = skip.saturating_add(self.page_size);
        }
        Ok(result)
    }
}
