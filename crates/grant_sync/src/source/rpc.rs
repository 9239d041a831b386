//! Scans grant registry events through Soroban JSON-RPC `getEvents`.
//!
//! Events are requested with `xdrFormat: "json"` so topics and values
//! arrive as ScVal JSON (`{"symbol": "grant"}`, `{"u64": "17"}`, ...).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{FetchResult, GrantSource, HttpTransport, JsonTransport};
use crate::error::{Result, SyncError};
use crate::grant::{Grant, MetaPtr, SyncSnapshot};
use crate::network::NetworkParams;

const EVENT_NAMESPACE: &str = "grant";
const ACTION_CREATED: &str = "created";
const ACTION_UPDATED: &str = "updated";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcEvent {
    pub id: String,
    pub ledger: u32,
    #[serde(default)]
    pub contract_id: String,
    #[serde(default)]
    pub in_successful_contract_call: Option<bool>,
    #[serde(default)]
    pub topic_json: Vec<Value>,
    #[serde(default)]
    pub value_json: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEventsResult {
    #[serde(default)]
    events: Vec<RpcEvent>,
    latest_ledger: u32,
    #[serde(default)]
    cursor: Option<String>,
}

/// Ledger window the node can still serve events for.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerRange {
    oldest_ledger: u32,
    latest_ledger: u32,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

fn parse_response<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let response: RpcResponse<T> = serde_json::from_slice(body)?;
    if let Some(error) = response.error {
        return Err(SyncError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or_else(|| SyncError::Rpc {
        code: 0,
        message: "response has neither result nor error".into(),
    })
}

fn tagged<'a>(value: &'a Value, tag: &str) -> Option<&'a Value> {
    value.as_object()?.get(tag)
}

fn sc_symbol(value: &Value) -> Option<&str> {
    tagged(value, "symbol")?.as_str()
}

fn sc_string(value: &Value) -> Option<&str> {
    tagged(value, "string")?.as_str()
}

fn sc_address(value: &Value) -> Option<&str> {
    tagged(value, "address")?.as_str()
}

/// 64-bit integers may be rendered as JSON strings.
fn sc_unsigned(value: &Value, tag: &str) -> Option<u64> {
    match tagged(value, tag)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn sc_u32(value: &Value) -> Option<u32> {
    sc_unsigned(value, "u32").and_then(|n| u32::try_from(n).ok())
}

fn sc_u64(value: &Value) -> Option<u64> {
    sc_unsigned(value, "u64")
}

/// Looks up a field of a `#[contracttype]` struct encoded as an ScVal map.
fn sc_field<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    tagged(value, "map")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("key").and_then(sc_symbol) == Some(field))?
        .get("val")
}

fn grant_from_scval(event_id: &str, value: &Value) -> Result<Grant> {
    let field = |name: &str| {
        sc_field(value, name).ok_or_else(|| SyncError::decode(event_id, format!("missing field `{name}`")))
    };
    let invalid = |name: &str| SyncError::decode(event_id, format!("invalid field `{name}`"));

    let meta_ptr = field("meta_ptr")?;
    let meta_field = |name: &str| {
        sc_field(meta_ptr, name)
            .ok_or_else(|| SyncError::decode(event_id, format!("missing field `meta_ptr.{name}`")))
    };

    Ok(Grant {
        id: sc_u32(field("id")?).ok_or_else(|| invalid("id"))?,
        owner: sc_address(field("owner")?)
            .ok_or_else(|| invalid("owner"))?
            .to_string(),
        payee: sc_address(field("payee")?)
            .ok_or_else(|| invalid("payee"))?
            .to_string(),
        meta_ptr: MetaPtr {
            protocol: sc_u32(meta_field("protocol")?).ok_or_else(|| invalid("meta_ptr.protocol"))?,
            pointer: sc_string(meta_field("pointer")?)
                .ok_or_else(|| invalid("meta_ptr.pointer"))?
                .to_string(),
        },
        created_at: sc_u64(field("created_at")?).ok_or_else(|| invalid("created_at"))?,
        last_updated: sc_u64(field("last_updated")?).ok_or_else(|| invalid("last_updated"))?,
    })
}

/// Decodes a registry `("grant", "created" | "updated", id)` event.
/// Returns `Ok(None)` for events that are not grant events or that belong
/// to a reverted call.
pub fn decode_grant_event(event: &RpcEvent) -> Result<Option<Grant>> {
    if event.in_successful_contract_call == Some(false) {
        return Ok(None);
    }
    let [namespace, action, id, ..] = event.topic_json.as_slice() else {
        return Ok(None);
    };
    if sc_symbol(namespace) != Some(EVENT_NAMESPACE) {
        return Ok(None);
    }
    match sc_symbol(action) {
        Some(ACTION_CREATED) | Some(ACTION_UPDATED) => {}
        _ => return Ok(None),
    }

    let topic_id = sc_u32(id).ok_or_else(|| SyncError::decode(&event.id, "grant id topic is not a u32"))?;
    let grant = grant_from_scval(&event.id, &event.value_json)?;
    if grant.id != topic_id {
        return Err(SyncError::decode(
            &event.id,
            format!("topic id {topic_id} does not match record id {}", grant.id),
        ));
    }
    Ok(Some(grant))
}

/// Grant source that reads registry events straight from an RPC node.
pub struct RpcSource {
    transport: Box<dyn JsonTransport>,
    url: String,
    contract_id: String,
    start_ledger: u32,
    page_size: u32,
}

impl RpcSource {
    pub fn new(network: &NetworkParams, page_size: u32, timeout: std::time::Duration) -> Result<Self> {
        if network.registry_contract.is_empty() {
            return Err(SyncError::Config(format!(
                "no registry contract configured for chain `{}`",
                network.chain_id
            )));
        }
        Ok(Self {
            transport: Box::new(HttpTransport::new(timeout)?),
            url: network.rpc_url.clone(),
            contract_id: network.registry_contract.clone(),
            start_ledger: network.start_ledger,
            page_size,
        })
    }

    fn request_body(&self, start_ledger: u32, cursor: Option<&str>) -> Value {
        let mut pagination = json!({ "limit": self.page_size });
        let mut params = json!({
            "filters": [{ "type": "contract", "contractIds": [self.contract_id] }],
            "xdrFormat": "json",
        });
        // the node rejects startLedger together with a cursor
        match cursor {
            Some(cursor) => pagination["cursor"] = json!(cursor),
            None => params["startLedger"] = json!(start_ledger),
        }
        params["pagination"] = pagination;
        rpc_request("getEvents", params)
    }

    async fn call<T: DeserializeOwned>(&self, body: Value) -> Result<T> {
        let bytes = self.transport.post(&self.url, &body).await?;
        parse_response(&bytes)
    }

    async fn ledger_range(&self) -> Result<LedgerRange> {
        self.call(rpc_request("getHealth", Value::Null)).await
    }

    async fn get_events(&self, start_ledger: u32, cursor: Option<&str>) -> Result<GetEventsResult> {
        self.call(self.request_body(start_ledger, cursor)).await
    }
}

fn rpc_request(method: &str, params: Value) -> Value {
    let mut request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
    });
    if !params.is_null() {
        request["params"] = params;
    }
    request
}

#[async_trait]
impl GrantSource for RpcSource {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn fetch_since(&self, since: &SyncSnapshot) -> Result<FetchResult> {
        let mut start_ledger = since
            .last_ledger
            .saturating_add(1)
            .max(self.start_ledger)
            .max(1);
        let mut result = FetchResult {
            grants: Vec::new(),
            latest_ledger: since.last_ledger,
        };

        // getEvents rejects a startLedger outside the node's retention window
        let range = self.ledger_range().await?;
        result.latest_ledger = result.latest_ledger.max(range.latest_ledger);
        if start_ledger > range.latest_ledger {
            tracing::debug!(start_ledger, latest_ledger = range.latest_ledger, "no new ledgers");
            return Ok(result);
        }
        if start_ledger < range.oldest_ledger {
            if since.last_ledger > 0 || self.start_ledger > 0 {
                tracing::warn!(
                    requested = start_ledger,
                    oldest_ledger = range.oldest_ledger,
                    "start ledger is older than the rpc retention window; earlier events are skipped"
                );
            }
            start_ledger = range.oldest_ledger;
        }

        let mut cursor: Option<String> = None;
        loop {
            let page = self.get_events(start_ledger, cursor.as_deref()).await?;
            result.latest_ledger = result.latest_ledger.max(page.latest_ledger);
            let count = page.events.len();
            tracing::debug!(start_ledger, count, cursor = ?cursor, "rpc events page");
            for event in &page.events {
                if let Some(grant) = decode_grant_event(event)? {
                    result.grants.push(grant);
                }
            }
            match page.cursor {
                Some(next) if count >= self.page_size as usize => cursor = Some(next),
                _ => break,
            }
        }
        Ok(result)
    }
}
