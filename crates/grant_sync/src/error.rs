use thiserror::Error;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("subgraph returned errors: {0}")]
    GraphQl(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed grant event {event_id}: {reason}")]
    Decode { event_id: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no grant source available for chain `{chain_id}`")]
    NoSource { chain_id: String },
}

impl SyncError {
    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn decode(event_id: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            event_id: event_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
