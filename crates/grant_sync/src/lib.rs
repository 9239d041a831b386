//! Off-chain grant synchronizer.
//!
//! Keeps a local cache of grant registry records up to date from a
//! subgraph, falling back to an RPC event scan, and filters the result
//! against the round whitelist.

pub mod cache;
pub mod config;
pub mod error;
pub mod grant;
pub mod network;
pub mod source;
pub mod sync;
pub mod whitelist;

pub use cache::GrantCache;
pub use config::Config;
pub use error::{Result, SyncError};
pub use grant::{merge, Grant, GrantMap, MetaPtr, SyncSnapshot};
pub use sync::{SyncOutcome, Synchronizer};
