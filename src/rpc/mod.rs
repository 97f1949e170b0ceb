//! Ledger data provider access
//!
//! - `endpoint_pool` - ordered provider endpoints with strike/cooldown rotation
//! - `client` - `LedgerClient` trait and its JSON-RPC implementation
//! - `types` - JSON-RPC wire schemas and `ProviderError`

pub mod client;
pub mod endpoint_pool;
pub mod types;

pub use client::{LedgerClient, LedgerConnector, PooledClient, RpcConnector, RpcLedgerClient};
pub use endpoint_pool::{lock_pool, Endpoint, EndpointPool, FailureKind, Rotation, SharedEndpointPool};
pub use types::{ProviderError, SignatureInfo};
