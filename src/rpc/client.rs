use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use solana_account_decoder_client_types::token::UiTokenAmount;
use solana_pubkey::Pubkey;

use super::endpoint_pool::{lock_pool, Endpoint, SharedEndpointPool};
use super::types::{
    ProviderError, RpcBlockhash, RpcEnvelope, RpcSignatureStatus, RpcSimulation, RpcTransaction,
    SignatureInfo, WithContext,
};
use crate::parser::schema::{from_rpc_transaction, ParsedTransaction};

/// Read access to the ledger data provider.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Provider URL, for logs.
    fn endpoint(&self) -> &str;

    /// Most recent signatures touching `address`, newest first.
    async fn recent_signatures(&self, address: &Pubkey, limit: usize) -> Result<Vec<SignatureInfo>, ProviderError>;

    /// Full detail for one signature. `Ok(None)` when the provider does not
    /// (yet) know the transaction.
    async fn transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>, ProviderError>;

    /// Raw token amount held by `token_account`.
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, ProviderError>;
}

/// Builds a client bound to one endpoint; used again after every rotation.
pub trait LedgerConnector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Arc<dyn LedgerClient>;
}

/// JSON-RPC over HTTP.
pub struct RpcLedgerClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("⚠️  Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            http,
            url: endpoint.rpc_url.clone(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Network(format!("{} returned HTTP {}", method, status)));
        }

        let text = response.text().await?;
        let envelope: RpcEnvelope<T> = serde_json::from_str(&text)?;

        if let Some(error) = envelope.error {
            return Err(ProviderError::from_rpc_error(error.code, &error.message));
        }

        Ok(envelope.result)
    }

    pub async fn latest_blockhash(&self) -> Result<RpcBlockhash, ProviderError> {
        let result: Option<WithContext<RpcBlockhash>> = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;
        result
            .map(|r| r.value)
            .ok_or_else(|| ProviderError::Malformed("getLatestBlockhash returned null".to_string()))
    }

    /// Broadcast a base64-encoded signed transaction; returns its signature.
    pub async fn send_transaction(&self, encoded: &str) -> Result<String, ProviderError> {
        let result: Option<String> = self
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": "base64", "skipPreflight": false, "preflightCommitment": "confirmed" }]),
            )
            .await?;
        result.ok_or_else(|| ProviderError::Malformed("sendTransaction returned null".to_string()))
    }

    pub async fn simulate_transaction(&self, encoded: &str) -> Result<RpcSimulation, ProviderError> {
        let result: Option<WithContext<RpcSimulation>> = self
            .call(
                "simulateTransaction",
                json!([encoded, { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;
        result
            .map(|r| r.value)
            .ok_or_else(|| ProviderError::Malformed("simulateTransaction returned null".to_string()))
    }

    pub async fn signature_status(&self, signature: &str) -> Result<Option<RpcSignatureStatus>, ProviderError> {
        let result: Option<WithContext<Vec<Option<RpcSignatureStatus>>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(result.and_then(|r| r.value.into_iter().next().flatten()))
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn recent_signatures(&self, address: &Pubkey, limit: usize) -> Result<Vec<SignatureInfo>, ProviderError> {
        let result: Option<Vec<SignatureInfo>> = self
            .call(
                "getSignaturesForAddress",
                json!([address.to_string(), { "limit": limit, "commitment": "confirmed" }]),
            )
            .await?;
        Ok(result.unwrap_or_default())
    }

    async fn transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>, ProviderError> {
        let result: Option<RpcTransaction> = self
            .call(
                "getTransaction",
                json!([signature, {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0
                }]),
            )
            .await?;
        Ok(result.map(|raw| from_rpc_transaction(signature, &raw)))
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, ProviderError> {
        let result: Option<WithContext<UiTokenAmount>> = self
            .call(
                "getTokenAccountBalance",
                json!([token_account.to_string(), { "commitment": "confirmed" }]),
            )
            .await?;

        let amount = result
            .ok_or_else(|| ProviderError::AccountNotFound(token_account.to_string()))?
            .value
            .amount;
        amount
            .parse::<u64>()
            .map_err(|_| ProviderError::Malformed(format!("token amount '{}' is not an integer", amount)))
    }
}

/// Default connector: one `RpcLedgerClient` per endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcConnector;

impl LedgerConnector for RpcConnector {
    fn connect(&self, endpoint: &Endpoint) -> Arc<dyn LedgerClient> {
        Arc::new(RpcLedgerClient::new(endpoint))
    }
}

/// `LedgerClient` that always talks to the pool's active endpoint and feeds
/// the pool with the outcome of every call. Used by the reaction path, which
/// lives longer than any single endpoint.
pub struct PooledClient {
    pool: SharedEndpointPool,
    connector: Arc<dyn LedgerConnector>,
    cached: Mutex<Option<(Endpoint, Arc<dyn LedgerClient>)>>,
    label: String,
}

impl PooledClient {
    pub fn new(pool: SharedEndpointPool, connector: Arc<dyn LedgerConnector>) -> Self {
        Self {
            pool,
            connector,
            cached: Mutex::new(None),
            label: "pooled".to_string(),
        }
    }

    fn active(&self) -> (Endpoint, Arc<dyn LedgerClient>) {
        let endpoint = lock_pool(&self.pool).current().clone();
        let mut cached = self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match cached.as_ref() {
            Some((bound, client)) if *bound == endpoint => (endpoint, client.clone()),
            _ => {
                let client = self.connector.connect(&endpoint);
                *cached = Some((endpoint.clone(), client.clone()));
                (endpoint, client)
            }
        }
    }

    fn observe<T>(&self, used: &Endpoint, result: &Result<T, ProviderError>) {
        lock_pool(&self.pool).record_outcome(used, result.as_ref().err());
    }
}

#[async_trait]
impl LedgerClient for PooledClient {
    fn endpoint(&self) -> &str {
        &self.label
    }

    async fn recent_signatures(&self, address: &Pubkey, limit: usize) -> Result<Vec<SignatureInfo>, ProviderError> {
        let (endpoint, client) = self.active();
        let result = client.recent_signatures(address, limit).await;
        self.observe(&endpoint, &result);
        result
    }

    async fn transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>, ProviderError> {
        let (endpoint, client) = self.active();
        let result = client.transaction(signature).await;
        self.observe(&endpoint, &result);
        result
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, ProviderError> {
        let (endpoint, client) = self.active();
        let result = client.token_balance(token_account).await;
        self.observe(&endpoint, &result);
        result
    }
}
