//! JSON-RPC wire schemas
//!
//! Every struct defaults missing fields so a provider that omits or adds
//! fields never turns into a hard fault; only structurally wrong payloads
//! surface as `ProviderError::Malformed`.

use serde::Deserialize;
use serde_json::Value;
use solana_account_decoder_client_types::token::UiTokenAmount;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }

    /// Classify a JSON-RPC error object.
    pub fn from_rpc_error(code: i64, message: &str) -> Self {
        let lower = message.to_lowercase();
        if code == 429
            || code == -32005
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            ProviderError::RateLimited
        } else if lower.contains("could not find account") || lower.contains("account not found") {
            ProviderError::AccountNotFound(message.to_string())
        } else {
            ProviderError::Rpc {
                code,
                message: message.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            ProviderError::RateLimited
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// `{ "context": {...}, "value": T }` wrapper used by most account methods.
#[derive(Debug, Deserialize)]
pub struct WithContext<T> {
    pub value: T,
}

/// One entry of `getSignaturesForAddress`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
}

impl SignatureInfo {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            slot: 0,
            err: None,
            block_time: None,
        }
    }
}

/// `getTransaction` with `jsonParsed` encoding.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransaction {
    pub block_time: Option<i64>,
    pub meta: Option<RpcTransactionMeta>,
    pub transaction: RpcTransactionBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransactionMeta {
    pub err: Option<Value>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub inner_instructions: Option<Vec<RpcInnerInstructions>>,
    pub pre_token_balances: Option<Vec<RpcTokenBalance>>,
    pub post_token_balances: Option<Vec<RpcTokenBalance>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransactionBody {
    pub signatures: Vec<String>,
    pub message: RpcMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcMessage {
    pub account_keys: Vec<RpcAccountKey>,
    pub instructions: Vec<RpcInstruction>,
}

/// `jsonParsed` returns objects; plain `json` returns bare strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RpcAccountKey {
    Parsed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
        #[serde(default)]
        writable: bool,
    },
    Plain(String),
}

impl RpcAccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            RpcAccountKey::Parsed { pubkey, .. } => pubkey,
            RpcAccountKey::Plain(pubkey) => pubkey,
        }
    }

    pub fn is_signer(&self) -> bool {
        matches!(self, RpcAccountKey::Parsed { signer: true, .. })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcInstruction {
    pub program_id: Option<String>,
    pub program_id_index: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RpcInnerInstructions {
    pub index: usize,
    pub instructions: Vec<RpcInstruction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockhash {
    pub blockhash: String,
    #[serde(default)]
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcSignatureStatus {
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl RpcSignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RpcSimulation {
    pub err: Option<Value>,
    pub logs: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_limit_detection() {
        assert!(ProviderError::from_rpc_error(429, "Too Many Requests").is_rate_limited());
        assert!(ProviderError::from_rpc_error(-32005, "Node is behind").is_rate_limited());
        assert!(ProviderError::from_rpc_error(-32000, "Rate limit exceeded").is_rate_limited());
        assert!(!ProviderError::from_rpc_error(-32602, "Invalid params").is_rate_limited());
    }

    #[test]
    fn test_account_not_found_detection() {
        let err = ProviderError::from_rpc_error(
            -32602,
            "Invalid param: could not find account",
        );
        assert!(matches!(err, ProviderError::AccountNotFound(_)));
    }

    #[test]
    fn test_transaction_missing_fields_default() {
        let raw: RpcTransaction = serde_json::from_value(json!({
            "transaction": { "message": { "accountKeys": ["A", {"pubkey": "B", "signer": true}] } }
        }))
        .unwrap();

        assert!(raw.meta.is_none());
        assert_eq!(raw.transaction.message.account_keys.len(), 2);
        assert_eq!(raw.transaction.message.account_keys[0].pubkey(), "A");
        assert!(raw.transaction.message.account_keys[1].is_signer());
        assert!(raw.transaction.message.instructions.is_empty());
    }

    #[test]
    fn test_signature_status_confirmation() {
        let status: RpcSignatureStatus = serde_json::from_value(json!({
            "slot": 10, "confirmations": null, "err": null, "confirmationStatus": "finalized"
        }))
        .unwrap();
        assert!(status.is_confirmed());
    }
}
