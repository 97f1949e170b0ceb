//! Transaction parsing service client
//!
//! The parsing service turns a batch of signatures into structured summaries
//! (native transfers, token transfers, declared type). It is optional and
//! may be unreachable; callers degrade instead of failing when it is.

pub mod schema;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

pub use schema::{NativeBalanceChange, NativeTransfer, ParsedTransaction, TokenTransfer};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParserError {
    #[error("parsing service unavailable: {0}")]
    Unavailable(String),
    #[error("parsing service returned malformed payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ParsingService: Send + Sync {
    /// Parse a batch of signatures. Entries the service could not parse are
    /// simply absent from the result.
    async fn parse_transactions(&self, signatures: &[String]) -> Result<Vec<ParsedTransaction>, ParserError>;
}

/// Enhanced-transactions HTTP API client.
pub struct HttpParsingService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpParsingService {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, ParserError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ParserError::Unavailable(e.to_string()))?;

        let base = base_url.trim_end_matches('/');
        let endpoint = match api_key {
            Some(key) => format!("{}/v0/transactions?api-key={}", base, key),
            None => format!("{}/v0/transactions", base),
        };

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ParsingService for HttpParsingService {
    async fn parse_transactions(&self, signatures: &[String]) -> Result<Vec<ParsedTransaction>, ParserError> {
        if signatures.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "transactions": signatures }))
            .send()
            .await
            .map_err(|e| ParserError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ParserError::Unavailable(format!(
                "parsing service HTTP {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ParserError::Malformed(e.to_string()))?;

        parse_batch_payload(payload)
    }
}

/// Map a whole batch response. A non-array body is malformed; individual
/// bad entries are skipped.
pub fn parse_batch_payload(payload: Value) -> Result<Vec<ParsedTransaction>, ParserError> {
    match payload {
        Value::Array(entries) => Ok(entries
            .into_iter()
            .filter_map(schema::from_enhanced_value)
            .collect()),
        other => Err(ParserError::Malformed(format!(
            "expected array, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
