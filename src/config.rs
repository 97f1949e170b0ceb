use std::env;
use std::time::Duration;

use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::rpc::Endpoint;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Runtime configuration, validated once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Vec<Endpoint>,
    pub watched_mint: Option<Pubkey>,
    pub buy_threshold_sol: f64,
    pub sell_percentage: f64,
    /// Base58 keypair. `None` only in dry-run mode.
    pub wallet_private_key: Option<String>,
    pub parser_url: Option<String>,
    pub parser_api_key: Option<String>,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub signature_window: usize,
    pub seen_capacity: usize,
    pub dust_floor_sol: f64,
    pub rate_limit_strikes: u32,
    pub rotation_cooldown: Duration,
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: u32,
    pub min_sol_output_lamports: u64,
    pub confirm_timeout: Duration,
    pub dry_run: bool,
    pub rust_log: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Environment variables:
    /// - `RPC_ENDPOINTS` (required, comma-separated)
    /// - `WS_ENDPOINTS` (optional, paired by index with `RPC_ENDPOINTS`)
    /// - `WATCHED_MINT` (optional; the monitor parks until one is set)
    /// - `BUY_THRESHOLD_SOL`, `SELL_PERCENTAGE` (required)
    /// - `WALLET_PRIVATE_KEY` (required unless `DRY_RUN=true`)
    /// - `PARSER_URL`, `PARSER_API_KEY` (optional)
    /// - `POLL_INTERVAL_MS`, `HEARTBEAT_INTERVAL_MS`, `SIGNATURE_WINDOW`, `SEEN_CAPACITY`,
    ///   `DUST_FLOOR_SOL`, `RATE_LIMIT_STRIKES`, `ROTATION_COOLDOWN_SECS`,
    ///   `PRIORITY_FEE_MICRO_LAMPORTS`, `COMPUTE_UNIT_LIMIT`, `MIN_SOL_OUTPUT_LAMPORTS`,
    ///   `CONFIRM_TIMEOUT_SECS`, `DRY_RUN` (optional, with defaults)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_urls = split_list(
            &get("RPC_ENDPOINTS").ok_or_else(|| ConfigError::MissingVariable("RPC_ENDPOINTS".to_string()))?,
        );
        if rpc_urls.is_empty() {
            return Err(ConfigError::InvalidValue(
                "RPC_ENDPOINTS must list at least one URL".to_string(),
            ));
        }
        for url in &rpc_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "RPC endpoint must start with http:// or https://, got {}",
                    url
                )));
            }
        }

        let ws_urls = get("WS_ENDPOINTS").map(|s| split_list(&s)).unwrap_or_default();
        if !ws_urls.is_empty() && ws_urls.len() != rpc_urls.len() {
            return Err(ConfigError::InvalidValue(format!(
                "WS_ENDPOINTS has {} entries but RPC_ENDPOINTS has {}",
                ws_urls.len(),
                rpc_urls.len()
            )));
        }

        let endpoints = rpc_urls
            .iter()
            .enumerate()
            .map(|(idx, rpc)| match ws_urls.get(idx) {
                Some(ws) => Endpoint::new(rpc.clone(), ws.clone()),
                None => Endpoint::from_rpc_url(rpc.clone()),
            })
            .collect();

        let watched_mint = match get("WATCHED_MINT") {
            Some(raw) => Some(raw.parse::<Pubkey>().map_err(|_| {
                ConfigError::InvalidValue(format!("WATCHED_MINT is not a valid address: {}", raw))
            })?),
            None => None,
        };

        let buy_threshold_sol: f64 = required(&get, "BUY_THRESHOLD_SOL")?;
        if !(buy_threshold_sol > 0.0) {
            return Err(ConfigError::InvalidValue(
                "BUY_THRESHOLD_SOL must be greater than 0".to_string(),
            ));
        }

        let sell_percentage: f64 = required(&get, "SELL_PERCENTAGE")?;
        if !(sell_percentage > 0.0 && sell_percentage <= 100.0) {
            return Err(ConfigError::InvalidValue(
                "SELL_PERCENTAGE must be in (0, 100]".to_string(),
            ));
        }

        let dry_run = optional(&get, "DRY_RUN", false)?;
        let wallet_private_key = get("WALLET_PRIVATE_KEY");
        if wallet_private_key.is_none() && !dry_run {
            return Err(ConfigError::MissingVariable("WALLET_PRIVATE_KEY".to_string()));
        }

        let signature_window: usize = optional(&get, "SIGNATURE_WINDOW", 10)?;
        if signature_window == 0 || signature_window > 1000 {
            return Err(ConfigError::InvalidValue(
                "SIGNATURE_WINDOW must be between 1 and 1000".to_string(),
            ));
        }

        let seen_capacity: usize = optional(&get, "SEEN_CAPACITY", 1000)?;
        if seen_capacity < signature_window {
            return Err(ConfigError::InvalidValue(
                "SEEN_CAPACITY must be at least SIGNATURE_WINDOW".to_string(),
            ));
        }

        let rate_limit_strikes: u32 = optional(&get, "RATE_LIMIT_STRIKES", 3)?;
        if rate_limit_strikes == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_STRIKES must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            endpoints,
            watched_mint,
            buy_threshold_sol,
            sell_percentage,
            wallet_private_key,
            parser_url: get("PARSER_URL"),
            parser_api_key: get("PARSER_API_KEY"),
            poll_interval: Duration::from_millis(optional(&get, "POLL_INTERVAL_MS", 10_000)?),
            heartbeat_interval: Duration::from_millis(optional(&get, "HEARTBEAT_INTERVAL_MS", 15_000)?),
            signature_window,
            seen_capacity,
            dust_floor_sol: optional(&get, "DUST_FLOOR_SOL", 0.01)?,
            rate_limit_strikes,
            rotation_cooldown: Duration::from_secs(optional(&get, "ROTATION_COOLDOWN_SECS", 30)?),
            priority_fee_micro_lamports: optional(&get, "PRIORITY_FEE_MICRO_LAMPORTS", 100_000)?,
            compute_unit_limit: optional(&get, "COMPUTE_UNIT_LIMIT", 120_000)?,
            min_sol_output_lamports: optional(&get, "MIN_SOL_OUTPUT_LAMPORTS", 0)?,
            confirm_timeout: Duration::from_secs(optional(&get, "CONFIRM_TIMEOUT_SECS", 30)?),
            dry_run,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required<T, G>(get: &G, key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))?;
    raw.parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} could not be parsed: {}", key, raw)))
}

fn optional<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .to_lowercase()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} could not be parsed: {}", key, raw))),
        None => Ok(default),
    }
}
