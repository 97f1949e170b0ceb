//! pumpwatch: watches one pump.fun mint for large buys and sells a fixed
//! share of the holder's balance into them.
//!
//! Data flow:
//!
//! ```text
//! Orchestrator ─► EventMonitor (poll every tick)
//!                   ├─ EndpointPool / LedgerClient   (signatures, details)
//!                   ├─ ParsingService                (optional enrichment)
//!                   ├─ SeenSignatures + Classifier   (dedup, buy/sell/activity)
//!                   └─ ReactionRequest ──► reaction dispatcher
//!                                            ├─ BalanceTracker (read)
//!                                            └─ ReactionExecutor (write)
//! every stage ──► PresentationSink (log / dashboard / no-op)
//! ```

pub mod balance;
pub mod config;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod parser;
pub mod pump;
pub mod rpc;
pub mod sink;

pub use balance::BalanceTracker;
pub use config::{Config, ConfigError};
pub use executor::{ExecutionGuard, ReactionExecutor, ReactionOutcome, TransactionSubmitter};
pub use monitor::{EventMonitor, MonitorState};
pub use orchestrator::{OperatorCommand, Orchestrator, Services};
pub use rpc::{Endpoint, EndpointPool, LedgerClient, LedgerConnector, ProviderError};
pub use sink::{PresentationSink, SinkEvent};

/// Lamports per SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports (signed delta) into SOL.
pub fn lamports_to_sol(lamports: i128) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Helper to get current Unix timestamp
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
