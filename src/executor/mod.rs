//! Reaction Executor
//!
//! `execute(amount)` sells `amount` raw units of the watched mint:
//! compute-unit limit + priority fee + pump.fun `sell`, signed, submitted,
//! confirmed. One reaction at a time across the whole process
//! (`ExecutionGuard`); a second request while one is in flight is dropped,
//! not queued. Failures come back as `ReactionOutcome::Failed`, never as a
//! panic, and are not retried.

pub mod backoff;
pub mod submitter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use solana_instruction::Instruction;
use solana_pubkey::Pubkey;
use thiserror::Error;

pub use submitter::RpcSubmitter;

use crate::config::Config;
use crate::current_timestamp;
use crate::pump::{
    compute_unit_limit_instruction, priority_fee_instruction, sell_instruction, PumpAccounts, SellArgs,
};
use crate::rpc::ProviderError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("failed to build transaction: {0}")]
    Build(String),
    #[error("failed to sign transaction: {0}")]
    Signing(String),
    #[error("submission rejected: {0}")]
    Submission(String),
    #[error("transaction {signature} failed on-chain: {reason}")]
    TransactionFailed { signature: String, reason: String },
    #[error("transaction {0} not confirmed in time")]
    ConfirmationTimeout(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Signs and lands transactions for the holder wallet.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Fee payer and seller.
    fn payer(&self) -> Pubkey;

    /// Simulated rather than broadcast.
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Sign and submit; returns the transaction signature.
    async fn submit(&self, instructions: Vec<Instruction>) -> Result<String, ExecutionError>;

    /// Wait until `signature` is confirmed or has failed.
    async fn confirm(&self, signature: &str) -> Result<(), ExecutionError>;
}

/// Process-wide single-flight flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    busy: Arc<AtomicBool>,
}

/// Held while a reaction is in flight; clears the guard on drop, on every
/// exit path.
#[derive(Debug)]
pub struct GuardPermit {
    busy: Arc<AtomicBool>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Atomic test-and-set.
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardPermit { busy: self.busy.clone() })
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionReceipt {
    pub signature: String,
    pub amount: u64,
    pub timestamp: i64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing to sell.
    NonPositiveAmount,
    /// Another reaction holds the guard.
    InFlight,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NonPositiveAmount => write!(f, "no tokens to sell"),
            SkipReason::InFlight => write!(f, "another reaction is in flight"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactionOutcome {
    Submitted(ReactionReceipt),
    Skipped(SkipReason),
    Failed { amount: u64, error: ExecutionError },
}

impl ReactionOutcome {
    pub fn signature(&self) -> Option<&str> {
        match self {
            ReactionOutcome::Submitted(receipt) => Some(&receipt.signature),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: u32,
    pub min_sol_output_lamports: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            priority_fee_micro_lamports: 100_000,
            compute_unit_limit: 120_000,
            min_sol_output_lamports: 0,
        }
    }
}

impl ExecutionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            priority_fee_micro_lamports: config.priority_fee_micro_lamports,
            compute_unit_limit: config.compute_unit_limit,
            min_sol_output_lamports: config.min_sol_output_lamports,
        }
    }
}

pub struct ReactionExecutor {
    mint: Pubkey,
    accounts: Option<PumpAccounts>,
    submitter: Arc<dyn TransactionSubmitter>,
    guard: ExecutionGuard,
    settings: ExecutionSettings,
}

impl ReactionExecutor {
    pub fn new(
        mint: Pubkey,
        submitter: Arc<dyn TransactionSubmitter>,
        guard: ExecutionGuard,
        settings: ExecutionSettings,
    ) -> Self {
        let accounts = PumpAccounts::derive(&mint);
        if accounts.is_none() {
            log::warn!("⚠️  pump.fun accounts for {} could not be derived; sells will fail", mint);
        }

        Self {
            mint,
            accounts,
            submitter,
            guard,
            settings,
        }
    }

    pub fn mint(&self) -> Pubkey {
        self.mint
    }

    pub fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    pub async fn execute(&self, amount: u64) -> ReactionOutcome {
        if amount == 0 {
            log::info!("⏭️  Nothing to sell for {}", self.mint);
            return ReactionOutcome::Skipped(SkipReason::NonPositiveAmount);
        }

        let Some(_permit) = self.guard.try_acquire() else {
            log::warn!("⏭️  Sell of {} dropped: another reaction is in flight", amount);
            return ReactionOutcome::Skipped(SkipReason::InFlight);
        };

        log::info!("💸 Selling {} units of {}", amount, self.mint);
        match self.sell(amount).await {
            Ok(signature) => ReactionOutcome::Submitted(ReactionReceipt {
                signature,
                amount,
                timestamp: current_timestamp(),
                dry_run: self.submitter.is_dry_run(),
            }),
            Err(error) => {
                log::error!("❌ Sell of {} units of {} failed: {}", amount, self.mint, error);
                ReactionOutcome::Failed { amount, error }
            }
        }
    }

    async fn sell(&self, amount: u64) -> Result<String, ExecutionError> {
        let instructions = self.build_instructions(amount)?;
        let signature = self.submitter.submit(instructions).await?;
        log::info!("📤 Submitted {}", signature);
        self.submitter.confirm(&signature).await?;
        log::info!("✅ Confirmed {}", signature);
        Ok(signature)
    }

    /// Compute budget first, then the sell.
    pub fn build_instructions(&self, amount: u64) -> Result<Vec<Instruction>, ExecutionError> {
        let accounts = self
            .accounts
            .as_ref()
            .ok_or_else(|| ExecutionError::Build(format!("no pump.fun accounts for {}", self.mint)))?;

        let sell = sell_instruction(
            accounts,
            &self.submitter.payer(),
            SellArgs {
                amount,
                min_sol_output: self.settings.min_sol_output_lamports,
            },
        )
        .ok_or_else(|| ExecutionError::Build("holder token account not derivable".to_string()))?;

        Ok(vec![
            compute_unit_limit_instruction(self.settings.compute_unit_limit),
            priority_fee_instruction(self.settings.priority_fee_micro_lamports),
            sell,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::{COMPUTE_BUDGET_PROGRAM_ID, PUMP_PROGRAM_ID};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct ScriptedSubmitter {
        submit_result: Result<String, ExecutionError>,
        confirm_result: Result<(), ExecutionError>,
        /// When set, `submit` waits for a notification before returning.
        gate: Option<Arc<Notify>>,
        submitted: Mutex<Vec<Vec<Instruction>>>,
    }

    impl ScriptedSubmitter {
        fn ok(signature: &str) -> Self {
            Self {
                submit_result: Ok(signature.to_string()),
                confirm_result: Ok(()),
                gate: None,
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransactionSubmitter for ScriptedSubmitter {
        fn payer(&self) -> Pubkey {
            Pubkey::new_from_array([4u8; 32])
        }

        async fn submit(&self, instructions: Vec<Instruction>) -> Result<String, ExecutionError> {
            self.submitted.lock().unwrap().push(instructions);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.submit_result.clone()
        }

        async fn confirm(&self, _signature: &str) -> Result<(), ExecutionError> {
            self.confirm_result.clone()
        }
    }

    fn executor(submitter: ScriptedSubmitter) -> (ReactionExecutor, Arc<ScriptedSubmitter>) {
        let submitter = Arc::new(submitter);
        let executor = ReactionExecutor::new(
            Pubkey::new_from_array([8u8; 32]),
            submitter.clone(),
            ExecutionGuard::new(),
            ExecutionSettings::default(),
        );
        (executor, submitter)
    }

    #[tokio::test]
    async fn test_successful_sell() {
        let (executor, submitter) = executor(ScriptedSubmitter::ok("5igSig"));

        let outcome = executor.execute(250).await;

        match outcome {
            ReactionOutcome::Submitted(receipt) => {
                assert_eq!(receipt.signature, "5igSig");
                assert_eq!(receipt.amount, 250);
                assert!(!receipt.dry_run);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!executor.guard().is_busy());

        let submitted = submitter.submitted.lock().unwrap();
        let ixs = &submitted[0];
        assert_eq!(ixs.len(), 3);
        assert_eq!(ixs[0].program_id, COMPUTE_BUDGET_PROGRAM_ID);
        assert_eq!(ixs[1].program_id, COMPUTE_BUDGET_PROGRAM_ID);
        assert_eq!(ixs[2].program_id, PUMP_PROGRAM_ID);
        assert_eq!(u64::from_le_bytes(ixs[2].data[8..16].try_into().unwrap()), 250);
    }

    #[tokio::test]
    async fn test_zero_amount_is_noop() {
        let (executor, submitter) = executor(ScriptedSubmitter::ok("sig"));
        assert_eq!(
            executor.execute(0).await,
            ReactionOutcome::Skipped(SkipReason::NonPositiveAmount)
        );
        assert!(submitter.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_releases_guard() {
        let mut scripted = ScriptedSubmitter::ok("sig");
        scripted.submit_result = Err(ExecutionError::Submission("blockhash not found".to_string()));
        let (executor, _) = executor(scripted);

        let outcome = executor.execute(10).await;

        assert!(matches!(outcome, ReactionOutcome::Failed { amount: 10, .. }));
        assert!(!executor.guard().is_busy());
    }

    #[tokio::test]
    async fn test_confirmation_failure_is_reported() {
        let mut scripted = ScriptedSubmitter::ok("sig");
        scripted.confirm_result = Err(ExecutionError::ConfirmationTimeout("sig".to_string()));
        let (executor, _) = executor(scripted);

        match executor.execute(10).await {
            ReactionOutcome::Failed { error, .. } => {
                assert_eq!(error, ExecutionError::ConfirmationTimeout("sig".to_string()))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!executor.guard().is_busy());
    }

    #[tokio::test]
    async fn test_second_call_while_pending_is_dropped() {
        let gate = Arc::new(Notify::new());
        let mut scripted = ScriptedSubmitter::ok("first");
        scripted.gate = Some(gate.clone());
        let (executor, _) = executor(scripted);
        let executor = Arc::new(executor);

        let pending = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(100).await })
        };
        while !executor.guard().is_busy() {
            tokio::task::yield_now().await;
        }

        assert_eq!(executor.execute(50).await, ReactionOutcome::Skipped(SkipReason::InFlight));

        gate.notify_one();
        let first = pending.await.unwrap();
        assert_eq!(first.signature(), Some("first"));
        assert!(!executor.guard().is_busy());
    }

    #[test]
    fn test_guard_shared_between_clones() {
        let guard = ExecutionGuard::new();
        let other = guard.clone();

        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(other.try_acquire().is_none());

        drop(permit);
        assert!(other.try_acquire().is_some());
    }
}
