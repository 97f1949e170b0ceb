//! Balance Tracker: the holder's quantity of the watched mint

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use solana_pubkey::Pubkey;

use crate::pump::associated_token_address;
use crate::rpc::{LedgerClient, ProviderError};

pub struct BalanceTracker {
    holder: Pubkey,
    mint: Pubkey,
    token_account: Option<Pubkey>,
    client: Arc<dyn LedgerClient>,
    last_balance: AtomicU64,
}

impl BalanceTracker {
    pub fn new(holder: Pubkey, mint: Pubkey, client: Arc<dyn LedgerClient>) -> Self {
        Self {
            holder,
            mint,
            token_account: None,
            client,
            last_balance: AtomicU64::new(0),
        }
    }

    /// Derive and cache the holder's token account. Pure; calling it again
    /// yields the same address.
    pub fn initialize(&mut self) -> Option<Pubkey> {
        if self.token_account.is_none() {
            self.token_account = associated_token_address(&self.holder, &self.mint);
            match self.token_account {
                Some(account) => log::info!("👛 Holder token account for {}: {}", self.mint, account),
                None => log::warn!("⚠️  Could not derive holder token account for {}", self.mint),
            }
        }
        self.token_account
    }

    pub fn token_account(&self) -> Option<Pubkey> {
        self.token_account
    }

    pub fn mint(&self) -> Pubkey {
        self.mint
    }

    /// Current raw token amount. A token account that does not exist yet
    /// means the holder never held the mint: zero, not an error.
    pub async fn get_balance(&self) -> Result<u64, ProviderError> {
        let account = match self.token_account {
            Some(account) => account,
            None => match associated_token_address(&self.holder, &self.mint) {
                Some(account) => account,
                None => return Ok(0),
            },
        };

        let balance = match self.client.token_balance(&account).await {
            Ok(amount) => amount,
            Err(ProviderError::AccountNotFound(_)) => {
                log::debug!("Token account {} does not exist, balance 0", account);
                0
            }
            Err(e) => return Err(e),
        };

        self.last_balance.store(balance, Ordering::Relaxed);
        Ok(balance)
    }

    /// Last balance read by `get_balance` (0 before the first read).
    pub fn last_balance(&self) -> u64 {
        self.last_balance.load(Ordering::Relaxed)
    }

    /// `floor(last_balance * percentage / 100)`.
    pub fn calculate_disposal(&self, percentage: f64) -> u64 {
        disposal_amount(self.last_balance(), percentage)
    }
}

/// `floor(balance * percentage / 100)` in integer math, exact for the
/// percentage as written in decimal (its shortest round-trip form, so
/// `33.333` is 33333/1000 and not the nearest binary fraction). The
/// percentage is clamped to `[0, 100]`.
pub fn disposal_amount(balance: u64, percentage: f64) -> u64 {
    if balance == 0 || !percentage.is_finite() || percentage <= 0.0 {
        return 0;
    }
    if percentage >= 100.0 {
        return balance;
    }

    let Some((numerator, scale)) = decimal_parts(percentage) else {
        return 0;
    };
    // A denominator past u128 dwarfs balance * numerator: the share rounds to 0.
    let Some(denominator) = 10u128.checked_pow(scale).and_then(|d| d.checked_mul(100)) else {
        return 0;
    };
    // numerator < denominator here, so the quotient is below balance.
    (balance as u128)
        .checked_mul(numerator)
        .map(|product| (product / denominator) as u64)
        .unwrap_or(0)
}

/// Split a positive finite value into `numerator / 10^scale`.
fn decimal_parts(value: f64) -> Option<(u128, u32)> {
    // f64 Display never uses exponent notation.
    let text = value.to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let numerator = format!("{}{}", whole, fraction).parse::<u128>().ok()?;
    let scale = u32::try_from(fraction.len()).ok()?;
    Some((numerator, scale))
}
