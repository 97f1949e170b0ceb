use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Doubling delay between status polls, bounded by a total time budget.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    budget: Duration,
    started: Instant,
    current_attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted;

impl std::fmt::Display for BudgetExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Wait budget exhausted")
    }
}

impl std::error::Error for BudgetExhausted {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, budget: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            budget,
            started: Instant::now(),
            current_attempt: 0,
        }
    }

    /// Next delay, before clipping to the remaining budget.
    pub fn next_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.current_attempt.min(16));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    /// Sleep for the next delay; `Err` once the budget is spent.
    pub async fn sleep(&mut self) -> Result<(), BudgetExhausted> {
        let remaining = self.budget.saturating_sub(self.started.elapsed());
        if remaining.is_zero() {
            return Err(BudgetExhausted);
        }

        let delay = std::cmp::min(self.next_delay(), remaining);
        log::debug!("⏳ Poll attempt {} in {:?}", self.current_attempt + 1, delay);

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_up_to_max() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(500),
            Duration::from_secs(4),
            Duration::from_secs(30),
        );
        let mut delays = Vec::new();
        for _ in 0..6 {
            delays.push(backoff.next_delay());
            backoff.current_attempt += 1;
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_bounds_total_wait() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(4),
            Duration::from_secs(10),
        );
        let start = Instant::now();
        while backoff.sleep().await.is_ok() {}

        // 1 + 2 + 4 + 3 (clipped) = 10
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(backoff.attempts(), 4);
    }
}
