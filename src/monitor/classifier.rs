//! Buy / sell / activity classification from native balance deltas
//!
//! Heuristic, not an oracle:
//! 1. The transaction must invoke the pump.fun program, otherwise `Unknown`.
//! 2. Venue flow = lamport delta of the bonding curve (activity account).
//!    When the curve is not among the changed accounts, fall back to the
//!    trader: fee payer's delta, else the largest absolute delta, negated.
//! 3. Inflow to the venue = BUY, outflow = SELL, |flow| is the value.
//! 4. Values under the dust floor, failed transactions and transactions
//!    without native movement are plain `Activity`.
//!
//! Batched or multi-venue transactions can be misattributed; the curve
//! delta is only the net of everything the transaction did to that account.

use std::collections::HashMap;

use solana_pubkey::Pubkey;

use crate::parser::ParsedTransaction;
use crate::pump::PUMP_PROGRAM_ID;
use crate::{current_timestamp, lamports_to_sol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Buy,
    Sell,
    Activity,
    Unknown,
}

impl From<EventKind> for &'static str {
    fn from(kind: EventKind) -> &'static str {
        match kind {
            EventKind::Buy => "BUY",
            EventKind::Sell => "SELL",
            EventKind::Activity => "ACTIVITY",
            EventKind::Unknown => "UNKNOWN",
        }
    }
}

/// One observed transaction after classification. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub signature: String,
    pub kind: EventKind,
    /// Value in SOL (absolute).
    pub value_sol: f64,
    pub description: String,
    pub timestamp: i64,
}

impl ClassifiedEvent {
    /// Degraded notice when no detail could be obtained.
    pub fn observed(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            kind: EventKind::Unknown,
            value_sol: 0.0,
            description: "transaction observed".to_string(),
            timestamp: current_timestamp(),
        }
    }

    pub fn is_buy_at_least(&self, threshold_sol: f64) -> bool {
        self.kind == EventKind::Buy && self.value_sol >= threshold_sol
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    program_id: String,
    mint: String,
    activity_account: Option<String>,
    dust_floor_sol: f64,
}

impl Classifier {
    pub fn new(mint: &Pubkey, activity_account: Option<&Pubkey>, dust_floor_sol: f64) -> Self {
        Self {
            program_id: PUMP_PROGRAM_ID.to_string(),
            mint: mint.to_string(),
            activity_account: activity_account.map(|a| a.to_string()),
            dust_floor_sol,
        }
    }

    pub fn classify(&self, tx: &ParsedTransaction) -> ClassifiedEvent {
        let timestamp = tx.timestamp.unwrap_or_else(current_timestamp);
        let event = |kind: EventKind, value_sol: f64, description: String| ClassifiedEvent {
            signature: tx.signature.clone(),
            kind,
            value_sol,
            description,
            timestamp,
        };

        if !tx.invokes(&self.program_id) {
            return event(EventKind::Unknown, 0.0, "no pump.fun instruction".to_string());
        }

        if tx.failed {
            return event(EventKind::Activity, 0.0, "failed transaction".to_string());
        }

        let net = tx.net_native_changes();
        let flow = match self.venue_flow(&net, tx) {
            Some(flow) if flow != 0 => flow,
            _ => return event(EventKind::Activity, 0.0, "no native movement".to_string()),
        };

        let value_sol = lamports_to_sol(flow.abs());
        if value_sol < self.dust_floor_sol {
            return event(
                EventKind::Activity,
                value_sol,
                format!("{:.6} SOL below dust floor", value_sol),
            );
        }

        let kind = if flow > 0 { EventKind::Buy } else { EventKind::Sell };
        let label: &'static str = kind.into();
        let description = match tx.fee_payer.as_deref() {
            Some(trader) => {
                let tokens = tx.net_token_change(&self.mint, trader);
                if tokens != 0.0 {
                    format!("{} {:.4} SOL ({:+.2} tokens) by {}", label, value_sol, tokens, trader)
                } else {
                    format!("{} {:.4} SOL by {}", label, value_sol, trader)
                }
            }
            None => format!("{} {:.4} SOL", label, value_sol),
        };

        event(kind, value_sol, description)
    }

    /// Lamports flowing INTO the venue (negative = out of the venue).
    fn venue_flow(&self, net: &HashMap<String, i128>, tx: &ParsedTransaction) -> Option<i128> {
        if let Some(curve) = &self.activity_account {
            if let Some(delta) = net.get(curve).filter(|d| **d != 0) {
                return Some(*delta);
            }
        }

        let trader_delta = tx
            .fee_payer
            .as_ref()
            .and_then(|payer| net.get(payer).copied())
            .filter(|d| *d != 0)
            .or_else(|| find_user_delta(net))?;

        Some(-trader_delta)
    }
}

/// Largest absolute lamport change, typically the trading wallet.
fn find_user_delta(net: &HashMap<String, i128>) -> Option<i128> {
    net.values().copied().filter(|d| *d != 0).max_by_key(|d| d.abs())
}
