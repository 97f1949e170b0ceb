//! Strict internal transaction schema
//!
//! Both detail sources (the RPC provider's `getTransaction` and the enhanced
//! parsing service) are mapped into `ParsedTransaction` by pure functions.
//! Unknown or missing fields default to empty rather than failing.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::rpc::types::{RpcInstruction, RpcTokenBalance, RpcTransaction};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTransaction {
    pub signature: String,
    pub timestamp: Option<i64>,
    pub failed: bool,
    /// Type label declared by the parsing service (e.g. `SWAP`), if any.
    pub declared_type: Option<String>,
    pub fee_payer: Option<String>,
    /// Programs invoked by outer and inner instructions, in order, deduplicated.
    pub program_ids: Vec<String>,
    pub native_transfers: Vec<NativeTransfer>,
    pub token_transfers: Vec<TokenTransfer>,
    pub native_balance_changes: Vec<NativeBalanceChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeTransfer {
    pub from: String,
    pub to: String,
    pub lamports: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenTransfer {
    pub from: String,
    pub to: String,
    pub mint: String,
    pub amount: f64,
}

/// Signed lamport delta (post - pre) for one account.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeBalanceChange {
    pub account: String,
    pub lamports: i128,
}

impl ParsedTransaction {
    pub fn invokes(&self, program_id: &str) -> bool {
        self.program_ids.iter().any(|p| p == program_id)
    }

    /// Per-account lamport deltas. Uses explicit balance changes when the
    /// source provided them, otherwise nets the native transfer list.
    pub fn net_native_changes(&self) -> HashMap<String, i128> {
        let mut net: HashMap<String, i128> = HashMap::new();

        if !self.native_balance_changes.is_empty() {
            for change in &self.native_balance_changes {
                *net.entry(change.account.clone()).or_default() += change.lamports;
            }
            return net;
        }

        for transfer in &self.native_transfers {
            *net.entry(transfer.from.clone()).or_default() -= transfer.lamports as i128;
            *net.entry(transfer.to.clone()).or_default() += transfer.lamports as i128;
        }
        net
    }

    /// Net token amount moved into `owner` for `mint` (negative = out).
    pub fn net_token_change(&self, mint: &str, owner: &str) -> f64 {
        self.token_transfers
            .iter()
            .filter(|t| t.mint == mint)
            .map(|t| {
                let mut delta = 0.0;
                if t.to == owner {
                    delta += t.amount;
                }
                if t.from == owner {
                    delta -= t.amount;
                }
                delta
            })
            .sum()
    }
}

fn push_program(program_ids: &mut Vec<String>, program_id: String) {
    if !program_ids.contains(&program_id) {
        program_ids.push(program_id);
    }
}

fn resolve_program(instruction: &RpcInstruction, account_keys: &[String]) -> Option<String> {
    instruction.program_id.clone().or_else(|| {
        instruction
            .program_id_index
            .and_then(|idx| account_keys.get(idx).cloned())
    })
}

/// Map a `getTransaction` (jsonParsed) payload into the internal schema.
pub fn from_rpc_transaction(signature: &str, raw: &RpcTransaction) -> ParsedTransaction {
    let account_keys: Vec<String> = raw
        .transaction
        .message
        .account_keys
        .iter()
        .map(|k| k.pubkey().to_string())
        .collect();

    let mut program_ids = Vec::new();
    for instruction in &raw.transaction.message.instructions {
        if let Some(program) = resolve_program(instruction, &account_keys) {
            push_program(&mut program_ids, program);
        }
    }

    let mut native_balance_changes = Vec::new();
    let mut token_transfers = Vec::new();
    let mut failed = false;

    if let Some(meta) = &raw.meta {
        failed = meta.err.is_some();

        if let Some(groups) = &meta.inner_instructions {
            for group in groups {
                for instruction in &group.instructions {
                    if let Some(program) = resolve_program(instruction, &account_keys) {
                        push_program(&mut program_ids, program);
                    }
                }
            }
        }

        for (idx, (pre, post)) in meta.pre_balances.iter().zip(meta.post_balances.iter()).enumerate() {
            let lamports = (*post as i128) - (*pre as i128);
            if lamports == 0 {
                continue;
            }
            match account_keys.get(idx) {
                Some(account) => native_balance_changes.push(NativeBalanceChange {
                    account: account.clone(),
                    lamports,
                }),
                None => log::warn!(
                    "⚠️  Balance index {} >= account_keys.len() {} in {}",
                    idx,
                    account_keys.len(),
                    signature
                ),
            }
        }

        token_transfers = token_changes_as_transfers(
            meta.pre_token_balances.as_deref().unwrap_or(&[]),
            meta.post_token_balances.as_deref().unwrap_or(&[]),
        );
    }

    ParsedTransaction {
        signature: signature.to_string(),
        timestamp: raw.block_time,
        failed,
        declared_type: None,
        fee_payer: account_keys.first().cloned(),
        program_ids,
        native_transfers: Vec::new(),
        token_transfers,
        native_balance_changes,
    }
}

/// Express token balance deltas as one-sided transfers so the schema has a
/// single token-movement representation. An empty counterparty means
/// "unknown / pool".
fn token_changes_as_transfers(pre: &[RpcTokenBalance], post: &[RpcTokenBalance]) -> Vec<TokenTransfer> {
    let ui = |b: &RpcTokenBalance| b.ui_token_amount.ui_amount.unwrap_or(0.0);
    let mut transfers = Vec::new();

    for before in pre {
        let after = post.iter().find(|p| p.account_index == before.account_index);
        let delta = after.map(ui).unwrap_or(0.0) - ui(before);
        if delta == 0.0 {
            continue;
        }
        transfers.push(one_sided(before, delta));
    }

    for after in post {
        if pre.iter().any(|p| p.account_index == after.account_index) {
            continue;
        }
        let delta = ui(after);
        if delta > 0.0 {
            transfers.push(one_sided(after, delta));
        }
    }

    transfers
}

fn one_sided(balance: &RpcTokenBalance, delta: f64) -> TokenTransfer {
    let owner = balance.owner.clone().unwrap_or_default();
    if delta > 0.0 {
        TokenTransfer {
            from: String::new(),
            to: owner,
            mint: balance.mint.clone(),
            amount: delta,
        }
    } else {
        TokenTransfer {
            from: owner,
            to: String::new(),
            mint: balance.mint.clone(),
            amount: -delta,
        }
    }
}

/// Enhanced-transaction payload as returned by the parsing service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancedTransaction {
    pub signature: String,
    pub timestamp: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub fee_payer: Option<String>,
    pub transaction_error: Option<Value>,
    pub native_transfers: Vec<EnhancedNativeTransfer>,
    pub token_transfers: Vec<EnhancedTokenTransfer>,
    pub account_data: Vec<EnhancedAccountData>,
    pub instructions: Vec<EnhancedInstruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancedNativeTransfer {
    pub from_user_account: Option<String>,
    pub to_user_account: Option<String>,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancedTokenTransfer {
    pub from_user_account: Option<String>,
    pub to_user_account: Option<String>,
    pub mint: String,
    pub token_amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancedAccountData {
    pub account: String,
    pub native_balance_change: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancedInstruction {
    pub program_id: String,
    pub inner_instructions: Vec<EnhancedInstruction>,
}

/// Map one loosely-typed payload entry into the internal schema.
///
/// Returns `None` only when the entry carries no signature at all, because
/// such an entry cannot be attributed to anything we asked for.
pub fn from_enhanced_value(value: Value) -> Option<ParsedTransaction> {
    let enhanced: EnhancedTransaction = match serde_json::from_value(value) {
        Ok(enhanced) => enhanced,
        Err(e) => {
            log::warn!("⚠️  Unparseable enhanced transaction entry: {}", e);
            return None;
        }
    };
    if enhanced.signature.is_empty() {
        return None;
    }
    Some(from_enhanced(enhanced))
}

pub fn from_enhanced(enhanced: EnhancedTransaction) -> ParsedTransaction {
    let mut program_ids = Vec::new();
    for instruction in &enhanced.instructions {
        collect_programs(instruction, &mut program_ids);
    }

    ParsedTransaction {
        signature: enhanced.signature,
        timestamp: enhanced.timestamp,
        failed: enhanced.transaction_error.as_ref().is_some_and(|e| !e.is_null()),
        declared_type: enhanced.kind,
        fee_payer: enhanced.fee_payer,
        program_ids,
        native_transfers: enhanced
            .native_transfers
            .into_iter()
            .map(|t| NativeTransfer {
                from: t.from_user_account.unwrap_or_default(),
                to: t.to_user_account.unwrap_or_default(),
                lamports: t.amount,
            })
            .collect(),
        token_transfers: enhanced
            .token_transfers
            .into_iter()
            .map(|t| TokenTransfer {
                from: t.from_user_account.unwrap_or_default(),
                to: t.to_user_account.unwrap_or_default(),
                mint: t.mint,
                amount: t.token_amount,
            })
            .collect(),
        native_balance_changes: enhanced
            .account_data
            .into_iter()
            .filter(|a| a.native_balance_change != 0)
            .map(|a| NativeBalanceChange {
                account: a.account,
                lamports: a.native_balance_change as i128,
            })
            .collect(),
    }
}

fn collect_programs(instruction: &EnhancedInstruction, out: &mut Vec<String>) {
    if !instruction.program_id.is_empty() {
        push_program(out, instruction.program_id.clone());
    }
    for inner in &instruction.inner_instructions {
        collect_programs(inner, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_mapping_balances_and_programs() {
        let raw: RpcTransaction = serde_json::from_value(json!({
            "blockTime": 1700000000,
            "meta": {
                "err": null,
                "preBalances": [5_000_000_000u64, 1_000_000_000u64, 1],
                "postBalances": [4_499_995_000u64, 1_500_000_000u64, 1],
                "innerInstructions": [
                    { "index": 0, "instructions": [ { "programId": "Inner111" } ] }
                ],
                "preTokenBalances": [],
                "postTokenBalances": [
                    { "accountIndex": 2, "mint": "MintX", "owner": "User",
                      "uiTokenAmount": { "uiAmount": 1000.0, "decimals": 6,
                                         "amount": "1000000000", "uiAmountString": "1000" } }
                ]
            },
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        { "pubkey": "User", "signer": true, "writable": true },
                        { "pubkey": "Curve", "signer": false, "writable": true },
                        { "pubkey": "Pump", "signer": false, "writable": false }
                    ],
                    "instructions": [ { "programId": "Pump", "accounts": [], "data": "" } ]
                }
            }
        }))
        .unwrap();

        let tx = from_rpc_transaction("sig1", &raw);

        assert_eq!(tx.timestamp, Some(1700000000));
        assert!(!tx.failed);
        assert_eq!(tx.program_ids, vec!["Pump".to_string(), "Inner111".to_string()]);
        assert_eq!(tx.fee_payer.as_deref(), Some("User"));

        let net = tx.net_native_changes();
        assert_eq!(net["Curve"], 500_000_000);
        assert_eq!(net["User"], -500_005_000);
        assert!(!net.contains_key("Pump"));

        assert_eq!(tx.net_token_change("MintX", "User"), 1000.0);
    }

    #[test]
    fn test_rpc_mapping_failed_transaction() {
        let raw: RpcTransaction = serde_json::from_value(json!({
            "meta": { "err": { "InstructionError": [0, "Custom"] } },
            "transaction": { "message": {} }
        }))
        .unwrap();
        assert!(from_rpc_transaction("s", &raw).failed);
    }

    #[test]
    fn test_enhanced_mapping_defaults_missing_fields() {
        let tx = from_enhanced_value(json!({ "signature": "abc" })).unwrap();
        assert_eq!(tx.signature, "abc");
        assert!(tx.program_ids.is_empty());
        assert!(tx.native_transfers.is_empty());
        assert!(!tx.failed);
    }

    #[test]
    fn test_enhanced_mapping_without_signature_is_dropped() {
        assert!(from_enhanced_value(json!({ "type": "SWAP" })).is_none());
        assert!(from_enhanced_value(json!("garbage")).is_none());
    }

    #[test]
    fn test_enhanced_mapping_nested_programs_and_transfers() {
        let tx = from_enhanced_value(json!({
            "signature": "sig",
            "type": "SWAP",
            "feePayer": "User",
            "transactionError": null,
            "nativeTransfers": [
                { "fromUserAccount": "User", "toUserAccount": "Curve", "amount": 300_000_000u64 }
            ],
            "tokenTransfers": [
                { "fromUserAccount": "Curve", "toUserAccount": "User", "mint": "MintX", "tokenAmount": 42.5 }
            ],
            "instructions": [
                { "programId": "Compute", "innerInstructions": [] },
                { "programId": "Pump", "innerInstructions": [ { "programId": "Token" } ] }
            ]
        }))
        .unwrap();

        assert_eq!(tx.declared_type.as_deref(), Some("SWAP"));
        assert_eq!(tx.program_ids, vec!["Compute", "Pump", "Token"]);
        assert!(tx.invokes("Pump"));

        let net = tx.net_native_changes();
        assert_eq!(net["Curve"], 300_000_000);
        assert_eq!(net["User"], -300_000_000);
        assert_eq!(tx.net_token_change("MintX", "User"), 42.5);
    }
}
