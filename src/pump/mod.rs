//! pump.fun program addresses and pure derivations
//!
//! Everything here is deterministic and offline: the same mint always yields
//! the same bonding curve, associated bonding curve and holder token account.

pub mod instruction;

use solana_pubkey::Pubkey;

pub use instruction::{
    compute_unit_limit_instruction, priority_fee_instruction, sell_instruction, SellArgs,
    SELL_DISCRIMINATOR,
};

pub const PUMP_PROGRAM_ID: Pubkey = Pubkey::from_str_const("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_FEE_RECIPIENT: Pubkey = Pubkey::from_str_const("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::from_str_const("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::from_str_const("11111111111111111111111111111111");
pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ComputeBudget111111111111111111111111111111");

const GLOBAL_SEED: &[u8] = b"global";
const BONDING_CURVE_SEED: &[u8] = b"bonding-curve";
const EVENT_AUTHORITY_SEED: &[u8] = b"__event_authority";

/// Accounts the sell instruction needs, all derived from the mint and holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpAccounts {
    pub mint: Pubkey,
    pub global: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub event_authority: Pubkey,
}

impl PumpAccounts {
    /// `None` if any program address cannot be found for these seeds.
    pub fn derive(mint: &Pubkey) -> Option<Self> {
        let bonding_curve = bonding_curve_address(mint)?;
        Some(Self {
            mint: *mint,
            global: Pubkey::try_find_program_address(&[GLOBAL_SEED], &PUMP_PROGRAM_ID)?.0,
            bonding_curve,
            associated_bonding_curve: associated_token_address(&bonding_curve, mint)?,
            event_authority: Pubkey::try_find_program_address(&[EVENT_AUTHORITY_SEED], &PUMP_PROGRAM_ID)?.0,
        })
    }
}

/// Bonding curve PDA of a mint: the account where trading SOL concentrates.
pub fn bonding_curve_address(mint: &Pubkey) -> Option<Pubkey> {
    Pubkey::try_find_program_address(&[BONDING_CURVE_SEED, mint.as_ref()], &PUMP_PROGRAM_ID)
        .map(|(address, _bump)| address)
}

/// Associated token account of `owner` for `mint` (classic token program).
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Option<Pubkey> {
    Pubkey::try_find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn mint() -> Pubkey {
        Pubkey::from_str("So11111111111111111111111111111111111111112").unwrap()
    }

    #[test]
    fn test_derivation_is_stable() {
        let first = PumpAccounts::derive(&mint()).unwrap();
        let second = PumpAccounts::derive(&mint()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_global_and_event_authority_match_known_addresses() {
        let accounts = PumpAccounts::derive(&mint()).unwrap();
        assert_eq!(
            accounts.global.to_string(),
            "4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf"
        );
        assert_eq!(
            accounts.event_authority.to_string(),
            "Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1"
        );
    }

    #[test]
    fn test_different_mints_different_curves() {
        let other = Pubkey::new_from_array([7u8; 32]);
        assert_ne!(bonding_curve_address(&mint()), bonding_curve_address(&other));
    }

    #[test]
    fn test_associated_bonding_curve_is_ata_of_curve() {
        let accounts = PumpAccounts::derive(&mint()).unwrap();
        assert_eq!(
            Some(accounts.associated_bonding_curve),
            associated_token_address(&accounts.bonding_curve, &mint())
        );
    }
}
