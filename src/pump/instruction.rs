use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::Pubkey;

use super::{
    associated_token_address, PumpAccounts, ASSOCIATED_TOKEN_PROGRAM_ID, COMPUTE_BUDGET_PROGRAM_ID,
    PUMP_FEE_RECIPIENT, PUMP_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};

/// Anchor discriminator of `global:sell`.
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

const SET_COMPUTE_UNIT_LIMIT: u8 = 2;
const SET_COMPUTE_UNIT_PRICE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellArgs {
    /// Raw token units to sell.
    pub amount: u64,
    /// Slippage floor in lamports.
    pub min_sol_output: u64,
}

impl SellArgs {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&SELL_DISCRIMINATOR);
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&self.min_sol_output.to_le_bytes());
        data
    }
}

/// pump.fun `sell`. `None` if the holder's token account cannot be derived.
pub fn sell_instruction(accounts: &PumpAccounts, seller: &Pubkey, args: SellArgs) -> Option<Instruction> {
    let associated_user = associated_token_address(seller, &accounts.mint)?;

    let metas = vec![
        AccountMeta::new_readonly(accounts.global, false),
        AccountMeta::new(PUMP_FEE_RECIPIENT, false),
        AccountMeta::new_readonly(accounts.mint, false),
        AccountMeta::new(accounts.bonding_curve, false),
        AccountMeta::new(accounts.associated_bonding_curve, false),
        AccountMeta::new(associated_user, false),
        AccountMeta::new(*seller, true),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(accounts.event_authority, false),
        AccountMeta::new_readonly(PUMP_PROGRAM_ID, false),
    ];

    Some(Instruction::new_with_bytes(PUMP_PROGRAM_ID, &args.encode(), metas))
}

/// Compute-budget `SetComputeUnitPrice` (priority fee, micro-lamports per CU).
pub fn priority_fee_instruction(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(SET_COMPUTE_UNIT_PRICE);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction::new_with_bytes(COMPUTE_BUDGET_PROGRAM_ID, &data, Vec::new())
}

/// Compute-budget `SetComputeUnitLimit`.
pub fn compute_unit_limit_instruction(units: u32) -> Instruction {
    let mut data = Vec::with_capacity(5);
    data.push(SET_COMPUTE_UNIT_LIMIT);
    data.extend_from_slice(&units.to_le_bytes());
    Instruction::new_with_bytes(COMPUTE_BUDGET_PROGRAM_ID, &data, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sell_data_layout() {
        let data = SellArgs {
            amount: 250,
            min_sol_output: 1,
        }
        .encode();

        assert_eq!(data.len(), 24);
        assert_eq!(hex::encode(&data[0..8]), "33e685a4017f83ad");
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 250);
        assert_eq!(u64::from_le_bytes(data[16..24].try_into().unwrap()), 1);
    }

    #[test]
    fn test_sell_accounts() {
        let mint = Pubkey::new_from_array([3u8; 32]);
        let seller = Pubkey::new_from_array([9u8; 32]);
        let accounts = PumpAccounts::derive(&mint).unwrap();

        let ix = sell_instruction(&accounts, &seller, SellArgs { amount: 1, min_sol_output: 0 }).unwrap();

        assert_eq!(ix.program_id, PUMP_PROGRAM_ID);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(ix.accounts[3].pubkey, accounts.bonding_curve);
        assert!(ix.accounts[6].is_signer);
        assert_eq!(ix.accounts[6].pubkey, seller);
        assert_eq!(
            Some(ix.accounts[5].pubkey),
            associated_token_address(&seller, &mint)
        );
    }

    #[test]
    fn test_compute_budget_encoding() {
        let price = priority_fee_instruction(100_000);
        assert_eq!(price.program_id, COMPUTE_BUDGET_PROGRAM_ID);
        assert_eq!(price.data[0], 3);
        assert_eq!(u64::from_le_bytes(price.data[1..9].try_into().unwrap()), 100_000);

        let limit = compute_unit_limit_instruction(120_000);
        assert_eq!(limit.data, [2, 0xC0, 0xD4, 0x01, 0x00]);
    }
}
