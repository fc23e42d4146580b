use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
    sysvar,
};
use spl_associated_token_account::ID as ASSOCIATED_TOKEN_PROGRAM_ID;
use spl_token::ID as TOKEN_PROGRAM_ID;

// pump.fun program and its fixed accounts
pub const PUMP_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_GLOBAL: Pubkey = solana_sdk::pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
pub const PUMP_FEE_RECIPIENT: Pubkey = solana_sdk::pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
pub const PUMP_EVENT_AUTHORITY: Pubkey = solana_sdk::pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1");

pub const BUY_DISCRIMINATOR: [u8; 8] = 16927863322537952870u64.to_le_bytes();
pub const SELL_DISCRIMINATOR: [u8; 8] = 12502976635542562355u64.to_le_bytes();

/// Generic Anchor-style instruction: 8-byte discriminator followed by
/// little-endian `u64` fields, over an ordered account list.
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    program_id: Pubkey,
    discriminator: [u8; 8],
    fields: Vec<u64>,
    accounts: Vec<AccountMeta>,
}

impl InstructionBuilder {
    pub fn new(program_id: Pubkey, discriminator: [u8; 8]) -> Self {
        Self {
            program_id,
            discriminator,
            fields: Vec::new(),
            accounts: Vec::new(),
        }
    }

    pub fn field(mut self, value: u64) -> Self {
        self.fields.push(value);
        self
    }

    pub fn accounts(mut self, accounts: impl IntoIterator<Item = AccountMeta>) -> Self {
        self.accounts.extend(accounts);
        self
    }

    pub fn build(self) -> Instruction {
        let mut data = Vec::with_capacity(8 + self.fields.len() * 8);
        data.extend_from_slice(&self.discriminator);
        for field in &self.fields {
            data.extend_from_slice(&field.to_le_bytes());
        }

        Instruction {
            program_id: self.program_id,
            accounts: self.accounts,
            data,
        }
    }
}

/// Accounts that vary per trade.
#[derive(Debug, Clone, Copy)]
pub struct TradeAccounts {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub user_token_account: Pubkey,
    pub user: Pubkey,
}

/// Buy `token_amount` raw units paying at most `max_sol_cost` lamports.
pub fn buy_instruction(accounts: &TradeAccounts, token_amount: u64, max_sol_cost: u64) -> Instruction {
    InstructionBuilder::new(PUMP_PROGRAM_ID, BUY_DISCRIMINATOR)
        .field(token_amount)
        .field(max_sol_cost)
        .accounts(trade_account_metas(accounts, [
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ]))
        .build()
}

/// Sell `token_amount` raw units receiving at least `min_sol_output` lamports.
pub fn sell_instruction(accounts: &TradeAccounts, token_amount: u64, min_sol_output: u64) -> Instruction {
    InstructionBuilder::new(PUMP_PROGRAM_ID, SELL_DISCRIMINATOR)
        .field(token_amount)
        .field(min_sol_output)
        .accounts(trade_account_metas(accounts, [
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ]))
        .build()
}

// Both sides share the first seven and last two accounts; only the three
// program/sysvar slots in between differ.
fn trade_account_metas(accounts: &TradeAccounts, programs: [AccountMeta; 3]) -> Vec<AccountMeta> {
    let mut metas = vec![
        AccountMeta::new_readonly(PUMP_GLOBAL, false),
        AccountMeta::new(PUMP_FEE_RECIPIENT, false),
        AccountMeta::new_readonly(accounts.mint, false),
        AccountMeta::new(accounts.bonding_curve, false),
        AccountMeta::new(accounts.associated_bonding_curve, false),
        AccountMeta::new(accounts.user_token_account, false),
        AccountMeta::new(accounts.user, true),
    ];
    metas.extend(programs);
    metas.push(AccountMeta::new_readonly(PUMP_EVENT_AUTHORITY, false));
    metas.push(AccountMeta::new_readonly(PUMP_PROGRAM_ID, false));
    metas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> TradeAccounts {
        TradeAccounts {
            mint: Pubkey::new_unique(),
            bonding_curve: Pubkey::new_unique(),
            associated_bonding_curve: Pubkey::new_unique(),
            user_token_account: Pubkey::new_unique(),
            user: Pubkey::new_unique(),
        }
    }

    #[test]
    fn buy_payload_layout() {
        let ix = buy_instruction(&accounts(), 1_234, 5_678);
        assert_eq!(ix.program_id, PUMP_PROGRAM_ID);
        assert_eq!(ix.data.len(), 24);
        assert_eq!(&ix.data[..8], &[102, 6, 61, 18, 1, 218, 235, 234]);
        assert_eq!(&ix.data[8..16], &1_234u64.to_le_bytes());
        assert_eq!(&ix.data[16..], &5_678u64.to_le_bytes());
    }

    #[test]
    fn sell_payload_layout() {
        let ix = sell_instruction(&accounts(), 42, 7);
        assert_eq!(&ix.data[..8], &[51, 230, 133, 164, 1, 127, 131, 173]);
        assert_eq!(&ix.data[8..16], &42u64.to_le_bytes());
        assert_eq!(&ix.data[16..], &7u64.to_le_bytes());
    }

    #[test]
    fn buy_account_order() {
        let acc = accounts();
        let ix = buy_instruction(&acc, 1, 1);
        let keys: Vec<Pubkey> = ix.accounts.iter().map(|m| m.pubkey).collect();
        assert_eq!(keys, vec![
            PUMP_GLOBAL,
            PUMP_FEE_RECIPIENT,
            acc.mint,
            acc.bonding_curve,
            acc.associated_bonding_curve,
            acc.user_token_account,
            acc.user,
            system_program::ID,
            TOKEN_PROGRAM_ID,
            sysvar::rent::ID,
            PUMP_EVENT_AUTHORITY,
            PUMP_PROGRAM_ID,
        ]);
        let signers: Vec<_> = ix.accounts.iter().filter(|m| m.is_signer).collect();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].pubkey, acc.user);
    }

    #[test]
    fn sell_account_order() {
        let acc = accounts();
        let ix = sell_instruction(&acc, 1, 1);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(ix.accounts[7].pubkey, system_program::ID);
        assert_eq!(ix.accounts[8].pubkey, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ix.accounts[9].pubkey, TOKEN_PROGRAM_ID);
        assert!(ix.accounts[3].is_writable && ix.accounts[4].is_writable);
        assert!(!ix.accounts[2].is_writable);
    }

    #[test]
    fn builder_without_fields_is_just_the_tag() {
        let ix = InstructionBuilder::new(PUMP_PROGRAM_ID, [9; 8]).build();
        assert_eq!(ix.data, vec![9; 8]);
        assert!(ix.accounts.is_empty());
    }
}
