use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use primitive_types::{H160, U256};

/// Token ledger error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance { required: U256, available: U256 },

    #[error("Caller {caller:?} is not a minter")]
    NotMinter { caller: H160 },

    #[error("Only owner can perform this action")]
    OnlyOwner,

    #[error("Token supply overflow")]
    SupplyOverflow,

    #[error("Invalid address: {address:?}")]
    InvalidAddress { address: H160 },
}

/// Result type for token ledger operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Token ledger events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEvent {
    Transfer {
        contract: H160,
        from: H160,
        to: H160,
        amount: U256,
    },

    Approval {
        contract: H160,
        owner: H160,
        spender: H160,
        amount: U256,
    },

    Mint {
        contract: H160,
        to: H160,
        amount: U256,
    },

    Burn {
        contract: H160,
        from: H160,
        amount: U256,
    },

    MinterChanged {
        contract: H160,
        minter: H160,
        granted: bool,
    },
}

/// Fungible token capability consumed by the factory.
///
/// Every mutating call either applies in full or returns an error without
/// touching balances, allowances or supply.
pub trait TokenLedger {
    /// Contract address of this token
    fn address(&self) -> H160;

    fn balance_of(&self, account: H160) -> U256;

    /// Mint `amount` to `to`; `minter` must hold the minter capability
    fn mint(&mut self, minter: H160, to: H160, amount: U256) -> TokenResult<TokenEvent>;

    /// Burn `amount` from `owner`, spending `spender`'s allowance
    fn burn_from(&mut self, spender: H160, owner: H160, amount: U256) -> TokenResult<TokenEvent>;

    fn transfer(&mut self, from: H160, to: H160, amount: U256) -> TokenResult<TokenEvent>;
}

/// Wrapped representation of the off-chain asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedToken {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,

    /// Token contract address
    pub contract_address: H160,

    /// Balance mapping: address => balance
    balances: HashMap<H160, U256>,

    /// Allowance mapping: owner => spender => amount
    allowances: HashMap<H160, HashMap<H160, U256>>,

    /// Accounts allowed to mint (the factory, once granted)
    minters: BTreeSet<H160>,

    /// Token administrator, manages minters
    pub owner: H160,
}

impl WrappedToken {
    /// Create a token with zero supply
    pub fn new(
        name: String,
        symbol: String,
        decimals: u8,
        contract_address: H160,
        owner: H160,
    ) -> Self {
        Self {
            name,
            symbol,
            decimals,
            total_supply: U256::zero(),
            contract_address,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            minters: BTreeSet::new(),
            owner,
        }
    }

    /// Approve spender to spend tokens
    pub fn approve(&mut self, owner: H160, spender: H160, amount: U256) -> TokenResult<TokenEvent> {
        if spender.is_zero() {
            return Err(TokenError::InvalidAddress { address: spender });
        }

        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, amount);

        Ok(TokenEvent::Approval {
            contract: self.contract_address,
            owner,
            spender,
            amount,
        })
    }

    /// Get allowance amount
    pub fn allowance(&self, owner: H160, spender: H160) -> U256 {
        self.allowances
            .get(&owner)
            .and_then(|allowances| allowances.get(&spender))
            .copied()
            .unwrap_or_else(U256::zero)
    }

    /// Grant the minter capability (only owner)
    pub fn grant_minter(&mut self, caller: H160, minter: H160) -> TokenResult<TokenEvent> {
        if caller != self.owner {
            return Err(TokenError::OnlyOwner);
        }
        if minter.is_zero() {
            return Err(TokenError::InvalidAddress { address: minter });
        }

        self.minters.insert(minter);
        Ok(TokenEvent::MinterChanged {
            contract: self.contract_address,
            minter,
            granted: true,
        })
    }

    /// Revoke the minter capability (only owner)
    pub fn revoke_minter(&mut self, caller: H160, minter: H160) -> TokenResult<TokenEvent> {
        if caller != self.owner {
            return Err(TokenError::OnlyOwner);
        }

        self.minters.remove(&minter);
        Ok(TokenEvent::MinterChanged {
            contract: self.contract_address,
            minter,
            granted: false,
        })
    }

    pub fn is_minter(&self, account: H160) -> bool {
        self.minters.contains(&account)
    }

    fn credit(&mut self, account: H160, amount: U256) -> TokenResult<()> {
        let balance = self.balance_of(account);
        let updated = balance.checked_add(amount).ok_or(TokenError::SupplyOverflow)?;
        self.balances.insert(account, updated);
        Ok(())
    }
}

impl TokenLedger for WrappedToken {
    fn address(&self) -> H160 {
        self.contract_address
    }

    fn balance_of(&self, account: H160) -> U256 {
        self.balances.get(&account).copied().unwrap_or_else(U256::zero)
    }

    fn mint(&mut self, minter: H160, to: H160, amount: U256) -> TokenResult<TokenEvent> {
        if !self.is_minter(minter) {
            return Err(TokenError::NotMinter { caller: minter });
        }
        if to.is_zero() {
            return Err(TokenError::InvalidAddress { address: to });
        }

        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow)?;
        self.credit(to, amount)?;
        self.total_supply = total_supply;

        Ok(TokenEvent::Mint {
            contract: self.contract_address,
            to,
            amount,
        })
    }

    fn burn_from(&mut self, spender: H160, owner: H160, amount: U256) -> TokenResult<TokenEvent> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                required: amount,
                available: allowance,
            });
        }

        let balance = self.balance_of(owner);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, allowance - amount);
        self.balances.insert(owner, balance - amount);
        self.total_supply -= amount;

        Ok(TokenEvent::Burn {
            contract: self.contract_address,
            from: owner,
            amount,
        })
    }

    fn transfer(&mut self, from: H160, to: H160, amount: U256) -> TokenResult<TokenEvent> {
        if to.is_zero() {
            return Err(TokenError::InvalidAddress { address: to });
        }

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                required: amount,
                available: from_balance,
            });
        }

        self.balances.insert(from, from_balance - amount);
        self.credit(to, amount)?;

        Ok(TokenEvent::Transfer {
            contract: self.contract_address,
            from,
            to,
            amount,
        })
    }
}
