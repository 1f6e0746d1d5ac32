use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use primitive_types::H160;

/// Deposit bindings per merchant.
///
/// `custodian_deposit` is assigned by a custodian and stamped on mint
/// requests; `merchant_deposit` is chosen by the merchant and stamped on burn
/// requests. Entries are overwritten, never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepositDirectory {
    custodian_deposit: HashMap<H160, String>,
    merchant_deposit: HashMap<H160, String>,
}

impl DepositDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_custodian_deposit(&mut self, merchant: H160, deposit: String) {
        self.custodian_deposit.insert(merchant, deposit);
    }

    pub fn set_merchant_deposit(&mut self, merchant: H160, deposit: String) {
        self.merchant_deposit.insert(merchant, deposit);
    }

    /// Custodian-assigned deposit for `merchant`, if any
    pub fn custodian_deposit(&self, merchant: H160) -> Option<&str> {
        self.custodian_deposit
            .get(&merchant)
            .map(String::as_str)
            .filter(|deposit| !deposit.is_empty())
    }

    /// Merchant-chosen deposit for `merchant`, if any
    pub fn merchant_deposit(&self, merchant: H160) -> Option<&str> {
        self.merchant_deposit
            .get(&merchant)
            .map(String::as_str)
            .filter(|deposit| !deposit.is_empty())
    }
}
