use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use primitive_types::H160;

/// Roles recognised by the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Pauser,
    Custodian,
    Merchant,
}

impl Role {
    /// Phrase used in authorization failures ("caller is not ...")
    pub fn describe(&self) -> &'static str {
        match self {
            Role::Admin => "the default admin",
            Role::Pauser => "a pauser",
            Role::Custodian => "a custodian",
            Role::Merchant => "a merchant",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "DEFAULT_ADMIN_ROLE",
            Role::Pauser => "PAUSER_ROLE",
            Role::Custodian => "CUSTODIAN_ROLE",
            Role::Merchant => "MERCHANT_ROLE",
        }
    }

    pub fn parse(name: &str) -> Option<Role> {
        match name.to_ascii_lowercase().trim_end_matches("_role") {
            "admin" | "default_admin" => Some(Role::Admin),
            "pauser" => Some(Role::Pauser),
            "custodian" => Some(Role::Custodian),
            "merchant" => Some(Role::Merchant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role membership capability consumed by the factory.
///
/// Implementations do not validate accounts; the factory rejects zero
/// addresses before delegating.
pub trait RoleRegistry {
    /// Add `account` to `role`. Returns false if it was already a member.
    fn grant(&mut self, role: Role, account: H160) -> bool;

    /// Remove `account` from `role`. Returns false if it was not a member.
    fn revoke(&mut self, role: Role, account: H160) -> bool;

    fn is_member(&self, role: Role, account: H160) -> bool;

    fn member_count(&self, role: Role) -> usize;

    fn member_at(&self, role: Role, index: usize) -> Option<H160>;
}

/// Enumerable member set for a single role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemberSet {
    /// Members in insertion order (until a removal swaps the last one in)
    members: Vec<H160>,

    /// account => index into `members`
    positions: HashMap<H160, usize>,
}

impl MemberSet {
    fn insert(&mut self, account: H160) -> bool {
        if self.positions.contains_key(&account) {
            return false;
        }
        self.positions.insert(account, self.members.len());
        self.members.push(account);
        true
    }

    fn remove(&mut self, account: H160) -> bool {
        let Some(index) = self.positions.remove(&account) else {
            return false;
        };

        self.members.swap_remove(index);
        if let Some(moved) = self.members.get(index) {
            self.positions.insert(*moved, index);
        }
        true
    }
}

/// In-memory enumerable role registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnumerableRoleRegistry {
    roles: BTreeMap<Role, MemberSet>,
}

impl EnumerableRoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All members of a role in enumeration order
    pub fn members(&self, role: Role) -> Vec<H160> {
        self.roles
            .get(&role)
            .map(|set| set.members.clone())
            .unwrap_or_default()
    }
}

impl RoleRegistry for EnumerableRoleRegistry {
    fn grant(&mut self, role: Role, account: H160) -> bool {
        self.roles.entry(role).or_default().insert(account)
    }

    fn revoke(&mut self, role: Role, account: H160) -> bool {
        self.roles
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false)
    }

    fn is_member(&self, role: Role, account: H160) -> bool {
        self.roles
            .get(&role)
            .map(|set| set.positions.contains_key(&account))
            .unwrap_or(false)
    }

    fn member_count(&self, role: Role) -> usize {
        self.roles.get(&role).map(|set| set.members.len()).unwrap_or(0)
    }

    fn member_at(&self, role: Role, index: usize) -> Option<H160> {
        self.roles
            .get(&role)
            .and_then(|set| set.members.get(index))
            .copied()
    }
}
