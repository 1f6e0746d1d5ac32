//! Custodial mint/burn factory
//!
//! Merchants open mint requests against custodian-vetted deposit addresses and
//! burn wrapped tokens to redeem the underlying asset. Custodians confirm or
//! reject those requests once the off-chain movement has been verified.

pub mod clock;
pub mod deposit;
pub mod engine;
pub mod request;
pub mod roles;
pub mod rpc;
pub mod token;

pub use clock::{CallContext, Clock, ManualClock, SystemClock};
pub use deposit::DepositDirectory;
pub use engine::{EventLog, EventRecord, Factory, FactoryCall, StandardFactory};
pub use request::{request_hash, Request, RequestKind, RequestLedger, RequestStatus};
pub use roles::{EnumerableRoleRegistry, Role, RoleRegistry};
pub use token::{TokenError, TokenEvent, TokenLedger, TokenResult, WrappedToken};

use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};

/// Logical time in seconds
pub type Timestamp = u64;

/// Factory error types
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("caller is not {}", .role.describe())]
    NotAuthorized { role: Role },

    #[error("account is the zero address")]
    InvalidAccount,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("deposit address is empty")]
    EmptyDeposit,

    #[error("deposit {deposit} is not the custodian deposit bound to the caller")]
    UnboundDeposit { deposit: String },

    #[error("merchant has no deposit address configured")]
    NoDepositConfigured,

    #[error("external reference is empty")]
    EmptyExternalRef,

    #[error("{kind} request {nonce} is {status}, expected pending")]
    InvalidStateTransition {
        kind: RequestKind,
        nonce: u64,
        status: RequestStatus,
    },

    #[error("request hash mismatch: supplied {supplied:?}, computed {computed:?}")]
    HashMismatch { supplied: H256, computed: H256 },

    #[error("{kind} request {nonce} not found")]
    NotFound { kind: RequestKind, nonce: u64 },

    #[error("no {kind} request with hash {hash:?}")]
    UnknownRequestHash { kind: RequestKind, hash: H256 },

    #[error("caller is not the requester")]
    NotRequester,

    #[error("new owner is already the owner")]
    OwnerUnchanged,

    #[error("factory is paused")]
    Paused,

    #[error("factory is already paused")]
    AlreadyPaused,

    #[error("factory is not paused")]
    NotPaused,

    #[error("unknown token {token:?}")]
    UnknownToken { token: H160 },

    #[error("direct value transfers are not accepted")]
    ValueTransferRejected,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Result type for factory operations
pub type FactoryResult<T> = Result<T, FactoryError>;

/// Factory events, appended to the audit log in commit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryEvent {
    RoleGranted {
        role: Role,
        account: H160,
        sender: H160,
    },

    RoleRevoked {
        role: Role,
        account: H160,
        sender: H160,
    },

    OwnerChanged {
        previous_owner: H160,
        new_owner: H160,
    },

    CustodianDepositSet {
        merchant: H160,
        custodian: H160,
        deposit: String,
    },

    MerchantDepositSet {
        merchant: H160,
        deposit: String,
    },

    MintRequestAdd {
        nonce: u64,
        requester: H160,
        amount: U256,
        deposit: String,
        external_ref: String,
        timestamp: Timestamp,
        request_hash: H256,
    },

    MintRequestCancel {
        nonce: u64,
        requester: H160,
        request_hash: H256,
    },

    MintConfirmed {
        nonce: u64,
        requester: H160,
        amount: U256,
        deposit: String,
        external_ref: String,
        timestamp: Timestamp,
        request_hash: H256,
    },

    MintRejected {
        nonce: u64,
        requester: H160,
        amount: U256,
        deposit: String,
        external_ref: String,
        timestamp: Timestamp,
        request_hash: H256,
    },

    Burned {
        nonce: u64,
        requester: H160,
        amount: U256,
        deposit: String,
        timestamp: Timestamp,
        request_hash: H256,
    },

    BurnConfirmed {
        nonce: u64,
        requester: H160,
        amount: U256,
        deposit: String,
        external_ref: String,
        timestamp: Timestamp,
        input_request_hash: H256,
    },

    Paused {
        account: H160,
    },

    Unpaused {
        account: H160,
    },

    TokenClaimed {
        token: H160,
        amount: U256,
    },
}

impl FactoryEvent {
    /// Event name as it appears in the audit log
    pub fn name(&self) -> &'static str {
        match self {
            FactoryEvent::RoleGranted { .. } => "RoleGranted",
            FactoryEvent::RoleRevoked { .. } => "RoleRevoked",
            FactoryEvent::OwnerChanged { .. } => "OwnerChanged",
            FactoryEvent::CustodianDepositSet { .. } => "CustodianDepositSet",
            FactoryEvent::MerchantDepositSet { .. } => "MerchantDepositSet",
            FactoryEvent::MintRequestAdd { .. } => "MintRequestAdd",
            FactoryEvent::MintRequestCancel { .. } => "MintRequestCancel",
            FactoryEvent::MintConfirmed { .. } => "MintConfirmed",
            FactoryEvent::MintRejected { .. } => "MintRejected",
            FactoryEvent::Burned { .. } => "Burned",
            FactoryEvent::BurnConfirmed { .. } => "BurnConfirmed",
            FactoryEvent::Paused { .. } => "Paused",
            FactoryEvent::Unpaused { .. } => "Unpaused",
            FactoryEvent::TokenClaimed { .. } => "TokenClaimed",
        }
    }
}

/// Reject the zero address where an identity is required
pub(crate) fn ensure_account(account: H160) -> FactoryResult<()> {
    if account.is_zero() {
        return Err(FactoryError::InvalidAccount);
    }
    Ok(())
}
