//! Wrapped-asset custody factory.
//!
//! Bookkeeping for a custodial bridge: merchants request mints against
//! custodian-vetted deposit addresses, burn wrapped tokens to redeem, and
//! custodians settle both once the off-chain transfer is verified.

pub mod config;
pub mod factory;
pub mod storage;

pub use config::CustodyConfig;
pub use factory::{
    CallContext, Clock, FactoryCall, FactoryError, FactoryEvent, FactoryResult, Request,
    RequestStatus, Role, StandardFactory, SystemClock, WrappedToken,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Custody errors
#[derive(thiserror::Error, Debug)]
pub enum CustodyError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Factory error: {0}")]
    FactoryError(#[from] FactoryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Custody result type
pub type Result<T> = std::result::Result<T, CustodyError>;
