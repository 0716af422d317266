//! External Collaborator Interfaces
//!
//! The custody core never reimplements the pegged-token ledger, the
//! collateral registry, the authorization store or the reward subsystem;
//! it consumes them through the narrow traits below. Implementations can
//! be chain clients (production) or in-memory fakes (tests, demo).

use async_trait::async_trait;
use thiserror::Error;

/// Privileged actions gated by the role store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateGroup,
    DeleteGroup,
    Pause,
    UpdateFees,
    CollectFees,
    RecoverBurn,
}

/// Role-based permission check
pub trait Authorizer: Send + Sync {
    fn can(&self, caller: &str, action: Action) -> bool;
}

/// Keeper collateral registry; queried only at group creation
#[async_trait]
pub trait KeeperAuthority: Send + Sync {
    async fn collateral_of(&self, keeper: &str) -> u64;
}

/// Token ledger errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("insufficient balance on {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: String,
        needed: u128,
        available: u128,
    },

    #[error("token operation rejected: {0}")]
    Rejected(String),
}

/// Pegged-token ledger primitives (amounts in 18-decimal token units)
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn mint(&self, account: &str, units: u128) -> Result<(), TokenError>;

    async fn burn(&self, account: &str, units: u128) -> Result<(), TokenError>;

    async fn transfer(&self, from: &str, to: &str, units: u128) -> Result<(), TokenError>;

    async fn balance_of(&self, account: &str) -> u128;
}

/// One-way notification to the incentive subsystem
#[async_trait]
pub trait RewardHook: Send + Sync {
    async fn notify(&self, recipient: &str, amount_sats: u64, is_mint: bool);
}
