//! External system seams: token ledger, collateral registry, rewards,
//! authorization.

pub mod mock;
pub mod traits;

pub use traits::{Action, Authorizer, KeeperAuthority, RewardHook, TokenError, TokenLedger};
