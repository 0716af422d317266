//! kBTC Custody Coordination Backend
//!
//! Coordinates a committee of keepers who jointly hold pooled Bitcoin
//! custody addresses ("groups") and attest, via threshold signatures,
//! that specific Bitcoin transactions funded specific pending claims.
//! A verified deposit credits the depositor with the pegged token; a
//! verified withdrawal burns that credit and authorizes release of
//! custody funds.
//!
//! ## Core pieces
//!
//! 1. **GroupRegistry / ReceiptLedger** - entity stores for custody
//!    groups and their lifecycle receipts
//! 2. **Mint / Burn controllers** - the deposit and withdrawal state
//!    machines, including timeout-driven forced recovery
//! 3. **RefundTracker** - the single global slot reconciling unmatched
//!    incoming transactions
//! 4. **External seams** - token ledger, collateral registry, rewards
//!    and authorization are consumed through traits, never owned

pub mod api;
pub mod attest;
pub mod clock;
pub mod common;
pub mod config;
pub mod custody;
pub mod external;
pub mod logging;
pub mod registry;
pub mod storage;
pub mod types;

// Re-exports: errors
pub use common::error::{CustodyError, Result};

// Re-exports: configuration
pub use config::{ConfigError, CustodyConfig};

// Re-exports: custody service
pub use custody::{
    CustodyService, CustodyStats, FeeState, RefundSlot, ESCROW_ACCOUNT, FEE_ACCOUNT,
};

// Re-exports: domain types
pub use types::{receipt_id, Group, Receipt, ReceiptStatus};

// Re-exports: external seams
pub use external::{Action, Authorizer, KeeperAuthority, RewardHook, TokenLedger};

// Re-exports: clock
pub use clock::{Clock, ManualClock, SystemClock};

// Re-exports: storage
pub use storage::SqliteStateStore;
