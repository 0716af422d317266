//! Custody Service
//!
//! Root of the custody state machine. One `RwLock` guards the whole
//! mutable state; every mutating entry point holds the write lock for its
//! full duration, which reproduces the serialized-call atomicity the state
//! machine is specified against. All validation happens before any
//! effect, so a rejection never leaves partial state behind.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::common::error::{CustodyError, Result};
use crate::config::CustodyConfig;
use crate::custody::fees::FeeState;
use crate::custody::refund::RefundSlot;
use crate::external::{Action, Authorizer, KeeperAuthority, RewardHook, TokenLedger};
use crate::registry::{GroupRegistry, GroupRegistryStats, ReceiptLedger, ReceiptLedgerStats};
use crate::storage::SqliteStateStore;
use crate::types::{Group, Receipt};

/// Escrow account holding pegged tokens during pending withdrawals
pub const ESCROW_ACCOUNT: &str = "kbtc:escrow";

/// Account accumulating retained protocol fees
pub const FEE_ACCOUNT: &str = "kbtc:fees";

/// Mutable custody state, guarded by the service's single lock
pub struct CustodyState {
    pub groups: GroupRegistry,
    pub receipts: ReceiptLedger,
    /// The single global refund-reconciliation slot
    pub refund_slot: Option<RefundSlot>,
    pub fees: FeeState,
    /// Circuit breaker: rejects every mutating entry point when set
    pub paused: bool,
}

impl CustodyState {
    fn new(fees: FeeState) -> Self {
        Self {
            groups: GroupRegistry::new(),
            receipts: ReceiptLedger::new(),
            refund_slot: None,
            fees,
            paused: false,
        }
    }
}

/// The custody coordination service
pub struct CustodyService {
    pub(crate) config: CustodyConfig,
    pub(crate) state: RwLock<CustodyState>,
    pub(crate) authority: Arc<dyn KeeperAuthority>,
    pub(crate) token: Arc<dyn TokenLedger>,
    pub(crate) rewards: Arc<dyn RewardHook>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) mirror: Option<SqliteStateStore>,
}

impl CustodyService {
    /// Create a service with the system clock and no persistence
    pub fn new(
        config: CustodyConfig,
        authority: Arc<dyn KeeperAuthority>,
        token: Arc<dyn TokenLedger>,
        rewards: Arc<dyn RewardHook>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let fees = FeeState::new(config.mint_fee_bps, config.burn_fee_bps);
        Self {
            config,
            state: RwLock::new(CustodyState::new(fees)),
            authority,
            token,
            rewards,
            authorizer,
            clock: Arc::new(SystemClock),
            mirror: None,
        }
    }

    /// Replace the time source (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a sqlite mirror, restoring any previously persisted state
    pub fn with_mirror(mut self, mirror: SqliteStateStore) -> Result<Self> {
        let loaded = mirror
            .load_state()
            .map_err(|e| CustodyError::storage(e.to_string()))?;

        let state = self.state.get_mut();
        for group in loaded.groups {
            state.groups.upsert(group);
        }
        for receipt in loaded.receipts {
            state.receipts.insert(receipt);
        }
        state.refund_slot = loaded.refund_slot;
        if let Some(fees) = loaded.fees {
            state.fees = fees;
        }

        self.mirror = Some(mirror);
        Ok(self)
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now()
    }

    pub(crate) fn authorize(&self, caller: &str, action: Action) -> Result<()> {
        if self.authorizer.can(caller, action) {
            Ok(())
        } else {
            Err(CustodyError::authorization(format!(
                "{} may not perform {:?}",
                caller, action
            )))
        }
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    /// Read-only group snapshot
    pub async fn get_group(&self, custody_address: &str) -> Result<Group> {
        let state = self.state.read().await;
        state
            .groups
            .get(custody_address)
            .cloned()
            .ok_or_else(|| CustodyError::not_found(format!("group {}", custody_address)))
    }

    /// Read-only receipt snapshot
    pub async fn get_receipt(&self, receipt_id: &str) -> Result<Receipt> {
        let state = self.state.read().await;
        state
            .receipts
            .get(receipt_id)
            .cloned()
            .ok_or_else(|| CustodyError::not_found(format!("receipt {}", receipt_id)))
    }

    /// Current refund slot, if any
    pub async fn refund_slot(&self) -> Option<RefundSlot> {
        self.state.read().await.refund_slot.clone()
    }

    /// Current fee state snapshot
    pub async fn fee_state(&self) -> FeeState {
        self.state.read().await.fees.clone()
    }

    /// Whether the circuit breaker is set
    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> CustodyStats {
        let state = self.state.read().await;
        CustodyStats {
            groups: state.groups.stats(),
            receipts: state.receipts.stats(),
            refund_slot_active: state.refund_slot.is_some(),
            accrued_fee_units: state.fees.accrued_units.to_string(),
            paused: state.paused,
        }
    }

    /// Structural sanity check used by tests and the demo: every group
    /// within capacity and at most one non-terminal receipt per group.
    pub async fn verify_invariants(&self) -> std::result::Result<(), String> {
        let state = self.state.read().await;
        for group in state.groups.all() {
            if group.current_balance_sats > group.capacity_sats {
                return Err(format!(
                    "group {} over capacity: {} > {}",
                    group.custody_address, group.current_balance_sats, group.capacity_sats
                ));
            }
            let open = state.receipts.non_terminal_for(&group.custody_address);
            if open.len() > 1 {
                return Err(format!(
                    "group {} has {} non-terminal receipts",
                    group.custody_address,
                    open.len()
                ));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Mirror write-through (best effort; in-memory state is authoritative)
    // =========================================================================

    pub(crate) fn mirror_group(&self, group: &Group) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.upsert_group(group) {
                tracing::warn!(target: "kbtc::storage", "group mirror write failed: {}", e);
            }
        }
    }

    pub(crate) fn mirror_group_removed(&self, custody_address: &str) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.delete_group(custody_address) {
                tracing::warn!(target: "kbtc::storage", "group mirror delete failed: {}", e);
            }
        }
    }

    pub(crate) fn mirror_receipt(&self, receipt: &Receipt) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.upsert_receipt(receipt) {
                tracing::warn!(target: "kbtc::storage", "receipt mirror write failed: {}", e);
            }
        }
    }

    pub(crate) fn mirror_refund_slot(&self, slot: Option<&RefundSlot>) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save_refund_slot(slot) {
                tracing::warn!(target: "kbtc::storage", "refund mirror write failed: {}", e);
            }
        }
    }

    pub(crate) fn mirror_fees(&self, fees: &FeeState) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save_fees(fees) {
                tracing::warn!(target: "kbtc::storage", "fee mirror write failed: {}", e);
            }
        }
    }
}

/// Reject mutations while the circuit breaker is set
pub(crate) fn ensure_unpaused(state: &CustodyState) -> Result<()> {
    if state.paused {
        Err(CustodyError::authorization("system is paused"))
    } else {
        Ok(())
    }
}

/// Service-wide statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CustodyStats {
    pub groups: GroupRegistryStats,
    pub receipts: ReceiptLedgerStats,
    pub refund_slot_active: bool,
    pub accrued_fee_units: String,
    pub paused: bool,
}
