//! Refund Tracker
//!
//! A single global slot reconciles one unmatched incoming Bitcoin
//! transaction at a time. Refunds only apply to transactions no verified
//! deposit owns, and a new record may not be written until the previous
//! slot's expiry has passed.

use serde::{Deserialize, Serialize};

use crate::attest::validate_txid;
use crate::common::error::{CustodyError, Result};
use crate::custody::service::{ensure_unpaused, CustodyService, CustodyState};
use crate::logging::{log_mint_event, log_refund_event};
use crate::types::ReceiptStatus;

/// The single global refund record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSlot {
    pub custody_address: String,
    pub btc_txid: String,
    /// Unix time after which the slot may be overwritten
    pub expiry: u64,
}

impl CustodyService {
    /// Record an unmatched incoming transaction for refund.
    ///
    /// A stalled deposit request past its grace period is force-cleared
    /// first (attributed to the caller), exactly as the forced mint path
    /// would.
    pub async fn record_refund(
        &self,
        caller: &str,
        custody_address: &str,
        btc_txid: &str,
    ) -> Result<RefundSlot> {
        validate_txid(btc_txid).map_err(|e| CustodyError::integrity(e.to_string()))?;

        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        let CustodyState {
            groups,
            receipts,
            refund_slot,
            ..
        } = &mut *state;

        let group = groups
            .get(custody_address)
            .ok_or_else(|| CustodyError::not_found(format!("group {}", custody_address)))?;

        let working_id = group.working_receipt_id();
        let mut force_clear = false;
        if let Some(receipt) = receipts.get(&working_id) {
            if receipt.status == ReceiptStatus::DepositRequested {
                if now < receipt.requested_at + self.config.mint_grace_secs {
                    return Err(CustodyError::timing(
                        "deposit in progress: mint grace period not elapsed",
                    ));
                }
                force_clear = true;
            }
        }

        if receipts.find_by_btc_txid(btc_txid).is_some() {
            return Err(CustodyError::state(format!(
                "transaction {} already owned by a verified deposit",
                btc_txid
            )));
        }

        if let Some(slot) = refund_slot {
            if now < slot.expiry {
                return Err(CustodyError::timing(format!(
                    "refund slot occupied until {}",
                    slot.expiry
                )));
            }
        }

        if force_clear {
            if let Some(receipt) = receipts.get_mut(&working_id) {
                receipt.mark_cleared(now);
                let amount_sats = receipt.amount_sats;
                self.mirror_receipt(receipt);
                log_mint_event("mint_revoked", &working_id, caller, amount_sats);
            }
        }

        let slot = RefundSlot {
            custody_address: custody_address.to_string(),
            btc_txid: btc_txid.to_string(),
            expiry: now + self.config.refund_gap_secs,
        };
        *refund_slot = Some(slot.clone());

        self.mirror_refund_slot(Some(&slot));
        log_refund_event("refund_recorded", custody_address, btc_txid, caller);
        Ok(slot)
    }
}
