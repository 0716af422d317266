//! Burn Controller (withdrawal path)
//!
//! Per-receipt state machine:
//! deposit_received →(request_burn)→ withdraw_requested →(verify_burn)→ cleared;
//! withdraw_requested →(recover_burn, admin)→ deposit_received.
//!
//! Escrow is taken at request time and only settled or refunded later, so
//! the group balance is untouched until the withdrawal actually verifies.
//! Verification has no deadline: a late keeper payout still settles.

use crate::common::error::{CustodyError, Result};
use crate::custody::fees::FeeState;
use crate::custody::service::{
    ensure_unpaused, CustodyService, CustodyState, ESCROW_ACCOUNT, FEE_ACCOUNT,
};
use crate::external::Action;
use crate::logging::log_burn_event;
use crate::types::units::sats_to_units;
use crate::types::{Group, Receipt, ReceiptStatus};

impl CustodyService {
    /// Request a withdrawal against a holding receipt.
    ///
    /// Escrows principal plus burn fee from the caller, who becomes the
    /// beneficiary of record.
    pub async fn request_burn(
        &self,
        caller: &str,
        receipt_id: &str,
        withdraw_destination: &str,
    ) -> Result<Receipt> {
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        let CustodyState { receipts, fees, .. } = &mut *state;

        let receipt = receipts
            .get_mut(receipt_id)
            .ok_or_else(|| CustodyError::not_found(format!("receipt {}", receipt_id)))?;
        if receipt.status != ReceiptStatus::DepositReceived {
            return Err(CustodyError::state(format!(
                "receipt not holding a verified deposit (status {})",
                receipt.status
            )));
        }
        if withdraw_destination.is_empty() {
            return Err(CustodyError::state("withdraw destination must not be empty"));
        }

        let gross = sats_to_units(receipt.amount_sats);
        let fee = fees.burn_fee(gross);
        let escrow = gross + fee;

        self.token
            .transfer(caller, ESCROW_ACCOUNT, escrow)
            .await
            .map_err(|e| CustodyError::token(e.to_string()))?;

        receipt.mark_withdraw_requested(
            caller,
            withdraw_destination.to_string(),
            escrow,
            fee,
            now,
        );

        let amount_sats = receipt.amount_sats;
        self.mirror_receipt(receipt);
        log_burn_event("burn_requested", receipt_id, caller, amount_sats);
        Ok(receipt.clone())
    }

    /// Settle a pending withdrawal. No deadline applies.
    pub async fn verify_burn(&self, caller: &str, receipt_id: &str) -> Result<Receipt> {
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        let CustodyState {
            groups,
            receipts,
            fees,
            ..
        } = &mut *state;

        let receipt = receipts
            .get_mut(receipt_id)
            .ok_or_else(|| CustodyError::not_found(format!("receipt {}", receipt_id)))?;
        if receipt.status != ReceiptStatus::WithdrawRequested {
            return Err(CustodyError::state(format!(
                "receipt not awaiting withdrawal settlement (status {})",
                receipt.status
            )));
        }
        let group = groups.get_mut(&receipt.custody_address).ok_or_else(|| {
            CustodyError::not_found(format!("group {}", receipt.custody_address))
        })?;

        self.settle_burn(group, receipt, fees, caller, now).await?;
        Ok(receipt.clone())
    }

    /// Undo a pending withdrawal, refunding the full escrow. Admin only.
    pub async fn recover_burn(&self, caller: &str, receipt_id: &str) -> Result<Receipt> {
        self.authorize(caller, Action::RecoverBurn)?;

        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;

        let receipt = state
            .receipts
            .get_mut(receipt_id)
            .ok_or_else(|| CustodyError::not_found(format!("receipt {}", receipt_id)))?;
        if receipt.status != ReceiptStatus::WithdrawRequested {
            return Err(CustodyError::state(format!(
                "receipt not awaiting withdrawal settlement (status {})",
                receipt.status
            )));
        }

        let refund = receipt.escrow_units;
        let recipient = receipt.recipient.clone();
        self.token
            .transfer(ESCROW_ACCOUNT, &recipient, refund)
            .await
            .map_err(|e| CustodyError::token(e.to_string()))?;

        receipt.revert_to_deposit_received(now);
        let amount_sats = receipt.amount_sats;
        self.mirror_receipt(receipt);
        log_burn_event("burn_recovered", receipt_id, caller, amount_sats);
        Ok(receipt.clone())
    }

    /// Shared settlement: burns escrowed principal, retains the fee,
    /// decrements the group balance, clears the receipt and opens the
    /// post-burn cooldown. Used by `verify_burn` and the forced path.
    pub(crate) async fn settle_burn(
        &self,
        group: &mut Group,
        receipt: &mut Receipt,
        fees: &mut FeeState,
        actor: &str,
        now: u64,
    ) -> Result<()> {
        let principal = receipt.escrow_principal_units();
        let fee = receipt.escrow_fee_units;

        self.token
            .burn(ESCROW_ACCOUNT, principal)
            .await
            .map_err(|e| CustodyError::token(e.to_string()))?;
        if fee > 0 {
            self.token
                .transfer(ESCROW_ACCOUNT, FEE_ACCOUNT, fee)
                .await
                .map_err(|e| CustodyError::token(e.to_string()))?;
        }

        group.debit(receipt.amount_sats, now);
        fees.accrue(fee);
        receipt.mark_cleared(now);
        group.begin_cooldown(now + self.config.burn_cooldown_secs, now);

        self.rewards
            .notify(&receipt.recipient, receipt.amount_sats, false)
            .await;
        self.mirror_group(group);
        self.mirror_receipt(receipt);
        self.mirror_fees(fees);
        log_burn_event("burn_verified", &receipt.id, actor, receipt.amount_sats);
        Ok(())
    }
}
