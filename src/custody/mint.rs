//! Mint Controller (deposit path)
//!
//! Per-receipt state machine:
//! cleared →(request_mint)→ deposit_requested →(verify_mint)→ deposit_received;
//! deposit_requested →(revoke_mint)→ cleared.
//!
//! `force_request_mint` is the sole forced-escape path for a group whose
//! keeper flow has stalled: it settles or revokes the timed-out working
//! receipt (attributed to the forcing caller) and then admits the new
//! deposit request in the same atomic call.

use std::collections::HashSet;

use crate::attest::{attestation_digest, validate_txid, verify_attestation};
use crate::common::error::{CustodyError, Result};
use crate::custody::service::{ensure_unpaused, CustodyService, CustodyState, FEE_ACCOUNT};
use crate::logging::log_mint_event;
use crate::types::units::sats_to_units;
use crate::types::{Group, Receipt, ReceiptStatus};

/// What `force_request_mint` must do to the working slot before admission
enum ForcePlan {
    /// Slot already terminal; plain admission
    Fresh,
    /// Auto-revoke a timed-out deposit request
    AutoRevoke,
    /// Auto-settle a timed-out withdrawal
    AutoSettle,
}

impl CustodyService {
    /// Admit a new deposit request on a group.
    ///
    /// `expected_nonce` must be exactly `group.nonce + 1`; racing callers
    /// lose on this optimistic check rather than on a lock.
    pub async fn request_mint(
        &self,
        caller: &str,
        custody_address: &str,
        amount_sats: u64,
        expected_nonce: u64,
    ) -> Result<Receipt> {
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        let CustodyState {
            groups, receipts, ..
        } = &mut *state;

        let group = groups
            .get_mut(custody_address)
            .ok_or_else(|| CustodyError::not_found(format!("group {}", custody_address)))?;

        check_nonce(group, expected_nonce)?;
        if let Some(receipt) = receipts.get(&group.working_receipt_id()) {
            if !receipt.status.is_terminal() {
                return Err(in_progress_error(receipt.status));
            }
        }
        if group.in_cooldown(now) {
            return Err(CustodyError::timing(format!(
                "group cooling down until {}",
                group.cooldown_until
            )));
        }
        check_amount(amount_sats)?;
        check_capacity(group, group.current_balance_sats, amount_sats)?;

        let receipt = Receipt::new_deposit(custody_address, expected_nonce, caller, amount_sats, now);
        group.advance_nonce(expected_nonce, now);
        receipts.insert(receipt.clone());

        self.mirror_group(group);
        self.mirror_receipt(&receipt);
        log_mint_event("mint_requested", &receipt.id, caller, amount_sats);
        Ok(receipt)
    }

    /// Verify a pending deposit against a keeper threshold attestation.
    ///
    /// Credits the recipient with the pegged-token equivalent minus the
    /// mint fee and fires the reward hook.
    pub async fn verify_mint(
        &self,
        caller: &str,
        receipt_id: &str,
        btc_txid: &str,
        btc_height: u64,
        signers: &[String],
        signatures: &[String],
    ) -> Result<Receipt> {
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
        if receipt.status != ReceiptStatus::DepositRequested {
            return Err(CustodyError::state(format!(
                "receipt not awaiting deposit verification (status {})",
                receipt.status
            )));
        }

        let group = groups.get_mut(&receipt.custody_address).ok_or_else(|| {
            CustodyError::not_found(format!("group {}", receipt.custody_address))
        })?;
        // Epoch binding: a receipt the group has force-advanced past can
        // never verify, even if the historical keeper set once matched.
        if group.working_receipt_id() != receipt.id {
            return Err(CustodyError::integrity(
                "receipt bound to a stale group epoch",
            ));
        }

        verify_threshold(
            group,
            &self.config.system_id,
            receipt_id,
            btc_txid,
            btc_height,
            signers,
            signatures,
        )?;
        check_capacity(group, group.current_balance_sats, receipt.amount_sats)?;

        let recipient = receipt.recipient.clone();
        let amount_sats = receipt.amount_sats;
        let gross = sats_to_units(amount_sats);
        let fee = fees.mint_fee(gross);

        self.token
            .mint(&recipient, gross - fee)
            .await
            .map_err(|e| CustodyError::token(e.to_string()))?;
        if fee > 0 {
            self.token
                .mint(FEE_ACCOUNT, fee)
                .await
                .map_err(|e| CustodyError::token(e.to_string()))?;
        }

        receipt.mark_deposit_received(btc_txid.to_string(), btc_height, now);
        group.credit(amount_sats, now);
        fees.accrue(fee);

        self.rewards.notify(&recipient, amount_sats, true).await;
        self.mirror_group(group);
        self.mirror_receipt(receipt);
        self.mirror_fees(fees);
        log_mint_event("mint_verified", receipt_id, caller, amount_sats);
        Ok(receipt.clone())
    }

    /// Revoke a pending deposit request; recipient only
    pub async fn revoke_mint(&self, caller: &str, receipt_id: &str) -> Result<()> {
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;

        let receipt = state
            .receipts
            .get_mut(receipt_id)
            .ok_or_else(|| CustodyError::not_found(format!("receipt {}", receipt_id)))?;
        if receipt.status != ReceiptStatus::DepositRequested {
            return Err(CustodyError::state(format!(
                "receipt not awaiting deposit verification (status {})",
                receipt.status
            )));
        }
        if receipt.recipient != caller {
            return Err(CustodyError::authorization(
                "only the receipt recipient may revoke",
            ));
        }

        receipt.mark_cleared(now);
        let amount_sats = receipt.amount_sats;
        self.mirror_receipt(receipt);
        log_mint_event("mint_revoked", receipt_id, caller, amount_sats);
        Ok(())
    }

    /// Force a stalled group forward and admit a new deposit request.
    ///
    /// All checks run before any effect: a bad nonce or amount rejects
    /// the whole call without touching the stalled receipt.
    pub async fn force_request_mint(
        &self,
        caller: &str,
        custody_address: &str,
        amount_sats: u64,
        next_nonce: u64,
    ) -> Result<Receipt> {
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        let CustodyState {
            groups,
            receipts,
            fees,
            ..
        } = &mut *state;

        let group = groups
            .get_mut(custody_address)
            .ok_or_else(|| CustodyError::not_found(format!("group {}", custody_address)))?;

        check_nonce(group, next_nonce)?;
        check_amount(amount_sats)?;

        let working_id = group.working_receipt_id();
        let plan = match receipts.get(&working_id) {
            None => ForcePlan::Fresh,
            Some(receipt) => match receipt.status {
                ReceiptStatus::Cleared => ForcePlan::Fresh,
                ReceiptStatus::DepositRequested => {
                    if now >= receipt.requested_at + self.config.mint_grace_secs {
                        ForcePlan::AutoRevoke
                    } else {
                        return Err(CustodyError::timing(
                            "deposit in progress: mint grace period not elapsed",
                        ));
                    }
                }
                ReceiptStatus::WithdrawRequested => {
                    if now >= receipt.requested_at + self.config.withdraw_verify_timeout_secs {
                        ForcePlan::AutoSettle
                    } else {
                        return Err(CustodyError::timing(
                            "withdraw in progress: verify timeout not elapsed",
                        ));
                    }
                }
                ReceiptStatus::DepositReceived => {
                    return Err(in_progress_error(ReceiptStatus::DepositReceived));
                }
            },
        };

        // A cooldown that predates this call still gates admission; the
        // one an auto-settle is about to start does not.
        if matches!(plan, ForcePlan::Fresh) && group.in_cooldown(now) {
            return Err(CustodyError::timing(format!(
                "group cooling down until {}",
                group.cooldown_until
            )));
        }

        let settled_sats = match plan {
            ForcePlan::AutoSettle => receipts.get(&working_id).map(|r| r.amount_sats).unwrap_or(0),
            _ => 0,
        };
        let projected = group.current_balance_sats.saturating_sub(settled_sats);
        check_capacity(group, projected, amount_sats)?;

        match plan {
            ForcePlan::Fresh => {}
            ForcePlan::AutoRevoke => {
                let receipt = receipts
                    .get_mut(&working_id)
                    .ok_or_else(|| CustodyError::not_found(format!("receipt {}", working_id)))?;
                receipt.mark_cleared(now);
                let amount = receipt.amount_sats;
                self.mirror_receipt(receipt);
                log_mint_event("mint_revoked", &working_id, caller, amount);
            }
            ForcePlan::AutoSettle => {
                let receipt = receipts
                    .get_mut(&working_id)
                    .ok_or_else(|| CustodyError::not_found(format!("receipt {}", working_id)))?;
                self.settle_burn(group, receipt, fees, caller, now).await?;
            }
        }

        let receipt = Receipt::new_deposit(custody_address, next_nonce, caller, amount_sats, now);
        group.advance_nonce(next_nonce, now);
        receipts.insert(receipt.clone());

        self.mirror_group(group);
        self.mirror_receipt(&receipt);
        log_mint_event("mint_requested", &receipt.id, caller, amount_sats);
        Ok(receipt)
    }
}

fn check_nonce(group: &Group, expected_nonce: u64) -> Result<()> {
    if expected_nonce != group.nonce + 1 {
        return Err(CustodyError::state(format!(
            "invalid nonce: expected {}, got {}",
            group.nonce + 1,
            expected_nonce
        )));
    }
    Ok(())
}

fn check_amount(amount_sats: u64) -> Result<()> {
    if amount_sats == 0 {
        return Err(CustodyError::state("amount must be positive"));
    }
    Ok(())
}

fn check_capacity(group: &Group, balance_sats: u64, amount_sats: u64) -> Result<()> {
    if balance_sats + amount_sats > group.capacity_sats {
        return Err(CustodyError::capacity(format!(
            "deposit of {} would back {} of {} capacity",
            amount_sats,
            balance_sats + amount_sats,
            group.capacity_sats
        )));
    }
    Ok(())
}

fn in_progress_error(status: ReceiptStatus) -> CustodyError {
    match status {
        ReceiptStatus::WithdrawRequested => CustodyError::state("withdraw in progress"),
        _ => CustodyError::state("deposit in progress"),
    }
}

/// Threshold attestation check: distinct current keepers meeting the
/// group's required count, each signature independently valid.
fn verify_threshold(
    group: &Group,
    system_id: &str,
    receipt_id: &str,
    btc_txid: &str,
    btc_height: u64,
    signers: &[String],
    signatures: &[String],
) -> Result<()> {
    if signers.len() != signatures.len() {
        return Err(CustodyError::integrity(format!(
            "{} signers but {} signatures",
            signers.len(),
            signatures.len()
        )));
    }

    let mut seen = HashSet::new();
    for signer in signers {
        if !seen.insert(signer.as_str()) {
            return Err(CustodyError::integrity(format!(
                "duplicate signer {}",
                signer
            )));
        }
        if !group.is_keeper(signer) {
            return Err(CustodyError::integrity(format!(
                "signer {} is not a keeper of {}",
                signer, group.custody_address
            )));
        }
    }
    if (signers.len() as u32) < group.required {
        return Err(CustodyError::integrity(format!(
            "insufficient signers: {} of {} required",
            signers.len(),
            group.required
        )));
    }

    validate_txid(btc_txid).map_err(|e| CustodyError::integrity(e.to_string()))?;

    let digest = attestation_digest(system_id, receipt_id, btc_txid, btc_height);
    for (signer, signature) in signers.iter().zip(signatures) {
        verify_attestation(signer, signature, &digest)
            .map_err(|e| CustodyError::integrity(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::attest::generate_keeper_key;
    use crate::clock::Clock;
    use crate::common::error::CustodyError;
    use crate::custody::service::{ESCROW_ACCOUNT, FEE_ACCOUNT};
    use crate::custody::testutil::*;
    use crate::external::TokenLedger;
    use crate::types::units::sats_to_units;
    use crate::types::ReceiptStatus;

    const AMOUNT: u64 = 60_000_000;

    #[tokio::test]
    async fn test_request_mint_advances_nonce() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        assert_eq!(receipt.status, ReceiptStatus::DepositRequested);
        assert_eq!(receipt.recipient, "alice");
        assert_eq!(receipt.requested_at, T0);

        let group = h.service.get_group(POOL).await.unwrap();
        assert_eq!(group.nonce, 1);
        assert_eq!(group.working_receipt_id(), receipt.id);
    }

    #[tokio::test]
    async fn test_request_mint_rejects_stale_nonce() {
        let h = Harness::new().await;
        for nonce in [0, 2, 7] {
            let result = h.service.request_mint("alice", POOL, AMOUNT, nonce).await;
            assert!(matches!(result, Err(CustodyError::State(_))), "nonce {}", nonce);
        }
        // The failed attempts consumed nothing
        assert_eq!(h.service.get_group(POOL).await.unwrap().nonce, 0);
    }

    #[tokio::test]
    async fn test_request_mint_rejects_while_in_progress() {
        let h = Harness::new().await;
        h.request("alice", AMOUNT, 1).await;

        let result = h.service.request_mint("bob", POOL, AMOUNT, 2).await;
        assert!(matches!(result, Err(CustodyError::State(_))));
    }

    #[tokio::test]
    async fn test_request_mint_validates_amount_and_capacity() {
        let h = Harness::new().await;

        let result = h.service.request_mint("alice", POOL, 0, 1).await;
        assert!(matches!(result, Err(CustodyError::State(_))));

        let result = h.service.request_mint("alice", POOL, CAPACITY + 1, 1).await;
        assert!(matches!(result, Err(CustodyError::Capacity(_))));
    }

    #[tokio::test]
    async fn test_request_mint_unknown_group() {
        let h = Harness::new().await;
        let result = h.service.request_mint("alice", "bc1q_ghost", AMOUNT, 1).await;
        assert!(matches!(result, Err(CustodyError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_verify_mint_credits_recipient() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        let (signers, signatures) = h.sign(&receipt.id, TXID, 3);
        let receipt = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
            .await
            .unwrap();

        assert_eq!(receipt.status, ReceiptStatus::DepositReceived);
        assert_eq!(receipt.btc_txid.as_deref(), Some(TXID));
        assert_eq!(receipt.btc_height, Some(HEIGHT));

        let group = h.service.get_group(POOL).await.unwrap();
        assert_eq!(group.current_balance_sats, AMOUNT);

        // 0.6 BTC at 10 bps: credit is gross minus fee, fee retained
        let gross = sats_to_units(AMOUNT);
        let fee = gross / 1_000;
        assert_eq!(h.token.balance_of("alice").await, gross - fee);
        assert_eq!(h.token.balance_of(FEE_ACCOUNT).await, fee);
        assert_eq!(h.service.fee_state().await.accrued_units, fee);

        let events = h.rewards.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_mint);
        assert_eq!(events[0].recipient, "alice");
    }

    #[tokio::test]
    async fn test_verify_mint_rejects_duplicate_signer() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        // Three entries but only two distinct keepers; the repeated
        // signature is genuine and must still be rejected.
        let (mut signers, mut signatures) = h.sign(&receipt.id, TXID, 2);
        signers.push(signers[0].clone());
        signatures.push(signatures[0].clone());

        let result = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
            .await;
        assert!(matches!(result, Err(CustodyError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_verify_mint_rejects_non_member() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        let (mut signers, mut signatures) = h.sign(&receipt.id, TXID, 2);
        let (outsider_key, outsider) = generate_keeper_key();
        let digest = crate::attest::attestation_digest(
            &h.service.config.system_id,
            &receipt.id,
            TXID,
            HEIGHT,
        );
        signers.push(outsider);
        signatures.push(crate::attest::sign_attestation(&outsider_key, &digest));

        let result = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
            .await;
        assert!(matches!(result, Err(CustodyError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_verify_mint_rejects_below_threshold() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        let (signers, signatures) = h.sign(&receipt.id, TXID, 2);
        let result = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
            .await;
        assert!(matches!(result, Err(CustodyError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_verify_mint_rejects_bad_signature() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        // Signatures over the wrong height do not bind this receipt
        let (signers, signatures) = h.sign(&receipt.id, TXID, 3);
        let result = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT + 1, &signers, &signatures)
            .await;
        assert!(matches!(result, Err(CustodyError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_verify_mint_rejects_stale_epoch() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        // Admin re-creates the group; the old keeper set still matches the
        // old receipt, but the epoch no longer does.
        let keeper_ids: Vec<String> = h.keepers.iter().map(|(_, id)| id.clone()).collect();
        h.service
            .create_group("admin", POOL, 3, CAPACITY, keeper_ids)
            .await
            .unwrap();

        let (signers, signatures) = h.sign(&receipt.id, TXID, 3);
        let result = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
            .await;
        assert!(matches!(result, Err(CustodyError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_verify_mint_wrong_state() {
        let h = Harness::new().await;
        let receipt = h.verified_deposit("alice", AMOUNT, 1).await;

        let (signers, signatures) = h.sign(&receipt.id, TXID, 3);
        let result = h
            .service
            .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
            .await;
        assert!(matches!(result, Err(CustodyError::State(_))));
    }

    #[tokio::test]
    async fn test_revoke_mint_recipient_only() {
        let h = Harness::new().await;
        let receipt = h.request("alice", AMOUNT, 1).await;

        let result = h.service.revoke_mint("bob", &receipt.id).await;
        assert!(matches!(result, Err(CustodyError::Authorization(_))));

        h.service.revoke_mint("alice", &receipt.id).await.unwrap();
        let receipt = h.service.get_receipt(&receipt.id).await.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Cleared);
        assert_eq!(receipt.cleared_at, T0);

        // The retired nonce is never reused
        let result = h.service.request_mint("alice", POOL, AMOUNT, 1).await;
        assert!(matches!(result, Err(CustodyError::State(_))));
        h.request("alice", AMOUNT, 2).await;
    }

    #[tokio::test]
    async fn test_force_request_before_grace_fails() {
        let h = Harness::new().await;
        h.request("alice", AMOUNT, 1).await;

        h.clock.advance(86_399);
        let result = h.service.force_request_mint("bob", POOL, AMOUNT, 2).await;
        assert!(matches!(result, Err(CustodyError::Timing(_))));
    }

    #[tokio::test]
    async fn test_force_request_auto_revokes_stalled_deposit() {
        let h = Harness::new().await;
        let stalled = h.request("alice", AMOUNT, 1).await;

        h.clock.advance(86_400);
        let receipt = h
            .service
            .force_request_mint("bob", POOL, AMOUNT, 2)
            .await
            .unwrap();

        assert_eq!(receipt.recipient, "bob");
        let stalled = h.service.get_receipt(&stalled.id).await.unwrap();
        assert_eq!(stalled.status, ReceiptStatus::Cleared);
        assert_eq!(h.service.get_group(POOL).await.unwrap().nonce, 2);
    }

    #[tokio::test]
    async fn test_force_request_settles_stalled_withdrawal() {
        let h = Harness::new().await;
        let receipt = h.verified_deposit("alice", AMOUNT, 1).await;

        let gross = sats_to_units(AMOUNT);
        let escrow = gross + gross / 1_000;
        h.token.seed("bob", escrow).await;
        h.service
            .request_burn("bob", &receipt.id, "bc1q_bob_payout")
            .await
            .unwrap();

        h.clock.advance(86_400);
        let fresh = h
            .service
            .force_request_mint("carol", POOL, AMOUNT, 2)
            .await
            .unwrap();
        assert_eq!(fresh.recipient, "carol");

        // The stalled withdrawal settled: balance released, escrow gone,
        // burn reward fired for the redeemer.
        let old = h.service.get_receipt(&receipt.id).await.unwrap();
        assert_eq!(old.status, ReceiptStatus::Cleared);
        assert_eq!(h.token.balance_of(ESCROW_ACCOUNT).await, 0);
        assert!(h.rewards.events().iter().any(|e| !e.is_mint && e.recipient == "bob"));

        // The settlement's own cooldown did not block the forced request,
        // but it is in force for everyone else afterwards.
        let group = h.service.get_group(POOL).await.unwrap();
        assert!(group.cooldown_until > h.clock.now());
    }

    #[tokio::test]
    async fn test_force_request_validates_nonce_before_forcing() {
        let h = Harness::new().await;
        let stalled = h.request("alice", AMOUNT, 1).await;

        h.clock.advance(86_400);
        let result = h.service.force_request_mint("bob", POOL, AMOUNT, 3).await;
        assert!(matches!(result, Err(CustodyError::State(_))));

        // Atomic rejection: the stalled receipt was not touched
        let stalled = h.service.get_receipt(&stalled.id).await.unwrap();
        assert_eq!(stalled.status, ReceiptStatus::DepositRequested);
    }

    #[tokio::test]
    async fn test_force_request_respects_preexisting_cooldown() {
        let h = Harness::new().await;
        let receipt = h.verified_deposit("alice", AMOUNT, 1).await;

        let gross = sats_to_units(AMOUNT);
        h.token.seed("bob", gross + gross / 1_000).await;
        h.service
            .request_burn("bob", &receipt.id, "bc1q_payout")
            .await
            .unwrap();
        h.service.verify_burn("keeper_relay", &receipt.id).await.unwrap();

        // Working slot is cleared; the force path has nothing to force and
        // must honor the cooldown the burn just started.
        let result = h.service.force_request_mint("carol", POOL, AMOUNT, 2).await;
        assert!(matches!(result, Err(CustodyError::Timing(_))));
    }

    #[tokio::test]
    async fn test_pause_rejects_mutations() {
        let h = Harness::new().await;
        h.service.set_paused("root", true).await.unwrap();

        let result = h.service.request_mint("alice", POOL, AMOUNT, 1).await;
        assert!(matches!(result, Err(CustodyError::Authorization(_))));

        h.service.set_paused("root", false).await.unwrap();
        assert!(h.service.request_mint("alice", POOL, AMOUNT, 1).await.is_ok());
    }
}
