//! Fee Ledger and Admin Surface
//!
//! Mint and burn fees are independently configurable in basis points and
//! retained as pegged-token balance on the fee account; only an explicit
//! admin collection moves them out. The pause flag and fee knobs live
//! here because they share the SystemAdmin authority.

use crate::common::error::{CustodyError, Result};
use crate::custody::service::{ensure_unpaused, CustodyService, FEE_ACCOUNT};
use crate::external::Action;
use crate::logging::log_fees_event;
use crate::types::units::fee_units;

/// Runtime fee state: bps knobs plus the retained balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeState {
    pub mint_fee_bps: u64,
    pub burn_fee_bps: u64,
    /// Pegged-token units retained as protocol fee
    pub accrued_units: u128,
}

impl FeeState {
    pub fn new(mint_fee_bps: u64, burn_fee_bps: u64) -> Self {
        Self {
            mint_fee_bps,
            burn_fee_bps,
            accrued_units: 0,
        }
    }

    /// Mint fee on a gross token-unit amount
    pub fn mint_fee(&self, gross_units: u128) -> u128 {
        fee_units(gross_units, self.mint_fee_bps)
    }

    /// Burn fee on a gross token-unit amount
    pub fn burn_fee(&self, gross_units: u128) -> u128 {
        fee_units(gross_units, self.burn_fee_bps)
    }

    /// Retain collected fee units
    pub fn accrue(&mut self, units: u128) {
        self.accrued_units += units;
    }
}

impl CustodyService {
    /// Set or clear the global pause flag. SystemAdmin only; deliberately
    /// not gated on the flag itself, or the breaker could never be reset.
    pub async fn set_paused(&self, caller: &str, paused: bool) -> Result<()> {
        self.authorize(caller, Action::Pause)?;

        let mut state = self.state.write().await;
        state.paused = paused;

        log_fees_event("pause_set", caller, serde_json::json!({ "paused": paused }));
        Ok(())
    }

    /// Update the mint fee
    pub async fn set_mint_fee_bps(&self, caller: &str, bps: u64) -> Result<()> {
        self.authorize(caller, Action::UpdateFees)?;
        validate_bps(bps)?;

        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        state.fees.mint_fee_bps = bps;
        self.mirror_fees(&state.fees);

        log_fees_event("mint_fee_updated", caller, serde_json::json!({ "bps": bps }));
        Ok(())
    }

    /// Update the burn fee
    pub async fn set_burn_fee_bps(&self, caller: &str, bps: u64) -> Result<()> {
        self.authorize(caller, Action::UpdateFees)?;
        validate_bps(bps)?;

        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;
        state.fees.burn_fee_bps = bps;
        self.mirror_fees(&state.fees);

        log_fees_event("burn_fee_updated", caller, serde_json::json!({ "bps": bps }));
        Ok(())
    }

    /// Transfer up to the retained fee balance out of the fee account
    pub async fn collect_fee(&self, caller: &str, to: &str, amount_units: u128) -> Result<()> {
        self.authorize(caller, Action::CollectFees)?;

        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;

        if amount_units > state.fees.accrued_units {
            return Err(CustodyError::capacity(format!(
                "collect {} exceeds accrued fees {}",
                amount_units, state.fees.accrued_units
            )));
        }

        self.token
            .transfer(FEE_ACCOUNT, to, amount_units)
            .await
            .map_err(|e| CustodyError::token(e.to_string()))?;

        state.fees.accrued_units -= amount_units;
        self.mirror_fees(&state.fees);

        log_fees_event(
            "fee_collected",
            caller,
            serde_json::json!({ "to": to, "amount_units": amount_units.to_string() }),
        );
        Ok(())
    }
}

fn validate_bps(bps: u64) -> Result<()> {
    if bps > 10_000 {
        return Err(CustodyError::capacity(format!("fee bps {} exceeds 10000", bps)));
    }
    Ok(())
}
