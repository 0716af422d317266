//! Environment-based Configuration for the kBTC Custody Backend
//!
//! All tunable windows and fees are loaded from environment variables with
//! production defaults. Nothing here is secret; keeper keys live with the
//! keepers, never with this service.
//!
//! # Environment Variables
//!
//! ## Lifecycle windows (seconds)
//! - `KBTC_MINT_GRACE_SECS` - deposit grace period before forced revoke (default: 86400)
//! - `KBTC_WITHDRAW_VERIFY_TIMEOUT_SECS` - stalled-withdrawal force-settle timeout (default: 86400)
//! - `KBTC_WITHDRAW_FORCE_CLEAR_SECS` - withdrawal window gating group deletion (default: 172800)
//! - `KBTC_REUSING_GAP_SECS` - wait after a receipt clears before its group may be deleted (default: 3600)
//! - `KBTC_BURN_COOLDOWN_SECS` - post-burn wait before a new deposit request (default: 3600)
//! - `KBTC_REFUND_GAP_SECS` - minimum interval between refund-slot writes (default: 21600)
//!
//! ## Fees and collateral
//! - `KBTC_MINT_FEE_BPS` - mint fee in basis points (default: 10)
//! - `KBTC_BURN_FEE_BPS` - burn fee in basis points (default: 10)
//! - `KBTC_MIN_KEEPER_COLLATERAL_SATS` - collateral floor checked at group creation (default: 100000000)
//!
//! ## Service
//! - `KBTC_SYSTEM_ID` - attestation domain identity bound into signed digests
//! - `KBTC_DB_PATH` - sqlite mirror path; unset disables persistence
//! - `KBTC_API_PORT` - REST API port (default: 3001)
//! - `KBTC_LOG_LEVEL` - debug/info/warn/error (default: info)
//! - `KBTC_LOG_JSON` - set to "1" for JSON log output

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct CustodyConfig {
    /// Attestation domain identity; every keeper signature binds to it
    pub system_id: String,

    /// Deposit grace period before a stalled request may be force-revoked
    pub mint_grace_secs: u64,

    /// Stalled-withdrawal timeout before forced settlement
    pub withdraw_verify_timeout_secs: u64,

    /// Withdrawal window that gates group deletion
    pub withdraw_force_clear_secs: u64,

    /// Wait after a receipt clears before its group may be deleted
    pub reusing_gap_secs: u64,

    /// Post-burn wait before the group admits a new deposit request
    pub burn_cooldown_secs: u64,

    /// Minimum interval between refund-slot writes
    pub refund_gap_secs: u64,

    /// Mint fee in basis points
    pub mint_fee_bps: u64,

    /// Burn fee in basis points
    pub burn_fee_bps: u64,

    /// Collateral floor each keeper must meet at group creation
    pub min_keeper_collateral_sats: u64,

    /// Path to the sqlite mirror; `None` disables persistence
    pub db_path: Option<String>,

    /// REST API port
    pub api_port: u16,

    /// Log level
    pub log_level: String,

    /// JSON log output
    pub log_json: bool,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            system_id: "kbtc-custody-v1".to_string(),
            mint_grace_secs: 86_400,
            withdraw_verify_timeout_secs: 86_400,
            withdraw_force_clear_secs: 172_800,
            reusing_gap_secs: 3_600,
            burn_cooldown_secs: 3_600,
            refund_gap_secs: 21_600,
            mint_fee_bps: 10,
            burn_fee_bps: 10,
            min_keeper_collateral_sats: 100_000_000,
            db_path: None,
            api_port: 3001,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl CustodyConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            system_id: env::var("KBTC_SYSTEM_ID").unwrap_or(defaults.system_id),
            mint_grace_secs: parse_secs("KBTC_MINT_GRACE_SECS", defaults.mint_grace_secs)?,
            withdraw_verify_timeout_secs: parse_secs(
                "KBTC_WITHDRAW_VERIFY_TIMEOUT_SECS",
                defaults.withdraw_verify_timeout_secs,
            )?,
            withdraw_force_clear_secs: parse_secs(
                "KBTC_WITHDRAW_FORCE_CLEAR_SECS",
                defaults.withdraw_force_clear_secs,
            )?,
            reusing_gap_secs: parse_secs("KBTC_REUSING_GAP_SECS", defaults.reusing_gap_secs)?,
            burn_cooldown_secs: parse_secs("KBTC_BURN_COOLDOWN_SECS", defaults.burn_cooldown_secs)?,
            refund_gap_secs: parse_secs("KBTC_REFUND_GAP_SECS", defaults.refund_gap_secs)?,
            mint_fee_bps: parse_u64("KBTC_MINT_FEE_BPS", defaults.mint_fee_bps)?,
            burn_fee_bps: parse_u64("KBTC_BURN_FEE_BPS", defaults.burn_fee_bps)?,
            min_keeper_collateral_sats: parse_u64(
                "KBTC_MIN_KEEPER_COLLATERAL_SATS",
                defaults.min_keeper_collateral_sats,
            )?,
            db_path: env::var("KBTC_DB_PATH").ok().filter(|p| !p.is_empty()),
            api_port: parse_u64("KBTC_API_PORT", defaults.api_port as u64)? as u16,
            log_level: env::var("KBTC_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("KBTC_LOG_JSON").map(|v| v == "1").unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mint_fee_bps > 10_000 {
            return Err(ConfigError::InvalidValue(
                "KBTC_MINT_FEE_BPS".to_string(),
                format!("{} exceeds 10000", self.mint_fee_bps),
            ));
        }
        if self.burn_fee_bps > 10_000 {
            return Err(ConfigError::InvalidValue(
                "KBTC_BURN_FEE_BPS".to_string(),
                format!("{} exceeds 10000", self.burn_fee_bps),
            ));
        }
        // The deletion gate must be at least as patient as the forced-settle
        // timeout, otherwise a group could be deleted under a withdrawal
        // that is still eligible for settlement.
        if self.withdraw_force_clear_secs < self.withdraw_verify_timeout_secs {
            return Err(ConfigError::Inconsistent(format!(
                "force-clear window ({}) shorter than verify timeout ({})",
                self.withdraw_force_clear_secs, self.withdraw_verify_timeout_secs
            )));
        }
        if self.system_id.is_empty() {
            return Err(ConfigError::InvalidValue(
                "KBTC_SYSTEM_ID".to_string(),
                "must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_u64(var_name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var_name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var_name.to_string(), value)),
        Err(_) => Ok(default),
    }
}

fn parse_secs(var_name: &str, default: u64) -> Result<u64, ConfigError> {
    let secs = parse_u64(var_name, default)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue(
            var_name.to_string(),
            "must be positive".to_string(),
        ));
    }
    Ok(secs)
}
