//! Unit Conversion Utilities
//!
//! Satoshi amounts (8 decimals) scale to pegged-token units (18 decimals)
//! by a factor of 10^10. Fee math runs on token units in basis points.

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Pegged-token units per satoshi (8-decimal to 18-decimal conversion)
pub const UNITS_PER_SAT: u128 = 10_000_000_000;

/// Basis-point denominator
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Convert a satoshi amount to pegged-token units
pub fn sats_to_units(sats: u64) -> u128 {
    sats as u128 * UNITS_PER_SAT
}

/// Convert pegged-token units back to satoshis (floor)
pub fn units_to_sats(units: u128) -> u64 {
    (units / UNITS_PER_SAT) as u64
}

/// Fee on a token-unit amount, in basis points
pub fn fee_units(units: u128, fee_bps: u64) -> u128 {
    units * fee_bps as u128 / BPS_DENOMINATOR
}

/// Convert satoshis to a BTC string (e.g., "0.00100000")
pub fn sats_to_btc_string(sats: u64) -> String {
    let btc = sats as f64 / SATS_PER_BTC as f64;
    format!("{:.8}", btc)
}

/// Human-readable satoshi amount
pub fn format_sats(sats: u64) -> String {
    format!("{} sats ({} BTC)", sats, sats_to_btc_string(sats))
}
