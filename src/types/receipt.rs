//! Receipt Types
//!
//! A receipt records one deposit-or-withdrawal lifecycle instance for a
//! custody group:
//! cleared → deposit_requested → deposit_received → withdraw_requested → cleared
//!
//! Receipt ids are pure functions of (custody address, nonce); once a
//! receipt clears, its id is permanently retired.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derive the deterministic receipt id for a custody address and nonce.
///
/// `hex(SHA-256(address, ":", nonce_be))`, stateless, so any client can
/// recompute it to address a receipt.
pub fn receipt_id(custody_address: &str, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(custody_address.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Status of a receipt through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Terminal: lifecycle finished, id retired
    Cleared,
    /// Deposit claimed, awaiting keeper attestation
    DepositRequested,
    /// Deposit verified, pegged tokens credited, funds held
    DepositReceived,
    /// Withdrawal requested, escrow held, awaiting settlement
    WithdrawRequested,
}

impl ReceiptStatus {
    /// Cleared is the only terminal status; everything else occupies the
    /// group's single working slot.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cleared)
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cleared => "cleared",
            Self::DepositRequested => "deposit_requested",
            Self::DepositReceived => "deposit_received",
            Self::WithdrawRequested => "withdraw_requested",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cleared" => Ok(Self::Cleared),
            "deposit_requested" => Ok(Self::DepositRequested),
            "deposit_received" => Ok(Self::DepositReceived),
            "withdraw_requested" => Ok(Self::WithdrawRequested),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// One deposit-or-withdrawal lifecycle instance for a custody group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Deterministic id: hash(custody_address, nonce)
    pub id: String,
    /// Custody address of the owning group
    pub custody_address: String,
    /// Current claim owner (depositor, then redeemer once a withdrawal is
    /// requested)
    pub recipient: String,
    /// Amount in satoshis
    pub amount_sats: u64,
    /// Current status
    pub status: ReceiptStatus,
    /// Off-chain destination of a requested withdrawal
    pub withdraw_destination: Option<String>,
    /// Bitcoin transaction attested to have funded this receipt
    pub btc_txid: Option<String>,
    /// Block height of the attested transaction
    pub btc_height: Option<u64>,
    /// Pegged-token units escrowed while withdraw_requested (principal + fee)
    pub escrow_units: u128,
    /// Fee portion of the escrow, fixed at request time
    pub escrow_fee_units: u128,
    /// When the current deposit/withdraw request was made
    pub requested_at: u64,
    /// When the receipt cleared (starts the reusing-gap clock)
    pub cleared_at: u64,
    /// Timestamp when the receipt was created
    pub created_at: u64,
    /// Timestamp of last update
    pub updated_at: u64,
}

impl Receipt {
    /// Create a new deposit-requested receipt for (address, nonce)
    pub fn new_deposit(
        custody_address: &str,
        nonce: u64,
        recipient: &str,
        amount_sats: u64,
        now: u64,
    ) -> Self {
        Self {
            id: receipt_id(custody_address, nonce),
            custody_address: custody_address.to_string(),
            recipient: recipient.to_string(),
            amount_sats,
            status: ReceiptStatus::DepositRequested,
            withdraw_destination: None,
            btc_txid: None,
            btc_height: None,
            escrow_units: 0,
            escrow_fee_units: 0,
            requested_at: now,
            cleared_at: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the deposit as verified
    pub fn mark_deposit_received(&mut self, btc_txid: String, btc_height: u64, now: u64) {
        self.btc_txid = Some(btc_txid);
        self.btc_height = Some(btc_height);
        self.status = ReceiptStatus::DepositReceived;
        self.touch(now);
    }

    /// Mark a withdrawal request, reassigning the claim to the redeemer
    pub fn mark_withdraw_requested(
        &mut self,
        redeemer: &str,
        destination: String,
        escrow_units: u128,
        escrow_fee_units: u128,
        now: u64,
    ) {
        self.recipient = redeemer.to_string();
        self.withdraw_destination = Some(destination);
        self.escrow_units = escrow_units;
        self.escrow_fee_units = escrow_fee_units;
        self.status = ReceiptStatus::WithdrawRequested;
        self.requested_at = now;
        self.touch(now);
    }

    /// Clear the receipt, retiring its id and starting the reusing-gap clock
    pub fn mark_cleared(&mut self, now: u64) {
        self.status = ReceiptStatus::Cleared;
        self.escrow_units = 0;
        self.escrow_fee_units = 0;
        self.cleared_at = now;
        self.touch(now);
    }

    /// Revert a recovered withdrawal back to the holding state
    pub fn revert_to_deposit_received(&mut self, now: u64) {
        self.status = ReceiptStatus::DepositReceived;
        self.withdraw_destination = None;
        self.escrow_units = 0;
        self.escrow_fee_units = 0;
        self.touch(now);
    }

    /// Escrowed principal (escrow minus the fee portion)
    pub fn escrow_principal_units(&self) -> u128 {
        self.escrow_units.saturating_sub(self.escrow_fee_units)
    }

    fn touch(&mut self, now: u64) {
        self.updated_at = now;
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// POST /api/mint/request
#[derive(Debug, Deserialize)]
pub struct RequestMintRequest {
    pub custody_address: String,
    pub amount_sats: u64,
    pub expected_nonce: u64,
}

/// POST /api/mint/verify
#[derive(Debug, Deserialize)]
pub struct VerifyMintRequest {
    pub receipt_id: String,
    pub btc_txid: String,
    pub btc_height: u64,
    /// Hex-encoded compressed keeper public keys
    pub signers: Vec<String>,
    /// Hex-encoded compact ECDSA signatures, parallel to `signers`
    pub signatures: Vec<String>,
}

/// POST /api/mint/revoke and /api/burn/verify and /api/burn/recover
#[derive(Debug, Deserialize)]
pub struct ReceiptRefRequest {
    pub receipt_id: String,
}

/// POST /api/mint/force-request
#[derive(Debug, Deserialize)]
pub struct ForceRequestMintRequest {
    pub custody_address: String,
    pub amount_sats: u64,
    pub next_nonce: u64,
}

/// POST /api/burn/request
#[derive(Debug, Deserialize)]
pub struct RequestBurnRequest {
    pub receipt_id: String,
    pub withdraw_destination: String,
}

/// POST /api/refunds
#[derive(Debug, Deserialize)]
pub struct RecordRefundRequest {
    pub custody_address: String,
    pub btc_txid: String,
}

/// Receipt snapshot for API responses
#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub id: String,
    pub custody_address: String,
    pub recipient: String,
    pub amount_sats: u64,
    pub status: String,
    pub withdraw_destination: Option<String>,
    pub btc_txid: Option<String>,
    pub btc_height: Option<u64>,
    /// u128 units serialized as a string
    pub escrow_units: String,
    pub requested_at: u64,
    pub cleared_at: u64,
    pub updated_at: u64,
}

impl From<&Receipt> for ReceiptResponse {
    fn from(receipt: &Receipt) -> Self {
        Self {
            id: receipt.id.clone(),
            custody_address: receipt.custody_address.clone(),
            recipient: receipt.recipient.clone(),
            amount_sats: receipt.amount_sats,
            status: receipt.status.to_string(),
            withdraw_destination: receipt.withdraw_destination.clone(),
            btc_txid: receipt.btc_txid.clone(),
            btc_height: receipt.btc_height,
            escrow_units: receipt.escrow_units.to_string(),
            requested_at: receipt.requested_at,
            cleared_at: receipt.cleared_at,
            updated_at: receipt.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_id_is_deterministic() {
        let a = receipt_id("bc1q_group_a", 1);
        let b = receipt_id("bc1q_group_a", 1);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_receipt_id_distinct_per_nonce_and_address() {
        let base = receipt_id("bc1q_group_a", 1);
        assert_ne!(base, receipt_id("bc1q_group_a", 2));
        assert_ne!(base, receipt_id("bc1q_group_b", 1));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ReceiptStatus::Cleared,
            ReceiptStatus::DepositRequested,
            ReceiptStatus::DepositReceived,
            ReceiptStatus::WithdrawRequested,
        ] {
            let parsed: ReceiptStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<ReceiptStatus>().is_err());
    }

    #[test]
    fn test_only_cleared_is_terminal() {
        assert!(ReceiptStatus::Cleared.is_terminal());
        assert!(!ReceiptStatus::DepositRequested.is_terminal());
        assert!(!ReceiptStatus::DepositReceived.is_terminal());
        assert!(!ReceiptStatus::WithdrawRequested.is_terminal());
    }

    #[test]
    fn test_receipt_lifecycle() {
        let mut receipt = Receipt::new_deposit("bc1q_group", 1, "alice", 60_000_000, 100);
        assert_eq!(receipt.status, ReceiptStatus::DepositRequested);
        assert_eq!(receipt.recipient, "alice");
        assert_eq!(receipt.requested_at, 100);

        receipt.mark_deposit_received("txid".to_string(), 800_000, 200);
        assert_eq!(receipt.status, ReceiptStatus::DepositReceived);
        assert_eq!(receipt.btc_height, Some(800_000));

        receipt.mark_withdraw_requested("bob", "bc1q_dest".to_string(), 1_000, 10, 300);
        assert_eq!(receipt.status, ReceiptStatus::WithdrawRequested);
        assert_eq!(receipt.recipient, "bob");
        assert_eq!(receipt.requested_at, 300);
        assert_eq!(receipt.escrow_principal_units(), 990);

        receipt.mark_cleared(400);
        assert_eq!(receipt.status, ReceiptStatus::Cleared);
        assert_eq!(receipt.cleared_at, 400);
        assert_eq!(receipt.escrow_units, 0);
    }

    #[test]
    fn test_recover_reverts_escrow() {
        let mut receipt = Receipt::new_deposit("bc1q_group", 1, "alice", 1_000, 100);
        receipt.mark_deposit_received("txid".to_string(), 1, 200);
        receipt.mark_withdraw_requested("bob", "dest".to_string(), 500, 5, 300);

        receipt.revert_to_deposit_received(400);
        assert_eq!(receipt.status, ReceiptStatus::DepositReceived);
        assert!(receipt.withdraw_destination.is_none());
        assert_eq!(receipt.escrow_units, 0);
        // The redeemer keeps the claim after a recovery
        assert_eq!(receipt.recipient, "bob");
    }
}
