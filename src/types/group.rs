//! Group Types
//!
//! A group is one pooled custody address held jointly by a keeper
//! committee. The keeper set is fixed at creation and only ever replaced
//! wholesale by re-creation; partial edits do not exist.

use serde::{Deserialize, Serialize};

use super::receipt::receipt_id;

/// A pooled custody address with its keeper committee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Custody address (the group key)
    pub custody_address: String,
    /// Minimum distinct signer count for verification
    pub required: u32,
    /// Maximum backed amount in satoshis
    pub capacity_sats: u64,
    /// Currently backed amount in satoshis
    pub current_balance_sats: u64,
    /// Monotonically increasing receipt counter
    pub nonce: u64,
    /// Ordered keeper set: hex-encoded compressed secp256k1 public keys
    pub keepers: Vec<String>,
    /// Unix time until which new deposit requests are rejected (0 = none)
    pub cooldown_until: u64,
    /// Timestamp when the group was (re-)created
    pub created_at: u64,
    /// Timestamp of last update
    pub updated_at: u64,
}

impl Group {
    /// Create a fresh group; nonce and balance always start at zero
    pub fn new(
        custody_address: &str,
        required: u32,
        capacity_sats: u64,
        keepers: Vec<String>,
        now: u64,
    ) -> Self {
        Self {
            custody_address: custody_address.to_string(),
            required,
            capacity_sats,
            current_balance_sats: 0,
            nonce: 0,
            keepers,
            cooldown_until: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Id of the single receipt slot this group currently owns
    pub fn working_receipt_id(&self) -> String {
        receipt_id(&self.custody_address, self.nonce)
    }

    /// Whether the given key is a current committee member
    pub fn is_keeper(&self, keeper: &str) -> bool {
        self.keepers.iter().any(|k| k == keeper)
    }

    /// Whether the post-burn cooldown window is still open
    pub fn in_cooldown(&self, now: u64) -> bool {
        now < self.cooldown_until
    }

    /// Advance the nonce after admitting a new deposit request
    pub fn advance_nonce(&mut self, nonce: u64, now: u64) {
        self.nonce = nonce;
        self.touch(now);
    }

    /// Credit a verified deposit
    pub fn credit(&mut self, amount_sats: u64, now: u64) {
        self.current_balance_sats += amount_sats;
        self.touch(now);
    }

    /// Debit a settled withdrawal (saturating: an orphaned pre-overwrite
    /// receipt must not poison the current epoch)
    pub fn debit(&mut self, amount_sats: u64, now: u64) {
        self.current_balance_sats = self.current_balance_sats.saturating_sub(amount_sats);
        self.touch(now);
    }

    /// Open the post-burn cooldown window
    pub fn begin_cooldown(&mut self, until: u64, now: u64) {
        self.cooldown_until = until;
        self.touch(now);
    }

    fn touch(&mut self, now: u64) {
        self.updated_at = now;
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// POST /api/groups
#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub custody_address: String,
    pub required: u32,
    pub capacity_sats: u64,
    pub keepers: Vec<String>,
}

/// Group snapshot for API responses
#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub custody_address: String,
    pub required: u32,
    pub capacity_sats: u64,
    pub current_balance_sats: u64,
    pub nonce: u64,
    pub keepers: Vec<String>,
    pub working_receipt_id: String,
    pub cooldown_until: u64,
    pub updated_at: u64,
}

impl From<&Group> for GroupResponse {
    fn from(group: &Group) -> Self {
        Self {
            custody_address: group.custody_address.clone(),
            required: group.required,
            capacity_sats: group.capacity_sats,
            current_balance_sats: group.current_balance_sats,
            nonce: group.nonce,
            keepers: group.keepers.clone(),
            working_receipt_id: group.working_receipt_id(),
            cooldown_until: group.cooldown_until,
            updated_at: group.updated_at,
        }
    }
}
