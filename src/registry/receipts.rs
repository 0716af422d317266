//! Receipt Ledger
//!
//! Owns the `Receipt` entities, keyed by their deterministic id. Pure CRUD
//! plus the scans the refund path and the invariant checks need.

use std::collections::HashMap;

use crate::types::{Receipt, ReceiptStatus};

/// In-memory receipt store
#[derive(Debug, Default)]
pub struct ReceiptLedger {
    receipts: HashMap<String, Receipt>,
}

impl ReceiptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a receipt
    pub fn insert(&mut self, receipt: Receipt) {
        self.receipts.insert(receipt.id.clone(), receipt);
    }

    /// Get a receipt by id
    pub fn get(&self, id: &str) -> Option<&Receipt> {
        self.receipts.get(id)
    }

    /// Get a mutable receipt by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Receipt> {
        self.receipts.get_mut(id)
    }

    /// Any receipt that has recorded the given Bitcoin transaction.
    ///
    /// A txid is only ever recorded by a verified deposit, so a hit means
    /// the transaction is owned and must not be treated as a refund.
    pub fn find_by_btc_txid(&self, btc_txid: &str) -> Option<&Receipt> {
        self.receipts
            .values()
            .find(|r| r.btc_txid.as_deref() == Some(btc_txid))
    }

    /// All receipts with the given status
    pub fn get_by_status(&self, status: ReceiptStatus) -> Vec<&Receipt> {
        self.receipts
            .values()
            .filter(|r| r.status == status)
            .collect()
    }

    /// Non-terminal receipts belonging to one group (the single-slot
    /// invariant says this is never more than one)
    pub fn non_terminal_for(&self, custody_address: &str) -> Vec<&Receipt> {
        self.receipts
            .values()
            .filter(|r| r.custody_address == custody_address && !r.status.is_terminal())
            .collect()
    }

    /// All receipts
    pub fn all(&self) -> impl Iterator<Item = &Receipt> {
        self.receipts.values()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// Per-status counts
    pub fn stats(&self) -> ReceiptLedgerStats {
        let mut stats = ReceiptLedgerStats {
            total: self.receipts.len() as u64,
            ..Default::default()
        };
        for receipt in self.receipts.values() {
            match receipt.status {
                ReceiptStatus::Cleared => stats.cleared += 1,
                ReceiptStatus::DepositRequested => stats.deposit_requested += 1,
                ReceiptStatus::DepositReceived => stats.deposit_received += 1,
                ReceiptStatus::WithdrawRequested => stats.withdraw_requested += 1,
            }
        }
        stats
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReceiptLedgerStats {
    pub total: u64,
    pub cleared: u64,
    pub deposit_requested: u64,
    pub deposit_received: u64,
    pub withdraw_requested: u64,
}
