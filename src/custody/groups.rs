//! Group Creation and Deletion
//!
//! Creation is an unconditional upsert guarded only by authorization,
//! keeper-set sanity and the collateral floor; re-creating an existing
//! address wholesale-replaces its committee and resets nonce and balance.
//! Deletion is idempotent but refuses to pull the address out from under
//! an in-flight or freshly cleared lifecycle.

use std::collections::HashSet;

use crate::attest::parse_keeper_key;
use crate::common::error::{CustodyError, Result};
use crate::custody::service::{ensure_unpaused, CustodyService};
use crate::external::Action;
use crate::logging::log_group_event;
use crate::types::{Group, ReceiptStatus};

impl CustodyService {
    /// Create (or wholesale-replace) a custody group
    pub async fn create_group(
        &self,
        caller: &str,
        custody_address: &str,
        required: u32,
        capacity_sats: u64,
        keepers: Vec<String>,
    ) -> Result<Group> {
        self.authorize(caller, Action::CreateGroup)?;

        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;

        if required == 0 || required as usize > keepers.len() {
            return Err(CustodyError::capacity(format!(
                "required {} outside keeper set of {}",
                required,
                keepers.len()
            )));
        }

        let mut seen = HashSet::new();
        for keeper in &keepers {
            if !seen.insert(keeper.as_str()) {
                return Err(CustodyError::integrity(format!(
                    "duplicate keeper {} in set",
                    keeper
                )));
            }
            parse_keeper_key(keeper)
                .map_err(|e| CustodyError::integrity(e.to_string()))?;
        }

        // Collateral floor, queried only at creation
        for keeper in &keepers {
            let collateral = self.authority.collateral_of(keeper).await;
            if collateral < self.config.min_keeper_collateral_sats {
                return Err(CustodyError::capacity(format!(
                    "keeper {} collateral {} below minimum {}",
                    keeper, collateral, self.config.min_keeper_collateral_sats
                )));
            }
        }

        let group = Group::new(custody_address, required, capacity_sats, keepers, now);
        state.groups.upsert(group.clone());
        self.mirror_group(&group);

        log_group_event(
            "group_created",
            custody_address,
            caller,
            serde_json::json!({
                "required": required,
                "capacity_sats": capacity_sats,
                "keepers": group.keepers.len(),
            }),
        );
        Ok(group)
    }

    /// Delete a custody group. Idempotent: deleting an absent group still
    /// succeeds and emits the deletion event.
    pub async fn delete_group(&self, caller: &str, custody_address: &str) -> Result<()> {
        self.authorize(caller, Action::DeleteGroup)?;

        let now = self.now();
        let mut state = self.state.write().await;
        ensure_unpaused(&state)?;

        if let Some(group) = state.groups.get(custody_address) {
            // Four independent guards; any one blocking rejects.
            if let Some(receipt) = state.receipts.get(&group.working_receipt_id()) {
                match receipt.status {
                    ReceiptStatus::DepositRequested => {
                        if now < receipt.requested_at + self.config.mint_grace_secs {
                            return Err(CustodyError::timing(
                                "deposit in progress: mint grace period not elapsed",
                            ));
                        }
                    }
                    ReceiptStatus::WithdrawRequested => {
                        if now < receipt.requested_at + self.config.withdraw_force_clear_secs {
                            return Err(CustodyError::timing(
                                "withdraw in progress: force-clear timeout not elapsed",
                            ));
                        }
                    }
                    ReceiptStatus::Cleared => {
                        if now < receipt.cleared_at + self.config.reusing_gap_secs {
                            return Err(CustodyError::timing(
                                "receipt just cleared: reusing gap not elapsed",
                            ));
                        }
                    }
                    ReceiptStatus::DepositReceived => {}
                }
            }

            if group.current_balance_sats > 0 {
                return Err(CustodyError::state(format!(
                    "group still backs {} sats",
                    group.current_balance_sats
                )));
            }

            state.groups.remove(custody_address);
            self.mirror_group_removed(custody_address);
        }

        log_group_event(
            "group_deleted",
            custody_address,
            caller,
            serde_json::json!({}),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::attest::generate_keeper_key;
    use crate::clock::ManualClock;
    use crate::config::CustodyConfig;
    use crate::external::mock::{
        InMemoryTokenLedger, RecordingRewardHook, StaticAuthorizer, StaticCollateral,
    };

    use super::*;

    const T0: u64 = 1_700_000_000;

    fn keeper_set(n: usize) -> Vec<String> {
        (0..n).map(|_| generate_keeper_key().1).collect()
    }

    fn service() -> (CustodyService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let service = CustodyService::new(
            CustodyConfig::default(),
            Arc::new(StaticCollateral::with_default(u64::MAX)),
            Arc::new(InMemoryTokenLedger::new()),
            Arc::new(RecordingRewardHook::new()),
            Arc::new(
                StaticAuthorizer::new()
                    .with_group_admin("admin")
                    .with_system_admin("root"),
            ),
        )
        .with_clock(clock.clone());
        (service, clock)
    }

    #[tokio::test]
    async fn test_create_group_happy_path() {
        let (service, _) = service();
        let group = service
            .create_group("admin", "bc1q_pool", 3, 60_000_000, keeper_set(4))
            .await
            .unwrap();

        assert_eq!(group.nonce, 0);
        assert_eq!(group.current_balance_sats, 0);
        assert_eq!(service.get_group("bc1q_pool").await.unwrap().required, 3);
    }

    #[tokio::test]
    async fn test_create_group_requires_role() {
        let (service, _) = service();
        let result = service
            .create_group("nobody", "bc1q_pool", 2, 1_000, keeper_set(3))
            .await;
        assert!(matches!(result, Err(CustodyError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_create_group_threshold_bounds() {
        let (service, _) = service();
        for required in [0, 5] {
            let result = service
                .create_group("admin", "bc1q_pool", required, 1_000, keeper_set(4))
                .await;
            assert!(matches!(result, Err(CustodyError::Capacity(_))));
        }
    }

    #[tokio::test]
    async fn test_create_group_rejects_duplicate_keeper() {
        let (service, _) = service();
        let mut keepers = keeper_set(3);
        keepers.push(keepers[0].clone());

        let result = service
            .create_group("admin", "bc1q_pool", 2, 1_000, keepers)
            .await;
        assert!(matches!(result, Err(CustodyError::Integrity(_))));
    }

    #[tokio::test]
    async fn test_create_group_checks_collateral() {
        let clock = Arc::new(ManualClock::new(T0));
        let keepers = keeper_set(3);
        let authority = StaticCollateral::with_default(u64::MAX).set(&keepers[1], 0);
        let service = CustodyService::new(
            CustodyConfig::default(),
            Arc::new(authority),
            Arc::new(InMemoryTokenLedger::new()),
            Arc::new(RecordingRewardHook::new()),
            Arc::new(StaticAuthorizer::new().with_group_admin("admin")),
        )
        .with_clock(clock);

        let result = service
            .create_group("admin", "bc1q_pool", 2, 1_000, keepers)
            .await;
        assert!(matches!(result, Err(CustodyError::Capacity(_))));
    }

    #[tokio::test]
    async fn test_create_group_overwrites_unconditionally() {
        let (service, _) = service();
        service
            .create_group("admin", "bc1q_pool", 2, 1_000, keeper_set(3))
            .await
            .unwrap();

        let replacement = keeper_set(5);
        let group = service
            .create_group("admin", "bc1q_pool", 4, 2_000, replacement.clone())
            .await
            .unwrap();
        assert_eq!(group.keepers, replacement);
        assert_eq!(group.capacity_sats, 2_000);
    }

    #[tokio::test]
    async fn test_delete_group_is_idempotent() {
        let (service, _) = service();
        assert!(service.delete_group("admin", "bc1q_ghost").await.is_ok());

        service
            .create_group("admin", "bc1q_pool", 2, 1_000, keeper_set(3))
            .await
            .unwrap();
        assert!(service.delete_group("admin", "bc1q_pool").await.is_ok());
        assert!(service.get_group("bc1q_pool").await.is_err());
        // Again, after it is gone
        assert!(service.delete_group("admin", "bc1q_pool").await.is_ok());
    }

    #[tokio::test]
    async fn test_recreate_after_delete_resets_counters() {
        let (service, _) = service();
        service
            .create_group("admin", "bc1q_pool", 2, 1_000, keeper_set(3))
            .await
            .unwrap();
        service.delete_group("admin", "bc1q_pool").await.unwrap();

        let group = service
            .create_group("admin", "bc1q_pool", 2, 1_000, keeper_set(3))
            .await
            .unwrap();
        assert_eq!(group.nonce, 0);
        assert_eq!(group.current_balance_sats, 0);
    }
}
