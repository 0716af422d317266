//! Custody state machine: service root and lifecycle controllers.

pub mod burn;
pub mod fees;
pub mod groups;
pub mod mint;
pub mod refund;
pub mod service;

pub use fees::FeeState;
pub use refund::RefundSlot;
pub use service::{CustodyService, CustodyState, CustodyStats, ESCROW_ACCOUNT, FEE_ACCOUNT};

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared harness for controller tests: one 3-of-4 group with real
    //! keeper keys and in-memory collaborators.

    use std::sync::Arc;

    use secp256k1::SecretKey;

    use crate::attest::{attestation_digest, generate_keeper_key, sign_attestation};
    use crate::clock::ManualClock;
    use crate::config::CustodyConfig;
    use crate::external::mock::{
        InMemoryTokenLedger, RecordingRewardHook, StaticAuthorizer, StaticCollateral,
    };
    use crate::types::Receipt;

    use super::service::CustodyService;

    pub const T0: u64 = 1_700_000_000;
    pub const POOL: &str = "bc1q_pool_main";
    pub const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
    pub const TXID_B: &str = "9b0fc92260312ce44e74ef369f5c66bbb85848f2eddd5a7a1cde251e54ccfdd5";
    pub const HEIGHT: u64 = 800_000;
    pub const CAPACITY: u64 = 60_000_000;

    pub struct Harness {
        pub service: CustodyService,
        pub clock: Arc<ManualClock>,
        pub token: Arc<InMemoryTokenLedger>,
        pub rewards: Arc<RecordingRewardHook>,
        pub keepers: Vec<(SecretKey, String)>,
    }

    impl Harness {
        /// Service with a fresh 3-of-4 group at `POOL`, capacity 0.6 BTC
        pub async fn new() -> Self {
            Self::with_config(CustodyConfig::default()).await
        }

        pub async fn with_config(config: CustodyConfig) -> Self {
            let clock = Arc::new(ManualClock::new(T0));
            let token = Arc::new(InMemoryTokenLedger::new());
            let rewards = Arc::new(RecordingRewardHook::new());
            let keepers: Vec<(SecretKey, String)> =
                (0..4).map(|_| generate_keeper_key()).collect();

            let service = CustodyService::new(
                config,
                Arc::new(StaticCollateral::with_default(u64::MAX)),
                token.clone(),
                rewards.clone(),
                Arc::new(
                    StaticAuthorizer::new()
                        .with_group_admin("admin")
                        .with_system_admin("root"),
                ),
            )
            .with_clock(clock.clone());

            let keeper_ids: Vec<String> = keepers.iter().map(|(_, id)| id.clone()).collect();
            service
                .create_group("admin", POOL, 3, CAPACITY, keeper_ids)
                .await
                .unwrap();

            Self {
                service,
                clock,
                token,
                rewards,
                keepers,
            }
        }

        /// Attestations from the first `count` keepers
        pub fn sign(&self, receipt_id: &str, txid: &str, count: usize) -> (Vec<String>, Vec<String>) {
            let digest = attestation_digest(
                &self.service.config.system_id,
                receipt_id,
                txid,
                HEIGHT,
            );
            let mut signers = Vec::new();
            let mut signatures = Vec::new();
            for (secret, id) in self.keepers.iter().take(count) {
                signers.push(id.clone());
                signatures.push(sign_attestation(secret, &digest));
            }
            (signers, signatures)
        }

        /// Request a deposit on the harness group
        pub async fn request(&self, caller: &str, amount_sats: u64, nonce: u64) -> Receipt {
            self.service
                .request_mint(caller, POOL, amount_sats, nonce)
                .await
                .unwrap()
        }

        /// Request and verify a deposit, returning the holding receipt
        pub async fn verified_deposit(&self, caller: &str, amount_sats: u64, nonce: u64) -> Receipt {
            let receipt = self.request(caller, amount_sats, nonce).await;
            let (signers, signatures) = self.sign(&receipt.id, TXID, 3);
            self.service
                .verify_mint("keeper_relay", &receipt.id, TXID, HEIGHT, &signers, &signatures)
                .await
                .unwrap()
        }
    }
}
