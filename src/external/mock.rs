//! In-Memory Collaborator Implementations
//!
//! Stateful fakes for the external seams, used by the test suite and the
//! demo binary. Balances and notifications are real enough to assert on.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::traits::{Action, Authorizer, KeeperAuthority, RewardHook, TokenError, TokenLedger};

/// Collateral registry backed by a static map
#[derive(Default)]
pub struct StaticCollateral {
    amounts: HashMap<String, u64>,
    default_sats: u64,
}

impl StaticCollateral {
    /// Every unknown keeper reports the given collateral
    pub fn with_default(default_sats: u64) -> Self {
        Self {
            amounts: HashMap::new(),
            default_sats,
        }
    }

    /// Pin one keeper's collateral
    pub fn set(mut self, keeper: &str, sats: u64) -> Self {
        self.amounts.insert(keeper.to_string(), sats);
        self
    }
}

#[async_trait]
impl KeeperAuthority for StaticCollateral {
    async fn collateral_of(&self, keeper: &str) -> u64 {
        *self.amounts.get(keeper).unwrap_or(&self.default_sats)
    }
}

/// Pegged-token ledger backed by a balance map
#[derive(Default)]
pub struct InMemoryTokenLedger {
    balances: RwLock<HashMap<String, u128>>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account balance
    pub async fn seed(&self, account: &str, units: u128) {
        self.balances
            .write()
            .await
            .insert(account.to_string(), units);
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokenLedger {
    async fn mint(&self, account: &str, units: u128) -> Result<(), TokenError> {
        let mut balances = self.balances.write().await;
        *balances.entry(account.to_string()).or_insert(0) += units;
        Ok(())
    }

    async fn burn(&self, account: &str, units: u128) -> Result<(), TokenError> {
        let mut balances = self.balances.write().await;
        let balance = balances.entry(account.to_string()).or_insert(0);
        if *balance < units {
            return Err(TokenError::InsufficientBalance {
                account: account.to_string(),
                needed: units,
                available: *balance,
            });
        }
        *balance -= units;
        Ok(())
    }

    async fn transfer(&self, from: &str, to: &str, units: u128) -> Result<(), TokenError> {
        let mut balances = self.balances.write().await;
        let from_balance = balances.entry(from.to_string()).or_insert(0);
        if *from_balance < units {
            return Err(TokenError::InsufficientBalance {
                account: from.to_string(),
                needed: units,
                available: *from_balance,
            });
        }
        *from_balance -= units;
        *balances.entry(to.to_string()).or_insert(0) += units;
        Ok(())
    }

    async fn balance_of(&self, account: &str) -> u128 {
        *self.balances.read().await.get(account).unwrap_or(&0)
    }
}

/// A recorded reward notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardEvent {
    pub recipient: String,
    pub amount_sats: u64,
    pub is_mint: bool,
}

/// Reward hook that records every notification
#[derive(Default)]
pub struct RecordingRewardHook {
    events: Mutex<Vec<RewardEvent>>,
}

impl RecordingRewardHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RewardEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewardHook for RecordingRewardHook {
    async fn notify(&self, recipient: &str, amount_sats: u64, is_mint: bool) {
        self.events.lock().unwrap().push(RewardEvent {
            recipient: recipient.to_string(),
            amount_sats,
            is_mint,
        });
    }
}

/// Authorizer backed by two static role sets
#[derive(Default)]
pub struct StaticAuthorizer {
    group_admins: HashSet<String>,
    system_admins: HashSet<String>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_admin(mut self, account: &str) -> Self {
        self.group_admins.insert(account.to_string());
        self
    }

    pub fn with_system_admin(mut self, account: &str) -> Self {
        self.system_admins.insert(account.to_string());
        self
    }
}

impl Authorizer for StaticAuthorizer {
    fn can(&self, caller: &str, action: Action) -> bool {
        match action {
            Action::CreateGroup | Action::DeleteGroup => self.group_admins.contains(caller),
            Action::Pause | Action::UpdateFees | Action::CollectFees | Action::RecoverBurn => {
                self.system_admins.contains(caller)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_ledger_balances() {
        let ledger = InMemoryTokenLedger::new();
        ledger.mint("alice", 1_000).await.unwrap();
        ledger.transfer("alice", "bob", 400).await.unwrap();
        ledger.burn("bob", 100).await.unwrap();

        assert_eq!(ledger.balance_of("alice").await, 600);
        assert_eq!(ledger.balance_of("bob").await, 300);
    }

    #[tokio::test]
    async fn test_token_ledger_rejects_overdraft() {
        let ledger = InMemoryTokenLedger::new();
        ledger.mint("alice", 50).await.unwrap();

        let result = ledger.transfer("alice", "bob", 100).await;
        assert!(matches!(
            result,
            Err(TokenError::InsufficientBalance { .. })
        ));
        // Nothing moved
        assert_eq!(ledger.balance_of("alice").await, 50);
        assert_eq!(ledger.balance_of("bob").await, 0);
    }

    #[tokio::test]
    async fn test_reward_hook_records() {
        let hook = RecordingRewardHook::new();
        hook.notify("alice", 1_000, true).await;
        hook.notify("bob", 2_000, false).await;

        let events = hook.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_mint);
        assert!(!events[1].is_mint);
    }

    #[test]
    fn test_authorizer_roles_do_not_leak() {
        let auth = StaticAuthorizer::new()
            .with_group_admin("ga")
            .with_system_admin("sa");

        assert!(auth.can("ga", Action::CreateGroup));
        assert!(!auth.can("ga", Action::Pause));
        assert!(auth.can("sa", Action::RecoverBurn));
        assert!(!auth.can("sa", Action::DeleteGroup));
        assert!(!auth.can("nobody", Action::CreateGroup));
    }
}
