//! Per-agent daily spend tracking.
//!
//! The ledger lives at `budget:{agent_id}:{yyyy-mm-dd}` under the tenant
//! prefix, with a TTL expiring at the next UTC midnight. Workers call
//! [`BudgetLedger::check`] before dispatching a commerce task; the Judge
//! folds [`BudgetLedger::prepare_spend`] into its commit batch so the cap is
//! re-verified atomically at commit time.

use crate::store::{Store, VersionGuard, WriteOp};
use chrono::{Duration as ChronoDuration, Utc};
use hivewire_core::{BudgetRefusal, HivewireError, HivewireResult, TenantKeyspace};
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct LedgerEntry {
    spent_usdc: f64,
}

pub struct BudgetLedger {
    store: Arc<dyn Store>,
    max_daily_spend: f64,
    max_per_tx: f64,
}

impl BudgetLedger {
    pub fn new(store: Arc<dyn Store>, max_daily_spend: f64, max_per_tx: f64) -> Self {
        Self {
            store,
            max_daily_spend,
            max_per_tx,
        }
    }

    /// Today's ledger date in UTC.
    pub fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    /// Time remaining until the next UTC midnight, when the day's entry
    /// expires.
    pub fn ttl_to_midnight() -> Duration {
        let now = Utc::now();
        let tomorrow = now.date_naive() + ChronoDuration::days(1);
        match tomorrow.and_hms_opt(0, 0, 0) {
            Some(midnight) => (midnight.and_utc() - now)
                .to_std()
                .unwrap_or(Duration::from_secs(1)),
            None => Duration::from_secs(3600),
        }
    }

    pub async fn spent_today(
        &self,
        keyspace: &TenantKeyspace,
        agent_id: &str,
    ) -> HivewireResult<f64> {
        let key = keyspace.budget(agent_id, &Self::today());
        Ok(match self.store.get(&key).await? {
            Some(versioned) => {
                serde_json::from_value::<LedgerEntry>(versioned.value)?.spent_usdc
            }
            None => 0.0,
        })
    }

    fn refusal(&self, spent: f64, requested: f64) -> Option<BudgetRefusal> {
        if requested > self.max_per_tx {
            return Some(BudgetRefusal::PerTxCap {
                requested,
                cap: self.max_per_tx,
            });
        }
        if spent + requested > self.max_daily_spend {
            return Some(BudgetRefusal::DailyCap {
                spent,
                requested,
                cap: self.max_daily_spend,
            });
        }
        None
    }

    /// Pre-dispatch budget gate. No spend is recorded here.
    pub async fn check(
        &self,
        keyspace: &TenantKeyspace,
        agent_id: &str,
        requested: f64,
    ) -> HivewireResult<()> {
        let spent = self.spent_today(keyspace, agent_id).await?;
        match self.refusal(spent, requested) {
            Some(refusal) => Err(HivewireError::Budget(refusal)),
            None => Ok(()),
        }
    }

    /// Build the guard and write for recording a spend inside a commit
    /// batch. Re-verifies the caps against the ledger as read; a concurrent
    /// spend surfaces as a `Conflict` on the budget key and the caller
    /// re-runs its commit loop.
    pub async fn prepare_spend(
        &self,
        keyspace: &TenantKeyspace,
        agent_id: &str,
        amount: f64,
    ) -> HivewireResult<(VersionGuard, WriteOp)> {
        let key = keyspace.budget(agent_id, &Self::today());
        let (spent, version) = match self.store.get(&key).await? {
            Some(versioned) => (
                serde_json::from_value::<LedgerEntry>(versioned.value)?.spent_usdc,
                versioned.version,
            ),
            None => (0.0, 0),
        };
        if let Some(refusal) = self.refusal(spent, amount) {
            return Err(HivewireError::Budget(refusal));
        }
        let entry = LedgerEntry {
            spent_usdc: spent + amount,
        };
        Ok((
            VersionGuard::new(&key, version),
            WriteOp::PutWithTtl {
                key,
                value: serde_json::to_value(entry)?,
                ttl: Self::ttl_to_midnight(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn ledger() -> (Arc<MemoryStore>, BudgetLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = BudgetLedger::new(store.clone(), 50.0, 10.0);
        (store, ledger)
    }

    #[tokio::test]
    async fn test_per_tx_cap_refused() {
        let (_, ledger) = ledger();
        let ks = TenantKeyspace::new("t1");
        let err = ledger.check(&ks, "agent-1", 12.0).await.unwrap_err();
        match err {
            HivewireError::Budget(refusal) => assert_eq!(refusal.reason_code(), "per_tx_cap"),
            other => panic!("expected budget refusal, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_daily_cap_refused_after_accumulation() {
        let (store, ledger) = ledger();
        let ks = TenantKeyspace::new("t1");

        // Record 45 USDC of spend through the commit path.
        let (guard, op) = ledger.prepare_spend(&ks, "agent-1", 9.0).await.unwrap();
        store.apply(vec![guard], vec![op]).await.unwrap();
        for _ in 0..4 {
            let (guard, op) = ledger.prepare_spend(&ks, "agent-1", 9.0).await.unwrap();
            store.apply(vec![guard], vec![op]).await.unwrap();
        }
        assert!((ledger.spent_today(&ks, "agent-1").await.unwrap() - 45.0).abs() < 1e-9);

        // 8 more would cross 50.
        let err = ledger.check(&ks, "agent-1", 8.0).await.unwrap_err();
        match err {
            HivewireError::Budget(refusal) => assert_eq!(refusal.reason_code(), "daily_cap"),
            other => panic!("expected budget refusal, got {other}"),
        }

        // 5 exactly reaches the cap and is allowed.
        assert!(ledger.check(&ks, "agent-1", 5.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_spend_guards_against_races() {
        let (store, ledger) = ledger();
        let ks = TenantKeyspace::new("t1");

        // Two commits prepared against the same ledger read.
        let (guard_a, op_a) = ledger.prepare_spend(&ks, "agent-1", 5.0).await.unwrap();
        let (guard_b, op_b) = ledger.prepare_spend(&ks, "agent-1", 5.0).await.unwrap();

        store.apply(vec![guard_a], vec![op_a]).await.unwrap();
        let err = store.apply(vec![guard_b], vec![op_b]).await.unwrap_err();
        assert!(matches!(err, HivewireError::Conflict { .. }));

        // The loser re-prepares and lands on top of the winner's spend.
        let (guard, op) = ledger.prepare_spend(&ks, "agent-1", 5.0).await.unwrap();
        store.apply(vec![guard], vec![op]).await.unwrap();
        assert!((ledger.spent_today(&ks, "agent-1").await.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_ttl_runs_to_midnight() {
        let ttl = BudgetLedger::ttl_to_midnight();
        assert!(ttl > Duration::ZERO);
        assert!(ttl <= Duration::from_secs(24 * 3600));
    }

    #[tokio::test]
    async fn test_ledgers_are_tenant_scoped() {
        let (store, ledger) = ledger();
        let ks_a = TenantKeyspace::new("a");
        let ks_b = TenantKeyspace::new("b");

        let (guard, op) = ledger.prepare_spend(&ks_a, "agent-1", 10.0).await.unwrap();
        store.apply(vec![guard], vec![op]).await.unwrap();

        assert!((ledger.spent_today(&ks_a, "agent-1").await.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(ledger.spent_today(&ks_b, "agent-1").await.unwrap(), 0.0);
    }
}
