use crate::store::{
    queue_score, LeaseToken, LeasedItem, QueueStats, Store, VersionGuard, Versioned, WriteOp,
};
use async_trait::async_trait;
use hivewire_core::{HivewireError, HivewireResult};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct KvEntry {
    value: serde_json::Value,
    version: u64,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

#[derive(Clone)]
struct QueueEntry {
    payload: serde_json::Value,
    priority: u64,
    seq: u64,
    /// Deliveries lost to lease expiry or requeue since enqueue.
    attempt: u32,
}

struct LeasedEntry {
    queue: String,
    entry: QueueEntry,
    expires_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    /// Visible entries keyed by composite score; the highest score pops first.
    visible: BTreeMap<u64, QueueEntry>,
}

#[derive(Default)]
struct Inner {
    kv: HashMap<String, KvEntry>,
    queues: HashMap<String, QueueState>,
    leases: HashMap<LeaseToken, LeasedEntry>,
    /// TTL'd sets: member -> expiry instant.
    sets: HashMap<String, HashMap<String, Instant>>,
}

impl Inner {
    /// Return every expired lease to its original priority slot with the
    /// attempt incremented. Called lazily before any queue access.
    fn reclaim_expired_leases(&mut self, now: Instant) {
        let expired: Vec<LeaseToken> = self
            .leases
            .iter()
            .filter(|(_, l)| l.expires_at <= now)
            .map(|(t, _)| t.clone())
            .collect();
        for token in expired {
            if let Some(lease) = self.leases.remove(&token) {
                debug!(queue = %lease.queue, seq = lease.entry.seq, "lease expired, redelivering");
                let mut entry = lease.entry;
                entry.attempt += 1;
                let state = self.queues.entry(lease.queue).or_default();
                state
                    .visible
                    .insert(queue_score(entry.priority, entry.seq), entry);
            }
        }
    }

    fn live_version(&self, key: &str, now: Instant) -> u64 {
        match self.kv.get(key) {
            Some(e) if !e.is_expired(now) => e.version,
            _ => 0,
        }
    }

    fn write_kv(
        &mut self,
        key: &str,
        value: serde_json::Value,
        expires_at: Option<Instant>,
        now: Instant,
    ) -> u64 {
        let version = self.live_version(key, now) + 1;
        self.kv.insert(
            key.to_string(),
            KvEntry {
                value,
                version,
                expires_at,
            },
        );
        version
    }

    fn enqueue_entry(&mut self, queue: &str, payload: serde_json::Value, priority: u64) {
        let state = self.queues.entry(queue.to_string()).or_default();
        state.next_seq += 1;
        let entry = QueueEntry {
            payload,
            priority,
            seq: state.next_seq,
            attempt: 0,
        };
        state
            .visible
            .insert(queue_score(priority, entry.seq), entry);
    }

    fn set_add_member(&mut self, key: &str, member: &str, ttl: Duration, now: Instant) -> bool {
        let members = self.sets.entry(key.to_string()).or_default();
        members.retain(|_, expiry| *expiry > now);
        if members.contains_key(member) {
            return false;
        }
        members.insert(member.to_string(), now + ttl);
        true
    }
}

/// Shared prefix check: atomic batches may only touch one tenant's keys.
fn tenant_prefix(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("tenant"), Some(tid), Some(_)) if !tid.is_empty() => {
            Some(&key[..("tenant:".len() + tid.len())])
        }
        _ => None,
    }
}

/// Single-process reference implementation of the [`Store`] contract.
///
/// All state sits behind one async mutex; operations are linearizable, which
/// is what the contract's conditional batches assume of a production store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> HivewireResult<Option<Versioned>> {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner.kv.get(key).and_then(|e| {
            if e.is_expired(now) {
                None
            } else {
                Some(Versioned {
                    value: e.value.clone(),
                    version: e.version,
                })
            }
        }))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> HivewireResult<u64> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner.write_kv(key, value, None, now))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: serde_json::Value,
        expected: u64,
    ) -> HivewireResult<u64> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let current = inner.live_version(key, now);
        if current != expected {
            return Err(HivewireError::Conflict {
                key: key.to_string(),
                expected,
            });
        }
        Ok(inner.write_kv(key, value, None, now))
    }

    async fn apply(&self, guards: Vec<VersionGuard>, ops: Vec<WriteOp>) -> HivewireResult<()> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        // All touched keys must share one tenant prefix.
        let mut prefix: Option<String> = None;
        let mut check = |key: &str| -> HivewireResult<()> {
            let p = tenant_prefix(key).ok_or_else(|| {
                HivewireError::Invariant(format!("batch key '{key}' lacks a tenant prefix"))
            })?;
            if let Some(existing) = &prefix {
                if existing.as_str() != p {
                    return Err(HivewireError::Invariant(format!(
                        "batch spans tenants: '{existing}' and '{p}'"
                    )));
                }
            } else {
                prefix = Some(p.to_string());
            }
            Ok(())
        };
        for guard in &guards {
            check(&guard.key)?;
        }
        for op in &ops {
            match op {
                WriteOp::Put { key, .. }
                | WriteOp::PutWithTtl { key, .. }
                | WriteOp::Delete { key }
                | WriteOp::SetAdd { key, .. } => check(key)?,
                WriteOp::Enqueue { queue, .. } => check(queue)?,
            }
        }

        for guard in &guards {
            let current = inner.live_version(&guard.key, now);
            if current != guard.expected {
                return Err(HivewireError::Conflict {
                    key: guard.key.clone(),
                    expected: guard.expected,
                });
            }
        }

        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    inner.write_kv(&key, value, None, now);
                }
                WriteOp::PutWithTtl { key, value, ttl } => {
                    inner.write_kv(&key, value, Some(now + ttl), now);
                }
                WriteOp::Delete { key } => {
                    inner.kv.remove(&key);
                }
                WriteOp::Enqueue {
                    queue,
                    payload,
                    priority,
                } => {
                    inner.enqueue_entry(&queue, payload, priority);
                }
                WriteOp::SetAdd { key, member, ttl } => {
                    inner.set_add_member(&key, &member, ttl, now);
                }
            }
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        priority: u64,
    ) -> HivewireResult<()> {
        let mut inner = self.inner.lock().await;
        inner.enqueue_entry(queue, payload, priority);
        Ok(())
    }

    async fn pop_highest(
        &self,
        queue: &str,
        lease: Duration,
    ) -> HivewireResult<Option<LeasedItem>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.reclaim_expired_leases(now);

        let Some(state) = inner.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some((_, entry)) = state.visible.pop_last() else {
            return Ok(None);
        };

        let token = LeaseToken::new();
        let item = LeasedItem {
            payload: entry.payload.clone(),
            attempt: entry.attempt,
            token: token.clone(),
        };
        inner.leases.insert(
            token,
            LeasedEntry {
                queue: queue.to_string(),
                entry,
                expires_at: now + lease,
            },
        );
        Ok(Some(item))
    }

    async fn ack(&self, token: &LeaseToken) -> HivewireResult<()> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.reclaim_expired_leases(now);
        inner
            .leases
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| HivewireError::LeaseExpired(token.to_string()))
    }

    async fn nack(&self, token: &LeaseToken, requeue: bool) -> HivewireResult<()> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.reclaim_expired_leases(now);
        let lease = inner
            .leases
            .remove(token)
            .ok_or_else(|| HivewireError::LeaseExpired(token.to_string()))?;
        if requeue {
            let mut entry = lease.entry;
            entry.attempt += 1;
            let state = inner.queues.entry(lease.queue).or_default();
            state
                .visible
                .insert(queue_score(entry.priority, entry.seq), entry);
        }
        Ok(())
    }

    async fn queue_stats(&self, queue: &str) -> HivewireResult<QueueStats> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.reclaim_expired_leases(now);
        let visible = inner.queues.get(queue).map_or(0, |s| s.visible.len());
        let leased = inner.leases.values().filter(|l| l.queue == queue).count();
        Ok(QueueStats { visible, leased })
    }

    async fn peek(
        &self,
        queue: &str,
        offset: usize,
        limit: usize,
    ) -> HivewireResult<Vec<serde_json::Value>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.reclaim_expired_leases(now);
        Ok(inner.queues.get(queue).map_or_else(Vec::new, |s| {
            s.visible
                .iter()
                .rev()
                .skip(offset)
                .take(limit)
                .map(|(_, e)| e.payload.clone())
                .collect()
        }))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> HivewireResult<bool> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner.set_add_member(key, member, ttl, now))
    }

    async fn set_contains(&self, key: &str, member: &str) -> HivewireResult<bool> {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner
            .sets
            .get(key)
            .and_then(|m| m.get(member))
            .is_some_and(|expiry| *expiry > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_prefix_extraction() {
        assert_eq!(
            tenant_prefix("tenant:acme:queue:task"),
            Some("tenant:acme")
        );
        assert_eq!(tenant_prefix("tenant:acme:campaign:c1"), Some("tenant:acme"));
        assert_eq!(tenant_prefix("queue:task"), None);
        assert_eq!(tenant_prefix("tenant::queue:task"), None);
    }

    #[tokio::test]
    async fn test_cas_on_absent_key_expects_zero() {
        let store = MemoryStore::new();
        let v = store
            .compare_and_swap("tenant:a:campaign:c", serde_json::json!({"x": 1}), 0)
            .await
            .unwrap();
        assert_eq!(v, 1);

        let err = store
            .compare_and_swap("tenant:a:campaign:c", serde_json::json!({"x": 2}), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, HivewireError::Conflict { expected: 0, .. }));
    }

    #[tokio::test]
    async fn test_batch_refuses_cross_tenant_keys() {
        let store = MemoryStore::new();
        let err = store
            .apply(
                vec![],
                vec![
                    WriteOp::Put {
                        key: "tenant:a:task:1".into(),
                        value: serde_json::json!(1),
                    },
                    WriteOp::Put {
                        key: "tenant:b:task:1".into(),
                        value: serde_json::json!(2),
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HivewireError::Invariant(_)));
        assert!(store.get("tenant:a:task:1").await.unwrap().is_none());
    }
}
