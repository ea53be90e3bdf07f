use async_trait::async_trait;
use hivewire_core::HivewireResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A value read from the KV space together with the version it was read at.
/// Writers present this version back to guard their updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned {
    pub value: serde_json::Value,
    pub version: u64,
}

/// Guard for conditional writes: the write applies only if the key's current
/// version equals `expected`. An absent key has version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGuard {
    pub key: String,
    pub expected: u64,
}

impl VersionGuard {
    pub fn new(key: impl Into<String>, expected: u64) -> Self {
        Self {
            key: key.into(),
            expected,
        }
    }
}

/// One mutation inside an atomic batch. All keys in a batch must live in the
/// same tenant prefix; the batch applies entirely or not at all.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put {
        key: String,
        value: serde_json::Value,
    },
    PutWithTtl {
        key: String,
        value: serde_json::Value,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
    Enqueue {
        queue: String,
        payload: serde_json::Value,
        priority: u64,
    },
    SetAdd {
        key: String,
        member: String,
        ttl: Duration,
    },
}

/// Opaque claim on a leased queue item. Valid until the lease expires or the
/// item is acked/nacked, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(pub Uuid);

impl LeaseToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A queue item handed to exactly one popper for the lease duration.
#[derive(Debug, Clone)]
pub struct LeasedItem {
    pub payload: serde_json::Value,
    /// Deliveries of this entry lost to lease expiry or requeue before this
    /// one. Zero on a first clean delivery.
    pub attempt: u32,
    pub token: LeaseToken,
}

/// Depth snapshot for one queue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub visible: usize,
    pub leased: usize,
}

/// The Store contract.
///
/// Implementations must provide: strongly-versioned KV with compare-and-swap,
/// sorted queues popped by composite score (priority then FIFO), crash-safe
/// leases, TTL on selected keys and set members, and atomic multi-key batches
/// guarded by zero or more version checks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a key. Expired keys read as absent.
    async fn get(&self, key: &str) -> HivewireResult<Option<Versioned>>;

    /// Unconditional write. Returns the new version.
    async fn put(&self, key: &str, value: serde_json::Value) -> HivewireResult<u64>;

    /// Conditional write: applies only if the key is at `expected` (0 for
    /// absent). Returns the new version, or a `Conflict` error carrying the
    /// key so the caller can re-read.
    async fn compare_and_swap(
        &self,
        key: &str,
        value: serde_json::Value,
        expected: u64,
    ) -> HivewireResult<u64>;

    /// Apply a batch atomically. Every guard must hold at apply time or
    /// nothing is written and a `Conflict` error names the first failed key.
    async fn apply(&self, guards: Vec<VersionGuard>, ops: Vec<WriteOp>) -> HivewireResult<()>;

    /// Enqueue a payload at the given priority weight. Never blocks.
    async fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        priority: u64,
    ) -> HivewireResult<()>;

    /// Pop the highest-scoring visible item and lease it for `lease`.
    /// Leased items are invisible to other poppers; on expiry the item
    /// returns to its original priority slot with its attempt incremented.
    async fn pop_highest(&self, queue: &str, lease: Duration)
        -> HivewireResult<Option<LeasedItem>>;

    /// Remove a leased item permanently. Fails with `LeaseExpired` if the
    /// token no longer holds the item.
    async fn ack(&self, token: &LeaseToken) -> HivewireResult<()>;

    /// Release a leased item: back to its slot (attempt incremented) when
    /// `requeue`, removed otherwise. Same token validity rules as `ack`.
    async fn nack(&self, token: &LeaseToken, requeue: bool) -> HivewireResult<()>;

    /// Visible/leased depths for back-pressure and the operator surface.
    async fn queue_stats(&self, queue: &str) -> HivewireResult<QueueStats>;

    /// Non-destructive paginated read of visible items in pop order.
    async fn peek(
        &self,
        queue: &str,
        offset: usize,
        limit: usize,
    ) -> HivewireResult<Vec<serde_json::Value>>;

    /// Add a member to a TTL'd set. Returns `true` if the member was newly
    /// added (not already present and unexpired).
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> HivewireResult<bool>;

    /// Membership test honouring per-member expiry.
    async fn set_contains(&self, key: &str, member: &str) -> HivewireResult<bool>;
}

/// Composite queue score: `priority * 2^32 + (2^32 - seq)`.
///
/// Higher scores pop first, so higher priorities always win and ties within a
/// priority resolve FIFO (earlier seq => larger score).
pub fn queue_score(priority: u64, seq: u64) -> u64 {
    const SLOT: u64 = 1 << 32;
    priority * SLOT + (SLOT - seq)
}
