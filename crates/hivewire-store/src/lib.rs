//! The Store contract and its in-memory reference implementation.
//!
//! The Store is the core's only persistence: a tenant-partitioned key/value
//! space with version-guarded writes, sorted queues with crash-safe leases,
//! TTL'd keys and sets, and atomic multi-key batches. Every component talks
//! to it through the [`Store`] trait; nothing else crosses component
//! boundaries.
//!
//! # Main types
//!
//! - [`Store`] — the contract (KV + CAS, queues + leases, TTL, batches).
//! - [`MemoryStore`] — single-process reference implementation.
//! - [`BudgetLedger`] — per-agent daily spend tracking on top of the Store.

pub mod ledger;
pub mod memory;
pub mod store;

pub use ledger::BudgetLedger;
pub use memory::MemoryStore;
pub use store::{LeaseToken, LeasedItem, QueueStats, Store, VersionGuard, Versioned, WriteOp};
