//! The orchestrator core: the state machines that turn campaign goals into
//! committed outputs.
//!
//! Five long-lived components share the tenant-scoped Store: Perception
//! emits tasks for relevant external content, the Planner decomposes goals
//! into priority-scored tasks, Workers resolve tasks to skill invocations,
//! the Judge gates every result through confidence and policy checks and
//! commits approvals under optimistic concurrency, and the HITL gate holds
//! escalations for human operators. A supervisor owns the long-running
//! loops and drives graceful shutdown.
//!
//! All cross-component communication flows through the Store queues; no
//! shared object graph crosses a component boundary.

pub mod backoff;
pub mod commit;
pub mod events;
pub mod fleet;
pub mod hitl;
pub mod judge;
pub mod perception;
pub mod planner;
pub mod records;
pub mod supervisor;
pub mod worker;

pub use commit::{CommitOutcome, Committer};
pub use events::{DecisionActor, DecisionLog, DecisionRecord};
pub use fleet::{fleet_summary, FleetSummary};
pub use hitl::HitlGate;
pub use judge::Judge;
pub use perception::{Perception, ResourceSource, SemanticFilter, StaticResourceSource};
pub use planner::Planner;
pub use supervisor::Supervisor;
pub use worker::Worker;
