//! Shared types for the Hivewire orchestration fabric.
//!
//! Everything that crosses a component boundary lives here: the task and
//! result schemas, judge decisions, campaign state, the tenant keyspace
//! resolver, and the immutable runtime configuration. Components communicate
//! only through the Store queues, so this crate has no knowledge of any
//! particular component.

pub mod campaign;
pub mod config;
pub mod decision;
pub mod keyspace;
pub mod task;

use thiserror::Error;

pub use campaign::{CampaignState, CampaignStatus};
pub use config::{Config, SecretsProviderKind};
pub use decision::{HitlItem, HitlStatus, HitlVerdict, JudgeDecision, Verdict};
pub use keyspace::TenantKeyspace;
pub use task::{Priority, ResultStatus, Task, TaskResult, TaskState, TaskType};

pub type HivewireResult<T> = Result<T, HivewireError>;

/// Why a commerce dispatch was refused before it reached a wallet.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetRefusal {
    /// A single transaction above the per-transaction cap.
    PerTxCap { requested: f64, cap: f64 },
    /// The day's accumulated spend plus the request exceeds the daily cap.
    DailyCap { spent: f64, requested: f64, cap: f64 },
}

impl BudgetRefusal {
    /// Stable reason code carried on refusal TaskResults.
    pub fn reason_code(&self) -> &'static str {
        match self {
            BudgetRefusal::PerTxCap { .. } => "per_tx_cap",
            BudgetRefusal::DailyCap { .. } => "daily_cap",
        }
    }
}

impl std::fmt::Display for BudgetRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetRefusal::PerTxCap { requested, cap } => {
                write!(f, "requested {requested} USDC exceeds per-tx cap {cap}")
            }
            BudgetRefusal::DailyCap {
                spent,
                requested,
                cap,
            } => write!(
                f,
                "requested {requested} USDC on top of {spent} spent exceeds daily cap {cap}"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum HivewireError {
    #[error("store error: {0}")]
    Store(String),

    #[error("version conflict on {key}: expected {expected}")]
    Conflict { key: String, expected: u64 },

    #[error("lease invalid or expired: {0}")]
    LeaseExpired(String),

    #[error("budget refused: {0}")]
    Budget(BudgetRefusal),

    #[error("schema violation in skill '{skill}': {detail}")]
    Schema { skill: String, detail: String },

    #[error("skill error: {0}")]
    Skill(String),

    #[error("unknown skill for task type '{0}'")]
    UnknownSkill(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("planner unavailable after {attempts} attempts: {last_error}")]
    PlannerUnavailable { attempts: u32, last_error: String },

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HivewireError {
    /// Whether a bounded retry with backoff is appropriate.
    ///
    /// Budget, schema, and policy conditions are never retried; they flow
    /// through the queues as evidence instead.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HivewireError::Store(_) | HivewireError::Conflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_refusal_reason_codes() {
        let per_tx = BudgetRefusal::PerTxCap {
            requested: 12.0,
            cap: 10.0,
        };
        assert_eq!(per_tx.reason_code(), "per_tx_cap");

        let daily = BudgetRefusal::DailyCap {
            spent: 45.0,
            requested: 8.0,
            cap: 50.0,
        };
        assert_eq!(daily.reason_code(), "daily_cap");
    }

    #[test]
    fn test_transient_classification() {
        assert!(HivewireError::Store("timeout".into()).is_transient());
        assert!(HivewireError::Conflict {
            key: "k".into(),
            expected: 3
        }
        .is_transient());
        assert!(!HivewireError::Budget(BudgetRefusal::PerTxCap {
            requested: 12.0,
            cap: 10.0
        })
        .is_transient());
        assert!(!HivewireError::Schema {
            skill: "post_content".into(),
            detail: "missing field".into()
        }
        .is_transient());
    }
}
