use crate::task::TaskResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The judge's verdict on one task result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
    Escalate,
}

/// The verdict attached to one review of a task result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeDecision {
    pub task_id: String,
    pub tenant_id: String,
    pub decision: Verdict,
    pub requires_human_review: bool,
    pub reasoning: String,
    pub decided_at: DateTime<Utc>,
}

impl JudgeDecision {
    pub fn new(
        task_id: impl Into<String>,
        tenant_id: impl Into<String>,
        decision: Verdict,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            tenant_id: tenant_id.into(),
            decision,
            requires_human_review: decision == Verdict::Escalate,
            reasoning: reasoning.into(),
            decided_at: Utc::now(),
        }
    }
}

/// Status of an item waiting on a human operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlStatus {
    Pending,
    Approved,
    RejectedRetry,
    RejectedDrop,
}

/// Verdict an operator posts back through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum HitlVerdict {
    Approve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edited_payload: Option<serde_json::Value>,
    },
    RejectRetry {
        reason: String,
    },
    RejectDrop {
        reason: String,
    },
}

/// A task held for out-of-band human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlItem {
    pub task_id: String,
    pub tenant_id: String,
    pub payload: TaskResult,
    pub reason: String,
    pub queued_at: DateTime<Utc>,
    pub status: HitlStatus,
}

impl HitlItem {
    pub fn new(payload: TaskResult, reason: impl Into<String>) -> Self {
        Self {
            task_id: payload.task_id.clone(),
            tenant_id: payload.tenant_id.clone(),
            payload,
            reason: reason.into(),
            queued_at: Utc::now(),
            status: HitlStatus::Pending,
        }
    }
}
