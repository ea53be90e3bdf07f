use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// What kind of work a task carries. Determines which skill handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    AnalyzeTrends,
    GenerateContent,
    PostContent,
    ReplyComment,
    ExecuteTransaction,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::AnalyzeTrends => "analyze_trends",
            TaskType::GenerateContent => "generate_content",
            TaskType::PostContent => "post_content",
            TaskType::ReplyComment => "reply_comment",
            TaskType::ExecuteTransaction => "execute_transaction",
        };
        write!(f, "{s}")
    }
}

/// Scheduling priority. Higher pops first; ties resolve FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Numeric weight used in the queue's composite score.
    pub fn weight(self) -> u64 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    /// One tier lower, saturating at Low.
    pub fn demoted(self) -> Priority {
        match self {
            Priority::High => Priority::Medium,
            Priority::Medium | Priority::Low => Priority::Low,
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Review,
    Escalated,
    Committed,
    Failed,
}

impl TaskState {
    /// Transitions are forward-only, with two sanctioned back-edges:
    /// in_progress -> pending (lease expiry) and escalated -> pending
    /// (operator reject-with-retry).
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Review)
                | (InProgress, Pending)
                | (Review, Escalated)
                | (Review, Committed)
                | (Review, Pending)
                | (Review, Failed)
                | (Escalated, Committed)
                | (Escalated, Pending)
                | (Escalated, Failed)
        )
    }
}

/// A unit of scheduled work, tagged by type and priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    pub task_type: TaskType,
    pub priority: Priority,
    pub goal_description: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
    pub state: TaskState,
    /// Number of worker dispatches so far. Owned by the queue lease
    /// discipline; strictly increases per dispatch.
    #[serde(default)]
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        tenant_id: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
        goal_description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            campaign_id: None,
            task_type,
            priority,
            goal_description: goal_description.into(),
            context: HashMap::new(),
            state: TaskState::Pending,
            attempt: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Apply a state transition, refusing illegal moves.
    pub fn transition(&mut self, to: TaskState) -> Result<(), crate::HivewireError> {
        if !self.state.can_transition_to(to) {
            return Err(crate::HivewireError::Invariant(format!(
                "task {} cannot move {:?} -> {:?}",
                self.task_id, self.state, to
            )));
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Outcome status of one worker attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// The output of one worker attempt at a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub tenant_id: String,
    pub worker_id: String,
    pub attempt: u32,
    pub status: ResultStatus,
    pub output: serde_json::Value,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning_trace: String,
    /// Zero for non-commerce tasks.
    #[serde(default)]
    pub cost_usdc: f64,
    /// Machine-readable failure reason (budget caps, schema violations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(
        task: &Task,
        worker_id: impl Into<String>,
        output: serde_json::Value,
        confidence: f64,
    ) -> Self {
        Self {
            task_id: task.task_id.clone(),
            tenant_id: task.tenant_id.clone(),
            worker_id: worker_id.into(),
            attempt: task.attempt,
            status: ResultStatus::Success,
            output,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning_trace: String::new(),
            cost_usdc: 0.0,
            error_reason: None,
            executed_at: Utc::now(),
        }
    }

    pub fn error(task: &Task, worker_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            task_id: task.task_id.clone(),
            tenant_id: task.tenant_id.clone(),
            worker_id: worker_id.into(),
            attempt: task.attempt,
            status: ResultStatus::Error,
            output: serde_json::Value::Null,
            confidence: 0.0,
            reasoning_trace: reason.clone(),
            cost_usdc: 0.0,
            error_reason: Some(reason),
            executed_at: Utc::now(),
        }
    }

    pub fn with_cost(mut self, cost_usdc: f64) -> Self {
        self.cost_usdc = cost_usdc.max(0.0);
        self
    }

    pub fn with_reasoning(mut self, trace: impl Into<String>) -> Self {
        self.reasoning_trace = trace.into();
        self
    }
}
