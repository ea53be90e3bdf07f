//! Goal decomposition.
//!
//! The Planner turns a campaign's goals into priority-scored tasks using a
//! deterministic, table-driven ruleset, then enqueues the whole batch in one
//! atomic write. Scheduling downstream is governed solely by priority; the
//! Planner's insertion order only breaks ties within a tier.

use crate::backoff::Backoff;
use crate::records::{self, task_record_op};
use hivewire_core::{
    CampaignState, Config, HivewireError, HivewireResult, Priority, Task, TaskType,
    TenantKeyspace,
};
use hivewire_store::{Store, VersionGuard, WriteOp};
use std::sync::Arc;
use tracing::{info, warn};

const PLANNER_MAX_ATTEMPTS: u32 = 6;

pub struct Planner {
    store: Arc<dyn Store>,
    config: Config,
}

impl Planner {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self { store, config }
    }

    fn mentions_any(goal: &str, vocabulary: &[String]) -> bool {
        let goal = goal.to_lowercase();
        vocabulary.iter().any(|word| goal.contains(word.as_str()))
    }

    /// Decompose one goal into the task chain.
    ///
    /// Every goal leads with trend analysis (high priority when the goal
    /// itself mentions a trend word, medium otherwise), followed by content
    /// generation and posting; a commerce directive appends a low-priority
    /// transaction task.
    pub fn decompose(&self, tenant_id: &str, campaign_id: &str, goal: &str) -> Vec<Task> {
        let trend_priority = if Self::mentions_any(goal, &self.config.trend_words) {
            Priority::High
        } else {
            Priority::Medium
        };

        let mut tasks = vec![
            Task::new(
                tenant_id,
                TaskType::AnalyzeTrends,
                trend_priority,
                format!("Analyze trends for: {goal}"),
            )
            .with_campaign(campaign_id),
            Task::new(
                tenant_id,
                TaskType::GenerateContent,
                Priority::Medium,
                format!("Generate content about: {goal}"),
            )
            .with_campaign(campaign_id),
            Task::new(
                tenant_id,
                TaskType::PostContent,
                Priority::Medium,
                format!("Post content about: {goal}"),
            )
            .with_campaign(campaign_id),
        ];

        if Self::mentions_any(goal, &self.config.commerce_words) {
            let mut task = Task::new(
                tenant_id,
                TaskType::ExecuteTransaction,
                Priority::Low,
                format!("Execute commerce directive: {goal}"),
            )
            .with_campaign(campaign_id)
            .with_context("action", "transfer");

            if let Some(amount) = first_number(goal) {
                task = task.with_context("amount", amount.to_string());
            }
            if let Some(address) = first_address(goal) {
                task = task.with_context("to_address", address);
            }
            tasks.push(task);
        }

        tasks
    }

    /// Inject goals into a campaign (creating it if absent) and plan them.
    /// This is the gateway's entry point.
    pub async fn inject_goals(
        &self,
        ks: &TenantKeyspace,
        campaign_id: &str,
        goals: Vec<String>,
        initial_budget_usdc: f64,
    ) -> HivewireResult<Vec<Task>> {
        let mut backoff = Backoff::planner();
        let mut attempts = 0;
        loop {
            match self
                .upsert_campaign_goals(ks, campaign_id, &goals, initial_budget_usdc)
                .await
            {
                Ok(()) => break,
                Err(err) if err.is_transient() && attempts + 1 < PLANNER_MAX_ATTEMPTS => {
                    attempts += 1;
                    let delay = backoff.next_delay();
                    warn!(attempts, error = %err, ?delay, "campaign update failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(HivewireError::PlannerUnavailable {
                        attempts: PLANNER_MAX_ATTEMPTS,
                        last_error: err.to_string(),
                    })
                }
                Err(err) => return Err(err),
            }
        }

        self.plan(ks, campaign_id, &goals).await
    }

    /// One CAS attempt at folding new goals into the campaign state.
    async fn upsert_campaign_goals(
        &self,
        ks: &TenantKeyspace,
        campaign_id: &str,
        goals: &[String],
        initial_budget_usdc: f64,
    ) -> HivewireResult<()> {
        let key = ks.campaign(campaign_id);
        let (mut state, version) = match records::load_campaign(&self.store, ks, campaign_id).await?
        {
            Some(read) => (read.state, read.version),
            None => (
                CampaignState::new(campaign_id, ks.tenant_id(), vec![], initial_budget_usdc),
                0,
            ),
        };
        for goal in goals {
            if !state.goals.contains(goal) {
                state.goals.push(goal.clone());
            }
        }
        state.version = version + 1;

        self.store
            .compare_and_swap(&key, serde_json::to_value(&state)?, version)
            .await?;
        self.index_campaign(ks, campaign_id).await
    }

    /// Plan a campaign's current goals (read from its state).
    pub async fn plan_campaign(
        &self,
        ks: &TenantKeyspace,
        campaign_id: &str,
    ) -> HivewireResult<Vec<Task>> {
        let read = records::load_campaign(&self.store, ks, campaign_id)
            .await?
            .ok_or_else(|| HivewireError::Store(format!("no campaign {campaign_id}")))?;
        if !read.state.is_active() {
            info!(campaign = %campaign_id, status = ?read.state.status, "skipping inactive campaign");
            return Ok(vec![]);
        }
        let goals = read.state.goals.clone();
        self.plan(ks, campaign_id, &goals).await
    }

    /// Decompose and enqueue all-or-nothing: every task record and queue
    /// entry in the batch lands, or none do.
    async fn plan(
        &self,
        ks: &TenantKeyspace,
        campaign_id: &str,
        goals: &[String],
    ) -> HivewireResult<Vec<Task>> {
        let mut tasks = Vec::new();
        for goal in goals {
            tasks.extend(self.decompose(ks.tenant_id(), campaign_id, goal));
        }
        if tasks.is_empty() {
            return Ok(tasks);
        }

        let mut ops = Vec::with_capacity(tasks.len() * 2);
        for task in &tasks {
            ops.push(task_record_op(ks, task)?);
            ops.push(WriteOp::Enqueue {
                queue: ks.task_queue(),
                payload: serde_json::to_value(task)?,
                priority: task.priority.weight(),
            });
        }

        let mut backoff = Backoff::planner();
        let mut attempts = 0;
        loop {
            match self
                .store
                .apply(Vec::<VersionGuard>::new(), ops.clone())
                .await
            {
                Ok(()) => break,
                Err(err) if err.is_transient() && attempts + 1 < PLANNER_MAX_ATTEMPTS => {
                    attempts += 1;
                    let delay = backoff.next_delay();
                    warn!(attempts, error = %err, ?delay, "batch enqueue failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(HivewireError::PlannerUnavailable {
                        attempts: PLANNER_MAX_ATTEMPTS,
                        last_error: err.to_string(),
                    })
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            tenant = %ks.tenant_id(),
            campaign = %campaign_id,
            task_count = tasks.len(),
            "planned goals"
        );
        Ok(tasks)
    }

    async fn index_campaign(&self, ks: &TenantKeyspace, campaign_id: &str) -> HivewireResult<()> {
        let key = ks.campaign_index();
        let mut ids: Vec<String> = match self.store.get(&key).await? {
            Some(v) => serde_json::from_value(v.value)?,
            None => vec![],
        };
        if !ids.iter().any(|id| id == campaign_id) {
            ids.push(campaign_id.to_string());
            self.store.put(&key, serde_json::to_value(&ids)?).await?;
        }
        Ok(())
    }
}

fn first_number(goal: &str) -> Option<f64> {
    goal.split_whitespace()
        .find_map(|token| token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse().ok())
}

fn first_address(goal: &str) -> Option<String> {
    goal.split_whitespace()
        .find(|token| token.starts_with("0x"))
        .map(|token| token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric()).to_string())
}
