//! Stateless task execution.
//!
//! A worker loops IDLE -> LEASED -> EXECUTING -> REPORTING: lease one task,
//! mark it in progress, dispatch to the skill for its type, enqueue the
//! result for review, ack the lease. Workers own no external I/O and no
//! Store resources across skill calls; the queue lease is the only claim
//! they hold, and it is released only after the result is enqueued.

use crate::backoff::Backoff;
use crate::records::task_record_op;
use hivewire_core::{
    Config, HitlItem, HivewireError, HivewireResult, ResultStatus, Task, TaskResult, TaskState,
    TenantKeyspace,
};
use hivewire_skills::{SkillContext, SkillRegistry};
use hivewire_store::{BudgetLedger, LeasedItem, Store, WriteOp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct Worker {
    worker_id: String,
    store: Arc<dyn Store>,
    registry: Arc<SkillRegistry>,
    ledger: Arc<BudgetLedger>,
    secrets: Arc<dyn hivewire_skills::SecretProvider>,
    config: Config,
}

impl Worker {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn Store>,
        registry: Arc<SkillRegistry>,
        ledger: Arc<BudgetLedger>,
        secrets: Arc<dyn hivewire_skills::SecretProvider>,
        config: Config,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            registry,
            ledger,
            secrets,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    /// Long-running loop for one tenant. Stops accepting leases when the
    /// shutdown signal flips; in-flight work finishes before return.
    pub async fn run(&self, ks: TenantKeyspace, mut shutdown: watch::Receiver<bool>) {
        let mut pressure = Backoff::pressure();
        loop {
            if *shutdown.borrow() {
                info!(worker = %self.worker_id, tenant = %ks.tenant_id(), "worker stopping");
                return;
            }

            match self.step(&ks, &mut pressure).await {
                Ok(true) => {}
                Ok(false) => {
                    // Idle: wait for work or shutdown.
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    error!(worker = %self.worker_id, %err, "worker step failed");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }

    /// One scheduling step: back-pressure check, then at most one task.
    /// Returns whether a task was processed.
    pub async fn step(
        &self,
        ks: &TenantKeyspace,
        pressure: &mut Backoff,
    ) -> HivewireResult<bool> {
        let review_depth = self.store.queue_stats(&ks.review_queue()).await?.visible;
        if review_depth > self.config.review_high_water_mark {
            let delay = pressure.next_delay();
            warn!(
                worker = %self.worker_id,
                review_depth,
                ?delay,
                "review queue over high-water mark, pausing lease"
            );
            tokio::time::sleep(delay).await;
            return Ok(false);
        }
        pressure.reset();

        let lease = Duration::from_secs(self.config.worker_lease_sec);
        let Some(leased) = self.store.pop_highest(&ks.task_queue(), lease).await? else {
            return Ok(false);
        };
        self.process(ks, leased).await?;
        Ok(true)
    }

    async fn process(&self, ks: &TenantKeyspace, leased: LeasedItem) -> HivewireResult<()> {
        let mut task: Task = match serde_json::from_value(leased.payload.clone()) {
            Ok(task) => task,
            Err(err) => {
                // A payload that does not decode can never execute; drop it
                // rather than poison the queue.
                error!(worker = %self.worker_id, %err, "undecodable task payload, dropping");
                return self.store.nack(&leased.token, false).await;
            }
        };

        // Redeliveries fold into the task's attempt count.
        task.attempt += leased.attempt;

        if task.attempt >= self.config.max_attempts {
            return self.divert_repeated_failure(ks, task, &leased).await;
        }

        task.transition(TaskState::InProgress)?;
        let lease_marker = WriteOp::PutWithTtl {
            key: ks.lease(&task.task_id),
            value: serde_json::json!({
                "worker_id": self.worker_id,
                "attempt": task.attempt,
            }),
            ttl: Duration::from_secs(self.config.worker_lease_sec),
        };
        self.store
            .apply(vec![], vec![task_record_op(ks, &task)?, lease_marker])
            .await?;

        info!(
            worker = %self.worker_id,
            tenant = %ks.tenant_id(),
            task = %task.task_id,
            task_type = %task.task_type,
            attempt = task.attempt,
            "executing task"
        );

        let result = self.execute(ks, &task).await?;

        let mut reported = task.clone();
        reported.transition(TaskState::Review)?;
        self.store
            .apply(
                vec![],
                vec![
                    task_record_op(ks, &reported)?,
                    WriteOp::Enqueue {
                        queue: ks.review_queue(),
                        payload: serde_json::to_value(&result)?,
                        priority: reported.priority.weight(),
                    },
                ],
            )
            .await?;

        self.store.ack(&leased.token).await
    }

    /// Resolve the task to a skill invocation and capture the outcome as a
    /// TaskResult. Nothing here raises past the worker except Store errors;
    /// budget refusals and schema violations become error results that flow
    /// to review.
    async fn execute(&self, ks: &TenantKeyspace, task: &Task) -> HivewireResult<TaskResult> {
        if task.task_type == hivewire_core::TaskType::ExecuteTransaction {
            let requested: f64 = task
                .context
                .get("amount")
                .and_then(|a| a.parse().ok())
                .unwrap_or(0.0);
            if requested > 0.0 {
                match self.ledger.check(ks, &self.worker_id, requested).await {
                    Ok(()) => {}
                    Err(HivewireError::Budget(refusal)) => {
                        warn!(
                            worker = %self.worker_id,
                            task = %task.task_id,
                            reason = refusal.reason_code(),
                            "budget refused before dispatch"
                        );
                        return Ok(TaskResult::error(task, &self.worker_id, refusal.reason_code())
                            .with_reasoning(refusal.to_string()));
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        let ctx = SkillContext::new(ks.tenant_id(), &self.worker_id, self.secrets.clone());
        match self.registry.dispatch(task, &ctx).await {
            Ok(outcome) => {
                let mut result =
                    TaskResult::success(task, &self.worker_id, outcome.output, outcome.confidence)
                        .with_cost(outcome.cost_usdc);
                result.reasoning_trace = format!(
                    "skill {} completed at confidence {:.2}",
                    task.task_type, outcome.confidence
                );
                Ok(result)
            }
            Err(HivewireError::Schema { skill, detail }) => {
                Ok(TaskResult::error(task, &self.worker_id, "schema_violation")
                    .with_reasoning(format!("{skill}: {detail}")))
            }
            Err(HivewireError::SecretNotFound(name)) => {
                Ok(TaskResult::error(task, &self.worker_id, "secret_unavailable")
                    .with_reasoning(format!("missing secret {name}")))
            }
            Err(HivewireError::UnknownSkill(name)) => {
                Ok(TaskResult::error(task, &self.worker_id, "unknown_task_type")
                    .with_reasoning(format!("no handler for {name}")))
            }
            Err(HivewireError::Skill(detail)) => {
                Ok(TaskResult::error(task, &self.worker_id, "skill_error").with_reasoning(detail))
            }
            Err(other) => Err(other),
        }
    }

    /// A task past its attempt budget goes straight to the operators.
    async fn divert_repeated_failure(
        &self,
        ks: &TenantKeyspace,
        mut task: Task,
        leased: &LeasedItem,
    ) -> HivewireResult<()> {
        warn!(
            worker = %self.worker_id,
            task = %task.task_id,
            attempt = task.attempt,
            "attempt budget exhausted, diverting to operators"
        );
        let result = TaskResult::error(&task, &self.worker_id, "repeated_failure")
            .with_reasoning(format!("{} attempts without success", task.attempt));
        if task.state == TaskState::Pending {
            task.transition(TaskState::InProgress)?;
            task.transition(TaskState::Review)?;
        }
        task.transition(TaskState::Escalated)?;
        let item = HitlItem::new(result, "repeated_failure");
        debug_assert_eq!(item.payload.status, ResultStatus::Error);

        self.store
            .apply(
                vec![],
                vec![
                    task_record_op(ks, &task)?,
                    WriteOp::Put {
                        key: ks.hitl_item(&task.task_id),
                        value: serde_json::to_value(&item)?,
                    },
                    WriteOp::Enqueue {
                        queue: ks.hitl_queue(),
                        payload: serde_json::to_value(&item)?,
                        priority: 1,
                    },
                ],
            )
            .await?;
        self.store.ack(&leased.token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivewire_core::{Priority, TaskType};
    use hivewire_skills::EnvSecretProvider;
    use hivewire_store::MemoryStore;

    fn worker(store: Arc<MemoryStore>) -> Worker {
        let config = Config::default();
        Worker::new(
            "worker-1",
            store.clone(),
            Arc::new(SkillRegistry::builtin()),
            Arc::new(BudgetLedger::new(store, 50.0, 10.0)),
            Arc::new(EnvSecretProvider::new("")),
            config,
        )
    }

    async fn enqueue_task(store: &Arc<MemoryStore>, ks: &TenantKeyspace, task: &Task) {
        store
            .apply(
                vec![],
                vec![
                    task_record_op(ks, task).unwrap(),
                    WriteOp::Enqueue {
                        queue: ks.task_queue(),
                        payload: serde_json::to_value(task).unwrap(),
                        priority: task.priority.weight(),
                    },
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_happy_path_result_lands_in_review() {
        let store = Arc::new(MemoryStore::new());
        let ks = TenantKeyspace::new("t1");
        let worker = worker(store.clone());

        let task = Task::new("t1", TaskType::AnalyzeTrends, Priority::High, "AI agent trends");
        enqueue_task(&store, &ks, &task).await;

        let mut pressure = Backoff::pressure();
        assert!(worker.step(&ks, &mut pressure).await.unwrap());

        let stats = store.queue_stats(&ks.review_queue()).await.unwrap();
        assert_eq!(stats.visible, 1);
        // The queue lease was acked.
        assert_eq!(store.queue_stats(&ks.task_queue()).await.unwrap().leased, 0);

        let record: Task = serde_json::from_value(
            store.get(&ks.task(&task.task_id)).await.unwrap().unwrap().value,
        )
        .unwrap();
        assert_eq!(record.state, TaskState::Review);
    }

    #[tokio::test]
    async fn test_per_tx_cap_produces_error_result_in_review() {
        let store = Arc::new(MemoryStore::new());
        let ks = TenantKeyspace::new("t1");
        let worker = worker(store.clone());

        let task = Task::new("t1", TaskType::ExecuteTransaction, Priority::Low, "pay out")
            .with_context("action", "transfer")
            .with_context("amount", "12")
            .with_context("to_address", "0xabc");
        enqueue_task(&store, &ks, &task).await;

        let mut pressure = Backoff::pressure();
        assert!(worker.step(&ks, &mut pressure).await.unwrap());

        let review = store
            .pop_highest(&ks.review_queue(), Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        let result: TaskResult = serde_json::from_value(review.payload).unwrap();
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.error_reason.as_deref(), Some("per_tx_cap"));
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.cost_usdc, 0.0);
    }

    #[tokio::test]
    async fn test_attempt_budget_diverts_to_hitl() {
        let store = Arc::new(MemoryStore::new());
        let ks = TenantKeyspace::new("t1");
        let worker = worker(store.clone());

        let mut task = Task::new("t1", TaskType::GenerateContent, Priority::Medium, "post");
        task.attempt = 3;
        enqueue_task(&store, &ks, &task).await;

        let mut pressure = Backoff::pressure();
        assert!(worker.step(&ks, &mut pressure).await.unwrap());

        assert_eq!(store.queue_stats(&ks.hitl_queue()).await.unwrap().visible, 1);
        assert_eq!(store.queue_stats(&ks.review_queue()).await.unwrap().visible, 0);

        let record: Task = serde_json::from_value(
            store.get(&ks.task(&task.task_id)).await.unwrap().unwrap().value,
        )
        .unwrap();
        assert_eq!(record.state, TaskState::Escalated);
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let store = Arc::new(MemoryStore::new());
        let ks = TenantKeyspace::new("t1");
        let worker = worker(store.clone());
        let mut pressure = Backoff::pressure();
        assert!(!worker.step(&ks, &mut pressure).await.unwrap());
    }
}
