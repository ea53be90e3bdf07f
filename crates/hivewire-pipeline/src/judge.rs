//! Result gating.
//!
//! The Judge pops worker results from the review queue and decides each one
//! in strict order: sensitive-topic policy first, then error-result
//! escalation, then the confidence bands. Approvals run the OCC commit
//! path; rejections re-enqueue at a demoted priority; everything borderline
//! or sensitive goes to the operators.

use crate::commit::{CommitOutcome, Committer};
use crate::events::{DecisionActor, DecisionLog};
use crate::records::{self, task_record_op};
use hivewire_core::{
    Config, HitlItem, HivewireResult, JudgeDecision, Priority, ResultStatus, Task, TaskResult,
    TaskState, TenantKeyspace, Verdict,
};
use hivewire_store::{LeasedItem, Store, WriteOp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct Judge {
    store: Arc<dyn Store>,
    committer: Committer,
    decision_log: Arc<DecisionLog>,
    config: Config,
}

/// What the decision procedure concluded, before any Store writes.
#[derive(Debug)]
struct Evaluation {
    verdict: Verdict,
    reasoning: String,
    /// Reason attached to the HITL item when escalating.
    escalation_reason: Option<String>,
}

impl Judge {
    pub fn new(
        store: Arc<dyn Store>,
        committer: Committer,
        decision_log: Arc<DecisionLog>,
        config: Config,
    ) -> Self {
        Self {
            store,
            committer,
            decision_log,
            config,
        }
    }

    pub async fn run(&self, ks: TenantKeyspace, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!(tenant = %ks.tenant_id(), "judge stopping");
                return;
            }
            match self.step(&ks).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    error!(%err, "judge step failed");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }

    /// Review at most one result. Returns whether one was processed.
    pub async fn step(&self, ks: &TenantKeyspace) -> HivewireResult<bool> {
        let lease = Duration::from_secs(self.config.judge_lease_sec);
        let Some(leased) = self.store.pop_highest(&ks.review_queue(), lease).await? else {
            return Ok(false);
        };
        self.review(ks, leased).await?;
        Ok(true)
    }

    async fn review(&self, ks: &TenantKeyspace, leased: LeasedItem) -> HivewireResult<()> {
        let result: TaskResult = match serde_json::from_value(leased.payload.clone()) {
            Ok(result) => result,
            Err(err) => {
                error!(%err, "undecodable review payload, dropping");
                return self.store.nack(&leased.token, false).await;
            }
        };
        let task = records::require_task(&self.store, ks, &result.task_id).await?;

        let evaluation = self.evaluate(&result);
        let decision = JudgeDecision::new(
            &result.task_id,
            &result.tenant_id,
            evaluation.verdict,
            evaluation.reasoning.clone(),
        );

        info!(
            tenant = %ks.tenant_id(),
            task = %result.task_id,
            verdict = ?evaluation.verdict,
            confidence = result.confidence,
            "judged result"
        );

        match evaluation.verdict {
            Verdict::Approve => {
                match self.committer.commit(ks, &task, &result, &decision).await? {
                    CommitOutcome::Committed { .. } => {
                        self.log(&decision);
                    }
                    CommitOutcome::ContentionExhausted => {
                        self.escalate(ks, &task, &result, "occ_contention").await?;
                        self.decision_log.record(
                            decision.tenant_id.as_str(),
                            decision.task_id.as_str(),
                            DecisionActor::Judge,
                            Verdict::Escalate,
                            "approval could not commit under contention",
                        );
                    }
                    CommitOutcome::BudgetRefused { reason } => {
                        self.escalate(ks, &task, &result, reason).await?;
                        self.decision_log.record(
                            decision.tenant_id.as_str(),
                            decision.task_id.as_str(),
                            DecisionActor::Judge,
                            Verdict::Escalate,
                            format!("spend refused at commit: {reason}"),
                        );
                    }
                }
            }
            Verdict::Escalate => {
                let reason = evaluation
                    .escalation_reason
                    .unwrap_or_else(|| "escalated".to_string());
                self.escalate(ks, &task, &result, &reason).await?;
                self.log(&decision);
            }
            Verdict::Reject => {
                self.reject(ks, &task, &result).await?;
                self.log(&decision);
            }
        }

        self.store.ack(&leased.token).await
    }

    /// The decision procedure, in strict order.
    fn evaluate(&self, result: &TaskResult) -> Evaluation {
        if let Some(topic) = self.sensitive_topic(&result.output) {
            return Evaluation {
                verdict: Verdict::Escalate,
                reasoning: format!("output touches sensitive topic '{topic}'"),
                escalation_reason: Some(format!("sensitive_topic:{topic}")),
            };
        }

        if result.status == ResultStatus::Error {
            let reason = result
                .error_reason
                .clone()
                .unwrap_or_else(|| "worker_error".to_string());
            return Evaluation {
                verdict: Verdict::Escalate,
                reasoning: format!("worker reported error '{reason}'"),
                escalation_reason: Some(reason),
            };
        }

        if result.confidence >= self.config.high_confidence {
            Evaluation {
                verdict: Verdict::Approve,
                reasoning: format!("confidence {:.2} above auto-approve bar", result.confidence),
                escalation_reason: None,
            }
        } else if result.confidence >= self.config.medium_confidence {
            Evaluation {
                verdict: Verdict::Escalate,
                reasoning: format!("confidence {:.2} needs a human", result.confidence),
                escalation_reason: Some("medium_confidence".to_string()),
            }
        } else {
            Evaluation {
                verdict: Verdict::Reject,
                reasoning: format!("confidence {:.2} below retry bar", result.confidence),
                escalation_reason: None,
            }
        }
    }

    /// Case-insensitive substring scan of the serialized output against the
    /// configured vocabulary.
    fn sensitive_topic(&self, output: &serde_json::Value) -> Option<String> {
        let haystack = output.to_string().to_lowercase();
        self.config
            .sensitive_topics
            .iter()
            .find(|topic| haystack.contains(topic.as_str()))
            .cloned()
    }

    async fn escalate(
        &self,
        ks: &TenantKeyspace,
        task: &Task,
        result: &TaskResult,
        reason: &str,
    ) -> HivewireResult<()> {
        let mut escalated = task.clone();
        if escalated.state != TaskState::Escalated {
            escalated.transition(TaskState::Escalated)?;
        }
        let item = HitlItem::new(result.clone(), reason);
        self.store
            .apply(
                vec![],
                vec![
                    task_record_op(ks, &escalated)?,
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
        warn!(task = %task.task_id, %reason, "escalated to operators");
        Ok(())
    }

    /// Re-enqueue with the attempt incremented and the priority demoted one
    /// tier; a reject already at the floor escalates instead.
    async fn reject(
        &self,
        ks: &TenantKeyspace,
        task: &Task,
        result: &TaskResult,
    ) -> HivewireResult<()> {
        if task.priority == Priority::Low {
            return self.escalate(ks, task, result, "reject_at_floor").await;
        }

        let mut retried = task.clone();
        retried.transition(TaskState::Pending)?;
        retried.attempt += 1;
        retried.priority = task.priority.demoted();

        self.store
            .apply(
                vec![],
                vec![
                    task_record_op(ks, &retried)?,
                    WriteOp::Enqueue {
                        queue: ks.task_queue(),
                        payload: serde_json::to_value(&retried)?,
                        priority: retried.priority.weight(),
                    },
                ],
            )
            .await?;
        info!(
            task = %task.task_id,
            attempt = retried.attempt,
            priority = ?retried.priority,
            "rejected for retry"
        );
        Ok(())
    }

    fn log(&self, decision: &JudgeDecision) {
        self.decision_log.record(
            decision.tenant_id.as_str(),
            decision.task_id.as_str(),
            DecisionActor::Judge,
            decision.decision,
            &decision.reasoning,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivewire_core::{Priority, TaskType};
    use hivewire_store::{BudgetLedger, MemoryStore};

    fn judge(store: Arc<MemoryStore>, dir: &std::path::Path) -> Judge {
        let config = Config::default();
        let ledger = Arc::new(BudgetLedger::new(store.clone(), 50.0, 10.0));
        Judge::new(
            store.clone(),
            Committer::new(store, ledger),
            Arc::new(DecisionLog::new(dir.to_path_buf())),
            config,
        )
    }

    fn result_with(task: &Task, output: serde_json::Value, confidence: f64) -> TaskResult {
        TaskResult::success(task, "worker-1", output, confidence)
    }

    #[tokio::test]
    async fn test_sensitive_topic_overrides_confidence() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let judge = judge(store.clone(), tmp.path());
        let task = Task::new("t1", TaskType::GenerateContent, Priority::Medium, "post");

        let result = result_with(
            &task,
            serde_json::json!({"content": "Here is some health advice for you"}),
            0.97,
        );
        let evaluation = judge.evaluate(&result);
        assert_eq!(evaluation.verdict, Verdict::Escalate);
        assert!(evaluation.reasoning.contains("health"));
    }

    #[tokio::test]
    async fn test_confidence_bands() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let judge = judge(store.clone(), tmp.path());
        let task = Task::new("t1", TaskType::GenerateContent, Priority::Medium, "post");
        let output = serde_json::json!({"content": "spacecraft visuals"});

        assert_eq!(
            judge.evaluate(&result_with(&task, output.clone(), 0.95)).verdict,
            Verdict::Approve
        );
        assert_eq!(
            judge.evaluate(&result_with(&task, output.clone(), 0.90)).verdict,
            Verdict::Approve
        );
        assert_eq!(
            judge.evaluate(&result_with(&task, output.clone(), 0.80)).verdict,
            Verdict::Escalate
        );
        assert_eq!(
            judge.evaluate(&result_with(&task, output, 0.50)).verdict,
            Verdict::Reject
        );
    }

    #[tokio::test]
    async fn test_error_results_escalate_not_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let judge = judge(store.clone(), tmp.path());
        let task = Task::new("t1", TaskType::ExecuteTransaction, Priority::Low, "pay");

        let result = TaskResult::error(&task, "worker-1", "per_tx_cap");
        let evaluation = judge.evaluate(&result);
        assert_eq!(evaluation.verdict, Verdict::Escalate);
        assert_eq!(evaluation.escalation_reason.as_deref(), Some("per_tx_cap"));
    }
}
