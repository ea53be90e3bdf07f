//! The human-in-the-loop gate.
//!
//! Passive: escalated items sit in the FIFO HITL queue until an operator
//! polls them out of band and posts a verdict back. Approvals run the same
//! OCC commit path as the Judge; rejects either re-enqueue the task with the
//! attempt incremented or freeze it as failed. Items never expire.

use crate::commit::{CommitOutcome, Committer};
use crate::events::{DecisionActor, DecisionLog};
use crate::records::{self, task_record_op};
use hivewire_core::{
    HitlItem, HitlStatus, HitlVerdict, HivewireError, HivewireResult, JudgeDecision, TaskState,
    TenantKeyspace, Verdict,
};
use hivewire_store::{Store, WriteOp};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct HitlGate {
    store: Arc<dyn Store>,
    committer: Committer,
    decision_log: Arc<DecisionLog>,
}

impl HitlGate {
    pub fn new(store: Arc<dyn Store>, committer: Committer, decision_log: Arc<DecisionLog>) -> Self {
        Self {
            store,
            committer,
            decision_log,
        }
    }

    /// Pending items in FIFO order, paginated. Decided items that have
    /// reached the queue head are drained on the way.
    pub async fn pending(
        &self,
        ks: &TenantKeyspace,
        offset: usize,
        limit: usize,
    ) -> HivewireResult<Vec<HitlItem>> {
        self.drain_decided_heads(ks).await?;

        let payloads = self.store.peek(&ks.hitl_queue(), offset, limit).await?;
        let mut items = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let queued: HitlItem = serde_json::from_value(payload)?;
            // The durable record wins over the queued snapshot.
            let item = records::load_hitl_item(&self.store, ks, &queued.task_id)
                .await?
                .unwrap_or(queued);
            if item.status == HitlStatus::Pending {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Apply an operator verdict to a pending item.
    pub async fn decide(
        &self,
        ks: &TenantKeyspace,
        task_id: &str,
        verdict: HitlVerdict,
    ) -> HivewireResult<HitlStatus> {
        let mut item = records::load_hitl_item(&self.store, ks, task_id)
            .await?
            .ok_or_else(|| HivewireError::Store(format!("no review item for task {task_id}")))?;
        if item.status != HitlStatus::Pending {
            return Err(HivewireError::Invariant(format!(
                "task {task_id} already decided: {:?}",
                item.status
            )));
        }
        let task = records::require_task(&self.store, ks, task_id).await?;

        let status = match verdict {
            HitlVerdict::Approve { edited_payload } => {
                let mut result = item.payload.clone();
                if let Some(edited) = edited_payload {
                    result.output = edited;
                }
                let decision = JudgeDecision::new(
                    task_id,
                    ks.tenant_id(),
                    Verdict::Approve,
                    "operator approval",
                );
                match self.committer.commit(ks, &task, &result, &decision).await? {
                    CommitOutcome::Committed { .. } => {}
                    CommitOutcome::ContentionExhausted => {
                        return Err(HivewireError::Conflict {
                            key: ks.campaign(task.campaign_id.as_deref().unwrap_or_default()),
                            expected: 0,
                        });
                    }
                    CommitOutcome::BudgetRefused { reason } => {
                        return Err(HivewireError::Invariant(format!(
                            "operator approval refused by ledger: {reason}"
                        )));
                    }
                }
                self.record(ks, task_id, Verdict::Approve, "operator approval");
                HitlStatus::Approved
            }
            HitlVerdict::RejectRetry { reason } => {
                let mut retried = task.clone();
                retried.transition(TaskState::Pending)?;
                retried.attempt += 1;
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
                self.record(ks, task_id, Verdict::Reject, &reason);
                HitlStatus::RejectedRetry
            }
            HitlVerdict::RejectDrop { reason } => {
                let mut failed = task.clone();
                failed.transition(TaskState::Failed)?;
                self.store
                    .apply(vec![], vec![task_record_op(ks, &failed)?])
                    .await?;
                self.record(ks, task_id, Verdict::Reject, &reason);
                HitlStatus::RejectedDrop
            }
        };

        item.status = status;
        records::save_hitl_item(&self.store, ks, &item).await?;
        info!(tenant = %ks.tenant_id(), task = %task_id, ?status, "operator decision applied");
        Ok(status)
    }

    /// Pop decided items off the queue head so listings stay bounded.
    async fn drain_decided_heads(&self, ks: &TenantKeyspace) -> HivewireResult<()> {
        loop {
            let head = self.store.peek(&ks.hitl_queue(), 0, 1).await?;
            let Some(payload) = head.into_iter().next() else {
                return Ok(());
            };
            let queued: HitlItem = serde_json::from_value(payload)?;
            let decided = records::load_hitl_item(&self.store, ks, &queued.task_id)
                .await?
                .is_some_and(|item| item.status != HitlStatus::Pending);
            if !decided {
                return Ok(());
            }
            if let Some(leased) = self
                .store
                .pop_highest(&ks.hitl_queue(), Duration::from_secs(1))
                .await?
            {
                self.store.ack(&leased.token).await?;
            }
        }
    }

    fn record(&self, ks: &TenantKeyspace, task_id: &str, decision: Verdict, reasoning: &str) {
        self.decision_log.record(
            ks.tenant_id(),
            task_id,
            DecisionActor::Operator,
            decision,
            reasoning,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivewire_core::{Priority, Task, TaskResult, TaskType};
    use hivewire_store::{BudgetLedger, MemoryStore};

    async fn gate_with_escalated_task(
        store: Arc<MemoryStore>,
        dir: &std::path::Path,
    ) -> (HitlGate, TenantKeyspace, Task) {
        let ks = TenantKeyspace::new("t1");
        let ledger = Arc::new(BudgetLedger::new(store.clone(), 50.0, 10.0));
        let gate = HitlGate::new(
            store.clone(),
            Committer::new(store.clone(), ledger),
            Arc::new(DecisionLog::new(dir.to_path_buf())),
        );

        let mut task = Task::new("t1", TaskType::GenerateContent, Priority::Medium, "post");
        task.transition(TaskState::InProgress).unwrap();
        task.transition(TaskState::Review).unwrap();
        task.transition(TaskState::Escalated).unwrap();

        let result = TaskResult::success(
            &task,
            "worker-1",
            serde_json::json!({"content": "draft"}),
            0.80,
        );
        let item = HitlItem::new(result, "medium_confidence");

        let store_dyn: Arc<dyn Store> = store.clone();
        crate::records::save_task(&store_dyn, &ks, &task).await.unwrap();
        crate::records::save_hitl_item(&store_dyn, &ks, &item).await.unwrap();
        store
            .enqueue(&ks.hitl_queue(), serde_json::to_value(&item).unwrap(), 1)
            .await
            .unwrap();

        (gate, ks, task)
    }

    #[tokio::test]
    async fn test_pending_lists_fifo() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (gate, ks, task) = gate_with_escalated_task(store.clone(), tmp.path()).await;

        let items = gate.pending(&ks, 0, 10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].task_id, task.task_id);
        assert_eq!(items[0].reason, "medium_confidence");
    }

    #[tokio::test]
    async fn test_reject_retry_increments_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (gate, ks, task) = gate_with_escalated_task(store.clone(), tmp.path()).await;

        let status = gate
            .decide(
                &ks,
                &task.task_id,
                HitlVerdict::RejectRetry {
                    reason: "tighten tone".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(status, HitlStatus::RejectedRetry);

        let requeued = store
            .pop_highest(&ks.task_queue(), Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        let retried: Task = serde_json::from_value(requeued.payload).unwrap();
        assert_eq!(retried.task_id, task.task_id);
        assert_eq!(retried.attempt, 1);
        assert_eq!(retried.state, TaskState::Pending);

        // Listing no longer shows the decided item.
        assert!(gate.pending(&ks, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_drop_freezes_task() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (gate, ks, task) = gate_with_escalated_task(store.clone(), tmp.path()).await;

        gate.decide(
            &ks,
            &task.task_id,
            HitlVerdict::RejectDrop {
                reason: "off brand".to_string(),
            },
        )
        .await
        .unwrap();

        let record: Task = serde_json::from_value(
            store.get(&ks.task(&task.task_id)).await.unwrap().unwrap().value,
        )
        .unwrap();
        assert_eq!(record.state, TaskState::Failed);
    }

    #[tokio::test]
    async fn test_double_decision_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (gate, ks, task) = gate_with_escalated_task(store.clone(), tmp.path()).await;

        gate.decide(
            &ks,
            &task.task_id,
            HitlVerdict::RejectDrop {
                reason: "off brand".to_string(),
            },
        )
        .await
        .unwrap();

        let err = gate
            .decide(&ks, &task.task_id, HitlVerdict::Approve { edited_payload: None })
            .await
            .unwrap_err();
        assert!(matches!(err, HivewireError::Invariant(_)));
    }
}
