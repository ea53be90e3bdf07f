//! The OCC commit path shared by the Judge and the HITL gate.
//!
//! A commit is one atomic batch: bump the campaign version (conditional on
//! the version read), write the output, write the decision record, move the
//! task record to `committed`, and record any ledger spend. A conflict on
//! any guard re-runs the read-propose-write loop; contention past the retry
//! bound escalates instead of committing.

use crate::records::{self, task_record_op};
use hivewire_core::{
    HivewireError, HivewireResult, JudgeDecision, Task, TaskResult, TaskState, TenantKeyspace,
    Verdict,
};
use hivewire_store::{BudgetLedger, Store, VersionGuard, WriteOp};
use std::sync::Arc;
use tracing::{info, warn};

const OCC_RETRIES: u32 = 5;

/// How a commit attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Landed; carries the campaign version after the bump (0 when the task
    /// has no campaign).
    Committed { campaign_version: u64 },
    /// Retries exhausted on version conflicts.
    ContentionExhausted,
    /// The ledger refused the spend at commit time.
    BudgetRefused { reason: &'static str },
}

pub struct Committer {
    store: Arc<dyn Store>,
    ledger: Arc<BudgetLedger>,
}

impl Committer {
    pub fn new(store: Arc<dyn Store>, ledger: Arc<BudgetLedger>) -> Self {
        Self { store, ledger }
    }

    /// Run the commit loop for an approved result.
    pub async fn commit(
        &self,
        ks: &TenantKeyspace,
        task: &Task,
        result: &TaskResult,
        decision: &JudgeDecision,
    ) -> HivewireResult<CommitOutcome> {
        debug_assert_eq!(decision.decision, Verdict::Approve);

        let mut committed_task = task.clone();
        committed_task.transition(TaskState::Committed)?;

        for round in 0..OCC_RETRIES {
            let mut guards: Vec<VersionGuard> = Vec::new();
            let mut ops: Vec<WriteOp> = vec![
                WriteOp::Put {
                    key: ks.output(&task.task_id),
                    value: serde_json::to_value(result)?,
                },
                WriteOp::Put {
                    key: ks.decision(&task.task_id),
                    value: serde_json::to_value(decision)?,
                },
                task_record_op(ks, &committed_task)?,
                WriteOp::Delete {
                    key: ks.lease(&task.task_id),
                },
            ];

            let mut next_version = 0;
            if let Some(campaign_id) = &task.campaign_id {
                if let Some(read) = records::load_campaign(&self.store, ks, campaign_id).await? {
                    let proposed = read.state.proposed_after_spend(result.cost_usdc);
                    next_version = proposed.version;
                    guards.push(VersionGuard::new(ks.campaign(campaign_id), read.version));
                    ops.push(WriteOp::Put {
                        key: ks.campaign(campaign_id),
                        value: serde_json::to_value(&proposed)?,
                    });
                }
            }

            if result.cost_usdc > 0.0 {
                match self
                    .ledger
                    .prepare_spend(ks, &result.worker_id, result.cost_usdc)
                    .await
                {
                    Ok((guard, op)) => {
                        guards.push(guard);
                        ops.push(op);
                    }
                    Err(HivewireError::Budget(refusal)) => {
                        warn!(
                            task = %task.task_id,
                            reason = refusal.reason_code(),
                            "spend refused at commit time"
                        );
                        return Ok(CommitOutcome::BudgetRefused {
                            reason: refusal.reason_code(),
                        });
                    }
                    Err(other) => return Err(other),
                }
            }

            match self.store.apply(guards, ops).await {
                Ok(()) => {
                    info!(
                        tenant = %ks.tenant_id(),
                        task = %task.task_id,
                        campaign_version = next_version,
                        cost_usdc = result.cost_usdc,
                        "commit landed"
                    );
                    return Ok(CommitOutcome::Committed {
                        campaign_version: next_version,
                    });
                }
                Err(HivewireError::Conflict { key, .. }) => {
                    warn!(
                        task = %task.task_id,
                        %key,
                        round,
                        "commit conflict, re-reading"
                    );
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        warn!(
            task = %task.task_id,
            retries = OCC_RETRIES,
            "commit contention exhausted"
        );
        Ok(CommitOutcome::ContentionExhausted)
    }
}
