//! Append-only decision log.
//!
//! Every judge verdict and operator decision lands here as one JSONL line,
//! written by a background task fed over a channel so the hot path never
//! blocks on disk.

use chrono::{DateTime, Utc};
use hivewire_core::Verdict;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

/// Who made a decision.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionActor {
    Judge,
    Operator,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub task_id: String,
    pub actor: DecisionActor,
    pub decision: Verdict,
    pub reasoning: String,
}

/// Append-only log of every decision in the pipeline.
pub struct DecisionLog {
    tx: mpsc::UnboundedSender<DecisionRecord>,
}

impl DecisionLog {
    /// Create a log rooted at `log_dir`. Spawns the background writer.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DecisionRecord>();

        tokio::spawn(async move {
            let _ = tokio::fs::create_dir_all(&log_dir).await;
            let log_file = log_dir.join("decisions.jsonl");

            while let Some(record) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&record) {
                    if let Ok(mut file) = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_file)
                        .await
                    {
                        use tokio::io::AsyncWriteExt;
                        let _ = file.write_all(format!("{line}\n").as_bytes()).await;
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn record(
        &self,
        tenant_id: impl Into<String>,
        task_id: impl Into<String>,
        actor: DecisionActor,
        decision: Verdict,
        reasoning: impl Into<String>,
    ) {
        let record = DecisionRecord {
            timestamp: Utc::now(),
            tenant_id: tenant_id.into(),
            task_id: task_id.into(),
            actor,
            decision,
            reasoning: reasoning.into(),
        };
        info!(
            tenant = %record.tenant_id,
            task = %record.task_id,
            actor = ?record.actor,
            decision = ?record.decision,
            "decision"
        );
        let _ = self.tx.send(record);
    }
}
