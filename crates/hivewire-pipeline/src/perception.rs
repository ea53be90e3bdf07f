//! Resource monitoring.
//!
//! One polling loop per (tenant, campaign): read each configured resource,
//! split it into discrete items, score every item against the campaign
//! goals with a deterministic token-overlap relevance function, and emit an
//! analysis task for anything over the threshold. A TTL'd seen-set in the
//! Store deduplicates across polls and across concurrent perception
//! instances on the same campaign.

use crate::backoff::Backoff;
use crate::records::{self, task_record_op};
use async_trait::async_trait;
use hivewire_core::{Config, HivewireResult, Priority, Task, TaskType, TenantKeyspace};
use hivewire_store::{Store, WriteOp};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Where perception reads external content from. The transport behind a URI
/// is out of scope; tests and the reference deployment use a static source.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn read(&self, uri: &str) -> HivewireResult<String>;
}

/// Fixed in-memory resource content, keyed by URI.
#[derive(Default)]
pub struct StaticResourceSource {
    resources: tokio::sync::RwLock<HashMap<String, String>>,
}

impl StaticResourceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, uri: impl Into<String>, content: impl Into<String>) {
        self.resources
            .write()
            .await
            .insert(uri.into(), content.into());
    }
}

#[async_trait]
impl ResourceSource for StaticResourceSource {
    async fn read(&self, uri: &str) -> HivewireResult<String> {
        Ok(self
            .resources
            .read()
            .await
            .get(uri)
            .cloned()
            .unwrap_or_default())
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "have", "has", "are", "was", "were",
    "will", "its", "about", "into", "over", "after",
];

/// Deterministic token-overlap relevance scoring.
#[derive(Debug, Clone)]
pub struct SemanticFilter {
    pub threshold: f64,
}

impl SemanticFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn tokenize(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
            .map(str::to_string)
            .collect()
    }

    /// `|tokens(goal) ∩ tokens(content)| / max(1, |tokens(goal)|)`.
    pub fn score(&self, content: &str, goal: &str) -> f64 {
        let goal_tokens = Self::tokenize(goal);
        if goal_tokens.is_empty() {
            return 0.0;
        }
        let content_tokens = Self::tokenize(content);
        let overlap = goal_tokens.intersection(&content_tokens).count();
        overlap as f64 / goal_tokens.len().max(1) as f64
    }

    /// Best-scoring goal for an item; ties break lexicographically.
    pub fn best_goal<'a>(&self, content: &str, goals: &'a [String]) -> Option<(&'a str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for goal in goals {
            let score = self.score(content, goal);
            best = match best {
                None => Some((goal.as_str(), score)),
                Some((bg, bs)) => {
                    if score > bs || (score == bs && goal.as_str() < bg) {
                        Some((goal.as_str(), score))
                    } else {
                        Some((bg, bs))
                    }
                }
            };
        }
        best.filter(|(_, score)| *score >= self.threshold)
    }
}

pub struct Perception {
    store: Arc<dyn Store>,
    source: Arc<dyn ResourceSource>,
    config: Config,
    campaign_id: String,
    resource_uris: Vec<String>,
    filter: SemanticFilter,
    /// Per-resource fingerprint of the last raw read; an unchanged resource
    /// short-circuits before item scoring.
    fingerprints: tokio::sync::Mutex<HashMap<String, String>>,
}

impl Perception {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn ResourceSource>,
        config: Config,
        campaign_id: impl Into<String>,
        resource_uris: Vec<String>,
    ) -> Self {
        let filter = SemanticFilter::new(config.perception_threshold);
        Self {
            store,
            source,
            config,
            campaign_id: campaign_id.into(),
            resource_uris,
            filter,
            fingerprints: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(&self, ks: TenantKeyspace, mut shutdown: watch::Receiver<bool>) {
        let poll = Duration::from_secs(self.config.perception_poll_sec);
        let mut pressure = Backoff::pressure();
        loop {
            if *shutdown.borrow() {
                info!(tenant = %ks.tenant_id(), campaign = %self.campaign_id, "perception stopping");
                return;
            }
            if let Err(err) = self.tick(&ks, &mut pressure).await {
                error!(%err, "perception tick failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// One full poll across all resources. Returns the emitted tasks.
    pub async fn tick(
        &self,
        ks: &TenantKeyspace,
        pressure: &mut Backoff,
    ) -> HivewireResult<Vec<Task>> {
        // Mirror the worker's back-pressure rule against the task queue.
        let depth = self.store.queue_stats(&ks.task_queue()).await?.visible;
        if depth > self.config.review_high_water_mark {
            let delay = pressure.next_delay();
            warn!(depth, ?delay, "task queue over high-water mark, pausing poll");
            tokio::time::sleep(delay).await;
            return Ok(vec![]);
        }
        pressure.reset();

        let goals = match records::load_campaign(&self.store, ks, &self.campaign_id).await? {
            Some(read) if read.state.is_active() => read.state.goals,
            _ => return Ok(vec![]),
        };
        if goals.is_empty() {
            return Ok(vec![]);
        }

        let mut emitted = Vec::new();
        for uri in &self.resource_uris {
            let raw = self.source.read(uri).await?;
            let fingerprint = content_hash(&[uri.as_str(), raw.as_str()]);
            {
                let mut fingerprints = self.fingerprints.lock().await;
                if fingerprints.get(uri) == Some(&fingerprint) {
                    continue;
                }
                fingerprints.insert(uri.clone(), fingerprint);
            }

            for line in raw.lines() {
                let item = line.trim_matches(|c: char| c.is_whitespace() || c == '-');
                if item.is_empty() {
                    continue;
                }
                if let Some(task) = self.emit_item(ks, uri, item, &goals).await? {
                    emitted.push(task);
                }
            }
        }

        if !emitted.is_empty() {
            info!(
                tenant = %ks.tenant_id(),
                campaign = %self.campaign_id,
                emitted = emitted.len(),
                "perception emitted tasks"
            );
        }
        Ok(emitted)
    }

    async fn emit_item(
        &self,
        ks: &TenantKeyspace,
        uri: &str,
        item: &str,
        goals: &[String],
    ) -> HivewireResult<Option<Task>> {
        let Some((goal, score)) = self.filter.best_goal(item, goals) else {
            return Ok(None);
        };

        // One task per (tenant, campaign, content) within the dedup window,
        // shared across perception instances via the Store.
        let member = content_hash(&[ks.tenant_id(), self.campaign_id.as_str(), item]);
        let ttl = Duration::from_secs(self.config.perception_dedup_ttl_hours * 3600);
        if !self.store.set_add(&ks.seen(&self.campaign_id), &member, ttl).await? {
            return Ok(None);
        }

        let priority = if score >= 0.9 {
            Priority::High
        } else {
            Priority::Medium
        };
        let task = Task::new(
            ks.tenant_id(),
            TaskType::AnalyzeTrends,
            priority,
            format!("Trend alert ({score:.2}) from {uri}: {item}"),
        )
        .with_campaign(self.campaign_id.clone())
        .with_context("persona", "professional, engaging")
        .with_context("resources", uri)
        .with_context("matched_goal", goal);

        self.store
            .apply(
                vec![],
                vec![
                    task_record_op(ks, &task)?,
                    WriteOp::Enqueue {
                        queue: ks.task_queue(),
                        payload: serde_json::to_value(&task)?,
                        priority: task.priority.weight(),
                    },
                ],
            )
            .await?;
        Ok(Some(task))
    }
}

/// Stable across runs and processes, as the shared dedup set requires.
fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
