//! Tenant-scoped key construction.
//!
//! Every Store key is prefixed `tenant:{tenant_id}:`. No code outside this
//! resolver may construct a key, which makes the cross-tenant disjointness
//! property hold by construction.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TENANT_ID: &str = "default";

/// Generates tenant-scoped Store keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantKeyspace {
    tenant_id: String,
}

impl TenantKeyspace {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        let tid = tenant_id.into();
        let tid = tid.trim();
        Self {
            tenant_id: if tid.is_empty() {
                DEFAULT_TENANT_ID.to_string()
            } else {
                tid.to_string()
            },
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn prefixed(&self, suffix: &str) -> String {
        format!("tenant:{}:{}", self.tenant_id, suffix)
    }

    pub fn task_queue(&self) -> String {
        self.prefixed("queue:task")
    }

    pub fn review_queue(&self) -> String {
        self.prefixed("queue:review")
    }

    pub fn hitl_queue(&self) -> String {
        self.prefixed("queue:hitl")
    }

    pub fn campaign(&self, campaign_id: &str) -> String {
        self.prefixed(&format!("campaign:{campaign_id}"))
    }

    /// Index of known campaign ids for the fleet summary.
    pub fn campaign_index(&self) -> String {
        self.prefixed("campaigns")
    }

    /// Durable task record; outlives the queue entry that carried it.
    pub fn task(&self, task_id: &str) -> String {
        self.prefixed(&format!("task:{task_id}"))
    }

    pub fn output(&self, task_id: &str) -> String {
        self.prefixed(&format!("output:{task_id}"))
    }

    pub fn decision(&self, task_id: &str) -> String {
        self.prefixed(&format!("decision:{task_id}"))
    }

    pub fn budget(&self, agent_id: &str, date: &str) -> String {
        self.prefixed(&format!("budget:{agent_id}:{date}"))
    }

    pub fn lease(&self, task_id: &str) -> String {
        self.prefixed(&format!("lease:{task_id}"))
    }

    /// Durable record of an item held for human review.
    pub fn hitl_item(&self, task_id: &str) -> String {
        self.prefixed(&format!("hitl:item:{task_id}"))
    }

    /// Perception dedup set for one campaign.
    pub fn seen(&self, campaign_id: &str) -> String {
        self.prefixed(&format!("seen:{campaign_id}"))
    }
}
