//! Tenant fleet summary for the operator surface.

use crate::records;
use hivewire_core::{CampaignStatus, HivewireResult, TenantKeyspace};
use hivewire_store::{BudgetLedger, QueueStats, Store};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub version: u64,
    pub goals: Vec<String>,
    pub budget_remaining_usdc: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub tenant_id: String,
    pub task_queue: QueueStats,
    pub review_queue: QueueStats,
    pub hitl_queue: QueueStats,
    pub campaigns: Vec<CampaignSummary>,
    /// Today's ledger spend per requested agent.
    pub budget_burn: Vec<AgentBurn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentBurn {
    pub agent_id: String,
    pub spent_today_usdc: f64,
}

/// Assemble the summary the `/fleet/{tenant}` endpoint serves.
pub async fn fleet_summary(
    store: &Arc<dyn Store>,
    ledger: &BudgetLedger,
    ks: &TenantKeyspace,
    agent_ids: &[String],
) -> HivewireResult<FleetSummary> {
    let campaign_ids: Vec<String> = match store.get(&ks.campaign_index()).await? {
        Some(v) => serde_json::from_value(v.value)?,
        None => vec![],
    };

    let mut campaigns = Vec::with_capacity(campaign_ids.len());
    for campaign_id in &campaign_ids {
        if let Some(read) = records::load_campaign(store, ks, campaign_id).await? {
            campaigns.push(CampaignSummary {
                campaign_id: campaign_id.clone(),
                status: read.state.status,
                version: read.version,
                goals: read.state.goals,
                budget_remaining_usdc: read.state.budget_remaining_usdc,
            });
        }
    }

    let mut budget_burn = Vec::with_capacity(agent_ids.len());
    for agent_id in agent_ids {
        budget_burn.push(AgentBurn {
            agent_id: agent_id.clone(),
            spent_today_usdc: ledger.spent_today(ks, agent_id).await?,
        });
    }

    Ok(FleetSummary {
        tenant_id: ks.tenant_id().to_string(),
        task_queue: store.queue_stats(&ks.task_queue()).await?,
        review_queue: store.queue_stats(&ks.review_queue()).await?,
        hitl_queue: store.queue_stats(&ks.hitl_queue()).await?,
        campaigns,
        budget_burn,
    })
}
