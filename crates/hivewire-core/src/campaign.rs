use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Whether a campaign is producing new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
}

/// Per-campaign shared state, guarded by a monotonic version.
///
/// No mutation may land unless the writer presents the version it read;
/// the Store refuses the write otherwise and the caller re-reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignState {
    pub campaign_id: String,
    pub tenant_id: String,
    pub goals: Vec<String>,
    pub budget_remaining_usdc: f64,
    pub status: CampaignStatus,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl CampaignState {
    pub fn new(
        campaign_id: impl Into<String>,
        tenant_id: impl Into<String>,
        goals: Vec<String>,
        budget_remaining_usdc: f64,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            tenant_id: tenant_id.into(),
            goals,
            budget_remaining_usdc,
            status: CampaignStatus::Active,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Propose the successor state for a commit that spent `cost_usdc`.
    /// The version bump happens at write time, conditional on the version
    /// this copy was read at.
    pub fn proposed_after_spend(&self, cost_usdc: f64) -> CampaignState {
        let mut next = self.clone();
        next.budget_remaining_usdc = (next.budget_remaining_usdc - cost_usdc).max(0.0);
        next.version += 1;
        next.updated_at = Utc::now();
        next
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposed_state_bumps_version() {
        let state = CampaignState::new("c1", "t1", vec!["AI agents".into()], 50.0);
        let next = state.proposed_after_spend(8.0);
        assert_eq!(next.version, 1);
        assert!((next.budget_remaining_usdc - 42.0).abs() < f64::EPSILON);
        // The original copy is untouched.
        assert_eq!(state.version, 0);
    }

    #[test]
    fn test_budget_floor_is_zero() {
        let state = CampaignState::new("c1", "t1", vec![], 5.0);
        let next = state.proposed_after_spend(9.0);
        assert_eq!(next.budget_remaining_usdc, 0.0);
    }

    #[test]
    fn test_new_campaign_is_active() {
        let state = CampaignState::new("c1", "t1", vec![], 50.0);
        assert!(state.is_active());
    }
}
