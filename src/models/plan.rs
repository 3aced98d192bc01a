use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Per-subtopic view of the corpus against the requested batch.
/// Always derived fresh; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DistributionEntry {
    pub subtopic_id: String,
    pub target_count: usize,
    pub current_count: usize,
    pub deficit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DistributionSnapshot {
    pub entries: Vec<DistributionEntry>,
}

impl DistributionSnapshot {
    pub fn total_deficit(&self) -> usize {
        self.entries.iter().map(|e| e.deficit).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PlanReason {
    #[serde(rename = "deficit")]
    Deficit,
    #[serde(rename = "proportional")]
    Proportional,
    #[serde(rename = "deficit+proportional")]
    DeficitAndProportional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenerationPlanEntry {
    pub subtopic_id: String,
    pub count_to_generate: usize,
    pub reason: PlanReason,
}

pub fn plan_total(plan: &[GenerationPlanEntry]) -> usize {
    plan.iter().map(|e| e.count_to_generate).sum()
}
