use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::batch::{BatchOptions, BatchOutcome};
use crate::models::item::Item;
use crate::models::plan::{DistributionSnapshot, GenerationPlanEntry};
use crate::utils::validation::validate_identifier;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct GenerateBatchPayload {
    #[validate(range(min = 1, max = 1000))]
    pub requested_count: usize,
    #[serde(default)]
    pub allow_continuous: bool,
    #[validate(custom(function = "validate_identifier"))]
    pub scope_id: Option<String>,
    #[validate(custom(function = "validate_identifier"))]
    pub variant: Option<String>,
    /// Session whose polarity cycle continues; the default session when absent.
    pub session_id: Option<Uuid>,
}

impl GenerateBatchPayload {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            allow_continuous: self.allow_continuous,
            scope_id: self.scope_id.clone(),
            variant: self.variant.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchResponse {
    pub session_id: Uuid,
    pub session_position: u64,
    pub partial: bool,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ScopeQuery {
    #[validate(custom(function = "validate_identifier"))]
    pub scope_id: Option<String>,
    #[validate(custom(function = "validate_identifier"))]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DistributionQuery {
    #[validate(range(min = 1, max = 1000))]
    pub requested_count: usize,
    #[serde(default)]
    pub allow_continuous: bool,
    #[validate(custom(function = "validate_identifier"))]
    pub scope_id: Option<String>,
}

impl DistributionQuery {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            allow_continuous: self.allow_continuous,
            scope_id: self.scope_id.clone(),
            variant: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DistributionResponse {
    pub requested_count: usize,
    pub total_deficit: usize,
    pub planned_total: usize,
    pub snapshot: DistributionSnapshot,
    pub plan: Vec<GenerationPlanEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemListResponse {
    pub items: Vec<Item>,
    pub total: usize,
}
