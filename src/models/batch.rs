use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::item::Item;
use crate::models::plan::GenerationPlanEntry;

/// Scope used when a batch covers every subtopic of a topic.
pub const ALL_SCOPE: &str = "all";
pub const DEFAULT_VARIANT: &str = "standard";

/// Single-flight key: concurrent requests with equal keys share one batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct BatchKey {
    pub topic_id: String,
    pub scope_id: String,
    pub variant: String,
}

impl BatchKey {
    pub fn new(topic_id: impl Into<String>, scope_id: Option<&str>, variant: Option<&str>) -> Self {
        Self {
            topic_id: topic_id.into(),
            scope_id: scope_id.unwrap_or(ALL_SCOPE).to_string(),
            variant: variant.unwrap_or(DEFAULT_VARIANT).to_string(),
        }
    }

    /// Subtopic the batch is restricted to, if any.
    pub fn subtopic_scope(&self) -> Option<&str> {
        (self.scope_id != ALL_SCOPE).then_some(self.scope_id.as_str())
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.topic_id, self.scope_id, self.variant)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BatchOptions {
    #[serde(default)]
    pub allow_continuous: bool,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceReason {
    SimilarityCheckPassed,
    MaxAttemptsReached,
    RegenerationError,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemReport {
    pub item_id: Uuid,
    pub subtopic_id: String,
    pub attempts: u32,
    pub reason: AcceptanceReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchItemError {
    /// One-based index of the unit within the batch.
    pub position: usize,
    pub subtopic_id: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub last_item: Option<Item>,
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchOutcome {
    pub key: BatchKey,
    pub items: Vec<Item>,
    pub reports: Vec<ItemReport>,
    pub errors: Vec<BatchItemError>,
    pub plan: Vec<GenerationPlanEntry>,
    pub requested_count: usize,
    pub generated_count: usize,
}

impl BatchOutcome {
    pub fn is_partial(&self) -> bool {
        self.generated_count < self.requested_count
    }
}
