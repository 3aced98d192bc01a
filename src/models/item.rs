use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::category::ContentCategory;

/// Origin marker for items built from a template instead of the generator.
pub const FALLBACK_ORIGIN: &str = "fallback";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: Uuid,
    pub topic_id: String,
    pub subtopic_id: String,
    pub text: String,
    pub polarity: bool,
    pub explanation: String,
    pub source_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_vector: Option<Vec<f32>>,
    pub semantic_hash: String,
    #[serde(default)]
    pub content_categories: Vec<ContentCategory>,
    pub difficulty: u8,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn is_fallback(&self) -> bool {
        self.origin == FALLBACK_ORIGIN
    }
}

/// Candidate as returned by a content generator, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCandidate {
    pub text: String,
    pub explanation: String,
    pub source_reference: String,
    pub polarity: bool,
    #[serde(default)]
    pub difficulty: Option<u8>,
}

pub fn clamp_difficulty(raw: Option<i64>) -> u8 {
    raw.map(|d| d.clamp(1, 5) as u8).unwrap_or(3)
}
