use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::category::ContentCategory;
use crate::models::item::Item;
use crate::services::similarity::{cosine_similarity, derive_categories};

pub const CLUSTER_THRESHOLD: f32 = 0.8;
pub const OVEREXPLORED_MIN_MEMBERS: usize = 3;
pub const OVEREXPLORED_MIN_SIMILARITY: f32 = 0.85;

const GENERIC_SUGGESTIONS: [&str; 3] = [
    "Cover the core definition before edge cases.",
    "Mix practical scenarios with direct statements.",
    "Vary which element of the content each statement tests.",
];

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Cluster {
    pub member_ids: Vec<Uuid>,
    /// Text of the first member, used when describing the cluster.
    pub representative: String,
    /// Mean similarity over all member pairs; 0 for single-member clusters.
    pub average_similarity: f32,
    pub categories: Vec<ContentCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverexploredArea {
    pub representative: String,
    pub size: usize,
    pub average_similarity: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SemanticAnalysis {
    pub clusters: Vec<Cluster>,
    pub gaps: Vec<ContentCategory>,
    pub overexplored_areas: Vec<OverexploredArea>,
    pub suggestions: Vec<String>,
}

impl SemanticAnalysis {
    /// Suggestions folded into one guidance paragraph for the generator.
    pub fn guidance(&self) -> Option<String> {
        if self.suggestions.is_empty() {
            None
        } else {
            Some(self.suggestions.join("\n"))
        }
    }
}

/// Annotates an existing corpus; never mutates it.
#[derive(Clone, Debug, Default)]
pub struct AnalyzerService;

impl AnalyzerService {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, corpus: &[Item]) -> SemanticAnalysis {
        let embedded: Vec<&Item> = corpus
            .iter()
            .filter(|i| i.embedding_vector.as_ref().is_some_and(|v| !v.is_empty()))
            .collect();

        if embedded.is_empty() {
            return SemanticAnalysis {
                suggestions: GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            };
        }

        let clusters = cluster_items(&embedded);

        let covered: BTreeSet<ContentCategory> = clusters
            .iter()
            .flat_map(|c| c.categories.iter().copied())
            .collect();
        let gaps: Vec<ContentCategory> = ContentCategory::ALL
            .into_iter()
            .filter(|c| !covered.contains(c))
            .collect();

        let overexplored_areas: Vec<OverexploredArea> = clusters
            .iter()
            .filter(|c| {
                c.member_ids.len() >= OVEREXPLORED_MIN_MEMBERS
                    && c.average_similarity > OVEREXPLORED_MIN_SIMILARITY
            })
            .map(|c| OverexploredArea {
                representative: c.representative.clone(),
                size: c.member_ids.len(),
                average_similarity: c.average_similarity,
            })
            .collect();

        let mut suggestions: Vec<String> = gaps
            .iter()
            .map(|g| format!("Explore {}: {}.", g.as_str(), g.exploration_hint()))
            .collect();
        suggestions.extend(overexplored_areas.iter().map(|area| {
            format!(
                "Avoid statements close to \"{}\" ({} similar items already exist).",
                truncate(&area.representative, 120),
                area.size
            )
        }));
        if suggestions.is_empty() {
            suggestions.extend(GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()));
        }

        tracing::debug!(
            clusters = clusters.len(),
            gaps = gaps.len(),
            overexplored = overexplored_areas.len(),
            "semantic space analyzed"
        );

        SemanticAnalysis {
            clusters,
            gaps,
            overexplored_areas,
            suggestions,
        }
    }
}

/// Single greedy pass: each unclustered item seeds a cluster and pulls in
/// every later unclustered item above `CLUSTER_THRESHOLD` against the seed.
fn cluster_items(items: &[&Item]) -> Vec<Cluster> {
    let mut assigned = vec![false; items.len()];
    let mut clusters = Vec::new();

    for seed in 0..items.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];
        for other in (seed + 1)..items.len() {
            if assigned[other] {
                continue;
            }
            let score = cosine_similarity(
                items[seed].embedding_vector.as_deref(),
                items[other].embedding_vector.as_deref(),
            );
            if score > CLUSTER_THRESHOLD {
                assigned[other] = true;
                members.push(other);
            }
        }

        let categories: BTreeSet<ContentCategory> = members
            .iter()
            .flat_map(|&m| {
                let item = items[m];
                if item.content_categories.is_empty() {
                    derive_categories(&item.text)
                } else {
                    item.content_categories.clone()
                }
            })
            .collect();

        clusters.push(Cluster {
            member_ids: members.iter().map(|&m| items[m].id).collect(),
            representative: items[seed].text.clone(),
            average_similarity: average_pairwise(items, &members),
            categories: categories.into_iter().collect(),
        });
    }
    clusters
}

fn average_pairwise(items: &[&Item], members: &[usize]) -> f32 {
    let mut total = 0f32;
    let mut pairs = 0usize;
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            total += cosine_similarity(
                items[a].embedding_vector.as_deref(),
                items[b].embedding_vector.as_deref(),
            );
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f32
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(text: &str, vector: Option<Vec<f32>>) -> Item {
        Item {
            id: Uuid::new_v4(),
            topic_id: "t1".into(),
            subtopic_id: "s1".into(),
            text: text.into(),
            polarity: true,
            explanation: String::new(),
            source_reference: String::new(),
            embedding_vector: vector,
            semantic_hash: "h".into(),
            content_categories: derive_categories(text),
            difficulty: 3,
            origin: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_corpus_yields_generic_suggestions_only() {
        let analysis = AnalyzerService::new().analyze(&[]);
        assert!(analysis.clusters.is_empty());
        assert!(analysis.gaps.is_empty());
        assert_eq!(analysis.suggestions.len(), GENERIC_SUGGESTIONS.len());

        let no_vectors = vec![item("The court decides", None)];
        let analysis = AnalyzerService::new().analyze(&no_vectors);
        assert!(analysis.clusters.is_empty());
        assert!(analysis.gaps.is_empty());
    }

    #[test]
    fn tight_groups_of_three_are_overexplored() {
        let corpus = vec![
            item("The offender faces prison", Some(vec![1.0, 0.0, 0.0])),
            item("The offender faces a prison term", Some(vec![0.99, 0.05, 0.0])),
            item("Prison applies to the offender", Some(vec![0.98, 0.1, 0.0])),
            item("The court must be notified", Some(vec![0.0, 1.0, 0.0])),
        ];
        let analysis = AnalyzerService::new().analyze(&corpus);
        assert_eq!(analysis.clusters.len(), 2);
        assert_eq!(analysis.clusters[0].member_ids.len(), 3);
        assert_eq!(analysis.overexplored_areas.len(), 1);
        assert_eq!(analysis.overexplored_areas[0].representative, "The offender faces prison");
        assert!(analysis.suggestions.iter().any(|s| s.starts_with("Avoid")));
    }

    #[test]
    fn uncovered_categories_become_gaps() {
        let corpus = vec![item("The offender faces prison", Some(vec![1.0, 0.0]))];
        let analysis = AnalyzerService::new().analyze(&corpus);
        assert!(!analysis.gaps.contains(&ContentCategory::Sanction));
        assert!(!analysis.gaps.contains(&ContentCategory::Subject));
        assert!(analysis.gaps.contains(&ContentCategory::Deadline));
        assert!(analysis
            .suggestions
            .iter()
            .any(|s| s.starts_with("Explore deadline")));
        assert_eq!(analysis.clusters[0].average_similarity, 0.0);
    }
}
