use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::plan::{DistributionEntry, DistributionSnapshot, GenerationPlanEntry, PlanReason};
use crate::models::subtopic::Subtopic;

/// Turns subtopic weights and current coverage into a per-subtopic quota.
#[derive(Clone, Debug, Default)]
pub struct PlannerService;

impl PlannerService {
    pub fn new() -> Self {
        Self
    }

    /// `target = ceil(weight * n / total)`, `deficit = max(0, target - current)`.
    pub fn snapshot(
        &self,
        subtopics: &[Subtopic],
        current_counts: &HashMap<String, usize>,
        requested: usize,
    ) -> Result<DistributionSnapshot> {
        let total_weight = total_weight(subtopics)?;
        let entries = subtopics
            .iter()
            .map(|s| {
                let target = (effective_weight(s) * requested as f64 / total_weight).ceil() as usize;
                let current = current_counts.get(&s.id).copied().unwrap_or(0);
                DistributionEntry {
                    subtopic_id: s.id.clone(),
                    target_count: target,
                    current_count: current,
                    deficit: target.saturating_sub(current),
                }
            })
            .collect();
        Ok(DistributionSnapshot { entries })
    }

    pub fn plan(
        &self,
        subtopics: &[Subtopic],
        current_counts: &HashMap<String, usize>,
        requested: usize,
        allow_continuous: bool,
    ) -> Result<Vec<GenerationPlanEntry>> {
        if subtopics.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot(subtopics, current_counts, requested)?;

        // Deficit phase: (deficit desc, weight desc, order asc, id asc).
        let mut by_deficit: Vec<usize> = (0..subtopics.len()).collect();
        by_deficit.sort_by(|&a, &b| {
            snapshot.entries[b]
                .deficit
                .cmp(&snapshot.entries[a].deficit)
                .then_with(|| priority(&subtopics[a], &subtopics[b]))
        });

        let mut deficit_alloc = vec![0usize; subtopics.len()];
        let mut remaining = requested;
        for idx in by_deficit {
            if remaining == 0 {
                break;
            }
            let take = snapshot.entries[idx].deficit.min(remaining);
            deficit_alloc[idx] = take;
            remaining -= take;
        }

        let proportional_alloc = if allow_continuous && remaining > 0 {
            proportional_split(subtopics, remaining)?
        } else {
            vec![0usize; subtopics.len()]
        };

        let plan: Vec<GenerationPlanEntry> = subtopics
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let (d, p) = (deficit_alloc[i], proportional_alloc[i]);
                let reason = match (d > 0, p > 0) {
                    (true, true) => PlanReason::DeficitAndProportional,
                    (true, false) => PlanReason::Deficit,
                    (false, true) => PlanReason::Proportional,
                    (false, false) => return None,
                };
                Some(GenerationPlanEntry {
                    subtopic_id: s.id.clone(),
                    count_to_generate: d + p,
                    reason,
                })
            })
            .collect();

        tracing::debug!(
            requested,
            planned = crate::models::plan::plan_total(&plan),
            entries = plan.len(),
            "generation plan computed"
        );
        Ok(plan)
    }
}

fn effective_weight(s: &Subtopic) -> f64 {
    if s.weight.is_finite() && s.weight > 0.0 {
        s.weight
    } else {
        0.0
    }
}

fn total_weight(subtopics: &[Subtopic]) -> Result<f64> {
    let total: f64 = subtopics.iter().map(effective_weight).sum();
    if total <= 0.0 {
        return Err(Error::Configuration(
            "Total subtopic weight is zero; no plan can be computed".to_string(),
        ));
    }
    Ok(total)
}

/// Weight desc, then catalogue order, then id.
fn priority(a: &Subtopic, b: &Subtopic) -> Ordering {
    effective_weight(b)
        .partial_cmp(&effective_weight(a))
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.order.cmp(&b.order))
        .then_with(|| a.id.cmp(&b.id))
}

/// Rounds each share, then fixes the drift one unit at a time, cycling over
/// subtopics by priority. Removals skip subtopics already at zero.
fn proportional_split(subtopics: &[Subtopic], budget: usize) -> Result<Vec<usize>> {
    let total = total_weight(subtopics)?;
    let mut alloc: Vec<usize> = subtopics
        .iter()
        .map(|s| (effective_weight(s) * budget as f64 / total).round() as usize)
        .collect();

    let mut order: Vec<usize> = (0..subtopics.len())
        .filter(|&i| effective_weight(&subtopics[i]) > 0.0)
        .collect();
    order.sort_by(|&a, &b| priority(&subtopics[a], &subtopics[b]));

    let mut sum: usize = alloc.iter().sum();
    let mut cursor = 0;
    while sum < budget {
        alloc[order[cursor % order.len()]] += 1;
        sum += 1;
        cursor += 1;
    }
    cursor = 0;
    while sum > budget {
        let idx = order[cursor % order.len()];
        if alloc[idx] > 0 {
            alloc[idx] -= 1;
            sum -= 1;
        }
        cursor += 1;
    }
    Ok(alloc)
}
