use std::sync::Arc;

use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::batch::AcceptanceReason;
use crate::models::item::{clamp_difficulty, GeneratedCandidate, Item, FALLBACK_ORIGIN};
use crate::models::subtopic::Subtopic;
use crate::services::ai_service::{fallback_candidates, ContentGenerator, GenerationRequest, TopicContent};
use crate::services::coordinator_service::GenerationSettings;
use crate::services::embed_service::EmbeddingClient;
use crate::services::similarity::{derive_categories, find_most_similar, semantic_hash};
use crate::services::store_service::{CorpusStore, SimilarityFilters};
use crate::utils::time::now;

#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub item: Item,
    pub attempts: u32,
    pub reason: AcceptanceReason,
    /// Failures seen along the way, one per failed attempt.
    pub attempt_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct DuplicateMatch {
    text: String,
    score: f32,
}

/// Wraps the generator with fingerprinting, duplicate detection and a
/// bounded regeneration loop.
#[derive(Clone)]
pub struct DedupService {
    generator: Arc<dyn ContentGenerator>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn CorpusStore>,
    settings: GenerationSettings,
}

impl DedupService {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn CorpusStore>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            embedder,
            store,
            settings,
        }
    }

    /// Generates one item for `subtopic` with the given polarity, retrying
    /// while the candidate duplicates `corpus` or `batch_so_far`.
    ///
    /// The last candidate is accepted once `max_attempts` is spent. A failure
    /// that is not transient ends the loop early. When no attempt produced a
    /// candidate at all, the first templated fallback that is not a duplicate
    /// is returned if enabled, otherwise the last error. `scope_id` narrows
    /// the store-side similarity search to the batch scope.
    pub async fn produce_deduped_item(
        &self,
        subtopic: &Subtopic,
        required_polarity: bool,
        corpus: &[Item],
        batch_so_far: &[Item],
        base_guidance: Option<&str>,
        scope_id: Option<&str>,
    ) -> Result<DedupOutcome> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut request = GenerationRequest {
            topic: TopicContent::from(subtopic),
            required_polarity,
            style_hint: subtopic.style_hint(),
            avoidance_guidance: base_guidance.map(str::to_string),
        };

        let mut attempts = 0u32;
        let mut attempt_errors: Vec<String> = Vec::new();
        let mut last_error: Option<Error> = None;
        let mut last_candidate: Option<Item> = None;
        let mut failed_after_candidate = false;

        while attempts < max_attempts {
            if attempts > 0 {
                self.pause().await;
            }
            attempts += 1;

            let candidate = match self.generate_once(&request).await {
                Ok(c) if c.polarity == required_polarity => c,
                Ok(c) => {
                    let err = Error::Generation(format!(
                        "candidate polarity {} does not match required {}",
                        c.polarity, required_polarity
                    ));
                    self.record_failure(subtopic, attempts, err, &mut attempt_errors, &mut last_error);
                    failed_after_candidate = last_candidate.is_some();
                    continue;
                }
                Err(err) => {
                    let transient = err.is_transient();
                    self.record_failure(subtopic, attempts, err, &mut attempt_errors, &mut last_error);
                    failed_after_candidate = last_candidate.is_some();
                    if !transient {
                        break;
                    }
                    continue;
                }
            };

            let item = self
                .fingerprint(subtopic, candidate, self.generator.origin())
                .await;

            match self.find_duplicate(&item, corpus, batch_so_far, scope_id).await {
                None => {
                    tracing::debug!(subtopic_id = %subtopic.id, attempt = attempts, "candidate accepted");
                    return Ok(DedupOutcome {
                        item,
                        attempts,
                        reason: AcceptanceReason::SimilarityCheckPassed,
                        attempt_errors,
                    });
                }
                Some(dup) => {
                    tracing::info!(
                        subtopic_id = %subtopic.id,
                        attempt = attempts,
                        score = dup.score,
                        "duplicate candidate, regenerating"
                    );
                    request.avoidance_guidance = Some(avoidance_guidance(base_guidance, &dup.text));
                    last_candidate = Some(item);
                    failed_after_candidate = false;
                }
            }
        }

        if let Some(item) = last_candidate {
            let reason = if failed_after_candidate {
                AcceptanceReason::RegenerationError
            } else {
                AcceptanceReason::MaxAttemptsReached
            };
            tracing::warn!(subtopic_id = %subtopic.id, attempts, ?reason, "accepting best-effort candidate");
            return Ok(DedupOutcome {
                item,
                attempts,
                reason,
                attempt_errors,
            });
        }

        let err = last_error.unwrap_or_else(|| Error::Generation("generator produced no candidate".to_string()));
        if !self.settings.fallback_templates {
            return Err(err);
        }
        for candidate in fallback_candidates(subtopic, required_polarity) {
            let item = self
                .fingerprint(subtopic, candidate, FALLBACK_ORIGIN.to_string())
                .await;
            if self.find_duplicate(&item, corpus, batch_so_far, scope_id).await.is_none() {
                tracing::warn!(subtopic_id = %subtopic.id, attempts, error = %err, "using templated fallback item");
                return Ok(DedupOutcome {
                    item,
                    attempts,
                    reason: AcceptanceReason::RegenerationError,
                    attempt_errors,
                });
            }
        }
        tracing::warn!(subtopic_id = %subtopic.id, "every templated fallback is already in the corpus");
        Err(err)
    }

    async fn pause(&self) {
        if !self.settings.pause_between_calls.is_zero() {
            tokio::time::sleep(self.settings.pause_between_calls).await;
        }
    }

    async fn generate_once(&self, request: &GenerationRequest) -> Result<GeneratedCandidate> {
        match timeout(self.settings.external_timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Generation(format!(
                "generator timed out after {:?}",
                self.settings.external_timeout
            ))),
        }
    }

    fn record_failure(
        &self,
        subtopic: &Subtopic,
        attempt: u32,
        err: Error,
        attempt_errors: &mut Vec<String>,
        last_error: &mut Option<Error>,
    ) {
        tracing::warn!(subtopic_id = %subtopic.id, attempt, error = %err, "generation attempt failed");
        attempt_errors.push(err.to_string());
        *last_error = Some(err);
    }

    /// Builds the item; the embedding is optional, the hash never is.
    async fn fingerprint(&self, subtopic: &Subtopic, candidate: GeneratedCandidate, origin: String) -> Item {
        let embedding_vector = match timeout(self.settings.external_timeout, self.embedder.embed(&candidate.text)).await
        {
            Ok(Ok(embedding)) if !embedding.vector.is_empty() => Some(embedding.vector),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "embedding unavailable, using hash-only dedup");
                None
            }
            Err(_) => {
                tracing::warn!("embedding request timed out, using hash-only dedup");
                None
            }
        };

        Item {
            id: Uuid::new_v4(),
            topic_id: subtopic.parent_topic_id.clone(),
            subtopic_id: subtopic.id.clone(),
            semantic_hash: semantic_hash(&candidate.text, candidate.polarity, &candidate.source_reference),
            content_categories: derive_categories(&candidate.text),
            difficulty: clamp_difficulty(candidate.difficulty.map(i64::from)),
            text: candidate.text,
            polarity: candidate.polarity,
            explanation: candidate.explanation,
            source_reference: candidate.source_reference,
            embedding_vector,
            origin,
            created_at: now(),
        }
    }

    async fn find_duplicate(
        &self,
        item: &Item,
        corpus: &[Item],
        batch_so_far: &[Item],
        scope_id: Option<&str>,
    ) -> Option<DuplicateMatch> {
        if let Some(existing) = corpus
            .iter()
            .chain(batch_so_far.iter())
            .find(|other| other.semantic_hash == item.semantic_hash)
        {
            return Some(DuplicateMatch {
                text: existing.text.clone(),
                score: 1.0,
            });
        }

        let vector = item.embedding_vector.as_deref()?;
        let threshold = self.settings.duplicate_threshold;

        let from_corpus = if corpus.len() > self.settings.ann_corpus_threshold {
            self.search_store(item, vector, corpus, scope_id).await
        } else {
            find_most_similar(vector, corpus, threshold).map(|m| DuplicateMatch {
                text: m.candidate.text.clone(),
                score: m.score,
            })
        };
        let from_batch = find_most_similar(vector, batch_so_far, threshold).map(|m| DuplicateMatch {
            text: m.candidate.text.clone(),
            score: m.score,
        });

        match (from_corpus, from_batch) {
            (Some(a), Some(b)) => Some(if b.score > a.score { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    /// Large corpora are searched in the store; an unreachable store falls
    /// back to the in-process scan.
    async fn search_store(
        &self,
        item: &Item,
        vector: &[f32],
        corpus: &[Item],
        scope_id: Option<&str>,
    ) -> Option<DuplicateMatch> {
        let threshold = self.settings.duplicate_threshold;
        let filters = SimilarityFilters {
            subtopic_id: scope_id.map(str::to_string),
            ..SimilarityFilters::topic(&item.topic_id)
        };
        let search = self.store.similarity_search(vector, threshold, 1, &filters);
        match timeout(self.settings.external_timeout, search).await {
            Ok(Ok(hits)) => hits.into_iter().next().map(|hit| DuplicateMatch {
                text: hit.item.text,
                score: hit.score,
            }),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "store similarity search failed, scanning in process");
                find_most_similar(vector, corpus, threshold).map(|m| DuplicateMatch {
                    text: m.candidate.text.clone(),
                    score: m.score,
                })
            }
            Err(_) => {
                tracing::warn!("store similarity search timed out, scanning in process");
                find_most_similar(vector, corpus, threshold).map(|m| DuplicateMatch {
                    text: m.candidate.text.clone(),
                    score: m.score,
                })
            }
        }
    }
}

fn avoidance_guidance(base: Option<&str>, matched_text: &str) -> String {
    let avoid = format!(
        "Do not repeat or paraphrase this existing statement: \"{}\". Test a different element of the content.",
        matched_text
    );
    match base {
        Some(base) if !base.trim().is_empty() => format!("{}\n{}", base, avoid),
        _ => avoid,
    }
}
