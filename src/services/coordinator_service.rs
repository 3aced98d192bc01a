use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::models::batch::{
    BatchItemError, BatchKey, BatchOptions, BatchOutcome, BatchProgress, ItemReport,
};
use crate::models::item::Item;
use crate::models::plan::{plan_total, DistributionSnapshot, GenerationPlanEntry};
use crate::models::subtopic::Subtopic;
use crate::services::analyzer_service::{AnalyzerService, SemanticAnalysis};
use crate::services::dedup_service::{DedupOutcome, DedupService};
use crate::services::planner_service::PlannerService;
use crate::services::session_service::GenerationSession;
use crate::services::store_service::CorpusStore;
use crate::utils::time::millis_since;

pub type ProgressSink = Arc<dyn Fn(BatchProgress) + Send + Sync>;

type SharedBatch = Shared<BoxFuture<'static, std::result::Result<BatchOutcome, Arc<Error>>>>;

#[derive(Clone, Debug)]
pub struct GenerationSettings {
    pub max_attempts: u32,
    pub duplicate_threshold: f32,
    pub pause_between_calls: Duration,
    pub external_timeout: Duration,
    /// Corpus size above which duplicate search is delegated to the store.
    pub ann_corpus_threshold: usize,
    pub fallback_templates: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            duplicate_threshold: 0.9,
            pause_between_calls: Duration::from_millis(1200),
            external_timeout: Duration::from_secs(30),
            ann_corpus_threshold: 2000,
            fallback_templates: true,
        }
    }
}

struct InFlight {
    ticket: u64,
    future: SharedBatch,
}

struct CoordinatorInner {
    store: Arc<dyn CorpusStore>,
    dedup: DedupService,
    planner: PlannerService,
    analyzer: AnalyzerService,
    settings: GenerationSettings,
    in_flight: Mutex<HashMap<BatchKey, InFlight>>,
    next_ticket: AtomicU64,
}

/// Removes a registry entry when the batch task ends, however it ends.
struct RegistryGuard {
    inner: Arc<CoordinatorInner>,
    key: BatchKey,
    ticket: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let mut registry = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if registry.get(&self.key).is_some_and(|f| f.ticket == self.ticket) {
            registry.remove(&self.key);
        }
    }
}

/// Accumulates a batch while it is produced.
struct BatchState {
    items: Vec<Item>,
    reports: Vec<ItemReport>,
    errors: Vec<BatchItemError>,
    current: usize,
    total: usize,
}

impl BatchState {
    fn new(total: usize) -> Self {
        Self {
            items: Vec::with_capacity(total),
            reports: Vec::with_capacity(total),
            errors: Vec::new(),
            current: 0,
            total,
        }
    }

    fn accept(&mut self, outcome: DedupOutcome) {
        if outcome.item.is_fallback() {
            self.errors.push(BatchItemError {
                position: self.current,
                subtopic_id: outcome.item.subtopic_id.clone(),
                kind: "generation".to_string(),
                message: format!(
                    "generator failed {} time(s), templated item used: {}",
                    outcome.attempt_errors.len(),
                    outcome.attempt_errors.last().cloned().unwrap_or_default()
                ),
            });
        }
        self.reports.push(ItemReport {
            item_id: outcome.item.id,
            subtopic_id: outcome.item.subtopic_id.clone(),
            attempts: outcome.attempts,
            reason: outcome.reason,
        });
        self.items.push(outcome.item);
    }

    fn fail(&mut self, subtopic_id: &str, err: &Error) {
        self.errors.push(BatchItemError {
            position: self.current,
            subtopic_id: subtopic_id.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }

    fn progress(&self) -> BatchProgress {
        BatchProgress {
            current: self.current,
            total: self.total,
            last_item: self.items.last().cloned(),
            errors: self.errors.clone(),
        }
    }
}

/// Entry point for batch generation. Cheap to clone; clones share the
/// single-flight registry.
#[derive(Clone)]
pub struct GenerationCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl GenerationCoordinator {
    pub fn new(store: Arc<dyn CorpusStore>, dedup: DedupService, settings: GenerationSettings) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                dedup,
                planner: PlannerService::new(),
                analyzer: AnalyzerService::new(),
                settings,
                in_flight: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.inner.settings
    }

    pub fn is_in_flight(&self, key: &BatchKey) -> bool {
        self.inner
            .in_flight
            .lock()
            .expect("in-flight registry lock poisoned")
            .contains_key(key)
    }

    /// Generates a batch, or joins the identical batch already running.
    ///
    /// The batch runs on its own task and completes even if every caller
    /// goes away. Only the caller that started it receives progress.
    pub async fn generate_batch(
        &self,
        topic_id: &str,
        requested_count: usize,
        options: BatchOptions,
        session: Arc<GenerationSession>,
        progress: Option<ProgressSink>,
    ) -> Result<BatchOutcome> {
        let key = BatchKey::new(topic_id, options.scope_id.as_deref(), options.variant.as_deref());

        let shared = {
            let mut registry = self
                .inner
                .in_flight
                .lock()
                .expect("in-flight registry lock poisoned");
            if let Some(existing) = registry.get(&key) {
                tracing::info!(key = %key, "joining in-flight batch");
                existing.future.clone()
            } else {
                let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst);
                let guard = RegistryGuard {
                    inner: self.inner.clone(),
                    key: key.clone(),
                    ticket,
                };
                let inner = self.inner.clone();
                let task_key = key.clone();
                let allow_continuous = options.allow_continuous;
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    inner
                        .run_batch(task_key, requested_count, allow_continuous, session, progress)
                        .await
                        .map_err(Arc::new)
                });
                let future: SharedBatch = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join_err) => Err(Arc::new(Error::Internal(format!(
                            "batch task aborted: {}",
                            join_err
                        )))),
                    }
                }
                .boxed()
                .shared();
                registry.insert(
                    key.clone(),
                    InFlight {
                        ticket,
                        future: future.clone(),
                    },
                );
                future
            }
        };

        shared.await.map_err(Error::from)
    }

    /// Distribution and plan a batch of `requested_count` would get now.
    pub async fn preview(
        &self,
        topic_id: &str,
        requested_count: usize,
        options: &BatchOptions,
    ) -> Result<(DistributionSnapshot, Vec<GenerationPlanEntry>)> {
        let key = BatchKey::new(topic_id, options.scope_id.as_deref(), options.variant.as_deref());
        let subtopics = self.inner.load_subtopics(&key).await?;
        let corpus = self.inner.load_corpus(&key).await?;
        let counts = count_by_subtopic(&corpus);
        let snapshot = self.inner.planner.snapshot(&subtopics, &counts, requested_count)?;
        let plan = self
            .inner
            .planner
            .plan(&subtopics, &counts, requested_count, options.allow_continuous)?;
        Ok((snapshot, plan))
    }

    pub async fn analyze(&self, topic_id: &str, scope_id: Option<&str>) -> Result<SemanticAnalysis> {
        let key = BatchKey::new(topic_id, scope_id, None);
        let corpus = self.inner.load_corpus(&key).await?;
        Ok(self.inner.analyzer.analyze(&corpus))
    }
}

impl CoordinatorInner {
    async fn load_subtopics(&self, key: &BatchKey) -> Result<Vec<Subtopic>> {
        let mut subtopics = timeout(self.settings.external_timeout, self.store.load_subtopics(&key.topic_id))
            .await
            .map_err(|_| Error::Persistence("loading subtopics timed out".to_string()))??;
        if let Some(scope) = key.subtopic_scope() {
            subtopics.retain(|s| s.id == scope);
            if subtopics.is_empty() {
                return Err(Error::NotFound(format!(
                    "Subtopic {} not found in topic {}",
                    scope, key.topic_id
                )));
            }
        }
        Ok(subtopics)
    }

    async fn load_corpus(&self, key: &BatchKey) -> Result<Vec<Item>> {
        timeout(
            self.settings.external_timeout,
            self.store.query_corpus(&key.topic_id, key.subtopic_scope()),
        )
        .await
        .map_err(|_| Error::Persistence("corpus query timed out".to_string()))?
    }

    async fn run_batch(
        &self,
        key: BatchKey,
        requested_count: usize,
        allow_continuous: bool,
        session: Arc<GenerationSession>,
        progress: Option<ProgressSink>,
    ) -> Result<BatchOutcome> {
        let started = Instant::now();
        tracing::info!(key = %key, requested_count, allow_continuous, "batch started");

        let subtopics = self.load_subtopics(&key).await?;
        let corpus = self.load_corpus(&key).await?;
        let analysis = self.analyzer.analyze(&corpus);
        let guidance = analysis.guidance();

        let counts = count_by_subtopic(&corpus);
        let plan = self
            .planner
            .plan(&subtopics, &counts, requested_count, allow_continuous)?;
        let total = plan_total(&plan);
        if total == 0 {
            tracing::info!(key = %key, "nothing to generate");
        }

        let mut state = BatchState::new(total);
        for entry in &plan {
            let Some(subtopic) = subtopics.iter().find(|s| s.id == entry.subtopic_id) else {
                continue;
            };
            for _ in 0..entry.count_to_generate {
                state.current += 1;
                let polarity = session.next_polarity();
                let result = self
                    .dedup
                    .produce_deduped_item(
                        subtopic,
                        polarity,
                        &corpus,
                        &state.items,
                        guidance.as_deref(),
                        key.subtopic_scope(),
                    )
                    .await;

                match result {
                    Ok(outcome) => state.accept(outcome),
                    Err(err) => {
                        tracing::error!(key = %key, subtopic_id = %subtopic.id, error = %err, "unit failed");
                        state.fail(&subtopic.id, &err);
                    }
                }

                if let Some(sink) = &progress {
                    sink(state.progress());
                }

                if state.current < total && !self.settings.pause_between_calls.is_zero() {
                    tokio::time::sleep(self.settings.pause_between_calls).await;
                }
            }
        }

        let items = if state.items.is_empty() {
            Vec::new()
        } else {
            match timeout(self.settings.external_timeout, self.store.insert_batch(&state.items)).await {
                Ok(Ok(stored)) => stored,
                Ok(Err(Error::Persistence(msg))) => return Err(Error::Persistence(msg)),
                Ok(Err(e)) => return Err(Error::Persistence(e.to_string())),
                Err(_) => return Err(Error::Persistence("insert batch timed out".to_string())),
            }
        };

        let generated_count = items.len();
        tracing::info!(
            key = %key,
            requested_count,
            generated_count,
            errors = state.errors.len(),
            elapsed_ms = millis_since(started),
            "batch finished"
        );

        Ok(BatchOutcome {
            key,
            items,
            reports: state.reports,
            errors: state.errors,
            plan,
            requested_count,
            generated_count,
        })
    }
}

fn count_by_subtopic(corpus: &[Item]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for item in corpus {
        *counts.entry(item.subtopic_id.clone()).or_insert(0) += 1;
    }
    counts
}
