use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use quiz_engine::{
    error::{Error, Result},
    models::{item::GeneratedCandidate, item::Item, subtopic::parse_catalogue, subtopic::Subtopic},
    services::{
        ai_service::{ContentGenerator, GenerationRequest},
        coordinator_service::GenerationSettings,
        embed_service::{Embedding, EmbeddingClient},
        store_service::{CorpusStore, MemoryStore, ScoredItem, SimilarityFilters},
    },
    AppState,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

const CATALOGUE: &str = r#"[
    {"id": "theft-def", "parent_topic_id": "penal-code", "title": "Theft", "weight": 3.0, "order": 1,
     "content": "Theft is the taking of movable property belonging to another without consent.",
     "kind": "concept", "key_terms": ["movable property", "consent"]},
    {"id": "theft-penalty", "parent_topic_id": "penal-code", "title": "Penalty for theft", "weight": 1.0, "order": 2,
     "content": "Theft is punished with imprisonment from six months to three years.",
     "kind": "consequence", "sanctions": ["imprisonment"]},
    {"id": "robbery", "parent_topic_id": "penal-code", "title": "Robbery", "weight": 1.0, "order": 3,
     "content": "Robbery is theft committed with violence or intimidation.",
     "kind": "equivalent-conduct", "equivalent_to": "theft"}
]"#;

struct ScriptedGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCandidate> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedCandidate {
            text: format!("Statement {} on {}", n, request.topic.title),
            explanation: format!("Derived from: {}", request.topic.content),
            source_reference: request.topic.subtopic_id.clone(),
            polarity: request.required_polarity,
            difficulty: Some(3),
        })
    }

    fn origin(&self) -> String {
        "scripted".to_string()
    }
}

/// Orthogonal one-hot vectors, so no two statements are near duplicates.
struct OneHotEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingClient for OneHotEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; 256];
        vector[n % 256] = 1.0;
        Ok(Embedding::new(vector))
    }
}

struct OfflineEmbedder;

#[async_trait]
impl EmbeddingClient for OfflineEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(Error::EmbeddingUnavailable("EMBEDDING_API_KEY not set".into()))
    }
}

struct ReadOnlyStore(MemoryStore);

#[async_trait]
impl CorpusStore for ReadOnlyStore {
    async fn load_subtopics(&self, topic_id: &str) -> Result<Vec<Subtopic>> {
        self.0.load_subtopics(topic_id).await
    }

    async fn query_corpus(&self, topic_id: &str, scope_id: Option<&str>) -> Result<Vec<Item>> {
        self.0.query_corpus(topic_id, scope_id).await
    }

    async fn insert_batch(&self, _items: &[Item]) -> Result<Vec<Item>> {
        Err(Error::Persistence("database is read-only".into()))
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
        filters: &SimilarityFilters,
    ) -> Result<Vec<ScoredItem>> {
        self.0.similarity_search(query, threshold, limit, filters).await
    }
}

fn settings() -> GenerationSettings {
    GenerationSettings {
        pause_between_calls: Duration::ZERO,
        external_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn catalogue_store() -> MemoryStore {
    MemoryStore::with_subtopics(parse_catalogue(CATALOGUE).expect("catalogue")).expect("store")
}

fn app_with(store: Arc<dyn CorpusStore>, embedder: Arc<dyn EmbeddingClient>, rps: u32) -> Router {
    let generator = Arc::new(ScriptedGenerator {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::new(store, generator, embedder, settings(), 20);
    quiz_engine::routes::router(state, rps)
}

fn app() -> Router {
    app_with(
        Arc::new(catalogue_store()),
        Arc::new(OneHotEmbedder {
            calls: AtomicUsize::new(0),
        }),
        1000,
    )
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn batch_generation_end_to_end() {
    let app = app();

    let (status, dist) = send(&app, "GET", "/api/topics/penal-code/distribution?requested_count=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dist["total_deficit"], 5);
    assert_eq!(dist["planned_total"], 5);
    assert_eq!(dist["snapshot"]["entries"].as_array().unwrap().len(), 3);

    let (status, session) = send(&app, "POST", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let (status, batch) = send(
        &app,
        "POST",
        "/api/topics/penal-code/batches",
        Some(json!({ "requested_count": 5, "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", batch);
    assert_eq!(batch["partial"], false);
    assert_eq!(batch["session_position"], 5);
    let items = batch["outcome"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items.iter().filter(|i| i["polarity"] == false).count(), 3);
    assert_eq!(items.iter().filter(|i| i["polarity"] == true).count(), 2);
    assert!(items.iter().all(|i| i["embedding_vector"].is_array()));
    assert!(items.iter().all(|i| i["semantic_hash"].as_str().unwrap().len() == 16));
    let reports = batch["outcome"]["reports"].as_array().unwrap();
    assert!(reports.iter().all(|r| r["reason"] == "similarity_check_passed"));

    let (status, listed) = send(&app, "GET", "/api/topics/penal-code/items", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 5);

    let (status, progress) = send(&app, "GET", "/api/topics/penal-code/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["current"], 5);
    assert_eq!(progress["total"], 5);

    // The corpus now matches the targets for a batch of five.
    let (_, dist) = send(&app, "GET", "/api/topics/penal-code/distribution?requested_count=5", None).await;
    assert_eq!(dist["total_deficit"], 0);
    assert_eq!(dist["planned_total"], 0);

    let (_, dist) = send(
        &app,
        "GET",
        "/api/topics/penal-code/distribution?requested_count=5&allow_continuous=true",
        None,
    )
    .await;
    assert_eq!(dist["planned_total"], 5);

    let (status, analysis) = send(&app, "GET", "/api/topics/penal-code/analysis", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["clusters"].as_array().unwrap().len(), 5);
    assert!(!analysis["suggestions"].as_array().unwrap().is_empty());

    let (status, reset) = send(&app, "POST", &format!("/api/sessions/{}/reset", session_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["position"], 0);
}

#[tokio::test]
async fn deleted_sessions_are_gone() {
    let app = app();
    let (_, session) = send(&app, "POST", "/api/sessions", None).await;
    let uri = format!("/api/sessions/{}", session["session_id"].as_str().unwrap());

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scoped_batch_only_touches_its_subtopic() {
    let app = app();
    let (status, batch) = send(
        &app,
        "POST",
        "/api/topics/penal-code/batches",
        Some(json!({ "requested_count": 2, "scope_id": "robbery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", batch);
    assert_eq!(batch["outcome"]["key"]["scope_id"], "robbery");
    let items = batch["outcome"]["items"].as_array().unwrap();
    assert!(items.iter().all(|i| i["subtopic_id"] == "robbery"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/topics/penal-code/batches",
        Some(json!({ "requested_count": 2, "scope_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = app();

    let (status, _) = send(&app, "POST", "/api/topics/penal-code/batches", Some(json!({ "requested_count": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        send(&app, "POST", "/api/topics/penal-code/batches", Some(json!({ "requested_count": 21 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");

    let (status, _) = send(
        &app,
        "POST",
        "/api/topics/penal-code/batches",
        Some(json!({ "requested_count": 1, "session_id": "00000000-0000-0000-0000-000000000001" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/topics/penal-code/progress?variant=never-run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_topic_yields_an_empty_batch() {
    let (status, batch) = send(
        &app(),
        "POST",
        "/api/topics/no-such-topic/batches",
        Some(json!({ "requested_count": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(batch["outcome"]["generated_count"], 0);
    assert_eq!(batch["partial"], true);
}

#[tokio::test]
async fn offline_embeddings_fall_back_to_hash_dedup() {
    let app = app_with(Arc::new(catalogue_store()), Arc::new(OfflineEmbedder), 1000);
    let (status, batch) = send(
        &app,
        "POST",
        "/api/topics/penal-code/batches",
        Some(json!({ "requested_count": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", batch);
    let items = batch["outcome"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i["embedding_vector"].is_null()));
    assert!(items.iter().all(|i| !i["semantic_hash"].as_str().unwrap().is_empty()));
}

#[tokio::test]
async fn persistence_failure_fails_the_whole_batch() {
    let app = app_with(
        Arc::new(ReadOnlyStore(catalogue_store())),
        Arc::new(OfflineEmbedder),
        1000,
    );
    let (status, body) = send(
        &app,
        "POST",
        "/api/topics/penal-code/batches",
        Some(json!({ "requested_count": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "persistence");

    let (_, listed) = send(&app, "GET", "/api/topics/penal-code/items", None).await;
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn api_is_rate_limited() {
    let app = app_with(Arc::new(catalogue_store()), Arc::new(OfflineEmbedder), 1);
    let (first, _) = send(&app, "GET", "/api/topics/penal-code/items", None).await;
    let (second, body) = send(&app, "GET", "/api/topics/penal-code/items", None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");

    let (health, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(health, StatusCode::OK);
}
