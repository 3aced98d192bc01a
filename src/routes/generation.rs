use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};

use crate::{
    dto::generation_dto::{
        BatchResponse, DistributionQuery, DistributionResponse, GenerateBatchPayload,
        ItemListResponse, ScopeQuery,
    },
    error::{Error, Result},
    models::{
        batch::{BatchKey, BatchProgress},
        plan::plan_total,
    },
    services::analyzer_service::SemanticAnalysis,
    utils::validation::{ensure_identifier, validate},
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/topics/{topic_id}/batches",
    params(
        ("topic_id" = String, Path, description = "Topic ID")
    ),
    request_body = GenerateBatchPayload,
    responses(
        (status = 200, description = "Batch generated, possibly partial", body = BatchResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown session or subtopic"),
        (status = 422, description = "Invalid catalogue"),
        (status = 500, description = "Batch could not be persisted")
    )
)]
#[axum::debug_handler]
pub async fn generate_batch(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(payload): Json<GenerateBatchPayload>,
) -> Result<impl IntoResponse> {
    ensure_identifier("topic_id", &topic_id)?;
    validate(&payload)?;
    if payload.requested_count > state.max_batch_size {
        return Err(Error::BadRequest(format!(
            "requested_count must not exceed {}",
            state.max_batch_size
        )));
    }

    let session = state
        .sessions
        .resolve(payload.session_id)
        .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;

    let options = payload.options();
    let key = BatchKey::new(&topic_id, options.scope_id.as_deref(), options.variant.as_deref());
    let sink = state.progress.sink(key);

    let outcome = state
        .coordinator
        .generate_batch(&topic_id, payload.requested_count, options, session.clone(), Some(sink))
        .await?;

    Ok(Json(BatchResponse {
        session_id: session.id(),
        session_position: session.position(),
        partial: outcome.is_partial(),
        outcome,
    }))
}

#[utoipa::path(
    get,
    path = "/api/topics/{topic_id}/progress",
    params(
        ("topic_id" = String, Path, description = "Topic ID"),
        ("scope_id" = Option<String>, Query, description = "Subtopic scope"),
        ("variant" = Option<String>, Query, description = "Batch variant")
    ),
    responses(
        (status = 200, description = "Latest progress of the batch", body = BatchProgress),
        (status = 404, description = "No batch has reported progress")
    )
)]
#[axum::debug_handler]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<impl IntoResponse> {
    ensure_identifier("topic_id", &topic_id)?;
    validate(&query)?;
    let key = BatchKey::new(&topic_id, query.scope_id.as_deref(), query.variant.as_deref());
    let progress = state
        .progress
        .get(&key)
        .ok_or_else(|| Error::NotFound(format!("No progress recorded for {}", key)))?;
    Ok(Json(progress))
}

#[utoipa::path(
    get,
    path = "/api/topics/{topic_id}/analysis",
    params(
        ("topic_id" = String, Path, description = "Topic ID"),
        ("scope_id" = Option<String>, Query, description = "Subtopic scope")
    ),
    responses(
        (status = 200, description = "Semantic analysis of the corpus", body = SemanticAnalysis)
    )
)]
#[axum::debug_handler]
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<impl IntoResponse> {
    ensure_identifier("topic_id", &topic_id)?;
    validate(&query)?;
    let analysis = state
        .coordinator
        .analyze(&topic_id, query.scope_id.as_deref())
        .await?;
    Ok(Json(analysis))
}

#[utoipa::path(
    get,
    path = "/api/topics/{topic_id}/distribution",
    params(
        ("topic_id" = String, Path, description = "Topic ID"),
        ("requested_count" = usize, Query, description = "Batch size to plan for"),
        ("allow_continuous" = Option<bool>, Query, description = "Plan beyond the deficits"),
        ("scope_id" = Option<String>, Query, description = "Subtopic scope")
    ),
    responses(
        (status = 200, description = "Distribution snapshot and dry-run plan", body = DistributionResponse),
        (status = 400, description = "Invalid query"),
        (status = 422, description = "Invalid catalogue")
    )
)]
#[axum::debug_handler]
pub async fn get_distribution(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<DistributionQuery>,
) -> Result<impl IntoResponse> {
    ensure_identifier("topic_id", &topic_id)?;
    validate(&query)?;
    let (snapshot, plan) = state
        .coordinator
        .preview(&topic_id, query.requested_count, &query.options())
        .await?;
    Ok(Json(DistributionResponse {
        requested_count: query.requested_count,
        total_deficit: snapshot.total_deficit(),
        planned_total: plan_total(&plan),
        snapshot,
        plan,
    }))
}

#[utoipa::path(
    get,
    path = "/api/topics/{topic_id}/items",
    params(
        ("topic_id" = String, Path, description = "Topic ID"),
        ("scope_id" = Option<String>, Query, description = "Subtopic scope")
    ),
    responses(
        (status = 200, description = "Stored items of the topic", body = ItemListResponse)
    )
)]
#[axum::debug_handler]
pub async fn list_items(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<impl IntoResponse> {
    ensure_identifier("topic_id", &topic_id)?;
    validate(&query)?;
    let items = state
        .store
        .query_corpus(&topic_id, query.scope_id.as_deref())
        .await?;
    Ok(Json(ItemListResponse {
        total: items.len(),
        items,
    }))
}
