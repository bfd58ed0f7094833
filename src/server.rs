use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::Sse,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    api::{ChatRequest, GenerateRequest, GenerateResponse, StreamChatRequest},
    catalog::{self, ModelInfo},
    config::AppConfig,
    error::ServiceError,
    provider::TextGenerator,
    quota::{self, DailyQuota},
    relay::{EventStream, StreamRelay},
    session::SessionStore,
    story,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: Arc<dyn TextGenerator>,
    pub sessions: Arc<dyn SessionStore>,
    pub quota: Arc<DailyQuota>,
}

#[derive(Serialize)]
struct ModelsResponse {
    models: &'static [ModelInfo],
}

pub fn build_router(state: AppState) -> Router {
    // The daily budget covers generation only; listings stay reachable after
    // the limit is spent.
    let generation = Router::new()
        .route("/v1/generate", post(generate_chapter))
        .route("/v1/chat", post(chat))
        .route("/v2/generate", post(stream_generate))
        .route("/v2/chat", post(stream_chat))
        .layer(middleware::from_fn_with_state(
            state.quota.clone(),
            quota::quota_guard,
        ));

    let catalogs = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/settings", get(list_settings))
        .route("/v1/narrative", get(list_narrative));

    Router::new()
        .route("/health", get(health))
        .nest("/api/novel", generation.merge(catalogs))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: catalog::MODELS.as_slice(),
    })
}

async fn list_settings() -> Json<Value> {
    Json(serde_json::json!({ "settings": catalog::settings_catalog() }))
}

async fn list_narrative() -> Json<Value> {
    Json(serde_json::json!({ "narrative": catalog::narrative_catalog() }))
}

async fn generate_chapter(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServiceError> {
    request.validate()?;
    let response = story::generate_chapter(state.client.as_ref(), request).await?;
    Ok(Json(response))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<GenerateResponse>, ServiceError> {
    request.validate()?;
    let response = story::continue_chat(state.client.as_ref(), request).await?;
    Ok(Json(response))
}

async fn stream_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Sse<EventStream>, ServiceError> {
    request.validate()?;
    let (relay, events) = StreamRelay::new();
    tokio::spawn(story::stream_novel(
        state.client.clone(),
        state.sessions.clone(),
        state.config.endless_chapter_count,
        request,
        relay,
    ));
    Ok(Sse::new(events))
}

async fn stream_chat(
    State(state): State<AppState>,
    Json(request): Json<StreamChatRequest>,
) -> Result<Sse<EventStream>, ServiceError> {
    request.validate()?;
    let (relay, events) = StreamRelay::new();
    tokio::spawn(story::stream_continuation(
        state.client.clone(),
        state.sessions.clone(),
        request,
        relay,
    ));
    Ok(Sse::new(events))
}
