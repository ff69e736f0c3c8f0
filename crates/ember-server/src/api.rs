use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, Method, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use ember_engine::{
    DecisionResponse, MatchPage, ProfileUpdate, QueueRequest, QueueResponse, QuotaStatus,
    SwipeEngine,
};
use ember_shared::{parse_gender_list, Decision, GeoPoint, MatchId, MatchStatus, UserId};

use crate::auth::{bearer_token, SessionVerifier};
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SwipeEngine>,
    pub sessions: Arc<SessionVerifier>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/queue", get(get_queue))
        .route("/v1/decisions", post(submit_decision))
        .route("/v1/quota", get(quota_status))
        .route("/v1/matches", get(list_matches))
        .route("/v1/matches/:match_id/block", post(block_match))
        .route("/internal/profiles/:user_id", put(upsert_profile))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Flat query form of [`QueueRequest`].
#[derive(Debug, Deserialize)]
struct QueueQuery {
    lat: f64,
    lng: f64,
    #[serde(default = "default_radius")]
    radius_km: f64,
    #[serde(default = "default_min_age")]
    min_age: u8,
    #[serde(default = "default_max_age")]
    max_age: u8,
    /// Comma-separated, e.g. `female,non_binary`.
    genders: String,
    #[serde(default = "default_queue_limit")]
    limit: u32,
    tz_offset_minutes: Option<i32>,
}

fn default_radius() -> f64 {
    50.0
}

fn default_min_age() -> u8 {
    ember_shared::constants::MIN_AGE
}

fn default_max_age() -> u8 {
    ember_shared::constants::MAX_AGE
}

fn default_queue_limit() -> u32 {
    20
}

impl QueueQuery {
    fn into_request(self) -> Result<QueueRequest, ServerError> {
        let location = GeoPoint::new(self.lat, self.lng).map_err(ember_engine::EngineError::from)?;
        let genders = parse_gender_list(&self.genders).map_err(ember_engine::EngineError::from)?;
        Ok(QueueRequest {
            location,
            radius_km: self.radius_km,
            min_age: self.min_age,
            max_age: self.max_age,
            genders,
            limit: self.limit,
            tz_offset_minutes: self.tz_offset_minutes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    target_id: UserId,
    decision: Decision,
    #[serde(default)]
    tz_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TzQuery {
    tz_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct MatchesQuery {
    limit: Option<u32>,
    cursor: Option<String>,
}

#[derive(Serialize)]
struct BlockResponse {
    match_id: MatchId,
    status: MatchStatus,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<QueueQuery>, QueryRejection>,
) -> Result<Json<QueueResponse>, ServerError> {
    let viewer = state.sessions.authenticate(&headers).await?;
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let request = query.into_request()?;
    let response = run(&state, move |engine| engine.get_queue(&viewer, &request)).await?;
    Ok(Json(response))
}

async fn submit_decision(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<DecisionResponse>, ServerError> {
    let viewer = state.sessions.authenticate(&headers).await?;
    let Json(req) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let response = run(&state, move |engine| {
        engine.submit_decision(&viewer, &req.target_id, req.decision, req.tz_offset_minutes)
    })
    .await?;
    Ok(Json(response))
}

async fn quota_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<TzQuery>, QueryRejection>,
) -> Result<Json<QuotaStatus>, ServerError> {
    let viewer = state.sessions.authenticate(&headers).await?;
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let status = run(&state, move |engine| {
        engine.quota_status(&viewer, query.tz_offset_minutes)
    })
    .await?;
    Ok(Json(status))
}

async fn list_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<MatchesQuery>, QueryRejection>,
) -> Result<Json<MatchPage>, ServerError> {
    let viewer = state.sessions.authenticate(&headers).await?;
    let Query(query) = query.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let page = run(&state, move |engine| {
        engine.list_matches(&viewer, query.limit, query.cursor.as_deref())
    })
    .await?;
    Ok(Json(page))
}

async fn block_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(match_id): Path<String>,
) -> Result<Json<BlockResponse>, ServerError> {
    let viewer = state.sessions.authenticate(&headers).await?;
    let match_id = MatchId(match_id);
    let blocked = run(&state, move |engine| engine.block_match(&viewer, &match_id)).await?;
    Ok(Json(BlockResponse {
        match_id: blocked.match_id,
        status: blocked.status,
    }))
}

async fn upsert_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<StatusCode, ServerError> {
    verify_internal_token(&headers, &state.config)?;
    let user_id = UserId::parse(&user_id).map_err(ember_engine::EngineError::from)?;
    let Json(update) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    run(&state, move |engine| engine.upsert_profile(user_id, update)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn verify_internal_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.internal_token else {
        return Err(ServerError::Forbidden(
            "Internal API is disabled (no INTERNAL_TOKEN configured)".into(),
        ));
    };

    let token = bearer_token(headers).unwrap_or("");

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid internal token".into()));
    }

    Ok(())
}

/// Run an engine operation on the blocking pool; engine calls hit SQLite.
async fn run<T, F>(state: &AppState, op: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&SwipeEngine) -> ember_engine::Result<T> + Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| ServerError::Internal(format!("engine task failed: {e}")))?
        .map_err(ServerError::from)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
