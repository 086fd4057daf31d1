use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::classify::ClassificationStatus;
use crate::error::PipelineError;
use crate::query::{ArticlePage, QueryParams};
use crate::refresh::RefreshAck;
use crate::service::{Health, NewsService, SourceList};

#[derive(Clone)]
pub struct AppState {
    service: NewsService,
}

/// JSON routes over the service. `/metrics` is mounted by the binary.
pub fn router(service: NewsService) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health))
        .route("/api/articles", get(list_articles))
        .route("/api/refresh", get(refresh).post(refresh))
        .route("/api/classification-status", get(classification_status))
        .route("/api/sources", get(sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `{ "error": "..." }` with 400 for consumer mistakes, 500 otherwise.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PipelineError::QueryInvalidParameter { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(state.service.health())
}

async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ArticlePage>, ApiError> {
    let page = state.service.list_articles(&params)?;
    Ok(Json(page))
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshAck>) {
    let ack = state.service.refresh_now();
    (StatusCode::ACCEPTED, Json(ack))
}

async fn classification_status(State(state): State<AppState>) -> Json<ClassificationStatus> {
    Json(state.service.classification_status())
}

async fn sources(State(state): State<AppState>) -> Json<SourceList> {
    Json(state.service.sources())
}
