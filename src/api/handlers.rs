//! API request handlers

use crate::ingest::{
    CommitFact, FileDetailFact, IngestionService, RepositoryState, RepositoryStateResponse,
    SpanFact,
};
use crate::query::{
    ApplicationCommitTree, ApplicationMetrics, CommitSummary, QueryService, StructureSelector,
    Timestamp,
};
use crate::store::GraphStore;
use crate::structure::{FlatLandscape, StructureError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub store: Arc<dyn GraphStore>,
    pub ingest: IngestionService,
    pub query: QueryService,
}

impl ServerState {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            ingest: IngestionService::new(store.clone()),
            query: QueryService::new(store.clone()),
            store,
        }
    }

    /// Make an ingestion durable. A failed flush is logged, the ingestion
    /// itself already succeeded.
    async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            tracing::warn!("Failed to flush store: {:#}", e);
        }
    }
}

pub type StoreState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Ingestion
// ============================================================================

pub async fn ingest_state(
    State(state): State<StoreState>,
    Json(fact): Json<RepositoryState>,
) -> Result<Json<RepositoryStateResponse>, AppError> {
    let response = state.ingest.ingest_repository_state(&fact).await?;
    state.flush().await;
    Ok(Json(response))
}

pub async fn ingest_commit(
    State(state): State<StoreState>,
    Json(fact): Json<CommitFact>,
) -> Result<StatusCode, AppError> {
    state.ingest.ingest_commit(&fact).await?;
    state.flush().await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest_file_detail(
    State(state): State<StoreState>,
    Json(fact): Json<FileDetailFact>,
) -> Result<StatusCode, AppError> {
    state.ingest.ingest_file_detail(&fact).await?;
    state.flush().await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest_span(
    State(state): State<StoreState>,
    Json(fact): Json<SpanFact>,
) -> Result<StatusCode, AppError> {
    state.ingest.ingest_span(&fact).await?;
    state.flush().await;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Queries
// ============================================================================

/// Newest commit of every repository
pub async fn get_latest_structure(
    State(state): State<StoreState>,
    Path(token): Path<String>,
) -> Result<Json<FlatLandscape>, AppError> {
    let landscape = state
        .query
        .structure(&token, &StructureSelector::Latest)
        .await?;
    Ok(Json(landscape))
}

/// One commit (`h`) or the union of two (`h1-h2`)
pub async fn get_commit_structure(
    State(state): State<StoreState>,
    Path((token, commits)): Path<(String, String)>,
) -> Result<Json<FlatLandscape>, AppError> {
    let selector = StructureSelector::parse(&commits)?;
    let landscape = state.query.structure(&token, &selector).await?;
    Ok(Json(landscape))
}

pub async fn get_commit_tree(
    State(state): State<StoreState>,
    Path((token, application)): Path<(String, String)>,
) -> Result<Json<ApplicationCommitTree>, AppError> {
    Ok(Json(state.query.commit_tree(&token, &application).await?))
}

pub async fn get_commit_metrics(
    State(state): State<StoreState>,
    Path((token, application, commit)): Path<(String, String, String)>,
) -> Result<Json<ApplicationMetrics>, AppError> {
    Ok(Json(state.query.metrics(&token, &application, &commit).await?))
}

pub async fn get_timestamps(
    State(state): State<StoreState>,
    Path(token): Path<String>,
) -> Result<Json<Vec<Timestamp>>, AppError> {
    Ok(Json(state.query.timestamps(&token).await?))
}

pub async fn get_latest_commit(
    State(state): State<StoreState>,
    Path((token, repository, branch)): Path<(String, String, String)>,
) -> Result<Json<CommitSummary>, AppError> {
    Ok(Json(
        state
            .query
            .latest_commit(&token, &repository, &branch)
            .await?,
    ))
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    FailedPrecondition(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::FailedPrecondition(msg) => (StatusCode::PRECONDITION_FAILED, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<StructureError> for AppError {
    fn from(err: StructureError) -> Self {
        match err {
            StructureError::NotFound(msg) | StructureError::ResolutionEmpty(msg) => {
                AppError::NotFound(msg)
            }
            StructureError::FailedPrecondition(msg) => AppError::FailedPrecondition(msg),
            StructureError::InvalidArgument(msg) => AppError::BadRequest(msg),
            StructureError::Store(e) => AppError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_errors_map_to_status() {
        let cases = [
            (StructureError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StructureError::ResolutionEmpty("x".into()), StatusCode::NOT_FOUND),
            (
                StructureError::FailedPrecondition("x".into()),
                StatusCode::PRECONDITION_FAILED,
            ),
            (StructureError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (
                StructureError::Store(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
