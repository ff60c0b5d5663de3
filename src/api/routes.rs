//! API route definitions

use super::handlers::{self, StoreState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: StoreState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Ingestion
        // ====================================================================
        .route("/v2/ingest/state", post(handlers::ingest_state))
        .route("/v2/ingest/commits", post(handlers::ingest_commit))
        .route("/v2/ingest/files", post(handlers::ingest_file_detail))
        .route("/v2/ingest/spans", post(handlers::ingest_span))
        // ====================================================================
        // Structure & commits
        // ====================================================================
        .route(
            "/v2/code/structure/{token}",
            get(handlers::get_latest_structure),
        )
        .route(
            "/v2/code/structure/{token}/{commits}",
            get(handlers::get_commit_structure),
        )
        .route(
            "/v2/code/commit-tree/{token}/{application}",
            get(handlers::get_commit_tree),
        )
        .route(
            "/v2/code/metrics/{token}/{application}/{commit}",
            get(handlers::get_commit_metrics),
        )
        // ====================================================================
        // Landscapes
        // ====================================================================
        .route(
            "/v2/landscapes/{token}/timestamps",
            get(handlers::get_timestamps),
        )
        .route(
            "/v2/landscapes/{token}/commits/{repository}/{branch}/latest",
            get(handlers::get_latest_commit),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::ServerState;
    use crate::store::MemoryGraphStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt; // oneshot

    fn app() -> Router {
        let store = Arc::new(MemoryGraphStore::new());
        create_router(Arc::new(ServerState::new(store)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn state_body() -> Value {
        json!({
            "landscapeToken": "tok",
            "repositoryName": "org/myrepo",
            "branchName": "main",
            "applicationPaths": {"app": ""}
        })
    }

    fn commit_body() -> Value {
        json!({
            "landscapeToken": "tok",
            "repositoryName": "myrepo",
            "branchName": "main",
            "commitHash": "commit1",
            "commitDate": "2024-05-01T10:00:00Z",
            "addedFiles": [
                {"hash": "1", "path": "src/File1.java"},
                {"hash": "2", "path": "src/File2.java"}
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_commit_for_unknown_repository_is_412() {
        let response = app()
            .oneshot(post_json("/v2/ingest/commits", commit_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_ingest_then_query_structure() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post_json("/v2/ingest/state", state_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["branchName"], "main");
        assert_eq!(json["commitId"], "");

        let response = app
            .clone()
            .oneshot(post_json("/v2/ingest/commits", commit_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(get_request("/v2/code/structure/tok/commit1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["landscapeToken"], "tok");
        assert_eq!(json["buildings"].as_object().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(get_request("/v2/code/commit-tree/tok/app"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["branches"][0]["name"], "main");
        assert_eq!(
            json["branches"][0]["branchPoint"],
            json!({"name": "NONE", "commitId": ""})
        );
    }

    #[tokio::test]
    async fn test_commit_metrics() {
        let app = app();
        for (uri, body) in [
            ("/v2/ingest/state", state_body()),
            ("/v2/ingest/commits", commit_body()),
        ] {
            let response = app.clone().oneshot(post_json(uri, body)).await.unwrap();
            assert!(response.status().is_success());
        }
        let detail = json!({
            "landscapeToken": "tok",
            "repositoryName": "myrepo",
            "fileHash": "1",
            "metrics": {"loc": 10, "cyclomatic_complexity": 4},
            "classes": [{"name": "File1", "metrics": {"loc": 8}}]
        });
        let response = app
            .clone()
            .oneshot(post_json("/v2/ingest/files", detail))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(get_request("/v2/code/metrics/tok/app/commit1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json["fileMetrics"]["src/File1.java"],
            json!({"loc": "10", "cyclomatic_complexity": "4"})
        );
        assert_eq!(json["fileMetrics"]["src/File2.java"]["loc"], "UNKNOWN");
        assert_eq!(json["classMetrics"]["src/File1.java/File1"]["loc"], "8");
        assert_eq!(json["methodMetrics"], json!({}));

        let response = app
            .clone()
            .oneshot(get_request("/v2/code/metrics/tok/app/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_file_details_complete_latest_commit() {
        let app = app();
        for (uri, body) in [
            ("/v2/ingest/state", state_body()),
            ("/v2/ingest/commits", commit_body()),
        ] {
            let response = app.clone().oneshot(post_json(uri, body)).await.unwrap();
            assert!(response.status().is_success());
        }

        let latest = "/v2/landscapes/tok/commits/myrepo/main/latest";
        let response = app.clone().oneshot(get_request(latest)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        for hash in ["1", "2"] {
            let body = json!({
                "landscapeToken": "tok",
                "repositoryName": "myrepo",
                "fileHash": hash,
                "language": "JAVA"
            });
            let response = app
                .clone()
                .oneshot(post_json("/v2/ingest/files", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let response = app.clone().oneshot(get_request(latest)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["hash"], "commit1");
        assert_eq!(json["fileCount"], 2);
    }

    #[tokio::test]
    async fn test_span_ingestion_and_timestamps() {
        let app = app();
        let span = json!({
            "landscapeToken": "tok",
            "applicationName": "shop",
            "traceId": "t1",
            "spanId": "s1",
            "functionFqn": "net.shop.Cart.add",
            "startTime": 1000,
            "endTime": 2000
        });
        let response = app
            .clone()
            .oneshot(post_json("/v2/ingest/spans", span))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(get_request("/v2/landscapes/tok/timestamps"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json, json!([{"epochNano": 1000, "spanCount": 1}]));
    }

    #[tokio::test]
    async fn test_malformed_selector_is_400() {
        let response = app()
            .oneshot(get_request("/v2/code/structure/tok/abc-"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_landscape_structure_is_404() {
        let response = app()
            .oneshot(get_request("/v2/code/structure/nobody"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
