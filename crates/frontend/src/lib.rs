//! axum HTTP adaptor — the only component that talks to a human or
//! external caller. Never talks to the worker directly; every endpoint
//! reads or writes a broker target or the result cache.
mod errors;
mod handlers;
mod state;

use axum::{
    routing::{
        delete,
        get,
    },
    Router,
};
use tower::{
    limit::ConcurrencyLimitLayer,
    ServiceBuilder,
};
use tower_http::cors::{
    AllowOrigin,
    CorsLayer,
};

pub use state::AppState;

/// Bounds concurrently in-flight HTTP requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 128;

/// Top-level router: CORS reflecting the caller's origin, a global
/// concurrency limit, and one route per HTTP surface entry.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cohorts/{cohort}/{metric}", get(handlers::get_cohort_metric))
        .route("/all_requests", get(handlers::all_requests))
        .route("/job_queue", get(handlers::job_queue))
        .route("/job_queue/{fingerprint}", delete(handlers::cancel_job))
        .route("/healthz", get(handlers::healthz))
        .layer(
            ServiceBuilder::new()
                .layer(cors())
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS)),
        )
        .with_state(state)
}

fn cors() -> CorsLayer {
    // Mirrors `local_backend::router::cors`: reflect the caller's origin
    // rather than `Any`, which tower_http refuses to combine with
    // credentialed requests.
    CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::DELETE])
        .allow_origin(AllowOrigin::predicate(|_origin, _parts| true))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{
            Request as HttpRequest,
            StatusCode,
        },
    };
    use broker::{
        Broker,
        BrokerTarget,
        FileBroker,
    };
    use cache::ResultCache;
    use cohort::CohortResolver;
    use controller::Controller;
    use indexmap::IndexSet;
    use metric_registry::{
        AggregatorRegistry,
        InMemoryDataSource,
        MetricRegistry,
    };
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;

    struct EmptyResolver;

    #[async_trait::async_trait]
    impl CohortResolver for EmptyResolver {
        async fn resolve_name(&self, _name: &str) -> anyhow::Result<Option<u64>> {
            Ok(None)
        }

        async fn members(&self, _cohort: u64) -> anyhow::Result<IndexSet<u64>> {
            Ok(IndexSet::new())
        }
    }

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempdir().unwrap();
        let broker: Arc<dyn Broker> = Arc::new(FileBroker::open(dir.path()).unwrap());
        let cache = Arc::new(ResultCache::new(broker.clone()));
        let controller = Arc::new(Controller::new(
            broker.clone(),
            Arc::new(EmptyResolver),
            Arc::new(InMemoryDataSource::default()),
            Arc::new(MetricRegistry::builtin()),
            Arc::new(AggregatorRegistry::builtin()),
        ));
        (dir, AppState { broker, cache, controller })
    }

    #[tokio::test]
    async fn new_request_is_accepted_and_queued() {
        let (_dir, state) = test_state();
        let broker = state.broker.clone();
        let app = router(state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/cohorts/1/edit_count?cohort_refresh_timestamp=2013-01-01T00:00:00Z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "accepted");

        let keys = broker.get_keys(BrokerTarget::Request).await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn already_queued_request_is_reported_without_duplicate_enqueue() {
        let (_dir, state) = test_state();
        let broker = state.broker.clone();
        let app = router(state);
        let uri = "/cohorts/1/edit_count?cohort_refresh_timestamp=2013-01-01T00:00:00Z";

        let first = app
            .clone()
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(broker.get_keys(BrokerTarget::Request).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cached_hit_returns_payload_without_touching_broker() {
        let (_dir, state) = test_state();
        let cache = state.cache.clone();
        let broker = state.broker.clone();
        let params = indexmap::IndexMap::from([
            ("cohort_expression".to_string(), "1".to_string()),
            (
                "cohort_refresh_timestamp".to_string(),
                "2013-01-01T00:00:00Z".to_string(),
            ),
            ("metric".to_string(), "edit_count".to_string()),
        ]);
        let request = request::Request::from_http(&params).unwrap();
        cache.set(&request, serde_json::json!({"13234584": 18})).await.unwrap();

        let app = router(state);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/cohorts/1/edit_count?cohort_refresh_timestamp=2013-01-01T00:00:00Z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"13234584": 18}));
        assert!(broker.get_keys(BrokerTarget::Request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (_dir, state) = test_state();
        let app = router(state);
        let response = app
            .oneshot(HttpRequest::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
