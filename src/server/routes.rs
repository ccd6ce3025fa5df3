//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{http::HeaderName, middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{currency, health};
use crate::middleware::{log_request, REQUEST_ID_HEADER, TRACE_ID_HEADER};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/liveness", get(health::liveness));

    let currency_routes = Router::new()
        .route("/convert", get(currency::convert))
        .route("/exchangeRate", get(currency::exchange_rate));

    Router::new()
        .nest("/currency", currency_routes)
        .merge(health_routes)
        .layer(create_cors_layer())
        // Custom request logging with trace IDs
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Create CORS layer with permissive settings
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(TRACE_ID_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{InMemoryItemStore, ItemStore};
    use crate::services::StaticRateProvider;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(store: Arc<InMemoryItemStore>) -> Router {
        let store: Arc<dyn ItemStore> = store;
        let state = AppState::with_components(
            Arc::new(Settings::default()),
            store.clone(),
            store,
            Arc::new(StaticRateProvider::with_sample_rates()),
        );
        create_router(state)
    }

    async fn status(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_probes() {
        let store = Arc::new(InMemoryItemStore::new());

        assert_eq!(status(router(store.clone()), "/health").await, StatusCode::OK);
        assert_eq!(status(router(store.clone()), "/liveness").await, StatusCode::OK);
        assert_eq!(status(router(store.clone()), "/ready").await, StatusCode::OK);

        store.set_fail_reads(true);
        assert_eq!(status(router(store), "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let store = Arc::new(InMemoryItemStore::new());
        assert_eq!(status(router(store), "/v1/messages").await, StatusCode::NOT_FOUND);
    }
}
