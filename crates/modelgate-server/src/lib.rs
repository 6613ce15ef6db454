//! The HTTP surface (spec §6): route table, bearer-token auth, CORS, the
//! embedded admin UI, and graceful drain, assembled around the shared
//! [`AppState`] every handler closes over.
//!
//! Grounded on `control::startup::run`'s `ServiceBuilder` layering,
//! adapted from axum 0.4's `Server`/`AddExtensionLayer` to 0.7's
//! `axum::serve`/`State` extractor.

mod admin;
mod auth;
mod cors;
mod error;
mod native;
pub mod ports;
mod routes;
pub mod shutdown;
mod state;

pub use error::AppError;
pub use state::{AppState, DiscoveryReport};

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the full route table with tracing, CORS, and (if an API key is
/// configured) bearer-token auth layered over it, outermost-first.
///
/// The bearer-token layer is applied to `routes::protected_router` only,
/// then merged with `routes::public_router` — never the reverse — so that
/// `/` and `/health` stay reachable without a token even when an API key
/// is configured (spec §6: `/health` is "always 200 if process alive").
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let mut protected = routes::protected_router(state.clone());
    if state.api_key().is_some() {
        protected = protected.layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer_token));
    }

    let app = routes::public_router(state).merge(protected);

    app.layer(TraceLayer::new_for_http())
        .layer(cors::cors_layer(cors_origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DiscoveryReport;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use modelgate_coordinator::Coordinator;
    use modelgate_events::Bus;
    use modelgate_process::SupervisorConfig;
    use modelgate_proxy::{DefaultModelPolicy, Forwarder};
    use modelgate_types::{Catalog, CatalogVersion};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn empty_state(api_key: Option<&str>) -> AppState {
        let catalog = Catalog::new(CatalogVersion::default(), Default::default(), Default::default());
        let bus = Bus::new(16);
        let coordinator = Arc::new(Coordinator::new(catalog, bus.clone(), SupervisorConfig::default()));
        let forwarder = Arc::new(Forwarder::new(coordinator.clone(), DefaultModelPolicy::Error));
        AppState::new(
            coordinator,
            forwarder,
            bus,
            DiscoveryReport {
                models: Arc::new(Default::default()),
            },
            api_key.map(str::to_string),
            true,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn health_never_requires_auth() {
        let app = router(empty_state(Some("secret")), &[]);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_a_token_is_unauthorized() {
        let app = router(empty_state(Some("secret")), &[]);
        let response = app
            .oneshot(Request::builder().uri("/running").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_with_the_right_token_succeeds() {
        let app = router(empty_state(Some("secret")), &[]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/running")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_configured_api_key_disables_auth_entirely() {
        let app = router(empty_state(None), &[]);
        let response = app
            .oneshot(Request::builder().uri("/running").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
