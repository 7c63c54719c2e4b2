//! REST surface for the signet contract workflow.
//!
//! Transport glue only: multipart and JSON payloads are decoded here, every
//! decision belongs to [`signet_lifecycle::LifecycleController`]. Routes
//! live under `/api/v1`.

#![deny(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the service router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/contracts", post(handlers::create_contract))
        .route("/contracts", get(handlers::list_contracts))
        .route("/contracts/:id", get(handlers::get_contract))
        .route("/contracts/:id/document", get(handlers::get_document))
        .route("/contracts/:id/fields", put(handlers::save_field_layout))
        .route(
            "/contracts/:id/company-input",
            post(handlers::submit_company_input),
        )
        .route(
            "/contracts/:id/signatures",
            post(handlers::submit_signatures),
        )
        .route("/contracts/:id/action", post(handlers::contract_action));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
