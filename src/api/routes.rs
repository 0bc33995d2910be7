use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

use super::handlers;

pub fn identity_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(handlers::register_agent))
        .route("/agents/:agent_id", get(handlers::get_agent))
        .route("/agents/:agent_id/uri", put(handlers::set_agent_uri))
        .route(
            "/agents/:agent_id/metadata/:key",
            get(handlers::get_metadata).put(handlers::set_metadata),
        )
        .route("/agents/:agent_id/approve", post(handlers::approve))
        .route("/agents/:agent_id/transfer", post(handlers::transfer_agent))
        .route("/operators", post(handlers::set_approval_for_all))
}

pub fn reputation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feedback", post(handlers::give_feedback))
        .route("/feedback/revoke", post(handlers::revoke_feedback))
        .route("/feedback/responses", post(handlers::append_response))
        .route("/agents/:agent_id/clients", get(handlers::get_clients))
        .route(
            "/agents/:agent_id/clients/:client/last-index",
            get(handlers::get_last_index),
        )
        .route(
            "/agents/:agent_id/clients/:client/feedback/:index",
            get(handlers::read_feedback),
        )
        .route(
            "/agents/:agent_id/response-count",
            get(handlers::get_response_count),
        )
        .route("/agents/:agent_id/summary", get(handlers::get_feedback_summary))
        .route("/agents/:agent_id/feedback", get(handlers::read_all_feedback))
        .route(
            "/authorizations/:message_hash",
            get(handlers::get_authorization_uses),
        )
        .route(
            "/identity-registry",
            get(handlers::reputation_identity_registry),
        )
}

pub fn validation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(handlers::validation_request))
        .route("/responses", post(handlers::validation_response))
        .route("/requests/:request_hash", get(handlers::get_validation_status))
        .route("/agents/:agent_id/requests", get(handlers::get_agent_validations))
        .route(
            "/validators/:validator/requests",
            get(handlers::get_validator_requests),
        )
        .route("/agents/:agent_id/summary", get(handlers::get_validation_summary))
        .route(
            "/identity-registry",
            get(handlers::validation_identity_registry),
        )
}

pub fn dev_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", get(handlers::list_accounts))
        .route("/feedback-auth", post(handlers::sign_feedback_auth))
        .route("/smart-accounts", post(handlers::deploy_smart_account))
        .route("/warp", post(handlers::warp))
}

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/registries/:registry", get(handlers::registry_status))
        .route(
            "/registries/:registry/implementations",
            post(handlers::deploy_implementation),
        )
        .route("/registries/:registry/upgrade", post(handlers::upgrade))
        .route("/registries/:registry/initialize", post(handlers::initialize))
        .route(
            "/registries/:registry/transfer-ownership",
            post(handlers::transfer_ownership),
        )
        .route(
            "/registries/:registry/renounce-ownership",
            post(handlers::renounce_ownership),
        )
        .route(
            "/implementations/:address/initialize",
            post(handlers::initialize_implementation),
        )
}

/// Full application router
pub fn app(state: Arc<AppState>) -> Router {
    // Protected routes (require API key if configured)
    let protected_routes = Router::new()
        .nest("/identity", identity_routes())
        .nest("/reputation", reputation_routes())
        .nest("/validation", validation_routes())
        .nest("/dev", dev_routes())
        .route("/events", get(handlers::list_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            super::middleware::require_api_key,
        ));

    // Admin routes (require ADMIN_API_KEY)
    let admin_routes = Router::new()
        .nest("/admin", admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            super::middleware::require_admin_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
