//! `axum` router wiring the HTTP endpoints onto the service layer.

mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

use crate::middleware::require_bearer_token;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/mcp", get(routes::protected_resource_probe))
        .route_layer(from_fn_with_state(state.clone(), require_bearer_token));

    Router::new()
        .route("/oauth/authorize", get(routes::authorize_get).post(routes::authorize_post))
        .route("/oauth/callback", get(routes::callback))
        .route("/oauth/token", post(routes::token))
        .route("/oauth/register", post(routes::register))
        .route(
            "/.well-known/oauth-authorization-server",
            get(routes::authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(routes::protected_resource_metadata),
        )
        .merge(protected)
        .with_state(state)
}
