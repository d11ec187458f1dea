//! Admin API.
//!
//! Bearer-key protected endpoints under `/admin`, mounted on the main
//! listener when `admin.enabled` is set. The liveness endpoint is how an
//! external health checker marks backends dead or alive. Methods the admin
//! API does not serve on these paths fall through to the balancer.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::{proxy_handler, AppState};

pub fn setup_admin_router(state: AppState) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), admin_auth_middleware);

    Router::new()
        .route(
            "/admin/status",
            get(get_status).route_layer(auth.clone()).fallback(proxy_handler),
        )
        .route(
            "/admin/backends",
            get(get_backends).route_layer(auth.clone()).fallback(proxy_handler),
        )
        .route(
            "/admin/backends/{index}/liveness",
            put(set_liveness).route_layer(auth).fallback(proxy_handler),
        )
        .with_state(state)
}
