use crate::state::AppState;
use axum::{middleware, Router};

pub mod claims;
pub mod dto;
pub mod errors;
pub mod extract;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod validation;

/// Signup and login are public; everything in `protected_routes` passes the guard first.
pub fn router(state: AppState) -> Router<AppState> {
    let protected = handlers::protected_routes()
        .route_layer(middleware::from_fn_with_state(state, guard::require_auth));

    Router::new()
        .merge(handlers::auth_routes())
        .merge(protected)
}
