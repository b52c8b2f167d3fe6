pub mod auth;
pub mod responses;
pub mod session;
pub mod surveys;
pub mod templates;

use crate::state::SharedState;
use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest(
            "/surveys",
            surveys::router(state.clone()).merge(responses::router(state.clone())),
        )
        .nest("/templates", templates::router(state))
}

pub fn app(state: SharedState) -> Router {
    routes(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
