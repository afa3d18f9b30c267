use crate::state;

use axum::Router;
use axum::routing::{get, post};

mod push;

pub fn app(state: state::AppState) -> Router {
    Router::new()
        .route("/api/push/public-key", get(push::push_public_key))
        .route(
            "/api/push/subscriptions",
            post(push::push_subscribe).delete(push::push_unsubscribe),
        )
        .route("/api/push/dispatch", post(push::push_dispatch))
        .route("/health", get(health))
        .with_state(state)
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
