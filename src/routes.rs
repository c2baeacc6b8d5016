use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        auth::auth_handler, bids::bids_handler, jobs::jobs_handler,
        payments::chip_payment_handler, submissions::submissions_handler, users::users_handler,
    },
    middleware::main_middleware::auth,
    AppState,
};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .nest("/auth", auth_handler())
        .nest("/users", users_handler().layer(middleware::from_fn(auth)))
        .nest("/jobs", jobs_handler().layer(middleware::from_fn(auth)))
        .nest("/bids", bids_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/submissions",
            submissions_handler().layer(middleware::from_fn(auth)),
        );

    // The payment broker keeps its own top-level prefix so the frontend
    // checkout flow is not coupled to the /api namespace.
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
        .nest(
            "/chip-payment",
            chip_payment_handler().layer(middleware::from_fn(auth)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state))
}
