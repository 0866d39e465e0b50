use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        auth::auth_handler,
        bids::bids_handler,
        events::events_handler,
        jobs::jobs_handler,
        mpesa::{mpesa_callback_handler, mpesa_handler},
        payment_requests::payment_requests_handler,
        payments::payments_handler,
        stats::{admin_handler, stats_handler},
        users::users_handler,
    },
    middleware::auth,
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The Daraja callback carries no credentials.
    let mpesa_routes = Router::new()
        .merge(mpesa_handler().layer(middleware::from_fn(auth)))
        .merge(mpesa_callback_handler());

    let api_route = Router::new()
        .nest("/auth", auth_handler())
        .nest("/users", users_handler().layer(middleware::from_fn(auth)))
        .nest("/jobs", jobs_handler().layer(middleware::from_fn(auth)))
        .nest("/bids", bids_handler().layer(middleware::from_fn(auth)))
        .nest("/payments", payments_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/payment-requests",
            payment_requests_handler().layer(middleware::from_fn(auth)),
        )
        .nest("/mpesa", mpesa_routes)
        .nest("/stats", stats_handler().layer(middleware::from_fn(auth)))
        .nest("/admin", admin_handler().layer(middleware::from_fn(auth)))
        .nest("/events", events_handler().layer(middleware::from_fn(auth)))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
