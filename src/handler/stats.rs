use std::sync::Arc;

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

use crate::{
    db::{
        statsdb::{PlatformStats, ServiceRevenue, StatsExt, StatusCount, UserSummary},
        userdb::UserExt,
    },
    dtos::ApiResponse,
    error::HttpError,
    middleware::{admin_roles, role_check, JWTAuthMiddeware},
    service::pricing,
    AppState,
};

pub fn stats_handler() -> Router {
    Router::new().route("/", get(get_stats))
}

pub fn admin_handler() -> Router {
    Router::new()
        .route("/analytics", get(get_analytics))
        .route("/ratings/recalculate", post(recalculate_ratings))
        .layer(middleware::from_fn(|state, req, next| {
            role_check(state, req, next, admin_roles())
        }))
}

/// Admins get platform counters; everyone else their own job summary.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StatsView {
    Platform(PlatformStats),
    Own(UserSummary),
}

#[derive(Debug, Serialize)]
pub struct Analytics {
    pub stats: PlatformStats,
    pub status_breakdown: Vec<StatusCount>,
    pub revenue_by_service: Vec<ServiceRevenue>,
    pub confirmed_revenue_cents: i64,
    pub freelancer_payouts_cents: i64,
    pub platform_revenue_cents: i64,
}

pub async fn get_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let view = if user.user.is_admin() {
        StatsView::Platform(
            app_state
                .db_client
                .get_platform_stats()
                .await
                .map_err(|e| HttpError::server_error(e.to_string()))?,
        )
    } else {
        StatsView::Own(
            app_state
                .db_client
                .get_user_summary(user.user.id)
                .await
                .map_err(|e| HttpError::server_error(e.to_string()))?,
        )
    };

    Ok(Json(ApiResponse::success("Stats retrieved", view)))
}

pub async fn get_analytics(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let db = &app_state.db_client;

    let stats = db
        .get_platform_stats()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    let status_breakdown = db
        .get_status_breakdown()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    let revenue_by_service = db
        .get_service_revenue()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;
    let confirmed_revenue_cents = db
        .get_confirmed_revenue_cents()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let freelancer_payouts_cents = pricing::payout_share_cents(confirmed_revenue_cents);

    Ok(Json(ApiResponse::success(
        "Analytics retrieved",
        Analytics {
            stats,
            status_breakdown,
            revenue_by_service,
            confirmed_revenue_cents,
            freelancer_payouts_cents,
            platform_revenue_cents: pricing::platform_share_cents(confirmed_revenue_cents),
        },
    )))
}

pub async fn recalculate_ratings(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .db_client
        .recalculate_ratings()
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    tracing::info!("Admin {} recalculated ratings for {} freelancers", admin.user.id, updated);

    Ok(Json(ApiResponse::success("Ratings recalculated", updated)))
}
