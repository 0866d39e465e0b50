use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        paymentdtos::{ConfirmPaymentDto, ManualPaymentDto, PaymentQueryDto, RejectDto},
        validation_message, ApiResponse,
    },
    error::HttpError,
    middleware::{admin_roles, role_check, JWTAuthMiddeware},
    AppState,
};

pub fn payments_handler() -> Router {
    Router::new()
        .route("/", get(list_payments).post(record_manual_payment))
        .route(
            "/:id/confirm",
            post(confirm_payment).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route(
            "/:id/reject",
            post(reject_payment).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
}

pub async fn list_payments(
    Query(query_params): Query<PaymentQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let payments = app_state
        .settlement_service
        .list_payments(&user.user, query_params.job_id, query_params.status)
        .await?;

    Ok(Json(ApiResponse::success("Payments retrieved", payments)))
}

pub async fn record_manual_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<ManualPaymentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let payment = app_state
        .settlement_service
        .record_manual_payment(&user.user, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Payment recorded and awaiting confirmation", payment)),
    ))
}

pub async fn confirm_payment(
    Path(payment_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    body: Option<Json<ConfirmPaymentDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let payment = app_state
        .settlement_service
        .confirm_payment(true, payment_id, body.mpesa_code.as_deref())
        .await?;

    Ok(Json(ApiResponse::success("Payment confirmed", payment)))
}

pub async fn reject_payment(
    Path(payment_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RejectDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let payment = app_state
        .settlement_service
        .reject_payment(payment_id, &body.reason)
        .await?;

    Ok(Json(ApiResponse::success("Payment rejected", payment)))
}
