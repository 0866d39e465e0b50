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
        paymentdtos::{CreatePaymentRequestDto, PaymentRequestQueryDto, RejectDto},
        validation_message, ApiResponse,
    },
    error::HttpError,
    middleware::{admin_roles, role_check, JWTAuthMiddeware},
    AppState,
};

pub fn payment_requests_handler() -> Router {
    Router::new()
        .route("/", get(list_payment_requests).post(create_payment_request))
        .route(
            "/:id/confirm",
            post(confirm_payment_request).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route(
            "/:id/reject",
            post(reject_payment_request).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
}

pub async fn create_payment_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreatePaymentRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let request = app_state
        .settlement_service
        .create_payment_request(&user.user, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Payment request submitted", request)),
    ))
}

pub async fn list_payment_requests(
    Query(query_params): Query<PaymentRequestQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let requests = app_state
        .settlement_service
        .list_payment_requests(&user.user, query_params.status)
        .await?;

    Ok(Json(ApiResponse::success("Payment requests retrieved", requests)))
}

pub async fn confirm_payment_request(
    Path(request_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state
        .settlement_service
        .confirm_payment_request(request_id)
        .await?;

    Ok(Json(ApiResponse::success("Payment request confirmed", request)))
}

pub async fn reject_payment_request(
    Path(request_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RejectDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let request = app_state
        .settlement_service
        .reject_payment_request(request_id, &body.reason)
        .await?;

    Ok(Json(ApiResponse::success("Payment request rejected", request)))
}
