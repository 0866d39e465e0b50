use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    dtos::{
        paymentdtos::{StkPushDto, StkQueryDto},
        validation_message, ApiResponse,
    },
    error::HttpError,
    handler::idempotency_key,
    middleware::{role_check, JWTAuthMiddeware},
    models::{paymentmodel::Payment, usermodel::UserRole},
    service::mpesa::PushStatus,
    AppState,
};

/// Push payment routes that need a logged-in client.
pub fn mpesa_handler() -> Router {
    Router::new()
        .route(
            "/stkpush",
            post(initiate_stk_push).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Client])
            })),
        )
        .route("/query", post(query_stk_push))
}

/// Daraja posts results here without credentials.
pub fn mpesa_callback_handler() -> Router {
    Router::new().route("/callback", post(stk_callback))
}

#[derive(Debug, Serialize)]
pub struct PushQueryData {
    pub result: PushStatus,
    pub payment: Payment,
}

pub async fn initiate_stk_push(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    headers: HeaderMap,
    Json(body): Json<StkPushDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let payment = app_state
        .settlement_service
        .initiate_stk_push(&user.user, body, idempotency_key(&headers))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(
            "Payment prompt sent. Enter your M-Pesa PIN to complete payment",
            payment,
        )),
    ))
}

pub async fn query_stk_push(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<StkQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let (result, payment) = app_state
        .settlement_service
        .query_push_status(&user.user, body.checkout_request_id.trim())
        .await?;

    Ok(Json(ApiResponse::success(
        "Payment status retrieved",
        PushQueryData { result, payment },
    )))
}

pub async fn stk_callback(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    tracing::debug!("M-Pesa callback received");
    app_state.settlement_service.handle_callback(&body).await;

    Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}
