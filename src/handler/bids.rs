use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        biddtos::{BidQueryDto, CreateBidDto},
        jobdtos::FilterJobDto,
        validation_message, ApiResponse,
    },
    error::HttpError,
    middleware::{admin_roles, role_check, JWTAuthMiddeware},
    models::{bidmodel::Bid, usermodel::UserRole},
    AppState,
};

pub fn bids_handler() -> Router {
    Router::new()
        .route(
            "/",
            get(list_bids).post(place_bid).layer(middleware::from_fn(|state, req, next| {
                let mut roles = admin_roles();
                roles.push(UserRole::Freelancer);
                role_check(state, req, next, roles)
            })),
        )
        .route(
            "/:id/accept",
            post(accept_bid).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
}

#[derive(Debug, Serialize)]
pub struct AcceptedBidData {
    pub job: FilterJobDto,
    pub bid: Bid,
}

pub async fn place_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let bid = app_state.bid_service.place_bid(&user.user, body).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success("Bid placed", bid))))
}

pub async fn list_bids(
    Query(query_params): Query<BidQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state
        .bid_service
        .list_bids(&user.user, query_params.job_id)
        .await?;

    Ok(Json(ApiResponse::success("Bids retrieved", bids)))
}

pub async fn accept_bid(
    Path(bid_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let (job, bid) = app_state.bid_service.accept_bid(&user.user, bid_id).await?;

    Ok(Json(ApiResponse::success(
        "Bid accepted and job assigned",
        AcceptedBidData {
            job: FilterJobDto::filter_job(&job, user.user.role()),
            bid,
        },
    )))
}
