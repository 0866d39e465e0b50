use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        jobdtos::{
            AssignJobDto, CreateAttachmentDto, CreateJobDto, FilterJobDto, JobListQueryDto,
            JobStatusDto, QuoteQueryDto, RateJobDto, ReasonDto, RevisionRequestDto,
            TagAttachmentDto, UpdateJobDto, VersionDto,
        },
        messagedtos::CreateMessageDto,
        validation_message, ApiResponse,
    },
    error::HttpError,
    handler::idempotency_key,
    middleware::{admin_roles, role_check, JWTAuthMiddeware},
    models::{jobmodel::Job, usermodel::UserRole},
    service::{
        job_lifecycle::{Actor, JobAction},
        pricing,
    },
    AppState,
};

pub fn jobs_handler() -> Router {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/quote", get(get_quote))
        .route("/catalog", get(get_catalog))
        .route(
            "/placement-list",
            get(placement_list).layer(middleware::from_fn(|state, req, next| {
                let mut roles = admin_roles();
                roles.push(UserRole::Freelancer);
                role_check(state, req, next, roles)
            })),
        )
        .route("/:id", get(get_job).patch(edit_job))
        .route(
            "/:id/approve",
            post(approve_job).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route(
            "/:id/reject",
            post(reject_job).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route(
            "/:id/assign",
            post(assign_job).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route("/:id/status", post(update_status))
        .route("/:id/revision", post(request_revision))
        .route(
            "/:id/rate",
            post(rate_job).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, vec![UserRole::Client])
            })),
        )
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/attachments", get(list_attachments).post(add_attachment))
        .route(
            "/:id/attachments/:attachment_id",
            patch(tag_attachment).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route("/:id/messages", get(list_messages).post(post_message))
        .route(
            "/:id/messages/:message_id/approve",
            post(approve_message).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
}

fn job_response(message: &str, job: &Job, user: &JWTAuthMiddeware) -> Json<ApiResponse<FilterJobDto>> {
    Json(ApiResponse::success(message, FilterJobDto::filter_job(job, user.user.role())))
}

pub async fn create_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    headers: HeaderMap,
    Json(body): Json<CreateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let job = app_state
        .job_service
        .create_job(&user.user, body, idempotency_key(&headers))
        .await?;

    Ok((StatusCode::CREATED, job_response("Job created", &job, &user)))
}

pub async fn list_jobs(
    Query(query_params): Query<JobListQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = query_params.page.unwrap_or(1);
    let limit = query_params.limit.unwrap_or(20);

    let jobs = app_state
        .job_service
        .list_jobs(&user.user, query_params.status, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(
        "Jobs retrieved",
        FilterJobDto::filter_jobs(&jobs, user.user.role()),
    )))
}

pub async fn get_quote(
    Query(query_params): Query<QuoteQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let quote = pricing::quote(
        query_params.work_type,
        query_params.quantity,
        query_params.deadline,
        Utc::now(),
    )?;

    Ok(Json(ApiResponse::success("Quote computed", quote)))
}

pub async fn get_catalog() -> impl IntoResponse {
    Json(ApiResponse::success("Service catalog", pricing::catalog()))
}

pub async fn placement_list(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let placements = app_state.job_service.placement_list().await?;
    let jobs: Vec<Job> = placements.into_iter().map(|p| p.job).collect();

    Ok(Json(ApiResponse::success(
        "Placement list retrieved",
        FilterJobDto::filter_jobs(&jobs, user.user.role()),
    )))
}

pub async fn get_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state.job_service.get_job_for(&user.user, job_id).await?;
    Ok(job_response("Job retrieved", &job, &user))
}

pub async fn edit_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<UpdateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let job = app_state.job_service.edit_job(&user.user, job_id, body).await?;
    Ok(job_response("Job updated", &job, &user))
}

async fn run_transition(
    app_state: &AppState,
    user: &JWTAuthMiddeware,
    job_id: Uuid,
    action: JobAction,
    version: Option<i32>,
) -> Result<Job, HttpError> {
    let job = app_state
        .job_service
        .transition(Actor::from_user(&user.user), job_id, action, version)
        .await?;
    Ok(job)
}

pub async fn approve_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    body: Option<Json<VersionDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let version = body.and_then(|Json(b)| b.version);
    let job = run_transition(&app_state, &user, job_id, JobAction::Approve, version).await?;
    Ok(job_response("Job approved", &job, &user))
}

pub async fn reject_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<ReasonDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let action = JobAction::Reject { reason: body.reason };
    let job = run_transition(&app_state, &user, job_id, action, body.version).await?;
    Ok(job_response("Job rejected", &job, &user))
}

pub async fn assign_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<AssignJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    let action = JobAction::Assign {
        freelancer_id: body.freelancer_id,
    };
    let job = run_transition(&app_state, &user, job_id, action, body.version).await?;
    Ok(job_response("Job assigned", &job, &user))
}

pub async fn update_status(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<JobStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let action = body.to_action().ok_or_else(|| {
        HttpError::bad_request(format!(
            "Status {} cannot be requested directly",
            body.status.to_str()
        ))
    })?;

    let job = run_transition(&app_state, &user, job_id, action, body.version).await?;
    Ok(job_response("Job status updated", &job, &user))
}

pub async fn request_revision(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<RevisionRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let action = JobAction::RequestRevision {
        notes: body.notes.trim().to_string(),
        turnaround_hours: body.turnaround_hours,
    };
    let job = run_transition(&app_state, &user, job_id, action, body.version).await?;
    Ok(job_response("Revision requested", &job, &user))
}

pub async fn rate_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<RateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let job = app_state
        .job_service
        .rate_job(&user.user, job_id, body.rating)
        .await?;
    Ok(job_response("Job rated", &job, &user))
}

pub async fn cancel_job(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    body: Option<Json<ReasonDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let action = JobAction::Cancel { reason: body.reason };
    let job = run_transition(&app_state, &user, job_id, action, body.version).await?;
    Ok(job_response("Job cancelled", &job, &user))
}

pub async fn list_attachments(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let attachments = app_state
        .job_service
        .list_attachments(&user.user, job_id)
        .await?;
    Ok(Json(ApiResponse::success("Attachments retrieved", attachments)))
}

pub async fn add_attachment(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateAttachmentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let attachment = app_state
        .job_service
        .add_attachment(&user.user, job_id, body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Attachment added", attachment)),
    ))
}

pub async fn tag_attachment(
    Path((job_id, attachment_id)): Path<(Uuid, Uuid)>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<TagAttachmentDto>,
) -> Result<impl IntoResponse, HttpError> {
    let attachment = app_state
        .job_service
        .tag_attachment(&user.user, job_id, attachment_id, body.upload_type)
        .await?;
    Ok(Json(ApiResponse::success("Attachment updated", attachment)))
}

pub async fn list_messages(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let messages = app_state.job_service.list_messages(&user.user, job_id).await?;
    Ok(Json(ApiResponse::success("Messages retrieved", messages)))
}

pub async fn post_message(
    Path(job_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let message = app_state
        .job_service
        .post_message(&user.user, job_id, body.kind, &body.content)
        .await?;

    let note = if message.admin_approved {
        "Message sent"
    } else {
        "Message sent for admin approval"
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(note, message))))
}

pub async fn approve_message(
    Path((job_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .job_service
        .approve_message(&user.user, job_id, message_id)
        .await?;
    Ok(Json(ApiResponse::success("Message approved", message)))
}
