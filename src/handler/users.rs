use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{
        statsdb::StatsExt,
        userdb::{UserExt, UserFilter},
    },
    dtos::{
        userdtos::{
            BadgeUpdateDto, CreateUserDto, FilterUserDto, PriorityUpdateDto, ProfilePictureDto,
            TierUpdateDto, UserListQueryDto,
        },
        validation_message, ApiResponse,
    },
    error::{ErrorMessage, HttpError},
    middleware::{admin_roles, role_check, JWTAuthMiddeware},
    models::usermodel::{User, UserRole, UserStatus},
    utils::{password, phone::normalize_msisdn},
    AppState,
};

pub fn users_handler() -> Router {
    Router::new()
        .route(
            "/",
            get(get_users).post(create_user).layer(middleware::from_fn(|state, req, next| {
                role_check(state, req, next, admin_roles())
            })),
        )
        .route("/me", get(get_me))
        .route("/:id/summary", get(get_user_summary))
        .route("/:id/profile-picture", put(update_profile_picture))
        .merge(admin_user_routes())
}

fn admin_user_routes() -> Router {
    Router::new()
        .route("/:id/approve", post(approve_user))
        .route("/:id/reject", post(reject_user))
        .route("/:id/suspend", post(suspend_user))
        .route("/:id/unsuspend", post(unsuspend_user))
        .route("/:id/blacklist", post(blacklist_user))
        .route("/:id/remove", post(remove_user))
        .route("/:id/badge", put(update_badge))
        .route("/:id/tier", put(update_tier))
        .route("/:id/priority", put(update_priority))
        .layer(middleware::from_fn(|state, req, next| {
            role_check(state, req, next, admin_roles())
        }))
}

fn user_response(message: &str, user: &User) -> Json<ApiResponse<FilterUserDto>> {
    Json(ApiResponse::success(message, FilterUserDto::filter_user(user, true)))
}

pub async fn get_me(
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let filtered_user = FilterUserDto::filter_user(&user.user, user.user.is_admin());
    Ok(Json(ApiResponse::success("User retrieved", filtered_user)))
}

pub async fn get_users(
    Query(query_params): Query<UserListQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let filter = UserFilter {
        role: query_params.role,
        approved: query_params.approved,
        status: query_params.status,
    };
    let page = query_params.page.unwrap_or(1);
    let limit = query_params.limit.unwrap_or(20);

    let users = app_state
        .db_client
        .get_users(&filter, page, limit)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        "Users retrieved",
        FilterUserDto::filter_users(&users, true),
    )))
}

pub async fn create_user(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    if body.role == UserRole::AccountOwner && admin.user.role() != UserRole::AccountOwner {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    let phone = body
        .phone
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(normalize_msisdn)
        .transpose()
        .map_err(HttpError::bad_request)?;

    let hashed_password =
        password::hash(&body.password).map_err(|e| HttpError::server_error(e.to_string()))?;

    let user = app_state
        .db_client
        .save_user(
            body.name.trim().to_string(),
            body.email.trim().to_lowercase(),
            phone,
            hashed_password,
            body.role,
            true,
        )
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                HttpError::unique_constraint_violation(ErrorMessage::EmailExist.to_string())
            }
            e => HttpError::server_error(e.to_string()),
        })?;

    tracing::info!("Admin {} created {} {}", admin.user.id, user.role().to_str(), user.display_id);

    Ok((StatusCode::CREATED, user_response("User created", &user)))
}

pub async fn approve_user(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .approve_user(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(user_response("User approved", &user))
}

/// Rejecting a registration deletes it; approved accounts are suspended or
/// removed instead.
pub async fn reject_user(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let deleted = app_state
        .db_client
        .delete_pending_user(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !deleted {
        let exists = app_state
            .db_client
            .get_user(Some(user_id), None)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?
            .is_some();

        return Err(if exists {
            HttpError::conflict("User is already approved")
        } else {
            HttpError::not_found("User not found")
        });
    }

    Ok(Json(ApiResponse::success("Registration rejected", user_id)))
}

async fn load_target(app_state: &AppState, user_id: Uuid) -> Result<User, HttpError> {
    app_state
        .db_client
        .get_user(Some(user_id), None)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))
}

/// Admins never act on themselves or on the account owner.
fn ensure_manageable(admin: &User, target: &User, own_action: &str) -> Result<(), HttpError> {
    if admin.id == target.id {
        return Err(HttpError::bad_request(format!("You cannot {}", own_action)));
    }
    if target.role() == UserRole::AccountOwner {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }
    Ok(())
}

async fn set_status(
    app_state: &AppState,
    admin: &User,
    user_id: Uuid,
    status: UserStatus,
) -> Result<User, HttpError> {
    let target = load_target(app_state, user_id).await?;
    ensure_manageable(admin, &target, "change your own status")?;

    let user = app_state
        .db_client
        .update_user_status(user_id, status)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    tracing::info!("Admin {} set user {} to {:?}", admin.id, user.display_id, status);
    Ok(user)
}

pub async fn suspend_user(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let user = set_status(&app_state, &admin.user, user_id, UserStatus::Suspended).await?;
    Ok(user_response("User suspended", &user))
}

pub async fn unsuspend_user(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let user = set_status(&app_state, &admin.user, user_id, UserStatus::Active).await?;
    Ok(user_response("User reactivated", &user))
}

pub async fn blacklist_user(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let user = set_status(&app_state, &admin.user, user_id, UserStatus::Blacklisted).await?;
    Ok(user_response("User blacklisted", &user))
}

pub async fn remove_user(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let target = load_target(&app_state, user_id).await?;
    ensure_manageable(&admin.user, &target, "remove your own account")?;

    let open_jobs = app_state
        .db_client
        .count_open_jobs_for_user(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if open_jobs > 0 {
        return Err(HttpError::conflict(format!(
            "User still has {} open jobs",
            open_jobs
        )));
    }

    let deleted = app_state
        .db_client
        .delete_user(user_id)
        .await
        .map_err(|e| match e {
            // Jobs, bids and payments keep their users.
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                HttpError::conflict("User has job history; blacklist the account instead")
            }
            e => HttpError::server_error(e.to_string()),
        })?;

    if !deleted {
        return Err(HttpError::not_found("User not found"));
    }

    Ok(Json(ApiResponse::success("User removed", user_id)))
}

pub async fn update_badge(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<BadgeUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .set_freelancer_badge(user_id, body.badge)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Freelancer not found"))?;

    Ok(user_response("Badge updated", &user))
}

pub async fn update_tier(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<TierUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .set_client_tier(user_id, body.tier)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Client not found"))?;

    Ok(user_response("Tier updated", &user))
}

pub async fn update_priority(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<PriorityUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .set_client_priority(user_id, body.priority)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Client not found"))?;

    Ok(user_response("Priority updated", &user))
}

pub async fn update_profile_picture(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(viewer): Extension<JWTAuthMiddeware>,
    Json(body): Json<ProfilePictureDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    if viewer.user.id != user_id && !viewer.user.is_admin() {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    let user = app_state
        .db_client
        .update_profile_picture(user_id, body.url.trim())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(
        "Profile picture updated",
        FilterUserDto::filter_user(&user, viewer.user.is_admin()),
    )))
}

pub async fn get_user_summary(
    Path(user_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(viewer): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    if viewer.user.id != user_id && !viewer.user.is_admin() {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    let summary = app_state
        .db_client
        .get_user_summary(user_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("User summary retrieved", summary)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usermodel::{FreelancerBadge, RoleProfile};
    use chrono::Utc;

    fn user(profile: RoleProfile) -> User {
        User {
            id: Uuid::new_v4(),
            display_id: "AD-TEST01".into(),
            email: "a@example.com".into(),
            name: "A".into(),
            phone: None,
            password: String::new(),
            approved: true,
            status: UserStatus::Active,
            balance_cents: 0,
            rating: 0.0,
            completed_jobs: 0,
            profile_picture_url: None,
            profile,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admins_cannot_manage_themselves_or_the_owner() {
        let admin = user(RoleProfile::Admin);
        let err = ensure_manageable(&admin, &admin, "remove your own account").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let owner = user(RoleProfile::AccountOwner);
        let err = ensure_manageable(&admin, &owner, "remove your own account").unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let freelancer = user(RoleProfile::Freelancer {
            freelancer_badge: FreelancerBadge::Bronze,
            total_earned_cents: 0,
        });
        assert!(ensure_manageable(&admin, &freelancer, "remove your own account").is_ok());
    }
}
