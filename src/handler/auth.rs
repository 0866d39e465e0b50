use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use axum_extra::extract::cookie::Cookie;
use validator::Validate;

use crate::{
    db::userdb::UserExt,
    dtos::{
        userdtos::{FilterUserDto, LoginUserDto, RegisterUserDto, Response, UserLoginResponseDto},
        validation_message, ApiResponse,
    },
    error::{ErrorMessage, HttpError},
    models::usermodel::UserStatus,
    utils::{password, phone::normalize_msisdn, token},
    AppState,
};

pub fn auth_handler() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

fn token_cookie(value: String, max_age: time::Duration) -> Result<header::HeaderValue, HttpError> {
    let cookie = Cookie::build(("token", value))
        .path("/")
        .max_age(max_age)
        .http_only(true)
        .build();

    cookie
        .to_string()
        .parse()
        .map_err(|_| HttpError::server_error(ErrorMessage::ServerError.to_string()))
}

pub async fn register(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let existing_user = app_state
        .db_client
        .get_user(None, Some(&body.email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if existing_user.is_some() {
        return Err(HttpError::unique_constraint_violation(
            ErrorMessage::EmailExist.to_string(),
        ));
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

    let result = app_state
        .db_client
        .save_user(
            body.name.trim().to_string(),
            body.email.trim().to_lowercase(),
            phone,
            hashed_password,
            body.role,
            false,
        )
        .await;

    match result {
        Ok(user) => {
            tracing::info!("New {} registration {} awaiting approval", user.role().to_str(), user.display_id);
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::success(
                    "Registration received. An admin will review your account",
                    FilterUserDto::filter_user(&user, false),
                )),
            ))
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            HttpError::unique_constraint_violation(ErrorMessage::EmailExist.to_string()),
        ),
        Err(e) => Err(HttpError::server_error(e.to_string())),
    }
}

pub async fn login(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let result = app_state
        .db_client
        .get_user(None, Some(&body.email))
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let user = result.ok_or(HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()))?;

    let password_matched = password::compare(&body.password, &user.password)
        .map_err(|_| HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()))?;

    if !password_matched {
        return Err(HttpError::bad_request(ErrorMessage::WrongCredentials.to_string()));
    }

    match user.status {
        UserStatus::Active => {}
        UserStatus::Suspended => {
            return Err(HttpError::forbidden(ErrorMessage::AccountSuspended.to_string()))
        }
        UserStatus::Blacklisted => {
            return Err(HttpError::forbidden(ErrorMessage::AccountBlacklisted.to_string()))
        }
    }

    let token = token::create_token(
        &user.id.to_string(),
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie = token_cookie(token.clone(), time::Duration::minutes(app_state.env.jwt_maxage))?;

    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, cookie);

    let response = Json(UserLoginResponseDto {
        status: "success".to_string(),
        token,
        user: FilterUserDto::filter_user(&user, user.is_admin()),
    });

    Ok((headers, response))
}

pub async fn logout() -> Result<impl IntoResponse, HttpError> {
    let cookie = token_cookie(String::new(), time::Duration::seconds(0))?;

    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, cookie);

    let response = Json(Response {
        status: "success",
        message: "Logged out".to_string(),
    });

    Ok((headers, response))
}
