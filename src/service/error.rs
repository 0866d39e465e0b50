use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::HttpError,
    models::jobmodel::JobStatus,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Bid {0} not found")]
    BidNotFound(Uuid),

    #[error("Payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("Payment request {0} not found")]
    PaymentRequestNotFound(Uuid),

    #[error("Message {0} not found")]
    MessageNotFound(Uuid),

    #[error("Attachment {0} not found")]
    AttachmentNotFound(Uuid),

    #[error("No payment for CheckoutRequestID {0}")]
    PushNotFound(String),

    #[error("Job {0} cannot {1} while {2:?}")]
    InvalidJobStatus(Uuid, &'static str, JobStatus),

    #[error("User {0} is not authorized to perform this action on job {1}")]
    UnauthorizedJobAccess(Uuid, Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<String> for ServiceError {
    fn from(err: String) -> Self {
        ServiceError::Other(err)
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::UserNotFound(_)
            | ServiceError::JobNotFound(_)
            | ServiceError::BidNotFound(_)
            | ServiceError::PaymentNotFound(_)
            | ServiceError::PaymentRequestNotFound(_)
            | ServiceError::MessageNotFound(_)
            | ServiceError::AttachmentNotFound(_)
            | ServiceError::PushNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::InvalidJobStatus(_, _, _) | ServiceError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }

            ServiceError::UnauthorizedJobAccess(_, _) | ServiceError::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }

            ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::Gateway(_) => StatusCode::BAD_GATEWAY,

            ServiceError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,

            ServiceError::Database(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation() =>
            {
                StatusCode::CONFLICT
            }

            ServiceError::Database(_) | ServiceError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!("{}", error);
            // Internal details stay in the logs.
            if matches!(error, ServiceError::Database(_)) {
                return HttpError::server_error("Database error. Please try again later");
            }
        }
        HttpError::new(error.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_map_to_404() {
        let err: HttpError = ServiceError::JobNotFound(Uuid::nil()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn unknown_checkout_id_is_not_found() {
        let err: HttpError = ServiceError::PushNotFound("ws_CO_404".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("ws_CO_404"));
    }

    #[test]
    fn invalid_status_is_a_bad_request() {
        let err = ServiceError::InvalidJobStatus(Uuid::nil(), "deliver", JobStatus::Pending);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("deliver"));
    }

    #[test]
    fn conflicts_and_forbidden_actors() {
        assert_eq!(ServiceError::Conflict("stale".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::UnauthorizedJobAccess(Uuid::nil(), Uuid::nil()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn database_errors_hide_details() {
        let err: HttpError = ServiceError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("pool"));
    }

    #[test]
    fn gateway_failures_are_bad_gateway() {
        assert_eq!(ServiceError::Gateway("timeout".into()).status_code(), StatusCode::BAD_GATEWAY);
    }
}
