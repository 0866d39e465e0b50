// dtos/userdtos.rs
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::usermodel::{
    ClientPriority, ClientTier, FreelancerBadge, User, UserRole, UserStatus,
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    pub phone: Option<String>,

    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,

    #[validate(
        length(min = 1, message = "Confirm Password is required"),
        must_match(other = "password", message = "passwords do not match")
    )]
    #[serde(rename = "passwordConfirm")]
    pub password_confirm: String,

    #[validate(custom = "validate_self_service_role")]
    pub role: UserRole,
}

fn validate_self_service_role(role: &UserRole) -> Result<(), validator::ValidationError> {
    match role {
        UserRole::Client | UserRole::Freelancer => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_role")),
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(length(min = 1, message = "Email is required"), email(message = "Email is invalid"))]
    pub email: String,
    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,
}

/// Account created by an admin; it is approved immediately.
#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserDto {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Validate, Debug)]
pub struct UserListQueryDto {
    pub role: Option<UserRole>,
    pub approved: Option<bool>,
    pub status: Option<UserStatus>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeUpdateDto {
    pub badge: FreelancerBadge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierUpdateDto {
    pub tier: ClientTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityUpdateDto {
    pub priority: ClientPriority,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePictureDto {
    #[validate(url(message = "Profile picture URL is invalid"))]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    #[serde(flatten)]
    pub user: User,
}

impl FilterUserDto {
    /// Client priority is an internal admin signal.
    pub fn filter_user(user: &User, viewer_is_admin: bool) -> Self {
        let user = if viewer_is_admin {
            user.clone()
        } else {
            user.without_internal_fields()
        };
        FilterUserDto { user }
    }

    pub fn filter_users(users: &[User], viewer_is_admin: bool) -> Vec<FilterUserDto> {
        users
            .iter()
            .map(|u| FilterUserDto::filter_user(u, viewer_is_admin))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub token: String,
    pub user: FilterUserDto,
}

#[derive(Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(role: UserRole) -> RegisterUserDto {
        RegisterUserDto {
            name: "Wanjiku".into(),
            email: "wanjiku@example.com".into(),
            phone: Some("0712345678".into()),
            password: "secret123".into(),
            password_confirm: "secret123".into(),
            role,
        }
    }

    #[test]
    fn self_registration_is_limited_to_clients_and_freelancers() {
        assert!(register(UserRole::Client).validate().is_ok());
        assert!(register(UserRole::Freelancer).validate().is_ok());
        assert!(register(UserRole::Admin).validate().is_err());
        assert!(register(UserRole::AccountOwner).validate().is_err());
    }

    #[test]
    fn passwords_must_match() {
        let mut dto = register(UserRole::Client);
        dto.password_confirm = "different".into();
        assert!(dto.validate().is_err());
    }
}
