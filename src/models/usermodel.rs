use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Freelancer,
    Admin,
    AccountOwner,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::Client => "client",
            UserRole::Freelancer => "freelancer",
            UserRole::Admin => "admin",
            UserRole::AccountOwner => "account_owner",
        }
    }

    /// Account owners carry every admin privilege.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::AccountOwner)
    }

    pub fn code_prefix(&self) -> &'static str {
        match self {
            UserRole::Client => "CL",
            UserRole::Freelancer => "FL",
            UserRole::Admin => "AD",
            UserRole::AccountOwner => "AO",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Blacklisted,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "freelancer_badge", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FreelancerBadge {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Elite,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "client_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClientTier {
    Basic,
    Silver,
    Gold,
    Platinum,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "client_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClientPriority {
    Regular,
    Priority,
    Vip,
}

/// Flat row as stored in `users`; role-specific columns are nullable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub display_id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: UserRole,
    pub approved: bool,
    pub status: UserStatus,
    pub balance_cents: i64,
    pub rating: f64,
    pub completed_jobs: i32,
    pub profile_picture_url: Option<String>,
    pub freelancer_badge: Option<FreelancerBadge>,
    pub total_earned_cents: Option<i64>,
    pub client_tier: Option<ClientTier>,
    pub client_priority: Option<ClientPriority>,
    pub total_spent_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role-specific part of a user, tagged by role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleProfile {
    Client {
        client_tier: ClientTier,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_priority: Option<ClientPriority>,
        total_spent_cents: i64,
    },
    Freelancer {
        freelancer_badge: FreelancerBadge,
        total_earned_cents: i64,
    },
    Admin,
    AccountOwner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password: String,
    pub approved: bool,
    pub status: UserStatus,
    pub balance_cents: i64,
    pub rating: f64,
    pub completed_jobs: i32,
    pub profile_picture_url: Option<String>,
    #[serde(flatten)]
    pub profile: RoleProfile,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        match self.profile {
            RoleProfile::Client { .. } => UserRole::Client,
            RoleProfile::Freelancer { .. } => UserRole::Freelancer,
            RoleProfile::Admin => UserRole::Admin,
            RoleProfile::AccountOwner => UserRole::AccountOwner,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role().is_admin()
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Copy of the user safe to show to a non-admin viewer.
    pub fn without_internal_fields(&self) -> User {
        let mut user = self.clone();
        if let RoleProfile::Client { client_priority, .. } = &mut user.profile {
            *client_priority = None;
        }
        user
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let profile = match row.role {
            UserRole::Client => RoleProfile::Client {
                client_tier: row.client_tier.unwrap_or(ClientTier::Basic),
                client_priority: Some(row.client_priority.unwrap_or(ClientPriority::Regular)),
                total_spent_cents: row.total_spent_cents.unwrap_or(0),
            },
            UserRole::Freelancer => RoleProfile::Freelancer {
                freelancer_badge: row.freelancer_badge.unwrap_or(FreelancerBadge::Bronze),
                total_earned_cents: row.total_earned_cents.unwrap_or(0),
            },
            UserRole::Admin => RoleProfile::Admin,
            UserRole::AccountOwner => RoleProfile::AccountOwner,
        };

        User {
            id: row.id,
            display_id: row.display_id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            password: row.password,
            approved: row.approved,
            status: row.status,
            balance_cents: row.balance_cents,
            rating: row.rating,
            completed_jobs: row.completed_jobs,
            profile_picture_url: row.profile_picture_url,
            profile,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: UserRole) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            display_id: "CL-ABC123".to_string(),
            email: "a@b.co".to_string(),
            name: "A".to_string(),
            phone: None,
            password: "hash".to_string(),
            role,
            approved: true,
            status: UserStatus::Active,
            balance_cents: 0,
            rating: 0.0,
            completed_jobs: 0,
            profile_picture_url: None,
            freelancer_badge: None,
            total_earned_cents: None,
            client_tier: Some(ClientTier::Gold),
            client_priority: Some(ClientPriority::Vip),
            total_spent_cents: Some(5_000),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn client_row_becomes_client_variant() {
        let user = User::from(row(UserRole::Client));
        assert_eq!(user.role(), UserRole::Client);
        assert_eq!(
            user.profile,
            RoleProfile::Client {
                client_tier: ClientTier::Gold,
                client_priority: Some(ClientPriority::Vip),
                total_spent_cents: 5_000,
            }
        );
    }

    #[test]
    fn freelancer_defaults_to_bronze() {
        let user = User::from(row(UserRole::Freelancer));
        assert!(matches!(
            user.profile,
            RoleProfile::Freelancer { freelancer_badge: FreelancerBadge::Bronze, .. }
        ));
    }

    #[test]
    fn priority_and_password_never_leak_to_non_admins() {
        let user = User::from(row(UserRole::Client)).without_internal_fields();
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "client");
        assert!(json.get("client_priority").is_none());
        assert!(json.get("password").is_none());
    }

    #[test]
    fn account_owner_is_admin() {
        assert!(UserRole::AccountOwner.is_admin());
        assert!(!UserRole::Freelancer.is_admin());
    }
}
