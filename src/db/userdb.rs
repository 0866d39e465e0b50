// db/userdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{DBClient, PgTx};
use crate::{
    models::usermodel::{
        ClientPriority, ClientTier, FreelancerBadge, User, UserRole, UserRow, UserStatus,
    },
    service::reputation::{badge_for, tier_for},
    utils::display_id::generate_user_code,
};

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub approved: Option<bool>,
    pub status: Option<UserStatus>,
}

#[async_trait]
pub trait UserExt {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn get_users(
        &self,
        filter: &UserFilter,
        page: u32,
        limit: usize,
    ) -> Result<Vec<User>, sqlx::Error>;

    async fn save_user<T: Into<String> + Send>(
        &self,
        name: T,
        email: T,
        phone: Option<String>,
        password: T,
        role: UserRole,
        approved: bool,
    ) -> Result<User, sqlx::Error>;

    async fn approve_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    /// Deletes a registration that has not been approved yet.
    async fn delete_pending_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn update_user_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn set_freelancer_badge(
        &self,
        user_id: Uuid,
        badge: FreelancerBadge,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn set_client_tier(
        &self,
        user_id: Uuid,
        tier: ClientTier,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn set_client_priority(
        &self,
        user_id: Uuid,
        priority: ClientPriority,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn update_profile_picture(
        &self,
        user_id: Uuid,
        url: &str,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn count_open_jobs_for_user(&self, user_id: Uuid) -> Result<i64, sqlx::Error>;

    /// Sets every freelancer's rating to the average of their client ratings.
    async fn recalculate_ratings(&self) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut row: Option<UserRow> = None;

        if let Some(user_id) = user_id {
            row = sqlx::query_as::<_, UserRow>(r#"SELECT * FROM users WHERE id = $1"#)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        } else if let Some(email) = email {
            row = sqlx::query_as::<_, UserRow>(r#"SELECT * FROM users WHERE LOWER(email) = LOWER($1)"#)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        }

        Ok(row.map(User::from))
    }

    async fn get_users(
        &self,
        filter: &UserFilter,
        page: u32,
        limit: usize,
    ) -> Result<Vec<User>, sqlx::Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT * FROM users
            WHERE ($1::user_role IS NULL OR role = $1)
              AND ($2::boolean IS NULL OR approved = $2)
              AND ($3::user_status IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.role)
        .bind(filter.approved)
        .bind(filter.status)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn save_user<T: Into<String> + Send>(
        &self,
        name: T,
        email: T,
        phone: Option<String>,
        password: T,
        role: UserRole,
        approved: bool,
    ) -> Result<User, sqlx::Error> {
        let (badge, earned, tier, priority, spent) = match role {
            UserRole::Freelancer => (Some(FreelancerBadge::Bronze), Some(0i64), None, None, None),
            UserRole::Client => (
                None,
                None,
                Some(ClientTier::Basic),
                Some(ClientPriority::Regular),
                Some(0i64),
            ),
            UserRole::Admin | UserRole::AccountOwner => (None, None, None, None, None),
        };

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (
                display_id, name, email, phone, password, role, approved,
                freelancer_badge, total_earned_cents, client_tier, client_priority, total_spent_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(generate_user_code(role.code_prefix()))
        .bind(name.into())
        .bind(email.into())
        .bind(phone)
        .bind(password.into())
        .bind(role)
        .bind(approved)
        .bind(badge)
        .bind(earned)
        .bind(tier)
        .bind(priority)
        .bind(spent)
        .fetch_one(&self.pool)
        .await?;

        Ok(User::from(row))
    }

    async fn approve_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET approved = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn delete_pending_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1 AND approved = FALSE"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_user_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn set_freelancer_badge(
        &self,
        user_id: Uuid,
        badge: FreelancerBadge,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET freelancer_badge = $2, updated_at = NOW()
            WHERE id = $1 AND role = 'freelancer'
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(badge)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn set_client_tier(
        &self,
        user_id: Uuid,
        tier: ClientTier,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET client_tier = $2, updated_at = NOW()
            WHERE id = $1 AND role = 'client'
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn set_client_priority(
        &self,
        user_id: Uuid,
        priority: ClientPriority,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET client_priority = $2, updated_at = NOW()
            WHERE id = $1 AND role = 'client'
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(priority)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn update_profile_picture(
        &self,
        user_id: Uuid,
        url: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET profile_picture_url = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn count_open_jobs_for_user(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE (client_id = $1 OR assigned_freelancer_id = $1)
              AND status NOT IN ('completed', 'cancelled')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn recalculate_ratings(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users u
            SET rating = COALESCE((
                    SELECT ROUND(AVG(j.client_rating)::numeric, 1)::float8
                    FROM jobs j
                    WHERE j.assigned_freelancer_id = u.id AND j.client_rating IS NOT NULL
                ), 0),
                updated_at = NOW()
            WHERE u.role = 'freelancer'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// Statements that run inside a caller's transaction.

pub async fn lock_user_tx(tx: &mut PgTx<'_>, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(r#"SELECT * FROM users WHERE id = $1 FOR UPDATE"#)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.map(User::from))
}

/// Ids in the order their rows are locked: ascending, without duplicates.
pub fn lock_order(user_ids: &[Uuid]) -> Vec<Uuid> {
    let mut ids = user_ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}

/// Locks several user rows in `lock_order`. Any transaction that writes to
/// more than one user row takes this first.
pub async fn lock_users_tx(tx: &mut PgTx<'_>, user_ids: &[Uuid]) -> Result<(), sqlx::Error> {
    sqlx::query(r#"SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE"#)
        .bind(lock_order(user_ids))
        .fetch_all(&mut **tx)
        .await?;

    Ok(())
}

/// Credits a freelancer's balance and lifetime earnings in one statement.
pub async fn credit_freelancer_tx(
    tx: &mut PgTx<'_>,
    freelancer_id: Uuid,
    payout_cents: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET balance_cents = balance_cents + $2,
            total_earned_cents = COALESCE(total_earned_cents, 0) + $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(freelancer_id)
    .bind(payout_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn add_client_spend_tx(
    tx: &mut PgTx<'_>,
    client_id: Uuid,
    amount_cents: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET total_spent_cents = COALESCE(total_spent_cents, 0) + $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(client_id)
    .bind(amount_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn credit_balance_tx(
    tx: &mut PgTx<'_>,
    user_id: Uuid,
    amount_cents: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE users SET balance_cents = balance_cents + $2, updated_at = NOW() WHERE id = $1"#,
    )
    .bind(user_id)
    .bind(amount_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Counts a completed job for both parties and recomputes badge and tier,
/// overwriting any manual override.
pub async fn record_completion_tx(
    tx: &mut PgTx<'_>,
    client_id: Uuid,
    freelancer_id: Option<Uuid>,
) -> Result<(), sqlx::Error> {
    let parties: Vec<Uuid> = std::iter::once(client_id).chain(freelancer_id).collect();
    lock_users_tx(tx, &parties).await?;

    let client_jobs: i32 = sqlx::query_scalar(
        r#"
        UPDATE users SET completed_jobs = completed_jobs + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING completed_jobs
        "#,
    )
    .bind(client_id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(r#"UPDATE users SET client_tier = $2 WHERE id = $1 AND role = 'client'"#)
        .bind(client_id)
        .bind(tier_for(client_jobs))
        .execute(&mut **tx)
        .await?;

    if let Some(freelancer_id) = freelancer_id {
        let freelancer_jobs: i32 = sqlx::query_scalar(
            r#"
            UPDATE users SET completed_jobs = completed_jobs + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING completed_jobs
            "#,
        )
        .bind(freelancer_id)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(r#"UPDATE users SET freelancer_badge = $2 WHERE id = $1 AND role = 'freelancer'"#)
            .bind(freelancer_id)
            .bind(badge_for(freelancer_jobs))
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Folds a new client rating into the freelancer's running average.
pub async fn refresh_rating_tx(tx: &mut PgTx<'_>, freelancer_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET rating = COALESCE((
                SELECT ROUND(AVG(client_rating)::numeric, 1)::float8
                FROM jobs
                WHERE assigned_freelancer_id = $1 AND client_rating IS NOT NULL
            ), 0)
        WHERE id = $1
        "#,
    )
    .bind(freelancer_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        jobdb::JobExt,
        testing::{self, assigned_job, test_db, Parties},
    };

    #[test]
    fn user_rows_lock_in_ascending_order() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        assert_eq!(lock_order(&[high, low]), vec![low, high]);
        assert_eq!(lock_order(&[low, high]), vec![low, high]);
        assert_eq!(lock_order(&[high, high]), vec![high]);
    }

    #[tokio::test]
    async fn users_with_job_history_cannot_be_deleted() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let parties = Parties::seed(&db_client).await;

        let job = assigned_job(&jobs, &db_client, &parties).await;

        for user_id in [parties.client.id, parties.freelancer.id] {
            match db_client.delete_user(user_id).await {
                Err(sqlx::Error::Database(e)) => assert!(e.is_foreign_key_violation()),
                other => panic!("expected a foreign key violation, got {:?}", other),
            }
        }

        let job = db_client.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.client_id, parties.client.id);
        assert_eq!(job.assigned_freelancer_id, Some(parties.freelancer.id));
        assert!(db_client.delete_user(parties.admin.id).await.unwrap());
    }
}
