// db/statsdb.rs
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::DBClient;
use crate::models::{jobmodel::JobStatus, jobmodel::ServiceType};

#[derive(Debug, Serialize, Clone, Default, sqlx::FromRow)]
pub struct PlatformStats {
    pub total_jobs: i64,
    pub open_jobs: i64,
    pub active_jobs: i64,
    pub completed_jobs: i64,
    pub total_clients: i64,
    pub total_freelancers: i64,
    pub pending_approvals: i64,
    pub pending_payments: i64,
}

#[derive(Debug, Serialize, Clone, sqlx::FromRow)]
pub struct StatusCount {
    pub status: JobStatus,
    pub count: i64,
}

#[derive(Debug, Serialize, Clone, sqlx::FromRow)]
pub struct ServiceRevenue {
    pub work_type: ServiceType,
    pub jobs: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Serialize, Clone, sqlx::FromRow)]
pub struct UserSummary {
    pub total_jobs: i64,
    pub active_jobs: i64,
    pub completed_jobs: i64,
    pub cancelled_jobs: i64,
    pub amount_cents: i64,
    pub average_rating: Option<f64>,
}

#[async_trait]
pub trait StatsExt {
    async fn get_platform_stats(&self) -> Result<PlatformStats, sqlx::Error>;

    async fn get_status_breakdown(&self) -> Result<Vec<StatusCount>, sqlx::Error>;

    /// Confirmed revenue per service type.
    async fn get_service_revenue(&self) -> Result<Vec<ServiceRevenue>, sqlx::Error>;

    async fn get_confirmed_revenue_cents(&self) -> Result<i64, sqlx::Error>;

    async fn get_user_summary(&self, user_id: Uuid) -> Result<UserSummary, sqlx::Error>;
}

#[async_trait]
impl StatsExt for DBClient {
    async fn get_platform_stats(&self) -> Result<PlatformStats, sqlx::Error> {
        sqlx::query_as::<_, PlatformStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs) AS total_jobs,
                (SELECT COUNT(*) FROM jobs WHERE status = 'approved' AND assigned_freelancer_id IS NULL) AS open_jobs,
                (SELECT COUNT(*) FROM jobs WHERE status IN ('assigned', 'in_progress', 'editing', 'revision')) AS active_jobs,
                (SELECT COUNT(*) FROM jobs WHERE status = 'completed') AS completed_jobs,
                (SELECT COUNT(*) FROM users WHERE role = 'client') AS total_clients,
                (SELECT COUNT(*) FROM users WHERE role = 'freelancer') AS total_freelancers,
                (SELECT COUNT(*) FROM users WHERE approved = FALSE) AS pending_approvals,
                (SELECT COUNT(*) FROM payments WHERE status = 'pending') AS pending_payments
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    async fn get_status_breakdown(&self) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            r#"SELECT status, COUNT(*) AS count FROM jobs GROUP BY status ORDER BY status"#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_service_revenue(&self) -> Result<Vec<ServiceRevenue>, sqlx::Error> {
        sqlx::query_as::<_, ServiceRevenue>(
            r#"
            SELECT j.work_type, COUNT(*) AS jobs, COALESCE(SUM(p.amount_cents), 0)::BIGINT AS revenue_cents
            FROM payments p
            JOIN jobs j ON j.id = p.job_id
            WHERE p.status = 'confirmed'
            GROUP BY j.work_type
            ORDER BY revenue_cents DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_confirmed_revenue_cents(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments WHERE status = 'confirmed'"#,
        )
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user_summary(&self, user_id: Uuid) -> Result<UserSummary, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT
                COUNT(*) AS total_jobs,
                COUNT(*) FILTER (WHERE status NOT IN ('completed', 'cancelled', 'pending')) AS active_jobs,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_jobs,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_jobs,
                COALESCE(SUM(amount_cents) FILTER (WHERE payment_confirmed), 0)::BIGINT AS amount_cents,
                ROUND(AVG(client_rating)::numeric, 1)::float8 AS average_rating
            FROM jobs
            WHERE client_id = $1 OR assigned_freelancer_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }
}
