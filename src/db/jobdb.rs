// db/jobdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DBClient, PgTx};
use crate::{
    models::{
        jobmodel::{Attachment, Job, JobStatus, ServiceType, UploadType},
        usermodel::{ClientPriority, UserRole},
    },
    service::job_lifecycle::JobPatch,
    utils::display_id::generate_job_code,
};

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub client_id: Option<Uuid>,
    pub freelancer_id: Option<Uuid>,
    pub status: Option<JobStatus>,
}

pub struct NewJob {
    pub client_id: Uuid,
    pub title: String,
    pub instructions: String,
    pub work_type: ServiceType,
    pub quantity: f64,
    pub amount_cents: i64,
    pub deadline: DateTime<Utc>,
    pub freelancer_deadline: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

/// Column edits from `PATCH /jobs/{id}`. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct JobEdit {
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub amount_cents: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub freelancer_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlacementJob {
    #[sqlx(flatten)]
    pub job: Job,
    pub client_priority: ClientPriority,
}

#[async_trait]
pub trait JobExt {
    /// Inserts a job. With an idempotency key, a repeated request returns the
    /// job created the first time and `false`.
    async fn save_job(&self, new_job: NewJob) -> Result<(Job, bool), sqlx::Error>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, sqlx::Error>;

    async fn get_jobs(
        &self,
        filter: &JobFilter,
        page: u32,
        limit: usize,
    ) -> Result<Vec<Job>, sqlx::Error>;

    /// Approved jobs nobody has been assigned to yet, with the client's priority.
    async fn get_placement_jobs(&self) -> Result<Vec<PlacementJob>, sqlx::Error>;

    async fn edit_job(
        &self,
        job_id: Uuid,
        expected_version: i32,
        edit: &JobEdit,
    ) -> Result<Option<Job>, sqlx::Error>;

    async fn rate_job(
        &self,
        job_id: Uuid,
        client_id: Uuid,
        rating: i16,
    ) -> Result<Option<Job>, sqlx::Error>;

    /// Delivered, paid and unapproved jobs whose grace period has passed.
    async fn get_auto_approve_candidates(&self, delay_secs: u64) -> Result<Vec<Job>, sqlx::Error>;

    async fn save_attachment(
        &self,
        job_id: Uuid,
        uploader_id: Uuid,
        uploader_role: UserRole,
        file_name: &str,
        file_url: &str,
        upload_type: UploadType,
    ) -> Result<Attachment, sqlx::Error>;

    async fn get_attachments(&self, job_id: Uuid) -> Result<Vec<Attachment>, sqlx::Error>;

    async fn update_attachment_type(
        &self,
        job_id: Uuid,
        attachment_id: Uuid,
        upload_type: UploadType,
    ) -> Result<Option<Attachment>, sqlx::Error>;
}

#[async_trait]
impl JobExt for DBClient {
    async fn save_job(&self, new_job: NewJob) -> Result<(Job, bool), sqlx::Error> {
        let inserted = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                display_id, client_id, title, instructions, work_type, quantity,
                amount_cents, deadline, freelancer_deadline, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (client_id, idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(generate_job_code())
        .bind(new_job.client_id)
        .bind(&new_job.title)
        .bind(&new_job.instructions)
        .bind(new_job.work_type)
        .bind(new_job.quantity)
        .bind(new_job.amount_cents)
        .bind(new_job.deadline)
        .bind(new_job.freelancer_deadline)
        .bind(&new_job.idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(job) = inserted {
            return Ok((job, true));
        }

        let existing = sqlx::query_as::<_, Job>(
            r#"SELECT * FROM jobs WHERE client_id = $1 AND idempotency_key = $2"#,
        )
        .bind(new_job.client_id)
        .bind(&new_job.idempotency_key)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_jobs(
        &self,
        filter: &JobFilter,
        page: u32,
        limit: usize,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let offset = (page.max(1) - 1) as i64 * limit as i64;

        sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::uuid IS NULL OR assigned_freelancer_id = $2)
              AND ($3::job_status IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.client_id)
        .bind(filter.freelancer_id)
        .bind(filter.status)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_placement_jobs(&self) -> Result<Vec<PlacementJob>, sqlx::Error> {
        sqlx::query_as::<_, PlacementJob>(
            r#"
            SELECT j.*, COALESCE(u.client_priority, 'regular') AS client_priority
            FROM jobs j
            JOIN users u ON u.id = j.client_id
            WHERE j.status = 'approved' AND j.assigned_freelancer_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn edit_job(
        &self,
        job_id: Uuid,
        expected_version: i32,
        edit: &JobEdit,
    ) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET
                title = COALESCE($3, title),
                instructions = COALESCE($4, instructions),
                amount_cents = COALESCE($5, amount_cents),
                deadline = COALESCE($6, deadline),
                freelancer_deadline = COALESCE($7, freelancer_deadline),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(expected_version)
        .bind(&edit.title)
        .bind(&edit.instructions)
        .bind(edit.amount_cents)
        .bind(edit.deadline)
        .bind(edit.freelancer_deadline)
        .fetch_optional(&self.pool)
        .await
    }

    async fn rate_job(
        &self,
        job_id: Uuid,
        client_id: Uuid,
        rating: i16,
    ) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET client_rating = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND client_id = $2 AND status = 'completed'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(client_id)
        .bind(rating)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(freelancer_id) = job.as_ref().and_then(|j| j.assigned_freelancer_id) {
            super::userdb::refresh_rating_tx(&mut tx, freelancer_id).await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    async fn get_auto_approve_candidates(&self, delay_secs: u64) -> Result<Vec<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'delivered'
              AND payment_confirmed = TRUE
              AND client_approved = FALSE
              AND GREATEST(payment_confirmed_at, delivered_at) <= NOW() - make_interval(secs => $1)
            ORDER BY payment_confirmed_at ASC
            "#,
        )
        .bind(delay_secs as f64)
        .fetch_all(&self.pool)
        .await
    }

    async fn save_attachment(
        &self,
        job_id: Uuid,
        uploader_id: Uuid,
        uploader_role: UserRole,
        file_name: &str,
        file_url: &str,
        upload_type: UploadType,
    ) -> Result<Attachment, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments (job_id, uploader_id, uploader_role, file_name, file_url, upload_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(uploader_id)
        .bind(uploader_role)
        .bind(file_name)
        .bind(file_url)
        .bind(upload_type)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_attachments(&self, job_id: Uuid) -> Result<Vec<Attachment>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"SELECT * FROM attachments WHERE job_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_attachment_type(
        &self,
        job_id: Uuid,
        attachment_id: Uuid,
        upload_type: UploadType,
    ) -> Result<Option<Attachment>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"
            UPDATE attachments SET upload_type = $3
            WHERE id = $2 AND job_id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(attachment_id)
        .bind(upload_type)
        .fetch_optional(&self.pool)
        .await
    }
}

pub async fn lock_job_tx(tx: &mut PgTx<'_>, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(r#"SELECT * FROM jobs WHERE id = $1 FOR UPDATE"#)
        .bind(job_id)
        .fetch_optional(&mut **tx)
        .await
}

/// Moves a job from `from` to `to` only if nobody changed it since `version`
/// was read. Returns `None` when the guard did not match.
pub async fn apply_transition_tx(
    tx: &mut PgTx<'_>,
    job_id: Uuid,
    from: JobStatus,
    to: JobStatus,
    version: i32,
    patch: &JobPatch,
) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs SET
            status = $4,
            admin_approved = COALESCE($5, admin_approved),
            assigned_freelancer_id = CASE WHEN $15::boolean THEN NULL ELSE COALESCE($6, assigned_freelancer_id) END,
            client_approved = COALESCE($7, client_approved),
            revision_requested = COALESCE($8, revision_requested),
            revision_notes = COALESCE($9, revision_notes),
            revision_due_at = COALESCE($10, revision_due_at),
            client_rating = COALESCE($11, client_rating),
            delivered_at = COALESCE($12, delivered_at),
            cancel_reason = COALESCE($13, cancel_reason),
            completed_at = CASE WHEN $14::boolean THEN COALESCE(completed_at, NOW()) ELSE completed_at END,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND status = $2 AND version = $3
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(from)
    .bind(version)
    .bind(to)
    .bind(patch.admin_approved)
    .bind(patch.assigned_freelancer_id)
    .bind(patch.client_approved)
    .bind(patch.revision_requested)
    .bind(&patch.revision_notes)
    .bind(patch.revision_due_at)
    .bind(patch.client_rating)
    .bind(patch.delivered_at)
    .bind(&patch.cancel_reason)
    .bind(patch.mark_completed)
    .bind(patch.clear_freelancer)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn mark_payment_confirmed_tx(tx: &mut PgTx<'_>, job_id: Uuid) -> Result<Job, sqlx::Error> {
    sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs SET
            payment_confirmed = TRUE,
            payment_confirmed_at = NOW(),
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(job_id)
    .fetch_one(&mut **tx)
    .await
}
