// service/job_service.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{
        biddb::{accept_bid_tx, pending_bid_tx, reject_other_bids_tx},
        jobdb::{apply_transition_tx, lock_job_tx, JobEdit, JobExt, JobFilter, NewJob, PlacementJob},
        messagedb::MessageExt,
        userdb::{lock_user_tx, record_completion_tx, refresh_rating_tx},
        DBClient, PgTx,
    },
    dtos::jobdtos::{CreateAttachmentDto, CreateJobDto, UpdateJobDto},
    models::{
        jobmodel::{Attachment, Job, JobStatus, UploadType},
        messagemodel::{Message, MessageKind},
        usermodel::{User, UserRole},
    },
    service::{
        error::ServiceError,
        event_bus::{EventBus, JobEventKind},
        gatekeeper,
        job_lifecycle::{self, Actor, JobAction},
        pricing,
        reputation::priority_weight,
    },
};

#[derive(Debug, Clone)]
pub struct JobService {
    db_client: Arc<DBClient>,
    event_bus: Arc<EventBus>,
    auto_approve_delay: Duration,
}

/// Orders the placement list: client priority first, then the most urgent
/// freelancer deadline.
pub fn sort_placement(jobs: &mut [PlacementJob]) {
    jobs.sort_by(|a, b| {
        priority_weight(b.client_priority)
            .cmp(&priority_weight(a.client_priority))
            .then(a.job.freelancer_deadline.cmp(&b.job.freelancer_deadline))
            .then(a.job.id.cmp(&b.job.id))
    });
}

fn ensure_can_transact(user: &User) -> Result<(), ServiceError> {
    if !user.is_active() {
        return Err(ServiceError::Forbidden("Account is not active".to_string()));
    }
    if !user.approved && !user.is_admin() {
        return Err(ServiceError::Forbidden("Account is awaiting approval".to_string()));
    }
    Ok(())
}

/// Admin, owning client or assigned freelancer.
fn ensure_participant(job: &Job, user: &User) -> Result<(), ServiceError> {
    let allowed = user.is_admin()
        || job.client_id == user.id
        || job.assigned_freelancer_id == Some(user.id);

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::UnauthorizedJobAccess(user.id, job.id))
    }
}

impl JobService {
    pub fn new(db_client: Arc<DBClient>, event_bus: Arc<EventBus>, auto_approve_delay: Duration) -> Self {
        Self {
            db_client,
            event_bus,
            auto_approve_delay,
        }
    }

    pub async fn create_job(
        &self,
        client: &User,
        body: CreateJobDto,
        idempotency_key: Option<String>,
    ) -> Result<Job, ServiceError> {
        if client.role() != UserRole::Client {
            return Err(ServiceError::Forbidden("Only clients can place orders".to_string()));
        }
        ensure_can_transact(client)?;

        let now = Utc::now();
        let quote = pricing::quote(body.work_type, body.quantity, body.deadline, now)?;
        let amount_cents = pricing::resolve_order_amount(quote.amount_cents, body.custom_amount_cents)?;

        let (job, created) = self
            .db_client
            .save_job(NewJob {
                client_id: client.id,
                title: body.title.trim().to_string(),
                instructions: body.instructions.trim().to_string(),
                work_type: body.work_type,
                quantity: body.quantity,
                amount_cents,
                deadline: body.deadline,
                freelancer_deadline: quote.freelancer_deadline,
                idempotency_key,
            })
            .await?;

        if created {
            tracing::info!("Job {} created by client {}", job.display_id, client.id);
            self.event_bus.publish(JobEventKind::JobCreated, &job);
        } else {
            tracing::debug!("Replayed job creation for {}", job.display_id);
        }

        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, ServiceError> {
        self.db_client
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))
    }

    pub async fn get_job_for(&self, viewer: &User, job_id: Uuid) -> Result<Job, ServiceError> {
        let job = self.get_job(job_id).await?;
        if !job_lifecycle::can_view(&job, Actor::from_user(viewer)) {
            return Err(ServiceError::UnauthorizedJobAccess(viewer.id, job_id));
        }
        Ok(job)
    }

    pub async fn list_jobs(
        &self,
        viewer: &User,
        status: Option<JobStatus>,
        page: u32,
        limit: usize,
    ) -> Result<Vec<Job>, ServiceError> {
        let filter = match viewer.role() {
            UserRole::Client => JobFilter {
                client_id: Some(viewer.id),
                status,
                ..Default::default()
            },
            UserRole::Freelancer => JobFilter {
                freelancer_id: Some(viewer.id),
                status,
                ..Default::default()
            },
            UserRole::Admin | UserRole::AccountOwner => JobFilter {
                status,
                ..Default::default()
            },
        };

        Ok(self.db_client.get_jobs(&filter, page, limit).await?)
    }

    pub async fn placement_list(&self) -> Result<Vec<PlacementJob>, ServiceError> {
        let mut jobs = self.db_client.get_placement_jobs().await?;
        sort_placement(&mut jobs);
        Ok(jobs)
    }

    /// Clients may edit their own job until it is approved; admins may edit
    /// any job that has not finished.
    pub async fn edit_job(
        &self,
        editor: &User,
        job_id: Uuid,
        body: UpdateJobDto,
    ) -> Result<Job, ServiceError> {
        let job = self.get_job(job_id).await?;

        if editor.is_admin() {
            if job.status.is_terminal() {
                return Err(ServiceError::InvalidJobStatus(job_id, "edit", job.status));
            }
        } else if job.client_id == editor.id {
            if job.status != JobStatus::Pending {
                return Err(ServiceError::InvalidJobStatus(job_id, "edit", job.status));
            }
            if body.amount_cents.is_some() {
                return Err(ServiceError::Forbidden("Only admins can change the price".to_string()));
            }
        } else {
            return Err(ServiceError::UnauthorizedJobAccess(editor.id, job_id));
        }

        let version = body.version.unwrap_or(job.version);
        if version != job.version {
            return Err(ServiceError::Conflict(format!("Job {} was modified by someone else", job_id)));
        }

        let mut edit = JobEdit {
            title: body.title.map(|t| t.trim().to_string()),
            instructions: body.instructions.map(|i| i.trim().to_string()),
            amount_cents: body.amount_cents,
            ..Default::default()
        };

        if let Some(deadline) = body.deadline {
            let now = Utc::now();
            if deadline <= now {
                return Err(ServiceError::Validation("Deadline must be in the future".to_string()));
            }
            edit.deadline = Some(deadline);
            edit.freelancer_deadline = Some(pricing::freelancer_deadline(job.created_at, deadline));

            // A tighter deadline may make the order urgent; the price never drops below it.
            if !editor.is_admin() {
                let computed = pricing::compute_amount_cents(job.work_type, job.quantity, deadline, now)?;
                if computed > job.amount_cents {
                    edit.amount_cents = Some(computed);
                }
            }
        }

        let updated = self
            .db_client
            .edit_job(job_id, version, &edit)
            .await?
            .ok_or_else(|| ServiceError::Conflict(format!("Job {} was modified by someone else", job_id)))?;

        self.event_bus.publish(JobEventKind::JobUpdated, &updated);
        Ok(updated)
    }

    /// Runs `action` against a locked job inside the caller's transaction.
    /// `keep_bid` is the bid that wins an assignment; without one, the
    /// assignee's own pending bid is accepted.
    pub async fn transition_in_tx(
        &self,
        tx: &mut PgTx<'_>,
        job: &Job,
        actor: Actor,
        action: JobAction,
        keep_bid: Option<Uuid>,
    ) -> Result<Job, ServiceError> {
        if let JobAction::Assign { freelancer_id } = &action {
            let freelancer = lock_user_tx(tx, *freelancer_id)
                .await?
                .ok_or(ServiceError::UserNotFound(*freelancer_id))?;

            if freelancer.role() != UserRole::Freelancer {
                return Err(ServiceError::Validation("Jobs can only be assigned to freelancers".to_string()));
            }
            if !freelancer.approved || !freelancer.is_active() {
                return Err(ServiceError::Validation(
                    "Freelancer must be approved and active".to_string(),
                ));
            }
        }

        let transition = job_lifecycle::plan(job, actor, action, Utc::now())?;

        let updated = apply_transition_tx(
            tx,
            job.id,
            transition.from,
            transition.to,
            job.version,
            &transition.patch,
        )
        .await?
        .ok_or_else(|| ServiceError::Conflict(format!("Job {} changed while being updated", job.id)))?;

        if transition.to == JobStatus::Assigned {
            let keep_bid = match (keep_bid, updated.assigned_freelancer_id) {
                (Some(bid_id), _) => Some(bid_id),
                (None, Some(freelancer_id)) => match pending_bid_tx(tx, job.id, freelancer_id).await? {
                    Some(bid) => Some(accept_bid_tx(tx, bid.id).await?.id),
                    None => None,
                },
                (None, None) => None,
            };
            let rejected = reject_other_bids_tx(tx, job.id, keep_bid).await?;
            tracing::debug!("Rejected {} competing bids on job {}", rejected, job.id);
        }

        if transition.is_first_completion(job) {
            record_completion_tx(tx, job.client_id, job.assigned_freelancer_id).await?;
        }

        if transition.patch.client_rating.is_some() {
            if let Some(freelancer_id) = job.assigned_freelancer_id {
                refresh_rating_tx(tx, freelancer_id).await?;
            }
        }

        Ok(updated)
    }

    pub async fn transition(
        self: &Arc<Self>,
        actor: Actor,
        job_id: Uuid,
        mut action: JobAction,
        expected_version: Option<i32>,
    ) -> Result<Job, ServiceError> {
        let mut tx = self.db_client.begin().await?;

        let job = lock_job_tx(&mut tx, job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if let Some(version) = expected_version {
            if version != job.version {
                return Err(ServiceError::Conflict(format!(
                    "Job {} is at version {}, not {}",
                    job_id, job.version, version
                )));
            }
        }

        if let JobAction::Submit { has_work } = &mut action {
            if let Some(freelancer_id) = job.assigned_freelancer_id {
                let attachments = self.db_client.get_attachments(job_id).await?;
                let messages = self.db_client.get_messages(job_id).await?;
                *has_work = gatekeeper::freelancer_has_work(freelancer_id, &attachments, &messages);
            }
        }

        let updated = self.transition_in_tx(&mut tx, &job, actor, action, None).await?;
        tx.commit().await?;

        tracing::info!(
            "Job {} moved {} -> {}",
            updated.display_id,
            job.status.to_str(),
            updated.status.to_str()
        );
        self.event_bus.publish(JobEventKind::JobUpdated, &updated);

        // A re-delivery of a paid job restarts the approval window.
        if updated.status == JobStatus::Delivered && updated.payment_confirmed {
            self.schedule_auto_approve(updated.id);
        }

        Ok(updated)
    }

    /// Completes a delivered and paid job on the client's behalf. Returns
    /// `None` when the job is no longer eligible.
    pub async fn auto_approve(self: &Arc<Self>, job_id: Uuid) -> Result<Option<Job>, ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::Delivered || !job.payment_confirmed || job.client_approved {
            return Ok(None);
        }

        match self
            .transition(Actor::System, job_id, JobAction::Complete { rating: None }, Some(job.version))
            .await
        {
            Ok(job) => {
                tracing::info!("Job {} auto-approved", job.display_id);
                Ok(Some(job))
            }
            Err(ServiceError::Conflict(_)) | Err(ServiceError::InvalidJobStatus(..)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn schedule_auto_approve(self: &Arc<Self>, job_id: Uuid) {
        let service = Arc::clone(self);
        let delay = self.auto_approve_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = service.auto_approve(job_id).await {
                tracing::error!("Auto-approval of job {} failed: {}", job_id, e);
            }
        });
    }

    pub async fn rate_job(&self, client: &User, job_id: Uuid, rating: i16) -> Result<Job, ServiceError> {
        let job = self.get_job(job_id).await?;
        if job.client_id != client.id {
            return Err(ServiceError::UnauthorizedJobAccess(client.id, job_id));
        }
        if job.status != JobStatus::Completed {
            return Err(ServiceError::InvalidJobStatus(job_id, "rate", job.status));
        }

        let updated = self
            .db_client
            .rate_job(job_id, client.id, rating)
            .await?
            .ok_or_else(|| ServiceError::Conflict(format!("Job {} changed while being rated", job_id)))?;

        self.event_bus.publish(JobEventKind::JobUpdated, &updated);
        Ok(updated)
    }

    pub async fn add_attachment(
        &self,
        uploader: &User,
        job_id: Uuid,
        body: CreateAttachmentDto,
    ) -> Result<Attachment, ServiceError> {
        let job = self.get_job(job_id).await?;
        ensure_participant(&job, uploader)?;

        let upload_type = body.upload_type.unwrap_or(if job.revision_requested {
            UploadType::Revision
        } else {
            UploadType::Initial
        });
        gatekeeper::check_upload_type(uploader.role(), upload_type)?;

        let attachment = self
            .db_client
            .save_attachment(
                job_id,
                uploader.id,
                uploader.role(),
                body.file_name.trim(),
                body.file_url.trim(),
                upload_type,
            )
            .await?;

        self.event_bus.publish(JobEventKind::JobUpdated, &job);
        Ok(attachment)
    }

    pub async fn list_attachments(&self, viewer: &User, job_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        let job = self.get_job(job_id).await?;
        ensure_participant(&job, viewer)?;

        let attachments = self.db_client.get_attachments(job_id).await?;
        Ok(gatekeeper::visible_attachments(attachments, &job, viewer.id, viewer.role()))
    }

    pub async fn tag_attachment(
        &self,
        admin: &User,
        job_id: Uuid,
        attachment_id: Uuid,
        upload_type: UploadType,
    ) -> Result<Attachment, ServiceError> {
        gatekeeper::check_upload_type(admin.role(), upload_type)?;
        if !admin.is_admin() {
            return Err(ServiceError::Forbidden("Only admins can tag attachments".to_string()));
        }

        self.db_client
            .update_attachment_type(job_id, attachment_id, upload_type)
            .await?
            .ok_or(ServiceError::AttachmentNotFound(attachment_id))
    }

    pub async fn post_message(
        &self,
        sender: &User,
        job_id: Uuid,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message, ServiceError> {
        let job = self.get_job(job_id).await?;
        ensure_participant(&job, sender)?;

        let content = gatekeeper::prepare_content(kind, content)?;
        let approved = gatekeeper::initial_approval(sender.role(), kind);

        let message = self
            .db_client
            .save_message(job_id, sender.id, sender.role(), kind, &content, approved)
            .await?;

        if !approved {
            tracing::info!("Message {} on job {} awaits moderation", message.id, job.display_id);
        }
        Ok(message)
    }

    pub async fn list_messages(&self, viewer: &User, job_id: Uuid) -> Result<Vec<Message>, ServiceError> {
        let job = self.get_job(job_id).await?;
        ensure_participant(&job, viewer)?;

        let messages = self.db_client.get_messages(job_id).await?;
        Ok(gatekeeper::visible_messages(messages, viewer.id, viewer.role()))
    }

    pub async fn approve_message(
        &self,
        admin: &User,
        job_id: Uuid,
        message_id: Uuid,
    ) -> Result<Message, ServiceError> {
        if !admin.is_admin() {
            return Err(ServiceError::Forbidden("Only admins can approve messages".to_string()));
        }

        self.db_client
            .approve_message(job_id, message_id, admin.id)
            .await?
            .ok_or(ServiceError::MessageNotFound(message_id))
    }
}
