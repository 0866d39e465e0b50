// dtos/jobdtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{
        jobmodel::{Job, JobStatus, ServiceType, UploadType},
        usermodel::UserRole,
    },
    service::{job_lifecycle::JobAction, pricing::payout_share_cents},
    utils::currency::format_cents_as_ksh,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateJobDto {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Instructions are required"))]
    pub instructions: String,
    pub work_type: ServiceType,
    #[validate(range(min = 0.01, message = "Quantity must be positive"))]
    pub quantity: f64,
    pub deadline: DateTime<Utc>,
    /// Optional amount above the computed price.
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub custom_amount_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuoteQueryDto {
    pub work_type: ServiceType,
    #[validate(range(min = 0.01, message = "Quantity must be positive"))]
    pub quantity: f64,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateJobDto {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Instructions cannot be empty"))]
    pub instructions: Option<String>,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount_cents: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignJobDto {
    pub freelancer_id: Uuid,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ReasonDto {
    #[validate(length(max = 1000, message = "Reason is too long"))]
    pub reason: Option<String>,
    pub version: Option<i32>,
}

/// Body of `POST /jobs/{id}/status`: the target status picks the action.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobStatusDto {
    pub status: JobStatus,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i16>,
    pub reason: Option<String>,
    pub version: Option<i32>,
}

impl JobStatusDto {
    /// Maps a requested status to the action reaching it. Submission work
    /// detection is filled in by the service.
    pub fn to_action(&self) -> Option<JobAction> {
        match self.status {
            JobStatus::Approved => Some(JobAction::Approve),
            JobStatus::InProgress => Some(JobAction::Start),
            JobStatus::Editing => Some(JobAction::Submit { has_work: false }),
            JobStatus::Delivered => Some(JobAction::Deliver),
            JobStatus::Completed => Some(JobAction::Complete { rating: self.rating }),
            JobStatus::Cancelled => Some(JobAction::Cancel { reason: self.reason.clone() }),
            JobStatus::Pending | JobStatus::Assigned | JobStatus::Revision => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RevisionRequestDto {
    #[validate(length(min = 1, message = "Revision notes are required"))]
    pub notes: String,
    #[validate(range(min = 1, max = 720, message = "Turnaround must be between 1 and 720 hours"))]
    pub turnaround_hours: i64,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateJobDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct JobListQueryDto {
    pub status: Option<JobStatus>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAttachmentDto {
    #[validate(length(min = 1, max = 255, message = "File name is required"))]
    pub file_name: String,
    #[validate(url(message = "File URL is invalid"))]
    pub file_url: String,
    pub upload_type: Option<UploadType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAttachmentDto {
    pub upload_type: UploadType,
}

/// Job as shown to a given viewer. Freelancers see their payout and working
/// deadline instead of the client's price and deadline.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilterJobDto {
    pub id: Uuid,
    pub display_id: String,
    pub client_id: Option<Uuid>,
    pub assigned_freelancer_id: Option<Uuid>,
    pub title: String,
    pub instructions: String,
    pub work_type: ServiceType,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub payout_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub freelancer_deadline: DateTime<Utc>,
    pub status: JobStatus,
    pub admin_approved: bool,
    pub client_approved: bool,
    pub payment_confirmed: bool,
    pub revision_requested: bool,
    pub revision_notes: Option<String>,
    pub revision_due_at: Option<DateTime<Utc>>,
    pub client_rating: Option<i16>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub version: i32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl FilterJobDto {
    pub fn filter_job(job: &Job, viewer_role: UserRole) -> Self {
        let freelancer_view = viewer_role == UserRole::Freelancer;

        FilterJobDto {
            id: job.id,
            display_id: job.display_id.clone(),
            client_id: if freelancer_view { None } else { Some(job.client_id) },
            assigned_freelancer_id: job.assigned_freelancer_id,
            title: job.title.clone(),
            instructions: job.instructions.clone(),
            work_type: job.work_type,
            quantity: job.quantity,
            amount_cents: if freelancer_view { None } else { Some(job.amount_cents) },
            amount: if freelancer_view { None } else { Some(format_cents_as_ksh(job.amount_cents)) },
            payout_cents: payout_share_cents(job.amount_cents),
            deadline: if freelancer_view { None } else { Some(job.deadline) },
            freelancer_deadline: job.freelancer_deadline,
            status: job.status,
            admin_approved: job.admin_approved,
            client_approved: job.client_approved,
            payment_confirmed: job.payment_confirmed,
            revision_requested: job.revision_requested,
            revision_notes: job.revision_notes.clone(),
            revision_due_at: job.revision_due_at,
            client_rating: job.client_rating,
            delivered_at: job.delivered_at,
            completed_at: job.completed_at,
            cancel_reason: job.cancel_reason.clone(),
            version: job.version,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }

    pub fn filter_jobs(jobs: &[Job], viewer_role: UserRole) -> Vec<FilterJobDto> {
        jobs.iter().map(|j| FilterJobDto::filter_job(j, viewer_role)).collect()
    }
}
