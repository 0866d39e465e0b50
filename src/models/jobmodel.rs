use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "service_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Essay,
    ResearchPaper,
    TermPaper,
    Dissertation,
    Thesis,
    CaseStudy,
    Assignment,
    Article,
    Presentation,
    Proofreading,
    Editing,
    Rewriting,
    DataAnalysis,
    Programming,
}

impl ServiceType {
    pub const ALL: [ServiceType; 14] = [
        ServiceType::Essay,
        ServiceType::ResearchPaper,
        ServiceType::TermPaper,
        ServiceType::Dissertation,
        ServiceType::Thesis,
        ServiceType::CaseStudy,
        ServiceType::Assignment,
        ServiceType::Article,
        ServiceType::Presentation,
        ServiceType::Proofreading,
        ServiceType::Editing,
        ServiceType::Rewriting,
        ServiceType::DataAnalysis,
        ServiceType::Programming,
    ];

    pub fn to_str(&self) -> &str {
        match self {
            ServiceType::Essay => "essay",
            ServiceType::ResearchPaper => "research_paper",
            ServiceType::TermPaper => "term_paper",
            ServiceType::Dissertation => "dissertation",
            ServiceType::Thesis => "thesis",
            ServiceType::CaseStudy => "case_study",
            ServiceType::Assignment => "assignment",
            ServiceType::Article => "article",
            ServiceType::Presentation => "presentation",
            ServiceType::Proofreading => "proofreading",
            ServiceType::Editing => "editing",
            ServiceType::Rewriting => "rewriting",
            ServiceType::DataAnalysis => "data_analysis",
            ServiceType::Programming => "programming",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Approved,
    Assigned,
    InProgress,
    Editing,
    Delivered,
    Completed,
    Revision,
    Cancelled,
}

impl JobStatus {
    pub fn to_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Approved => "approved",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Editing => "editing",
            JobStatus::Delivered => "delivered",
            JobStatus::Completed => "completed",
            JobStatus::Revision => "revision",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// States in which a job must carry an assigned freelancer.
    pub fn requires_freelancer(&self) -> bool {
        matches!(
            self,
            JobStatus::Assigned
                | JobStatus::InProgress
                | JobStatus::Editing
                | JobStatus::Delivered
                | JobStatus::Revision
                | JobStatus::Completed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub display_id: String,
    pub client_id: Uuid,
    pub assigned_freelancer_id: Option<Uuid>,
    pub title: String,
    pub instructions: String,
    pub work_type: ServiceType,
    pub quantity: f64,
    pub amount_cents: i64,
    pub deadline: DateTime<Utc>,
    pub freelancer_deadline: DateTime<Utc>,
    pub status: JobStatus,
    pub admin_approved: bool,
    pub client_approved: bool,
    pub payment_confirmed: bool,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub revision_requested: bool,
    pub revision_notes: Option<String>,
    pub revision_due_at: Option<DateTime<Utc>>,
    pub client_rating: Option<i16>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "upload_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UploadType {
    Initial,
    Revision,
    Final,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub uploader_id: Uuid,
    pub uploader_role: crate::models::usermodel::UserRole,
    pub file_name: String,
    pub file_url: String,
    pub upload_type: UploadType,
    pub created_at: DateTime<Utc>,
}
