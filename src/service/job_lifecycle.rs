//! Legal job transitions and who may perform them.
//!
//! `plan` is pure: it inspects a job snapshot and returns the target status plus
//! the column changes to apply. `JobService` executes the plan as a conditional
//! update so a concurrent transition surfaces as a conflict.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    models::{
        jobmodel::{Job, JobStatus},
        usermodel::{User, UserRole},
    },
    service::error::ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Client(Uuid),
    Freelancer(Uuid),
    Admin(Uuid),
    /// Background work such as auto-approval.
    System,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        match user.role() {
            UserRole::Client => Actor::Client(user.id),
            UserRole::Freelancer => Actor::Freelancer(user.id),
            UserRole::Admin | UserRole::AccountOwner => Actor::Admin(user.id),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Client(id) | Actor::Freelancer(id) | Actor::Admin(id) => Some(*id),
            Actor::System => None,
        }
    }

    fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }

    fn owns(&self, job: &Job) -> bool {
        matches!(self, Actor::Client(id) if *id == job.client_id)
    }

    fn is_assigned_to(&self, job: &Job) -> bool {
        matches!(self, Actor::Freelancer(id) if Some(*id) == job.assigned_freelancer_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobAction {
    Approve,
    Reject { reason: Option<String> },
    Assign { freelancer_id: Uuid },
    Start,
    /// `has_work` is whether the freelancer has uploaded a file or shared a link.
    Submit { has_work: bool },
    Deliver,
    Complete { rating: Option<i16> },
    RequestRevision { notes: String, turnaround_hours: i64 },
    Cancel { reason: Option<String> },
}

impl JobAction {
    pub fn name(&self) -> &'static str {
        match self {
            JobAction::Approve => "approve",
            JobAction::Reject { .. } => "reject",
            JobAction::Assign { .. } => "assign",
            JobAction::Start => "start",
            JobAction::Submit { .. } => "submit",
            JobAction::Deliver => "deliver",
            JobAction::Complete { .. } => "complete",
            JobAction::RequestRevision { .. } => "request revision",
            JobAction::Cancel { .. } => "cancel",
        }
    }

    fn allowed_from(&self) -> &'static [JobStatus] {
        match self {
            JobAction::Approve | JobAction::Reject { .. } => &[JobStatus::Pending],
            JobAction::Assign { .. } => &[JobStatus::Approved],
            JobAction::Start => &[JobStatus::Assigned],
            JobAction::Submit { .. } => &[JobStatus::InProgress, JobStatus::Revision],
            JobAction::Deliver => &[JobStatus::Editing],
            JobAction::Complete { .. } => &[JobStatus::Delivered],
            JobAction::RequestRevision { .. } => &[JobStatus::Delivered, JobStatus::Completed],
            JobAction::Cancel { .. } => &[
                JobStatus::Pending,
                JobStatus::Approved,
                JobStatus::Assigned,
                JobStatus::InProgress,
            ],
        }
    }
}

/// Column changes carried by a transition. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub admin_approved: Option<bool>,
    pub assigned_freelancer_id: Option<Uuid>,
    pub client_approved: Option<bool>,
    pub revision_requested: Option<bool>,
    pub revision_notes: Option<String>,
    pub revision_due_at: Option<DateTime<Utc>>,
    pub client_rating: Option<i16>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    /// Sets `completed_at` when it is still empty.
    pub mark_completed: bool,
    /// Drops the assignee; wins over `assigned_freelancer_id`.
    pub clear_freelancer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub patch: JobPatch,
}

impl Transition {
    /// First completion of the job; repeat completions after a revision carry
    /// no reputation side effects.
    pub fn is_first_completion(&self, job: &Job) -> bool {
        self.to == JobStatus::Completed && job.completed_at.is_none()
    }
}

pub fn plan(
    job: &Job,
    actor: Actor,
    action: JobAction,
    now: DateTime<Utc>,
) -> Result<Transition, ServiceError> {
    authorize(job, actor, &action)?;

    if !action.allowed_from().contains(&job.status) {
        return Err(ServiceError::InvalidJobStatus(job.id, action.name(), job.status));
    }

    let from = job.status;
    let mut patch = JobPatch::default();

    let to = match action {
        JobAction::Approve => {
            patch.admin_approved = Some(true);
            JobStatus::Approved
        }
        JobAction::Reject { reason } => {
            patch.cancel_reason = reason.filter(|r| !r.trim().is_empty());
            JobStatus::Cancelled
        }
        JobAction::Assign { freelancer_id } => {
            patch.assigned_freelancer_id = Some(freelancer_id);
            JobStatus::Assigned
        }
        JobAction::Start => JobStatus::InProgress,
        JobAction::Submit { has_work } => {
            if !has_work {
                return Err(ServiceError::Validation(
                    "Upload at least one file or share a link before submitting".to_string(),
                ));
            }
            patch.revision_requested = Some(false);
            JobStatus::Editing
        }
        JobAction::Deliver => {
            patch.delivered_at = Some(now);
            JobStatus::Delivered
        }
        JobAction::Complete { rating } => {
            if !job.payment_confirmed {
                return Err(ServiceError::Validation(
                    "Payment must be confirmed before the job can be approved".to_string(),
                ));
            }
            match (actor, rating) {
                (Actor::System, _) => {}
                (_, Some(r)) if (1..=5).contains(&r) => patch.client_rating = Some(r),
                _ => {
                    return Err(ServiceError::Validation(
                        "A rating between 1 and 5 is required".to_string(),
                    ))
                }
            }
            patch.client_approved = Some(true);
            patch.mark_completed = true;
            JobStatus::Completed
        }
        JobAction::RequestRevision { notes, turnaround_hours } => {
            let notes = notes.trim();
            if notes.is_empty() {
                return Err(ServiceError::Validation("Revision notes are required".to_string()));
            }
            if turnaround_hours < 1 {
                return Err(ServiceError::Validation(
                    "Revision turnaround must be at least one hour".to_string(),
                ));
            }
            patch.revision_requested = Some(true);
            patch.revision_notes = Some(notes.to_string());
            patch.revision_due_at = Some(now + Duration::hours(turnaround_hours));
            patch.client_approved = Some(false);
            JobStatus::Revision
        }
        JobAction::Cancel { reason } => {
            if job.payment_confirmed {
                return Err(ServiceError::Conflict(format!(
                    "Job {} is paid and can no longer be cancelled",
                    job.display_id
                )));
            }
            patch.cancel_reason = reason.filter(|r| !r.trim().is_empty());
            patch.clear_freelancer = true;
            JobStatus::Cancelled
        }
    };

    Ok(Transition { from, to, patch })
}

fn authorize(job: &Job, actor: Actor, action: &JobAction) -> Result<(), ServiceError> {
    let allowed = match action {
        JobAction::Approve
        | JobAction::Reject { .. }
        | JobAction::Assign { .. }
        | JobAction::Deliver => actor.is_admin(),
        JobAction::Start | JobAction::Submit { .. } => actor.is_assigned_to(job),
        JobAction::Complete { .. } => actor.owns(job) || actor == Actor::System,
        JobAction::RequestRevision { .. } => actor.owns(job),
        JobAction::Cancel { .. } => actor.is_admin() || actor.owns(job),
    };

    if allowed {
        return Ok(());
    }

    match actor.user_id() {
        Some(user_id) => Err(ServiceError::UnauthorizedJobAccess(user_id, job.id)),
        None => Err(ServiceError::Forbidden(format!(
            "System cannot {} job {}",
            action.name(),
            job.id
        ))),
    }
}

/// Whether a viewer may read a job at all.
pub fn can_view(job: &Job, actor: Actor) -> bool {
    match actor {
        Actor::Admin(_) | Actor::System => true,
        Actor::Client(id) => id == job.client_id,
        // Open jobs are visible to every freelancer for bidding.
        Actor::Freelancer(id) => {
            job.assigned_freelancer_id == Some(id)
                || (job.status == JobStatus::Approved && job.assigned_freelancer_id.is_none())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::jobmodel::ServiceType;

    pub(crate) fn job_in(status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            display_id: "ORD-TEST01".to_string(),
            client_id: Uuid::new_v4(),
            assigned_freelancer_id: if status.requires_freelancer() {
                Some(Uuid::new_v4())
            } else {
                None
            },
            title: "Essay".to_string(),
            instructions: "Four pages".to_string(),
            work_type: ServiceType::Essay,
            quantity: 4.0,
            amount_cents: 100_000,
            deadline: now + Duration::hours(10),
            freelancer_deadline: now + Duration::hours(6),
            status,
            admin_approved: status != JobStatus::Pending,
            client_approved: false,
            payment_confirmed: false,
            payment_confirmed_at: None,
            revision_requested: false,
            revision_notes: None,
            revision_due_at: None,
            client_rating: None,
            delivered_at: None,
            completed_at: None,
            cancel_reason: None,
            idempotency_key: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn admin() -> Actor {
        Actor::Admin(Uuid::new_v4())
    }

    fn owner(job: &Job) -> Actor {
        Actor::Client(job.client_id)
    }

    fn assignee(job: &Job) -> Actor {
        Actor::Freelancer(job.assigned_freelancer_id.unwrap())
    }

    #[test]
    fn admin_walks_job_from_pending_to_assigned() {
        let mut job = job_in(JobStatus::Pending);
        let t = plan(&job, admin(), JobAction::Approve, Utc::now()).unwrap();
        assert_eq!(t.to, JobStatus::Approved);
        assert_eq!(t.patch.admin_approved, Some(true));

        job.status = JobStatus::Approved;
        let freelancer_id = Uuid::new_v4();
        let t = plan(&job, admin(), JobAction::Assign { freelancer_id }, Utc::now()).unwrap();
        assert_eq!(t.to, JobStatus::Assigned);
        assert_eq!(t.patch.assigned_freelancer_id, Some(freelancer_id));
    }

    #[test]
    fn only_admins_approve() {
        let job = job_in(JobStatus::Pending);
        let err = plan(&job, owner(&job), JobAction::Approve, Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedJobAccess(_, _)));
    }

    #[test]
    fn reject_stores_reason() {
        let job = job_in(JobStatus::Pending);
        let t = plan(
            &job,
            admin(),
            JobAction::Reject { reason: Some("Unclear brief".into()) },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.to, JobStatus::Cancelled);
        assert_eq!(t.patch.cancel_reason.as_deref(), Some("Unclear brief"));
    }

    #[test]
    fn assign_requires_approved_job() {
        let job = job_in(JobStatus::Pending);
        let err = plan(
            &job,
            admin(),
            JobAction::Assign { freelancer_id: Uuid::new_v4() },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJobStatus(_, "assign", JobStatus::Pending)));
    }

    #[test]
    fn only_the_assigned_freelancer_starts() {
        let job = job_in(JobStatus::Assigned);
        assert_eq!(plan(&job, assignee(&job), JobAction::Start, Utc::now()).unwrap().to, JobStatus::InProgress);

        let stranger = Actor::Freelancer(Uuid::new_v4());
        assert!(plan(&job, stranger, JobAction::Start, Utc::now()).is_err());
    }

    #[test]
    fn submit_needs_work_and_clears_revision_flag() {
        let job = job_in(JobStatus::Revision);
        let err = plan(&job, assignee(&job), JobAction::Submit { has_work: false }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let t = plan(&job, assignee(&job), JobAction::Submit { has_work: true }, Utc::now()).unwrap();
        assert_eq!(t.to, JobStatus::Editing);
        assert_eq!(t.patch.revision_requested, Some(false));
    }

    #[test]
    fn deliver_records_time() {
        let job = job_in(JobStatus::Editing);
        let now = Utc::now();
        let t = plan(&job, admin(), JobAction::Deliver, now).unwrap();
        assert_eq!(t.to, JobStatus::Delivered);
        assert_eq!(t.patch.delivered_at, Some(now));
    }

    #[test]
    fn completion_requires_payment() {
        let job = job_in(JobStatus::Delivered);
        let err = plan(&job, owner(&job), JobAction::Complete { rating: Some(5) }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn client_completion_needs_a_valid_rating() {
        let mut job = job_in(JobStatus::Delivered);
        job.payment_confirmed = true;

        for bad in [None, Some(0), Some(6)] {
            assert!(plan(&job, owner(&job), JobAction::Complete { rating: bad }, Utc::now()).is_err());
        }

        let t = plan(&job, owner(&job), JobAction::Complete { rating: Some(4) }, Utc::now()).unwrap();
        assert_eq!(t.to, JobStatus::Completed);
        assert_eq!(t.patch.client_rating, Some(4));
        assert_eq!(t.patch.client_approved, Some(true));
        assert!(t.is_first_completion(&job));
    }

    #[test]
    fn system_completes_without_rating() {
        let mut job = job_in(JobStatus::Delivered);
        job.payment_confirmed = true;
        let t = plan(&job, Actor::System, JobAction::Complete { rating: None }, Utc::now()).unwrap();
        assert_eq!(t.patch.client_rating, None);
        assert!(t.patch.mark_completed);
    }

    #[test]
    fn another_client_cannot_complete() {
        let mut job = job_in(JobStatus::Delivered);
        job.payment_confirmed = true;
        let other = Actor::Client(Uuid::new_v4());
        assert!(plan(&job, other, JobAction::Complete { rating: Some(5) }, Utc::now()).is_err());
    }

    #[test]
    fn second_completion_has_no_side_effects() {
        let mut job = job_in(JobStatus::Delivered);
        job.payment_confirmed = true;
        job.completed_at = Some(Utc::now());
        let t = plan(&job, owner(&job), JobAction::Complete { rating: Some(3) }, Utc::now()).unwrap();
        assert!(!t.is_first_completion(&job));
    }

    #[test]
    fn revision_from_completed_resets_client_approval() {
        let mut job = job_in(JobStatus::Completed);
        job.payment_confirmed = true;
        job.client_approved = true;
        let now = Utc::now();
        let t = plan(
            &job,
            owner(&job),
            JobAction::RequestRevision { notes: " Fix references ".into(), turnaround_hours: 24 },
            now,
        )
        .unwrap();
        assert_eq!(t.to, JobStatus::Revision);
        assert_eq!(t.patch.client_approved, Some(false));
        assert_eq!(t.patch.revision_notes.as_deref(), Some("Fix references"));
        assert_eq!(t.patch.revision_due_at, Some(now + Duration::hours(24)));
    }

    #[test]
    fn revision_guards() {
        let job = job_in(JobStatus::Delivered);
        let blank = JobAction::RequestRevision { notes: "   ".into(), turnaround_hours: 24 };
        assert!(plan(&job, owner(&job), blank, Utc::now()).is_err());

        let instant = JobAction::RequestRevision { notes: "Redo".into(), turnaround_hours: 0 };
        assert!(plan(&job, owner(&job), instant, Utc::now()).is_err());

        let early = job_in(JobStatus::InProgress);
        let action = JobAction::RequestRevision { notes: "Redo".into(), turnaround_hours: 2 };
        assert!(matches!(
            plan(&early, owner(&early), action, Utc::now()).unwrap_err(),
            ServiceError::InvalidJobStatus(_, _, JobStatus::InProgress)
        ));
    }

    #[test]
    fn cancel_is_limited_to_early_states() {
        for status in [JobStatus::Pending, JobStatus::Approved, JobStatus::Assigned, JobStatus::InProgress] {
            let job = job_in(status);
            let t = plan(&job, owner(&job), JobAction::Cancel { reason: None }, Utc::now()).unwrap();
            assert_eq!(t.to, JobStatus::Cancelled);
        }
        for status in [JobStatus::Editing, JobStatus::Delivered, JobStatus::Completed, JobStatus::Cancelled] {
            let job = job_in(status);
            assert!(plan(&job, admin(), JobAction::Cancel { reason: None }, Utc::now()).is_err());
        }
    }

    #[test]
    fn cancelling_an_assigned_job_drops_the_assignee() {
        for status in [JobStatus::Assigned, JobStatus::InProgress] {
            let job = job_in(status);
            let t = plan(&job, admin(), JobAction::Cancel { reason: Some("duplicate".into()) }, Utc::now()).unwrap();
            assert!(t.patch.clear_freelancer);
            assert_eq!(t.patch.assigned_freelancer_id, None);
            assert_eq!(t.patch.cancel_reason.as_deref(), Some("duplicate"));
        }
    }

    #[test]
    fn paid_jobs_cannot_be_cancelled() {
        let mut job = job_in(JobStatus::InProgress);
        job.payment_confirmed = true;
        assert!(matches!(
            plan(&job, owner(&job), JobAction::Cancel { reason: None }, Utc::now()),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn freelancer_cannot_cancel() {
        let job = job_in(JobStatus::InProgress);
        assert!(plan(&job, assignee(&job), JobAction::Cancel { reason: None }, Utc::now()).is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        let job = job_in(JobStatus::Cancelled);
        for action in [
            JobAction::Approve,
            JobAction::Deliver,
            JobAction::Assign { freelancer_id: Uuid::new_v4() },
        ] {
            assert!(plan(&job, admin(), action, Utc::now()).is_err());
        }
    }

    #[test]
    fn freelancers_only_see_open_or_own_jobs() {
        let open = job_in(JobStatus::Approved);
        assert!(can_view(&open, Actor::Freelancer(Uuid::new_v4())));

        let taken = job_in(JobStatus::InProgress);
        assert!(can_view(&taken, assignee(&taken)));
        assert!(!can_view(&taken, Actor::Freelancer(Uuid::new_v4())));
        assert!(!can_view(&taken, Actor::Client(Uuid::new_v4())));
    }
}
