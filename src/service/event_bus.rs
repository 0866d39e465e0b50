use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    jobmodel::{Job, JobStatus},
    usermodel::UserRole,
};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    JobCreated,
    JobUpdated,
    PaymentUpdated,
}

impl JobEventKind {
    pub fn to_str(&self) -> &str {
        match self {
            JobEventKind::JobCreated => "job_created",
            JobEventKind::JobUpdated => "job_updated",
            JobEventKind::PaymentUpdated => "payment_updated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job_id: Uuid,
    pub display_id: String,
    pub status: JobStatus,
    pub payment_confirmed: bool,
    pub version: i32,
    #[serde(skip)]
    pub client_id: Uuid,
    #[serde(skip)]
    pub assigned_freelancer_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(kind: JobEventKind, job: &Job) -> Self {
        JobEvent {
            kind,
            job_id: job.id,
            display_id: job.display_id.clone(),
            status: job.status,
            payment_confirmed: job.payment_confirmed,
            version: job.version,
            client_id: job.client_id,
            assigned_freelancer_id: job.assigned_freelancer_id,
            at: Utc::now(),
        }
    }

    pub fn visible_to(&self, user_id: Uuid, role: UserRole) -> bool {
        match role {
            UserRole::Admin | UserRole::AccountOwner => true,
            UserRole::Client => self.client_id == user_id,
            UserRole::Freelancer => {
                self.assigned_freelancer_id == Some(user_id)
                    || (self.status == JobStatus::Approved && self.assigned_freelancer_id.is_none())
            }
        }
    }
}

/// In-process fan-out of job changes to connected event streams.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventBus { sender }
    }

    pub fn publish(&self, kind: JobEventKind, job: &Job) {
        let event = JobEvent::from_job(kind, job);
        // No subscribers is not an error.
        if let Ok(receivers) = self.sender.send(event) {
            tracing::debug!("{} for job {} sent to {} streams", kind.to_str(), job.id, receivers);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::job_lifecycle::tests::job_in;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let job = job_in(JobStatus::Pending);

        bus.publish(JobEventKind::JobCreated, &job);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, job.id);
        assert_eq!(event.kind, JobEventKind::JobCreated);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(JobEventKind::JobUpdated, &job_in(JobStatus::Approved));
    }

    #[test]
    fn events_are_scoped_to_participants() {
        let job = job_in(JobStatus::InProgress);
        let event = JobEvent::from_job(JobEventKind::JobUpdated, &job);

        assert!(event.visible_to(job.client_id, UserRole::Client));
        assert!(!event.visible_to(Uuid::new_v4(), UserRole::Client));
        assert!(event.visible_to(job.assigned_freelancer_id.unwrap(), UserRole::Freelancer));
        assert!(!event.visible_to(Uuid::new_v4(), UserRole::Freelancer));
        assert!(event.visible_to(Uuid::new_v4(), UserRole::Admin));
    }

    #[test]
    fn open_jobs_reach_every_freelancer() {
        let event = JobEvent::from_job(JobEventKind::JobUpdated, &job_in(JobStatus::Approved));
        assert!(event.visible_to(Uuid::new_v4(), UserRole::Freelancer));
        assert!(serde_json::to_value(&event).unwrap().get("client_id").is_none());
    }
}
