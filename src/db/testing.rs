//! Fixtures for tests that need Postgres. They run only when
//! `TEST_DATABASE_URL` points at a scratch database; otherwise `test_db`
//! returns `None` and the test returns early.

use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{
    jobdb::{JobExt, NewJob},
    userdb::UserExt,
    DBClient,
};
use crate::{
    models::{
        jobmodel::{Job, ServiceType, UploadType},
        usermodel::{User, UserRole},
    },
    service::{
        event_bus::EventBus,
        job_lifecycle::{Actor, JobAction},
        job_service::JobService,
    },
};

pub async fn test_db() -> Option<Arc<DBClient>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("TEST_DATABASE_URL is reachable");

    let db_client = DBClient::new(pool);
    db_client.apply_migrations().await.expect("migrations apply");
    Some(Arc::new(db_client))
}

/// Auto-approval timers are an hour out; tests call `auto_approve` directly.
pub fn job_service(db_client: &Arc<DBClient>) -> Arc<JobService> {
    Arc::new(JobService::new(
        db_client.clone(),
        Arc::new(EventBus::new()),
        Duration::from_secs(3600),
    ))
}

pub async fn seed_user(db_client: &DBClient, role: UserRole) -> User {
    let email = format!("{}@scribehub.test", Uuid::new_v4().simple());
    db_client
        .save_user("Test User".to_string(), email, None, "unused-hash".to_string(), role, true)
        .await
        .expect("user saved")
}

pub struct Parties {
    pub client: User,
    pub freelancer: User,
    pub admin: User,
}

impl Parties {
    pub async fn seed(db_client: &DBClient) -> Self {
        Parties {
            client: seed_user(db_client, UserRole::Client).await,
            freelancer: seed_user(db_client, UserRole::Freelancer).await,
            admin: seed_user(db_client, UserRole::Admin).await,
        }
    }

    pub fn admin(&self) -> Actor {
        Actor::Admin(self.admin.id)
    }

    pub fn client(&self) -> Actor {
        Actor::Client(self.client.id)
    }

    pub fn freelancer(&self) -> Actor {
        Actor::Freelancer(self.freelancer.id)
    }
}

/// Four-page essay worth KSh 1,000, due in ten hours.
pub async fn seed_job(db_client: &DBClient, client: &User) -> Job {
    let now = Utc::now();
    let (job, _) = db_client
        .save_job(NewJob {
            client_id: client.id,
            title: "Supply chain resilience essay".to_string(),
            instructions: "Four pages, APA referencing".to_string(),
            work_type: ServiceType::Essay,
            quantity: 4.0,
            amount_cents: 100_000,
            deadline: now + ChronoDuration::hours(10),
            freelancer_deadline: now + ChronoDuration::hours(6),
            idempotency_key: None,
        })
        .await
        .expect("job saved");
    job
}

pub async fn approved_job(jobs: &Arc<JobService>, db_client: &DBClient, parties: &Parties) -> Job {
    let job = seed_job(db_client, &parties.client).await;
    jobs.transition(parties.admin(), job.id, JobAction::Approve, None)
        .await
        .expect("job approved")
}

pub async fn assigned_job(jobs: &Arc<JobService>, db_client: &DBClient, parties: &Parties) -> Job {
    let job = approved_job(jobs, db_client, parties).await;
    jobs.transition(
        parties.admin(),
        job.id,
        JobAction::Assign {
            freelancer_id: parties.freelancer.id,
        },
        None,
    )
    .await
    .expect("job assigned")
}

/// Walks a job through start, upload, submit and delivery.
pub async fn delivered_job(jobs: &Arc<JobService>, db_client: &DBClient, parties: &Parties) -> Job {
    let job = assigned_job(jobs, db_client, parties).await;

    jobs.transition(parties.freelancer(), job.id, JobAction::Start, None)
        .await
        .expect("job started");

    db_client
        .save_attachment(
            job.id,
            parties.freelancer.id,
            UserRole::Freelancer,
            "draft.docx",
            "https://files.scribehub.test/draft.docx",
            UploadType::Initial,
        )
        .await
        .expect("draft uploaded");

    jobs.transition(parties.freelancer(), job.id, JobAction::Submit { has_work: false }, None)
        .await
        .expect("job submitted");

    jobs.transition(parties.admin(), job.id, JobAction::Deliver, None)
        .await
        .expect("job delivered")
}
