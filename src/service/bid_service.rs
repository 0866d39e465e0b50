// service/bid_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{
        biddb::{accept_bid_tx, lock_bid_tx, BidExt},
        jobdb::lock_job_tx,
        DBClient,
    },
    dtos::biddtos::CreateBidDto,
    models::{
        bidmodel::{Bid, BidStatus},
        jobmodel::{Job, JobStatus},
        usermodel::{User, UserRole},
    },
    service::{
        error::ServiceError,
        event_bus::{EventBus, JobEventKind},
        job_lifecycle::{Actor, JobAction},
        job_service::JobService,
        pricing,
    },
};

#[derive(Debug, Clone)]
pub struct BidService {
    db_client: Arc<DBClient>,
    job_service: Arc<JobService>,
    event_bus: Arc<EventBus>,
}

/// Cheapest first; ties go to the earliest bid.
pub fn rank_bids(mut bids: Vec<Bid>) -> Vec<Bid> {
    bids.sort_by(|a, b| {
        a.bid_amount_cents
            .cmp(&b.bid_amount_cents)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    bids
}

/// A bid may not exceed what the freelancer would be paid for the job.
pub fn check_bid_amount(job: &Job, bid_amount_cents: i64) -> Result<(), ServiceError> {
    let ceiling = pricing::payout_share_cents(job.amount_cents);
    if bid_amount_cents <= 0 || bid_amount_cents > ceiling {
        return Err(ServiceError::Validation(format!(
            "Bid must be between 1 and {} cents",
            ceiling
        )));
    }
    Ok(())
}

fn is_open_for_bids(job: &Job) -> bool {
    job.status == JobStatus::Approved && job.assigned_freelancer_id.is_none()
}

impl BidService {
    pub fn new(db_client: Arc<DBClient>, job_service: Arc<JobService>, event_bus: Arc<EventBus>) -> Self {
        Self {
            db_client,
            job_service,
            event_bus,
        }
    }

    pub async fn place_bid(&self, freelancer: &User, body: CreateBidDto) -> Result<Bid, ServiceError> {
        if freelancer.role() != UserRole::Freelancer {
            return Err(ServiceError::Forbidden("Only freelancers can bid".to_string()));
        }
        if !freelancer.approved || !freelancer.is_active() {
            return Err(ServiceError::Forbidden(
                "Freelancer must be approved and active to bid".to_string(),
            ));
        }

        let job = self.job_service.get_job(body.job_id).await?;
        if !is_open_for_bids(&job) {
            return Err(ServiceError::InvalidJobStatus(job.id, "accept bids", job.status));
        }
        check_bid_amount(&job, body.bid_amount_cents)?;

        let message = body.message.trim();
        let bid = self
            .db_client
            .save_bid(job.id, freelancer.id, body.bid_amount_cents, message)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    ServiceError::Conflict("You have already bid on this job".to_string())
                }
                e => ServiceError::Database(e),
            })?;

        tracing::info!("Freelancer {} bid {} on job {}", freelancer.id, bid.bid_amount_cents, job.display_id);
        Ok(bid)
    }

    /// Admins see every bid on a job ranked; freelancers see their own.
    pub async fn list_bids(&self, viewer: &User, job_id: Option<Uuid>) -> Result<Vec<Bid>, ServiceError> {
        match viewer.role() {
            UserRole::Admin | UserRole::AccountOwner => {
                let bids = self.db_client.get_bids(job_id, None).await?;
                Ok(rank_bids(bids))
            }
            UserRole::Freelancer => Ok(self.db_client.get_bids(job_id, Some(viewer.id)).await?),
            UserRole::Client => Err(ServiceError::Forbidden("Clients cannot view bids".to_string())),
        }
    }

    /// Accepts a bid and assigns its freelancer in one transaction. The other
    /// pending bids on the job are rejected.
    pub async fn accept_bid(&self, admin: &User, bid_id: Uuid) -> Result<(Job, Bid), ServiceError> {
        if !admin.is_admin() {
            return Err(ServiceError::Forbidden("Only admins can accept bids".to_string()));
        }

        let bid = self
            .db_client
            .get_bid(bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        let mut tx = self.db_client.begin().await?;

        let job = lock_job_tx(&mut tx, bid.job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(bid.job_id))?;

        let bid = lock_bid_tx(&mut tx, bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        if bid.status != BidStatus::Pending {
            return Err(ServiceError::Conflict(format!("Bid {} is no longer pending", bid_id)));
        }
        // The price may have changed since the bid was placed.
        check_bid_amount(&job, bid.bid_amount_cents)?;

        let updated = self
            .job_service
            .transition_in_tx(
                &mut tx,
                &job,
                Actor::from_user(admin),
                JobAction::Assign {
                    freelancer_id: bid.freelancer_id,
                },
                Some(bid.id),
            )
            .await?;
        let accepted = accept_bid_tx(&mut tx, bid.id).await?;

        tx.commit().await?;

        tracing::info!("Bid {} accepted; job {} assigned", accepted.id, updated.display_id);
        self.event_bus.publish(JobEventKind::JobUpdated, &updated);

        Ok((updated, accepted))
    }
}
