// service/settlement_service.rs
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::{
        jobdb::{lock_job_tx, mark_payment_confirmed_tx, JobExt},
        paymentdb::{
            confirm_payment_tx, lock_payment_request_tx, lock_payment_tx, resolve_payment_request_tx,
            NewPayment, PaymentExt,
        },
        userdb::{add_client_spend_tx, credit_balance_tx, credit_freelancer_tx, lock_users_tx},
        DBClient,
    },
    dtos::paymentdtos::{CreatePaymentRequestDto, ManualPaymentDto, StkPushDto},
    models::{
        jobmodel::{Job, JobStatus},
        paymentmodel::{Payment, PaymentRequest, PaymentRequestStatus, PaymentStatus},
        usermodel::{User, UserRole},
    },
    service::{
        error::ServiceError,
        event_bus::{EventBus, JobEventKind},
        job_service::JobService,
        mpesa::{self, PollOutcome, PushPaymentGateway, PushStatus, StkPushRequest},
        pricing,
    },
    utils::{currency::round_to_whole_shilling, phone::normalize_msisdn},
};

/// What a gateway answer means for the stored payment.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Confirm { receipt: Option<String> },
    Fail { reason: String },
    Leave,
}

impl From<PushStatus> for Resolution {
    fn from(status: PushStatus) -> Self {
        match status {
            PushStatus::Succeeded { receipt } => Resolution::Confirm { receipt },
            PushStatus::Failed { code, reason } => Resolution::Fail {
                reason: format!("{} (code {})", reason, code),
            },
            PushStatus::Pending => Resolution::Leave,
        }
    }
}

impl From<PollOutcome> for Resolution {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Succeeded { receipt } => Resolution::Confirm { receipt },
            PollOutcome::Failed { code, reason } => Resolution::Fail {
                reason: format!("{} (code {})", reason, code),
            },
            PollOutcome::TimedOut { .. } => Resolution::Leave,
        }
    }
}

/// Amount pushed to the handset, in whole shillings.
pub fn push_amount_shillings(amount_cents: i64) -> i64 {
    round_to_whole_shilling(amount_cents) / 100
}

/// A job takes payment once it has been delivered by its assignee.
fn ensure_payable(job: &Job, client: &User) -> Result<(), ServiceError> {
    if job.client_id != client.id {
        return Err(ServiceError::UnauthorizedJobAccess(client.id, job.id));
    }
    if job.payment_confirmed {
        return Err(ServiceError::Conflict(format!("Job {} is already paid", job.display_id)));
    }
    if job.status != JobStatus::Delivered || job.assigned_freelancer_id.is_none() {
        return Err(ServiceError::InvalidJobStatus(job.id, "take payment", job.status));
    }
    Ok(())
}

/// A callback is only a hint. The status query decides, and the callback
/// may only contribute the receipt number.
pub fn verified_resolution(claimed: PushStatus, verified: PushStatus) -> Resolution {
    match (claimed, verified) {
        (PushStatus::Succeeded { receipt: claimed }, PushStatus::Succeeded { receipt }) => {
            Resolution::Confirm {
                receipt: receipt.or(claimed),
            }
        }
        (_, verified) => verified.into(),
    }
}

pub struct SettlementService {
    db_client: Arc<DBClient>,
    job_service: Arc<JobService>,
    gateway: Arc<dyn PushPaymentGateway>,
    event_bus: Arc<EventBus>,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl std::fmt::Debug for SettlementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementService")
            .field("poll_interval", &self.poll_interval)
            .field("poll_max_attempts", &self.poll_max_attempts)
            .finish()
    }
}

impl SettlementService {
    pub fn new(
        db_client: Arc<DBClient>,
        job_service: Arc<JobService>,
        gateway: Arc<dyn PushPaymentGateway>,
        event_bus: Arc<EventBus>,
        poll_interval: Duration,
        poll_max_attempts: u32,
    ) -> Self {
        Self {
            db_client,
            job_service,
            gateway,
            event_bus,
            poll_interval,
            poll_max_attempts,
        }
    }

    pub async fn initiate_stk_push(
        self: &Arc<Self>,
        client: &User,
        body: StkPushDto,
        idempotency_key: Option<String>,
    ) -> Result<Payment, ServiceError> {
        let job = self.job_service.get_job(body.job_id).await?;
        ensure_payable(&job, client)?;

        let phone_number = normalize_msisdn(&body.phone_number).map_err(ServiceError::Validation)?;
        let amount = push_amount_shillings(job.amount_cents);

        let (payment, created) = self
            .db_client
            .save_payment(NewPayment {
                job_id: job.id,
                client_id: client.id,
                freelancer_id: job.assigned_freelancer_id,
                amount_cents: amount * 100,
                mpesa_code: None,
                phone_number: phone_number.clone(),
                idempotency_key,
            })
            .await?;

        if !created {
            tracing::debug!("Replayed push payment {} for job {}", payment.id, job.display_id);
            return Ok(payment);
        }

        let request = StkPushRequest {
            phone_number,
            amount,
            account_reference: job.display_id.clone(),
            description: format!("Payment for {}", job.display_id),
        };

        let accepted = match self.gateway.initiate(&request).await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.db_client.fail_payment(payment.id, &e.to_string()).await?;
                return Err(e);
            }
        };

        let payment = self
            .db_client
            .set_checkout_request_id(payment.id, &accepted.checkout_request_id)
            .await?;

        tracing::info!(
            "STK push {} sent for job {} ({} KSh)",
            accepted.checkout_request_id,
            job.display_id,
            amount
        );
        self.spawn_poller(payment.id, accepted.checkout_request_id);

        Ok(payment)
    }

    fn spawn_poller(self: &Arc<Self>, payment_id: Uuid, checkout_request_id: String) {
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let outcome = mpesa::poll_until_resolved(
                service.gateway.as_ref(),
                &checkout_request_id,
                service.poll_interval,
                service.poll_max_attempts,
            )
            .await;

            if let PollOutcome::TimedOut { attempts } = &outcome {
                tracing::warn!(
                    "Push {} unresolved after {} queries; left pending for reconciliation",
                    checkout_request_id,
                    attempts
                );
            }

            if let Err(e) = service.resolve(payment_id, outcome.into()).await {
                tracing::error!("Failed to settle payment {}: {}", payment_id, e);
            }
        });
    }

    async fn resolve(&self, payment_id: Uuid, resolution: Resolution) -> Result<Option<Payment>, ServiceError> {
        match resolution {
            Resolution::Confirm { receipt } => {
                let payment = self.confirm_payment(false, payment_id, receipt.as_deref()).await?;
                Ok(Some(payment))
            }
            Resolution::Fail { reason } => {
                let failed = self.db_client.fail_payment(payment_id, &reason).await?;
                if let Some(payment) = &failed {
                    tracing::info!("Payment {} failed: {}", payment.id, reason);
                    if let Some(job) = self.db_client.get_job(payment.job_id).await? {
                        self.event_bus.publish(JobEventKind::PaymentUpdated, &job);
                    }
                }
                Ok(failed)
            }
            Resolution::Leave => Ok(None),
        }
    }

    /// One status query for a push the caller started.
    pub async fn query_push_status(
        &self,
        viewer: &User,
        checkout_request_id: &str,
    ) -> Result<(PushStatus, Payment), ServiceError> {
        let payment = self
            .db_client
            .get_payment_by_checkout_id(checkout_request_id)
            .await?
            .ok_or_else(|| ServiceError::PushNotFound(checkout_request_id.to_string()))?;

        if payment.client_id != viewer.id && !viewer.is_admin() {
            return Err(ServiceError::Forbidden("Not your payment".to_string()));
        }

        let status = self.gateway.query(checkout_request_id).await?;
        let payment = if payment.status == PaymentStatus::Pending {
            self.resolve(payment.id, status.clone().into())
                .await?
                .unwrap_or(payment)
        } else {
            payment
        };

        Ok((status, payment))
    }

    /// Applies a Daraja callback after checking it against a status query.
    /// Errors are logged; the gateway is always acknowledged.
    pub async fn handle_callback(&self, body: &Value) {
        let result = match mpesa::parse_callback(body) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Ignoring malformed M-Pesa callback: {}", e);
                return;
            }
        };

        let payment = match self
            .db_client
            .get_payment_by_checkout_id(&result.checkout_request_id)
            .await
        {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::warn!("Callback for unknown push {}", result.checkout_request_id);
                return;
            }
            Err(e) => {
                tracing::error!("Callback lookup failed: {}", e);
                return;
            }
        };

        if payment.status != PaymentStatus::Pending {
            tracing::debug!("Callback for already settled payment {}", payment.id);
            return;
        }

        let verified = match self.gateway.query(&result.checkout_request_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    "Could not verify callback for {}: {}; left to the poller",
                    result.checkout_request_id,
                    e
                );
                return;
            }
        };

        if verified != result.status && verified == PushStatus::Pending {
            tracing::warn!(
                "Callback for {} claims {:?} but the gateway still reports pending",
                result.checkout_request_id,
                result.status
            );
        }

        if let Err(e) = self.resolve(payment.id, verified_resolution(result.status, verified)).await {
            tracing::error!("Callback settlement of payment {} failed: {}", payment.id, e);
        }
    }

    pub async fn record_manual_payment(&self, client: &User, body: ManualPaymentDto) -> Result<Payment, ServiceError> {
        let job = self.job_service.get_job(body.job_id).await?;
        ensure_payable(&job, client)?;

        let phone_number = normalize_msisdn(&body.phone_number).map_err(ServiceError::Validation)?;

        let (payment, _) = self
            .db_client
            .save_payment(NewPayment {
                job_id: job.id,
                client_id: client.id,
                freelancer_id: job.assigned_freelancer_id,
                amount_cents: job.amount_cents,
                mpesa_code: Some(body.mpesa_code.trim().to_uppercase()),
                phone_number,
                idempotency_key: None,
            })
            .await?;

        tracing::info!("Manual payment {} recorded for job {}", payment.id, job.display_id);
        Ok(payment)
    }

    /// Confirms a payment and credits both parties atomically. Confirming an
    /// already confirmed payment returns it unchanged.
    pub async fn confirm_payment(
        &self,
        by_admin: bool,
        payment_id: Uuid,
        mpesa_code: Option<&str>,
    ) -> Result<Payment, ServiceError> {
        let mut tx = self.db_client.begin().await?;

        let payment = lock_payment_tx(&mut tx, payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        match payment.status {
            PaymentStatus::Confirmed => return Ok(payment),
            PaymentStatus::Failed if !by_admin => {
                return Err(ServiceError::Conflict(format!("Payment {} has already failed", payment_id)));
            }
            _ => {}
        }

        let job = lock_job_tx(&mut tx, payment.job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(payment.job_id))?;

        if job.payment_confirmed {
            return Err(ServiceError::Conflict(format!(
                "Job {} already has a confirmed payment",
                job.display_id
            )));
        }

        let Some(freelancer_id) = job.assigned_freelancer_id else {
            return Err(ServiceError::InvalidJobStatus(job.id, "settle payment", job.status));
        };

        lock_users_tx(&mut tx, &[job.client_id, freelancer_id]).await?;

        let confirmed = confirm_payment_tx(&mut tx, payment.id, by_admin, mpesa_code).await?;
        let job = mark_payment_confirmed_tx(&mut tx, job.id).await?;

        credit_freelancer_tx(&mut tx, freelancer_id, pricing::payout_share_cents(job.amount_cents)).await?;
        add_client_spend_tx(&mut tx, job.client_id, confirmed.amount_cents).await?;

        tx.commit().await?;

        tracing::info!(
            "Payment {} confirmed for job {}{}",
            confirmed.id,
            job.display_id,
            if by_admin { " by admin" } else { "" }
        );
        self.event_bus.publish(JobEventKind::PaymentUpdated, &job);

        if job.status == JobStatus::Delivered {
            self.job_service.schedule_auto_approve(job.id);
        }

        Ok(confirmed)
    }

    pub async fn reject_payment(&self, payment_id: Uuid, reason: &str) -> Result<Payment, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation("A rejection reason is required".to_string()));
        }

        match self.db_client.fail_payment(payment_id, reason).await? {
            Some(payment) => Ok(payment),
            None => match self.db_client.get_payment(payment_id).await? {
                Some(_) => Err(ServiceError::Conflict(format!("Payment {} is already resolved", payment_id))),
                None => Err(ServiceError::PaymentNotFound(payment_id)),
            },
        }
    }

    pub async fn list_payments(
        &self,
        viewer: &User,
        job_id: Option<Uuid>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, ServiceError> {
        let client_id = match viewer.role() {
            UserRole::Client => Some(viewer.id),
            UserRole::Admin | UserRole::AccountOwner => None,
            UserRole::Freelancer => {
                return Err(ServiceError::Forbidden("Freelancers cannot view payments".to_string()))
            }
        };

        Ok(self.db_client.get_payments(client_id, job_id, status).await?)
    }

    /// Pending pushes left behind by a restart get one status query each.
    pub async fn reconcile_pending_pushes(&self) -> Result<usize, ServiceError> {
        let pending = self
            .db_client
            .get_payments(None, None, Some(PaymentStatus::Pending))
            .await?;

        let mut resolved = 0;
        for payment in pending {
            let Some(checkout_request_id) = payment.checkout_request_id.as_deref() else {
                continue;
            };

            match self.gateway.query(checkout_request_id).await {
                Ok(status) => {
                    if self.resolve(payment.id, status.into()).await?.is_some() {
                        resolved += 1;
                    }
                }
                Err(e) => tracing::warn!("Reconciliation query for {} failed: {}", checkout_request_id, e),
            }
        }

        Ok(resolved)
    }

    pub async fn create_payment_request(
        &self,
        client: &User,
        body: CreatePaymentRequestDto,
    ) -> Result<PaymentRequest, ServiceError> {
        if client.role() != UserRole::Client {
            return Err(ServiceError::Forbidden("Only clients can top up".to_string()));
        }

        let phone_number = body
            .phone_number
            .as_deref()
            .map(normalize_msisdn)
            .transpose()
            .map_err(ServiceError::Validation)?;

        let request = self
            .db_client
            .save_payment_request(
                client.id,
                body.amount_cents,
                body.payment_method,
                phone_number,
                body.transaction_reference.trim(),
            )
            .await?;

        tracing::info!("Payment request {} created by {}", request.id, client.id);
        Ok(request)
    }

    pub async fn list_payment_requests(
        &self,
        viewer: &User,
        status: Option<PaymentRequestStatus>,
    ) -> Result<Vec<PaymentRequest>, ServiceError> {
        let client_id = if viewer.is_admin() { None } else { Some(viewer.id) };
        Ok(self.db_client.get_payment_requests(client_id, status).await?)
    }

    pub async fn confirm_payment_request(&self, request_id: Uuid) -> Result<PaymentRequest, ServiceError> {
        let mut tx = self.db_client.begin().await?;

        let request = lock_payment_request_tx(&mut tx, request_id)
            .await?
            .ok_or(ServiceError::PaymentRequestNotFound(request_id))?;

        if request.status != PaymentRequestStatus::Pending {
            return Err(ServiceError::Conflict(format!("Payment request {} is already resolved", request_id)));
        }

        let confirmed =
            resolve_payment_request_tx(&mut tx, request_id, PaymentRequestStatus::Confirmed, None).await?;
        credit_balance_tx(&mut tx, request.client_id, request.amount_cents).await?;

        tx.commit().await?;

        tracing::info!("Payment request {} confirmed", request_id);
        Ok(confirmed)
    }

    pub async fn reject_payment_request(&self, request_id: Uuid, reason: &str) -> Result<PaymentRequest, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation("A rejection reason is required".to_string()));
        }

        let mut tx = self.db_client.begin().await?;

        let request = lock_payment_request_tx(&mut tx, request_id)
            .await?
            .ok_or(ServiceError::PaymentRequestNotFound(request_id))?;

        if request.status != PaymentRequestStatus::Pending {
            return Err(ServiceError::Conflict(format!("Payment request {} is already resolved", request_id)));
        }

        let rejected =
            resolve_payment_request_tx(&mut tx, request_id, PaymentRequestStatus::Rejected, Some(reason)).await?;
        tx.commit().await?;

        Ok(rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{
            testing::{self, assigned_job, delivered_job, test_db, Parties},
            userdb::UserExt,
        },
        models::usermodel::{ClientTier, RoleProfile, UserStatus},
        service::{
            job_lifecycle::{tests::job_in, JobAction},
            mpesa::tests::FakeGateway,
        },
    };
    use chrono::Utc;
    use serde_json::json;

    fn client_for(job: &Job) -> User {
        User {
            id: job.client_id,
            display_id: "CL-TEST01".into(),
            email: "c@example.com".into(),
            name: "C".into(),
            phone: None,
            password: String::new(),
            approved: true,
            status: UserStatus::Active,
            balance_cents: 0,
            rating: 0.0,
            completed_jobs: 0,
            profile_picture_url: None,
            profile: RoleProfile::Client {
                client_tier: ClientTier::Basic,
                client_priority: None,
                total_spent_cents: 0,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn push_amount_rounds_to_whole_shillings() {
        assert_eq!(push_amount_shillings(100_000), 1_000);
        assert_eq!(push_amount_shillings(100_049), 1_000);
        assert_eq!(push_amount_shillings(100_050), 1_001);
    }

    #[test]
    fn paid_or_foreign_jobs_are_not_payable() {
        let mut job = job_in(JobStatus::Delivered);
        let client = client_for(&job);
        assert!(ensure_payable(&job, &client).is_ok());

        let mut stranger = client_for(&job);
        stranger.id = Uuid::new_v4();
        assert!(matches!(
            ensure_payable(&job, &stranger),
            Err(ServiceError::UnauthorizedJobAccess(..))
        ));

        job.payment_confirmed = true;
        assert!(matches!(ensure_payable(&job, &client), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn jobs_take_payment_only_once_delivered_by_an_assignee() {
        for status in [JobStatus::Pending, JobStatus::Approved, JobStatus::Assigned, JobStatus::InProgress] {
            let job = job_in(status);
            let client = client_for(&job);
            assert!(matches!(
                ensure_payable(&job, &client),
                Err(ServiceError::InvalidJobStatus(_, "take payment", _))
            ));
        }

        let mut job = job_in(JobStatus::Delivered);
        job.assigned_freelancer_id = None;
        assert!(ensure_payable(&job, &client_for(&job)).is_err());
    }

    #[test]
    fn callback_success_needs_gateway_agreement() {
        let claimed = PushStatus::Succeeded {
            receipt: Some("NLJ7RT61SV".to_string()),
        };

        assert_eq!(verified_resolution(claimed.clone(), PushStatus::Pending), Resolution::Leave);
        assert_eq!(
            verified_resolution(
                claimed.clone(),
                PushStatus::Failed { code: 1032, reason: "Request cancelled by user".into() }
            ),
            Resolution::Fail {
                reason: "Request cancelled by user (code 1032)".to_string()
            }
        );
        assert_eq!(
            verified_resolution(claimed, PushStatus::Succeeded { receipt: None }),
            Resolution::Confirm {
                receipt: Some("NLJ7RT61SV".to_string())
            }
        );
    }

    #[test]
    fn forged_failure_cannot_fail_a_settled_push() {
        let claimed = PushStatus::Failed { code: 1, reason: "Insufficient funds".into() };
        let verified = PushStatus::Succeeded { receipt: Some("NLJ7RT61SV".into()) };
        assert_eq!(
            verified_resolution(claimed, verified),
            Resolution::Confirm {
                receipt: Some("NLJ7RT61SV".to_string())
            }
        );
    }

    #[tokio::test]
    async fn poller_success_confirms_with_receipt() {
        let gateway = FakeGateway::new(
            3,
            PushStatus::Succeeded {
                receipt: Some("NLJ7RT61SV".to_string()),
            },
        );
        let outcome = mpesa::poll_until_resolved(&gateway, "ws_CO_1", Duration::from_millis(1), 90).await;

        assert_eq!(
            Resolution::from(outcome),
            Resolution::Confirm {
                receipt: Some("NLJ7RT61SV".to_string())
            }
        );
    }

    #[tokio::test]
    async fn exhausted_poller_leaves_payment_pending() {
        let gateway = FakeGateway::new(u32::MAX, PushStatus::Pending);
        let outcome = mpesa::poll_until_resolved(&gateway, "ws_CO_1", Duration::from_millis(1), 5).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
        assert_eq!(Resolution::from(outcome), Resolution::Leave);
    }

    #[test]
    fn cancelled_push_fails_the_payment() {
        let resolution = Resolution::from(PushStatus::Failed {
            code: 1032,
            reason: "Request cancelled by user".to_string(),
        });
        assert_eq!(
            resolution,
            Resolution::Fail {
                reason: "Request cancelled by user (code 1032)".to_string()
            }
        );
    }

    fn settlement(db_client: &Arc<DBClient>, jobs: &Arc<JobService>, gateway: FakeGateway) -> Arc<SettlementService> {
        Arc::new(SettlementService::new(
            db_client.clone(),
            jobs.clone(),
            Arc::new(gateway),
            Arc::new(EventBus::new()),
            Duration::from_millis(1),
            1,
        ))
    }

    fn success_callback(checkout_request_id: &str) -> Value {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": checkout_request_id,
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 1000 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
                        ]
                    }
                }
            }
        })
    }

    fn manual(job: &Job, mpesa_code: &str) -> ManualPaymentDto {
        ManualPaymentDto {
            job_id: job.id,
            mpesa_code: mpesa_code.to_string(),
            phone_number: "0712345678".to_string(),
        }
    }

    async fn balance_of(db_client: &DBClient, user_id: Uuid) -> i64 {
        let user = db_client.get_user(Some(user_id), None).await.unwrap().unwrap();
        user.balance_cents
    }

    #[tokio::test]
    async fn forged_success_callback_leaves_the_push_pending() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let settlement = settlement(&db_client, &jobs, FakeGateway::new(1, PushStatus::Pending));
        let parties = Parties::seed(&db_client).await;

        let job = delivered_job(&jobs, &db_client, &parties).await;
        let payment = settlement
            .initiate_stk_push(
                &parties.client,
                StkPushDto {
                    job_id: job.id,
                    phone_number: "0712345678".to_string(),
                },
                None,
            )
            .await
            .unwrap();
        let checkout_request_id = payment.checkout_request_id.clone().unwrap();

        settlement.handle_callback(&success_callback(&checkout_request_id)).await;

        let payment = db_client.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(!jobs.get_job(job.id).await.unwrap().payment_confirmed);
        assert_eq!(balance_of(&db_client, parties.freelancer.id).await, 0);
    }

    #[tokio::test]
    async fn verified_callback_settles_the_push_once() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let gateway = FakeGateway::new(
            1,
            PushStatus::Succeeded {
                receipt: Some("NLJ7RT61SV".to_string()),
            },
        );
        let settlement = settlement(&db_client, &jobs, gateway);
        let parties = Parties::seed(&db_client).await;

        let job = delivered_job(&jobs, &db_client, &parties).await;
        let payment = settlement
            .initiate_stk_push(
                &parties.client,
                StkPushDto {
                    job_id: job.id,
                    phone_number: "0712345678".to_string(),
                },
                None,
            )
            .await
            .unwrap();
        let callback = success_callback(payment.checkout_request_id.as_deref().unwrap());

        settlement.handle_callback(&callback).await;
        settlement.handle_callback(&callback).await;

        let payment = db_client.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        assert!(jobs.get_job(job.id).await.unwrap().payment_confirmed);
        assert_eq!(balance_of(&db_client, parties.freelancer.id).await, 70_000);
    }

    #[tokio::test]
    async fn a_job_settles_exactly_one_payment() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let settlement = settlement(&db_client, &jobs, FakeGateway::new(1, PushStatus::Pending));
        let parties = Parties::seed(&db_client).await;

        let job = delivered_job(&jobs, &db_client, &parties).await;
        let first = settlement
            .record_manual_payment(&parties.client, manual(&job, "NLJ7RT61SV"))
            .await
            .unwrap();
        let second = settlement
            .record_manual_payment(&parties.client, manual(&job, "NLJ7RT61SW"))
            .await
            .unwrap();

        let confirmed = settlement.confirm_payment(true, first.id, None).await.unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Confirmed);

        let again = settlement.confirm_payment(true, first.id, None).await.unwrap();
        assert_eq!(again.id, confirmed.id);
        assert_eq!(balance_of(&db_client, parties.freelancer.id).await, 70_000);

        let err = settlement.confirm_payment(true, second.id, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let second = db_client.get_payment(second.id).await.unwrap().unwrap();
        assert_eq!(second.status, PaymentStatus::Pending);

        let late = settlement
            .record_manual_payment(&parties.client, manual(&job, "NLJ7RT61SX"))
            .await;
        assert!(matches!(late, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn undelivered_jobs_take_no_payment() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let settlement = settlement(&db_client, &jobs, FakeGateway::new(1, PushStatus::Pending));
        let parties = Parties::seed(&db_client).await;

        let open = testing::seed_job(&db_client, &parties.client).await;
        let err = settlement
            .record_manual_payment(&parties.client, manual(&open, "NLJ7RT61SV"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJobStatus(_, "take payment", JobStatus::Pending)));

        let assigned = assigned_job(&jobs, &db_client, &parties).await;
        let err = settlement
            .initiate_stk_push(
                &parties.client,
                StkPushDto {
                    job_id: assigned.id,
                    phone_number: "0712345678".to_string(),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidJobStatus(_, "take payment", JobStatus::Assigned)));
        assert!(db_client.get_payments(None, Some(assigned.id), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn paid_delivery_auto_approves_once() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let settlement = settlement(&db_client, &jobs, FakeGateway::new(1, PushStatus::Pending));
        let parties = Parties::seed(&db_client).await;

        let job = delivered_job(&jobs, &db_client, &parties).await;
        let payment = settlement
            .record_manual_payment(&parties.client, manual(&job, "NLJ7RT61SV"))
            .await
            .unwrap();
        settlement.confirm_payment(true, payment.id, None).await.unwrap();

        let (a, b) = tokio::join!(jobs.auto_approve(job.id), jobs.auto_approve(job.id));
        let completions = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(completions, 1);

        let job = jobs.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.client_approved);

        for user_id in [parties.client.id, parties.freelancer.id] {
            let user = db_client.get_user(Some(user_id), None).await.unwrap().unwrap();
            assert_eq!(user.completed_jobs, 1);
        }
    }

    #[tokio::test]
    async fn completion_and_settlement_share_user_locks_safely() {
        let Some(db_client) = test_db().await else { return };
        let jobs = testing::job_service(&db_client);
        let settlement = settlement(&db_client, &jobs, FakeGateway::new(1, PushStatus::Pending));
        let parties = Parties::seed(&db_client).await;

        let paid = delivered_job(&jobs, &db_client, &parties).await;
        let payment = settlement
            .record_manual_payment(&parties.client, manual(&paid, "NLJ7RT61SV"))
            .await
            .unwrap();
        settlement.confirm_payment(true, payment.id, None).await.unwrap();

        let unpaid = delivered_job(&jobs, &db_client, &parties).await;
        let payment = settlement
            .record_manual_payment(&parties.client, manual(&unpaid, "NLJ7RT61SW"))
            .await
            .unwrap();

        let both = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(
                jobs.transition(parties.client(), paid.id, JobAction::Complete { rating: Some(5) }, None),
                settlement.confirm_payment(true, payment.id, None),
            )
        })
        .await
        .expect("user locks are taken in a consistent order");

        assert_eq!(both.0.unwrap().status, JobStatus::Completed);
        assert_eq!(both.1.unwrap().status, PaymentStatus::Confirmed);
        assert_eq!(balance_of(&db_client, parties.freelancer.id).await, 140_000);
        assert_eq!(jobs.get_job(paid.id).await.unwrap().assigned_freelancer_id, Some(parties.freelancer.id));
    }
}
