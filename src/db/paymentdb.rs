// db/paymentdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{DBClient, PgTx};
use crate::models::paymentmodel::{
    Payment, PaymentMethod, PaymentRequest, PaymentRequestStatus, PaymentStatus,
};

pub struct NewPayment {
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Option<Uuid>,
    pub amount_cents: i64,
    pub mpesa_code: Option<String>,
    pub phone_number: String,
    pub idempotency_key: Option<String>,
}

#[async_trait]
pub trait PaymentExt {
    /// Records a payment attempt. A repeated idempotency key returns the
    /// original row and `false`.
    async fn save_payment(&self, new_payment: NewPayment) -> Result<(Payment, bool), sqlx::Error>;

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, sqlx::Error>;

    async fn get_payment_by_checkout_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error>;

    async fn get_payments(
        &self,
        client_id: Option<Uuid>,
        job_id: Option<Uuid>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, sqlx::Error>;

    async fn set_checkout_request_id(
        &self,
        payment_id: Uuid,
        checkout_request_id: &str,
    ) -> Result<Payment, sqlx::Error>;

    /// Fails a pending payment. Returns `None` if it was already resolved.
    async fn fail_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, sqlx::Error>;

    async fn save_payment_request(
        &self,
        client_id: Uuid,
        amount_cents: i64,
        payment_method: PaymentMethod,
        phone_number: Option<String>,
        transaction_reference: &str,
    ) -> Result<PaymentRequest, sqlx::Error>;

    async fn get_payment_requests(
        &self,
        client_id: Option<Uuid>,
        status: Option<PaymentRequestStatus>,
    ) -> Result<Vec<PaymentRequest>, sqlx::Error>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn save_payment(&self, new_payment: NewPayment) -> Result<(Payment, bool), sqlx::Error> {
        let inserted = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                job_id, client_id, freelancer_id, amount_cents, mpesa_code, phone_number, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (client_id, idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new_payment.job_id)
        .bind(new_payment.client_id)
        .bind(new_payment.freelancer_id)
        .bind(new_payment.amount_cents)
        .bind(&new_payment.mpesa_code)
        .bind(&new_payment.phone_number)
        .bind(&new_payment.idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(payment) = inserted {
            return Ok((payment, true));
        }

        let existing = sqlx::query_as::<_, Payment>(
            r#"SELECT * FROM payments WHERE client_id = $1 AND idempotency_key = $2"#,
        )
        .bind(new_payment.client_id)
        .bind(&new_payment.idempotency_key)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(r#"SELECT * FROM payments WHERE id = $1"#)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_payment_by_checkout_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(r#"SELECT * FROM payments WHERE checkout_request_id = $1"#)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_payments(
        &self,
        client_id: Option<Uuid>,
        job_id: Option<Uuid>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::uuid IS NULL OR job_id = $2)
              AND ($3::payment_status IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(client_id)
        .bind(job_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }

    async fn set_checkout_request_id(
        &self,
        payment_id: Uuid,
        checkout_request_id: &str,
    ) -> Result<Payment, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET checkout_request_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(checkout_request_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn fail_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET status = 'failed', failure_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    async fn save_payment_request(
        &self,
        client_id: Uuid,
        amount_cents: i64,
        payment_method: PaymentMethod,
        phone_number: Option<String>,
        transaction_reference: &str,
    ) -> Result<PaymentRequest, sqlx::Error> {
        sqlx::query_as::<_, PaymentRequest>(
            r#"
            INSERT INTO payment_requests (client_id, amount_cents, payment_method, phone_number, transaction_reference)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(client_id)
        .bind(amount_cents)
        .bind(payment_method)
        .bind(phone_number)
        .bind(transaction_reference)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_payment_requests(
        &self,
        client_id: Option<Uuid>,
        status: Option<PaymentRequestStatus>,
    ) -> Result<Vec<PaymentRequest>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRequest>(
            r#"
            SELECT * FROM payment_requests
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::payment_request_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(client_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
    }
}

pub async fn lock_payment_tx(
    tx: &mut PgTx<'_>,
    payment_id: Uuid,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(r#"SELECT * FROM payments WHERE id = $1 FOR UPDATE"#)
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn confirm_payment_tx(
    tx: &mut PgTx<'_>,
    payment_id: Uuid,
    by_admin: bool,
    mpesa_code: Option<&str>,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments SET
            status = 'confirmed',
            confirmed_by_admin = $2,
            mpesa_code = COALESCE($3, mpesa_code),
            failure_reason = NULL,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(by_admin)
    .bind(mpesa_code)
    .fetch_one(&mut **tx)
    .await
}

pub async fn lock_payment_request_tx(
    tx: &mut PgTx<'_>,
    request_id: Uuid,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRequest>(r#"SELECT * FROM payment_requests WHERE id = $1 FOR UPDATE"#)
        .bind(request_id)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn resolve_payment_request_tx(
    tx: &mut PgTx<'_>,
    request_id: Uuid,
    status: PaymentRequestStatus,
    rejection_reason: Option<&str>,
) -> Result<PaymentRequest, sqlx::Error> {
    sqlx::query_as::<_, PaymentRequest>(
        r#"
        UPDATE payment_requests SET
            status = $2,
            rejection_reason = $3,
            confirmed_at = CASE WHEN $2 = 'confirmed'::payment_request_status THEN NOW() ELSE NULL END
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(status)
    .bind(rejection_reason)
    .fetch_one(&mut **tx)
    .await
}
