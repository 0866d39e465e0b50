use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Option<Uuid>,
    pub amount_cents: i64,
    pub mpesa_code: Option<String>,
    pub phone_number: String,
    pub checkout_request_id: Option<String>,
    pub status: PaymentStatus,
    pub confirmed_by_admin: bool,
    pub failure_reason: Option<String>,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentRequestStatus {
    Pending,
    Confirmed,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    BankTransfer,
    Card,
}

/// Client wallet top-up, independent of any job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub client_id: Uuid,
    pub amount_cents: i64,
    pub status: PaymentRequestStatus,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    pub transaction_reference: String,
    pub rejection_reason: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
