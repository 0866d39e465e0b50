// dtos/paymentdtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::paymentmodel::{PaymentMethod, PaymentRequestStatus, PaymentStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StkPushDto {
    pub job_id: Uuid,
    #[validate(length(min = 9, max = 16, message = "Phone number is required"))]
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StkQueryDto {
    #[validate(length(min = 1, message = "CheckoutRequestID is required"))]
    pub checkout_request_id: String,
}

/// Payment made outside the push flow, confirmed later by an admin.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManualPaymentDto {
    pub job_id: Uuid,
    #[validate(length(min = 6, max = 32, message = "M-Pesa code is invalid"))]
    pub mpesa_code: String,
    #[validate(length(min = 9, max = 16, message = "Phone number is required"))]
    pub phone_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ConfirmPaymentDto {
    #[validate(length(min = 6, max = 32, message = "M-Pesa code is invalid"))]
    pub mpesa_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RejectDto {
    #[validate(length(min = 1, message = "A reason is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQueryDto {
    pub job_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePaymentRequestDto {
    #[validate(range(min = 100, message = "Amount must be at least KSh 1"))]
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub phone_number: Option<String>,
    #[validate(length(min = 1, max = 64, message = "Transaction reference is required"))]
    pub transaction_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestQueryDto {
    pub status: Option<PaymentRequestStatus>,
}
