// dtos/biddtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBidDto {
    pub job_id: Uuid,
    #[validate(range(min = 1, message = "Bid amount must be positive"))]
    pub bid_amount_cents: i64,
    #[validate(length(max = 2000, message = "Message is too long"))]
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidQueryDto {
    pub job_id: Option<Uuid>,
}
