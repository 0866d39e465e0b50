// models/messagemodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::usermodel::UserRole;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "message_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Link,
    File,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Message {
    pub id: Uuid,
    pub job_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub kind: MessageKind,
    pub content: String,
    pub admin_approved: bool,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
