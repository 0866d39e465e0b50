// dtos/messagedtos.rs
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::messagemodel::MessageKind;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateMessageDto {
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    #[validate(length(min = 1, max = 5000, message = "Message must be between 1 and 5000 characters"))]
    pub content: String,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}
