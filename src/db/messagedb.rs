// db/messagedb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::DBClient;
use crate::models::{
    messagemodel::{Message, MessageKind},
    usermodel::UserRole,
};

#[async_trait]
pub trait MessageExt {
    async fn save_message(
        &self,
        job_id: Uuid,
        sender_id: Uuid,
        sender_role: UserRole,
        kind: MessageKind,
        content: &str,
        admin_approved: bool,
    ) -> Result<Message, sqlx::Error>;

    async fn get_messages(&self, job_id: Uuid) -> Result<Vec<Message>, sqlx::Error>;

    async fn approve_message(
        &self,
        job_id: Uuid,
        message_id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<Message>, sqlx::Error>;
}

#[async_trait]
impl MessageExt for DBClient {
    async fn save_message(
        &self,
        job_id: Uuid,
        sender_id: Uuid,
        sender_role: UserRole,
        kind: MessageKind,
        content: &str,
        admin_approved: bool,
    ) -> Result<Message, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (job_id, sender_id, sender_role, kind, content, admin_approved)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(sender_id)
        .bind(sender_role)
        .bind(kind)
        .bind(content)
        .bind(admin_approved)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_messages(&self, job_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"SELECT * FROM messages WHERE job_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn approve_message(
        &self,
        job_id: Uuid,
        message_id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages SET admin_approved = TRUE, approved_by = $3
            WHERE id = $2 AND job_id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(message_id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await
    }
}
