// db/biddb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{DBClient, PgTx};
use crate::models::bidmodel::Bid;

#[async_trait]
pub trait BidExt {
    async fn save_bid(
        &self,
        job_id: Uuid,
        freelancer_id: Uuid,
        bid_amount_cents: i64,
        message: &str,
    ) -> Result<Bid, sqlx::Error>;

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<Bid>, sqlx::Error>;

    async fn get_bids(
        &self,
        job_id: Option<Uuid>,
        freelancer_id: Option<Uuid>,
    ) -> Result<Vec<Bid>, sqlx::Error>;
}

#[async_trait]
impl BidExt for DBClient {
    async fn save_bid(
        &self,
        job_id: Uuid,
        freelancer_id: Uuid,
        bid_amount_cents: i64,
        message: &str,
    ) -> Result<Bid, sqlx::Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            INSERT INTO bids (job_id, freelancer_id, bid_amount_cents, message)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(freelancer_id)
        .bind(bid_amount_cents)
        .bind(message)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<Bid>, sqlx::Error> {
        sqlx::query_as::<_, Bid>(r#"SELECT * FROM bids WHERE id = $1"#)
            .bind(bid_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_bids(
        &self,
        job_id: Option<Uuid>,
        freelancer_id: Option<Uuid>,
    ) -> Result<Vec<Bid>, sqlx::Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT * FROM bids
            WHERE ($1::uuid IS NULL OR job_id = $1)
              AND ($2::uuid IS NULL OR freelancer_id = $2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .bind(freelancer_id)
        .fetch_all(&self.pool)
        .await
    }
}

pub async fn lock_bid_tx(tx: &mut PgTx<'_>, bid_id: Uuid) -> Result<Option<Bid>, sqlx::Error> {
    sqlx::query_as::<_, Bid>(r#"SELECT * FROM bids WHERE id = $1 FOR UPDATE"#)
        .bind(bid_id)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn pending_bid_tx(
    tx: &mut PgTx<'_>,
    job_id: Uuid,
    freelancer_id: Uuid,
) -> Result<Option<Bid>, sqlx::Error> {
    sqlx::query_as::<_, Bid>(
        r#"
        SELECT * FROM bids
        WHERE job_id = $1 AND freelancer_id = $2 AND status = 'pending'
        FOR UPDATE
        "#,
    )
    .bind(job_id)
    .bind(freelancer_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn accept_bid_tx(tx: &mut PgTx<'_>, bid_id: Uuid) -> Result<Bid, sqlx::Error> {
    sqlx::query_as::<_, Bid>(
        r#"UPDATE bids SET status = 'accepted' WHERE id = $1 RETURNING *"#,
    )
    .bind(bid_id)
    .fetch_one(&mut **tx)
    .await
}

/// Rejects every pending bid on the job except `keep`.
pub async fn reject_other_bids_tx(
    tx: &mut PgTx<'_>,
    job_id: Uuid,
    keep: Option<Uuid>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE bids SET status = 'rejected'
        WHERE job_id = $1 AND status = 'pending' AND ($2::uuid IS NULL OR id <> $2)
        "#,
    )
    .bind(job_id)
    .bind(keep)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
