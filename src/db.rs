// db.rs
use std::path::Path;

use sqlx::{migrate::Migrator, Pool, Postgres};

pub mod biddb;
pub mod jobdb;
pub mod messagedb;
pub mod paymentdb;
pub mod statsdb;
pub mod userdb;

#[cfg(test)]
pub mod testing;

const MIGRATION_PATH: &str = "./migrations";

pub type PgTx<'a> = sqlx::Transaction<'a, Postgres>;

#[derive(Debug, Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    pub async fn apply_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        let migrator = Migrator::new(Path::new(MIGRATION_PATH)).await?;
        migrator.run(&self.pool).await
    }

    pub async fn begin(&self) -> Result<PgTx<'static>, sqlx::Error> {
        self.pool.begin().await
    }
}
