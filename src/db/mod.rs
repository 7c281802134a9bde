//! PostgreSQL pool backing the transfer store

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool and check one round-trip before handing it out
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect(url)
            .await?;
        let db = Self { pool };

        if let Err(e) = db.health_check().await {
            warn!(error = %e, "Transfer database failed its first health check");
            db.pool.close().await;
            return Err(e);
        }
        info!(
            max_connections,
            open = db.pool.size(),
            "Transfer database pool ready"
        );
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if one == 1 {
            Ok(())
        } else {
            Err(sqlx::Error::Protocol(format!("health check returned {one}")))
        }
    }
}
