use std::future::Future;
use std::time::Duration;

use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, PoolError};
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::error::{Result, ShopError};

pub type DbPool = Pool<AsyncPgConnection>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies pending migrations over a short-lived blocking connection.
pub fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!("Migrations completed successfully ({} applied)", applied.len());
    Ok(())
}

pub async fn build_pool(
    database_url: &str,
    max_size: u32,
) -> std::result::Result<DbPool, PoolError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder().max_size(max_size).build(manager).await
}

/// Bounds a unit of database work by `deadline`.
///
/// On expiry the inner future is dropped mid-flight. A connection dropped
/// inside an open transaction reports itself broken, so the pool closes it
/// instead of recycling it and the server rolls the transaction back.
pub async fn with_deadline<T, F>(deadline: Duration, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(ShopError::DeadlineExceeded(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_results_within_deadline() {
        let value = with_deadline(Duration::from_secs(1), async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);

        let err = with_deadline(Duration::from_secs(1), async {
            Err::<(), _>(ShopError::OrderNotFound(9))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShopError::OrderNotFound(9)));
    }

    #[tokio::test]
    async fn slow_work_is_abandoned() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShopError::DeadlineExceeded(_)));
    }
}
