use crate::assets::MigrationAssets;
use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

pub mod entities;
pub mod messages;
pub mod policies;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Create database if it doesn't exist (for SQLite)
        if !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(10))
            .connect(&config.url)
            .await?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;
        // WAL keeps readers unblocked while an ingestion job writes
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Open a private, single-connection handle for one ingestion job.
    ///
    /// Jobs own their connection for exactly the job's lifetime; they never
    /// borrow the request-serving pool.
    pub async fn connect_for_job(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn migrate(&self) -> Result<()> {
        // Track applied migrations so startup stays idempotent
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MigrationAssets::get_migrations() {
            let applied: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM _migrations WHERE name = ?")
                    .bind(&name)
                    .fetch_one(&self.pool)
                    .await?;
            if applied > 0 {
                continue;
            }

            let mut transaction = self.pool.begin().await?;
            match sqlx::query(&content).execute(&mut *transaction).await {
                Ok(_) => {
                    sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                        .bind(&name)
                        .execute(&mut *transaction)
                        .await?;
                    transaction.commit().await?;
                    info!("Applied migration: {}", name);
                }
                Err(e) => {
                    transaction.rollback().await?;
                    return Err(anyhow::anyhow!("Migration {} failed: {}", name, e));
                }
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::memory_database;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let database = memory_database().await;
        database.migrate().await.expect("second run");

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'policies'",
        )
        .fetch_one(&database.pool())
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }
}
