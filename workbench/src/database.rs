use crate::error::WorkbenchResult;
use crate::models::settings::ScopeConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::info;

const SCOPE_KEY: &str = "scope";

#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> WorkbenchResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to `sqlite::memory:` opens its own database, so
        // in-memory pools are pinned to one long-lived connection
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✓ Database initialized and migrated at {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Stored scope record, `None` if never saved
    pub async fn load_scope(&self) -> WorkbenchResult<Option<ScopeConfig>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(SCOPE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.get("value");
                let config = serde_json::from_str(&value).map_err(|e| {
                    crate::WorkbenchError::configuration(format!("Stored scope record is invalid: {}", e))
                })?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Overwrite the scope record wholesale
    pub async fn save_scope(&self, config: &ScopeConfig) -> WorkbenchResult<()> {
        let value = serde_json::to_string(config)
            .map_err(|e| crate::WorkbenchError::configuration(e.to_string()))?;
        let timestamp = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(SCOPE_KEY)
        .bind(value)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        info!(include = config.include.len(), exclude = config.exclude.len(), "Scope saved");
        Ok(())
    }
}
