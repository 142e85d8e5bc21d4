//! # System Settings Repository
//!
//! Key/value flags the admin toggles at runtime. The sync engine reads them
//! at the start of every job run rather than caching them.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::DbResult;

/// Master switch for every Tally-facing job.
pub const TALLY_SYNC_ENABLED: &str = "tally_sync_enabled";

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM system_settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads a boolean flag. Unset or unparseable values read as `None`.
    pub async fn get_bool(&self, key: &str) -> DbResult<Option<bool>> {
        Ok(self.get(key).await?.and_then(|v| parse_bool(&v)))
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> DbResult<()> {
        self.set(key, if value { "true" } else { "false" }).await
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
