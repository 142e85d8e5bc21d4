//! # Store Errors
//!
//! The marketplace database is shared with the storefront, so the errors
//! that matter most here are lock contention and constraint hits on the
//! sync tables, not connection setup.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error                                                            │
//! │    RowNotFound ─────────────────────────────► NotFound                  │
//! │    Database("database is locked") ──────────► Busy                      │
//! │    Database("UNIQUE constraint failed: t.c")► Constraint { Unique }     │
//! │    Database("CHECK constraint failed: ...") ► Constraint { Check }      │
//! │    PoolTimedOut / PoolClosed ───────────────► Unavailable               │
//! │    anything else ───────────────────────────► Sqlx                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use thiserror::Error;

/// Which SQLite constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::Check => "check",
            ConstraintKind::NotNull => "not null",
        })
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// A row the caller named by id is missing.
    #[error("{entity} {id} does not exist")]
    NotFound { entity: String, id: String },

    /// A write broke a schema constraint. `detail` is SQLite's text after
    /// the colon, e.g. `sync_tasks.entity_type, sync_tasks.entity_id`.
    #[error("{kind} constraint rejected write: {detail}")]
    Constraint { kind: ConstraintKind, detail: String },

    /// Another writer (usually the storefront) holds the database lock.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// The pool could not hand out a connection.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored value could not be read back (bad enum text, bad timestamp).
    #[error("Corrupt {column} value: {value}")]
    Decode { column: String, value: String },

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Lock contention and pool starvation clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::Unavailable(_))
    }
}

fn classify(message: &str) -> Option<(ConstraintKind, String)> {
    const PATTERNS: [(&str, ConstraintKind); 4] = [
        ("UNIQUE constraint failed", ConstraintKind::Unique),
        ("FOREIGN KEY constraint failed", ConstraintKind::ForeignKey),
        ("CHECK constraint failed", ConstraintKind::Check),
        ("NOT NULL constraint failed", ConstraintKind::NotNull),
    ];

    PATTERNS.iter().find_map(|(prefix, kind)| {
        message.find(prefix).map(|at| {
            let detail = message[at + prefix.len()..]
                .trim_start_matches(':')
                .trim();
            (*kind, detail.to_string())
        })
    })
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("row", "?"),
            sqlx::Error::Database(ref db_err) => {
                let message = db_err.message().to_string();
                if let Some((kind, detail)) = classify(&message) {
                    DbError::Constraint { kind, detail }
                } else if message.contains("database is locked") || message.contains("busy") {
                    DbError::Busy(message)
                } else {
                    DbError::Sqlx(err)
                }
            }
            sqlx::Error::PoolTimedOut => DbError::Unavailable("timed out waiting for a connection".into()),
            sqlx::Error::PoolClosed => DbError::Unavailable("pool is closed".into()),
            sqlx::Error::ColumnDecode { index, source } => DbError::Decode {
                column: index,
                value: source.to_string(),
            },
            other => DbError::Sqlx(other),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_messages_are_classified() {
        assert_eq!(
            classify("UNIQUE constraint failed: sync_tasks.entity_type, sync_tasks.entity_id"),
            Some((
                ConstraintKind::Unique,
                "sync_tasks.entity_type, sync_tasks.entity_id".to_string()
            ))
        );
        assert_eq!(
            classify("CHECK constraint failed: status IN ('pending','queued')").map(|c| c.0),
            Some(ConstraintKind::Check)
        );
        assert_eq!(classify("no such table: voucher_cursor"), None);
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DbError::not_found("SyncTask", "t-1").is_transient());
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::NotFound { .. }
        ));
    }
}
