//! # Error Types
//!
//! Domain-specific error types for ironmart-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ironmart-core errors (this file)                                      │
//! │  ├── CoreError        - Domain errors (unknown kinds, bad cadences)    │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  ironmart-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  ironmart-sync errors (separate crate)                                 │
//! │  └── SyncError        - Tally transport, protocol, reconciliation      │
//! │                                                                         │
//! │  sync-daemon errors                                                    │
//! │  └── ApiError         - What the admin UI sees (serialized)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string did not name a known sync entity type.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A string did not name a known sync task status.
    #[error("Unknown sync task status: {0}")]
    UnknownTaskStatus(String),

    /// A string did not name a known scheduled job.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// A cadence was constructed with an impossible time of day.
    ///
    /// ## When This Occurs
    /// - `HourlyAt { minute: 60 }`
    /// - `DailyAt { hour: 24, .. }`
    /// - `Every(Duration::ZERO)`
    #[error("Invalid cadence: {reason}")]
    InvalidCadence { reason: String },

    /// A time zone name is not in the IANA database.
    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before anything touches the database or the Tally server.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Empty or whitespace-only.
    #[error("{field} must not be empty")]
    Required { field: String },

    /// Longer than a Tally name field or our id column accepts.
    #[error("{field} exceeds {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be in {min}..={max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: String },

    /// Invalid format (e.g., control characters in a Tally name).
    #[error("{field} is not valid: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownEntityType("invoice".to_string());
        assert_eq!(err.to_string(), "Unknown entity type: invoice");

        let err = CoreError::InvalidCadence {
            reason: "minute must be below 60".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid cadence: minute must be below 60");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "entity_id".to_string(),
        };
        assert_eq!(err.to_string(), "entity_id must not be empty");

        let err = ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: 500,
        };
        assert_eq!(err.to_string(), "limit must be in 1..=500");
    }

    #[test]
    fn test_validation_wraps_into_core_error() {
        let err: CoreError = ValidationError::MustBePositive {
            field: "batch_size".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid input: batch_size must be greater than zero");
    }
}
