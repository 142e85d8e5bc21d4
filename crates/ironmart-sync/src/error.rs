//! # Sync Error Types
//!
//! Error types for the Tally sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Tally Protocol      │ │
//! │  │                 │  │  (retry later)  │  │                         │ │
//! │  │  InvalidConfig  │  │  TallyUnreach.  │  │  MalformedResponse      │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  VoucherRejected        │ │
//! │  │  ConfigLoad/Save│  │  TallyHttpStatus│  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │  Per-entity     │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  EntityNotFound │  │  UnknownJob             │ │
//! │  │                 │  │  EntityNotSync. │  │  Internal               │ │
//! │  │                 │  │  Validation     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport errors stop an outbound drain early. Everything else is
//! recorded on the task it happened to and the drain moves on.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid Tally URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Tally refused the connection or the network dropped.
    #[error("Tally unreachable: {0}")]
    TallyUnreachable(String),

    /// Tally did not answer within the configured timeout.
    #[error("Tally did not respond within {0} seconds")]
    Timeout(u64),

    /// Tally answered with a non-success HTTP status.
    #[error("Tally returned HTTP {status}: {body}")]
    TallyHttpStatus { status: u16, body: String },

    // =========================================================================
    // Tally Protocol Errors
    // =========================================================================
    /// The response body was not the XML we expected.
    #[error("Malformed Tally response: {0}")]
    MalformedResponse(String),

    /// Tally parsed the voucher but refused to import it.
    #[error("Tally rejected voucher {reference}: {reason}")]
    VoucherRejected { reference: String, reason: String },

    // =========================================================================
    // Per-entity Errors
    // =========================================================================
    #[error("{entity_type} {entity_id} not found")]
    EntityNotFound {
        entity_type: String,
        entity_id: String,
    },

    /// The entity exists but must not be pushed (e.g. a cancelled order).
    #[error("{entity_type} {entity_id} cannot be synced: {reason}")]
    EntityNotSyncable {
        entity_type: String,
        entity_id: String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] ironmart_core::CoreError),

    #[error(transparent)]
    Validation(#[from] ironmart_core::ValidationError),

    // =========================================================================
    // Database Errors
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Job {0} is not registered")]
    UnknownJob(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ironmart_db::DbError> for SyncError {
    fn from(err: ironmart_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured duration
            SyncError::TallyUnreachable(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::TallyUnreachable(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for SyncError {
    fn from(err: quick_xml::Error) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        SyncError::EntityNotFound {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Tally itself could not be reached. Further requests in the same cycle
    /// will fail the same way.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::TallyUnreachable(_) | SyncError::Timeout(_)
        )
    }

    /// Returns true if a later attempt may succeed without anyone changing
    /// the data.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::TallyUnreachable(_) | SyncError::Timeout(_) => true,
            SyncError::TallyHttpStatus { status, .. } => *status >= 500,
            SyncError::DatabaseError(_) => true,
            _ => false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
