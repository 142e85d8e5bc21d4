//! # Validation Module
//!
//! Input checks applied at the edges: admin API paths and query strings,
//! configuration values, and names that end up inside Tally XML.
//!
//! ## Usage
//! ```rust,ignore
//! use ironmart_core::validation::{validate_entity_id, validate_list_limit};
//!
//! assert!(validate_entity_id("6f1c2a9e").is_ok());
//! assert!(validate_list_limit(50).is_ok());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest page the admin listing endpoints return.
pub const MAX_LIST_LIMIT: i64 = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a marketplace entity ID taken from a URL path.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust,ignore
/// use ironmart_core::validation::validate_entity_id;
///
/// assert!(validate_entity_id("ord_01HZX").is_ok());
/// assert!(validate_entity_id("").is_err());
/// assert!(validate_entity_id("../etc").is_err());
/// ```
pub fn validate_entity_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "entity_id".to_string(),
        });
    }

    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "entity_id".to_string(),
            max: 64,
        });
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "entity_id".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a Tally master name (ledger, company, stock item).
///
/// Tally caps names at 200 characters and rejects control characters.
pub fn validate_tally_name(field: &str, name: &str) -> ValidationResult<()> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if trimmed.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates the prefix stamped on voucher references.
///
/// The prefix is how the inbound reconciler recognises vouchers the
/// marketplace created, so it must be non-empty and must not contain the
/// `-` separator.
pub fn validate_reference_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "reference_prefix".to_string(),
        });
    }

    if prefix.len() > 16 {
        return Err(ValidationError::TooLong {
            field: "reference_prefix".to_string(),
            max: 16,
        });
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "reference_prefix".to_string(),
            reason: "must be letters and digits only".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a `?limit=` query value.
pub fn validate_list_limit(limit: i64) -> ValidationResult<()> {
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_LIST_LIMIT,
        });
    }
    Ok(())
}

/// Validates a positive configuration count (batch size, retry cap, ...).
pub fn validate_positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
