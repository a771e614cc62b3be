//! # Error Types
//!
//! Domain-specific error types for martillo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  martillo-core errors (this file)                                      │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  martillo-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  martillo-fiscal errors (separate crate)                               │
//! │  └── FiscalError      - What the UI layer sees                         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → FiscalError → UI                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{DocumentKind, DocumentState};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The series code does not belong to the document kind.
    ///
    /// ## When This Occurs
    /// - A boleta built against an `F…` series
    /// - A factura built against a `B…` series
    #[error("Series {series} cannot be used for a {kind}")]
    SeriesKindMismatch { series: String, kind: DocumentKind },

    /// The built request does not reconcile with the cart total.
    ///
    /// Net values × quantities × (1 + rate) must land within one céntimo of
    /// the tax-inclusive total.
    #[error("Document total {total_cents} does not reconcile with lines ({recomputed_cents})")]
    TotalMismatch {
        total_cents: i64,
        recomputed_cents: i64,
    },

    /// A state change the document lifecycle does not allow.
    #[error("Document cannot move from {from} to {to}")]
    InvalidStateTransition {
        from: DocumentState,
        to: DocumentState,
    },

    /// The emission state machine received an event it cannot handle.
    #[error("Emission cannot handle {event} while {state}")]
    InvalidEmissionEvent { state: String, event: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised before any remote call, so a sequence number is never
/// burned on a request that could not have been emitted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value has the wrong length.
    #[error("{field} must have exactly {expected} digits")]
    WrongLength { field: String, expected: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The document has no lines.
    #[error("Document has no items")]
    EmptyCart,

    /// Too many lines for a single document.
    #[error("Document cannot have more than {max} items")]
    TooManyLines { max: usize },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
