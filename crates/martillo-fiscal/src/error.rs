//! # Fiscal Error Types
//!
//! Error types for emission, reconciliation and voiding.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fiscal Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Local          │  │   Emission      │  │     Transport           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Exhausted      │  │  Transport              │ │
//! │  │  EmissionIn-    │  │  Failed         │  │  InvalidResponse        │ │
//! │  │  Flight         │  │  Persistence-   │  │                         │ │
//! │  │  Sequence-      │  │  AfterEmission  │  │                         │ │
//! │  │  Unavailable    │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Void         │  │     Status      │  │   Storage / Config      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  WindowExpired  │  │  StatusQuery-   │  │  Database               │ │
//! │  │  AlreadyVoided  │  │  Failed         │  │  DocumentNotFound       │ │
//! │  │  NotVoidable    │  │                 │  │  Config                 │ │
//! │  │  VoidFailed     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A remote rejection of a document is NOT an error: the record is persisted
//! in `REJECTED`. Likewise an "already voided" answer to a void request is a
//! successful [`crate::voiding::VoidOutcome`].

use chrono::{DateTime, Utc};
use thiserror::Error;

use martillo_core::{CoreError, DocumentState, ValidationError};
use martillo_db::DbError;

/// Result type alias for fiscal operations.
pub type FiscalResult<T> = Result<T, FiscalError>;

#[derive(Debug, Error)]
pub enum FiscalError {
    // =========================================================================
    // Local Preconditions
    // =========================================================================
    /// The cart or customer failed a local check. Nothing was allocated.
    #[error("{0}")]
    Validation(#[from] CoreError),

    /// The series counter could not hand out a number. Nothing was emitted.
    #[error("Cannot allocate a number for series {series}: {reason}")]
    SequenceUnavailable { series: String, reason: String },

    /// Another emission for the same cart is still running.
    #[error("An emission for cart {cart_id} is already in flight")]
    EmissionInFlight { cart_id: String },

    // =========================================================================
    // Emission
    // =========================================================================
    /// Every attempt collided with an already-issued number.
    #[error("Series {series}: numbers kept colliding, gave up at {last_number} after {attempts} attempts")]
    EmissionExhausted {
        series: String,
        last_number: i64,
        attempts: u32,
    },

    /// The API refused the document for a reason other than a collision.
    #[error("Emission of {series}-{number} failed: {message}")]
    EmissionFailed {
        series: String,
        number: i64,
        message: String,
    },

    /// The document exists remotely but could not be saved here. The
    /// series/number must be recovered by hand (or by the reconciler).
    #[error("Document {series}-{number} was emitted but not saved locally: {reason}")]
    PersistenceAfterEmission {
        series: String,
        number: i64,
        reason: String,
    },

    // =========================================================================
    // Transport
    // =========================================================================
    /// Network failure or timeout. The remote outcome is unknown.
    #[error("Fiscal API unreachable: {0}")]
    Transport(String),

    /// The API answered with something that is not its documented envelope.
    #[error("Unexpected fiscal API response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Void
    // =========================================================================
    #[error("{document} can no longer be voided (deadline was {deadline}); issue a credit note instead")]
    VoidWindowExpired {
        document: String,
        deadline: DateTime<Utc>,
    },

    #[error("{document} is already voided")]
    AlreadyVoided { document: String },

    #[error("{document} cannot be voided while {state}")]
    NotVoidable {
        document: String,
        state: DocumentState,
    },

    /// The remote message is kept verbatim for the operator.
    #[error("Void of {document} failed: {message}")]
    VoidFailed { document: String, message: String },

    // =========================================================================
    // Status
    // =========================================================================
    #[error("Status query for {document} failed: {message}")]
    StatusQueryFailed { document: String, message: String },

    // =========================================================================
    // Storage and Configuration
    // =========================================================================
    #[error("Sale record not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid fiscal configuration: {0}")]
    Config(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for FiscalError {
    fn from(err: ValidationError) -> Self {
        FiscalError::Validation(CoreError::Validation(err))
    }
}

impl From<reqwest::Error> for FiscalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FiscalError::InvalidResponse(err.to_string())
        } else {
            FiscalError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FiscalError {
    fn from(err: serde_json::Error) -> Self {
        FiscalError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for FiscalError {
    fn from(err: url::ParseError) -> Self {
        FiscalError::Config(format!("invalid URL: {}", err))
    }
}

impl From<std::io::Error> for FiscalError {
    fn from(err: std::io::Error) -> Self {
        FiscalError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for FiscalError {
    fn from(err: toml::de::Error) -> Self {
        FiscalError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FiscalError {
    fn from(err: toml::ser::Error) -> Self {
        FiscalError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl FiscalError {
    /// Returns true when the remote outcome is unknown. Local state was not
    /// touched and the call may be repeated later.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FiscalError::Transport(_) | FiscalError::InvalidResponse(_)
        )
    }

    /// Returns true for errors the cashier can act on directly (fix the
    /// cart, wait, issue a credit note).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            FiscalError::Validation(_)
                | FiscalError::EmissionInFlight { .. }
                | FiscalError::EmissionFailed { .. }
                | FiscalError::EmissionExhausted { .. }
                | FiscalError::VoidWindowExpired { .. }
                | FiscalError::AlreadyVoided { .. }
                | FiscalError::NotVoidable { .. }
                | FiscalError::VoidFailed { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, FiscalError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors() {
        assert!(FiscalError::Transport("timeout".into()).is_transport());
        assert!(FiscalError::InvalidResponse("not json".into()).is_transport());
        assert!(!FiscalError::VoidFailed {
            document: "B001-00000001".into(),
            message: "x".into()
        }
        .is_transport());
    }

    #[test]
    fn test_user_actionable() {
        let err: FiscalError = ValidationError::EmptyCart.into();
        assert!(err.is_user_actionable());
        assert!(FiscalError::EmissionExhausted {
            series: "B001".into(),
            last_number: 14,
            attempts: 5
        }
        .is_user_actionable());
        assert!(!FiscalError::Transport("down".into()).is_user_actionable());
        assert!(!FiscalError::PersistenceAfterEmission {
            series: "B001".into(),
            number: 7,
            reason: "disk full".into()
        }
        .is_user_actionable());
    }

    #[test]
    fn test_error_display() {
        let err = FiscalError::PersistenceAfterEmission {
            series: "B001".into(),
            number: 42,
            reason: "disk full".into(),
        };
        assert!(err.to_string().contains("B001-42"));

        let err = FiscalError::VoidFailed {
            document: "F001-00000003".into(),
            message: "El documento tiene una nota de crédito asociada".into(),
        };
        assert!(err
            .to_string()
            .contains("El documento tiene una nota de crédito asociada"));
    }
}
