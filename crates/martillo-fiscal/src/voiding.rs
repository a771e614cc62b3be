//! # Void Workflow
//!
//! Cancels an emitted document with the authority.
//!
//! ## Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Local checks (no remote call on failure)                           │
//! │     • not already VOIDED                                               │
//! │     • ACCEPTED or PENDING                                              │
//! │     • within the void window (3 days), else: issue a credit note       │
//! │                                                                         │
//! │  2. POST void                                                          │
//! │                                                                         │
//! │  3. success, or "ya se encuentra anulado" / "en proceso de baja"       │
//! │     ──► local state = VOIDED                                           │
//! │                                                                         │
//! │  4. anything else ──► VoidFailed with the remote message verbatim,     │
//! │     local state untouched, never retried automatically                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The "already voided" path covers a crash between steps 2 and 3 of an
//! earlier attempt: the remote void went through but the local write did
//! not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use martillo_core::classify::classify_message;
use martillo_core::void_policy::{check_void_eligibility, VoidRefusal};
use martillo_core::{DocumentState, SaleRecord};

use crate::client::FiscalApi;
use crate::error::{FiscalError, FiscalResult};
use crate::protocol::DocumentRef;
use crate::store::SaleRecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoidOutcome {
    /// The authority accepted the void request.
    Voided { message: Option<String> },
    /// The authority already had the document voided or queued for voiding.
    /// Informational, not an error.
    RecoveredAlreadyVoided { message: String },
}

pub struct VoidWorkflow {
    api: Arc<dyn FiscalApi>,
    store: Arc<dyn SaleRecordStore>,
    window_days: i64,
}

impl VoidWorkflow {
    pub fn new(api: Arc<dyn FiscalApi>, store: Arc<dyn SaleRecordStore>, window_days: i64) -> Self {
        VoidWorkflow {
            api,
            store,
            window_days,
        }
    }

    pub async fn void(&self, record: &SaleRecord) -> FiscalResult<VoidOutcome> {
        self.void_at(record, Utc::now()).await
    }

    /// Loads the record first.
    pub async fn void_by_id(&self, id: &str) -> FiscalResult<VoidOutcome> {
        let record = self.load(id).await?;
        self.void(&record).await
    }

    /// Same as [`VoidWorkflow::void`] with an explicit clock.
    ///
    /// Eligibility is checked against the stored row, not against `record`.
    pub async fn void_at(&self, record: &SaleRecord, now: DateTime<Utc>) -> FiscalResult<VoidOutcome> {
        let record = self.load(&record.id).await?;
        let document = record.document_number();

        check_void_eligibility(&record, now, self.window_days).map_err(|refusal| {
            warn!(record_id = %record.id, document = %document, ?refusal, "Void refused locally");
            match refusal {
                VoidRefusal::AlreadyVoided => FiscalError::AlreadyVoided {
                    document: document.clone(),
                },
                VoidRefusal::NotVoidable { state } => FiscalError::NotVoidable {
                    document: document.clone(),
                    state,
                },
                VoidRefusal::WindowExpired { deadline, .. } => FiscalError::VoidWindowExpired {
                    document: document.clone(),
                    deadline,
                },
            }
        })?;

        let response = self.api.void_document(&DocumentRef::from(&record)).await?;
        let message = response.message().to_string();

        let outcome = if response.success {
            VoidOutcome::Voided {
                message: response.message,
            }
        } else if classify_message(&message).is_void_recovery() {
            info!(record_id = %record.id, document = %document, message = %message, "Document was already voided remotely");
            VoidOutcome::RecoveredAlreadyVoided {
                message: message.clone(),
            }
        } else {
            error!(record_id = %record.id, document = %document, message = %message, "Void refused by the authority");
            return Err(FiscalError::VoidFailed { document, message });
        };

        let stored_message = (!message.is_empty()).then_some(message.as_str());
        self.mark_voided(&record, stored_message, now).await?;
        info!(record_id = %record.id, document = %document, "Document voided");

        Ok(outcome)
    }

    /// Writes VOIDED once the authority has voided the document. Follows a
    /// concurrent PENDING → ACCEPTED move rather than losing the void.
    async fn mark_voided(
        &self,
        record: &SaleRecord,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> FiscalResult<()> {
        let mut expected = record.state;
        loop {
            let written = self
                .store
                .update_state(&record.id, expected, DocumentState::Voided, message, now)
                .await?;
            if written {
                return Ok(());
            }

            let current = self.load(&record.id).await?.state;
            if current == DocumentState::Voided {
                return Ok(());
            }
            if current == expected || !current.can_transition_to(DocumentState::Voided) {
                return Err(FiscalError::NotVoidable {
                    document: record.document_number(),
                    state: current,
                });
            }
            expected = current;
        }
    }

    async fn load(&self, id: &str) -> FiscalResult<SaleRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| FiscalError::DocumentNotFound { id: id.to_string() })
    }
}
