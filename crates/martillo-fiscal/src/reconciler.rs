//! # Status Reconciler
//!
//! Brings a local record in line with the authority's view. Used for
//! documents left `PENDING` and after a client crash mid-emission.
//!
//! ## Outcomes
//! ```text
//! ┌────────────────────────────┬────────────────────────────────────────────┐
//! │ Remote answer              │ Effect                                     │
//! ├────────────────────────────┼────────────────────────────────────────────┤
//! │ definitive, same state     │ Unchanged (no write)                       │
//! │ definitive, new state      │ Updated, state overwritten                 │
//! │ "no existe" / not found    │ NotFound, no write                         │
//! │ other refusal              │ Err(StatusQueryFailed), no write           │
//! │ transport error            │ Err(Transport), no write                   │
//! │ local REJECTED / VOIDED    │ Skipped, no remote call                    │
//! └────────────────────────────┴────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use martillo_core::classify::{classify_message, RemoteMessageClass};
use martillo_core::{DocumentState, SaleRecord};

use crate::client::FiscalApi;
use crate::error::{FiscalError, FiscalResult};
use crate::protocol::DocumentRef;
use crate::store::SaleRecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Unchanged { state: DocumentState },
    Updated { from: DocumentState, to: DocumentState },
    /// The authority does not know the document. Possibly rejected at
    /// ingestion; needs a human.
    NotFound { message: String },
    /// Terminal locally; not queried.
    Skipped { state: DocumentState },
}

impl ReconcileOutcome {
    /// The local state after reconciliation, when known.
    pub fn state(&self) -> Option<DocumentState> {
        match self {
            ReconcileOutcome::Unchanged { state } | ReconcileOutcome::Skipped { state } => Some(*state),
            ReconcileOutcome::Updated { to, .. } => Some(*to),
            ReconcileOutcome::NotFound { .. } => None,
        }
    }
}

/// Tally of a batch run over pending records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub not_found: usize,
    pub failed: usize,
}

pub struct StatusReconciler {
    api: Arc<dyn FiscalApi>,
    store: Arc<dyn SaleRecordStore>,
}

impl StatusReconciler {
    pub fn new(api: Arc<dyn FiscalApi>, store: Arc<dyn SaleRecordStore>) -> Self {
        StatusReconciler { api, store }
    }

    /// Reconciles one record. Idempotent.
    ///
    /// `record` only identifies the document: the decision is taken on the
    /// stored row, so a stale copy cannot undo a void.
    pub async fn reconcile(&self, record: &SaleRecord) -> FiscalResult<ReconcileOutcome> {
        self.reconcile_by_id(&record.id).await
    }

    /// Loads the record first.
    pub async fn reconcile_by_id(&self, id: &str) -> FiscalResult<ReconcileOutcome> {
        let record = self.load(id).await?;

        if record.state.is_terminal() {
            debug!(record_id = %record.id, state = %record.state, "Terminal record, not reconciled");
            return Ok(ReconcileOutcome::Skipped {
                state: record.state,
            });
        }

        let document = record.document_number();
        let response = self.api.query_status(&DocumentRef::from(&record)).await?;

        if !response.success {
            let message = response.message().to_string();
            return match classify_message(&message) {
                RemoteMessageClass::NotFound => {
                    warn!(record_id = %record.id, document = %document, message = %message, "Authority does not know this document");
                    Ok(ReconcileOutcome::NotFound { message })
                }
                _ => Err(FiscalError::StatusQueryFailed { document, message }),
            };
        }

        let estado = response
            .payload
            .as_ref()
            .and_then(|p| p.estado.clone())
            .ok_or_else(|| FiscalError::InvalidResponse(format!("status of {} has no estado", document)))?;
        let remote = DocumentState::from_remote(&estado).ok_or_else(|| {
            FiscalError::InvalidResponse(format!("unknown estado {:?} for {}", estado, document))
        })?;

        if remote == record.state {
            return Ok(ReconcileOutcome::Unchanged { state: remote });
        }

        if !record.state.can_reconcile_to(remote) {
            warn!(
                record_id = %record.id,
                local = %record.state,
                remote = %remote,
                "Remote state not reachable from local state, left as is"
            );
            return Ok(ReconcileOutcome::Unchanged {
                state: record.state,
            });
        }

        let written = self
            .store
            .update_state(&record.id, record.state, remote, response.message.as_deref(), Utc::now())
            .await?;
        if !written {
            let current = self.load(id).await?.state;
            debug!(record_id = %record.id, state = %current, "Record moved while reconciling, left as is");
            return Ok(ReconcileOutcome::Unchanged { state: current });
        }
        info!(record_id = %record.id, document = %document, from = %record.state, to = %remote, "Record reconciled");

        Ok(ReconcileOutcome::Updated {
            from: record.state,
            to: remote,
        })
    }

    async fn load(&self, id: &str) -> FiscalResult<SaleRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| FiscalError::DocumentNotFound { id: id.to_string() })
    }

    /// Reconciles up to `limit` pending records, oldest first. One failure
    /// does not stop the batch.
    pub async fn reconcile_pending(&self, limit: i64) -> FiscalResult<ReconcileReport> {
        let pending = self.store.list_by_state(DocumentState::Pending, limit).await?;
        let mut report = ReconcileReport::default();

        for record in &pending {
            report.checked += 1;
            match self.reconcile(record).await {
                Ok(ReconcileOutcome::Updated { .. }) => report.updated += 1,
                Ok(ReconcileOutcome::NotFound { .. }) => report.not_found += 1,
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Reconciliation failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            updated = report.updated,
            not_found = report.not_found,
            failed = report.failed,
            "Pending records reconciled"
        );
        Ok(report)
    }
}
