//! # Local Record Writer
//!
//! Turns a terminal [`EmissionResult`] into a persisted [`SaleRecord`].
//!
//! - The record is created directly in the remote-reported state, there is
//!   no local "not yet emitted" row.
//! - The number comes from the result, never from the request.
//! - When a collision pushed the number past the allocated candidate, the
//!   series counter is raised so the next sale does not collide again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use martillo_core::{DocumentState, FiscalDocumentRequest, PaymentMethod, SaleRecord, SaleRecordItem};

use crate::emitter::EmissionResult;
use crate::error::{FiscalError, FiscalResult};
use crate::store::{SaleRecordStore, SequenceAllocator};

pub struct RecordWriter {
    store: Arc<dyn SaleRecordStore>,
    allocator: Arc<dyn SequenceAllocator>,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn SaleRecordStore>, allocator: Arc<dyn SequenceAllocator>) -> Self {
        RecordWriter { store, allocator }
    }

    /// Builds the record for an emitted document. Pure.
    pub fn build_record(
        request: &FiscalDocumentRequest,
        result: &EmissionResult,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> FiscalResult<SaleRecord> {
        let state = DocumentState::PendingEmission.transition(result.state)?;

        let items = request
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| SaleRecordItem {
                line_no: i as i64 + 1,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_of_measure: item.unit_of_measure.clone(),
                unit_price_gross: item.unit_price_gross,
                unit_value_net: item.unit_value_net,
                line_total: item.line_total,
            })
            .collect();

        Ok(SaleRecord {
            id: Uuid::new_v4().to_string(),
            document_kind: request.document_kind,
            series: result.series.clone(),
            number: result.number,
            customer: request.customer.clone(),
            payment_method,
            items,
            subtotal: request.taxable_base,
            tax: request.tax,
            total: request.total,
            tax_rate: request.tax_rate,
            currency: request.currency.clone(),
            state,
            hash: result.hash.clone(),
            remote_message: result.message.clone(),
            artifacts: result.artifacts.clone(),
            emitted_at: request.issued_at.with_timezone(&Utc),
            updated_at: now,
            voided_at: None,
        })
    }

    /// Persists the record for `result`.
    ///
    /// A save failure here means the document exists remotely but not
    /// locally, reported as [`FiscalError::PersistenceAfterEmission`].
    pub async fn commit(
        &self,
        request: &FiscalDocumentRequest,
        result: &EmissionResult,
        payment_method: PaymentMethod,
    ) -> FiscalResult<SaleRecord> {
        let record = Self::build_record(request, result, payment_method, Utc::now()).map_err(|e| {
            FiscalError::PersistenceAfterEmission {
                series: result.series.clone(),
                number: result.number,
                reason: e.to_string(),
            }
        })?;

        if let Err(e) = self.store.insert(&record).await {
            error!(
                series = %record.series,
                number = record.number,
                error = %e,
                "Emitted document could not be saved locally"
            );
            return Err(FiscalError::PersistenceAfterEmission {
                series: record.series.clone(),
                number: record.number,
                reason: e.to_string(),
            });
        }

        info!(
            record_id = %record.id,
            series = %record.series,
            number = record.number,
            state = %record.state,
            "Sale record saved"
        );

        if result.drifted() {
            // The record is safe; a stale counter only costs another retry.
            if let Err(e) = self.allocator.raise_floor(&result.series, result.number).await {
                warn!(series = %result.series, number = result.number, error = %e, "Could not raise series counter");
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::{MemoryAllocator, MemoryStore};
    use chrono::{FixedOffset, TimeZone};
    use martillo_core::request::DocumentRequestBuilder;
    use martillo_core::{
        Cart, CartLine, DocumentArtifacts, DocumentKind, DocumentSeries, Money, Quantity,
    };

    fn request(number: i64) -> FiscalDocumentRequest {
        let cart = Cart {
            document_kind: DocumentKind::Boleta,
            lines: vec![
                CartLine::new("Cemento Sol 42.5kg", Quantity::from_units(2), Money::from_cents(2890)),
                CartLine::new("Alambre N°16 (kg)", Quantity::from_milli(1500), Money::from_cents(900)),
            ],
            customer: Default::default(),
            payment_method: PaymentMethod::Yape,
        };
        let lima = FixedOffset::west_opt(5 * 3600).unwrap();
        DocumentRequestBuilder::default()
            .build(
                &cart,
                &DocumentSeries::new("B001", DocumentKind::Boleta),
                number,
                lima.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap(),
            )
            .unwrap()
    }

    fn result(candidate: i64, number: i64, state: DocumentState) -> EmissionResult {
        EmissionResult {
            series: "B001".into(),
            number,
            candidate,
            attempts: (number - candidate + 1) as u32,
            state,
            hash: Some("h4sh".into()),
            message: None,
            artifacts: DocumentArtifacts::default(),
        }
    }

    #[tokio::test]
    async fn test_commit_uses_final_number() {
        let store = Arc::new(MemoryStore::default());
        let allocator = Arc::new(MemoryAllocator::starting_at("B001", 100));
        let writer = RecordWriter::new(store.clone(), allocator.clone());

        let record = writer
            .commit(&request(100), &result(100, 102, DocumentState::Accepted), PaymentMethod::Yape)
            .await
            .unwrap();

        assert_eq!(record.number, 102);
        assert_eq!(record.state, DocumentState::Accepted);
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[1].line_no, 2);
        assert_eq!(record.total.cents(), 2 * 2890 + 1350);
        assert_eq!(store.state_of(&record.id), Some(DocumentState::Accepted));
        // Counter repaired so the next allocation is 103.
        assert_eq!(allocator.last("B001"), 102);
    }

    #[tokio::test]
    async fn test_no_drift_leaves_counter_alone() {
        let store = Arc::new(MemoryStore::default());
        let allocator = Arc::new(MemoryAllocator::starting_at("B001", 100));
        let writer = RecordWriter::new(store, allocator.clone());

        writer
            .commit(&request(100), &result(100, 100, DocumentState::Pending), PaymentMethod::Cash)
            .await
            .unwrap();
        assert_eq!(allocator.last("B001"), 100);
    }

    #[tokio::test]
    async fn test_rejected_is_persisted() {
        let store = Arc::new(MemoryStore::default());
        let writer = RecordWriter::new(store.clone(), Arc::new(MemoryAllocator::default()));

        let record = writer
            .commit(&request(5), &result(5, 5, DocumentState::Rejected), PaymentMethod::Cash)
            .await
            .unwrap();
        assert_eq!(store.state_of(&record.id), Some(DocumentState::Rejected));
    }

    #[tokio::test]
    async fn test_save_failure_reports_series_and_number() {
        let store = Arc::new(MemoryStore {
            fail_inserts: true,
            ..Default::default()
        });
        let writer = RecordWriter::new(store, Arc::new(MemoryAllocator::default()));

        let err = writer
            .commit(&request(8), &result(8, 9, DocumentState::Accepted), PaymentMethod::Cash)
            .await
            .unwrap_err();
        match err {
            FiscalError::PersistenceAfterEmission { series, number, .. } => {
                assert_eq!(series, "B001");
                assert_eq!(number, 9);
            }
            other => panic!("expected PersistenceAfterEmission, got {:?}", other),
        }
    }
}
