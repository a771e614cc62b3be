//! # martillo-fiscal: Electronic Invoicing for Martillo POS
//!
//! Emits boletas and facturas through the external fiscal API, keeps the
//! local sale records in step with the authority, and voids documents
//! inside the legal window.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fiscal Engine Architecture                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   FiscalEngine (engine.rs)                       │  │
//! │  │  One call per cart: validate → allocate → build → emit → save   │  │
//! │  │  At most one emission in flight per cart                         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ EmissionClient │  │  RecordWriter  │  │  StatusReconciler      │    │
//! │  │                │  │                │  │  VoidWorkflow          │    │
//! │  │ Collision retry│  │ Final number,  │  │                        │    │
//! │  │ (state machine)│  │ counter repair │  │ After-sale operations  │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          │                   │                       │                  │
//! │          ▼                   ▼                       ▼                  │
//! │  ┌────────────────┐  ┌─────────────────────────────────────────────┐   │
//! │  │ FiscalApi      │  │ SequenceAllocator / SaleRecordStore         │   │
//! │  │ (ApiSunatClient│  │ (martillo-db SeriesRepository,              │   │
//! │  │  over reqwest) │  │  SaleRecordRepository)                      │   │
//! │  └────────────────┘  └─────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `FiscalConfig` (TOML + environment)
//! - [`error`] - Fiscal error types
//! - [`protocol`] - Wire shapes of the fiscal API
//! - [`client`] - `FiscalApi` trait and the HTTP client
//! - [`identity`] - DNI / RUC lookups
//! - [`store`] - Storage traits over `martillo-db`
//! - [`emitter`] - Emission with bounded collision retry
//! - [`writer`] - Sale record persistence
//! - [`reconciler`] - Status reconciliation
//! - [`voiding`] - Void workflow
//! - [`engine`] - The orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use martillo_db::{Database, DbConfig};
//! use martillo_fiscal::{FiscalConfig, FiscalEngineBuilder};
//!
//! let config = FiscalConfig::load(None)?;
//! let db = Database::new(DbConfig::new("fiscal.db")).await?;
//! let engine = FiscalEngineBuilder::new(config).with_database(&db).build()?;
//!
//! let record = engine.emit(&cart_id, &cart).await?;
//! println!("{} {}", record.document_number(), record.state);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod reconciler;
pub mod store;
pub mod voiding;
pub mod writer;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{ApiSunatClient, FiscalApi};
pub use config::{ApiEnvironment, ApiSettings, EmissionSettings, FiscalConfig, SeriesSettings};
pub use emitter::{EmissionClient, EmissionResult};
pub use engine::{FiscalEngine, FiscalEngineBuilder};
pub use error::{FiscalError, FiscalResult};
pub use identity::{BusinessIdentity, PersonIdentity};
pub use protocol::{ApiResponse, DocumentRef, EmissionPayload, StatusPayload};
pub use reconciler::{ReconcileOutcome, ReconcileReport, StatusReconciler};
pub use store::{SaleRecordStore, SequenceAllocator};
pub use voiding::{VoidOutcome, VoidWorkflow};
pub use writer::RecordWriter;

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{DateTime, Utc};
    use martillo_core::{
        CustomerIdentity, DocumentArtifacts, DocumentKind, DocumentState, Money, NetUnitValue,
        PaymentMethod, Quantity, SaleRecord, SaleRecordItem, TaxRate,
    };

    /// A one-line boleta B001-00000042 for S/ 30.00.
    pub fn sale_record(state: DocumentState, emitted_at: DateTime<Utc>) -> SaleRecord {
        SaleRecord {
            id: uuid::Uuid::new_v4().to_string(),
            document_kind: DocumentKind::Boleta,
            series: "B001".into(),
            number: 42,
            customer: CustomerIdentity::anonymous(),
            payment_method: PaymentMethod::Cash,
            items: vec![SaleRecordItem {
                line_no: 1,
                description: "Martillo de uña 16oz".into(),
                quantity: Quantity::from_units(3),
                unit_of_measure: "NIU".into(),
                unit_price_gross: Money::from_cents(1000),
                unit_value_net: NetUnitValue::from_micros(8_474_576),
                line_total: Money::from_cents(3000),
            }],
            subtotal: Money::from_cents(2542),
            tax: Money::from_cents(458),
            total: Money::from_cents(3000),
            tax_rate: TaxRate::default(),
            currency: "PEN".into(),
            state,
            hash: None,
            remote_message: None,
            artifacts: DocumentArtifacts::default(),
            emitted_at,
            updated_at: emitted_at,
            voided_at: None,
        }
    }
}
