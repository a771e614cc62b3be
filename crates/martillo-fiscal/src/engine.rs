//! # Fiscal Engine
//!
//! The entry point the POS calls. One [`FiscalEngine::emit`] runs a cart
//! through the whole pipeline and returns only a terminal result; the UI
//! renders from that, never from an assumed success.
//!
//! ## Emission Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  emit(cart_id, cart)                                                   │
//! │     │                                                                   │
//! │     ├─► in-flight guard        second call for same cart ─► rejected   │
//! │     ├─► validate               bad cart ─► Validation (no number used) │
//! │     ├─► allocator.next_number  unavailable ─► SequenceUnavailable      │
//! │     ├─► builder.build          date/time in the configured offset      │
//! │     ├─► emitter.emit           collisions retried internally           │
//! │     └─► writer.commit          record in ACCEPTED/PENDING/REJECTED     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Different carts may emit concurrently; their only coupling is the
//! series counter.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{FixedOffset, Utc};
use tracing::{debug, error, info};

use martillo_core::request::DocumentRequestBuilder;
use martillo_core::{Cart, DocumentKind, DocumentSeries, SaleRecord};
use martillo_db::Database;

use crate::client::{ApiSunatClient, FiscalApi};
use crate::config::{FiscalConfig, SeriesSettings};
use crate::emitter::EmissionClient;
use crate::error::{FiscalError, FiscalResult};
use crate::reconciler::{ReconcileOutcome, ReconcileReport, StatusReconciler};
use crate::store::{SaleRecordStore, SequenceAllocator};
use crate::voiding::{VoidOutcome, VoidWorkflow};
use crate::writer::RecordWriter;

// =============================================================================
// In-flight Guard
// =============================================================================

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Holds a cart's slot until dropped, including when the emit future is
/// cancelled.
struct InFlightGuard {
    carts: InFlight,
    cart_id: String,
}

impl InFlightGuard {
    fn acquire(carts: &InFlight, cart_id: &str) -> Option<Self> {
        let mut set = carts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(cart_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            carts: Arc::clone(carts),
            cart_id: cart_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.carts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.cart_id);
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct FiscalEngine {
    builder: DocumentRequestBuilder,
    series: SeriesSettings,
    utc_offset: FixedOffset,
    allocator: Arc<dyn SequenceAllocator>,
    emitter: EmissionClient,
    writer: RecordWriter,
    reconciler: StatusReconciler,
    voids: VoidWorkflow,
    in_flight: InFlight,
}

impl FiscalEngine {
    pub fn new(
        config: &FiscalConfig,
        api: Arc<dyn FiscalApi>,
        allocator: Arc<dyn SequenceAllocator>,
        store: Arc<dyn SaleRecordStore>,
    ) -> Self {
        FiscalEngine {
            builder: DocumentRequestBuilder::new(config.emission.request_settings()),
            series: config.series.clone(),
            utc_offset: config.utc_offset(),
            allocator: Arc::clone(&allocator),
            emitter: EmissionClient::new(Arc::clone(&api), config.emission.max_attempts),
            writer: RecordWriter::new(Arc::clone(&store), allocator),
            reconciler: StatusReconciler::new(Arc::clone(&api), Arc::clone(&store)),
            voids: VoidWorkflow::new(api, store, config.emission.void_window_days),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The series that numbers `kind`.
    pub fn series_for(&self, kind: DocumentKind) -> DocumentSeries {
        self.series.for_kind(kind)
    }

    pub fn is_in_flight(&self, cart_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(cart_id)
    }

    /// Emits `cart` and returns the persisted record.
    ///
    /// A document the authority rejected is returned as a record in
    /// `REJECTED`, not as an error.
    pub async fn emit(&self, cart_id: &str, cart: &Cart) -> FiscalResult<SaleRecord> {
        let _guard = InFlightGuard::acquire(&self.in_flight, cart_id).ok_or_else(|| {
            FiscalError::EmissionInFlight {
                cart_id: cart_id.to_string(),
            }
        })?;

        let series = self.series_for(cart.document_kind);
        self.builder.validate(cart, &series)?;

        let number = self.allocator.next_number(&series.code).await?;
        debug!(cart_id, series = %series.code, number, "Number allocated");

        let issued_at = Utc::now().with_timezone(&self.utc_offset);
        let request = self.builder.build(cart, &series, number, issued_at)?;

        let result = match self.emitter.emit(&request).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_transport() {
                    error!(
                        cart_id,
                        series = %series.code,
                        number,
                        error = %e,
                        "No answer from the authority; outcome unknown, check before re-emitting"
                    );
                }
                return Err(e);
            }
        };

        let record = self
            .writer
            .commit(&request, &result, cart.payment_method)
            .await?;
        info!(
            cart_id,
            record_id = %record.id,
            document = %record.document_number(),
            state = %record.state,
            "Sale emitted"
        );
        Ok(record)
    }

    // =========================================================================
    // After-sale Operations
    // =========================================================================

    pub async fn reconcile(&self, record: &SaleRecord) -> FiscalResult<ReconcileOutcome> {
        self.reconciler.reconcile(record).await
    }

    pub async fn reconcile_by_id(&self, id: &str) -> FiscalResult<ReconcileOutcome> {
        self.reconciler.reconcile_by_id(id).await
    }

    pub async fn reconcile_pending(&self, limit: i64) -> FiscalResult<ReconcileReport> {
        self.reconciler.reconcile_pending(limit).await
    }

    pub async fn void(&self, record: &SaleRecord) -> FiscalResult<VoidOutcome> {
        self.voids.void(record).await
    }

    pub async fn void_by_id(&self, id: &str) -> FiscalResult<VoidOutcome> {
        self.voids.void_by_id(id).await
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for wiring an engine to a database and an API.
pub struct FiscalEngineBuilder {
    config: FiscalConfig,
    api: Option<Arc<dyn FiscalApi>>,
    allocator: Option<Arc<dyn SequenceAllocator>>,
    store: Option<Arc<dyn SaleRecordStore>>,
}

impl FiscalEngineBuilder {
    pub fn new(config: FiscalConfig) -> Self {
        FiscalEngineBuilder {
            config,
            api: None,
            allocator: None,
            store: None,
        }
    }

    /// Uses the database's series counters and sale records.
    pub fn with_database(mut self, db: &Database) -> Self {
        self.allocator = Some(Arc::new(db.series()));
        self.store = Some(Arc::new(db.sales()));
        self
    }

    /// Replaces the HTTP client (defaults to [`ApiSunatClient`]).
    pub fn with_api(mut self, api: Arc<dyn FiscalApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn SequenceAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SaleRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> FiscalResult<FiscalEngine> {
        self.config.validate()?;

        let allocator = self
            .allocator
            .ok_or_else(|| FiscalError::Config("Sequence allocator required".into()))?;
        let store = self
            .store
            .ok_or_else(|| FiscalError::Config("Sale record store required".into()))?;
        let api: Arc<dyn FiscalApi> = match self.api {
            Some(api) => api,
            None => Arc::new(ApiSunatClient::new(&self.config.api)?),
        };

        Ok(FiscalEngine::new(&self.config, api, allocator, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::ScriptedApi;
    use crate::protocol::{ApiResponse, EmissionPayload};
    use crate::store::mock::{MemoryAllocator, MemoryStore};
    use martillo_core::{CartLine, Customer, DocumentState, Money, PaymentMethod, Quantity, TaxIdKind};

    fn boleta() -> Cart {
        Cart {
            document_kind: DocumentKind::Boleta,
            lines: vec![CartLine::new(
                "Martillo de uña 16oz",
                Quantity::from_units(3),
                Money::from_cents(1000),
            )],
            customer: Customer::default(),
            payment_method: PaymentMethod::Cash,
        }
    }

    fn engine(
        api: ScriptedApi,
        allocator: MemoryAllocator,
    ) -> (FiscalEngine, Arc<ScriptedApi>, Arc<MemoryAllocator>, Arc<MemoryStore>) {
        let api = Arc::new(api);
        let allocator = Arc::new(allocator);
        let store = Arc::new(MemoryStore::default());
        let engine = FiscalEngineBuilder::new(FiscalConfig::default())
            .with_api(api.clone())
            .with_allocator(allocator.clone())
            .with_store(store.clone())
            .build()
            .unwrap();
        (engine, api, allocator, store)
    }

    #[tokio::test]
    async fn test_emit_happy_path() {
        let (engine, api, _, store) =
            engine(ScriptedApi::accepting(), MemoryAllocator::starting_at("B001", 41));

        let record = engine.emit("cart-1", &boleta()).await.unwrap();
        assert_eq!(record.series, "B001");
        assert_eq!(record.number, 42);
        assert_eq!(record.state, DocumentState::Accepted);
        assert_eq!(record.items[0].unit_value_net.to_string(), "8.474576");
        assert_eq!(record.total.to_decimal_string(), "30.00");
        assert_eq!(api.submitted_numbers(), vec![42]);
        assert!(store.state_of(&record.id).is_some());
        assert!(!engine.is_in_flight("cart-1"));
    }

    #[tokio::test]
    async fn test_invalid_factura_burns_no_number() {
        let (engine, api, allocator, _) = engine(ScriptedApi::accepting(), MemoryAllocator::default());

        let mut cart = boleta();
        cart.document_kind = DocumentKind::Factura;
        let err = engine.emit("cart-2", &cart).await.unwrap_err();

        assert!(matches!(err, FiscalError::Validation(_)));
        assert_eq!(allocator.calls(), 0);
        assert!(api.submitted_numbers().is_empty());
    }

    #[tokio::test]
    async fn test_factura_with_ruc_uses_factura_series() {
        let (engine, _, _, _) = engine(ScriptedApi::accepting(), MemoryAllocator::default());

        let mut cart = boleta();
        cart.document_kind = DocumentKind::Factura;
        cart.customer = Customer {
            tax_id_kind: Some(TaxIdKind::Ruc),
            tax_id: Some("20601234567".into()),
            name: "CONSTRUCTORA ANDINA S.A.C.".into(),
            address: None,
        };

        let record = engine.emit("cart-3", &cart).await.unwrap();
        assert_eq!(record.series, "F001");
        assert_eq!(record.number, 1);
        assert_eq!(record.customer.tax_id, "20601234567");
        assert_eq!(record.customer.address, "-");
    }

    #[tokio::test]
    async fn test_large_quantity_factura_emits() {
        let (engine, api, allocator, _) = engine(ScriptedApi::accepting(), MemoryAllocator::default());

        let cart = Cart {
            document_kind: DocumentKind::Factura,
            lines: vec![CartLine::new(
                "Arandela plana 1/4",
                Quantity::from_units(100_000),
                Money::from_cents(1),
            )],
            customer: Customer {
                tax_id_kind: Some(TaxIdKind::Ruc),
                tax_id: Some("20601234567".into()),
                name: "CONSTRUCTORA ANDINA S.A.C.".into(),
                address: None,
            },
            payment_method: PaymentMethod::Cash,
        };

        let record = engine.emit("cart-9", &cart).await.unwrap();
        assert_eq!(record.total.cents(), 100_000);
        assert_eq!(allocator.calls(), 1);
        assert_eq!(api.submitted_numbers(), vec![1]);
    }

    #[tokio::test]
    async fn test_allocator_down_fails_closed() {
        let allocator = MemoryAllocator {
            unavailable: true,
            ..Default::default()
        };
        let (engine, api, _, store) = engine(ScriptedApi::accepting(), allocator);

        let err = engine.emit("cart-4", &boleta()).await.unwrap_err();
        assert!(matches!(err, FiscalError::SequenceUnavailable { .. }));
        assert!(api.submitted_numbers().is_empty());
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_emission_leaves_no_record() {
        let (engine, _, _, store) = engine(
            ScriptedApi::colliding_on((1..100).collect()),
            MemoryAllocator::default(),
        );

        let err = engine.emit("cart-5", &boleta()).await.unwrap_err();
        assert!(matches!(err, FiscalError::EmissionExhausted { attempts: 5, .. }));
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_document_is_a_record() {
        let api = ScriptedApi::new(|_| {
            Ok(ApiResponse {
                success: true,
                message: Some("RECHAZADO: el documento contiene errores".into()),
                payload: Some(EmissionPayload::with_estado("RECHAZADO")),
            })
        });
        let (engine, _, _, _) = engine(api, MemoryAllocator::default());

        let record = engine.emit("cart-6", &boleta()).await.unwrap();
        assert_eq!(record.state, DocumentState::Rejected);
    }

    #[tokio::test]
    async fn test_second_emit_for_same_cart_is_refused() {
        let (engine, _, _, _) = engine(ScriptedApi::accepting(), MemoryAllocator::default());

        let _held = InFlightGuard::acquire(&engine.in_flight, "cart-7").unwrap();
        let err = engine.emit("cart-7", &boleta()).await.unwrap_err();
        assert!(matches!(err, FiscalError::EmissionInFlight { .. }));

        // Other carts are not blocked.
        assert!(engine.emit("cart-8", &boleta()).await.is_ok());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let carts: InFlight = Arc::new(Mutex::new(HashSet::new()));
        {
            let _guard = InFlightGuard::acquire(&carts, "a").unwrap();
            assert!(InFlightGuard::acquire(&carts, "a").is_none());
        }
        assert!(InFlightGuard::acquire(&carts, "a").is_some());
    }

    #[test]
    fn test_builder_requires_storage() {
        let result = FiscalEngineBuilder::new(FiscalConfig::default())
            .with_api(Arc::new(ScriptedApi::accepting()))
            .build();
        assert!(matches!(result, Err(FiscalError::Config(_))));
    }
}
