//! # Domain Types
//!
//! Core domain types of the fiscal emission engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  INBOUND (from the cart UI)          PERSISTED                          │
//! │  ┌─────────────────┐                 ┌─────────────────────────────┐   │
//! │  │      Cart       │   build+emit    │         SaleRecord          │   │
//! │  │  document_kind  │ ──────────────► │  series + number (unique)   │   │
//! │  │  lines[]        │                 │  customer snapshot          │   │
//! │  │  customer       │                 │  items[] (price at sale)    │   │
//! │  │  payment_method │                 │  state  (DocumentState)     │   │
//! │  └─────────────────┘                 │  hash, artifacts            │   │
//! │                                      └─────────────────────────────┘   │
//! │                                                                         │
//! │  DocumentState:                                                        │
//! │    PENDING_EMISSION ──► ACCEPTED | PENDING | REJECTED ──► VOIDED        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, NetUnitValue, Quantity};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1800 bps = 18% (IGV).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage string without trailing zeros
    /// (`"18"`, `"10.5"`), as sent in `porcentaje_igv`.
    pub fn percentage_string(&self) -> String {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            whole.to_string()
        } else {
            format!("{}.{}", whole, format!("{:02}", frac).trim_end_matches('0'))
        }
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::from_bps(crate::DEFAULT_TAX_RATE_BPS)
    }
}

// =============================================================================
// Document Kind
// =============================================================================

/// The two fiscal document kinds issued at the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Consumer receipt; may use an anonymous customer identity.
    Boleta,
    /// Business invoice; requires the buyer's RUC.
    Factura,
}

impl DocumentKind {
    /// The value the fiscal API expects in `documento`.
    pub const fn api_code(&self) -> &'static str {
        match self {
            DocumentKind::Boleta => "boleta",
            DocumentKind::Factura => "factura",
        }
    }

    /// First letter every series of this kind must start with.
    pub const fn series_prefix(&self) -> char {
        match self {
            DocumentKind::Boleta => 'B',
            DocumentKind::Factura => 'F',
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_code())
    }
}

/// A fiscal document stream with its own counter (`B001`, `F001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentSeries {
    pub code: String,
    pub kind: DocumentKind,
}

impl DocumentSeries {
    pub fn new(code: impl Into<String>, kind: DocumentKind) -> Self {
        DocumentSeries {
            code: code.into(),
            kind,
        }
    }
}

impl fmt::Display for DocumentSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Kind of customer tax identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TaxIdKind {
    /// National identity document, 8 digits.
    Dni,
    /// Taxpayer registry number, 11 digits.
    Ruc,
}

impl TaxIdKind {
    /// Catalog code sent as `cliente_tipo_de_documento`.
    pub const fn code(&self) -> &'static str {
        match self {
            TaxIdKind::Dni => "1",
            TaxIdKind::Ruc => "6",
        }
    }

    /// Number of digits a valid identifier of this kind has.
    pub const fn expected_len(&self) -> usize {
        match self {
            TaxIdKind::Dni => 8,
            TaxIdKind::Ruc => 11,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            TaxIdKind::Dni => "DNI",
            TaxIdKind::Ruc => "RUC",
        }
    }
}

/// Customer as captured by the cart UI. Every field may be missing for a
/// walk-in boleta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub tax_id_kind: Option<TaxIdKind>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

impl Customer {
    /// True when no identifying data was captured.
    pub fn is_anonymous(&self) -> bool {
        self.tax_id
            .as_deref()
            .map(str::trim)
            .map_or(true, str::is_empty)
    }
}

/// Normalized customer identity written on the document and frozen on the
/// sale record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerIdentity {
    pub tax_id_kind: TaxIdKind,
    pub tax_id: String,
    pub name: String,
    pub address: String,
}

impl CustomerIdentity {
    /// Generic consumer identity used for walk-in boletas.
    pub fn anonymous() -> Self {
        CustomerIdentity {
            tax_id_kind: TaxIdKind::Dni,
            tax_id: "99999999".to_string(),
            name: "CLIENTE VARIOS".to_string(),
            address: "-".to_string(),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Transfer,
    Yape,
    Plin,
}

// =============================================================================
// Cart (inbound)
// =============================================================================

/// One cart line: gross (tax-inclusive) unit price times quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub name: String,
    #[ts(type = "string")]
    pub quantity: Quantity,
    pub unit_price_gross: Money,
}

impl CartLine {
    pub fn new(name: impl Into<String>, quantity: Quantity, unit_price_gross: Money) -> Self {
        CartLine {
            name: name.into(),
            quantity,
            unit_price_gross,
        }
    }

    /// Tax-inclusive line total, rounded to the céntimo.
    pub fn line_total(&self) -> Money {
        self.unit_price_gross.multiply_quantity(self.quantity)
    }
}

/// The cart handed over by the UI when the seller presses "emit".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub document_kind: DocumentKind,
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl Cart {
    /// Tax-inclusive document total.
    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }
}

// =============================================================================
// Document State
// =============================================================================

/// Lifecycle of an emitted document.
///
/// ## Transitions
/// ```text
/// PENDING_EMISSION ──► ACCEPTED ───► VOIDED             (void workflow)
///          ├─────────► PENDING ──┬─► ACCEPTED/REJECTED (reconciler)
///          │                     └─► VOIDED             (void workflow)
///          └─────────► REJECTED   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentState {
    /// Built and numbered, not yet confirmed by the authority. Never persisted.
    PendingEmission,
    /// Accepted by the authority.
    Accepted,
    /// Received by the authority, verdict not yet available.
    Pending,
    /// Explicitly rejected; a human must issue a new document.
    Rejected,
    /// Cancelled through the void workflow.
    Voided,
}

impl DocumentState {
    /// Maps the authority's `estado` vocabulary.
    ///
    /// ## Example
    /// ```rust
    /// use martillo_core::DocumentState;
    ///
    /// assert_eq!(DocumentState::from_remote("ACEPTADO"), Some(DocumentState::Accepted));
    /// assert_eq!(DocumentState::from_remote("desconocido"), None);
    /// ```
    pub fn from_remote(estado: &str) -> Option<Self> {
        match estado.trim().to_uppercase().as_str() {
            "ACEPTADO" | "ACEPTADA" => Some(DocumentState::Accepted),
            "PENDIENTE" => Some(DocumentState::Pending),
            "RECHAZADO" | "RECHAZADA" => Some(DocumentState::Rejected),
            "ANULADO" | "ANULADA" | "DE BAJA" => Some(DocumentState::Voided),
            _ => None,
        }
    }

    /// True when this is a lifecycle move the engine may perform.
    pub fn can_transition_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (PendingEmission, Accepted | Pending | Rejected)
                | (Pending, Accepted | Rejected | Voided)
                | (Accepted, Voided)
        )
    }

    /// The subset of moves the status reconciler may make: a PENDING
    /// verdict settling. Voiding belongs to the void workflow alone.
    pub fn can_reconcile_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!((self, next), (Pending, Accepted | Rejected))
    }

    /// Validated transition.
    pub fn transition(self, next: DocumentState) -> CoreResult<DocumentState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidStateTransition {
                from: self,
                to: next,
            })
        }
    }

    /// REJECTED and VOIDED are never touched by automatic flows.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, DocumentState::Rejected | DocumentState::Voided)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentState::PendingEmission => "PENDING_EMISSION",
            DocumentState::Accepted => "ACCEPTED",
            DocumentState::Pending => "PENDING",
            DocumentState::Rejected => "REJECTED",
            DocumentState::Voided => "VOIDED",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale Record (persisted)
// =============================================================================

/// Links to the artifacts generated by the authority. Stored, never rendered
/// here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentArtifacts {
    pub xml: Option<String>,
    pub cdr: Option<String>,
    pub pdf_ticket: Option<String>,
    pub pdf_a4: Option<String>,
}

/// A line item frozen at the moment of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRecordItem {
    pub line_no: i64,
    pub description: String,
    #[ts(type = "string")]
    pub quantity: Quantity,
    pub unit_of_measure: String,
    /// Tax-inclusive unit price charged at the counter.
    pub unit_price_gross: Money,
    /// Tax-exclusive unit value as declared to the authority.
    pub unit_value_net: NetUnitValue,
    /// Tax-inclusive line total.
    pub line_total: Money,
}

/// The committed fiscal transaction.
///
/// Created once per terminal emission outcome, mutated only by the status
/// reconciler and the void workflow, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRecord {
    pub id: String,
    pub document_kind: DocumentKind,
    pub series: String,
    pub number: i64,
    pub customer: CustomerIdentity,
    pub payment_method: PaymentMethod,
    pub items: Vec<SaleRecordItem>,
    /// Taxable base (total without IGV).
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub tax_rate: TaxRate,
    pub currency: String,
    pub state: DocumentState,
    /// Verification hash returned by the authority.
    pub hash: Option<String>,
    /// Last human-readable message from the authority.
    pub remote_message: Option<String>,
    pub artifacts: DocumentArtifacts,
    #[ts(as = "String")]
    pub emitted_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl SaleRecord {
    /// Printed document number, e.g. `B001-00000042`.
    pub fn document_number(&self) -> String {
        format!("{}-{:08}", self.series, self.number)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_percentage_string() {
        assert_eq!(TaxRate::from_bps(1800).percentage_string(), "18");
        assert_eq!(TaxRate::from_bps(1050).percentage_string(), "10.5");
        assert_eq!(TaxRate::from_bps(825).percentage_string(), "8.25");
        assert_eq!(TaxRate::default().bps(), 1800);
    }

    #[test]
    fn test_document_kind_codes() {
        assert_eq!(DocumentKind::Boleta.api_code(), "boleta");
        assert_eq!(DocumentKind::Factura.series_prefix(), 'F');
        assert_eq!(TaxIdKind::Ruc.code(), "6");
        assert_eq!(TaxIdKind::Dni.expected_len(), 8);
    }

    #[test]
    fn test_state_transitions() {
        use DocumentState::*;

        assert!(PendingEmission.can_transition_to(Accepted));
        assert!(PendingEmission.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Voided));

        assert!(!Rejected.can_transition_to(Voided));
        assert!(!Voided.can_transition_to(Accepted));
        assert!(!Accepted.can_transition_to(PendingEmission));
        assert!(!PendingEmission.can_transition_to(Voided));
        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Accepted.can_transition_to(Rejected));

        assert!(Rejected.transition(Accepted).is_err());
        assert_eq!(Pending.transition(Accepted).unwrap(), Accepted);
    }

    #[test]
    fn test_reconciler_only_settles_pending() {
        use DocumentState::*;

        assert!(Pending.can_reconcile_to(Accepted));
        assert!(Pending.can_reconcile_to(Rejected));
        assert!(!Pending.can_reconcile_to(Voided));
        assert!(!Accepted.can_reconcile_to(Pending));
        assert!(!Accepted.can_reconcile_to(Rejected));
        assert!(!Accepted.can_reconcile_to(Voided));
        assert!(!Voided.can_reconcile_to(Accepted));
    }

    #[test]
    fn test_state_from_remote() {
        assert_eq!(DocumentState::from_remote("ACEPTADO"), Some(DocumentState::Accepted));
        assert_eq!(DocumentState::from_remote("pendiente"), Some(DocumentState::Pending));
        assert_eq!(DocumentState::from_remote("RECHAZADO"), Some(DocumentState::Rejected));
        assert_eq!(DocumentState::from_remote("ANULADO"), Some(DocumentState::Voided));
        assert_eq!(DocumentState::from_remote(""), None);
    }

    #[test]
    fn test_state_serializes_screaming_snake() {
        let json = serde_json::to_string(&DocumentState::PendingEmission).unwrap();
        assert_eq!(json, "\"PENDING_EMISSION\"");
    }

    #[test]
    fn test_cart_total() {
        let cart = Cart {
            document_kind: DocumentKind::Boleta,
            lines: vec![
                CartLine::new("Martillo", Quantity::from_units(2), Money::from_cents(2550)),
                CartLine::new("Cable 14 AWG", Quantity::from_milli(2500), Money::from_cents(350)),
            ],
            customer: Customer::default(),
            payment_method: PaymentMethod::Cash,
        };
        assert_eq!(cart.total().cents(), 5100 + 875);
        assert!(cart.customer.is_anonymous());
    }
}
