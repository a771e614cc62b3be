//! # martillo-core: Pure Fiscal Logic for Martillo POS
//!
//! This crate is the **heart** of the fiscal emission engine. It contains
//! every rule about electronic documents as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Martillo Fiscal Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Web UI (external)                            │   │
//! │  │    Catalog ──► Cart ──► Emit Boleta/Factura ──► Receipt         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ commands / results                     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          martillo-fiscal (API client, engine, workflows)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ martillo-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌───────┐ │   │
//! │  │   │  types  │ │  money  │ │ request  │ │ emission │ │ void  │ │   │
//! │  │   │ Record  │ │ Money   │ │ Builder  │ │ machine  │ │policy │ │   │
//! │  │   │ State   │ │Quantity │ │          │ │ classify │ │       │ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └──────────┘ └───────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               martillo-db (SQLite persistence)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (SaleRecord, DocumentState, Customer, Cart)
//! - [`money`] - Integer money, fixed-point quantities and net unit values
//! - [`error`] - Domain error types
//! - [`validation`] - Tax identifiers, series codes, carts
//! - [`request`] - Document Request Builder (cart → fiscal request)
//! - [`emission`] - Emission retry state machine
//! - [`classify`] - Classification of human-readable remote messages
//! - [`void_policy`] - Void eligibility window
//! - [`words`] - Amount-in-words legend for receipts
//!
//! ## Example Usage
//!
//! ```rust
//! use martillo_core::money::Money;
//! use martillo_core::types::TaxRate;
//!
//! // Prices are tax-inclusive céntimos
//! let gross = Money::from_cents(1000); // S/ 10.00
//! let net = gross.net_unit_value(TaxRate::from_bps(1800));
//!
//! // 10.00 / 1.18 = 8.474576 (6 decimals)
//! assert_eq!(net.to_string(), "8.474576");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classify;
pub mod emission;
pub mod error;
pub mod money;
pub mod request;
pub mod types;
pub mod validation;
pub mod void_policy;
pub mod words;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, NetUnitValue, Quantity};
pub use request::{FiscalDocumentRequest, FiscalLineItem};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default IGV rate in basis points (18%).
pub const DEFAULT_TAX_RATE_BPS: u32 = 1800;

/// Default bound on emission attempts when the remote reports collisions.
pub const DEFAULT_MAX_EMISSION_ATTEMPTS: u32 = 5;

/// Days after emission during which a document may still be voided.
///
/// ## Business Reason
/// Past this window the fiscal authority only accepts a credit note.
pub const DEFAULT_VOID_WINDOW_DAYS: i64 = 3;

/// Boletas at or above this total (céntimos) must identify the customer.
pub const ANONYMOUS_BOLETA_LIMIT_CENTS: i64 = 70_000;

/// Maximum lines allowed on a single document.
pub const MAX_DOCUMENT_LINES: usize = 100;
