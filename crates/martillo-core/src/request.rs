//! # Document Request Builder
//!
//! Turns a cart into an immutable [`FiscalDocumentRequest`]. Pure: no clock,
//! no I/O. The emission time and the candidate number are inputs.
//!
//! ## Tax Decomposition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Prices at the counter are tax-inclusive.                              │
//! │                                                                         │
//! │  per line:   valor_unitario = gross / (1 + rate)   → 6 decimals        │
//! │              line total     = gross × quantity     → céntimos          │
//! │                                                                         │
//! │  document:   total          = Σ line totals                            │
//! │              taxable base   = total / (1 + rate)   → céntimos          │
//! │              tax            = total − taxable base                     │
//! │                                                                         │
//! │  check:      Σ(valor_unitario × quantity) × (1 + rate) ≈ total         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use chrono::{FixedOffset, TimeZone};
//! use martillo_core::request::{DocumentRequestBuilder, RequestSettings};
//! use martillo_core::{Cart, CartLine, Customer, DocumentKind, DocumentSeries, Money, PaymentMethod, Quantity};
//!
//! let cart = Cart {
//!     document_kind: DocumentKind::Boleta,
//!     lines: vec![CartLine::new("Martillo", Quantity::from_units(3), Money::from_cents(1000))],
//!     customer: Customer::default(),
//!     payment_method: PaymentMethod::Cash,
//! };
//! let series = DocumentSeries::new("B001", DocumentKind::Boleta);
//! let lima = FixedOffset::west_opt(5 * 3600).unwrap();
//! let issued_at = lima.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
//!
//! let builder = DocumentRequestBuilder::new(RequestSettings::default());
//! let request = builder.build(&cart, &series, 42, issued_at).unwrap();
//!
//! assert_eq!(request.items[0].unit_value_net.to_string(), "8.474576");
//! assert_eq!(request.total.to_decimal_string(), "30.00");
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, NetUnitValue, Quantity, NET_VALUE_SCALE, QUANTITY_SCALE};
use crate::types::{Cart, CustomerIdentity, DocumentKind, DocumentSeries, TaxRate};
use crate::validation::{resolve_customer, validate_lines, validate_series_for_kind};

/// Tax-affectation code for "taxable, for consideration" (gravado - onerosa).
pub const TAX_AFFECTATION_TAXABLE: &str = "10";

// =============================================================================
// Settings
// =============================================================================

/// Fixed catalog values stamped on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettings {
    pub tax_rate: TaxRate,
    /// ISO 4217 currency, `PEN`.
    pub currency: String,
    /// Operation type catalog code, `0101` for an internal sale.
    pub operation_type: String,
    /// Unit of measure catalog code, `NIU` for units.
    pub unit_of_measure: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        RequestSettings {
            tax_rate: TaxRate::default(),
            currency: "PEN".to_string(),
            operation_type: "0101".to_string(),
            unit_of_measure: "NIU".to_string(),
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// One document line, tax-decomposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalLineItem {
    pub description: String,
    pub quantity: Quantity,
    pub unit_of_measure: String,
    /// Tax-exclusive unit value, six decimals.
    pub unit_value_net: NetUnitValue,
    /// Tax-inclusive unit price the customer saw.
    pub unit_price_gross: Money,
    pub tax_rate: TaxRate,
    pub tax_affectation_code: String,
    /// Tax-inclusive line total, céntimos.
    pub line_total: Money,
}

/// An immutable request built per emission attempt.
///
/// Retries after a collision reuse everything but the number, see
/// [`FiscalDocumentRequest::with_number`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalDocumentRequest {
    pub document_kind: DocumentKind,
    pub series: String,
    pub number: i64,
    pub issued_at: DateTime<FixedOffset>,
    pub currency: String,
    pub operation_type: String,
    pub customer: CustomerIdentity,
    pub items: Vec<FiscalLineItem>,
    pub tax_rate: TaxRate,
    pub taxable_base: Money,
    pub tax: Money,
    pub total: Money,
}

impl FiscalDocumentRequest {
    /// Same document under another candidate number.
    pub fn with_number(&self, number: i64) -> Self {
        FiscalDocumentRequest {
            number,
            ..self.clone()
        }
    }

    /// Emission date, `YYYY-MM-DD`.
    pub fn issue_date(&self) -> String {
        self.issued_at.format("%Y-%m-%d").to_string()
    }

    /// Emission time, `HH:MM:SS`.
    pub fn issue_time(&self) -> String {
        self.issued_at.format("%H:%M:%S").to_string()
    }

    /// Recomputes the total from the declared net values:
    /// `Σ(valor_unitario × quantity) × (1 + rate)`, in céntimos.
    pub fn recomputed_total(&self) -> Money {
        recompute_total(&self.items, self.tax_rate)
    }

    /// Checks that the declared lines reconcile with the total.
    pub fn verify_reconciliation(&self) -> CoreResult<()> {
        check_reconciliation(&self.items, self.tax_rate, self.total)
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

fn recompute_total(items: &[FiscalLineItem], rate: TaxRate) -> Money {
    let net_sum: i128 = items
        .iter()
        .map(|item| item.unit_value_net.micros() as i128 * item.quantity.milli() as i128)
        .sum();

    // micro-soles × thousandths → céntimos is ÷10⁷
    let scale = (NET_VALUE_SCALE as i128 * QUANTITY_SCALE as i128) / 100;
    let numerator = net_sum * (10_000 + rate.bps() as i128);
    let denominator = scale * 10_000;
    let half = denominator / 2;
    let cents = if numerator < 0 {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    };
    Money::from_cents(cents as i64)
}

/// Tolerance in céntimos between the recomputed and the declared total.
///
/// One céntimo for the final rounding, one per line with a fractional
/// quantity (each such line total was rounded on its own), plus the
/// worst-case drift of the 6-decimal net values: half a micro-sol per
/// unit sold, grossed up by the tax rate.
fn reconciliation_tolerance(items: &[FiscalLineItem], rate: TaxRate) -> i64 {
    let fractional = items.iter().filter(|i| !i.quantity.is_whole()).count() as i64;

    let milli_units: i128 = items.iter().map(|i| i.quantity.milli().abs() as i128).sum();
    let numerator = milli_units * (10_000 + rate.bps() as i128);
    // ½ µsol per unit: ×½, ÷10³ (thousandths), ÷10⁴ (rate), ÷10⁴ (µsol → céntimo)
    let denominator: i128 = 2 * 1_000 * 10_000 * 10_000;
    let drift = (numerator + denominator - 1) / denominator;

    1 + fractional + drift as i64
}

fn check_reconciliation(items: &[FiscalLineItem], rate: TaxRate, total: Money) -> CoreResult<()> {
    let recomputed = recompute_total(items, rate);
    if (recomputed.cents() - total.cents()).abs() > reconciliation_tolerance(items, rate) {
        return Err(CoreError::TotalMismatch {
            total_cents: total.cents(),
            recomputed_cents: recomputed.cents(),
        });
    }
    Ok(())
}

// =============================================================================
// Builder
// =============================================================================

/// Builds fiscal requests from carts with a fixed set of catalog values.
#[derive(Debug, Clone, Default)]
pub struct DocumentRequestBuilder {
    settings: RequestSettings,
}

impl DocumentRequestBuilder {
    pub fn new(settings: RequestSettings) -> Self {
        DocumentRequestBuilder { settings }
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Runs every local precondition and returns the resolved customer.
    ///
    /// Callers run this BEFORE allocating a number, so a cart refused
    /// here never consumes one.
    pub fn validate(&self, cart: &Cart, series: &DocumentSeries) -> CoreResult<CustomerIdentity> {
        if series.kind != cart.document_kind {
            return Err(CoreError::SeriesKindMismatch {
                series: series.code.clone(),
                kind: cart.document_kind,
            });
        }
        validate_series_for_kind(&series.code, cart.document_kind)?;
        validate_lines(&cart.lines)?;
        let customer = resolve_customer(cart.document_kind, &cart.customer, cart.total())?;

        let items = self.line_items(cart);
        let total: Money = items.iter().map(|i| i.line_total).sum();
        check_reconciliation(&items, self.settings.tax_rate, total)?;

        Ok(customer)
    }

    /// Builds the request for `number`.
    pub fn build(
        &self,
        cart: &Cart,
        series: &DocumentSeries,
        number: i64,
        issued_at: DateTime<FixedOffset>,
    ) -> CoreResult<FiscalDocumentRequest> {
        let customer = self.validate(cart, series)?;
        let rate = self.settings.tax_rate;

        let items = self.line_items(cart);
        let total: Money = items.iter().map(|i| i.line_total).sum();
        let taxable_base = total.taxable_base(rate);

        Ok(FiscalDocumentRequest {
            document_kind: cart.document_kind,
            series: series.code.clone(),
            number,
            issued_at,
            currency: self.settings.currency.clone(),
            operation_type: self.settings.operation_type.clone(),
            customer,
            items,
            tax_rate: rate,
            taxable_base,
            tax: total - taxable_base,
            total,
        })
    }

    fn line_items(&self, cart: &Cart) -> Vec<FiscalLineItem> {
        let rate = self.settings.tax_rate;
        cart.lines
            .iter()
            .map(|line| FiscalLineItem {
                description: line.name.trim().to_string(),
                quantity: line.quantity,
                unit_of_measure: self.settings.unit_of_measure.clone(),
                unit_value_net: line.unit_price_gross.net_unit_value(rate),
                unit_price_gross: line.unit_price_gross,
                tax_rate: rate,
                tax_affectation_code: TAX_AFFECTATION_TAXABLE.to_string(),
                line_total: line.line_total(),
            })
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::types::{CartLine, Customer, PaymentMethod, TaxIdKind};
    use chrono::TimeZone;

    fn issued_at() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, 15, 30, 5)
            .unwrap()
    }

    fn cart(kind: DocumentKind, lines: Vec<CartLine>) -> Cart {
        Cart {
            document_kind: kind,
            lines,
            customer: Customer::default(),
            payment_method: PaymentMethod::Cash,
        }
    }

    fn dni_customer() -> Customer {
        Customer {
            tax_id_kind: Some(TaxIdKind::Dni),
            tax_id: Some("45678912".to_string()),
            name: "Rosa Quispe Mamani".to_string(),
            address: None,
        }
    }

    fn boleta_series() -> DocumentSeries {
        DocumentSeries::new("B001", DocumentKind::Boleta)
    }

    #[test]
    fn test_build_single_line() {
        let cart = cart(
            DocumentKind::Boleta,
            vec![CartLine::new("Martillo", Quantity::from_units(3), Money::from_cents(1000))],
        );
        let request = DocumentRequestBuilder::default()
            .build(&cart, &boleta_series(), 42, issued_at())
            .unwrap();

        assert_eq!(request.number, 42);
        assert_eq!(request.series, "B001");
        assert_eq!(request.total.cents(), 3000);
        assert_eq!(request.taxable_base.cents(), 2542);
        assert_eq!(request.tax.cents(), 458);
        assert_eq!(request.items[0].unit_value_net.to_string(), "8.474576");
        assert_eq!(request.items[0].tax_affectation_code, "10");
        assert_eq!(request.items[0].unit_of_measure, "NIU");
        assert_eq!(request.customer, CustomerIdentity::anonymous());
        assert_eq!(request.issue_date(), "2024-05-10");
        assert_eq!(request.issue_time(), "15:30:05");
    }

    #[test]
    fn test_tax_reconciliation_across_carts() {
        let builder = DocumentRequestBuilder::default();
        let prices = [1, 99, 118, 1000, 1099, 2550, 4999, 12_345];
        let quantities = [
            Quantity::from_units(1),
            Quantity::from_units(7),
            Quantity::from_milli(2500),
            Quantity::from_milli(125),
        ];

        for price in prices {
            for qty in quantities {
                let mut c = cart(
                    DocumentKind::Boleta,
                    vec![
                        CartLine::new("Clavos", qty, Money::from_cents(price)),
                        CartLine::new("Pintura", Quantity::from_units(2), Money::from_cents(3290)),
                    ],
                );
                c.customer = dni_customer();
                let request = builder.build(&c, &boleta_series(), 1, issued_at()).unwrap();
                let diff = (request.recomputed_total().cents() - request.total.cents()).abs();
                assert!(diff <= 1, "price {} qty {}: off by {}", price, qty, diff);
                assert_eq!(request.taxable_base + request.tax, request.total);
            }
        }
    }

    #[test]
    fn test_large_quantity_line_is_valid() {
        let mut c = cart(
            DocumentKind::Factura,
            vec![CartLine::new("Arandela", Quantity::from_units(100_000), Money::from_cents(1))],
        );
        c.customer = Customer {
            tax_id_kind: Some(TaxIdKind::Ruc),
            tax_id: Some("20512345678".to_string()),
            name: "Constructora Andina SAC".to_string(),
            address: None,
        };
        let series = DocumentSeries::new("F001", DocumentKind::Factura);
        let builder = DocumentRequestBuilder::default();

        assert!(builder.validate(&c, &series).is_ok());
        let request = builder.build(&c, &series, 1, issued_at()).unwrap();
        assert_eq!(request.total.cents(), 100_000);
        // 6-decimal net values drift by a few céntimos over 100 000 units
        assert_eq!(request.recomputed_total().cents(), 100_005);
        assert!(request.verify_reconciliation().is_ok());
    }

    #[test]
    fn test_with_number_keeps_everything_else() {
        let c = cart(
            DocumentKind::Boleta,
            vec![CartLine::new("Martillo", Quantity::from_units(1), Money::from_cents(2550))],
        );
        let request = DocumentRequestBuilder::default()
            .build(&c, &boleta_series(), 100, issued_at())
            .unwrap();
        let retry = request.with_number(101);

        assert_eq!(retry.number, 101);
        assert_eq!(retry.items, request.items);
        assert_eq!(retry.total, request.total);
    }

    #[test]
    fn test_factura_without_ruc_fails_validation() {
        let c = cart(
            DocumentKind::Factura,
            vec![CartLine::new("Cemento", Quantity::from_units(10), Money::from_cents(2890))],
        );
        let series = DocumentSeries::new("F001", DocumentKind::Factura);
        let result = DocumentRequestBuilder::default().validate(&c, &series);

        assert!(matches!(
            result,
            Err(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[test]
    fn test_factura_with_ruc() {
        let mut c = cart(
            DocumentKind::Factura,
            vec![CartLine::new("Cemento", Quantity::from_units(10), Money::from_cents(2890))],
        );
        c.customer = Customer {
            tax_id_kind: Some(TaxIdKind::Ruc),
            tax_id: Some("20512345678".to_string()),
            name: "Constructora Andina SAC".to_string(),
            address: Some("Av. Arequipa 123".to_string()),
        };
        let series = DocumentSeries::new("F001", DocumentKind::Factura);
        let request = DocumentRequestBuilder::default()
            .build(&c, &series, 7, issued_at())
            .unwrap();

        assert_eq!(request.customer.tax_id_kind.code(), "6");
        assert_eq!(request.customer.address, "Av. Arequipa 123");
        assert_eq!(request.total.cents(), 28_900);
    }

    #[test]
    fn test_series_kind_mismatch() {
        let c = cart(
            DocumentKind::Boleta,
            vec![CartLine::new("Martillo", Quantity::from_units(1), Money::from_cents(2550))],
        );
        let wrong = DocumentSeries::new("F001", DocumentKind::Factura);
        assert!(matches!(
            DocumentRequestBuilder::default().validate(&c, &wrong),
            Err(CoreError::SeriesKindMismatch { .. })
        ));

        let mislabelled = DocumentSeries::new("F001", DocumentKind::Boleta);
        assert!(matches!(
            DocumentRequestBuilder::default().validate(&c, &mislabelled),
            Err(CoreError::SeriesKindMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_cart_is_rejected() {
        let c = cart(DocumentKind::Boleta, vec![]);
        assert!(matches!(
            DocumentRequestBuilder::default().validate(&c, &boleta_series()),
            Err(CoreError::Validation(ValidationError::EmptyCart))
        ));
    }
}
