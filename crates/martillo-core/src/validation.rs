//! # Validation Module
//!
//! Local preconditions checked before a sequence number is allocated.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Web UI                                                       │
//! │  └── Immediate feedback (empty cart, missing RUC)                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before the allocator)                           │
//! │  ├── Cart lines: non-empty, positive quantities and prices             │
//! │  ├── Series code shape and kind                                        │
//! │  └── Customer identity: DNI 8 digits, RUC 11 digits                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database                                                     │
//! │  └── UNIQUE(series, number)                                            │
//! │                                                                         │
//! │  A failure here never burns a correlative number.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use martillo_core::validation::{validate_dni, validate_ruc};
//!
//! assert!(validate_dni("45678912").is_ok());
//! assert!(validate_ruc("20123456789").is_ok());
//! assert!(validate_ruc("2012345678").is_err());
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{CartLine, Customer, CustomerIdentity, DocumentKind, TaxIdKind};
use crate::{ANONYMOUS_BOLETA_LIMIT_CENTS, MAX_DOCUMENT_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 250;

// =============================================================================
// Tax Identifiers
// =============================================================================

fn validate_digits(field: &str, value: &str, expected: usize) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only digits".to_string(),
        });
    }
    if value.len() != expected {
        return Err(ValidationError::WrongLength {
            field: field.to_string(),
            expected,
        });
    }
    Ok(())
}

/// Validates a DNI (8 digits).
pub fn validate_dni(dni: &str) -> ValidationResult<()> {
    validate_digits("DNI", dni.trim(), TaxIdKind::Dni.expected_len())
}

/// Validates a RUC (11 digits).
pub fn validate_ruc(ruc: &str) -> ValidationResult<()> {
    validate_digits("RUC", ruc.trim(), TaxIdKind::Ruc.expected_len())
}

/// Validates an identifier against its declared kind.
pub fn validate_tax_id(kind: TaxIdKind, value: &str) -> ValidationResult<()> {
    match kind {
        TaxIdKind::Dni => validate_dni(value),
        TaxIdKind::Ruc => validate_ruc(value),
    }
}

// =============================================================================
// Series
// =============================================================================

/// Validates the shape of a series code: one letter followed by three
/// alphanumerics (`B001`, `F002`, `BA01`).
pub fn validate_series_code(code: &str) -> ValidationResult<()> {
    let invalid = || ValidationError::InvalidFormat {
        field: "series".to_string(),
        reason: "must be one letter followed by three letters or digits".to_string(),
    };

    let mut chars = code.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        Some(_) => return Err(invalid()),
        None => return Err(ValidationError::required("series")),
    }
    let rest: Vec<char> = chars.collect();
    if rest.len() != 3 || !rest.iter().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(invalid());
    }
    Ok(())
}

/// Validates the series shape and that it belongs to the document kind.
///
/// ## Example
/// ```rust
/// use martillo_core::validation::validate_series_for_kind;
/// use martillo_core::DocumentKind;
///
/// assert!(validate_series_for_kind("B001", DocumentKind::Boleta).is_ok());
/// assert!(validate_series_for_kind("F001", DocumentKind::Boleta).is_err());
/// ```
pub fn validate_series_for_kind(code: &str, kind: DocumentKind) -> CoreResult<()> {
    validate_series_code(code)?;
    if !code.starts_with(kind.series_prefix()) {
        return Err(CoreError::SeriesKindMismatch {
            series: code.to_string(),
            kind,
        });
    }
    Ok(())
}

// =============================================================================
// Cart Lines
// =============================================================================

/// Validates the lines of a cart.
///
/// ## Rules
/// - At least one line, at most [`MAX_DOCUMENT_LINES`]
/// - Every line has a description
/// - Quantities and gross unit prices are positive
pub fn validate_lines(lines: &[CartLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    if lines.len() > MAX_DOCUMENT_LINES {
        return Err(ValidationError::TooManyLines {
            max: MAX_DOCUMENT_LINES,
        });
    }

    for line in lines {
        let name = line.name.trim();
        if name.is_empty() {
            return Err(ValidationError::required("item description"));
        }
        if name.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::TooLong {
                field: "item description".to_string(),
                max: MAX_DESCRIPTION_LEN,
            });
        }
        if !line.quantity.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: format!("quantity of {}", name),
            });
        }
        if !line.unit_price_gross.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: format!("price of {}", name),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Customer Identity
// =============================================================================

/// Resolves the identity written on the document.
///
/// ## Rules
/// ```text
/// FACTURA  RUC (11 digits) + business name, always
/// BOLETA   no tax id  → anonymous identity (only below S/ 700)
///          tax id     → DNI 8 digits or RUC 11 digits, plus a name
/// ```
/// When the kind is not given it is inferred from the identifier's length.
/// A missing address becomes `-`.
pub fn resolve_customer(
    kind: DocumentKind,
    customer: &Customer,
    total: Money,
) -> ValidationResult<CustomerIdentity> {
    let address = customer
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("-")
        .to_string();

    if customer.is_anonymous() {
        return match kind {
            DocumentKind::Factura => Err(ValidationError::required("RUC")),
            DocumentKind::Boleta if total.cents() >= ANONYMOUS_BOLETA_LIMIT_CENTS => {
                Err(ValidationError::required("customer DNI"))
            }
            DocumentKind::Boleta => Ok(CustomerIdentity {
                address,
                ..CustomerIdentity::anonymous()
            }),
        };
    }

    let tax_id = customer.tax_id.as_deref().unwrap_or_default().trim().to_string();
    let tax_id_kind = match (kind, customer.tax_id_kind) {
        (DocumentKind::Factura, Some(TaxIdKind::Dni)) => {
            return Err(ValidationError::InvalidFormat {
                field: "customer".to_string(),
                reason: "a factura requires a RUC".to_string(),
            })
        }
        (DocumentKind::Factura, _) => TaxIdKind::Ruc,
        (DocumentKind::Boleta, Some(declared)) => declared,
        (DocumentKind::Boleta, None) if tax_id.len() == TaxIdKind::Ruc.expected_len() => {
            TaxIdKind::Ruc
        }
        (DocumentKind::Boleta, None) => TaxIdKind::Dni,
    };
    validate_tax_id(tax_id_kind, &tax_id)?;

    let name = customer.name.trim();
    if name.is_empty() {
        let field = match kind {
            DocumentKind::Factura => "business name",
            DocumentKind::Boleta => "customer name",
        };
        return Err(ValidationError::required(field));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "customer name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(CustomerIdentity {
        tax_id_kind,
        tax_id,
        name: name.to_string(),
        address,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Quantity;

    fn line(name: &str, qty: Quantity, cents: i64) -> CartLine {
        CartLine::new(name, qty, Money::from_cents(cents))
    }

    fn customer(kind: Option<TaxIdKind>, id: &str, name: &str) -> Customer {
        Customer {
            tax_id_kind: kind,
            tax_id: Some(id.to_string()),
            name: name.to_string(),
            address: None,
        }
    }

    #[test]
    fn test_validate_tax_ids() {
        assert!(validate_dni("12345678").is_ok());
        assert!(matches!(
            validate_dni("1234567"),
            Err(ValidationError::WrongLength { expected: 8, .. })
        ));
        assert!(matches!(
            validate_ruc("2012345678A"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(validate_ruc(""), Err(ValidationError::Required { .. })));
    }

    #[test]
    fn test_validate_series() {
        assert!(validate_series_code("B001").is_ok());
        assert!(validate_series_code("FA12").is_ok());
        assert!(validate_series_code("b001").is_err());
        assert!(validate_series_code("B01").is_err());
        assert!(validate_series_code("B0011").is_err());

        assert!(matches!(
            validate_series_for_kind("B001", DocumentKind::Factura),
            Err(CoreError::SeriesKindMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_lines() {
        assert!(matches!(validate_lines(&[]), Err(ValidationError::EmptyCart)));
        assert!(validate_lines(&[line("Martillo", Quantity::from_units(1), 2550)]).is_ok());
        assert!(validate_lines(&[line("Martillo", Quantity::from_units(0), 2550)]).is_err());
        assert!(validate_lines(&[line("Martillo", Quantity::from_units(1), 0)]).is_err());
        assert!(validate_lines(&[line("  ", Quantity::from_units(1), 100)]).is_err());

        let many: Vec<CartLine> = (0..=MAX_DOCUMENT_LINES)
            .map(|i| line(&format!("Item {}", i), Quantity::from_units(1), 100))
            .collect();
        assert!(matches!(
            validate_lines(&many),
            Err(ValidationError::TooManyLines { .. })
        ));
    }

    #[test]
    fn test_anonymous_boleta_falls_back_to_generic_identity() {
        let identity =
            resolve_customer(DocumentKind::Boleta, &Customer::default(), Money::from_cents(3000))
                .unwrap();
        assert_eq!(identity, CustomerIdentity::anonymous());
        assert_eq!(identity.tax_id_kind.code(), "1");
        assert_eq!(identity.tax_id, "99999999");
    }

    #[test]
    fn test_anonymous_boleta_above_limit_requires_identity() {
        let result = resolve_customer(
            DocumentKind::Boleta,
            &Customer::default(),
            Money::from_cents(ANONYMOUS_BOLETA_LIMIT_CENTS),
        );
        assert!(matches!(result, Err(ValidationError::Required { .. })));
    }

    #[test]
    fn test_factura_requires_valid_ruc_and_name() {
        let total = Money::from_cents(10_000);

        assert!(resolve_customer(DocumentKind::Factura, &Customer::default(), total).is_err());
        assert!(resolve_customer(
            DocumentKind::Factura,
            &customer(None, "2012345678", "Ferretería SAC"),
            total
        )
        .is_err());
        assert!(resolve_customer(
            DocumentKind::Factura,
            &customer(None, "20123456789", ""),
            total
        )
        .is_err());
        assert!(resolve_customer(
            DocumentKind::Factura,
            &customer(Some(TaxIdKind::Dni), "12345678", "Juan"),
            total
        )
        .is_err());

        let identity = resolve_customer(
            DocumentKind::Factura,
            &customer(None, " 20123456789 ", "Ferretería SAC"),
            total,
        )
        .unwrap();
        assert_eq!(identity.tax_id_kind, TaxIdKind::Ruc);
        assert_eq!(identity.tax_id, "20123456789");
        assert_eq!(identity.address, "-");
    }

    #[test]
    fn test_boleta_infers_kind_from_length() {
        let total = Money::from_cents(1000);
        let dni = resolve_customer(DocumentKind::Boleta, &customer(None, "45678912", "Ana"), total)
            .unwrap();
        assert_eq!(dni.tax_id_kind, TaxIdKind::Dni);

        let ruc = resolve_customer(
            DocumentKind::Boleta,
            &customer(None, "10456789123", "Ana Torres"),
            total,
        )
        .unwrap();
        assert_eq!(ruc.tax_id_kind, TaxIdKind::Ruc);

        assert!(resolve_customer(
            DocumentKind::Boleta,
            &customer(Some(TaxIdKind::Dni), "10456789123", "Ana"),
            total
        )
        .is_err());
    }
}
