//! # Void Eligibility
//!
//! Local preconditions of the void workflow, checked before any remote call.
//!
//! ```text
//! emitted_at ──────────── window (3 days) ────────────┤ deadline
//!     │◄──────────── void allowed ──────────────────►│◄── credit note only ──►
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DocumentState, SaleRecord};

/// Why a record cannot be voided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum VoidRefusal {
    /// Already voided locally.
    AlreadyVoided,
    /// The record's state is not voidable (rejected documents are not
    /// legally valid, so there is nothing to cancel).
    NotVoidable { state: DocumentState },
    /// The window has closed; a credit note is the remedy.
    WindowExpired {
        deadline: DateTime<Utc>,
        window_days: i64,
    },
}

/// Last instant at which a document emitted at `emitted_at` may be voided.
///
/// ## Example
/// ```rust
/// use chrono::{Duration, Utc};
/// use martillo_core::void_policy::void_deadline;
///
/// let emitted = Utc::now() - Duration::days(4);
/// assert!(void_deadline(emitted, 3) < Utc::now());
/// ```
pub fn void_deadline(emitted_at: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    emitted_at + Duration::days(window_days)
}

/// Checks whether `record` may be voided at `now`.
pub fn check_void_eligibility(
    record: &SaleRecord,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<(), VoidRefusal> {
    match record.state {
        DocumentState::Voided => return Err(VoidRefusal::AlreadyVoided),
        DocumentState::Accepted | DocumentState::Pending => {}
        state => return Err(VoidRefusal::NotVoidable { state }),
    }

    let deadline = void_deadline(record.emitted_at, window_days);
    if now > deadline {
        return Err(VoidRefusal::WindowExpired {
            deadline,
            window_days,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Money, NetUnitValue, Quantity};
    use crate::types::{
        CustomerIdentity, DocumentArtifacts, DocumentKind, PaymentMethod, SaleRecordItem, TaxRate,
    };

    fn record(state: DocumentState, emitted_at: DateTime<Utc>) -> SaleRecord {
        SaleRecord {
            id: "r-1".to_string(),
            document_kind: DocumentKind::Boleta,
            series: "B001".to_string(),
            number: 1,
            customer: CustomerIdentity::anonymous(),
            payment_method: PaymentMethod::Cash,
            items: vec![SaleRecordItem {
                line_no: 1,
                description: "Martillo".to_string(),
                quantity: Quantity::from_units(1),
                unit_of_measure: "NIU".to_string(),
                unit_price_gross: Money::from_cents(1000),
                unit_value_net: NetUnitValue::from_micros(8_474_576),
                line_total: Money::from_cents(1000),
            }],
            subtotal: Money::from_cents(847),
            tax: Money::from_cents(153),
            total: Money::from_cents(1000),
            tax_rate: TaxRate::from_bps(1800),
            currency: "PEN".to_string(),
            state,
            hash: None,
            remote_message: None,
            artifacts: DocumentArtifacts::default(),
            emitted_at,
            updated_at: emitted_at,
            voided_at: None,
        }
    }

    #[test]
    fn test_within_window() {
        let now = Utc::now();
        let r = record(DocumentState::Accepted, now - Duration::days(2));
        assert!(check_void_eligibility(&r, now, 3).is_ok());

        let r = record(DocumentState::Pending, now - Duration::days(3));
        assert!(check_void_eligibility(&r, now, 3).is_ok());
    }

    #[test]
    fn test_window_expired_after_four_days() {
        let now = Utc::now();
        let r = record(DocumentState::Accepted, now - Duration::days(4));
        assert!(matches!(
            check_void_eligibility(&r, now, 3),
            Err(VoidRefusal::WindowExpired { window_days: 3, .. })
        ));
    }

    #[test]
    fn test_already_voided_checked_first() {
        let now = Utc::now();
        let r = record(DocumentState::Voided, now - Duration::days(10));
        assert_eq!(check_void_eligibility(&r, now, 3), Err(VoidRefusal::AlreadyVoided));
    }

    #[test]
    fn test_rejected_is_not_voidable() {
        let now = Utc::now();
        let r = record(DocumentState::Rejected, now);
        assert_eq!(
            check_void_eligibility(&r, now, 3),
            Err(VoidRefusal::NotVoidable {
                state: DocumentState::Rejected
            })
        );
    }
}
