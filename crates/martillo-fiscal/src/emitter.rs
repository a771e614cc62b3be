//! # Emission Client
//!
//! Submits a document and recovers from number collisions by trying the
//! next number, up to a fixed bound. The loop is driven by
//! [`martillo_core::emission::EmissionMachine`]; this module only performs
//! the I/O each state asks for.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Building ──Built(42)──► Submitting(42, 1)                             │
//! │                              │                                          │
//! │        "fue emitido anteriormente"        success      other failure   │
//! │                              │               │              │           │
//! │                              ▼               ▼              ▼           │
//! │                    CollisionRetry(43, 1)  Succeeded      Failed        │
//! │                              │                                          │
//! │                          Resubmit                                       │
//! │                              ▼                                          │
//! │                      Submitting(43, 2) ... Exhausted after max attempts │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The allocator is never called from here. The caller persists
//! [`EmissionResult::number`], which may differ from the candidate.

use std::sync::Arc;

use tracing::{error, info, warn};

use martillo_core::classify::is_number_already_issued;
use martillo_core::emission::{EmissionEvent, EmissionMachine, EmissionState};
use martillo_core::{CoreError, DocumentArtifacts, DocumentState, FiscalDocumentRequest};

use crate::client::FiscalApi;
use crate::error::{FiscalError, FiscalResult};
use crate::protocol::{ApiResponse, EmissionPayload};

/// Terminal outcome of an emission the authority registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionResult {
    pub series: String,
    /// The number the document was actually emitted under.
    pub number: i64,
    /// The number the caller allocated.
    pub candidate: i64,
    pub attempts: u32,
    /// `ACCEPTED`, `PENDING` or `REJECTED`.
    pub state: DocumentState,
    pub hash: Option<String>,
    pub message: Option<String>,
    pub artifacts: DocumentArtifacts,
}

impl EmissionResult {
    /// True when a collision moved the document past its candidate.
    pub fn drifted(&self) -> bool {
        self.number != self.candidate
    }
}

pub struct EmissionClient {
    api: Arc<dyn FiscalApi>,
    max_attempts: u32,
}

impl EmissionClient {
    pub fn new(api: Arc<dyn FiscalApi>, max_attempts: u32) -> Self {
        EmissionClient {
            api,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Emits `request`, starting at `request.number`.
    ///
    /// Errors:
    /// - [`FiscalError::EmissionExhausted`] when every attempt collided
    /// - [`FiscalError::EmissionFailed`] on any other refusal
    /// - [`FiscalError::Transport`] / [`FiscalError::InvalidResponse`]
    ///   when no usable answer came back (outcome unknown)
    pub async fn emit(&self, request: &FiscalDocumentRequest) -> FiscalResult<EmissionResult> {
        let mut machine = EmissionMachine::new(self.max_attempts);
        let mut accepted: Option<ApiResponse<EmissionPayload>> = None;
        let mut transport: Option<FiscalError> = None;

        machine.apply(EmissionEvent::Built {
            candidate: request.number,
        })?;

        while !machine.is_terminal() {
            let event = match machine.state().clone() {
                EmissionState::Submitting { number, attempt } => {
                    let attempt_request = request.with_number(number);
                    match self.api.submit_document(&attempt_request).await {
                        Ok(response) if response.success => {
                            accepted = Some(response);
                            EmissionEvent::Emitted
                        }
                        Ok(response) if is_number_already_issued(response.message()) => {
                            warn!(
                                series = %request.series,
                                number,
                                attempt,
                                "Number already issued, retrying with the next one"
                            );
                            EmissionEvent::Collision
                        }
                        Ok(response) => EmissionEvent::Failure {
                            message: response.message().to_string(),
                        },
                        Err(e) => {
                            let message = e.to_string();
                            transport = Some(e);
                            EmissionEvent::Failure { message }
                        }
                    }
                }
                EmissionState::CollisionRetry { .. } => EmissionEvent::Resubmit,
                _ => break,
            };
            machine.apply(event)?;
        }

        match machine.state().clone() {
            EmissionState::Succeeded { number, attempts } => {
                let payload = accepted.as_ref().and_then(|r| r.payload.clone()).unwrap_or_default();
                let result = EmissionResult {
                    series: request.series.clone(),
                    number,
                    candidate: request.number,
                    attempts,
                    state: payload.document_state(),
                    hash: payload.hash.clone(),
                    message: accepted.and_then(|r| r.message),
                    artifacts: payload.artifacts(),
                };
                info!(
                    series = %result.series,
                    number,
                    attempts,
                    state = %result.state,
                    "Document emitted"
                );
                Ok(result)
            }
            EmissionState::Exhausted {
                last_number,
                attempts,
            } => {
                error!(
                    series = %request.series,
                    last_number,
                    attempts,
                    "Emission exhausted: every number collided"
                );
                Err(FiscalError::EmissionExhausted {
                    series: request.series.clone(),
                    last_number,
                    attempts,
                })
            }
            EmissionState::Failed {
                number, message, ..
            } => {
                error!(series = %request.series, number, message = %message, "Emission failed");
                Err(transport.unwrap_or(FiscalError::EmissionFailed {
                    series: request.series.clone(),
                    number,
                    message,
                }))
            }
            state => Err(CoreError::InvalidEmissionEvent {
                state: state.to_string(),
                event: "finish".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::ScriptedApi;
    use chrono::{FixedOffset, TimeZone};
    use martillo_core::request::DocumentRequestBuilder;
    use martillo_core::{Cart, CartLine, DocumentKind, DocumentSeries, Money, PaymentMethod, Quantity};

    fn request(number: i64) -> FiscalDocumentRequest {
        let cart = Cart {
            document_kind: DocumentKind::Boleta,
            lines: vec![CartLine::new(
                "Clavos 2\" (kg)",
                Quantity::from_milli(2500),
                Money::from_cents(800),
            )],
            customer: Default::default(),
            payment_method: PaymentMethod::Cash,
        };
        let lima = FixedOffset::west_opt(5 * 3600).unwrap();
        DocumentRequestBuilder::default()
            .build(
                &cart,
                &DocumentSeries::new("B001", DocumentKind::Boleta),
                number,
                lima.with_ymd_and_hms(2026, 5, 2, 16, 30, 0).unwrap(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let api = Arc::new(ScriptedApi::accepting());
        let client = EmissionClient::new(api.clone(), 5);

        let result = client.emit(&request(7)).await.unwrap();
        assert_eq!(result.number, 7);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.state, DocumentState::Accepted);
        assert!(!result.drifted());
        assert_eq!(api.submitted_numbers(), vec![7]);
    }

    #[tokio::test]
    async fn test_collision_retry_lands_on_next_free_number() {
        let api = Arc::new(ScriptedApi::colliding_on(vec![100, 101]));
        let client = EmissionClient::new(api.clone(), 5);

        let result = client.emit(&request(100)).await.unwrap();
        assert_eq!(result.number, 102);
        assert_eq!(result.candidate, 100);
        assert_eq!(result.attempts, 3);
        assert!(result.drifted());
        assert_eq!(api.submitted_numbers(), vec![100, 101, 102]);
    }

    #[tokio::test]
    async fn test_retry_bound_is_respected() {
        let api = Arc::new(ScriptedApi::colliding_on((1..1000).collect()));
        let client = EmissionClient::new(api.clone(), 5);

        let err = client.emit(&request(10)).await.unwrap_err();
        match err {
            FiscalError::EmissionExhausted {
                last_number,
                attempts,
                ..
            } => {
                assert_eq!(last_number, 14);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected EmissionExhausted, got {:?}", other),
        }
        assert_eq!(api.submitted_numbers().len(), 5);
    }

    #[tokio::test]
    async fn test_other_failure_is_not_retried() {
        let api = Arc::new(ScriptedApi::new(|_| {
            Ok(ApiResponse::failure("El RUC del cliente no es válido"))
        }));
        let client = EmissionClient::new(api.clone(), 5);

        let err = client.emit(&request(3)).await.unwrap_err();
        match err {
            FiscalError::EmissionFailed { number, message, .. } => {
                assert_eq!(number, 3);
                assert_eq!(message, "El RUC del cliente no es válido");
            }
            other => panic!("expected EmissionFailed, got {:?}", other),
        }
        assert_eq!(api.submitted_numbers(), vec![3]);
    }

    #[tokio::test]
    async fn test_transport_error_is_surfaced_as_is() {
        let api = Arc::new(ScriptedApi::new(|_| {
            Err(FiscalError::Transport("operation timed out".into()))
        }));
        let client = EmissionClient::new(api.clone(), 5);

        let err = client.emit(&request(3)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(api.submitted_numbers().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_a_terminal_result() {
        let api = Arc::new(ScriptedApi::new(|_| {
            Ok(ApiResponse {
                success: true,
                message: Some("Rechazado por SUNAT".into()),
                payload: Some(EmissionPayload::with_estado("RECHAZADO")),
            })
        }));
        let client = EmissionClient::new(api, 5);

        let result = client.emit(&request(9)).await.unwrap();
        assert_eq!(result.state, DocumentState::Rejected);
        assert_eq!(result.message.as_deref(), Some("Rechazado por SUNAT"));
    }
}
