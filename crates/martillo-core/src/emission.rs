//! # Emission State Machine
//!
//! The bounded collision-retry loop as plain data. The network side lives in
//! `martillo-fiscal`; this module only decides what happens next.
//!
//! ## States
//! ```text
//!                 Built{candidate}
//!   Building ─────────────────────► Submitting(n, a)
//!                                     │  │  │
//!            Emitted ─────────────────┘  │  └──── Failure ──► Failed(n, a, msg)
//!               ▼                        │
//!        Succeeded(n, a)            Collision
//!                                        │
//!                       a < max ─────────┴──────── a == max
//!                          ▼                          ▼
//!               CollisionRetry(n+1, a)        Exhausted(n, a)
//!                          │
//!                          └── Resubmit ──► Submitting(n+1, a+1)
//! ```
//!
//! `Exhausted` ("collision storm") and `Failed` ("API said no / API down")
//! are distinct terminal states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// States and Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EmissionState {
    /// Request not built yet, no candidate number.
    Building,
    /// Attempt `attempt` (1-based) is in flight with `number`.
    Submitting { number: i64, attempt: u32 },
    /// The last attempt collided; `number` is the next candidate.
    CollisionRetry { number: i64, attempt: u32 },
    /// The remote returned a terminal outcome for `number`.
    Succeeded { number: i64, attempts: u32 },
    /// Every allowed attempt collided.
    Exhausted { last_number: i64, attempts: u32 },
    /// A non-collision failure; never retried.
    Failed {
        number: i64,
        attempts: u32,
        message: String,
    },
}

impl EmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EmissionState::Succeeded { .. }
                | EmissionState::Exhausted { .. }
                | EmissionState::Failed { .. }
        )
    }

    /// Number currently being (or last) submitted, if any.
    pub fn current_number(&self) -> Option<i64> {
        match self {
            EmissionState::Building => None,
            EmissionState::Submitting { number, .. }
            | EmissionState::CollisionRetry { number, .. }
            | EmissionState::Succeeded { number, .. }
            | EmissionState::Failed { number, .. } => Some(*number),
            EmissionState::Exhausted { last_number, .. } => Some(*last_number),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EmissionState::Building => "building",
            EmissionState::Submitting { .. } => "submitting",
            EmissionState::CollisionRetry { .. } => "collision_retry",
            EmissionState::Succeeded { .. } => "succeeded",
            EmissionState::Exhausted { .. } => "exhausted",
            EmissionState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for EmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmissionEvent {
    /// The request was built against an allocated candidate.
    Built { candidate: i64 },
    /// The remote answered with a document state (accepted, pending or
    /// rejected).
    Emitted,
    /// The remote says the number was already issued.
    Collision,
    /// Any other failure, including transport errors.
    Failure { message: String },
    /// Submit again after a collision.
    Resubmit,
}

impl fmt::Display for EmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmissionEvent::Built { candidate } => write!(f, "built({})", candidate),
            EmissionEvent::Emitted => f.write_str("emitted"),
            EmissionEvent::Collision => f.write_str("collision"),
            EmissionEvent::Failure { .. } => f.write_str("failure"),
            EmissionEvent::Resubmit => f.write_str("resubmit"),
        }
    }
}

// =============================================================================
// Transition Function
// =============================================================================

/// Computes the next state. Pure.
pub fn transition(
    state: &EmissionState,
    event: EmissionEvent,
    max_attempts: u32,
) -> CoreResult<EmissionState> {
    use EmissionState as S;

    let next = match (state, event) {
        (S::Building, EmissionEvent::Built { candidate }) => S::Submitting {
            number: candidate,
            attempt: 1,
        },
        (S::Submitting { number, attempt }, EmissionEvent::Emitted) => S::Succeeded {
            number: *number,
            attempts: *attempt,
        },
        (S::Submitting { number, attempt }, EmissionEvent::Collision) => {
            if *attempt >= max_attempts {
                S::Exhausted {
                    last_number: *number,
                    attempts: *attempt,
                }
            } else {
                S::CollisionRetry {
                    number: number + 1,
                    attempt: *attempt,
                }
            }
        }
        (S::Submitting { number, attempt }, EmissionEvent::Failure { message }) => S::Failed {
            number: *number,
            attempts: *attempt,
            message,
        },
        (S::CollisionRetry { number, attempt }, EmissionEvent::Resubmit) => S::Submitting {
            number: *number,
            attempt: attempt + 1,
        },
        (state, event) => {
            return Err(CoreError::InvalidEmissionEvent {
                state: state.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(next)
}

// =============================================================================
// Machine
// =============================================================================

/// Owns the current state and the attempt bound.
#[derive(Debug, Clone)]
pub struct EmissionMachine {
    state: EmissionState,
    max_attempts: u32,
}

impl EmissionMachine {
    /// A bound of zero is treated as one attempt.
    pub fn new(max_attempts: u32) -> Self {
        EmissionMachine {
            state: EmissionState::Building,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> &EmissionState {
        &self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn apply(&mut self, event: EmissionEvent) -> CoreResult<&EmissionState> {
        self.state = transition(&self.state, event, self.max_attempts)?;
        Ok(&self.state)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
