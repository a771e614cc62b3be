//! # Remote Message Classification
//!
//! The fiscal API reports some outcomes only as human-readable Spanish
//! messages. Every pattern the engine relies on is listed here and nowhere
//! else; if the API ever ships structured error codes, this is the one place
//! to change.
//!
//! ## Patterns
//! ```text
//! ┌──────────────────────┬─────────────────────────────────────────────────┐
//! │ Class                │ Substrings (case and accent insensitive)        │
//! ├──────────────────────┼─────────────────────────────────────────────────┤
//! │ NumberAlreadyIssued  │ "fue emitido anteriormente"                     │
//! │ AlreadyVoided        │ "ya se encuentra anulado", "ya fue anulado",    │
//! │                      │ "ya fue dado de baja"                           │
//! │ VoidAlreadyQueued    │ "ya se encuentra en proceso de baja",           │
//! │                      │ "ya fue comunicado de baja"                     │
//! │ NotFound             │ "no existe", "no encontrado", "no se encontró"  │
//! │ Other                │ anything else                                   │
//! └──────────────────────┴─────────────────────────────────────────────────┘
//! ```
//!
//! Void-related classes are checked before `NotFound` so that a message
//! such as "el documento ya fue dado de baja y no existe en el padrón"
//! still counts as recovered.

use serde::{Deserialize, Serialize};

/// Semantic outcome carried by a remote message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMessageClass {
    /// The correlative number was consumed by an earlier emission.
    NumberAlreadyIssued,
    /// The document is already voided remotely.
    AlreadyVoided,
    /// A void for the document is already queued remotely.
    VoidAlreadyQueued,
    /// The remote does not know the document.
    NotFound,
    Other,
}

impl RemoteMessageClass {
    /// True for the two idempotent void recoveries.
    pub fn is_void_recovery(&self) -> bool {
        matches!(
            self,
            RemoteMessageClass::AlreadyVoided | RemoteMessageClass::VoidAlreadyQueued
        )
    }
}

pub const NUMBER_ALREADY_ISSUED_PATTERNS: &[&str] = &["fue emitido anteriormente"];

pub const ALREADY_VOIDED_PATTERNS: &[&str] = &[
    "ya se encuentra anulado",
    "ya fue anulado",
    "ya fue dado de baja",
];

pub const VOID_ALREADY_QUEUED_PATTERNS: &[&str] = &[
    "ya se encuentra en proceso de baja",
    "ya fue comunicado de baja",
];

pub const NOT_FOUND_PATTERNS: &[&str] = &["no existe", "no encontrado", "no se encontro"];

/// Lowercases and strips Spanish diacritics.
fn normalize(message: &str) -> String {
    message
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// Classifies a remote message.
///
/// ## Example
/// ```rust
/// use martillo_core::classify::{classify_message, RemoteMessageClass};
///
/// assert_eq!(
///     classify_message("El comprobante B001-42 fue emitido anteriormente"),
///     RemoteMessageClass::NumberAlreadyIssued,
/// );
/// assert_eq!(classify_message("Token inválido"), RemoteMessageClass::Other);
/// ```
pub fn classify_message(message: &str) -> RemoteMessageClass {
    let normalized = normalize(message);

    if contains_any(&normalized, NUMBER_ALREADY_ISSUED_PATTERNS) {
        RemoteMessageClass::NumberAlreadyIssued
    } else if contains_any(&normalized, ALREADY_VOIDED_PATTERNS) {
        RemoteMessageClass::AlreadyVoided
    } else if contains_any(&normalized, VOID_ALREADY_QUEUED_PATTERNS) {
        RemoteMessageClass::VoidAlreadyQueued
    } else if contains_any(&normalized, NOT_FOUND_PATTERNS) {
        RemoteMessageClass::NotFound
    } else {
        RemoteMessageClass::Other
    }
}

/// Shorthand for the collision check in the emission loop.
pub fn is_number_already_issued(message: &str) -> bool {
    classify_message(message) == RemoteMessageClass::NumberAlreadyIssued
}
