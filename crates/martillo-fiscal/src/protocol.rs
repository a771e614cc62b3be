//! # Wire Protocol
//!
//! JSON shapes exchanged with the fiscal API. Field names are the API's
//! own (Spanish); everything else in the workspace uses the domain types
//! from `martillo-core`.
//!
//! ## Endpoints
//! ```text
//! ┌──────────────────────────────────┬────────────────────┬─────────────────────┐
//! │ Endpoint                         │ Request            │ Response payload    │
//! ├──────────────────────────────────┼────────────────────┼─────────────────────┤
//! │ POST /api/v3/documents           │ DocumentPayload    │ EmissionPayload     │
//! │ POST /api/v3/documents/void      │ DocumentRef        │ (ignored)           │
//! │ POST /api/v3/documents/status    │ DocumentRef        │ StatusPayload       │
//! │ GET  /api/v1/person/dni/{dni}    │ -                  │ PersonPayload       │
//! │ GET  /api/v1/business/ruc/{ruc}  │ -                  │ BusinessPayload     │
//! └──────────────────────────────────┴────────────────────┴─────────────────────┘
//! ```
//!
//! Every response uses the same envelope, [`ApiResponse`]. Failures are
//! described only by a human-readable `message`, see
//! [`martillo_core::classify`].

use serde::{Deserialize, Serialize};

use martillo_core::{DocumentArtifacts, DocumentKind, DocumentState, FiscalDocumentRequest, SaleRecord};

pub const DOCUMENTS_PATH: &str = "/api/v3/documents";
pub const VOID_PATH: &str = "/api/v3/documents/void";
pub const STATUS_PATH: &str = "/api/v3/documents/status";
pub const DNI_LOOKUP_PATH: &str = "/api/v1/person/dni/";
pub const RUC_LOOKUP_PATH: &str = "/api/v1/business/ruc/";

/// Tax scheme name sent on every line.
pub const TAX_NAME: &str = "IGV";

// =============================================================================
// Response Envelope
// =============================================================================

/// `{success, message, payload?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub payload: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(payload: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            payload: Some(payload),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            message: Some(message.into()),
            payload: None,
        }
    }

    /// The message, or an empty string when the API sent none.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Document Emission
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub unidad_de_medida: String,
    pub descripcion: String,
    pub cantidad: String,
    /// Tax-exclusive, six decimals.
    pub valor_unitario: String,
    pub porcentaje_igv: String,
    pub codigo_tipo_afectacion_igv: String,
    pub nombre_tributo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub documento: String,
    pub serie: String,
    pub numero: i64,
    pub fecha_de_emision: String,
    pub hora_de_emision: String,
    /// Cash sales: same as the emission date.
    pub fecha_de_vencimiento: String,
    pub moneda: String,
    pub tipo_operacion: String,
    pub cliente_tipo_de_documento: String,
    pub cliente_numero_de_documento: String,
    pub cliente_denominacion: String,
    pub cliente_direccion: String,
    pub items: Vec<ItemPayload>,
    /// Two decimals.
    pub total: String,
}

impl From<&FiscalDocumentRequest> for DocumentPayload {
    fn from(request: &FiscalDocumentRequest) -> Self {
        let date = request.issue_date();
        DocumentPayload {
            documento: request.document_kind.api_code().to_string(),
            serie: request.series.clone(),
            numero: request.number,
            fecha_de_emision: date.clone(),
            hora_de_emision: request.issue_time(),
            fecha_de_vencimiento: date,
            moneda: request.currency.clone(),
            tipo_operacion: request.operation_type.clone(),
            cliente_tipo_de_documento: request.customer.tax_id_kind.code().to_string(),
            cliente_numero_de_documento: request.customer.tax_id.clone(),
            cliente_denominacion: request.customer.name.clone(),
            cliente_direccion: request.customer.address.clone(),
            items: request
                .items
                .iter()
                .map(|item| ItemPayload {
                    unidad_de_medida: item.unit_of_measure.clone(),
                    descripcion: item.description.clone(),
                    cantidad: item.quantity.to_string(),
                    valor_unitario: item.unit_value_net.to_string(),
                    porcentaje_igv: item.tax_rate.percentage_string(),
                    codigo_tipo_afectacion_igv: item.tax_affectation_code.clone(),
                    nombre_tributo: TAX_NAME.to_string(),
                })
                .collect(),
            total: request.total.to_decimal_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfLinks {
    #[serde(default)]
    pub ticket: Option<String>,
    #[serde(default)]
    pub a4: Option<String>,
}

/// Payload of a successful emission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionPayload {
    /// `ACEPTADO`, `PENDIENTE` or `RECHAZADO`.
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub cdr: Option<String>,
    #[serde(default)]
    pub pdf: Option<PdfLinks>,
}

impl EmissionPayload {
    pub fn with_estado(estado: impl Into<String>) -> Self {
        EmissionPayload {
            estado: Some(estado.into()),
            ..Default::default()
        }
    }

    /// Remote state mapped to ours. A missing or unknown `estado` on an
    /// accepted submission is treated as `PENDING` so the reconciler picks
    /// it up later.
    pub fn document_state(&self) -> DocumentState {
        self.estado
            .as_deref()
            .and_then(DocumentState::from_remote)
            .filter(|state| DocumentState::PendingEmission.can_transition_to(*state))
            .unwrap_or(DocumentState::Pending)
    }

    pub fn artifacts(&self) -> DocumentArtifacts {
        let pdf = self.pdf.clone().unwrap_or_default();
        DocumentArtifacts {
            xml: self.xml.clone(),
            cdr: self.cdr.clone(),
            pdf_ticket: pdf.ticket,
            pdf_a4: pdf.a4,
        }
    }
}

// =============================================================================
// Void and Status
// =============================================================================

/// Identifies one emitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub documento: String,
    pub serie: String,
    pub numero: i64,
}

impl DocumentRef {
    pub fn new(kind: DocumentKind, series: impl Into<String>, number: i64) -> Self {
        DocumentRef {
            documento: kind.api_code().to_string(),
            serie: series.into(),
            numero: number,
        }
    }
}

impl From<&SaleRecord> for DocumentRef {
    fn from(record: &SaleRecord) -> Self {
        DocumentRef::new(record.document_kind, record.series.clone(), record.number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl StatusPayload {
    pub fn with_estado(estado: impl Into<String>) -> Self {
        StatusPayload {
            estado: Some(estado.into()),
            hash: None,
        }
    }
}

// =============================================================================
// Identity Lookups
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonPayload {
    pub dni: String,
    #[serde(default)]
    pub nombres: String,
    #[serde(default)]
    pub apellido_paterno: String,
    #[serde(default)]
    pub apellido_materno: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessPayload {
    pub ruc: String,
    #[serde(default)]
    pub razon_social: String,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub condicion: Option<String>,
    #[serde(default)]
    pub direccion_fiscal: Option<String>,
}
