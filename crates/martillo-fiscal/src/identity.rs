//! # Identity Lookups
//!
//! Resolves a DNI to a person and a RUC to a business so the cashier does
//! not type names by hand. Lengths are checked before any request; a
//! number the registry does not know yields `Ok(None)`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use martillo_core::validation::{validate_dni, validate_ruc};

use crate::client::ApiSunatClient;
use crate::error::FiscalResult;
use crate::protocol::{ApiResponse, BusinessPayload, PersonPayload, DNI_LOOKUP_PATH, RUC_LOOKUP_PATH};

/// A natural person from the national registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonIdentity {
    pub dni: String,
    pub given_names: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    /// `NOMBRES PATERNO MATERNO`, as printed on receipts.
    pub full_name: String,
}

impl From<PersonPayload> for PersonIdentity {
    fn from(p: PersonPayload) -> Self {
        let full_name = [p.nombres.as_str(), p.apellido_paterno.as_str(), p.apellido_materno.as_str()]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        PersonIdentity {
            dni: p.dni,
            given_names: p.nombres,
            paternal_surname: p.apellido_paterno,
            maternal_surname: p.apellido_materno,
            full_name,
        }
    }
}

/// A taxpayer from the tax registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessIdentity {
    pub ruc: String,
    pub legal_name: String,
    /// Taxpayer status, e.g. `ACTIVO`.
    pub status: Option<String>,
    /// Domicile condition, e.g. `HABIDO`.
    pub condition: Option<String>,
    pub fiscal_address: Option<String>,
}

impl From<BusinessPayload> for BusinessIdentity {
    fn from(p: BusinessPayload) -> Self {
        BusinessIdentity {
            ruc: p.ruc,
            legal_name: p.razon_social,
            status: p.estado,
            condition: p.condicion,
            fiscal_address: p.direccion_fiscal,
        }
    }
}

fn found<T>(response: Option<ApiResponse<T>>) -> Option<T> {
    response
        .filter(|r| r.success)
        .and_then(|r| r.payload)
}

impl ApiSunatClient {
    /// Looks up a DNI (8 digits).
    pub async fn lookup_dni(&self, dni: &str) -> FiscalResult<Option<PersonIdentity>> {
        let dni = dni.trim();
        validate_dni(dni)?;

        let url = self.endpoint(&format!("{}{}", DNI_LOOKUP_PATH, dni))?;
        let person = found(self.get_json::<PersonPayload>(url).await?).map(PersonIdentity::from);
        debug!(found = person.is_some(), "DNI lookup");
        Ok(person)
    }

    /// Looks up a RUC (11 digits).
    pub async fn lookup_ruc(&self, ruc: &str) -> FiscalResult<Option<BusinessIdentity>> {
        let ruc = ruc.trim();
        validate_ruc(ruc)?;

        let url = self.endpoint(&format!("{}{}", RUC_LOOKUP_PATH, ruc))?;
        let business =
            found(self.get_json::<BusinessPayload>(url).await?).map(BusinessIdentity::from);
        debug!(found = business.is_some(), "RUC lookup");
        Ok(business)
    }
}
