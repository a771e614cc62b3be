//! # Fiscal Configuration
//!
//! Loaded once at startup and handed to [`crate::FiscalEngine`] and the
//! API client. Nothing in this crate reads settings from global state.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MARTILLO_APISUNAT_TOKEN=...                                        │
//! │     MARTILLO_APISUNAT_ENV=production                                   │
//! │     MARTILLO_APISUNAT_BASE_URL=https://...                             │
//! │     MARTILLO_MAX_EMISSION_ATTEMPTS=5                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/fiscal.toml (Linux)                                  │
//! │     ~/Library/Application Support/pe.martillo.pos/fiscal.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     sandbox API, B001 / F001, IGV 18 %, 5 attempts, 3-day void window  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # fiscal.toml
//! [business]
//! name = "Ferretería El Martillo"
//! ruc = "20123456789"
//! address = "Av. Los Olivos 123, Lima"
//!
//! [api]
//! environment = "production"  # sandbox | production
//! token = "..."
//! timeout_secs = 30
//!
//! [emission]
//! max_attempts = 5
//! tax_rate_bps = 1800
//! utc_offset_hours = -5
//! void_window_days = 3
//!
//! [series]
//! boleta = "B001"
//! factura = "F001"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use martillo_core::request::RequestSettings;
use martillo_core::validation::{validate_ruc, validate_series_for_kind};
use martillo_core::{DocumentKind, DocumentSeries, TaxRate};

use crate::error::{FiscalError, FiscalResult};

// =============================================================================
// API Environment
// =============================================================================

/// Which deployment of the fiscal API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiEnvironment {
    /// Test documents, no fiscal validity.
    #[default]
    Sandbox,
    Production,
}

impl ApiEnvironment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ApiEnvironment::Sandbox => "https://sandbox.apisunat.pe",
            ApiEnvironment::Production => "https://app.apisunat.pe",
        }
    }
}

impl fmt::Display for ApiEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiEnvironment::Sandbox => write!(f, "sandbox"),
            ApiEnvironment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for ApiEnvironment {
    type Err = FiscalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" | "test" | "beta" => Ok(ApiEnvironment::Sandbox),
            "production" | "prod" => Ok(ApiEnvironment::Production),
            _ => Err(FiscalError::Config(format!(
                "Unknown API environment: {}. Use sandbox or production",
                s
            ))),
        }
    }
}

// =============================================================================
// Business
// =============================================================================

/// The issuer printed on every receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ruc: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

// =============================================================================
// API Settings
// =============================================================================

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub environment: ApiEnvironment,

    /// Overrides the environment's default URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token. Never logged.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            environment: ApiEnvironment::default(),
            base_url: None,
            token: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ApiSettings {
    /// The effective base URL.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.default_base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Emission Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSettings {
    /// Bound on collision retries per emission.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// IGV in basis points.
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_operation_type")]
    pub operation_type: String,

    #[serde(default = "default_unit_of_measure")]
    pub unit_of_measure: String,

    /// Offset used for the emission date and time, Peru is UTC-5.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    #[serde(default = "default_void_window_days")]
    pub void_window_days: i64,
}

fn default_max_attempts() -> u32 {
    martillo_core::DEFAULT_MAX_EMISSION_ATTEMPTS
}
fn default_tax_rate_bps() -> u32 {
    martillo_core::DEFAULT_TAX_RATE_BPS
}
fn default_currency() -> String {
    "PEN".to_string()
}
fn default_operation_type() -> String {
    "0101".to_string()
}
fn default_unit_of_measure() -> String {
    "NIU".to_string()
}
fn default_utc_offset_hours() -> i32 {
    -5
}
fn default_void_window_days() -> i64 {
    martillo_core::DEFAULT_VOID_WINDOW_DAYS
}

impl Default for EmissionSettings {
    fn default() -> Self {
        EmissionSettings {
            max_attempts: default_max_attempts(),
            tax_rate_bps: default_tax_rate_bps(),
            currency: default_currency(),
            operation_type: default_operation_type(),
            unit_of_measure: default_unit_of_measure(),
            utc_offset_hours: default_utc_offset_hours(),
            void_window_days: default_void_window_days(),
        }
    }
}

impl EmissionSettings {
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Returns `None` when the offset is outside ±23 hours.
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours.checked_mul(3600)?)
    }

    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            tax_rate: self.tax_rate(),
            currency: self.currency.clone(),
            operation_type: self.operation_type.clone(),
            unit_of_measure: self.unit_of_measure.clone(),
        }
    }
}

// =============================================================================
// Series Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSettings {
    #[serde(default = "default_boleta_series")]
    pub boleta: String,
    #[serde(default = "default_factura_series")]
    pub factura: String,
}

fn default_boleta_series() -> String {
    "B001".to_string()
}
fn default_factura_series() -> String {
    "F001".to_string()
}

impl Default for SeriesSettings {
    fn default() -> Self {
        SeriesSettings {
            boleta: default_boleta_series(),
            factura: default_factura_series(),
        }
    }
}

impl SeriesSettings {
    /// The series that numbers documents of `kind`.
    pub fn for_kind(&self, kind: DocumentKind) -> DocumentSeries {
        match kind {
            DocumentKind::Boleta => DocumentSeries::new(self.boleta.clone(), kind),
            DocumentKind::Factura => DocumentSeries::new(self.factura.clone(), kind),
        }
    }

    pub fn all(&self) -> [DocumentSeries; 2] {
        [
            self.for_kind(DocumentKind::Boleta),
            self.for_kind(DocumentKind::Factura),
        ]
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete fiscal configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalConfig {
    #[serde(default)]
    pub business: BusinessConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub emission: EmissionSettings,

    #[serde(default)]
    pub series: SeriesSettings,
}

impl FiscalConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (fiscal.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> FiscalResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading fiscal config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load fiscal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> FiscalResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| FiscalError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Fiscal config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> FiscalResult<()> {
        if self.emission.max_attempts == 0 {
            return Err(FiscalError::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }

        if self.emission.tax_rate_bps > 10_000 {
            return Err(FiscalError::Config(format!(
                "tax_rate_bps must be at most 10000, got {}",
                self.emission.tax_rate_bps
            )));
        }

        if self.emission.utc_offset().is_none() {
            return Err(FiscalError::Config(format!(
                "utc_offset_hours out of range: {}",
                self.emission.utc_offset_hours
            )));
        }

        if self.emission.void_window_days < 0 {
            return Err(FiscalError::Config(
                "void_window_days cannot be negative".into(),
            ));
        }

        for series in self.series.all() {
            validate_series_for_kind(&series.code, series.kind)
                .map_err(|e| FiscalError::Config(e.to_string()))?;
        }

        let url = Url::parse(self.api.base_url())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FiscalError::Config(format!(
                "API URL must start with http:// or https://, got: {}",
                url
            )));
        }

        if !self.business.ruc.is_empty() {
            validate_ruc(&self.business.ruc).map_err(|e| FiscalError::Config(e.to_string()))?;
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("MARTILLO_APISUNAT_TOKEN") {
            debug!("Overriding API token from environment");
            self.api.token = token;
        }

        if let Ok(env) = std::env::var("MARTILLO_APISUNAT_ENV") {
            match env.parse() {
                Ok(parsed) => {
                    debug!(environment = %env, "Overriding API environment from environment");
                    self.api.environment = parsed;
                }
                Err(_) => warn!(environment = %env, "Unknown API environment in environment"),
            }
        }

        if let Ok(url) = std::env::var("MARTILLO_APISUNAT_BASE_URL") {
            debug!(url = %url, "Overriding API base URL from environment");
            self.api.base_url = Some(url);
        }

        if let Ok(attempts) = std::env::var("MARTILLO_MAX_EMISSION_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.emission.max_attempts = n;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pe", "martillo", "pos")
            .map(|dirs| dirs.config_dir().join("fiscal.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Offset for emission timestamps. `validate()` rejects out-of-range
    /// values, so the UTC fallback only applies to unvalidated configs.
    pub fn utc_offset(&self) -> FixedOffset {
        self.emission.utc_offset().unwrap_or_else(|| Utc.fix())
    }
}
