//! # Fiscal API Client
//!
//! The only place that performs HTTP. Workflows depend on the
//! [`FiscalApi`] trait so tests can script responses.
//!
//! ## Result Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ok(ApiResponse { success: true, .. })   remote accepted the request   │
//! │  Ok(ApiResponse { success: false, .. })  remote refused, see message   │
//! │  Err(FiscalError::Transport)             no answer (network, timeout)  │
//! │  Err(FiscalError::InvalidResponse)       answer is not the envelope    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! An `Err` never tells whether the remote acted. Callers must not assume
//! a document was not emitted because the call failed.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use martillo_core::FiscalDocumentRequest;

use crate::config::ApiSettings;
use crate::error::{FiscalError, FiscalResult};
use crate::protocol::{
    ApiResponse, DocumentPayload, DocumentRef, EmissionPayload, StatusPayload, DOCUMENTS_PATH,
    STATUS_PATH, VOID_PATH,
};

/// Operations against the external fiscal authority.
#[async_trait]
pub trait FiscalApi: Send + Sync {
    /// Submits one document under the request's number.
    async fn submit_document(
        &self,
        request: &FiscalDocumentRequest,
    ) -> FiscalResult<ApiResponse<EmissionPayload>>;

    /// Asks the authority to void (dar de baja) a document.
    async fn void_document(&self, document: &DocumentRef)
        -> FiscalResult<ApiResponse<serde_json::Value>>;

    /// Reads the authority's current state for a document.
    async fn query_status(&self, document: &DocumentRef) -> FiscalResult<ApiResponse<StatusPayload>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`FiscalApi`] over HTTPS with bearer-token auth.
#[derive(Clone)]
pub struct ApiSunatClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for ApiSunatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSunatClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiSunatClient {
    /// Fails when no token is configured or the base URL is malformed.
    pub fn new(settings: &ApiSettings) -> FiscalResult<Self> {
        if settings.token.trim().is_empty() {
            return Err(FiscalError::Config(
                "API token not configured (set MARTILLO_APISUNAT_TOKEN)".into(),
            ));
        }

        let base_url = Url::parse(settings.base_url())?;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("martillo-fiscal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FiscalError::Config(format!("HTTP client: {}", e)))?;

        debug!(base_url = %base_url, environment = %settings.environment, "Fiscal API client ready");
        Ok(ApiSunatClient {
            http,
            base_url,
            token: settings.token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> FiscalResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> FiscalResult<ApiResponse<T>>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::read_envelope(response).await
    }

    pub(crate) async fn get_json<T>(&self, url: Url) -> FiscalResult<Option<ApiResponse<T>>>
    where
        T: DeserializeOwned + Send,
    {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_envelope(response).await.map(Some)
    }

    /// The API reports refusals inside the envelope, often with a 4xx
    /// status, so the body is parsed whatever the status.
    async fn read_envelope<T>(response: reqwest::Response) -> FiscalResult<ApiResponse<T>>
    where
        T: DeserializeOwned + Send,
    {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if status.is_server_error() => {
                warn!(status = %status, "Fiscal API server error");
                Err(FiscalError::Transport(format!("HTTP {}", status)))
            }
            Err(e) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(FiscalError::Config(format!(
                    "fiscal API refused the token (HTTP {}): {}",
                    status, e
                )))
            }
            Err(e) => Err(FiscalError::InvalidResponse(format!("HTTP {}: {}", status, e))),
        }
    }
}

#[async_trait]
impl FiscalApi for ApiSunatClient {
    async fn submit_document(
        &self,
        request: &FiscalDocumentRequest,
    ) -> FiscalResult<ApiResponse<EmissionPayload>> {
        let payload = DocumentPayload::from(request);
        debug!(series = %payload.serie, number = payload.numero, "POST document");
        self.post_json(DOCUMENTS_PATH, &payload).await
    }

    async fn void_document(
        &self,
        document: &DocumentRef,
    ) -> FiscalResult<ApiResponse<serde_json::Value>> {
        debug!(series = %document.serie, number = document.numero, "POST void");
        self.post_json(VOID_PATH, document).await
    }

    async fn query_status(&self, document: &DocumentRef) -> FiscalResult<ApiResponse<StatusPayload>> {
        debug!(series = %document.serie, number = document.numero, "POST status");
        self.post_json(STATUS_PATH, document).await
    }
}

// =============================================================================
// Test Doubles
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type SubmitFn = Box<dyn Fn(i64) -> FiscalResult<ApiResponse<EmissionPayload>> + Send + Sync>;

    /// Answers from a script and records every call.
    pub struct ScriptedApi {
        submit: SubmitFn,
        voids: Mutex<VecDeque<FiscalResult<ApiResponse<serde_json::Value>>>>,
        statuses: Mutex<VecDeque<FiscalResult<ApiResponse<StatusPayload>>>>,
        pub submitted: Mutex<Vec<i64>>,
        pub void_calls: AtomicUsize,
        pub status_calls: AtomicUsize,
    }

    impl ScriptedApi {
        pub fn new(
            submit: impl Fn(i64) -> FiscalResult<ApiResponse<EmissionPayload>> + Send + Sync + 'static,
        ) -> Self {
            ScriptedApi {
                submit: Box::new(submit),
                voids: Mutex::new(VecDeque::new()),
                statuses: Mutex::new(VecDeque::new()),
                submitted: Mutex::new(Vec::new()),
                void_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
            }
        }

        /// Accepts every document.
        pub fn accepting() -> Self {
            Self::new(|_| Ok(ApiResponse::ok(EmissionPayload::with_estado("ACEPTADO"))))
        }

        /// Reports a collision for every number in `taken`, accepts the rest.
        pub fn colliding_on(taken: Vec<i64>) -> Self {
            Self::new(move |number| {
                if taken.contains(&number) {
                    Ok(ApiResponse::failure(format!(
                        "El documento B001-{} fue emitido anteriormente",
                        number
                    )))
                } else {
                    Ok(ApiResponse::ok(EmissionPayload::with_estado("ACEPTADO")))
                }
            })
        }

        pub fn with_void(self, response: FiscalResult<ApiResponse<serde_json::Value>>) -> Self {
            self.voids.lock().unwrap().push_back(response);
            self
        }

        pub fn with_status(self, response: FiscalResult<ApiResponse<StatusPayload>>) -> Self {
            self.statuses.lock().unwrap().push_back(response);
            self
        }

        pub fn submitted_numbers(&self) -> Vec<i64> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn void_count(&self) -> usize {
            self.void_calls.load(Ordering::SeqCst)
        }

        pub fn status_count(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FiscalApi for ScriptedApi {
        async fn submit_document(
            &self,
            request: &FiscalDocumentRequest,
        ) -> FiscalResult<ApiResponse<EmissionPayload>> {
            self.submitted.lock().unwrap().push(request.number);
            (self.submit)(request.number)
        }

        async fn void_document(
            &self,
            _document: &DocumentRef,
        ) -> FiscalResult<ApiResponse<serde_json::Value>> {
            self.void_calls.fetch_add(1, Ordering::SeqCst);
            self.voids
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FiscalError::Transport("no scripted void response".into())))
        }

        async fn query_status(
            &self,
            _document: &DocumentRef,
        ) -> FiscalResult<ApiResponse<StatusPayload>> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FiscalError::Transport("no scripted status response".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiEnvironment;

    fn settings(token: &str) -> ApiSettings {
        ApiSettings {
            token: token.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_token() {
        let err = ApiSunatClient::new(&settings("  ")).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_endpoints_follow_environment() {
        let client = ApiSunatClient::new(&settings("t0k3n")).unwrap();
        assert_eq!(
            client.endpoint(DOCUMENTS_PATH).unwrap().as_str(),
            "https://sandbox.apisunat.pe/api/v3/documents"
        );

        let mut prod = settings("t0k3n");
        prod.environment = ApiEnvironment::Production;
        let client = ApiSunatClient::new(&prod).unwrap();
        assert_eq!(
            client.endpoint(VOID_PATH).unwrap().as_str(),
            "https://app.apisunat.pe/api/v3/documents/void"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let client = ApiSunatClient::new(&settings("very-secret")).unwrap();
        assert!(!format!("{:?}", client).contains("very-secret"));
    }
}
