use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Gateway, GatewayError};
use crate::config::ClientConfig;
use crate::models::{
    AnalysisResult, DocumentKind, ExtractedMedicationDraft, ExtractionResponse,
    InteractionCheckRequest, InteractionReport, PatientRecord, SupportedDrugs, SupportedHerbs,
    TaperPlan, TaperPlanRequest, UploadedDocument,
};

/// Longest response body quoted in a status error.
const MAX_DETAIL_CHARS: usize = 300;

/// HTTP client for the deprescribing analysis service.
pub struct HttpGateway {
    config: ClientConfig,
    client: reqwest::Client,
}

/// Request body for `POST /analyze-patient`.
#[derive(Serialize)]
struct AnalyzePatientRequest<'a> {
    patient: &'a PatientRecord,
}

/// Response body from `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub modules_loaded: u32,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// FastAPI error body: `{"detail": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl HttpGateway {
    /// Build a client for the configured service.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("deprescribe-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.service_base_url
    }

    /// Reachability probe against `GET /health`.
    pub async fn health(&self) -> Result<ServiceHealth, GatewayError> {
        self.get_json("/health").await
    }

    /// Drugs with a tapering protocol, for intake suggestions.
    pub async fn supported_drugs(&self) -> Result<SupportedDrugs, GatewayError> {
        self.get_json("/supported-drugs").await
    }

    /// Herbs the interaction checker knows, for intake suggestions.
    pub async fn supported_herbs(&self) -> Result<SupportedHerbs, GatewayError> {
        self.get_json("/supported-herbs").await
    }

    fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_connect() {
            GatewayError::Connection(self.config.service_base_url.clone())
        } else if e.is_timeout() {
            GatewayError::Timeout(self.config.request_timeout_secs)
        } else {
            GatewayError::Http(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            status: status.as_u16(),
            detail: error_detail(&body),
        })
    }
}

/// Human-readable reason from an error body.
fn error_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return match parsed.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

fn extraction_path(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Prescription => "/extract-from-prescription",
        DocumentKind::BrownBag => "/extract-brown-bag",
    }
}

impl Gateway for HttpGateway {
    async fn analyze_patient(&self, record: &PatientRecord) -> Result<AnalysisResult, GatewayError> {
        self.post_json("/analyze-patient", &AnalyzePatientRequest { patient: record })
            .await
    }

    async fn generate_taper_plan(
        &self,
        request: &TaperPlanRequest,
    ) -> Result<TaperPlan, GatewayError> {
        self.post_json("/get-taper-plan", request).await
    }

    async fn check_interactions(
        &self,
        request: &InteractionCheckRequest,
    ) -> Result<InteractionReport, GatewayError> {
        self.post_json("/interaction-checker", request).await
    }

    async fn extract_medications(
        &self,
        document: &UploadedDocument,
    ) -> Result<Vec<ExtractedMedicationDraft>, GatewayError> {
        let part = reqwest::multipart::Part::bytes(document.bytes.to_vec())
            .file_name(document.filename.clone())
            .mime_str(&document.mime_type())
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(extraction_path(document.kind)))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;
        let parsed: ExtractionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        if parsed.count != parsed.medications.len() {
            tracing::debug!(
                reported = parsed.count,
                received = parsed.medications.len(),
                "Extraction count differs from returned list"
            );
        }
        Ok(parsed.medications)
    }

    async fn render_report(&self, analysis: &AnalysisResult) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .post(self.url("/generate-report-pdf"))
            .json(analysis)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
