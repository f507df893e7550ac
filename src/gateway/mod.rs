//! Request Gateway: the capability boundary to the analysis service.
//!
//! A pure transport adapter: one method per remote contract, uniform error
//! mapping into [`GatewayError`], no retries and no caching. Retry and
//! staleness policy live in the workflow's Fetch Cells.

pub mod http;
pub mod scripted;

use crate::models::{
    AnalysisResult, ExtractedMedicationDraft, InteractionCheckRequest, InteractionReport,
    PatientRecord, TaperPlan, TaperPlanRequest, UploadedDocument,
};

pub use http::{HttpGateway, ServiceHealth};
pub use scripted::ScriptedGateway;

/// Remote operations used by the workflow.
///
/// Futures are driven on a single cooperative task, so implementations
/// need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait Gateway {
    async fn analyze_patient(&self, record: &PatientRecord) -> Result<AnalysisResult, GatewayError>;

    async fn generate_taper_plan(
        &self,
        request: &TaperPlanRequest,
    ) -> Result<TaperPlan, GatewayError>;

    async fn check_interactions(
        &self,
        request: &InteractionCheckRequest,
    ) -> Result<InteractionReport, GatewayError>;

    async fn extract_medications(
        &self,
        document: &UploadedDocument,
    ) -> Result<Vec<ExtractedMedicationDraft>, GatewayError>;

    /// Server-rendered PDF of a full analysis.
    async fn render_report(&self, analysis: &AnalysisResult) -> Result<Vec<u8>, GatewayError>;
}

/// Transport failures: service unreachable or non-success response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Cannot reach analysis service at {0}")]
    Connection(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Service error ({status}): {detail}")]
    Status { status: u16, detail: String },
    #[error("Unexpected response from service: {0}")]
    Decode(String),
    #[error("HTTP client error: {0}")]
    Http(String),
}
