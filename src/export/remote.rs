//! Server-rendered report export.

use chrono::{DateTime, Local};

use super::{report_filename, DownloadSink, ExportError, ExportKind, Exported};
use crate::gateway::{Gateway, GatewayError};
use crate::models::AnalysisResult;

/// Ask the service to render `analysis` and save the returned PDF.
pub async fn export_report<G: Gateway + ?Sized>(
    gateway: &G,
    analysis: &AnalysisResult,
    sink: &dyn DownloadSink,
    at: DateTime<Local>,
) -> Result<Exported, ExportError> {
    let bytes = gateway.render_report(analysis).await?;
    if bytes.is_empty() {
        return Err(GatewayError::Decode("service returned an empty document".into()).into());
    }
    let filename = report_filename(at);
    let location = sink.deliver(&filename, &bytes)?;
    Ok(Exported {
        kind: ExportKind::Report,
        filename,
        location,
    })
}
