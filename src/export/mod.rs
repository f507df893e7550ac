//! Export pipeline: server-rendered report and client-rasterized snapshot.
//!
//! Both strategies end by handing a PDF to a [`DownloadSink`]. They never
//! touch workflow state; a failure is reported to the caller and nothing else.

pub mod remote;
pub mod sink;
pub mod snapshot;

use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::gateway::GatewayError;

pub use remote::export_report;
pub use sink::{DirectorySink, DownloadSink};
pub use snapshot::{export_snapshot, render_snapshot_pdf, CaptureTarget, A4_HEIGHT_MM, A4_WIDTH_MM};

/// Which export strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Report,
    Snapshot,
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Report => "report",
            Self::Snapshot => "snapshot",
        })
    }
}

/// A delivered export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub kind: ExportKind,
    pub filename: String,
    pub location: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Nothing to capture: the results view is not rendered")]
    CaptureTargetMissing,
    #[error("No analysis to export")]
    NoAnalysis,
    #[error("Report request failed: {0}")]
    Transport(#[from] GatewayError),
    #[error("PDF rendering failed: {0}")]
    Render(String),
    #[error("Could not save {filename}: {source}")]
    Delivery {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

/// `Clinical_Report_<YYYYMMDD_HHMMSS>.pdf`
pub fn report_filename(at: DateTime<Local>) -> String {
    format!("Clinical_Report_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}

/// `Clinical_Snapshot_<YYYYMMDD_HHMMSS>.pdf`
pub fn snapshot_filename(at: DateTime<Local>) -> String {
    format!("Clinical_Snapshot_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}
