//! Wire and domain types shared by the gateway, workflow and view layers.

pub mod analysis;
pub mod entity;
pub mod enums;
pub mod extraction;
pub mod interaction;
pub mod patient;
pub mod reference;
pub mod taper;

pub use analysis::{AnalysisResult, CategoryCounts, HerbDrugInteraction, MedicationAnalysis};
pub use entity::{DetailKey, DocumentKey, EntityKey};
pub use enums::{
    Confidence, DocumentKind, DurationCategory, FocusKind, Gender, LifeExpectancy, RiskCategory,
    Severity,
};
pub use extraction::{DraftEdit, ExtractedMedicationDraft, ExtractionResponse, UploadedDocument};
pub use interaction::{InteractionCheckRequest, InteractionDetail, InteractionReport};
pub use patient::{Herb, LabValues, Medication, PatientRecord};
pub use reference::{SupportedDrug, SupportedDrugs, SupportedHerb, SupportedHerbs};
pub use taper::{MonitoringPeriod, MonitoringSchedule, TaperPlan, TaperPlanRequest, TaperStep};

/// Errors from parsing model values out of user or wire input.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },
    #[error("Invalid entity key '{0}' (expected name#position)")]
    InvalidEntityKey(String),
}
