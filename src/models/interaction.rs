use serde::{Deserialize, Serialize};

use super::analysis::MedicationAnalysis;
use super::enums::Severity;
use super::patient::PatientRecord;

/// Request body for `POST /interaction-checker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionCheckRequest {
    pub herbs: Vec<String>,
    pub medications: Vec<String>,
    pub patient_comorbidities: Vec<String>,
}

impl InteractionCheckRequest {
    /// Scope an interaction check to one analysed entry.
    ///
    /// A herb is checked against every medication of the record; a
    /// medication against every herb.
    pub fn for_entry(entry: &MedicationAnalysis, record: &PatientRecord) -> Self {
        let (herbs, medications) = if entry.is_herbal() {
            (vec![entry.name.clone()], record.medication_names())
        } else {
            (record.herb_names(), vec![entry.name.clone()])
        };
        Self {
            herbs,
            medications,
            patient_comorbidities: record.comorbidities.clone(),
        }
    }
}

/// Response of the interaction checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionReport {
    pub total_interactions: u32,
    #[serde(default)]
    pub major_interactions: u32,
    #[serde(default)]
    pub moderate_interactions: u32,
    #[serde(default)]
    pub minor_interactions: u32,
    #[serde(default)]
    pub interactions: Vec<InteractionDetail>,
    #[serde(default)]
    pub overall_risk_assessment: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionDetail {
    pub herb_name: String,
    pub drug_name: String,
    #[serde(default)]
    pub interaction_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default)]
    pub clinical_effect: String,
    #[serde(default)]
    pub evidence_strength: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub monitoring_required: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Herb, Medication, RiskCategory};

    fn entry(name: &str, entry_type: &str) -> MedicationAnalysis {
        MedicationAnalysis {
            name: name.into(),
            entry_type: entry_type.into(),
            risk_category: RiskCategory::Yellow,
            risk_score: 4.0,
            flags: vec![],
            recommendations: vec![],
            taper_required: false,
            monitoring_required: vec![],
            extra: Default::default(),
        }
    }

    fn record() -> PatientRecord {
        PatientRecord {
            age: Some(70),
            comorbidities: vec!["hypertension".into()],
            medications: vec![Medication::new("warfarin", "5mg"), Medication::new("aspirin", "75mg")],
            herbs: vec![Herb::new("ashwagandha"), Herb::new("guggul")],
            ..Default::default()
        }
    }

    #[test]
    fn herb_is_checked_against_all_medications() {
        let request = InteractionCheckRequest::for_entry(&entry("guggul", "herbal"), &record());
        assert_eq!(request.herbs, vec!["guggul"]);
        assert_eq!(request.medications, vec!["warfarin", "aspirin"]);
        assert_eq!(request.patient_comorbidities, vec!["hypertension"]);
    }

    #[test]
    fn medication_is_checked_against_all_herbs() {
        let request = InteractionCheckRequest::for_entry(&entry("warfarin", "allopathic"), &record());
        assert_eq!(request.herbs, vec!["ashwagandha", "guggul"]);
        assert_eq!(request.medications, vec!["warfarin"]);
    }
}
