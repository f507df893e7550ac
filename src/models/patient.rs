use serde::{Deserialize, Serialize};

use super::enums::{DurationCategory, Gender, LifeExpectancy};

/// Patient data collected by the intake form and submitted for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Required at submit time; optional while the form is being filled.
    pub age: Option<u32>,
    pub gender: Gender,
    pub is_frail: bool,
    /// Clinical Frailty Scale, 1–9.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfs_score: Option<u8>,
    pub life_expectancy: LifeExpectancy,
    #[serde(default)]
    pub comorbidities: Vec<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub herbs: Vec<Herb>,
    #[serde(flatten)]
    pub labs: LabValues,
}

impl Default for PatientRecord {
    fn default() -> Self {
        Self {
            age: None,
            gender: Gender::Other,
            is_frail: false,
            cfs_score: None,
            life_expectancy: LifeExpectancy::MoreThanTenYears,
            comorbidities: Vec::new(),
            medications: Vec::new(),
            herbs: Vec::new(),
            labs: LabValues::default(),
        }
    }
}

impl PatientRecord {
    /// Names of every allopathic medication, in list order.
    pub fn medication_names(&self) -> Vec<String> {
        self.medications.iter().map(|m| m.generic_name.clone()).collect()
    }

    /// Names of every herbal product, in list order.
    pub fn herb_names(&self) -> Vec<String> {
        self.herbs.iter().map(|h| h.generic_name.clone()).collect()
    }

    /// True when nothing has been entered yet.
    pub fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}

/// Optional lab values used by the service for eGFR / MELD calculations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serum_creatinine_mg_dl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast_u_l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_u_l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serum_bilirubin_mg_dl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serum_sodium_mmol_l: Option<f64>,
}

/// An allopathic medication entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub generic_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub dose: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub duration: DurationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indication: Option<String>,
}

impl Medication {
    /// Minimal entry: name and dose, everything else defaulted.
    pub fn new(generic_name: impl Into<String>, dose: impl Into<String>) -> Self {
        Self {
            generic_name: generic_name.into(),
            brand_name: None,
            dose: dose.into(),
            frequency: String::new(),
            duration: DurationCategory::Unknown,
            indication: None,
        }
    }
}

/// A herbal (Ayurvedic) product. Same shape as a medication on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Herb {
    pub generic_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub dose: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub duration: DurationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indication: Option<String>,
}

impl Herb {
    pub fn new(generic_name: impl Into<String>) -> Self {
        Self {
            generic_name: generic_name.into(),
            brand_name: None,
            dose: String::new(),
            frequency: String::new(),
            duration: DurationCategory::Unknown,
            indication: None,
        }
    }
}

impl From<&Herb> for Medication {
    fn from(herb: &Herb) -> Self {
        Self {
            generic_name: herb.generic_name.clone(),
            brand_name: herb.brand_name.clone(),
            dose: herb.dose.clone(),
            frequency: herb.frequency.clone(),
            duration: herb.duration,
            indication: herb.indication.clone(),
        }
    }
}
