//! Reference lists the intake form offers as suggestions.

use serde::{Deserialize, Serialize};

/// A drug the service holds a tapering protocol for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedDrug {
    pub drug_name: String,
    #[serde(default)]
    pub drug_class: Option<String>,
    #[serde(default)]
    pub risk_profile: Option<String>,
}

/// Response of `GET /supported-drugs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportedDrugs {
    #[serde(default)]
    pub total_drugs: usize,
    #[serde(default)]
    pub drugs: Vec<SupportedDrug>,
}

/// An Ayurvedic herb the interaction checker knows. Column names come
/// straight from the service's dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedHerb {
    #[serde(rename = "Herb Name")]
    pub name: String,
    #[serde(rename = "Primary Indications", default)]
    pub primary_indications: Option<String>,
    #[serde(rename = "Key Safety Concerns", default)]
    pub key_safety_concerns: Option<String>,
}

/// Response of `GET /supported-herbs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportedHerbs {
    #[serde(default)]
    pub total_herbs: usize,
    #[serde(default)]
    pub herbs: Vec<SupportedHerb>,
}

impl SupportedDrugs {
    /// Whether `name` has a protocol, ignoring case and padding.
    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.drugs
            .iter()
            .any(|d| d.drug_name.trim().eq_ignore_ascii_case(name))
    }
}
