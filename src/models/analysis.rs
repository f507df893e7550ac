use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityKey;
use super::enums::{RiskCategory, Severity};

/// Full response of the analysis service.
///
/// Only the fields the client orchestrates on are typed; everything else is
/// kept verbatim in `extra` so the payload can be sent back unchanged for
/// report rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub patient_summary: Value,
    #[serde(default)]
    pub medication_analyses: Vec<MedicationAnalysis>,
    #[serde(default)]
    pub priority_summary: CategoryCounts,
    #[serde(default)]
    pub herb_drug_interactions: Vec<HerbDrugInteraction>,
    #[serde(default)]
    pub clinical_recommendations: Vec<Value>,
    #[serde(default)]
    pub safety_alerts: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// Entity key for the analysis entry at `position`.
    pub fn key_at(&self, position: usize) -> Option<EntityKey> {
        self.medication_analyses
            .get(position)
            .map(|a| EntityKey::new(&a.name, position))
    }

    /// Look up the analysis entry an entity key refers to.
    ///
    /// Names are compared in normalized form; a key whose name no longer
    /// matches the entry at its position refers to nothing.
    pub fn entry(&self, key: &EntityKey) -> Option<&MedicationAnalysis> {
        self.medication_analyses
            .get(key.position())
            .filter(|a| key.names(&a.name))
    }

    /// Keys for every entry, in list order.
    pub fn keys(&self) -> Vec<EntityKey> {
        self.medication_analyses
            .iter()
            .enumerate()
            .map(|(i, a)| EntityKey::new(&a.name, i))
            .collect()
    }
}

/// Per-medication (or per-herb) risk analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationAnalysis {
    pub name: String,
    #[serde(rename = "type", default = "default_entry_type")]
    pub entry_type: String,
    pub risk_category: RiskCategory,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub taper_required: bool,
    #[serde(default)]
    pub monitoring_required: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_entry_type() -> String {
    "allopathic".to_string()
}

impl MedicationAnalysis {
    pub fn is_herbal(&self) -> bool {
        self.entry_type.eq_ignore_ascii_case("herbal")
    }
}

/// Count per risk category, as `{"RED": n, "YELLOW": n, "GREEN": n}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    #[serde(rename = "RED", default)]
    pub red: u32,
    #[serde(rename = "YELLOW", default)]
    pub yellow: u32,
    #[serde(rename = "GREEN", default)]
    pub green: u32,
}

impl CategoryCounts {
    pub fn get(&self, category: RiskCategory) -> u32 {
        match category {
            RiskCategory::Red => self.red,
            RiskCategory::Yellow => self.yellow,
            RiskCategory::Green => self.green,
        }
    }

    pub fn total(&self) -> u32 {
        self.red + self.yellow + self.green
    }
}

/// Herb–drug interaction summary record from the analysis payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HerbDrugInteraction {
    pub herb: String,
    pub drug: String,
    pub severity: Severity,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub evidence: String,
}
