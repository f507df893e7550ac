use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::enums::DurationCategory;
use super::patient::{Medication, PatientRecord};

/// Request body for `POST /get-taper-plan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaperPlanRequest {
    pub drug_name: String,
    pub current_dose: String,
    pub duration_on_medication: DurationCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_cfs_score: Option<u8>,
    pub patient_age: u32,
    pub comorbidities: Vec<String>,
}

impl TaperPlanRequest {
    /// Build the request for one medication of a submitted record.
    pub fn for_medication(medication: &Medication, record: &PatientRecord) -> Self {
        Self {
            drug_name: medication.generic_name.clone(),
            current_dose: medication.dose.clone(),
            duration_on_medication: medication.duration,
            patient_cfs_score: record.cfs_score,
            patient_age: record.age.unwrap_or_default(),
            comorbidities: record.comorbidities.clone(),
        }
    }
}

/// Week-by-week tapering plan for one drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaperPlan {
    #[serde(default)]
    pub drug_name: String,
    pub drug_class: String,
    pub risk_profile: String,
    pub taper_strategy: String,
    pub total_duration_weeks: u32,
    pub steps: Vec<TaperStep>,
    #[serde(default)]
    pub pause_criteria: Vec<String>,
    #[serde(default)]
    pub reversal_criteria: Vec<String>,
    #[serde(default)]
    pub monitoring_schedule: MonitoringSchedule,
    #[serde(default)]
    pub patient_education: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_indicators: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaperStep {
    pub week: u32,
    pub dose: String,
    pub percentage_of_original: f64,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub monitoring: String,
    #[serde(default)]
    pub withdrawal_symptoms_to_watch: Vec<String>,
}

/// Monitoring schedule: period label → ordered action items.
///
/// Serialized as a JSON object; period order is kept as received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitoringSchedule(pub Vec<MonitoringPeriod>);

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringPeriod {
    pub period: String,
    pub actions: Vec<String>,
}

impl MonitoringSchedule {
    pub fn periods(&self) -> &[MonitoringPeriod] {
        &self.0
    }

    pub fn get(&self, period: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|p| p.period == period)
            .map(|p| p.actions.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for MonitoringSchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for p in &self.0 {
            map.serialize_entry(&p.period, &p.actions)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MonitoringSchedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScheduleVisitor;

        impl<'de> Visitor<'de> for ScheduleVisitor {
            type Value = MonitoringSchedule;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of period label to list of actions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut periods = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((period, actions)) = access.next_entry::<String, Vec<String>>()? {
                    periods.push(MonitoringPeriod { period, actions });
                }
                Ok(MonitoringSchedule(periods))
            }
        }

        deserializer.deserialize_map(ScheduleVisitor)
    }
}
