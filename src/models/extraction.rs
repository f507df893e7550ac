use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::enums::{Confidence, DocumentKind, DurationCategory};
use super::patient::Medication;

/// Placeholder the extraction service writes for fields it could not read.
const UNKNOWN: &str = "unknown";

/// One medication read off a prescription or brown-bag photo, awaiting review.
///
/// The service forwards model output unvalidated, so every field parses
/// leniently: `null` text becomes empty and an unreadable confidence is `Low`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMedicationDraft {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub generic_name: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub dose: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub frequency: String,
    #[serde(default)]
    pub indication: Option<String>,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub duration: String,
    #[serde(default = "default_confidence", deserialize_with = "loose_confidence")]
    pub confidence: Confidence,
}

fn default_confidence() -> Confidence {
    Confidence::Low
}

fn text_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn loose_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Confidence, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(raw
        .as_str()
        .and_then(|s| s.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or_else(default_confidence))
}

/// Field-level overrides applied by the reviewer. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftEdit {
    pub generic_name: Option<String>,
    pub brand_name: Option<String>,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub indication: Option<String>,
    pub duration: Option<String>,
}

impl DraftEdit {
    pub fn dose(dose: impl Into<String>) -> Self {
        Self {
            dose: Some(dose.into()),
            ..Default::default()
        }
    }
}

impl ExtractedMedicationDraft {
    /// Apply reviewer overrides in place.
    pub fn apply(&mut self, edit: DraftEdit) {
        if let Some(v) = edit.generic_name {
            self.generic_name = v;
        }
        if let Some(v) = edit.brand_name {
            self.brand_name = Some(v);
        }
        if let Some(v) = edit.dose {
            self.dose = v;
        }
        if let Some(v) = edit.frequency {
            self.frequency = v;
        }
        if let Some(v) = edit.indication {
            self.indication = Some(v);
        }
        if let Some(v) = edit.duration {
            self.duration = v;
        }
    }

    /// Convert into a canonical medication entry.
    ///
    /// "unknown" and blank optional fields become `None`; required text
    /// fields keep the reviewer's value with "unknown" cleared to empty.
    pub fn into_medication(self) -> Medication {
        Medication {
            generic_name: self.generic_name.trim().to_string(),
            brand_name: known(self.brand_name),
            dose: known_text(self.dose),
            frequency: known_text(self.frequency),
            duration: DurationCategory::from_loose(&self.duration),
            indication: known(self.indication),
        }
    }
}

fn known(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN))
}

fn known_text(value: String) -> String {
    known(Some(value)).unwrap_or_default()
}

/// Response of the extraction endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub medications: Vec<ExtractedMedicationDraft>,
    #[serde(default)]
    pub count: usize,
}

/// An uploaded document, retained so a failed extraction can be retried.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub kind: DocumentKind,
    pub filename: String,
    pub bytes: Arc<[u8]>,
}

impl UploadedDocument {
    pub fn new(kind: DocumentKind, filename: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            kind,
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// MIME type guessed from the file name.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, dose: &str) -> ExtractedMedicationDraft {
        ExtractedMedicationDraft {
            generic_name: name.into(),
            brand_name: Some("unknown".into()),
            dose: dose.into(),
            frequency: "BD".into(),
            indication: Some("diabetes".into()),
            duration: "long_term".into(),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn parses_service_draft_with_defaults() {
        let d: ExtractedMedicationDraft =
            serde_json::from_str(r#"{"generic_name": "metformin", "dose": "500 mg"}"#).unwrap();
        assert_eq!(d.confidence, Confidence::Low);
        assert!(d.brand_name.is_none());
        assert_eq!(d.duration, "");
    }

    #[test]
    fn null_fields_read_as_empty() {
        let d: ExtractedMedicationDraft = serde_json::from_str(
            r#"{"generic_name": "metformin", "dose": null, "frequency": null,
                "brand_name": null, "duration": null, "confidence": null}"#,
        )
        .unwrap();
        assert_eq!(d.generic_name, "metformin");
        assert_eq!(d.dose, "");
        assert_eq!(d.frequency, "");
        assert!(d.brand_name.is_none());
        assert_eq!(d.confidence, Confidence::Low);
    }

    #[test]
    fn confidence_ignores_case_and_falls_back_to_low() {
        let parsed: ExtractionResponse = serde_json::from_str(
            r#"{"success": true, "count": 3, "medications": [
                {"generic_name": "metformin", "confidence": "High"},
                {"generic_name": "amlodipine", "confidence": " MEDIUM "},
                {"generic_name": "aspirin", "confidence": "certain", "dose": 75}
            ]}"#,
        )
        .unwrap();
        let levels: Vec<Confidence> = parsed.medications.iter().map(|d| d.confidence).collect();
        assert_eq!(levels, vec![Confidence::High, Confidence::Medium, Confidence::Low]);
        assert_eq!(parsed.medications[2].dose, "75");
    }

    #[test]
    fn edit_overrides_only_given_fields() {
        let mut d = draft("metformin", "10mg");
        d.apply(DraftEdit::dose("20mg"));
        assert_eq!(d.dose, "20mg");
        assert_eq!(d.frequency, "BD");
        assert_eq!(d.generic_name, "metformin");
    }

    #[test]
    fn conversion_normalises_unknown_fields() {
        let mut d = draft(" metformin ", "unknown");
        d.frequency = "Unknown".into();
        let m = d.into_medication();
        assert_eq!(m.generic_name, "metformin");
        assert!(m.brand_name.is_none());
        assert_eq!(m.dose, "");
        assert_eq!(m.frequency, "");
        assert_eq!(m.duration, DurationCategory::LongTerm);
        assert_eq!(m.indication.as_deref(), Some("diabetes"));
    }

    #[test]
    fn mime_type_from_filename() {
        let doc = UploadedDocument::new(DocumentKind::Prescription, "rx.pdf", vec![1u8, 2, 3]);
        assert_eq!(doc.mime_type(), "application/pdf");
        let doc = UploadedDocument::new(DocumentKind::BrownBag, "bag.JPG", vec![0u8]);
        assert_eq!(doc.mime_type(), "image/jpeg");
        let doc = UploadedDocument::new(DocumentKind::BrownBag, "blob", vec![0u8]);
        assert_eq!(doc.mime_type(), "application/octet-stream");
    }
}
