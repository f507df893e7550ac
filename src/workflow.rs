//! Workflow state machine.
//!
//! Owns the primary analysis lifecycle, the detail and extraction fetch
//! registries, the reviewer's extraction drafts and the single focused entity.
//!
//! Every transition is synchronous. A transition that needs remote work
//! returns a [`Request`] carrying a ticket; the outcome comes back through the
//! matching `settle_*` method with that ticket, and is dropped if the ticket
//! went stale in the meantime (reset, resubmission, invalidation).

use std::collections::HashMap;
use std::sync::Arc;

use crate::fetch::{FetchError, FetchRegistry, FetchState, FetchTicket};
use crate::gateway::GatewayError;
use crate::models::{
    AnalysisResult, DetailKey, DocumentKey, DraftEdit, EntityKey, ExtractedMedicationDraft,
    FocusKind, InteractionCheckRequest, InteractionReport, Medication, MedicationAnalysis,
    PatientRecord, TaperPlan, TaperPlanRequest, UploadedDocument,
};

// ═══════════════════════════════════════════════════════════
// Phase, focus, tickets, requests
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Submitting,
    Analyzed,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::Submitting => "submitting",
            Self::Analyzed => "analyzed",
            Self::Error => "in error",
        };
        f.write_str(s)
    }
}

/// The one entity whose detail is on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Focus {
    pub kind: FocusKind,
    pub entity: EntityKey,
}

/// Remote detail loaded for a focused entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDetail {
    TaperPlan(TaperPlan),
    Interactions(InteractionReport),
}

/// Issued with each analysis request; stale once the epoch moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTicket {
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailCall {
    TaperPlan(TaperPlanRequest),
    Interactions(InteractionCheckRequest),
}

/// Remote work a transition asks the caller to perform.
#[derive(Debug, Clone)]
pub enum Request {
    Analyze {
        ticket: AnalysisTicket,
        record: Arc<PatientRecord>,
    },
    Detail {
        ticket: FetchTicket<DetailKey>,
        call: DetailCall,
    },
    Extract {
        ticket: FetchTicket<DocumentKey>,
        document: UploadedDocument,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("An analysis is already in progress")]
    Conflict,
    #[error("Cannot {action} while {phase}")]
    IllegalTransition { action: &'static str, phase: Phase },
    #[error("Unknown entity {0}")]
    UnknownEntity(String),
    #[error("Unknown document {0}")]
    UnknownDocument(String),
    #[error("No draft at index {index} for {document}")]
    UnknownDraft { document: String, index: usize },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Analysis failed: {0}")]
    Transport(#[from] GatewayError),
}

// ═══════════════════════════════════════════════════════════
// Workflow
// ═══════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Workflow {
    phase: Phase,
    /// Working draft, editable while collecting.
    record: PatientRecord,
    /// Snapshot taken at submit; the analysis refers to this copy.
    submitted: Option<Arc<PatientRecord>>,
    analysis: Option<Arc<AnalysisResult>>,
    error: Option<String>,
    epoch: u64,
    details: FetchRegistry<DetailKey, EntityDetail>,
    extractions: FetchRegistry<DocumentKey, Vec<ExtractedMedicationDraft>>,
    uploads: HashMap<DocumentKey, UploadedDocument>,
    reviews: HashMap<DocumentKey, Vec<ExtractedMedicationDraft>>,
    focused: Option<Focus>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            phase: Phase::Collecting,
            record: PatientRecord::default(),
            submitted: None,
            analysis: None,
            error: None,
            epoch: 0,
            details: FetchRegistry::new(),
            extractions: FetchRegistry::new(),
            uploads: HashMap::new(),
            reviews: HashMap::new(),
            focused: None,
        }
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Primary analysis ────────────────────────────────────

    /// Submit `record` for analysis.
    pub fn submit(&mut self, record: PatientRecord) -> Result<Request, WorkflowError> {
        match self.phase {
            Phase::Collecting | Phase::Error => {}
            Phase::Submitting => return Err(WorkflowError::Conflict),
            Phase::Analyzed => {
                return Err(WorkflowError::IllegalTransition {
                    action: "submit",
                    phase: self.phase,
                })
            }
        }
        validate(&record)?;

        if self.phase == Phase::Error {
            tracing::debug!("Leaving error state for resubmission");
            self.error = None;
        }
        let snapshot = Arc::new(record.clone());
        self.record = record;
        self.submitted = Some(Arc::clone(&snapshot));
        self.epoch += 1;
        self.phase = Phase::Submitting;
        tracing::info!(
            epoch = self.epoch,
            medications = snapshot.medications.len(),
            herbs = snapshot.herbs.len(),
            "Submitting patient for analysis"
        );
        Ok(Request::Analyze {
            ticket: AnalysisTicket { epoch: self.epoch },
            record: snapshot,
        })
    }

    /// Submit the working draft as it stands.
    pub fn submit_draft(&mut self) -> Result<Request, WorkflowError> {
        self.submit(self.record.clone())
    }

    /// Apply an analysis outcome. Returns false when the ticket is stale.
    pub fn settle_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, GatewayError>,
    ) -> bool {
        if ticket.epoch != self.epoch || self.phase != Phase::Submitting {
            tracing::debug!(
                ticket = ticket.epoch,
                current = self.epoch,
                "Discarding stale analysis result"
            );
            return false;
        }
        match outcome {
            Ok(result) => {
                tracing::info!(
                    entries = result.medication_analyses.len(),
                    "Analysis complete"
                );
                self.analysis = Some(Arc::new(result));
                self.phase = Phase::Analyzed;
                self.clear_scoped();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Analysis request failed");
                self.error = Some(WorkflowError::Transport(e).to_string());
                self.phase = Phase::Error;
            }
        }
        true
    }

    /// Back to an empty `Collecting` machine from any state.
    ///
    /// In-flight requests are not aborted; their results are discarded.
    pub fn reset(&mut self) {
        let in_flight = self.details.loading_count() + self.extractions.loading_count();
        self.phase = Phase::Collecting;
        self.record = PatientRecord::default();
        self.submitted = None;
        self.analysis = None;
        self.error = None;
        self.epoch += 1;
        self.clear_scoped();
        tracing::info!(epoch = self.epoch, in_flight, "Workflow reset");
    }

    fn clear_scoped(&mut self) {
        self.details.clear();
        self.extractions.clear();
        self.uploads.clear();
        self.reviews.clear();
        self.focused = None;
    }

    /// Mutable access to the working draft while it may be edited.
    pub fn patient_mut(&mut self) -> Result<&mut PatientRecord, WorkflowError> {
        self.require_editable("edit patient")?;
        Ok(&mut self.record)
    }

    // ── Focus and entity details ────────────────────────────

    /// Focus one entity. Returns the detail request to run, if any.
    ///
    /// Kinds served from the analysis itself issue nothing. Remote kinds open
    /// the entity's cell when absent; an existing cell is reused as is.
    pub fn focus(
        &mut self,
        entity: EntityKey,
        kind: FocusKind,
    ) -> Result<Option<Request>, WorkflowError> {
        let call = self.detail_call(&entity, kind, "focus")?;
        self.focused = Some(Focus {
            kind,
            entity: entity.clone(),
        });
        let Some(call) = call else {
            return Ok(None);
        };
        let key = DetailKey::new(kind, entity);
        match self.details.open(key.clone()) {
            Some(ticket) => {
                tracing::debug!(key = %key, generation = ticket.generation, "Opening detail fetch");
                Ok(Some(Request::Detail { ticket, call }))
            }
            None => Ok(None),
        }
    }

    /// Hide the detail. Its cell stays cached.
    pub fn unfocus(&mut self) {
        self.focused = None;
    }

    /// Replace an entity's detail cell and fetch it again.
    pub fn invalidate(
        &mut self,
        entity: EntityKey,
        kind: FocusKind,
    ) -> Result<Option<Request>, WorkflowError> {
        let Some(call) = self.detail_call(&entity, kind, "invalidate")? else {
            return Ok(None);
        };
        let ticket = self.details.invalidate(DetailKey::new(kind, entity));
        tracing::debug!(key = %ticket.key, generation = ticket.generation, "Detail invalidated");
        Ok(Some(Request::Detail { ticket, call }))
    }

    /// Refetch a failed detail.
    pub fn retry(&mut self, entity: EntityKey, kind: FocusKind) -> Result<Request, WorkflowError> {
        let call = self
            .detail_call(&entity, kind, "retry")?
            .ok_or_else(|| FetchError::NoCell(DetailKey::new(kind, entity.clone()).to_string()))?;
        let ticket = self.details.retry(&DetailKey::new(kind, entity))?;
        Ok(Request::Detail { ticket, call })
    }

    /// Apply a detail outcome. Returns false when the ticket is stale.
    pub fn settle_detail(
        &mut self,
        ticket: FetchTicket<DetailKey>,
        outcome: Result<EntityDetail, GatewayError>,
    ) -> bool {
        if let Err(e) = &outcome {
            tracing::warn!(key = %ticket.key, error = %e, "Detail request failed");
        }
        let applied = self
            .details
            .resolve(&ticket, outcome.map_err(|e| e.to_string()));
        if !applied {
            tracing::debug!(key = %ticket.key, generation = ticket.generation, "Discarding stale detail");
        }
        applied
    }

    /// Build the remote call behind `(entity, kind)`, or `None` for kinds
    /// served locally. Fails unless analyzed and `entity` exists.
    fn detail_call(
        &self,
        entity: &EntityKey,
        kind: FocusKind,
        action: &'static str,
    ) -> Result<Option<DetailCall>, WorkflowError> {
        let (analysis, record) = match (&self.analysis, &self.submitted) {
            (Some(a), Some(r)) if self.phase == Phase::Analyzed => (a, r),
            _ => {
                return Err(WorkflowError::IllegalTransition {
                    action,
                    phase: self.phase,
                })
            }
        };
        let entry = analysis
            .entry(entity)
            .ok_or_else(|| WorkflowError::UnknownEntity(entity.to_string()))?;
        Ok(match kind {
            FocusKind::MonitoringDetail => None,
            FocusKind::TaperPlan => {
                let medication = source_medication(record, analysis, entity, entry);
                Some(DetailCall::TaperPlan(TaperPlanRequest::for_medication(
                    &medication,
                    record,
                )))
            }
            FocusKind::InteractionDetail => Some(DetailCall::Interactions(
                InteractionCheckRequest::for_entry(entry, record),
            )),
        })
    }

    // ── Extraction review ───────────────────────────────────

    /// Start extracting medications from an uploaded document.
    pub fn begin_extraction(
        &mut self,
        document: UploadedDocument,
    ) -> Result<(DocumentKey, Request), WorkflowError> {
        self.require_editable("upload a document")?;
        let key = DocumentKey::new();
        let ticket = self.extractions.invalidate(key);
        tracing::info!(
            document = %key,
            kind = %document.kind,
            filename = %document.filename,
            bytes = document.bytes.len(),
            "Extracting medications"
        );
        self.uploads.insert(key, document.clone());
        Ok((key, Request::Extract { ticket, document }))
    }

    /// Re-run a failed extraction with the retained upload.
    pub fn retry_extraction(&mut self, document: DocumentKey) -> Result<Request, WorkflowError> {
        self.require_editable("retry extraction")?;
        let upload = self
            .uploads
            .get(&document)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownDocument(document.to_string()))?;
        let ticket = self.extractions.retry(&document)?;
        Ok(Request::Extract {
            ticket,
            document: upload,
        })
    }

    /// Apply an extraction outcome. Returns false when the ticket is stale.
    pub fn settle_extraction(
        &mut self,
        ticket: FetchTicket<DocumentKey>,
        outcome: Result<Vec<ExtractedMedicationDraft>, GatewayError>,
    ) -> bool {
        let drafts = outcome.as_ref().ok().cloned();
        if let Err(e) = &outcome {
            tracing::warn!(document = %ticket.key, error = %e, "Extraction failed");
        }
        if !self
            .extractions
            .resolve(&ticket, outcome.map_err(|e| e.to_string()))
        {
            tracing::debug!(document = %ticket.key, "Discarding stale extraction");
            return false;
        }
        if let Some(drafts) = drafts {
            tracing::info!(document = %ticket.key, count = drafts.len(), "Drafts ready for review");
            self.reviews.insert(ticket.key, drafts);
        }
        true
    }

    pub fn edit_draft(
        &mut self,
        document: DocumentKey,
        index: usize,
        edit: DraftEdit,
    ) -> Result<(), WorkflowError> {
        self.draft_mut(document, index)?.apply(edit);
        Ok(())
    }

    pub fn discard_draft(
        &mut self,
        document: DocumentKey,
        index: usize,
    ) -> Result<ExtractedMedicationDraft, WorkflowError> {
        self.draft_mut(document, index)?;
        let drafts = self
            .reviews
            .get_mut(&document)
            .ok_or_else(|| WorkflowError::UnknownDocument(document.to_string()))?;
        Ok(drafts.remove(index))
    }

    /// Append the reviewed drafts of `document` to the patient's medications.
    ///
    /// Drafts without a name are dropped. Returns how many were appended.
    pub fn confirm_drafts(&mut self, document: DocumentKey) -> Result<usize, WorkflowError> {
        self.require_editable("confirm drafts")?;
        let drafts = self
            .reviews
            .remove(&document)
            .ok_or_else(|| WorkflowError::UnknownDocument(document.to_string()))?;
        let before = self.record.medications.len();
        self.record.medications.extend(
            drafts
                .into_iter()
                .filter(|d| !d.generic_name.trim().is_empty())
                .map(ExtractedMedicationDraft::into_medication),
        );
        let appended = self.record.medications.len() - before;
        self.forget_document(&document);
        tracing::info!(document = %document, appended, "Drafts confirmed");
        Ok(appended)
    }

    /// Throw away everything extracted from `document`.
    pub fn dismiss_drafts(&mut self, document: DocumentKey) -> Result<(), WorkflowError> {
        if !self.uploads.contains_key(&document) && !self.reviews.contains_key(&document) {
            return Err(WorkflowError::UnknownDocument(document.to_string()));
        }
        self.reviews.remove(&document);
        self.forget_document(&document);
        Ok(())
    }

    fn forget_document(&mut self, document: &DocumentKey) {
        self.uploads.remove(document);
        self.extractions.remove(document);
    }

    fn draft_mut(
        &mut self,
        document: DocumentKey,
        index: usize,
    ) -> Result<&mut ExtractedMedicationDraft, WorkflowError> {
        self.reviews
            .get_mut(&document)
            .ok_or_else(|| WorkflowError::UnknownDocument(document.to_string()))?
            .get_mut(index)
            .ok_or_else(|| WorkflowError::UnknownDraft {
                document: document.to_string(),
                index,
            })
    }

    fn require_editable(&self, action: &'static str) -> Result<(), WorkflowError> {
        match self.phase {
            Phase::Collecting | Phase::Error => Ok(()),
            phase => Err(WorkflowError::IllegalTransition { action, phase }),
        }
    }

    // ── Read access ─────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn record(&self) -> &PatientRecord {
        &self.record
    }

    pub fn submitted(&self) -> Option<&Arc<PatientRecord>> {
        self.submitted.as_ref()
    }

    pub fn analysis(&self) -> Option<&Arc<AnalysisResult>> {
        self.analysis.as_ref()
    }

    /// Reason of the last failed analysis, while in `Error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn focused(&self) -> Option<&Focus> {
        self.focused.as_ref()
    }

    pub fn detail(&self, key: &DetailKey) -> Option<&FetchState<EntityDetail>> {
        self.details.peek(key)
    }

    pub fn details(&self) -> &FetchRegistry<DetailKey, EntityDetail> {
        &self.details
    }

    pub fn extraction(&self, document: &DocumentKey) -> Option<&FetchState<Vec<ExtractedMedicationDraft>>> {
        self.extractions.peek(document)
    }

    /// Drafts awaiting review for `document`, with edits applied.
    pub fn review(&self, document: &DocumentKey) -> Option<&[ExtractedMedicationDraft]> {
        self.reviews.get(document).map(Vec::as_slice)
    }

    pub fn documents(&self) -> impl Iterator<Item = (&DocumentKey, &UploadedDocument)> {
        self.uploads.iter()
    }

    /// Detail and extraction cells currently held.
    pub fn live_cells(&self) -> usize {
        self.details.len() + self.extractions.len()
    }
}

/// Pre-flight checks for a submission.
fn validate(record: &PatientRecord) -> Result<(), WorkflowError> {
    if record.age.is_none() {
        return Err(WorkflowError::Validation("Patient age is required".into()));
    }
    if record.medications.is_empty() {
        return Err(WorkflowError::Validation(
            "At least one medication is required".into(),
        ));
    }
    if let Some(pos) = record
        .medications
        .iter()
        .position(|m| m.generic_name.trim().is_empty())
    {
        return Err(WorkflowError::Validation(format!(
            "Medication {} has no generic name",
            pos + 1
        )));
    }
    if let Some(score) = record.cfs_score.filter(|s| !(1..=9).contains(s)) {
        return Err(WorkflowError::Validation(format!(
            "Clinical Frailty Scale score must be 1-9, got {score}"
        )));
    }
    Ok(())
}

/// The submitted entry an analysis entry was computed from.
///
/// Same-named entries are matched by occurrence, so the second "metformin"
/// in the analysis maps to the second one in the record. Falls back to a
/// name-only entry when the record has no match.
fn source_medication(
    record: &PatientRecord,
    analysis: &AnalysisResult,
    entity: &EntityKey,
    entry: &MedicationAnalysis,
) -> Medication {
    let same = |name: &str| entity.names(name);
    let occurrence = analysis
        .medication_analyses
        .iter()
        .take(entity.position())
        .filter(|a| a.is_herbal() == entry.is_herbal() && same(&a.name))
        .count();
    let found = if entry.is_herbal() {
        record
            .herbs
            .iter()
            .filter(|h| same(&h.generic_name))
            .nth(occurrence)
            .map(Medication::from)
    } else {
        record
            .medications
            .iter()
            .filter(|m| same(&m.generic_name))
            .nth(occurrence)
            .cloned()
    };
    found.unwrap_or_else(|| Medication::new(entry.name.clone(), ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, DocumentKind, DurationCategory, Herb};
    use serde_json::json;

    fn diazepam_record() -> PatientRecord {
        PatientRecord {
            age: Some(75),
            medications: vec![Medication::new("diazepam", "5mg")],
            ..Default::default()
        }
    }

    fn analysis(entries: serde_json::Value) -> AnalysisResult {
        serde_json::from_value(json!({
            "medication_analyses": entries,
            "priority_summary": {"RED": 1, "YELLOW": 0, "GREEN": 0}
        }))
        .unwrap()
    }

    fn diazepam_analysis() -> AnalysisResult {
        analysis(json!([{
            "name": "Diazepam", "type": "allopathic", "risk_category": "RED",
            "risk_score": 8.5, "taper_required": true
        }]))
    }

    fn taper_plan() -> TaperPlan {
        serde_json::from_value(json!({
            "drug_name": "diazepam",
            "drug_class": "Benzodiazepine",
            "risk_profile": "High",
            "taper_strategy": "Gradual 25% reduction",
            "total_duration_weeks": 6,
            "steps": [
                {"week": 1, "dose": "3.75mg", "percentage_of_original": 75.0},
                {"week": 3, "dose": "2.5mg", "percentage_of_original": 50.0},
                {"week": 5, "dose": "1.25mg", "percentage_of_original": 25.0}
            ]
        }))
        .unwrap()
    }

    fn draft(name: &str, dose: &str) -> ExtractedMedicationDraft {
        ExtractedMedicationDraft {
            generic_name: name.into(),
            brand_name: None,
            dose: dose.into(),
            frequency: "once daily".into(),
            indication: None,
            duration: "long term".into(),
            confidence: Confidence::High,
        }
    }

    fn analyzed_with(record: PatientRecord, result: AnalysisResult) -> Workflow {
        let mut wf = Workflow::new();
        let Request::Analyze { ticket, .. } = wf.submit(record).unwrap() else {
            panic!("expected analysis request");
        };
        assert!(wf.settle_analysis(ticket, Ok(result)));
        wf
    }

    fn analyzed() -> Workflow {
        analyzed_with(diazepam_record(), diazepam_analysis())
    }

    fn detail_ticket(request: Option<Request>) -> FetchTicket<DetailKey> {
        match request {
            Some(Request::Detail { ticket, .. }) => ticket,
            other => panic!("expected detail request, got {other:?}"),
        }
    }

    fn extraction_ticket(request: Request) -> FetchTicket<DocumentKey> {
        match request {
            Request::Extract { ticket, .. } => ticket,
            other => panic!("expected extraction request, got {other:?}"),
        }
    }

    fn diazepam() -> EntityKey {
        EntityKey::new("diazepam", 0)
    }

    fn prescription() -> UploadedDocument {
        UploadedDocument::new(DocumentKind::Prescription, "rx.jpg", vec![0xFF, 0xD8, 0xFF])
    }

    #[test]
    fn submit_requires_age_and_medications() {
        let mut wf = Workflow::new();
        let no_age = PatientRecord {
            age: None,
            ..diazepam_record()
        };
        assert!(matches!(wf.submit(no_age), Err(WorkflowError::Validation(_))));

        let no_meds = PatientRecord {
            medications: vec![],
            ..diazepam_record()
        };
        assert!(matches!(wf.submit(no_meds), Err(WorkflowError::Validation(_))));

        let bad_cfs = PatientRecord {
            cfs_score: Some(12),
            ..diazepam_record()
        };
        assert!(matches!(wf.submit(bad_cfs), Err(WorkflowError::Validation(_))));

        assert_eq!(wf.phase(), Phase::Collecting);
        assert!(wf.submitted().is_none());
    }

    #[test]
    fn second_submit_while_submitting_conflicts() {
        let mut wf = Workflow::new();
        assert!(matches!(wf.submit(diazepam_record()), Ok(Request::Analyze { .. })));
        assert_eq!(wf.submit(diazepam_record()).unwrap_err(), WorkflowError::Conflict);
        assert_eq!(wf.phase(), Phase::Submitting);
    }

    #[test]
    fn projected_keys_focus_entries_named_as_typed() {
        let record = PatientRecord {
            age: Some(81),
            medications: vec![
                Medication::new("diazepam ", "5mg"),
                Medication::new("Échinacea", "400mg"),
            ],
            ..Default::default()
        };
        let result = analysis(json!([
            {"name": "diazepam ", "type": "allopathic", "risk_category": "RED",
             "risk_score": 8.5, "taper_required": true},
            {"name": "Échinacea", "type": "allopathic", "risk_category": "RED",
             "risk_score": 7.0, "taper_required": true}
        ]));
        let mut wf = analyzed_with(record, result);

        let keys: Vec<EntityKey> = crate::view::project(&wf)
            .bucket(crate::models::RiskCategory::Red)
            .iter()
            .map(|e| e.key.clone())
            .collect();
        assert_eq!(keys[0].to_string(), "diazepam#0");
        assert_eq!(keys[1].to_string(), "échinacea#1");

        for (key, dose) in keys.into_iter().zip(["5mg", "400mg"]) {
            let request = wf.focus(key.clone(), FocusKind::TaperPlan).unwrap();
            match request {
                Some(Request::Detail {
                    call: DetailCall::TaperPlan(req),
                    ..
                }) => assert_eq!(req.current_dose, dose),
                other => panic!("expected taper request for {key}, got {other:?}"),
            }
            assert!(wf.invalidate(key.clone(), FocusKind::TaperPlan).unwrap().is_some());
            assert!(wf.focus(key, FocusKind::MonitoringDetail).unwrap().is_none());
        }
    }

    #[test]
    fn submit_from_analyzed_requires_reset() {
        let mut wf = analyzed();
        let err = wf.submit(diazepam_record()).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::IllegalTransition {
                action: "submit",
                phase: Phase::Analyzed
            }
        );
        assert_eq!(wf.phase(), Phase::Analyzed);
    }

    #[test]
    fn analysis_failure_enters_error_and_allows_resubmit() {
        let mut wf = Workflow::new();
        let Request::Analyze { ticket, .. } = wf.submit(diazepam_record()).unwrap() else {
            panic!("expected analysis request");
        };
        assert!(wf.settle_analysis(ticket, Err(GatewayError::Timeout(120))));
        assert_eq!(wf.phase(), Phase::Error);
        assert_eq!(wf.error(), Some("Analysis failed: Request timed out after 120s"));

        // Draft is still there to fix up and resubmit.
        wf.patient_mut().unwrap().age = Some(76);
        assert!(matches!(wf.submit_draft(), Ok(Request::Analyze { .. })));
        assert_eq!(wf.phase(), Phase::Submitting);
        assert!(wf.error().is_none());
        assert_eq!(wf.submitted().unwrap().age, Some(76));
    }

    #[test]
    fn submitted_snapshot_is_isolated_from_later_edits() {
        let mut wf = Workflow::new();
        let Request::Analyze { ticket, record } = wf.submit(diazepam_record()).unwrap() else {
            panic!("expected analysis request");
        };
        wf.settle_analysis(ticket, Err(GatewayError::Connection("x".into())));
        wf.patient_mut().unwrap().medications.push(Medication::new("zolpidem", "10mg"));
        assert_eq!(record.medications.len(), 1);
        assert_eq!(wf.submitted().unwrap().medications.len(), 1);
    }

    #[test]
    fn stale_analysis_after_reset_is_discarded() {
        let mut wf = Workflow::new();
        let Request::Analyze { ticket, .. } = wf.submit(diazepam_record()).unwrap() else {
            panic!("expected analysis request");
        };
        wf.reset();
        assert!(!wf.settle_analysis(ticket, Ok(diazepam_analysis())));
        assert_eq!(wf.phase(), Phase::Collecting);
        assert!(wf.analysis().is_none());

        // A newer submission is not satisfied by the old ticket either.
        wf.submit(diazepam_record()).unwrap();
        assert!(!wf.settle_analysis(ticket, Ok(diazepam_analysis())));
        assert_eq!(wf.phase(), Phase::Submitting);
    }

    #[test]
    fn analysis_success_drops_pending_drafts() {
        let mut wf = Workflow::new();
        let (doc, req) = wf.begin_extraction(prescription()).unwrap();
        wf.settle_extraction(extraction_ticket(req), Ok(vec![draft("ramipril", "5mg")]));
        assert!(wf.review(&doc).is_some());

        let Request::Analyze { ticket, .. } = wf.submit(diazepam_record()).unwrap() else {
            panic!("expected analysis request");
        };
        wf.settle_analysis(ticket, Ok(diazepam_analysis()));
        assert!(wf.review(&doc).is_none());
        assert_eq!(wf.live_cells(), 0);
        assert!(wf.focused().is_none());
    }

    #[test]
    fn focus_requires_analysis_and_known_entity() {
        let mut wf = Workflow::new();
        assert!(matches!(
            wf.focus(diazepam(), FocusKind::TaperPlan),
            Err(WorkflowError::IllegalTransition { action: "focus", .. })
        ));

        let mut wf = analyzed();
        assert!(matches!(
            wf.focus(EntityKey::new("lorazepam", 0), FocusKind::TaperPlan),
            Err(WorkflowError::UnknownEntity(k)) if k == "lorazepam#0"
        ));
        // Right name, wrong position.
        assert!(matches!(
            wf.focus(EntityKey::new("diazepam", 1), FocusKind::TaperPlan),
            Err(WorkflowError::UnknownEntity(_))
        ));
        assert!(wf.focused().is_none());
    }

    #[test]
    fn focus_is_idempotent_while_loading() {
        let mut wf = analyzed();
        let request = wf.focus(diazepam(), FocusKind::TaperPlan).unwrap();
        let Some(Request::Detail { call: DetailCall::TaperPlan(req), .. }) = &request else {
            panic!("expected taper request");
        };
        assert_eq!(req.drug_name, "diazepam");
        assert_eq!(req.current_dose, "5mg");
        assert_eq!(req.patient_age, 75);

        assert!(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap().is_none());
        wf.unfocus();
        assert!(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap().is_none());
        assert_eq!(wf.details().len(), 1);
        assert_eq!(wf.details().loading_count(), 1);
    }

    #[test]
    fn monitoring_focus_is_local() {
        let mut wf = analyzed();
        assert!(wf.focus(diazepam(), FocusKind::MonitoringDetail).unwrap().is_none());
        assert_eq!(
            wf.focused(),
            Some(&Focus {
                kind: FocusKind::MonitoringDetail,
                entity: diazepam()
            })
        );
        assert!(wf.details().is_empty());
    }

    #[test]
    fn settled_detail_is_cached_across_refocus() {
        let mut wf = analyzed();
        let ticket = detail_ticket(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap());
        assert!(wf.settle_detail(ticket, Ok(EntityDetail::TaperPlan(taper_plan()))));
        wf.unfocus();

        assert!(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap().is_none());
        let key = DetailKey::new(FocusKind::TaperPlan, diazepam());
        assert!(matches!(
            wf.detail(&key),
            Some(FetchState::Success(EntityDetail::TaperPlan(p))) if p.steps.len() == 3
        ));
    }

    #[test]
    fn entities_race_independently() {
        let record = PatientRecord {
            age: Some(80),
            medications: vec![Medication::new("diazepam", "5mg"), Medication::new("zolpidem", "10mg")],
            ..Default::default()
        };
        let result = analysis(json!([
            {"name": "diazepam", "risk_category": "RED", "taper_required": true},
            {"name": "zolpidem", "risk_category": "RED", "taper_required": true}
        ]));
        let mut wf = analyzed_with(record, result);
        let zolpidem = EntityKey::new("zolpidem", 1);

        let first = detail_ticket(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap());
        let second = detail_ticket(wf.focus(zolpidem.clone(), FocusKind::TaperPlan).unwrap());
        assert_eq!(wf.focused().unwrap().entity, zolpidem);

        assert!(wf.settle_detail(second, Err(GatewayError::Status { status: 500, detail: "x".into() })));
        assert!(wf.settle_detail(first, Ok(EntityDetail::TaperPlan(taper_plan()))));

        let zkey = DetailKey::new(FocusKind::TaperPlan, zolpidem);
        assert!(matches!(wf.detail(&zkey), Some(FetchState::Failed(_))));
        let dkey = DetailKey::new(FocusKind::TaperPlan, diazepam());
        assert!(matches!(wf.detail(&dkey), Some(FetchState::Success(_))));
    }

    #[test]
    fn same_named_entries_are_distinct_entities() {
        let record = PatientRecord {
            age: Some(70),
            medications: vec![Medication::new("metformin", "500mg"), Medication::new("Metformin", "1000mg")],
            ..Default::default()
        };
        let result = analysis(json!([
            {"name": "metformin", "risk_category": "GREEN"},
            {"name": "metformin", "risk_category": "YELLOW"}
        ]));
        let mut wf = analyzed_with(record, result);

        let first = wf.focus(EntityKey::new("metformin", 0), FocusKind::TaperPlan).unwrap();
        let second = wf.focus(EntityKey::new("metformin", 1), FocusKind::TaperPlan).unwrap();
        let dose = |r: Option<Request>| match r {
            Some(Request::Detail { call: DetailCall::TaperPlan(req), .. }) => req.current_dose,
            other => panic!("expected taper request, got {other:?}"),
        };
        assert_eq!(dose(first), "500mg");
        assert_eq!(dose(second), "1000mg");
        assert_eq!(wf.details().len(), 2);
    }

    #[test]
    fn interaction_detail_scopes_to_entry() {
        let record = PatientRecord {
            age: Some(70),
            medications: vec![Medication::new("warfarin", "5mg")],
            herbs: vec![Herb::new("ashwagandha"), Herb::new("guggul")],
            ..Default::default()
        };
        let result = analysis(json!([
            {"name": "warfarin", "type": "allopathic", "risk_category": "RED"},
            {"name": "ashwagandha", "type": "herbal", "risk_category": "YELLOW"}
        ]));
        let mut wf = analyzed_with(record, result);
        let request = wf
            .focus(EntityKey::new("warfarin", 0), FocusKind::InteractionDetail)
            .unwrap();
        let Some(Request::Detail { call: DetailCall::Interactions(req), ticket }) = request else {
            panic!("expected interaction request");
        };
        assert_eq!(req.medications, vec!["warfarin"]);
        assert_eq!(req.herbs, vec!["ashwagandha", "guggul"]);
        assert_eq!(ticket.key.kind, FocusKind::InteractionDetail);
    }

    #[test]
    fn invalidate_supersedes_in_flight_fetch() {
        let mut wf = analyzed();
        let old = detail_ticket(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap());
        let new = detail_ticket(wf.invalidate(diazepam(), FocusKind::TaperPlan).unwrap());
        assert!(new.generation > old.generation);

        assert!(!wf.settle_detail(old, Ok(EntityDetail::TaperPlan(taper_plan()))));
        let key = DetailKey::new(FocusKind::TaperPlan, diazepam());
        assert!(matches!(wf.detail(&key), Some(FetchState::Loading)));
        assert!(wf.settle_detail(new, Err(GatewayError::Timeout(120))));
        assert!(matches!(wf.detail(&key), Some(FetchState::Failed(_))));

        assert!(wf.invalidate(diazepam(), FocusKind::MonitoringDetail).unwrap().is_none());
    }

    #[test]
    fn retry_only_from_failed() {
        let mut wf = analyzed();
        assert!(matches!(
            wf.retry(diazepam(), FocusKind::TaperPlan),
            Err(WorkflowError::Fetch(FetchError::NoCell(_)))
        ));
        let ticket = detail_ticket(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap());
        assert!(matches!(
            wf.retry(diazepam(), FocusKind::TaperPlan),
            Err(WorkflowError::Fetch(FetchError::NotFailed { state: "loading", .. }))
        ));
        wf.settle_detail(ticket.clone(), Err(GatewayError::Connection("http://localhost:8000".into())));

        // Failed cells are reused on refocus, not refetched.
        assert!(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap().is_none());

        let Request::Detail { ticket: again, .. } = wf.retry(diazepam(), FocusKind::TaperPlan).unwrap() else {
            panic!("expected detail request");
        };
        assert!(again.generation > ticket.generation);
        assert!(!wf.settle_detail(ticket, Ok(EntityDetail::TaperPlan(taper_plan()))));
        assert!(wf.settle_detail(again, Ok(EntityDetail::TaperPlan(taper_plan()))));
    }

    #[test]
    fn reset_from_every_phase_yields_empty_collecting() {
        let check = |mut wf: Workflow| {
            wf.reset();
            assert_eq!(wf.phase(), Phase::Collecting);
            assert!(wf.record().is_blank());
            assert!(wf.analysis().is_none());
            assert!(wf.submitted().is_none());
            assert!(wf.error().is_none());
            assert!(wf.focused().is_none());
            assert_eq!(wf.live_cells(), 0);
        };

        let mut collecting = Workflow::new();
        collecting.patient_mut().unwrap().age = Some(60);
        collecting.begin_extraction(prescription()).unwrap();
        check(collecting);

        let mut submitting = Workflow::new();
        submitting.submit(diazepam_record()).unwrap();
        check(submitting);

        let mut analyzed = analyzed();
        analyzed.focus(diazepam(), FocusKind::TaperPlan).unwrap();
        check(analyzed);

        let mut error = Workflow::new();
        let Request::Analyze { ticket, .. } = error.submit(diazepam_record()).unwrap() else {
            panic!("expected analysis request");
        };
        error.settle_analysis(ticket, Err(GatewayError::Timeout(1)));
        check(error);
    }

    #[test]
    fn detail_ticket_from_before_reset_is_discarded() {
        let mut wf = analyzed();
        let ticket = detail_ticket(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap());
        wf.reset();
        let Request::Analyze { ticket: analysis_ticket, .. } = wf.submit(diazepam_record()).unwrap() else {
            panic!("expected analysis request");
        };
        wf.settle_analysis(analysis_ticket, Ok(diazepam_analysis()));
        let fresh = detail_ticket(wf.focus(diazepam(), FocusKind::TaperPlan).unwrap());

        assert!(!wf.settle_detail(ticket, Ok(EntityDetail::TaperPlan(taper_plan()))));
        assert!(wf.settle_detail(fresh, Ok(EntityDetail::TaperPlan(taper_plan()))));
    }

    #[test]
    fn extraction_edit_and_confirm_appends_in_order() {
        let mut wf = Workflow::new();
        wf.patient_mut().unwrap().medications.push(Medication::new("aspirin", "75mg"));

        let (doc, request) = wf.begin_extraction(prescription()).unwrap();
        assert!(matches!(wf.extraction(&doc), Some(FetchState::Loading)));
        let drafts = vec![draft("atorvastatin", "10mg"), draft("amlodipine", "5mg")];
        assert!(wf.settle_extraction(extraction_ticket(request), Ok(drafts.clone())));

        wf.edit_draft(doc, 0, DraftEdit::dose("20mg")).unwrap();
        assert_eq!(wf.review(&doc).unwrap()[0].dose, "20mg");
        // The fetched value itself stays as received.
        assert!(matches!(wf.extraction(&doc), Some(FetchState::Success(d)) if d == &drafts));

        assert_eq!(wf.confirm_drafts(doc).unwrap(), 2);
        let meds = &wf.record().medications;
        assert_eq!(meds.len(), 3);
        assert_eq!(meds[0], Medication::new("aspirin", "75mg"));
        assert_eq!(meds[1].generic_name, "atorvastatin");
        assert_eq!(meds[1].dose, "20mg");
        assert_eq!(meds[1].duration, DurationCategory::LongTerm);
        assert_eq!(meds[2].generic_name, "amlodipine");
        assert_eq!(meds[2].dose, "5mg");

        assert!(wf.review(&doc).is_none());
        assert_eq!(wf.confirm_drafts(doc), Err(WorkflowError::UnknownDocument(doc.to_string())));
    }

    #[test]
    fn failed_extraction_can_be_retried_with_same_upload() {
        let mut wf = Workflow::new();
        let (doc, request) = wf.begin_extraction(prescription()).unwrap();
        let first = extraction_ticket(request);
        assert!(wf.settle_extraction(first.clone(), Err(GatewayError::Timeout(120))));
        assert!(matches!(wf.extraction(&doc), Some(FetchState::Failed(_))));

        let Request::Extract { ticket, document } = wf.retry_extraction(doc).unwrap() else {
            panic!("expected extraction request");
        };
        assert_eq!(document.filename, "rx.jpg");
        assert!(ticket.generation > first.generation);
        assert!(wf.settle_extraction(ticket, Ok(vec![draft("losartan", "50mg")])));
        assert_eq!(wf.review(&doc).unwrap().len(), 1);

        assert!(matches!(
            wf.retry_extraction(DocumentKey::new()),
            Err(WorkflowError::UnknownDocument(_))
        ));
    }

    #[test]
    fn discard_and_dismiss_drafts() {
        let mut wf = Workflow::new();
        let (doc, request) = wf.begin_extraction(prescription()).unwrap();
        wf.settle_extraction(
            extraction_ticket(request),
            Ok(vec![draft("a", "1mg"), draft("b", "2mg"), draft("", "3mg")]),
        );
        assert_eq!(wf.discard_draft(doc, 0).unwrap().generic_name, "a");
        assert_eq!(
            wf.edit_draft(doc, 5, DraftEdit::default()),
            Err(WorkflowError::UnknownDraft { document: doc.to_string(), index: 5 })
        );
        // The nameless draft is dropped on confirm.
        assert_eq!(wf.confirm_drafts(doc).unwrap(), 1);

        let (other, _) = wf.begin_extraction(prescription()).unwrap();
        wf.dismiss_drafts(other).unwrap();
        assert!(wf.extraction(&other).is_none());
        assert!(wf.dismiss_drafts(other).is_err());
    }

    #[test]
    fn extraction_only_while_collecting() {
        let mut wf = analyzed();
        assert!(matches!(
            wf.begin_extraction(prescription()),
            Err(WorkflowError::IllegalTransition { phase: Phase::Analyzed, .. })
        ));
        assert!(wf.patient_mut().is_err());
    }
}
