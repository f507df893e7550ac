//! Cooperative driver tying the workflow to a gateway.
//!
//! Transitions run synchronously on the [`Workflow`]; the requests they return
//! are turned into futures and parked in one [`FuturesUnordered`]. The host
//! loop awaits [`Session::next_event`], which applies exactly one completion
//! per call. There are no threads and no locks: every state change happens
//! between awaits, on the caller's task.

use std::rc::Rc;
use std::time::Duration;

use chrono::Local;
use futures_util::future::LocalBoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};

use crate::config::{ClientConfig, DEFAULT_COUNTER_TICK_MS};
use crate::export::{self, CaptureTarget, DirectorySink, DownloadSink, ExportError, ExportKind, Exported};
use crate::fetch::FetchTicket;
use crate::gateway::{Gateway, GatewayError, HttpGateway};
use crate::models::{
    AnalysisResult, DetailKey, DocumentKey, DraftEdit, EntityKey, ExtractedMedicationDraft,
    FocusKind, PatientRecord, UploadedDocument,
};
use crate::view::{self, CounterBoard, View};
use crate::workflow::{AnalysisTicket, DetailCall, EntityDetail, Request, Workflow, WorkflowError};

/// Outcome of one finished operation, before it is applied.
enum Completion {
    Analysis {
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, GatewayError>,
    },
    Detail {
        ticket: FetchTicket<DetailKey>,
        outcome: Result<EntityDetail, GatewayError>,
    },
    Extraction {
        ticket: FetchTicket<DocumentKey>,
        outcome: Result<Vec<ExtractedMedicationDraft>, GatewayError>,
    },
    Export {
        kind: ExportKind,
        outcome: Result<Exported, ExportError>,
    },
}

/// What changed after applying one completion.
#[derive(Debug)]
pub enum SessionEvent {
    AnalysisReady,
    AnalysisFailed(String),
    DetailReady(DetailKey),
    DetailFailed { key: DetailKey, reason: String },
    DraftsReady { document: DocumentKey, count: usize },
    ExtractionFailed { document: DocumentKey, reason: String },
    /// A result arrived for something reset or superseded meanwhile.
    Discarded,
    ExportFinished {
        kind: ExportKind,
        result: Result<Exported, ExportError>,
    },
}

pub struct Session<G: Gateway + 'static> {
    workflow: Workflow,
    gateway: Rc<G>,
    sink: Rc<dyn DownloadSink>,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    counter_tick: Duration,
}

impl Session<HttpGateway> {
    /// HTTP gateway and Downloads-folder sink from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        let gateway = HttpGateway::new(config)?;
        let mut session = Self::new(gateway, DirectorySink::new(config.export_dir.clone()));
        session.counter_tick = config.counter_tick();
        tracing::info!(
            service = %config.service_base_url,
            export_dir = %config.export_dir.display(),
            "Session ready"
        );
        Ok(session)
    }
}

impl<G: Gateway + 'static> Session<G> {
    pub fn new(gateway: G, sink: impl DownloadSink + 'static) -> Self {
        Self::with_shared(Rc::new(gateway), Rc::new(sink))
    }

    /// Build around handles the caller keeps a copy of.
    pub fn with_shared(gateway: Rc<G>, sink: Rc<dyn DownloadSink>) -> Self {
        Self {
            workflow: Workflow::new(),
            gateway,
            sink,
            in_flight: FuturesUnordered::new(),
            counter_tick: Duration::from_millis(DEFAULT_COUNTER_TICK_MS),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn view(&self) -> View<'_> {
        view::project(&self.workflow)
    }

    /// Counter board aimed at the current counts, starting from zero.
    pub fn counter_board(&self) -> CounterBoard {
        let mut board = CounterBoard::new(self.counter_tick);
        board.retarget(self.view().counts.shown);
        board
    }

    /// Operations started but not yet applied.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    // ── Transitions ─────────────────────────────────────────

    pub fn patient_mut(&mut self) -> Result<&mut PatientRecord, WorkflowError> {
        self.workflow.patient_mut()
    }

    pub fn submit(&mut self, record: PatientRecord) -> Result<(), WorkflowError> {
        let request = self.workflow.submit(record)?;
        self.dispatch(request);
        Ok(())
    }

    pub fn submit_draft(&mut self) -> Result<(), WorkflowError> {
        let request = self.workflow.submit_draft()?;
        self.dispatch(request);
        Ok(())
    }

    /// Reset the workflow. In-flight operations keep running; whatever they
    /// return for the old state is discarded. Exports are unaffected.
    pub fn reset(&mut self) {
        self.workflow.reset();
    }

    pub fn focus(&mut self, entity: EntityKey, kind: FocusKind) -> Result<(), WorkflowError> {
        if let Some(request) = self.workflow.focus(entity, kind)? {
            self.dispatch(request);
        }
        Ok(())
    }

    pub fn unfocus(&mut self) {
        self.workflow.unfocus();
    }

    pub fn invalidate(&mut self, entity: EntityKey, kind: FocusKind) -> Result<(), WorkflowError> {
        if let Some(request) = self.workflow.invalidate(entity, kind)? {
            self.dispatch(request);
        }
        Ok(())
    }

    pub fn retry(&mut self, entity: EntityKey, kind: FocusKind) -> Result<(), WorkflowError> {
        let request = self.workflow.retry(entity, kind)?;
        self.dispatch(request);
        Ok(())
    }

    /// Start extraction for an uploaded document.
    pub fn upload(&mut self, document: UploadedDocument) -> Result<DocumentKey, WorkflowError> {
        let (key, request) = self.workflow.begin_extraction(document)?;
        self.dispatch(request);
        Ok(key)
    }

    pub fn retry_extraction(&mut self, document: DocumentKey) -> Result<(), WorkflowError> {
        let request = self.workflow.retry_extraction(document)?;
        self.dispatch(request);
        Ok(())
    }

    pub fn edit_draft(
        &mut self,
        document: DocumentKey,
        index: usize,
        edit: DraftEdit,
    ) -> Result<(), WorkflowError> {
        self.workflow.edit_draft(document, index, edit)
    }

    pub fn discard_draft(
        &mut self,
        document: DocumentKey,
        index: usize,
    ) -> Result<ExtractedMedicationDraft, WorkflowError> {
        self.workflow.discard_draft(document, index)
    }

    pub fn confirm_drafts(&mut self, document: DocumentKey) -> Result<usize, WorkflowError> {
        self.workflow.confirm_drafts(document)
    }

    pub fn dismiss_drafts(&mut self, document: DocumentKey) -> Result<(), WorkflowError> {
        self.workflow.dismiss_drafts(document)
    }

    // ── Exports ─────────────────────────────────────────────

    /// Request a server-rendered report of the current analysis.
    pub fn export_report(&mut self) -> Result<(), ExportError> {
        let analysis = self
            .workflow
            .analysis()
            .cloned()
            .ok_or(ExportError::NoAnalysis)?;
        let gateway = Rc::clone(&self.gateway);
        let sink = Rc::clone(&self.sink);
        tracing::info!("Requesting report export");
        self.in_flight.push(
            async move {
                let outcome =
                    export::export_report(gateway.as_ref(), &analysis, sink.as_ref(), Local::now())
                        .await;
                Completion::Export {
                    kind: ExportKind::Report,
                    outcome,
                }
            }
            .boxed_local(),
        );
        Ok(())
    }

    /// Capture the view now and render it to a PDF.
    pub fn export_snapshot(&mut self, target: &dyn CaptureTarget) -> Result<(), ExportError> {
        let image = export::snapshot::capture(target)?;
        let sink = Rc::clone(&self.sink);
        tracing::info!(width = image.width(), height = image.height(), "Snapshot captured");
        self.in_flight.push(
            async move {
                let outcome = export::export_snapshot(&image, sink.as_ref(), Local::now());
                Completion::Export {
                    kind: ExportKind::Snapshot,
                    outcome,
                }
            }
            .boxed_local(),
        );
        Ok(())
    }

    // ── Driving ─────────────────────────────────────────────

    /// Wait for the next operation to finish and apply it.
    ///
    /// `None` when nothing is in flight.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let completion = self.in_flight.next().await?;
        Some(self.apply(completion))
    }

    /// Apply completions until nothing is in flight.
    pub async fn settle_all(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn dispatch(&mut self, request: Request) {
        let gateway = Rc::clone(&self.gateway);
        let future = match request {
            Request::Analyze { ticket, record } => async move {
                let outcome = gateway.analyze_patient(&record).await;
                Completion::Analysis { ticket, outcome }
            }
            .boxed_local(),
            Request::Detail { ticket, call } => async move {
                let outcome = match call {
                    DetailCall::TaperPlan(req) => gateway
                        .generate_taper_plan(&req)
                        .await
                        .map(EntityDetail::TaperPlan),
                    DetailCall::Interactions(req) => gateway
                        .check_interactions(&req)
                        .await
                        .map(EntityDetail::Interactions),
                };
                Completion::Detail { ticket, outcome }
            }
            .boxed_local(),
            Request::Extract { ticket, document } => async move {
                let outcome = gateway.extract_medications(&document).await;
                Completion::Extraction { ticket, outcome }
            }
            .boxed_local(),
        };
        self.in_flight.push(future);
    }

    fn apply(&mut self, completion: Completion) -> SessionEvent {
        match completion {
            Completion::Analysis { ticket, outcome } => {
                let succeeded = outcome.is_ok();
                if !self.workflow.settle_analysis(ticket, outcome) {
                    return SessionEvent::Discarded;
                }
                if !succeeded {
                    let reason = self.workflow.error().unwrap_or_default().to_string();
                    return SessionEvent::AnalysisFailed(reason);
                }
                if let Some(analysis) = self.workflow.analysis() {
                    let counts = view::count_summary(analysis);
                    if counts.disagree() {
                        tracing::warn!(
                            shown = ?counts.shown,
                            reported = ?counts.reported,
                            "Service summary counts disagree with analysed entries; showing partition counts"
                        );
                    }
                }
                SessionEvent::AnalysisReady
            }
            Completion::Detail { ticket, outcome } => {
                let key = ticket.key.clone();
                let failure = outcome.as_ref().err().map(ToString::to_string);
                if !self.workflow.settle_detail(ticket, outcome) {
                    return SessionEvent::Discarded;
                }
                match failure {
                    Some(reason) => SessionEvent::DetailFailed { key, reason },
                    None => SessionEvent::DetailReady(key),
                }
            }
            Completion::Extraction { ticket, outcome } => {
                let document = ticket.key;
                let result = outcome.as_ref().map(Vec::len).map_err(ToString::to_string);
                if !self.workflow.settle_extraction(ticket, outcome) {
                    return SessionEvent::Discarded;
                }
                match result {
                    Ok(count) => SessionEvent::DraftsReady { document, count },
                    Err(reason) => SessionEvent::ExtractionFailed { document, reason },
                }
            }
            Completion::Export { kind, outcome } => {
                match &outcome {
                    Ok(exported) => {
                        tracing::info!(%kind, filename = %exported.filename, "Export finished")
                    }
                    Err(e) => tracing::warn!(%kind, error = %e, "Export failed"),
                }
                SessionEvent::ExportFinished {
                    kind,
                    result: outcome,
                }
            }
        }
    }
}
