//! In-memory gateway with scripted replies.
//!
//! Every call is recorded. A call either resolves immediately from a canned
//! reply registered for its operation, or stays pending until the caller
//! releases it with [`ScriptedGateway::respond`], in any order. Used to drive
//! the workflow through races without a network.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{Gateway, GatewayError};
use crate::models::{
    AnalysisResult, ExtractedMedicationDraft, InteractionCheckRequest, InteractionReport,
    PatientRecord, TaperPlan, TaperPlanRequest, UploadedDocument,
};

/// Which remote contract a call exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Analyze,
    TaperPlan,
    Interactions,
    Extract,
    RenderReport,
}

/// A scripted outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Bytes(Vec<u8>),
    Fail(GatewayError),
}

impl Reply {
    /// Successful JSON reply from any serializable value.
    pub fn ok<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::Json(v),
            Err(e) => Self::Fail(GatewayError::Decode(e.to_string())),
        }
    }

    pub fn status(status: u16, detail: &str) -> Self {
        Self::Fail(GatewayError::Status {
            status,
            detail: detail.to_string(),
        })
    }
}

/// One recorded call: the operation and its request body as JSON.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: Operation,
    pub body: Value,
}

#[derive(Default)]
struct ScriptState {
    calls: Vec<RecordedCall>,
    /// Parallel to `calls`; `None` once answered or when served from `canned`.
    pending: Vec<Option<oneshot::Sender<Reply>>>,
    canned: HashMap<Operation, Reply>,
}

/// Scripted [`Gateway`] for tests and offline demos.
#[derive(Default)]
pub struct ScriptedGateway {
    state: RefCell<ScriptState>,
}

impl ScriptedGateway {
    /// Every call stays pending until released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call of `operation` immediately with `reply`.
    pub fn with(self, operation: Operation, reply: Reply) -> Self {
        self.set_reply(operation, reply);
        self
    }

    pub fn set_reply(&self, operation: Operation, reply: Reply) {
        self.state.borrow_mut().canned.insert(operation, reply);
    }

    pub fn clear_reply(&self, operation: Operation) {
        self.state.borrow_mut().canned.remove(&operation);
    }

    /// All calls so far, in issue order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Index of the most recent call of `operation`.
    pub fn last_call(&self, operation: Operation) -> Option<usize> {
        self.state
            .borrow()
            .calls
            .iter()
            .rposition(|c| c.operation == operation)
    }

    /// Release pending call `index` with `reply`.
    ///
    /// Returns false if the call does not exist, was already answered, or its
    /// caller has gone away.
    pub fn respond(&self, index: usize, reply: Reply) -> bool {
        let sender = self
            .state
            .borrow_mut()
            .pending
            .get_mut(index)
            .and_then(Option::take);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.state
            .borrow()
            .pending
            .iter()
            .filter(|p| p.is_some())
            .count()
    }

    async fn call<B: Serialize + ?Sized>(&self, operation: Operation, body: &B) -> Reply {
        let body = serde_json::to_value(body).unwrap_or(Value::Null);
        let receiver = {
            let mut state = self.state.borrow_mut();
            state.calls.push(RecordedCall { operation, body });
            if let Some(reply) = state.canned.get(&operation).cloned() {
                state.pending.push(None);
                return reply;
            }
            let (tx, rx) = oneshot::channel();
            state.pending.push(Some(tx));
            rx
        };
        receiver.await.unwrap_or_else(|_| {
            Reply::Fail(GatewayError::Connection("scripted gateway".to_string()))
        })
    }

    async fn call_json<B, T>(&self, operation: Operation, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match self.call(operation, body).await {
            Reply::Json(value) => {
                serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
            }
            Reply::Bytes(_) => Err(GatewayError::Decode("expected JSON, got bytes".to_string())),
            Reply::Fail(e) => Err(e),
        }
    }
}

impl Gateway for ScriptedGateway {
    async fn analyze_patient(&self, record: &PatientRecord) -> Result<AnalysisResult, GatewayError> {
        self.call_json(Operation::Analyze, record).await
    }

    async fn generate_taper_plan(
        &self,
        request: &TaperPlanRequest,
    ) -> Result<TaperPlan, GatewayError> {
        self.call_json(Operation::TaperPlan, request).await
    }

    async fn check_interactions(
        &self,
        request: &InteractionCheckRequest,
    ) -> Result<InteractionReport, GatewayError> {
        self.call_json(Operation::Interactions, request).await
    }

    async fn extract_medications(
        &self,
        document: &UploadedDocument,
    ) -> Result<Vec<ExtractedMedicationDraft>, GatewayError> {
        let body = serde_json::json!({
            "kind": document.kind,
            "filename": document.filename,
            "size": document.bytes.len(),
        });
        self.call_json(Operation::Extract, &body).await
    }

    async fn render_report(&self, analysis: &AnalysisResult) -> Result<Vec<u8>, GatewayError> {
        match self.call(Operation::RenderReport, analysis).await {
            Reply::Bytes(bytes) => Ok(bytes),
            Reply::Json(_) => Err(GatewayError::Decode("expected bytes, got JSON".to_string())),
            Reply::Fail(e) => Err(e),
        }
    }
}
