//! Render-ready projection of a [`Workflow`].
//!
//! Everything here is a pure function of the workflow snapshot: no requests,
//! no logging, no mutation. Borrowed views are cheap to rebuild on every
//! state change.

pub mod counter;

pub use counter::{CounterBoard, CounterTween};

use crate::fetch::FetchState;
use crate::models::{
    AnalysisResult, CategoryCounts, DetailKey, DocumentKey, EntityKey, ExtractedMedicationDraft,
    FocusKind, HerbDrugInteraction, InteractionDetail, InteractionReport, MedicationAnalysis,
    RiskCategory, TaperPlan, TaperStep, UploadedDocument,
};
use crate::workflow::{EntityDetail, Focus, Phase, Workflow};

/// One analysed entry with its entity key.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketEntry<'a> {
    pub key: EntityKey,
    pub analysis: &'a MedicationAnalysis,
}

/// Entries of one risk category, in analysis order.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<'a> {
    pub category: RiskCategory,
    pub entries: Vec<BucketEntry<'a>>,
}

/// Category counts. `shown` is derived from the partition and is what the
/// view displays; `reported` is the service's own summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountSummary {
    pub shown: CategoryCounts,
    pub reported: CategoryCounts,
}

impl CountSummary {
    pub fn disagree(&self) -> bool {
        self.shown != self.reported
    }
}

/// Body of the focused detail panel.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailView<'a> {
    Loading,
    Failed(&'a str),
    Taper {
        plan: &'a TaperPlan,
        /// Ascending by week; ties keep server order.
        steps: Vec<&'a TaperStep>,
    },
    Interactions {
        report: &'a InteractionReport,
        /// Most severe first; ties keep server order.
        interactions: Vec<&'a InteractionDetail>,
    },
    Monitoring {
        entry: &'a MedicationAnalysis,
        items: &'a [String],
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FocusedView<'a> {
    pub focus: &'a Focus,
    pub detail: DetailView<'a>,
}

/// One uploaded document and the state of its extraction.
#[derive(Debug, Clone)]
pub struct ExtractionView<'a> {
    pub key: DocumentKey,
    pub document: &'a UploadedDocument,
    pub state: Option<&'a FetchState<Vec<ExtractedMedicationDraft>>>,
    /// Reviewer's working copy, once extraction succeeded.
    pub drafts: Option<&'a [ExtractedMedicationDraft]>,
}

#[derive(Debug, Clone)]
pub struct View<'a> {
    pub phase: Phase,
    pub error: Option<&'a str>,
    /// RED, YELLOW, GREEN. Empty when nothing is analysed.
    pub buckets: Vec<Bucket<'a>>,
    pub counts: CountSummary,
    pub interactions: Vec<&'a HerbDrugInteraction>,
    pub focused: Option<FocusedView<'a>>,
    pub extractions: Vec<ExtractionView<'a>>,
}

impl View<'_> {
    pub fn bucket(&self, category: RiskCategory) -> &[BucketEntry<'_>] {
        self.buckets
            .iter()
            .find(|b| b.category == category)
            .map(|b| b.entries.as_slice())
            .unwrap_or_default()
    }
}

/// Project the current workflow state.
pub fn project(workflow: &Workflow) -> View<'_> {
    let analysis = workflow.analysis().map(|a| a.as_ref());
    let buckets = analysis.map(partition).unwrap_or_default();
    let counts = CountSummary {
        shown: counts_of(&buckets),
        reported: analysis.map(|a| a.priority_summary).unwrap_or_default(),
    };

    let mut extractions: Vec<ExtractionView<'_>> = workflow
        .documents()
        .map(|(key, document)| ExtractionView {
            key: *key,
            document,
            state: workflow.extraction(key),
            drafts: workflow.review(key),
        })
        .collect();
    extractions.sort_by(|a, b| {
        a.document
            .filename
            .cmp(&b.document.filename)
            .then(a.key.cmp(&b.key))
    });

    View {
        phase: workflow.phase(),
        error: workflow.error(),
        buckets,
        counts,
        interactions: analysis.map(sorted_interactions).unwrap_or_default(),
        focused: focused_view(workflow, analysis),
        extractions,
    }
}

/// Split analysis entries into RED, YELLOW, GREEN buckets.
///
/// Every entry lands in exactly one bucket and each bucket keeps the
/// original relative order.
pub fn partition(analysis: &AnalysisResult) -> Vec<Bucket<'_>> {
    let mut buckets: Vec<Bucket<'_>> = RiskCategory::ALL
        .iter()
        .map(|&category| Bucket {
            category,
            entries: Vec::new(),
        })
        .collect();
    for (position, entry) in analysis.medication_analyses.iter().enumerate() {
        if let Some(bucket) = buckets.iter_mut().find(|b| b.category == entry.risk_category) {
            bucket.entries.push(BucketEntry {
                key: EntityKey::new(&entry.name, position),
                analysis: entry,
            });
        }
    }
    buckets
}

/// Partition-derived counts next to the service's own summary.
pub fn count_summary(analysis: &AnalysisResult) -> CountSummary {
    CountSummary {
        shown: counts_of(&partition(analysis)),
        reported: analysis.priority_summary,
    }
}

fn counts_of(buckets: &[Bucket<'_>]) -> CategoryCounts {
    let count = |category: RiskCategory| {
        buckets
            .iter()
            .find(|b| b.category == category)
            .map_or(0, |b| b.entries.len() as u32)
    };
    CategoryCounts {
        red: count(RiskCategory::Red),
        yellow: count(RiskCategory::Yellow),
        green: count(RiskCategory::Green),
    }
}

/// Herb–drug interactions, Major first. Stable.
pub fn sorted_interactions(analysis: &AnalysisResult) -> Vec<&HerbDrugInteraction> {
    let mut sorted: Vec<_> = analysis.herb_drug_interactions.iter().collect();
    sorted.sort_by_key(|i| i.severity.rank());
    sorted
}

fn focused_view<'a>(
    workflow: &'a Workflow,
    analysis: Option<&'a AnalysisResult>,
) -> Option<FocusedView<'a>> {
    let focus = workflow.focused()?;
    let detail = match focus.kind {
        FocusKind::MonitoringDetail => {
            let entry = analysis?.entry(&focus.entity)?;
            DetailView::Monitoring {
                entry,
                items: &entry.monitoring_required,
            }
        }
        kind => {
            let key = DetailKey::new(kind, focus.entity.clone());
            match workflow.detail(&key)? {
                FetchState::Idle | FetchState::Loading => DetailView::Loading,
                FetchState::Failed(reason) => DetailView::Failed(reason),
                FetchState::Success(EntityDetail::TaperPlan(plan)) => {
                    let mut steps: Vec<_> = plan.steps.iter().collect();
                    steps.sort_by_key(|s| s.week);
                    DetailView::Taper { plan, steps }
                }
                FetchState::Success(EntityDetail::Interactions(report)) => {
                    let mut interactions: Vec<_> = report.interactions.iter().collect();
                    interactions.sort_by_key(|i| i.severity.rank());
                    DetailView::Interactions {
                        report,
                        interactions,
                    }
                }
            }
        }
    };
    Some(FocusedView { focus, detail })
}
