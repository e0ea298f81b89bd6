//! Labelers that turn patient timelines into supervised prediction labels.
//!
//! Every labeler is a pure function of one [`Patient`] plus configuration
//! resolved at construction, so a driver may label patients on any number of
//! workers with a shared `&AnyLabeler`.

use chrono::NaiveDateTime;
use timeline_core::{Label, LabelError, LabelerType, MatchPolicy, Patient, TimeHorizon};

pub mod admission;
pub mod code;
pub mod concepts;
pub mod engine;
pub mod extract;
pub mod icu;
pub mod lab;
pub mod ontology;
pub mod severity;
pub mod visit;

pub use admission::{LongAdmissionLabeler, ReadmissionLabeler};
pub use code::{CodeLabeler, PredictionTimes};
pub use concepts::{CodedCondition, FirstDiagnosis};
pub use engine::{assign_labels, OutcomeCursor, WindowOutcome};
pub use extract::{extract_visits, has_event_between, OutcomeSource, Visit, VisitCriteria};
pub use icu::{DecompensationLabeler, LengthOfStayLabeler};
pub use lab::{InstantLabLabeler, LabOutcomeLabeler};
pub use ontology::{resolve_codes, Ontology, StaticOntology};
pub use severity::{LabTest, Severity, SeverityError};
pub use visit::VisitLabeler;

/// Produces labels for one patient at a time.
pub trait Labeler {
    /// Labels in strictly ascending time order.
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError>;

    fn labeler_type(&self) -> LabelerType;
}

/// A labeler described by prediction times, outcome times and a fixed horizon.
///
/// Implementors usually forward [`Labeler::label`] to [`label_with_horizon`].
pub trait HorizonLabeler {
    fn prediction_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError>;

    fn outcome_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError>;

    fn time_horizon(&self) -> TimeHorizon;

    fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::default()
    }
}

/// Run the label assignment engine for `labeler` on `patient`.
///
/// The observation boundary is the patient's end of follow-up, or the start
/// of their last event.
pub fn label_with_horizon<L>(labeler: &L, patient: &Patient) -> Result<Vec<Label>, LabelError>
where
    L: HorizonLabeler + ?Sized,
{
    let Some(boundary) = patient.observation_end() else {
        return Ok(Vec::new());
    };

    let predictions = labeler.prediction_times(patient)?;
    let outcomes = labeler.outcome_times(patient)?;
    log::debug!(
        "Patient {}: {} prediction times, {} outcome times",
        patient.id,
        predictions.len(),
        outcomes.len()
    );

    let labels = engine::assign_labels(
        predictions,
        outcomes,
        &labeler.time_horizon(),
        boundary,
        &labeler.match_policy(),
    );
    log::debug!("Patient {}: {} labels", patient.id, labels.len());
    Ok(labels)
}

/// Order labels by time and keep the first label at each instant.
pub(crate) fn finalize_labels(mut labels: Vec<Label>) -> Vec<Label> {
    // Stable, so the first decision at an instant survives dedup.
    labels.sort_by_key(|label| label.time);
    labels.dedup_by_key(|label| label.time);
    labels
}

/// Every built-in labeler, chosen at construction.
#[derive(Debug, Clone)]
pub enum AnyLabeler {
    Code(CodeLabeler),
    Visit(VisitLabeler),
    Readmission(ReadmissionLabeler),
    LongAdmission(LongAdmissionLabeler),
    Decompensation(DecompensationLabeler),
    LengthOfStay(LengthOfStayLabeler),
    InstantLab(InstantLabLabeler),
    LabOutcome(LabOutcomeLabeler),
}

impl AnyLabeler {
    fn inner(&self) -> &dyn Labeler {
        match self {
            AnyLabeler::Code(labeler) => labeler,
            AnyLabeler::Visit(labeler) => labeler,
            AnyLabeler::Readmission(labeler) => labeler,
            AnyLabeler::LongAdmission(labeler) => labeler,
            AnyLabeler::Decompensation(labeler) => labeler,
            AnyLabeler::LengthOfStay(labeler) => labeler,
            AnyLabeler::InstantLab(labeler) => labeler,
            AnyLabeler::LabOutcome(labeler) => labeler,
        }
    }
}

impl Labeler for AnyLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        self.inner().label(patient)
    }

    fn labeler_type(&self) -> LabelerType {
        self.inner().labeler_type()
    }
}

macro_rules! impl_from_labeler {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AnyLabeler {
                fn from(labeler: $ty) -> Self {
                    AnyLabeler::$variant(labeler)
                }
            }
        )*
    };
}

impl_from_labeler! {
    Code => CodeLabeler,
    Visit => VisitLabeler,
    Readmission => ReadmissionLabeler,
    LongAdmission => LongAdmissionLabeler,
    Decompensation => DecompensationLabeler,
    LengthOfStay => LengthOfStayLabeler,
    InstantLab => InstantLabLabeler,
    LabOutcome => LabOutcomeLabeler,
}
