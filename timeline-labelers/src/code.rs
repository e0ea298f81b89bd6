//! Fixed-horizon labeling on coded events.

use chrono::{Duration, NaiveDateTime};
use timeline_core::{
    CodeSet, Label, LabelError, LabelerType, MatchPolicy, Patient, TimeAdjustment, TimeHorizon,
};

use crate::concepts::{CodedCondition, FirstDiagnosis};
use crate::extract::{code_times, extract_visits, VisitCriteria};
use crate::ontology::{resolve_codes, Ontology};
use crate::{label_with_horizon, HorizonLabeler, Labeler};

/// Where a [`CodeLabeler`] places its prediction times.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionTimes {
    /// At every event on the timeline.
    EveryEvent,
    /// At events carrying one of these codes.
    Codes(CodeSet),
    /// At the (adjusted) end of every matching visit.
    Discharges {
        admissions: VisitCriteria,
        adjust: TimeAdjustment,
    },
}

/// Predicts whether any outcome code occurs within a fixed horizon.
#[derive(Debug, Clone)]
pub struct CodeLabeler {
    outcome_codes: CodeSet,
    predictions: PredictionTimes,
    horizon: TimeHorizon,
    policy: MatchPolicy,
    first_occurrence_only: bool,
}

impl CodeLabeler {
    pub fn new(outcome_codes: CodeSet, horizon: TimeHorizon) -> Result<Self, LabelError> {
        if outcome_codes.is_empty() {
            return Err(LabelError::NoOutcomeCodes);
        }
        Ok(Self {
            outcome_codes,
            predictions: PredictionTimes::EveryEvent,
            horizon,
            policy: MatchPolicy::default(),
            first_occurrence_only: false,
        })
    }

    /// Outcomes are the given concept codes and all of their descendants.
    pub fn from_concepts<O: Ontology + ?Sized>(
        ontology: &O,
        concept_codes: &[&str],
        horizon: TimeHorizon,
    ) -> Result<Self, LabelError> {
        Self::new(resolve_codes(ontology, concept_codes, true, false)?, horizon)
    }

    pub fn coded_condition<O: Ontology + ?Sized>(
        ontology: &O,
        condition: CodedCondition,
        horizon: TimeHorizon,
    ) -> Result<Self, LabelError> {
        Self::from_concepts(ontology, condition.seed_codes(), horizon)
    }

    /// First diagnosis of `diagnosis` within (1 minute, 365 days) of an
    /// inpatient discharge, predicted at 23:59:59 on the discharge day.
    pub fn first_diagnosis<O: Ontology + ?Sized>(
        ontology: &O,
        diagnosis: FirstDiagnosis,
    ) -> Result<Self, LabelError> {
        let horizon = TimeHorizon::new(Duration::minutes(1), Duration::days(365))?;
        let admissions = VisitCriteria::inpatient(ontology)?;
        Ok(Self::from_concepts(ontology, &[diagnosis.root_code()], horizon)?
            .with_predictions(PredictionTimes::Discharges {
                admissions,
                adjust: TimeAdjustment::EndOfDay,
            })
            .with_policy(MatchPolicy::default().with_same_time(false))
            .first_occurrence_only())
    }

    pub fn with_prediction_codes(self, codes: CodeSet) -> Self {
        self.with_predictions(PredictionTimes::Codes(codes))
    }

    pub fn with_predictions(mut self, predictions: PredictionTimes) -> Self {
        self.predictions = predictions;
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drop prediction times at or after the first outcome.
    pub fn first_occurrence_only(mut self) -> Self {
        self.first_occurrence_only = true;
        self
    }

    pub fn outcome_codes(&self) -> &CodeSet {
        &self.outcome_codes
    }
}

impl HorizonLabeler for CodeLabeler {
    fn prediction_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        let mut times: Vec<NaiveDateTime> = match &self.predictions {
            PredictionTimes::EveryEvent => {
                patient.events().iter().map(|event| event.start).collect()
            }
            PredictionTimes::Codes(codes) => code_times(patient, codes),
            PredictionTimes::Discharges { admissions, adjust } => {
                extract_visits(patient, admissions)?
                    .into_iter()
                    .map(|visit| adjust.apply(visit.end))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        if self.first_occurrence_only {
            if let Some(first) = self.outcome_times(patient)?.into_iter().min() {
                times.retain(|time| *time < first);
            }
        }
        Ok(times)
    }

    fn outcome_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        Ok(code_times(patient, &self.outcome_codes))
    }

    fn time_horizon(&self) -> TimeHorizon {
        self.horizon
    }

    fn match_policy(&self) -> MatchPolicy {
        self.policy
    }
}

impl Labeler for CodeLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        label_with_horizon(self, patient)
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Boolean
    }
}
