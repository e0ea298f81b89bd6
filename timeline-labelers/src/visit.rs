//! Per-visit labeling: each visit supplies its own prediction window.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};
use timeline_core::{
    start_of_day, CensoringPolicy, Event, Label, LabelError, LabelerType, MatchPolicy, Patient,
    TimeAdjustment,
};

use crate::concepts;
use crate::engine::{normalize_times, OutcomeCursor, WindowOutcome};
use crate::extract::{extract_visits, has_event_between, OutcomeSource, VisitCriteria};
use crate::ontology::{resolve_codes, Ontology};
use crate::{finalize_labels, Labeler};

/// Predicts whether an outcome happens during a visit.
///
/// The window for a visit is `[start_adjust(start), end_adjust(end)]` and the
/// prediction is made at the window start. Visits whose window is empty, or
/// that have no other recorded event between admission and the window start,
/// produce no label.
#[derive(Debug, Clone)]
pub struct VisitLabeler {
    visits: VisitCriteria,
    outcomes: OutcomeSource,
    start_adjust: TimeAdjustment,
    end_adjust: TimeAdjustment,
    policy: MatchPolicy,
    require_context: bool,
    exclude_outcome_admission_day: bool,
}

impl VisitLabeler {
    pub fn new(visits: VisitCriteria, outcomes: OutcomeSource) -> Result<Self, LabelError> {
        if outcomes.is_empty() {
            return Err(LabelError::NoOutcomeCodes);
        }
        Ok(Self {
            visits,
            outcomes,
            start_adjust: TimeAdjustment::Identity,
            end_adjust: TimeAdjustment::Identity,
            policy: MatchPolicy::default(),
            require_context: true,
            exclude_outcome_admission_day: false,
        })
    }

    /// Death during an inpatient admission, predicted at the end of the
    /// admission day.
    pub fn inpatient_mortality<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let deaths = resolve_codes(ontology, &concepts::DEATH, true, false)?;
        Ok(Self::new(VisitCriteria::inpatient(ontology)?, OutcomeSource::Codes(deaths))?
            .with_start_adjust(TimeAdjustment::EndOfDay))
    }

    /// Death during an ICU stay of at least 48 hours, predicted 48 hours in.
    /// Stays still open at the end of follow-up count as survived.
    pub fn icu_mortality<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let deaths = resolve_codes(ontology, &concepts::DEATH, true, false)?;
        let stays = VisitCriteria::icu(ontology)?.with_min_duration(Duration::hours(48));
        Ok(Self::new(stays, OutcomeSource::Codes(deaths))?
            .with_start_adjust(TimeAdjustment::Offset(Duration::hours(48)))
            .with_policy(MatchPolicy::default().with_censoring(CensoringPolicy::Negative)))
    }

    /// Transfer to the ICU during an inpatient admission, predicted at the end
    /// of the admission day. Same-day discharges and admissions with an ICU
    /// transfer on the admission day are excluded.
    pub fn icu_admission<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let admissions = VisitCriteria::inpatient(ontology)?.excluding_same_day();
        let transfers = OutcomeSource::VisitStarts(VisitCriteria::icu(ontology)?);
        Ok(Self::new(admissions, transfers)?
            .with_start_adjust(TimeAdjustment::EndOfDay)
            .excluding_outcome_on_admission_day())
    }

    pub fn with_start_adjust(mut self, adjust: TimeAdjustment) -> Self {
        self.start_adjust = adjust;
        self
    }

    pub fn with_end_adjust(mut self, adjust: TimeAdjustment) -> Self {
        self.end_adjust = adjust;
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Label visits even when nothing was recorded before the window opens.
    pub fn without_context_check(mut self) -> Self {
        self.require_context = false;
        self
    }

    /// Drop visits whose admission day already has an outcome on it.
    pub fn excluding_outcome_on_admission_day(mut self) -> Self {
        self.exclude_outcome_admission_day = true;
        self
    }

    fn is_context_event(&self, event: &Event) -> bool {
        !self.visits.matches(event) && !self.outcomes.matches(event)
    }
}

impl Labeler for VisitLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        let Some(boundary) = patient.observation_end() else {
            return Ok(Vec::new());
        };

        let outcomes = normalize_times(self.outcomes.times(patient)?);
        let outcome_days: BTreeSet<NaiveDateTime> = if self.exclude_outcome_admission_day {
            outcomes.iter().map(|time| start_of_day(*time)).collect()
        } else {
            BTreeSet::new()
        };

        let mut windows = Vec::new();
        for visit in extract_visits(patient, &self.visits)? {
            if outcome_days.contains(&start_of_day(visit.start)) {
                log::debug!(
                    "Visit at {} for patient {} has an outcome on admission day",
                    visit.start,
                    patient.id
                );
                continue;
            }

            let lo = self.start_adjust.apply(visit.start)?;
            let hi = self.end_adjust.apply(visit.end)?;
            if lo > hi {
                log::debug!(
                    "Visit at {} for patient {} ends before its window opens",
                    visit.start,
                    patient.id
                );
                continue;
            }

            if self.require_context
                && !has_event_between(patient, visit.start, lo, |_, event| {
                    !self.is_context_event(event)
                })
            {
                log::debug!(
                    "Visit at {} for patient {} has no events before {lo}",
                    visit.start,
                    patient.id
                );
                continue;
            }

            windows.push((lo, hi));
        }

        // The cursor needs non-decreasing window starts.
        windows.sort_by_key(|(lo, _)| *lo);

        let mut cursor = OutcomeCursor::new(&outcomes);
        let mut labels = Vec::with_capacity(windows.len());
        // Each window opens at its own prediction time.
        let skip_same_time = !self.policy.allow_same_time;
        for (lo, hi) in windows {
            let decision = cursor.decide(lo, Some(lo), Some(hi), boundary, skip_same_time);
            if decision == WindowOutcome::Censored {
                log::trace!("Visit window [{lo}, {hi}] censored by boundary {boundary}");
            }
            if let Some(label) = decision.to_label(lo, self.policy.censoring) {
                labels.push(label);
            }
        }

        log::debug!("Patient {}: {} visit labels", patient.id, labels.len());
        Ok(finalize_labels(labels))
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Boolean
    }
}
