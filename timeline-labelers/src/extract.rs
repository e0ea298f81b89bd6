//! Queries over a patient timeline: coded event times and visit intervals.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use timeline_core::{CodeSet, Event, LabelError, Patient};

use crate::concepts;
use crate::ontology::{resolve_codes, Ontology};

/// Start times of every event whose code is in `codes`.
pub fn code_times(patient: &Patient, codes: &CodeSet) -> Vec<NaiveDateTime> {
    patient
        .events()
        .iter()
        .filter(|event| codes.contains(&event.code))
        .map(|event| event.start)
        .collect()
}

/// Which interval events count as visits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitCriteria {
    pub codes: CodeSet,
    /// Only events from this source table, when set.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub min_duration_minutes: Option<i64>,
    /// Skip visits that start and end on the same calendar day.
    #[serde(default)]
    pub exclude_same_day: bool,
}

impl VisitCriteria {
    pub fn new(codes: CodeSet) -> Self {
        Self {
            codes,
            ..Self::default()
        }
    }

    /// Inpatient admissions.
    pub fn inpatient<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let codes = resolve_codes(ontology, &concepts::INPATIENT_ADMISSION, true, false)?;
        Ok(Self::new(codes))
    }

    /// ICU stays, recorded as visit details at ICU care sites.
    pub fn icu<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let codes = resolve_codes(ontology, &concepts::ICU_CARE_SITES, true, true)?;
        Ok(Self::new(codes).with_table(concepts::ICU_TABLE))
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn with_min_duration(mut self, duration: Duration) -> Self {
        self.min_duration_minutes = Some(duration.num_minutes());
        self
    }

    pub fn excluding_same_day(mut self) -> Self {
        self.exclude_same_day = true;
        self
    }

    pub fn min_duration(&self) -> Option<Duration> {
        self.min_duration_minutes.map(Duration::minutes)
    }

    /// Whether `event` is a candidate visit, before any interval checks.
    pub fn matches(&self, event: &Event) -> bool {
        self.codes.contains(&event.code)
            && self
                .table
                .as_deref()
                .map_or(true, |table| event.table.as_deref() == Some(table))
    }
}

/// A care episode taken from an interval event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Position of the source event in `Patient::events`.
    pub event_index: usize,
}

impl Visit {
    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// Visits on the timeline that satisfy `criteria`, in chronological order.
///
/// Events missing an end are skipped with a warning. An event ending before
/// it starts is an error.
pub fn extract_visits(
    patient: &Patient,
    criteria: &VisitCriteria,
) -> Result<Vec<Visit>, LabelError> {
    let min_duration = criteria.min_duration();
    let mut visits = Vec::new();

    for (event_index, event) in patient.events().iter().enumerate() {
        if !criteria.matches(event) {
            continue;
        }

        let Some(end) = event.end else {
            log::warn!(
                "Visit event {} at {} for patient {} has no end, skipping",
                event.code,
                event.start,
                patient.id
            );
            continue;
        };

        if event.start > end {
            return Err(LabelError::InvalidInterval {
                patient_id: patient.id,
                start: event.start,
                end,
            });
        }

        // Point-in-time records carry no length of stay.
        if event.start == end {
            continue;
        }

        let visit = Visit {
            start: event.start,
            end,
            event_index,
        };

        if min_duration.is_some_and(|min| visit.length() < min) {
            log::debug!("Visit at {} for patient {} shorter than minimum", visit.start, patient.id);
            continue;
        }

        if criteria.exclude_same_day && visit.start.date() == visit.end.date() {
            continue;
        }

        visits.push(visit);
    }

    Ok(visits)
}

/// Whether an event not rejected by `skip` starts within `[start, end]`.
pub fn has_event_between<F>(
    patient: &Patient,
    start: NaiveDateTime,
    end: NaiveDateTime,
    skip: F,
) -> bool
where
    F: Fn(usize, &Event) -> bool,
{
    let events = patient.events();
    let first = events.partition_point(|event| event.start < start);
    events[first..]
        .iter()
        .enumerate()
        .take_while(|(_, event)| event.start <= end)
        .any(|(offset, event)| !skip(first + offset, event))
}

/// Where a labeler finds its outcome times.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeSource {
    /// Start of any event with one of these codes.
    Codes(CodeSet),
    /// Start of every visit matching the criteria, e.g. ICU transfers.
    VisitStarts(VisitCriteria),
}

impl OutcomeSource {
    pub fn is_empty(&self) -> bool {
        match self {
            OutcomeSource::Codes(codes) => codes.is_empty(),
            OutcomeSource::VisitStarts(criteria) => criteria.codes.is_empty(),
        }
    }

    pub fn times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        match self {
            OutcomeSource::Codes(codes) => Ok(code_times(patient, codes)),
            OutcomeSource::VisitStarts(criteria) => Ok(extract_visits(patient, criteria)?
                .into_iter()
                .map(|visit| visit.start)
                .collect()),
        }
    }

    /// Whether `event` is itself an outcome record.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            OutcomeSource::Codes(codes) => codes.contains(&event.code),
            OutcomeSource::VisitStarts(criteria) => criteria.matches(event),
        }
    }
}
