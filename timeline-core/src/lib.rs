//! Core value types for turning patient timelines into supervised labels.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Internal identifier of a concept code after ontology lookup.
pub type ConceptId = u64;

/// Ordered set of concept ids; ordered so iteration never depends on hashing.
pub type CodeSet = BTreeSet<ConceptId>;

/// Raw result attached to an event (lab value, flowsheet entry...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EventValue {
    Numeric(f64),
    Text(String),
}

impl EventValue {
    /// Textual form handed to classifiers that accept sentinel strings.
    pub fn as_raw(&self) -> String {
        match self {
            EventValue::Numeric(value) => value.to_string(),
            EventValue::Text(text) => text.clone(),
        }
    }
}

/// One clinical event on a patient timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub start: NaiveDateTime,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    pub code: ConceptId,
    #[serde(default)]
    pub value: Option<EventValue>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Source table tag, e.g. `visit_detail`.
    #[serde(default)]
    pub table: Option<String>,
}

impl Event {
    /// Point event with only a start time and a code.
    pub fn point(start: NaiveDateTime, code: ConceptId) -> Self {
        Self {
            start,
            end: None,
            code,
            value: None,
            unit: None,
            table: None,
        }
    }

    /// Interval event, e.g. an admission or an ICU stay.
    pub fn interval(start: NaiveDateTime, end: NaiveDateTime, code: ConceptId) -> Self {
        Self {
            end: Some(end),
            ..Self::point(start, code)
        }
    }

    pub fn with_value(mut self, value: EventValue, unit: Option<&str>) -> Self {
        self.value = Some(value);
        self.unit = unit.map(str::to_string);
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }
}

/// A patient and their timeline, ordered by `start` (stable on ties).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "PatientRecord")]
pub struct Patient {
    pub id: u64,
    events: Vec<Event>,
    /// Explicit end of follow-up; overrides the last event as censoring time.
    pub end_of_followup: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
struct PatientRecord {
    id: u64,
    events: Vec<Event>,
    #[serde(default)]
    end_of_followup: Option<NaiveDateTime>,
}

impl From<PatientRecord> for Patient {
    fn from(record: PatientRecord) -> Self {
        let mut patient = Patient::new(record.id, record.events);
        patient.end_of_followup = record.end_of_followup;
        patient
    }
}

impl Patient {
    /// Build a patient, restoring chronological order of `events`.
    pub fn new(id: u64, mut events: Vec<Event>) -> Self {
        // `sort_by_key` is stable, so same-instant events keep insertion order.
        events.sort_by_key(|event| event.start);
        Self {
            id,
            events,
            end_of_followup: None,
        }
    }

    pub fn with_end_of_followup(mut self, end: NaiveDateTime) -> Self {
        self.end_of_followup = Some(end);
        self
    }

    /// Events in chronological order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Start of the first recorded event.
    pub fn first_event_time(&self) -> Option<NaiveDateTime> {
        self.events.first().map(|event| event.start)
    }

    /// Censoring time: end of follow-up when supplied, else start of the last event.
    pub fn observation_end(&self) -> Option<NaiveDateTime> {
        self.end_of_followup
            .or_else(|| self.events.last().map(|event| event.start))
    }
}

/// Window `[prediction_time + start, prediction_time + end]`, both bounds inclusive.
///
/// An `end` of `None` means the window never closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeHorizon {
    start: Duration,
    end: Option<Duration>,
}

impl TimeHorizon {
    pub fn new(start: Duration, end: Duration) -> Result<Self, LabelError> {
        if start > end {
            return Err(LabelError::InvalidHorizon { start, end });
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// Window that stays open after `start` ("ever after").
    pub fn unbounded(start: Duration) -> Self {
        Self { start, end: None }
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Option<Duration> {
        self.end
    }

    pub fn is_unbounded(&self) -> bool {
        self.end.is_none()
    }
}

/// Value carried by a label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(untagged)]
pub enum LabelValue {
    Boolean(bool),
    Categorical(u32),
    Numeric(f64),
    /// Censored: the window outlived the observed timeline.
    Unknown,
}

impl LabelValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LabelValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, LabelValue::Unknown)
    }
}

/// A supervised label anchored at a prediction time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Label {
    pub time: NaiveDateTime,
    pub value: LabelValue,
}

impl Label {
    pub fn new(time: NaiveDateTime, value: LabelValue) -> Self {
        Self { time, value }
    }

    pub fn boolean(time: NaiveDateTime, value: bool) -> Self {
        Self::new(time, LabelValue::Boolean(value))
    }
}

/// Kind of values a labeler emits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LabelerType {
    Boolean,
    Categorical,
    Numeric,
}

impl LabelerType {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelerType::Boolean => "boolean",
            LabelerType::Categorical => "categorical",
            LabelerType::Numeric => "numeric",
        }
    }
}

impl fmt::Display for LabelerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to emit when a window extends past the observation boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CensoringPolicy {
    /// Drop the prediction time from the output.
    #[default]
    Discard,
    /// Treat unresolved follow-up as "did not occur".
    Negative,
    /// Keep the prediction time with `LabelValue::Unknown`.
    Unknown,
}

/// Censoring and tie-breaking rules applied by the label assignment engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchPolicy {
    #[serde(default)]
    pub censoring: CensoringPolicy,
    /// Whether an outcome at exactly the prediction time may count.
    #[serde(default = "default_allow_same_time")]
    pub allow_same_time: bool,
}

fn default_allow_same_time() -> bool {
    true
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            censoring: CensoringPolicy::Discard,
            allow_same_time: true,
        }
    }
}

impl MatchPolicy {
    pub fn with_censoring(mut self, censoring: CensoringPolicy) -> Self {
        self.censoring = censoring;
        self
    }

    pub fn with_same_time(mut self, allow_same_time: bool) -> Self {
        self.allow_same_time = allow_same_time;
        self
    }
}

/// Adjustment applied to a visit boundary or prediction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeAdjustment {
    #[default]
    Identity,
    /// Move to 23:59:59 of the same calendar day.
    EndOfDay,
    Offset(Duration),
    Custom(fn(NaiveDateTime) -> NaiveDateTime),
}

impl TimeAdjustment {
    /// Adjusted time. An offset that leaves chrono's range is an error.
    pub fn apply(&self, time: NaiveDateTime) -> Result<NaiveDateTime, LabelError> {
        match self {
            TimeAdjustment::Identity => Ok(time),
            TimeAdjustment::EndOfDay => Ok(end_of_day(time)),
            TimeAdjustment::Offset(offset) => shift(time, *offset),
            TimeAdjustment::Custom(func) => Ok(func(time)),
        }
    }
}

/// `time + offset`, or `TimeOutOfRange` when the result is not representable.
pub fn shift(time: NaiveDateTime, offset: Duration) -> Result<NaiveDateTime, LabelError> {
    time.checked_add_signed(offset)
        .ok_or(LabelError::TimeOutOfRange { time, offset })
}

/// 23:59:59 on the calendar day of `time`.
pub fn end_of_day(time: NaiveDateTime) -> NaiveDateTime {
    time.date().and_hms_opt(23, 59, 59).unwrap_or(time)
}

/// Midnight at the start of the calendar day of `time`.
pub fn start_of_day(time: NaiveDateTime) -> NaiveDateTime {
    time.date().and_hms_opt(0, 0, 0).unwrap_or(time)
}

/// Fatal errors raised while configuring or running a labeler.
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("Concept code {0} not found in ontology")]
    UnknownConcept(String),
    #[error("Time horizon start {start} is after its end {end}")]
    InvalidHorizon { start: Duration, end: Duration },
    #[error("Labeler does not declare any outcome codes")]
    NoOutcomeCodes,
    #[error("Event for patient {patient_id} starts at {start} after its end {end}")]
    InvalidInterval {
        patient_id: u64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("Remaining length of stay for patient {patient_id} went negative at {at}")]
    NegativeLengthOfStay { patient_id: u64, at: NaiveDateTime },
    #[error("Shifting {time} by {offset} leaves the supported time range")]
    TimeOutOfRange { time: NaiveDateTime, offset: Duration },
}
