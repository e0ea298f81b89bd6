//! Hourly ICU tasks: decompensation and remaining length of stay.
//!
//! Both predict every hour of an ICU stay, starting four hours after
//! admission and stopping at discharge or death, whichever comes first.
//! Stays shorter than four hours, or with no recorded events besides ICU
//! stay records, are skipped.

use chrono::{Duration, NaiveDateTime};
use timeline_core::{
    shift, CensoringPolicy, CodeSet, Label, LabelError, LabelValue, LabelerType, MatchPolicy,
    Patient, TimeHorizon,
};

use crate::concepts;
use crate::extract::{code_times, extract_visits, has_event_between, VisitCriteria};
use crate::ontology::{resolve_codes, Ontology};
use crate::{finalize_labels, label_with_horizon, HorizonLabeler, Labeler};

const FIRST_PREDICTION_HOURS: i64 = 4;

/// ICU stays and death codes shared by the hourly tasks.
#[derive(Debug, Clone)]
struct HourlyGrid {
    stays: VisitCriteria,
    deaths: CodeSet,
}

impl HourlyGrid {
    fn new(stays: VisitCriteria, deaths: CodeSet) -> Result<Self, LabelError> {
        if deaths.is_empty() {
            return Err(LabelError::NoOutcomeCodes);
        }
        let first_prediction = Duration::hours(FIRST_PREDICTION_HOURS);
        // A stricter minimum from the caller wins.
        let stays = match stays.min_duration() {
            Some(min) if min >= first_prediction => stays,
            _ => stays.with_min_duration(first_prediction),
        };
        Ok(Self { stays, deaths })
    }

    fn from_ontology<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let deaths = resolve_codes(ontology, &concepts::DEATH, true, false)?;
        Self::new(VisitCriteria::icu(ontology)?, deaths)
    }

    fn death_times(&self, patient: &Patient) -> Vec<NaiveDateTime> {
        code_times(patient, &self.deaths)
    }

    /// `(prediction_time, end_of_stay)` for every hour of every usable stay.
    fn points(
        &self,
        patient: &Patient,
    ) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, LabelError> {
        let first_death = self.death_times(patient).into_iter().min();
        let mut points = Vec::new();

        for stay in extract_visits(patient, &self.stays)? {
            if !has_event_between(patient, stay.start, stay.end, |_, event| {
                self.stays.matches(event)
            }) {
                log::debug!("ICU stay at {} for patient {} has no events", stay.start, patient.id);
                continue;
            }

            let end_of_stay = first_death.map_or(stay.end, |death| death.min(stay.end));
            let mut time = shift(stay.start, Duration::hours(FIRST_PREDICTION_HOURS))?;
            while time < end_of_stay {
                points.push((time, end_of_stay));
                time = shift(time, Duration::hours(1))?;
            }
        }
        Ok(points)
    }
}

/// Hourly prediction of death within the next 24 hours.
///
/// Predictions whose window outlives the record count as survived.
#[derive(Debug, Clone)]
pub struct DecompensationLabeler {
    grid: HourlyGrid,
    horizon: TimeHorizon,
}

impl DecompensationLabeler {
    pub fn new(stays: VisitCriteria, deaths: CodeSet) -> Result<Self, LabelError> {
        Self::with_grid(HourlyGrid::new(stays, deaths)?)
    }

    pub fn from_ontology<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        Self::with_grid(HourlyGrid::from_ontology(ontology)?)
    }

    fn with_grid(grid: HourlyGrid) -> Result<Self, LabelError> {
        Ok(Self {
            grid,
            horizon: TimeHorizon::new(Duration::zero(), Duration::hours(24))?,
        })
    }
}

impl HorizonLabeler for DecompensationLabeler {
    fn prediction_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        Ok(self.grid.points(patient)?.into_iter().map(|(time, _)| time).collect())
    }

    fn outcome_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        Ok(self.grid.death_times(patient))
    }

    fn time_horizon(&self) -> TimeHorizon {
        self.horizon
    }

    fn match_policy(&self) -> MatchPolicy {
        MatchPolicy::default().with_censoring(CensoringPolicy::Negative)
    }
}

impl Labeler for DecompensationLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        label_with_horizon(self, patient)
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Boolean
    }
}

/// Hourly regression on the hours left until discharge or death.
#[derive(Debug, Clone)]
pub struct LengthOfStayLabeler {
    grid: HourlyGrid,
}

impl LengthOfStayLabeler {
    pub fn new(stays: VisitCriteria, deaths: CodeSet) -> Result<Self, LabelError> {
        Ok(Self {
            grid: HourlyGrid::new(stays, deaths)?,
        })
    }

    pub fn from_ontology<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        Ok(Self {
            grid: HourlyGrid::from_ontology(ontology)?,
        })
    }
}

impl Labeler for LengthOfStayLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        let mut labels = Vec::new();
        for (time, end_of_stay) in self.grid.points(patient)? {
            let remaining = end_of_stay - time;
            if remaining < Duration::zero() {
                return Err(LabelError::NegativeLengthOfStay {
                    patient_id: patient.id,
                    at: time,
                });
            }
            let hours = remaining.num_seconds() as f64 / 3600.0;
            labels.push(Label::new(time, LabelValue::Numeric(hours)));
        }
        Ok(finalize_labels(labels))
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Numeric
    }
}
