//! Inpatient admission tasks: readmission and long length of stay.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};
use timeline_core::{
    start_of_day, Label, LabelError, LabelerType, Patient, TimeAdjustment, TimeHorizon,
};

use crate::extract::{extract_visits, VisitCriteria};
use crate::ontology::Ontology;
use crate::{finalize_labels, label_with_horizon, HorizonLabeler, Labeler};

/// Predicts, at discharge, whether the patient is admitted again within the
/// horizon. Defaults to 30-day readmission predicted at the end of the
/// discharge day.
#[derive(Debug, Clone)]
pub struct ReadmissionLabeler {
    admissions: VisitCriteria,
    horizon: TimeHorizon,
    adjust: TimeAdjustment,
}

impl ReadmissionLabeler {
    pub fn new(admissions: VisitCriteria) -> Result<Self, LabelError> {
        if admissions.codes.is_empty() {
            return Err(LabelError::NoOutcomeCodes);
        }
        Ok(Self {
            admissions,
            horizon: TimeHorizon::new(Duration::minutes(1), Duration::days(30))?,
            adjust: TimeAdjustment::EndOfDay,
        })
    }

    pub fn inpatient<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        Self::new(VisitCriteria::inpatient(ontology)?)
    }

    pub fn with_horizon(mut self, horizon: TimeHorizon) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_adjust(mut self, adjust: TimeAdjustment) -> Self {
        self.adjust = adjust;
        self
    }
}

impl HorizonLabeler for ReadmissionLabeler {
    fn prediction_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        let mut times = Vec::new();
        let mut admission_days = BTreeSet::new();
        for visit in extract_visits(patient, &self.admissions)? {
            let prediction = self.adjust.apply(visit.end)?;
            // A discharge on a day that already saw an admission leaks the readmission.
            if admission_days.contains(&start_of_day(prediction)) {
                log::debug!(
                    "Discharge at {} for patient {} skipped, same-day admission",
                    visit.end,
                    patient.id
                );
                continue;
            }
            times.push(prediction);
            admission_days.insert(start_of_day(visit.start));
        }
        Ok(times)
    }

    fn outcome_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        Ok(extract_visits(patient, &self.admissions)?
            .into_iter()
            .map(|visit| visit.start)
            .collect())
    }

    fn time_horizon(&self) -> TimeHorizon {
        self.horizon
    }
}

impl Labeler for ReadmissionLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        label_with_horizon(self, patient)
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Boolean
    }
}

/// One label per admission: whether it lasted at least `long_time`.
#[derive(Debug, Clone)]
pub struct LongAdmissionLabeler {
    admissions: VisitCriteria,
    long_time: Duration,
    adjust: TimeAdjustment,
}

impl LongAdmissionLabeler {
    pub fn new(admissions: VisitCriteria) -> Self {
        Self {
            admissions,
            long_time: Duration::days(7),
            adjust: TimeAdjustment::Identity,
        }
    }

    pub fn inpatient<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        Ok(Self::new(VisitCriteria::inpatient(ontology)?))
    }

    /// Seven-day stays predicted at the end of the admission day, ignoring
    /// same-day discharges.
    pub fn end_of_admission_day<O: Ontology + ?Sized>(ontology: &O) -> Result<Self, LabelError> {
        let admissions = VisitCriteria::inpatient(ontology)?.excluding_same_day();
        Ok(Self::new(admissions).with_adjust(TimeAdjustment::EndOfDay))
    }

    pub fn with_long_time(mut self, long_time: Duration) -> Self {
        self.long_time = long_time;
        self
    }

    pub fn with_adjust(mut self, adjust: TimeAdjustment) -> Self {
        self.adjust = adjust;
        self
    }
}

impl Labeler for LongAdmissionLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        let labels = extract_visits(patient, &self.admissions)?
            .into_iter()
            .map(|visit| -> Result<Label, LabelError> {
                let time = self.adjust.apply(visit.start)?;
                Ok(Label::boolean(time, visit.length() >= self.long_time))
            })
            .collect::<Result<Vec<_>, LabelError>>()?;
        Ok(finalize_labels(labels))
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Boolean
    }
}
