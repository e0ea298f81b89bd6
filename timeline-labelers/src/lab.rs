//! Labelers driven by lab result values.

use chrono::{Duration, NaiveDateTime};
use timeline_core::{
    shift, CodeSet, Event, Label, LabelError, LabelValue, LabelerType, Patient, TimeHorizon,
};

use crate::extract::{extract_visits, VisitCriteria};
use crate::ontology::{resolve_codes, Ontology};
use crate::severity::{LabTest, Severity};
use crate::{finalize_labels, label_with_horizon, HorizonLabeler, Labeler};

/// Severity of every readable result of `test` among `codes`, in timeline order.
///
/// Results without a value are ignored. Results that fail to classify are
/// logged and skipped.
fn classified_results<'a>(
    patient: &'a Patient,
    codes: &'a CodeSet,
    test: LabTest,
) -> impl Iterator<Item = (&'a Event, Severity)> + 'a {
    patient.events().iter().filter_map(move |event| {
        if !codes.contains(&event.code) {
            return None;
        }
        let value = event.value.as_ref()?;
        match test.classify(&value.as_raw(), event.unit.as_deref()) {
            Ok(severity) => Some((event, severity)),
            Err(err) => {
                log::warn!(
                    "Skipping {test:?} result for patient {} at {} (code {}): {err}",
                    patient.id,
                    event.start,
                    event.code
                );
                None
            }
        }
    })
}

fn lab_codes<O: Ontology + ?Sized>(ontology: &O, test: LabTest) -> Result<CodeSet, LabelError> {
    let codes = resolve_codes(ontology, test.seed_codes(), true, true)?;
    if codes.is_empty() {
        return Err(LabelError::NoOutcomeCodes);
    }
    Ok(codes)
}

/// Severity of each lab result, predicted one minute before it is reported.
#[derive(Debug, Clone)]
pub struct InstantLabLabeler {
    test: LabTest,
    codes: CodeSet,
}

impl InstantLabLabeler {
    pub fn new<O: Ontology + ?Sized>(ontology: &O, test: LabTest) -> Result<Self, LabelError> {
        Self::with_codes(test, lab_codes(ontology, test)?)
    }

    pub fn with_codes(test: LabTest, codes: CodeSet) -> Result<Self, LabelError> {
        if codes.is_empty() {
            return Err(LabelError::NoOutcomeCodes);
        }
        Ok(Self { test, codes })
    }

    pub fn test(&self) -> LabTest {
        self.test
    }
}

impl Labeler for InstantLabLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        let Some(first) = patient.first_event_time() else {
            return Ok(Vec::new());
        };

        let labels = classified_results(patient, &self.codes, self.test)
            // Nothing precedes results recorded with the first event.
            .filter(|(event, _)| event.start != first)
            .map(|(event, severity)| -> Result<Label, LabelError> {
                let time = shift(event.start, Duration::minutes(-1))?;
                Ok(Label::new(time, LabelValue::Categorical(severity.ordinal())))
            })
            .collect::<Result<Vec<_>, LabelError>>()?;
        Ok(finalize_labels(labels))
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Categorical
    }
}

/// Predicts at admission whether a lab result of the target severity follows
/// within the horizon.
#[derive(Debug, Clone)]
pub struct LabOutcomeLabeler {
    test: LabTest,
    codes: CodeSet,
    severity: Severity,
    admissions: VisitCriteria,
    horizon: TimeHorizon,
}

impl LabOutcomeLabeler {
    pub fn new(
        test: LabTest,
        codes: CodeSet,
        severity: Severity,
        admissions: VisitCriteria,
        horizon: TimeHorizon,
    ) -> Result<Self, LabelError> {
        if codes.is_empty() {
            return Err(LabelError::NoOutcomeCodes);
        }
        Ok(Self {
            test,
            codes,
            severity,
            admissions,
            horizon,
        })
    }

    /// Predictions at inpatient admissions; lab codes must all be known.
    pub fn from_ontology<O: Ontology + ?Sized>(
        ontology: &O,
        test: LabTest,
        severity: Severity,
        horizon: TimeHorizon,
    ) -> Result<Self, LabelError> {
        let codes = resolve_codes(ontology, test.seed_codes(), true, false)?;
        Self::new(test, codes, severity, VisitCriteria::inpatient(ontology)?, horizon)
    }
}

impl HorizonLabeler for LabOutcomeLabeler {
    fn prediction_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        Ok(extract_visits(patient, &self.admissions)?
            .into_iter()
            .map(|visit| visit.start)
            .collect())
    }

    fn outcome_times(&self, patient: &Patient) -> Result<Vec<NaiveDateTime>, LabelError> {
        Ok(classified_results(patient, &self.codes, self.test)
            .filter(|(_, severity)| *severity == self.severity)
            .map(|(event, _)| event.start)
            .collect())
    }

    fn time_horizon(&self) -> TimeHorizon {
        self.horizon
    }
}

impl Labeler for LabOutcomeLabeler {
    fn label(&self, patient: &Patient) -> Result<Vec<Label>, LabelError> {
        label_with_horizon(self, patient)
    }

    fn labeler_type(&self) -> LabelerType {
        LabelerType::Boolean
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use timeline_core::EventValue;

    use super::*;
    use crate::ontology::StaticOntology;

    const POTASSIUM: u64 = 40;
    const ADMISSION: u64 = 100;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    fn reading(time: NaiveDateTime, value: EventValue, unit: Option<&str>) -> Event {
        Event::point(time, POTASSIUM).with_value(value, unit)
    }

    fn labeler() -> InstantLabLabeler {
        InstantLabLabeler::with_codes(LabTest::Potassium, CodeSet::from([POTASSIUM])).unwrap()
    }

    #[test]
    fn results_are_labeled_one_minute_early() {
        let patient = Patient::new(
            1,
            vec![
                Event::point(at(1, 0), 1),
                reading(at(1, 8), EventValue::Numeric(6.5), Some("mmol/L")),
                reading(at(2, 8), EventValue::Text("5.5".to_string()), Some("mEq/L")),
            ],
        );
        let labels = labeler().label(&patient).unwrap();
        assert_eq!(
            labels,
            vec![
                Label::new(at(1, 8) - Duration::minutes(1), LabelValue::Categorical(2)),
                Label::new(at(2, 8) - Duration::minutes(1), LabelValue::Categorical(0)),
            ]
        );
        assert_eq!(labeler().labeler_type(), LabelerType::Categorical);
    }

    #[test]
    fn results_at_first_event_time_are_skipped() {
        let patient = Patient::new(
            1,
            vec![
                reading(at(1, 0), EventValue::Numeric(8.0), Some("mmol/L")),
                reading(at(3, 0), EventValue::Numeric(8.0), Some("mmol/L")),
            ],
        );
        let labels = labeler().label(&patient).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].value, LabelValue::Categorical(3));
    }

    #[test]
    fn malformed_results_do_not_abort_the_patient() {
        let patient = Patient::new(
            1,
            vec![
                Event::point(at(1, 0), 1),
                reading(at(2, 0), EventValue::Text("hemolyzed".to_string()), Some("mmol/L")),
                reading(at(3, 0), EventValue::Numeric(6.5), Some("ounces")),
                reading(at(4, 0), EventValue::Numeric(6.5), None),
                Event::point(at(5, 0), POTASSIUM),
                reading(at(6, 0), EventValue::Numeric(5.6), Some("mmol/L")),
            ],
        );
        let labels = labeler().label(&patient).unwrap();
        assert_eq!(
            labels,
            vec![Label::new(at(6, 0) - Duration::minutes(1), LabelValue::Categorical(1))]
        );
    }

    #[test]
    fn new_resolves_lab_codes_silently() {
        let ontology = StaticOntology::new()
            .with_code("LOINC/2823-3", POTASSIUM)
            .with_descendants(POTASSIUM, [41]);
        assert!(InstantLabLabeler::new(&ontology, LabTest::Potassium).is_ok());

        let err = InstantLabLabeler::new(&StaticOntology::new(), LabTest::Potassium).unwrap_err();
        assert!(matches!(err, LabelError::NoOutcomeCodes));
    }

    #[test]
    fn lab_outcome_matches_target_severity_only() {
        let horizon = TimeHorizon::new(Duration::zero(), Duration::days(3)).unwrap();
        let labeler = LabOutcomeLabeler::new(
            LabTest::Potassium,
            CodeSet::from([POTASSIUM]),
            Severity::Severe,
            VisitCriteria::new(CodeSet::from([ADMISSION])),
            horizon,
        )
        .unwrap();
        let patient = Patient::new(
            1,
            vec![
                Event::interval(at(1, 0), at(4, 0), ADMISSION),
                reading(at(2, 0), EventValue::Numeric(6.5), Some("mmol/L")),
                Event::interval(at(10, 0), at(12, 0), ADMISSION),
                reading(at(11, 0), EventValue::Numeric(7.5), Some("mmol/L")),
                Event::point(at(20, 0), 1),
            ],
        );
        assert_eq!(
            labeler.label(&patient).unwrap(),
            vec![Label::boolean(at(1, 0), false), Label::boolean(at(10, 0), true)]
        );
    }

    #[test]
    fn lab_outcome_from_ontology_requires_every_lab_code() {
        let potassium = LabTest::Potassium.seed_codes();
        let ontology = potassium
            .iter()
            .zip(40..)
            .fold(StaticOntology::new(), |ontology, (code, id)| ontology.with_code(code, id))
            .with_code("Visit/IP", ADMISSION)
            .with_code("Visit/ERIP", ADMISSION + 1);
        let horizon = TimeHorizon::new(Duration::zero(), Duration::days(3)).unwrap();
        let labeler =
            LabOutcomeLabeler::from_ontology(&ontology, LabTest::Potassium, Severity::Mild, horizon)
                .unwrap();

        let patient = Patient::new(
            1,
            vec![
                Event::interval(at(1, 0), at(4, 0), ADMISSION + 1),
                Event::point(at(2, 0), 44).with_value(EventValue::Numeric(5.8), Some("mmol/L")),
                Event::point(at(20, 0), 1),
            ],
        );
        assert_eq!(labeler.label(&patient).unwrap(), vec![Label::boolean(at(1, 0), true)]);

        let partial = StaticOntology::new()
            .with_code("LOINC/2823-3", 40)
            .with_code("Visit/IP", ADMISSION)
            .with_code("Visit/ERIP", ADMISSION + 1);
        let err =
            LabOutcomeLabeler::from_ontology(&partial, LabTest::Potassium, Severity::Mild, horizon)
                .unwrap_err();
        assert!(matches!(err, LabelError::UnknownConcept(_)));
    }
}
