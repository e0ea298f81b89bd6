use std::thread;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use timeline_core::{
    end_of_day, CensoringPolicy, CodeSet, Event, EventValue, Label, LabelError, LabelValue,
    LabelerType, MatchPolicy, Patient, TimeAdjustment, TimeHorizon,
};
use timeline_labelers::{
    AnyLabeler, CodeLabeler, DecompensationLabeler, InstantLabLabeler, LabTest, Labeler,
    LengthOfStayLabeler, LongAdmissionLabeler, OutcomeSource, ReadmissionLabeler, Severity,
    StaticOntology, VisitCriteria, VisitLabeler,
};

const DEATH: u64 = 1;
const DEATH_CONDITION: u64 = 2;
const INPATIENT: u64 = 10;
const ER_INPATIENT: u64 = 11;
const ICU_SITE: u64 = 20;
const POTASSIUM: u64 = 30;
const POTASSIUM_SERUM: u64 = 31;
const NOTE: u64 = 99;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ontology() -> StaticOntology {
    StaticOntology::new()
        .with_code("Death Type/", DEATH)
        .with_code("Condition Type/OMOP4822053", DEATH_CONDITION)
        .with_code("Visit/IP", INPATIENT)
        .with_code("Visit/ERIP", ER_INPATIENT)
        .with_code("CARE_SITE/7928450", ICU_SITE)
        .with_code("LOINC/2823-3", POTASSIUM)
        .with_descendants(POTASSIUM, [POTASSIUM_SERUM])
}

fn at(m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, m, d)
        .and_then(|date| date.and_hms_opt(h, 0, 0))
        .expect("valid timestamp")
}

fn on(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid date")
}

fn icu_stay(start: NaiveDateTime, end: NaiveDateTime) -> Event {
    Event::interval(start, end, ICU_SITE).with_table("visit_detail")
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn potassium_severity_boundaries() {
    assert_eq!(LabTest::Potassium.classify("6.5", Some("mmol/L")), Ok(Severity::Moderate));
    assert_eq!(LabTest::Potassium.classify("5.5", Some("mEq/L")), Ok(Severity::Normal));
    assert_eq!(Severity::Moderate.ordinal(), 2);
}

#[test]
fn fixed_horizon_scenario() {
    init_logger();
    let horizon = TimeHorizon::new(Duration::zero(), Duration::days(180)).expect("horizon");
    let labeler = CodeLabeler::new(CodeSet::from([2]), horizon).expect("labeler");
    let patient = Patient::new(
        1,
        vec![
            Event::point(on(2015, 1, 3), 2),
            Event::point(on(2015, 10, 5), 1),
            Event::point(on(2018, 1, 3), 2),
        ],
    );
    let labels = labeler.label(&patient).expect("labels");
    assert_eq!(labels[0], Label::boolean(on(2015, 1, 3), true));
    assert_eq!(labels[1], Label::boolean(on(2015, 10, 5), false));
}

#[test]
fn unknown_censoring_keeps_prediction_time() {
    let horizon = TimeHorizon::new(Duration::zero(), Duration::days(30)).expect("horizon");
    let labeler = CodeLabeler::new(CodeSet::from([DEATH]), horizon)
        .expect("labeler")
        .with_policy(MatchPolicy::default().with_censoring(CensoringPolicy::Unknown));
    let patient = Patient::new(
        1,
        vec![Event::point(at(1, 1, 0), NOTE), Event::point(at(1, 20, 0), NOTE)],
    );
    let labels = labeler.label(&patient).expect("labels");
    assert_eq!(
        labels,
        vec![
            Label::new(at(1, 1, 0), LabelValue::Unknown),
            Label::new(at(1, 20, 0), LabelValue::Unknown),
        ]
    );

    let followed_up = patient.with_end_of_followup(at(6, 1, 0));
    let labels = labeler.label(&followed_up).expect("labels");
    assert!(labels.iter().all(|label| label.value == LabelValue::Boolean(false)));
}

#[test]
fn death_before_forty_eight_hours_excludes_the_visit() {
    init_logger();
    let patient = Patient::new(
        1,
        vec![
            Event::interval(at(1, 1, 8), at(1, 10, 8), INPATIENT),
            Event::point(at(1, 3, 0), DEATH),
        ],
    );

    let labeler = VisitLabeler::new(
        VisitCriteria::new(CodeSet::from([INPATIENT])),
        OutcomeSource::Codes(CodeSet::from([DEATH])),
    )
    .expect("labeler")
    .with_start_adjust(TimeAdjustment::Offset(Duration::hours(48)));
    assert!(labeler.label(&patient).expect("labels").is_empty());
}

#[test]
fn icu_mortality_predicts_at_forty_eight_hours() {
    let labeler = VisitLabeler::icu_mortality(&ontology()).expect("labeler");

    let no_context = Patient::new(
        1,
        vec![icu_stay(at(1, 1, 8), at(1, 10, 8)), Event::point(at(1, 3, 0), DEATH)],
    );
    assert!(labeler.label(&no_context).expect("labels").is_empty());

    let died_in_window = Patient::new(
        2,
        vec![
            icu_stay(at(1, 1, 8), at(1, 10, 8)),
            Event::point(at(1, 2, 0), NOTE),
            Event::point(at(1, 5, 0), DEATH_CONDITION),
        ],
    );
    assert_eq!(
        labeler.label(&died_in_window).expect("labels"),
        vec![Label::boolean(at(1, 3, 8), true)]
    );

    // Follow-up ends before discharge; the stay counts as survived.
    let censored = Patient::new(
        3,
        vec![icu_stay(at(1, 1, 8), at(1, 10, 8)), Event::point(at(1, 2, 0), NOTE)],
    );
    assert_eq!(
        labeler.label(&censored).expect("labels"),
        vec![Label::boolean(at(1, 3, 8), false)]
    );

    let short_stay = Patient::new(
        4,
        vec![icu_stay(at(1, 1, 8), at(1, 2, 8)), Event::point(at(1, 1, 9), NOTE)],
    );
    assert!(labeler.label(&short_stay).expect("labels").is_empty());
}

#[test]
fn inpatient_mortality_uses_end_of_admission_day() {
    let labeler = VisitLabeler::inpatient_mortality(&ontology()).expect("labeler");
    let patient = Patient::new(
        1,
        vec![
            Event::interval(at(2, 1, 8), at(2, 6, 8), ER_INPATIENT),
            Event::point(at(2, 1, 9), NOTE),
            Event::interval(at(3, 1, 8), at(3, 4, 8), INPATIENT),
            Event::point(at(3, 1, 10), NOTE),
            Event::point(at(3, 3, 12), DEATH),
        ],
    );
    assert_eq!(
        labeler.label(&patient).expect("labels"),
        vec![
            Label::boolean(end_of_day(at(2, 1, 0)), false),
            Label::boolean(end_of_day(at(3, 1, 0)), true),
        ]
    );
}

#[test]
fn icu_admission_excludes_same_day_transfers_and_discharges() {
    let labeler = VisitLabeler::icu_admission(&ontology()).expect("labeler");
    let patient = Patient::new(
        1,
        vec![
            Event::interval(at(1, 1, 8), at(1, 6, 8), INPATIENT),
            Event::point(at(1, 1, 12), NOTE),
            icu_stay(at(1, 3, 10), at(1, 4, 10)),
            Event::interval(at(1, 10, 8), at(1, 12, 8), INPATIENT),
            Event::point(at(1, 10, 9), NOTE),
            icu_stay(at(1, 10, 12), at(1, 11, 12)),
            Event::interval(at(1, 20, 8), at(1, 20, 20), INPATIENT),
            Event::point(at(1, 20, 9), NOTE),
            Event::point(at(2, 1, 0), NOTE),
        ],
    );
    assert_eq!(
        labeler.label(&patient).expect("labels"),
        vec![Label::boolean(end_of_day(at(1, 1, 0)), true)]
    );
}

#[test]
fn readmission_from_ontology() {
    let labeler = ReadmissionLabeler::inpatient(&ontology()).expect("labeler");
    let patient = Patient::new(
        1,
        vec![
            Event::interval(at(1, 1, 8), at(1, 5, 12), INPATIENT),
            Event::interval(at(1, 25, 8), at(1, 27, 8), ER_INPATIENT),
            Event::point(at(6, 1, 0), NOTE),
        ],
    );
    assert_eq!(
        labeler.label(&patient).expect("labels"),
        vec![
            Label::boolean(end_of_day(at(1, 5, 0)), true),
            Label::boolean(end_of_day(at(1, 27, 0)), false),
        ]
    );
}

#[test]
fn instant_lab_labels_descendant_codes() {
    let labeler = InstantLabLabeler::new(&ontology(), LabTest::Potassium).expect("labeler");
    let patient = Patient::new(
        1,
        vec![
            Event::point(at(1, 1, 0), NOTE),
            Event::point(at(1, 2, 0), POTASSIUM_SERUM)
                .with_value(EventValue::Numeric(7.2), Some("mmol/L")),
            Event::point(at(1, 3, 0), POTASSIUM)
                .with_value(EventValue::Text("bad".to_string()), Some("mmol/L")),
        ],
    );
    assert_eq!(
        labeler.label(&patient).expect("labels"),
        vec![Label::new(at(1, 2, 0) - Duration::minutes(1), LabelValue::Categorical(3))]
    );
}

#[test]
fn length_of_stay_from_ontology() {
    let labeler = LengthOfStayLabeler::from_ontology(&ontology()).expect("labeler");
    let patient = Patient::new(
        1,
        vec![icu_stay(at(3, 1, 0), at(3, 1, 6)), Event::point(at(3, 1, 1), NOTE)],
    );
    assert_eq!(
        labeler.label(&patient).expect("labels"),
        vec![
            Label::new(at(3, 1, 4), LabelValue::Numeric(2.0)),
            Label::new(at(3, 1, 5), LabelValue::Numeric(1.0)),
        ]
    );
}

#[test]
fn reversed_interval_is_fatal() {
    let labeler = LongAdmissionLabeler::inpatient(&ontology()).expect("labeler");
    let patient = Patient::new(9, vec![Event::interval(at(1, 5, 0), at(1, 1, 0), INPATIENT)]);
    let err = labeler.label(&patient).expect_err("reversed interval");
    assert!(matches!(err, LabelError::InvalidInterval { patient_id: 9, .. }));
}

#[test]
fn missing_concept_is_a_configuration_error() {
    let err = VisitLabeler::inpatient_mortality(&StaticOntology::new()).expect_err("no codes");
    assert!(matches!(err, LabelError::UnknownConcept(code) if code == "Death Type/"));
}

fn all_labelers() -> Vec<AnyLabeler> {
    let ontology = ontology();
    let horizon = TimeHorizon::new(Duration::zero(), Duration::days(30)).expect("horizon");
    vec![
        CodeLabeler::new(CodeSet::from([DEATH]), horizon).expect("code").into(),
        VisitLabeler::inpatient_mortality(&ontology).expect("visit").into(),
        ReadmissionLabeler::inpatient(&ontology).expect("readmission").into(),
        LongAdmissionLabeler::end_of_admission_day(&ontology).expect("long").into(),
        DecompensationLabeler::from_ontology(&ontology).expect("decompensation").into(),
        LengthOfStayLabeler::from_ontology(&ontology).expect("los").into(),
        InstantLabLabeler::new(&ontology, LabTest::Potassium).expect("lab").into(),
    ]
}

fn busy_patient(id: u64) -> Patient {
    let offset = Duration::days(id as i64);
    let mut events = vec![
        Event::interval(at(1, 1, 8), at(1, 9, 8), INPATIENT),
        Event::point(at(1, 1, 9), NOTE),
        icu_stay(at(1, 2, 0), at(1, 4, 0)),
        Event::point(at(1, 2, 3), POTASSIUM_SERUM)
            .with_value(EventValue::Numeric(6.1), Some("mEq/L")),
        Event::point(at(1, 2, 5), NOTE),
        Event::interval(at(1, 20, 8), at(1, 22, 8), INPATIENT),
        Event::point(at(1, 21, 0), POTASSIUM).with_value(EventValue::Numeric(4.0), Some("mmol/L")),
        Event::point(at(3, 1, 0), NOTE),
    ];
    if id % 2 == 0 {
        events.push(Event::point(at(1, 3, 12), DEATH));
    }
    for event in &mut events {
        event.start += offset;
        event.end = event.end.map(|end| end + offset);
    }
    Patient::new(id, events)
}

#[test]
fn labelers_are_shareable_across_threads() {
    assert_send_sync::<AnyLabeler>();
    assert_send_sync::<StaticOntology>();

    let labelers = all_labelers();
    let patients: Vec<Patient> = (0..8).map(busy_patient).collect();

    let sequential: Vec<Vec<Vec<Label>>> = patients
        .iter()
        .map(|patient| {
            labelers
                .iter()
                .map(|labeler| labeler.label(patient).expect("labels"))
                .collect()
        })
        .collect();

    let parallel: Vec<Vec<Vec<Label>>> = thread::scope(|scope| {
        let handles: Vec<_> = patients
            .iter()
            .map(|patient| {
                let labelers = &labelers;
                scope.spawn(move || {
                    labelers
                        .iter()
                        .map(|labeler| labeler.label(patient).expect("labels"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker"))
            .collect()
    });

    assert_eq!(sequential, parallel);
}

#[test]
fn labels_are_idempotent_and_strictly_ascending() {
    let labelers = all_labelers();
    for patient in (0..4).map(busy_patient) {
        for labeler in &labelers {
            let first = labeler.label(&patient).expect("labels");
            let second = labeler.label(&patient).expect("labels");
            assert_eq!(
                serde_json::to_string(&first).expect("json"),
                serde_json::to_string(&second).expect("json")
            );
            assert!(first.windows(2).all(|pair| pair[0].time < pair[1].time));
        }
    }
}

#[test]
fn labeler_types_are_reported() {
    let types: Vec<LabelerType> = all_labelers().iter().map(Labeler::labeler_type).collect();
    assert_eq!(
        types,
        vec![
            LabelerType::Boolean,
            LabelerType::Boolean,
            LabelerType::Boolean,
            LabelerType::Boolean,
            LabelerType::Boolean,
            LabelerType::Numeric,
            LabelerType::Categorical,
        ]
    );
    assert_eq!(LabelerType::Categorical.to_string(), "categorical");
}
