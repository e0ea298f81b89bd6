//! Seed concept codes for the built-in tasks.
//!
//! Each table is expanded through the ontology once, when a labeler is built.

/// Death records.
pub const DEATH: [&str; 2] = ["Death Type/", "Condition Type/OMOP4822053"];

/// Inpatient and emergency-to-inpatient visits.
pub const INPATIENT_ADMISSION: [&str; 2] = ["Visit/IP", "Visit/ERIP"];

/// Table tag carried by ICU stay events.
pub const ICU_TABLE: &str = "visit_detail";

/// Care sites whose name contains "ICU". Site specific, so resolved silently.
#[rustfmt::skip]
pub const ICU_CARE_SITES: [&str; 25] = [
    "CARE_SITE/7928450", "CARE_SITE/7930385", "CARE_SITE/7930600", "CARE_SITE/7928852",
    "CARE_SITE/7928619", "CARE_SITE/7929727", "CARE_SITE/7928675", "CARE_SITE/7930225",
    "CARE_SITE/7928759", "CARE_SITE/7928227", "CARE_SITE/7928810", "CARE_SITE/7929179",
    "CARE_SITE/7928650", "CARE_SITE/7929351", "CARE_SITE/7928457", "CARE_SITE/7928195",
    "CARE_SITE/7930681", "CARE_SITE/7930670", "CARE_SITE/7930176", "CARE_SITE/7931420",
    "CARE_SITE/7929149", "CARE_SITE/7930857", "CARE_SITE/7931186", "CARE_SITE/7930934",
    "CARE_SITE/7930924",
];

/// Conditions identified from explicitly coded diagnoses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedCondition {
    Hypoglycemia,
    AcuteKidneyInjury,
    Anemia,
    Hyperkalemia,
    Hyponatremia,
    Thrombocytopenia,
    Neutropenia,
}

impl CodedCondition {
    #[rustfmt::skip]
    pub fn seed_codes(self) -> &'static [&'static str] {
        match self {
            CodedCondition::Hypoglycemia => &[
                "SNOMED/267384006", "SNOMED/421725003", "SNOMED/719216001",
                "SNOMED/302866003", "SNOMED/237633009", "SNOMED/120731000119103",
                "SNOMED/190448007", "SNOMED/230796005", "SNOMED/421437000",
                "SNOMED/52767006", "SNOMED/237637005", "SNOMED/84371000119108",
            ],
            CodedCondition::AcuteKidneyInjury => &[
                "SNOMED/14669001", "SNOMED/298015003", "SNOMED/35455006",
            ],
            CodedCondition::Anemia => &[
                "SNOMED/271737000", "SNOMED/713496008", "SNOMED/713349004", "SNOMED/767657005",
                "SNOMED/111570005", "SNOMED/691401000119104", "SNOMED/691411000119101",
            ],
            CodedCondition::Hyperkalemia => &["SNOMED/14140009"],
            // Shares its codes with hyponatremia upstream; kept as published.
            CodedCondition::Hyponatremia | CodedCondition::Thrombocytopenia => {
                &["SNOMED/267447008", "SNOMED/89627008"]
            }
            CodedCondition::Neutropenia => &["SNOMED/165517008"],
        }
    }
}

/// Root concepts for "first diagnosis" tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstDiagnosis {
    PancreaticCancer,
    CeliacDisease,
    Lupus,
    AcuteMyocardialInfarction,
    Cteph,
    EssentialHypertension,
    Hyperlipidemia,
}

impl FirstDiagnosis {
    pub fn root_code(self) -> &'static str {
        match self {
            FirstDiagnosis::PancreaticCancer => "SNOMED/372003004",
            FirstDiagnosis::CeliacDisease => "SNOMED/396331005",
            FirstDiagnosis::Lupus => "SNOMED/55464009",
            FirstDiagnosis::AcuteMyocardialInfarction => "SNOMED/57054005",
            FirstDiagnosis::Cteph => "SNOMED/233947005",
            FirstDiagnosis::EssentialHypertension => "SNOMED/59621000",
            FirstDiagnosis::Hyperlipidemia => "SNOMED/55822004",
        }
    }
}
