//! Lab value to severity bucket classification.
//!
//! Each test keeps its own comparison operators. Boundaries are clinical
//! thresholds and differ in inclusivity between tests (sodium "mild" is
//! `<= 135`, platelet "mild" is `< 150`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordinal severity of a lab reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal = 0,
    Mild = 1,
    Moderate = 2,
    Severe = 3,
}

impl Severity {
    pub fn ordinal(self) -> u32 {
        self as u32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unusable reading. Callers skip the reading and continue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeverityError {
    #[error("Could not parse lab value '{0}'")]
    Parse(String),
    #[error("Unknown unit: {0:?}")]
    UnknownUnit(Option<String>),
}

/// Lab tests with a severity scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LabTest {
    /// Platelet count (10^9/L), thrombocytopenia.
    Platelets,
    /// Blood potassium (mmol/L), hyperkalemia.
    Potassium,
    /// Blood glucose (mmol/L), hypoglycemia.
    Glucose,
    /// Blood sodium (mmol/L), hyponatremia.
    Sodium,
    /// Hemoglobin (g/L), anemia.
    Hemoglobin,
}

const NORMAL_SENTINELS: [&str; 2] = ["normal", "adequate"];

/// Conversion from a reported unit to the canonical one.
#[derive(Debug, Clone, Copy)]
enum Scale {
    Same,
    Times(f64),
    Per(f64),
}

impl Scale {
    fn apply(self, value: f64) -> f64 {
        match self {
            Scale::Same => value,
            Scale::Times(factor) => value * factor,
            Scale::Per(divisor) => value / divisor,
        }
    }
}

const POTASSIUM_UNITS: &[(&str, Scale)] = &[
    ("mmol/l", Scale::Same),
    ("meq/l", Scale::Same),
    ("mg/dl", Scale::Per(18.0)),
];

const GLUCOSE_UNITS: &[(&str, Scale)] = &[("mg/dl", Scale::Per(18.0)), ("mmol/l", Scale::Same)];

// mg/dL is scaled by 1/100 rather than 1/1000, as in the published task definition.
const HEMOGLOBIN_UNITS: &[(&str, Scale)] = &[
    ("g/dl", Scale::Times(10.0)),
    ("mg/dl", Scale::Per(100.0)),
    ("g/l", Scale::Same),
];

impl LabTest {
    /// Seed concept codes for results of this test.
    #[rustfmt::skip]
    pub fn seed_codes(self) -> &'static [&'static str] {
        match self {
            LabTest::Platelets => &["LOINC/LP393218-5", "LOINC/LG32892-8", "LOINC/777-3"],
            LabTest::Potassium => &[
                "LOINC/LG7931-1", "LOINC/LP386618-5", "LOINC/LG10990-6",
                "LOINC/6298-4", "LOINC/2823-3",
            ],
            LabTest::Glucose => &["SNOMED/33747003", "LOINC/LP416145-3", "LOINC/14749-6"],
            LabTest::Sodium => &["LOINC/LG11363-5", "LOINC/2951-2", "LOINC/2947-0"],
            LabTest::Hemoglobin => &["LOINC/LP392452-1"],
        }
    }

    /// Classify a raw reading and its unit.
    ///
    /// Units are matched case-insensitively by prefix, since sources append
    /// free text such as `mg/dL (See scan or EMR data for detail)`.
    pub fn classify(self, raw_value: &str, unit: Option<&str>) -> Result<Severity, SeverityError> {
        let trimmed = raw_value.trim();
        if NORMAL_SENTINELS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
        {
            return Ok(Severity::Normal);
        }

        let value = parse_value(trimmed)?;
        let severity = match self {
            LabTest::Platelets => match value {
                v if v < 50.0 => Severity::Severe,
                v if v < 100.0 => Severity::Moderate,
                v if v < 150.0 => Severity::Mild,
                _ => Severity::Normal,
            },
            LabTest::Potassium => match normalize(value, unit, POTASSIUM_UNITS)? {
                v if v > 7.0 => Severity::Severe,
                v if v > 6.0 => Severity::Moderate,
                v if v > 5.5 => Severity::Mild,
                _ => Severity::Normal,
            },
            LabTest::Glucose => match normalize(value, unit, GLUCOSE_UNITS)? {
                v if v < 3.0 => Severity::Severe,
                v if v < 3.5 => Severity::Moderate,
                v if v <= 3.9 => Severity::Mild,
                _ => Severity::Normal,
            },
            LabTest::Sodium => match value {
                v if v < 125.0 => Severity::Severe,
                v if v < 130.0 => Severity::Moderate,
                v if v <= 135.0 => Severity::Mild,
                _ => Severity::Normal,
            },
            LabTest::Hemoglobin => match normalize(value, unit, HEMOGLOBIN_UNITS)? {
                v if v < 70.0 => Severity::Severe,
                v if v < 110.0 => Severity::Moderate,
                v if v < 120.0 => Severity::Mild,
                _ => Severity::Normal,
            },
        };
        Ok(severity)
    }
}

fn parse_value(raw: &str) -> Result<f64, SeverityError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SeverityError::Parse(raw.to_string())),
    }
}

/// Convert `value` to the canonical unit using the first matching prefix.
fn normalize(
    value: f64,
    unit: Option<&str>,
    scales: &[(&str, Scale)],
) -> Result<f64, SeverityError> {
    let Some(unit) = unit else {
        return Err(SeverityError::UnknownUnit(None));
    };
    let lower = unit.trim().to_lowercase();
    scales
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, scale)| scale.apply(value))
        .ok_or_else(|| SeverityError::UnknownUnit(Some(unit.to_string())))
}
