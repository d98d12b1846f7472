//! Core clinical view models for the patient chart: biometrics, allergies and
//! diagnosis candidates, plus the configuration and errors shared by the
//! projection and client crates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod config;
mod payload;
mod view;

pub use config::{
    ciel_uuid, ChartConfig, ConceptConfig, EndpointConfig, JoinKey, VisitNoteConcepts,
    ALLERGY_REACTION_CONCEPT, DEFAULT_HEIGHT_CONCEPT, DEFAULT_WEIGHT_CONCEPT,
};
pub use payload::{
    AllergenPayload, AllergyFormState, AllergyPayload, EncounterObs, EncounterProvider,
    ReactionPayload, UuidRef, VisitNoteDraft, VisitNotePayload,
};
pub use view::{
    AllergyOverview, AllergyRow, BiometricRow, Page, Preview, ViewData, WidgetState,
    EMPTY_ALLERGY_ACTION, EMPTY_ALLERGY_MESSAGE, PAGE_SIZES,
};

/// Placeholder rendered wherever a value is unknown.
pub const EM_DASH: &str = "\u{2014}";

/// Terminology source whose mapping supplies a diagnosis reference term.
pub const REFERENCE_TERM_SOURCE: &str = "ICD-10-WHO";

/// One `system`/`code` pair of a coded concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coding {
    pub system: Option<String>,
    pub code: String,
}

/// A numeric FHIR Observation after validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: String,
    pub codings: Vec<Coding>,
    pub effective_at: Option<DateTime<Utc>>,
    pub issued: DateTime<Utc>,
    pub value: f64,
    pub unit: Option<String>,
    pub subject_reference: Option<String>,
}

impl Observation {
    /// True when any coding carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.codings.iter().any(|coding| coding.code == code)
    }
}

/// Observations that contributed to a [`DimensionRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DimensionSources {
    pub weight: Option<Observation>,
    pub height: Option<Observation>,
}

/// Height, weight and BMI recorded for one join key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionRecord {
    /// Epoch milliseconds of `date`.
    pub id: i64,
    pub date: DateTime<Utc>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub sources: DimensionSources,
}

impl DimensionRecord {
    /// Build a record; `bmi` is only derived when both observations exist.
    pub fn new(
        date: DateTime<Utc>,
        weight: Option<Observation>,
        height: Option<Observation>,
        bmi_decimals: u8,
    ) -> Self {
        let weight_value = weight.as_ref().map(|obs| obs.value);
        let height_value = height.as_ref().map(|obs| obs.value);
        let bmi = match (weight_value, height_value) {
            (Some(w), Some(h)) => Some(calculate_bmi(w, h, bmi_decimals)),
            _ => None,
        };

        Self {
            id: date.timestamp_millis(),
            date,
            weight: weight_value,
            height: height_value,
            bmi,
            sources: DimensionSources { weight, height },
        }
    }
}

/// Body mass index from kilograms and centimetres.
pub fn calculate_bmi(weight_kg: f64, height_cm: f64, decimals: u8) -> f64 {
    let metres = height_cm / 100.0;
    round_to(weight_kg / (metres * metres), decimals)
}

fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(i32::from(decimals));
    (value * factor).round() / factor
}

/// Allergy criticality as reported by FHIR `AllergyIntolerance.criticality`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    High,
    Low,
    #[default]
    Unknown,
}

impl Criticality {
    /// Map the raw FHIR value; anything but `high`/`low` (including `?`) is unknown.
    pub fn from_fhir(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("high") => Criticality::High,
            Some("low") => Criticality::Low,
            _ => Criticality::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::High => "high",
            Criticality::Low => "low",
            Criticality::Unknown => "unknown",
        }
    }

    /// Text shown next to the allergen.
    pub fn display_label(&self) -> &'static str {
        match self {
            Criticality::Unknown => EM_DASH,
            other => other.as_str(),
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Criticality::High)
    }
}

/// View-ready allergy projected from an `AllergyIntolerance` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllergyRecord {
    pub id: String,
    pub allergen_text: String,
    pub criticality: Criticality,
    pub reaction_manifestations: Vec<String>,
    pub note: Option<String>,
    pub recorded_date: Option<NaiveDate>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl AllergyRecord {
    /// Manifestations joined for a single table cell.
    pub fn manifestation_text(&self) -> String {
        self.reaction_manifestations.join(", ")
    }

    /// Overview value, e.g. `Rash (high)`.
    pub fn summary_value(&self) -> String {
        let label = self.criticality.display_label();
        match self.reaction_manifestations.first() {
            Some(first) => format!("{first} ({label})"),
            None => format!("({label})"),
        }
    }

    /// "Since" column, `MMM-YYYY`.
    pub fn since_label(&self) -> String {
        self.recorded_date
            .map(|date| date.format("%b-%Y").to_string())
            .unwrap_or_else(|| EM_DASH.to_string())
    }

    /// "Updated" column, `DD-MMM-YYYY`.
    pub fn updated_label(&self) -> String {
        self.last_updated
            .map(|at| at.format("%d-%b-%Y").to_string())
            .unwrap_or_else(|| EM_DASH.to_string())
    }
}

/// Structured diagnosis produced from a free-text search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosisCandidate {
    pub concept_id: String,
    pub concept_uuid: String,
    pub preferred_name: String,
    pub reference_term_code: Option<String>,
    pub primary: bool,
    pub confirmed: bool,
}

/// Member of a concept set (allergens, reactions).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConceptMember {
    pub uuid: String,
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub uuid: String,
    pub person_uuid: Option<String>,
    pub display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub uuid: String,
    pub display: String,
}

/// Authenticated session as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SessionUser {
    pub authenticated: bool,
    pub user_uuid: Option<String>,
    pub user_display: Option<String>,
    pub provider_uuid: Option<String>,
    pub location_uuid: Option<String>,
}

/// Patient a fetch is issued for. Passed explicitly to every data call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PatientContext {
    pub uuid: String,
    /// Primary identifier used by the FHIR allergy search.
    pub identifier: String,
}

impl PatientContext {
    pub fn new(uuid: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            identifier: identifier.into(),
        }
    }
}

/// Records projected from a payload and the entries that were rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Projection<T> {
    pub records: Vec<T>,
    #[serde(default)]
    pub rejected: Vec<MalformedRecordError>,
}

impl<T> Default for Projection<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> Projection<T> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Height/weight partitions of an Observation bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NormalizedObservations {
    pub heights: Vec<Observation>,
    pub weights: Vec<Observation>,
    #[serde(default)]
    pub rejected: Vec<MalformedRecordError>,
}

/// Merged biometrics, latest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DimensionSeries {
    pub records: Vec<DimensionRecord>,
    #[serde(default)]
    pub rejected: Vec<MalformedRecordError>,
}

/// Why an entry could not be projected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum MalformedKind {
    MissingField(String),
    InvalidValue(String),
    /// Carries both the height and the weight concept code.
    AmbiguousConcept,
}

impl std::fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedKind::MissingField(field) => write!(f, "missing field `{field}`"),
            MalformedKind::InvalidValue(field) => write!(f, "invalid value in `{field}`"),
            MalformedKind::AmbiguousConcept => {
                write!(f, "coded as both height and weight")
            }
        }
    }
}

/// A single bundle entry whose shape does not match expectations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("malformed {resource_type} {}: {kind}", .id.as_deref().unwrap_or("<no id>"))]
pub struct MalformedRecordError {
    pub resource_type: String,
    pub id: Option<String>,
    pub kind: MalformedKind,
}

impl MalformedRecordError {
    pub fn missing(resource_type: &str, id: Option<&str>, field: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            kind: MalformedKind::MissingField(field.to_string()),
        }
    }

    pub fn invalid(resource_type: &str, id: Option<&str>, field: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            kind: MalformedKind::InvalidValue(field.to_string()),
        }
    }
}

/// Whole-payload failures.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("input is missing required data: {0}")]
    MissingData(String),
    #[error("could not read input: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid form: {0}")]
    InvalidForm(String),
}
