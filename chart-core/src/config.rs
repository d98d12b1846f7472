use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ChartError;

/// Default height concept (CIEL 5090).
pub const DEFAULT_HEIGHT_CONCEPT: &str = "5090AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
/// Default weight concept (CIEL 5089).
pub const DEFAULT_WEIGHT_CONCEPT: &str = "5089AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
/// Concept set listing allergic reactions.
pub const ALLERGY_REACTION_CONCEPT: &str = "162555AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Expand a CIEL numeric code into its 36 character concept uuid.
pub fn ciel_uuid(code: &str) -> String {
    format!("{code:A<36}")
}

/// Widget configuration supplied by the host application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChartConfig {
    pub concepts: ConceptConfig,
    /// How heights and weights are paired into one biometrics row.
    pub join_key: JoinKey,
    /// Decimal places kept on the derived BMI.
    pub bmi_decimals: u8,
    /// Rows shown before "see all" on the biometrics card.
    pub biometrics_preview: usize,
    pub endpoints: EndpointConfig,
    pub visit_note: VisitNoteConcepts,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            concepts: ConceptConfig::default(),
            join_key: JoinKey::default(),
            bmi_decimals: 2,
            biometrics_preview: 3,
            endpoints: EndpointConfig::default(),
            visit_note: VisitNoteConcepts::default(),
        }
    }
}

impl ChartConfig {
    /// Parse a (possibly partial) JSON document; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ChartError> {
        let config: ChartConfig =
            serde_json::from_str(json).map_err(|err| ChartError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChartError> {
        if self.concepts.weight_uuid.trim().is_empty() || self.concepts.height_uuid.trim().is_empty()
        {
            return Err(ChartError::InvalidConfig(
                "concepts.weightUuid and concepts.heightUuid must be set".into(),
            ));
        }
        if self.concepts.weight_uuid == self.concepts.height_uuid {
            return Err(ChartError::InvalidConfig(
                "weight and height concepts must differ".into(),
            ));
        }
        if self.bmi_decimals > 6 {
            return Err(ChartError::InvalidConfig(format!(
                "bmi_decimals must be at most 6, got {}",
                self.bmi_decimals
            )));
        }
        Ok(())
    }
}

/// Concept uuids, keyed `weightUuid` / `heightUuid` (snake_case also accepted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConceptConfig {
    #[serde(alias = "weight_uuid")]
    pub weight_uuid: String,
    #[serde(alias = "height_uuid")]
    pub height_uuid: String,
}

impl Default for ConceptConfig {
    fn default() -> Self {
        Self {
            weight_uuid: DEFAULT_WEIGHT_CONCEPT.to_string(),
            height_uuid: DEFAULT_HEIGHT_CONCEPT.to_string(),
        }
    }
}

/// Key used to pair height and weight observations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
    /// Same `issued` instant. Readings taken minutes apart stay on separate rows.
    #[default]
    ExactInstant,
    /// Same UTC calendar day.
    CalendarDay,
}

impl JoinKey {
    pub fn key_for(&self, issued: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            JoinKey::ExactInstant => issued,
            JoinKey::CalendarDay => {
                Utc.from_utc_datetime(&issued.date_naive().and_time(NaiveTime::MIN))
            }
        }
    }
}

/// Base paths of the backend, relative to the server origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    pub fhir_base: String,
    pub rest_base: String,
    pub diagnosis_search: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            fhir_base: "/ws/fhir2/R4".to_string(),
            rest_base: "/ws/rest/v1".to_string(),
            diagnosis_search: "/coreapps/diagnoses/search.action".to_string(),
        }
    }
}

/// Concepts and metadata used when saving a visit note encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VisitNoteConcepts {
    pub encounter_type_uuid: String,
    pub form_uuid: String,
    pub encounter_role_uuid: String,
    pub note_concept_uuid: String,
    pub diagnosis_set_uuid: String,
    pub coded_diagnosis_uuid: String,
    pub certainty_uuid: String,
    pub confirmed_uuid: String,
    pub presumed_uuid: String,
    pub order_uuid: String,
    pub primary_uuid: String,
    pub secondary_uuid: String,
}

impl Default for VisitNoteConcepts {
    fn default() -> Self {
        Self {
            encounter_type_uuid: "d7151f82-c1f3-4152-a605-2f9ea7414a79".to_string(),
            form_uuid: "c75f120a-04ec-11e3-8780-2b40bef9a44b".to_string(),
            encounter_role_uuid: "a0b03050-c99b-11e0-9572-0800200c9a66".to_string(),
            note_concept_uuid: ciel_uuid("162169"),
            diagnosis_set_uuid: ciel_uuid("159947"),
            coded_diagnosis_uuid: ciel_uuid("1284"),
            certainty_uuid: ciel_uuid("159394"),
            confirmed_uuid: ciel_uuid("159392"),
            presumed_uuid: ciel_uuid("159393"),
            order_uuid: ciel_uuid("159946"),
            primary_uuid: ciel_uuid("159943"),
            secondary_uuid: ciel_uuid("159944"),
        }
    }
}
