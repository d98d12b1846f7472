//! Request bodies for the allergy and visit note write endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChartError, DiagnosisCandidate, VisitNoteConcepts};

/// Flat state of the allergy edit form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AllergyFormState {
    /// `DRUG`, `FOOD`, `ENVIRONMENT` or `OTHER`.
    pub allergen_type: String,
    pub coded_allergen_uuid: String,
    pub severity_uuid: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub reaction_uuids: Vec<String>,
}

impl AllergyFormState {
    pub fn validate(&self) -> Result<(), ChartError> {
        if self.allergen_type.trim().is_empty() {
            return Err(ChartError::InvalidForm("allergen type is required".into()));
        }
        if self.coded_allergen_uuid.trim().is_empty() {
            return Err(ChartError::InvalidForm("allergen is required".into()));
        }
        if self.severity_uuid.trim().is_empty() {
            return Err(ChartError::InvalidForm("severity is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UuidRef {
    pub uuid: String,
}

impl UuidRef {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllergenPayload {
    pub allergen_type: String,
    pub coded_allergen: UuidRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionPayload {
    pub reaction: UuidRef,
}

/// Body shared by allergy create and update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllergyPayload {
    pub allergen: AllergenPayload,
    pub severity: UuidRef,
    pub comment: String,
    pub reactions: Vec<ReactionPayload>,
}

impl From<&AllergyFormState> for AllergyPayload {
    fn from(form: &AllergyFormState) -> Self {
        Self {
            allergen: AllergenPayload {
                allergen_type: form.allergen_type.clone(),
                coded_allergen: UuidRef::new(form.coded_allergen_uuid.clone()),
            },
            severity: UuidRef::new(form.severity_uuid.clone()),
            comment: form.comment.clone(),
            reactions: form
                .reaction_uuids
                .iter()
                .map(|uuid| ReactionPayload {
                    reaction: UuidRef::new(uuid.clone()),
                })
                .collect(),
        }
    }
}

/// What the clinician entered on the visit note form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitNoteDraft {
    pub patient_uuid: String,
    pub location_uuid: String,
    pub provider_uuid: String,
    pub encounter_datetime: DateTime<Utc>,
    pub note: String,
    pub diagnoses: Vec<DiagnosisCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncounterProvider {
    pub encounter_role: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncounterObs {
    pub concept: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_members: Vec<EncounterObs>,
}

impl EncounterObs {
    fn value(concept: &str, value: &str) -> Self {
        Self {
            concept: concept.to_string(),
            value: Some(value.to_string()),
            group_members: Vec::new(),
        }
    }
}

/// Body of `POST /encounter` for a visit note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VisitNotePayload {
    pub encounter_datetime: String,
    pub form: String,
    pub patient: String,
    pub location: String,
    pub encounter_type: String,
    pub encounter_providers: Vec<EncounterProvider>,
    pub obs: Vec<EncounterObs>,
}

impl VisitNotePayload {
    pub fn build(draft: &VisitNoteDraft, concepts: &VisitNoteConcepts) -> Result<Self, ChartError> {
        if draft.patient_uuid.trim().is_empty() {
            return Err(ChartError::InvalidForm("patient is required".into()));
        }
        if draft.note.trim().is_empty() && draft.diagnoses.is_empty() {
            return Err(ChartError::InvalidForm(
                "a visit note needs a note or at least one diagnosis".into(),
            ));
        }

        let mut obs: Vec<EncounterObs> = draft
            .diagnoses
            .iter()
            .map(|diagnosis| EncounterObs {
                concept: concepts.diagnosis_set_uuid.clone(),
                value: None,
                group_members: vec![
                    EncounterObs::value(
                        &concepts.certainty_uuid,
                        if diagnosis.confirmed {
                            &concepts.confirmed_uuid
                        } else {
                            &concepts.presumed_uuid
                        },
                    ),
                    EncounterObs::value(
                        &concepts.order_uuid,
                        if diagnosis.primary {
                            &concepts.primary_uuid
                        } else {
                            &concepts.secondary_uuid
                        },
                    ),
                    EncounterObs::value(&concepts.coded_diagnosis_uuid, &diagnosis.concept_uuid),
                ],
            })
            .collect();

        if !draft.note.trim().is_empty() {
            obs.push(EncounterObs::value(&concepts.note_concept_uuid, &draft.note));
        }

        Ok(Self {
            encounter_datetime: draft
                .encounter_datetime
                .format("%Y-%m-%dT%H:%M:%S%.3f%z")
                .to_string(),
            form: concepts.form_uuid.clone(),
            patient: draft.patient_uuid.clone(),
            location: draft.location_uuid.clone(),
            encounter_type: concepts.encounter_type_uuid.clone(),
            encounter_providers: vec![EncounterProvider {
                encounter_role: concepts.encounter_role_uuid.clone(),
                provider: draft.provider_uuid.clone(),
            }],
            obs,
        })
    }
}
