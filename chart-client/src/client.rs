use serde_json::Value;

use chart_core::{
    AllergyFormState, AllergyPayload, AllergyRecord, ChartConfig, ChartError, ConceptMember,
    DiagnosisCandidate, DimensionSeries, Location, PatientContext, Projection, Provider,
    SessionUser, VisitNoteDraft, VisitNotePayload, ALLERGY_REACTION_CONCEPT,
};
use chart_fhir::{project_allergies, resolve_diagnoses, summarize_dimensions};

use crate::gateway::{FetchGateway, GatewayRequest, GatewayResponse};
use crate::{CancellationToken, ClientError};

/// Chart reads and writes on top of a [`FetchGateway`].
///
/// Every call takes the cancellation token of the fetch it belongs to; a
/// response that arrives after the token fired is reported as
/// [`ClientError::Cancelled`] and never projected.
pub struct ChartClient<G> {
    gateway: G,
    config: ChartConfig,
}

impl<G: FetchGateway> ChartClient<G> {
    /// Fails with [`ChartError::InvalidConfig`] when `config` does not validate.
    pub fn new(gateway: G, config: ChartConfig) -> Result<Self, ChartError> {
        config.validate()?;
        Ok(Self { gateway, config })
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    async fn call(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        cancel.check()?;
        let response = self.gateway.fetch(request, cancel).await?;
        cancel.check()?;
        Ok(response)
    }

    async fn get_json(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, ClientError> {
        Ok(self.call(request, cancel).await?.body)
    }

    fn fhir(&self, resource: &str) -> String {
        format!("{}/{resource}", self.config.endpoints.fhir_base)
    }

    fn rest(&self, resource: &str) -> String {
        format!("{}/{resource}", self.config.endpoints.rest_base)
    }

    fn allergy_path(&self, patient_uuid: &str, allergy_uuid: Option<&str>) -> String {
        let collection = self.rest(&format!("patient/{patient_uuid}/allergy"));
        match allergy_uuid {
            Some(allergy_uuid) => format!("{collection}/{allergy_uuid}"),
            None => collection,
        }
    }

    /// Allergies recorded for the patient's primary identifier.
    pub async fn allergies(
        &self,
        patient: &PatientContext,
        cancel: &CancellationToken,
    ) -> Result<Projection<AllergyRecord>, ClientError> {
        let request = GatewayRequest::get(self.fhir("AllergyIntolerance"))
            .with_query("patient.identifier", patient.identifier.as_str());
        let bundle = self.get_json(request, cancel).await?;
        Ok(project_allergies(&bundle)?)
    }

    /// Height and weight observations merged into biometrics rows.
    pub async fn dimensions(
        &self,
        patient: &PatientContext,
        cancel: &CancellationToken,
    ) -> Result<DimensionSeries, ClientError> {
        let concepts = &self.config.concepts;
        let request = GatewayRequest::get(self.fhir("Observation"))
            .with_query("subject:Patient", patient.uuid.as_str())
            .with_query(
                "code",
                format!("{},{}", concepts.weight_uuid, concepts.height_uuid),
            );
        let bundle = self.get_json(request, cancel).await?;
        Ok(summarize_dimensions(&bundle, &self.config)?)
    }

    /// Members of a concept set, e.g. the allergens of one allergen type.
    pub async fn concept_members(
        &self,
        concept_uuid: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConceptMember>, ClientError> {
        let request = GatewayRequest::get(self.rest(&format!("concept/{concept_uuid}")))
            .with_query("v", "full");
        let body = self.get_json(request, cancel).await?;
        Ok(results(&body, "setMembers")
            .filter_map(|member| {
                Some(ConceptMember {
                    uuid: str_at(member, "uuid")?,
                    display: str_at(member, "display")?,
                })
            })
            .collect())
    }

    pub async fn allergy_reactions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConceptMember>, ClientError> {
        self.concept_members(ALLERGY_REACTION_CONCEPT, cancel).await
    }

    pub async fn providers(&self, cancel: &CancellationToken) -> Result<Vec<Provider>, ClientError> {
        let request = GatewayRequest::get(self.rest("provider"))
            .with_query("v", "custom:(person:(uuid,display),uuid)");
        let body = self.get_json(request, cancel).await?;
        Ok(results(&body, "results")
            .filter_map(|provider| {
                let person = provider.get("person");
                Some(Provider {
                    uuid: str_at(provider, "uuid")?,
                    person_uuid: person.and_then(|p| str_at(p, "uuid")),
                    display: person
                        .and_then(|p| str_at(p, "display"))
                        .or_else(|| str_at(provider, "display"))
                        .unwrap_or_default(),
                })
            })
            .collect())
    }

    pub async fn locations(&self, cancel: &CancellationToken) -> Result<Vec<Location>, ClientError> {
        let request =
            GatewayRequest::get(self.rest("location")).with_query("v", "custom:(uuid,display)");
        let body = self.get_json(request, cancel).await?;
        Ok(results(&body, "results")
            .filter_map(|location| {
                Some(Location {
                    uuid: str_at(location, "uuid")?,
                    display: str_at(location, "display").unwrap_or_default(),
                })
            })
            .collect())
    }

    pub async fn session(&self, cancel: &CancellationToken) -> Result<SessionUser, ClientError> {
        let body = self
            .get_json(GatewayRequest::get(self.rest("appui/session")), cancel)
            .await?;
        let nested = |key: &str, field: &str| body.get(key).and_then(|v| str_at(v, field));
        Ok(SessionUser {
            authenticated: body
                .get("authenticated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            user_uuid: nested("user", "uuid"),
            user_display: nested("user", "display"),
            provider_uuid: nested("currentProvider", "uuid"),
            location_uuid: nested("sessionLocation", "uuid"),
        })
    }

    /// Free-text diagnosis search. A blank term issues no request.
    pub async fn search_diagnoses(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<Projection<DiagnosisCandidate>, ClientError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Projection::default());
        }
        let request = GatewayRequest::get(self.config.endpoints.diagnosis_search.clone())
            .with_query("term", term);
        let body = self.get_json(request, cancel).await?;
        Ok(resolve_diagnoses(&body)?)
    }

    /// One allergy in the shape of the edit form.
    pub async fn allergy(
        &self,
        patient_uuid: &str,
        allergy_uuid: &str,
        cancel: &CancellationToken,
    ) -> Result<AllergyFormState, ClientError> {
        let request = GatewayRequest::get(self.allergy_path(patient_uuid, Some(allergy_uuid)))
            .with_query("v", "full");
        let body = self.get_json(request, cancel).await?;
        allergy_form_state(&body).ok_or_else(|| ClientError::Decode {
            path: self.allergy_path(patient_uuid, Some(allergy_uuid)),
            message: "allergy is missing allergen or severity".into(),
        })
    }

    pub async fn create_allergy(
        &self,
        patient_uuid: &str,
        form: &AllergyFormState,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        let body = allergy_body(form)?;
        let request = GatewayRequest::post(self.allergy_path(patient_uuid, None), body);
        self.call(request, cancel).await
    }

    pub async fn update_allergy(
        &self,
        patient_uuid: &str,
        allergy_uuid: &str,
        form: &AllergyFormState,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        let body = allergy_body(form)?;
        let path = self.allergy_path(patient_uuid, Some(allergy_uuid));
        let request = GatewayRequest::post(path, body);
        self.call(request, cancel).await
    }

    pub async fn delete_allergy(
        &self,
        patient_uuid: &str,
        allergy_uuid: &str,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        let request = GatewayRequest::delete(self.allergy_path(patient_uuid, Some(allergy_uuid)));
        self.call(request, cancel).await
    }

    pub async fn save_visit_note(
        &self,
        draft: &VisitNoteDraft,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        let payload = VisitNotePayload::build(draft, &self.config.visit_note)?;
        let body =
            serde_json::to_value(payload).map_err(|err| ChartError::Parse(err.to_string()))?;
        self.call(GatewayRequest::post(self.rest("encounter"), body), cancel)
            .await
    }
}

fn allergy_body(form: &AllergyFormState) -> Result<Value, ClientError> {
    form.validate()?;
    serde_json::to_value(AllergyPayload::from(form))
        .map_err(|err| ChartError::Parse(err.to_string()).into())
}

fn allergy_form_state(body: &Value) -> Option<AllergyFormState> {
    let allergen = body.get("allergen")?;
    Some(AllergyFormState {
        allergen_type: str_at(allergen, "allergenType")?,
        coded_allergen_uuid: allergen.get("codedAllergen").and_then(|c| str_at(c, "uuid"))?,
        severity_uuid: body.get("severity").and_then(|s| str_at(s, "uuid"))?,
        comment: str_at(body, "comment").unwrap_or_default(),
        reaction_uuids: results(body, "reactions")
            .filter_map(|r| r.get("reaction").and_then(|reaction| str_at(reaction, "uuid")))
            .collect(),
    })
}

fn results<'a>(body: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

fn str_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edit_form_is_read_back_from_rest_allergy() {
        let body = json!({
            "uuid": "al-1",
            "allergen": {
                "allergenType": "DRUG",
                "codedAllergen": { "uuid": "penicillin-uuid", "display": "Penicillin" }
            },
            "severity": { "uuid": "severe-uuid" },
            "comment": "seen in ER",
            "reactions": [
                { "reaction": { "uuid": "rash-uuid" } },
                { "reaction": { "uuid": "hives-uuid" } }
            ]
        });
        let form = allergy_form_state(&body).unwrap();
        assert_eq!(form.allergen_type, "DRUG");
        assert_eq!(form.coded_allergen_uuid, "penicillin-uuid");
        assert_eq!(form.reaction_uuids, vec!["rash-uuid", "hives-uuid"]);
    }

    #[test]
    fn incomplete_allergy_has_no_form_state() {
        assert!(allergy_form_state(&json!({ "allergen": { "allergenType": "FOOD" } })).is_none());
        assert!(allergy_form_state(&Value::Null).is_none());
    }
}
